//! Client for the document registration API.

mod client;
pub(crate) mod document;

pub use client::DocumentClient;
pub use document::{CreateDocumentRequest, Document, Product};
