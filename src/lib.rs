//! crpt-gate - Rate-Limited Document Registration Client
//!
//! This crate caps how often a process may call a remote service: at most
//! `N` calls per fixed window of length `W`. The [`ratelimit`] module holds
//! the admission gate and the invoker that runs actions behind it; the
//! [`api`] module uses them to submit documents to the registration API.

pub mod api;
pub mod config;
pub mod error;
pub mod ratelimit;

pub use error::{Error, Result};
