//! Document payloads accepted by the registration API.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A goods introduction document.
///
/// Field names on the wire are the API's own, which mix camel and snake case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "participantInn")]
    pub participant_inn: String,
    pub doc_id: String,
    pub doc_status: String,
    pub doc_type: String,
    #[serde(rename = "importRequest")]
    pub import_request: bool,
    pub owner_inn: String,
    pub producer_inn: String,
    pub production_date: NaiveDate,
    pub production_type: String,
    #[serde(default)]
    pub products: Vec<Product>,
    pub reg_date: NaiveDate,
    pub reg_number: String,
}

/// A single product line of a [`Document`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub certificate_document: String,
    pub certificate_document_date: NaiveDate,
    pub certificate_document_number: String,
    pub owner_inn: String,
    pub producer_inn: String,
    pub production_date: NaiveDate,
    pub tnved_code: String,
    pub uit_code: String,
    pub uitu_code: String,
}

/// Request body of the create-document call.
#[derive(Debug, Serialize)]
pub struct CreateDocumentRequest<'a> {
    pub description: &'a Document,
    pub signature: &'a str,
}
