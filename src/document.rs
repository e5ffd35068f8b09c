//! Document registration schema.
//!
//! Field names follow the remote API's wire format exactly, which mixes
//! snake_case and camelCase keys.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CrptError, Result};

/// Document type used when none is given.
pub const DEFAULT_DOC_TYPE: &str = "LP_INTRODUCE_GOODS";

/// A goods introduction document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Description>,
    pub doc_id: String,
    pub doc_status: String,
    #[serde(default = "default_doc_type")]
    pub doc_type: String,
    #[serde(rename = "importRequest", default = "default_import_request")]
    pub import_request: bool,
    pub owner_inn: String,
    pub participant_inn: String,
    pub producer_inn: String,
    pub production_date: NaiveDate,
    pub production_type: String,
    #[serde(default)]
    pub products: Vec<Product>,
    pub reg_date: NaiveDate,
    pub reg_number: String,
}

fn default_doc_type() -> String {
    DEFAULT_DOC_TYPE.to_string()
}

fn default_import_request() -> bool {
    true
}

/// Participant description attached to a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Description {
    #[serde(rename = "participantInn")]
    pub participant_inn: String,
}

/// A single product line of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_document_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_document_number: Option<String>,
    pub owner_inn: String,
    pub producer_inn: String,
    pub production_date: NaiveDate,
    pub tnved_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uit_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uitu_code: Option<String>,
}

impl Document {
    /// Load a document from a JSON or YAML file, chosen by extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&contents)
                .map_err(|e| CrptError::Config(format!("Failed to parse document: {}", e))),
            _ => Ok(serde_json::from_str(&contents)?),
        }
    }
}

/// Wire payload of a document creation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateDocumentRequest<'a> {
    pub description: &'a Document,
    pub signature: &'a str,
}

impl<'a> CreateDocumentRequest<'a> {
    pub fn new(document: &'a Document, signature: &'a str) -> Self {
        Self {
            description: document,
            signature,
        }
    }
}

/// Serialize a payload to its wire bytes.
///
/// Output is deterministic: struct fields are emitted in declaration order.
pub fn encode_payload(request: &CreateDocumentRequest<'_>) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(request)?)
}
