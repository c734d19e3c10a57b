use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Canonical crisis event record as stored by the index.
///
/// Notes:
/// - `id` is the stable identity assigned at ingest time and is the
///   deterministic tie-breaker everywhere ranking ties occur.
/// - `embedding` has the dimension of the provisioned vector index; records
///   with a mismatched dimension are rejected on insert.
/// - `date` is kept as the free-form string the upstream dataset provided.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrisisRecord {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub text: String,
    pub location: String,
    pub category: String,
    pub source: String,
    pub date: String,
    pub embedding: Vec<f32>,
}

impl CrisisRecord {
    /// Text used when computing the stored embedding for a record:
    /// title + summary plus labelled location/category hints.
    pub fn embedding_input(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if !self.title.trim().is_empty() {
            parts.push(self.title.trim().to_string());
        }
        if !self.summary.trim().is_empty() {
            parts.push(self.summary.trim().to_string());
        }
        if !self.location.trim().is_empty() {
            parts.push(format!("Location: {}", self.location.trim()));
        }
        if !self.category.trim().is_empty() {
            parts.push(format!("Category: {}", self.category.trim()));
        }
        parts.join(" ")
    }
}

/// Validate a record before insert. The storage layer owns identity, so an
/// empty id is a caller bug, not a data-quality warning.
pub fn validate_record(record: &CrisisRecord, expected_dims: u32) -> Result<(), AppError> {
    if record.id.trim().is_empty() {
        return Err(AppError::new(
            "RECORD_INVALID",
            "Crisis record id must not be empty",
        ));
    }
    if record.title.trim().is_empty() {
        return Err(AppError::new(
            "RECORD_INVALID",
            "Crisis record title must not be empty",
        )
        .with_details(format!("id={}", record.id)));
    }
    if record.embedding.len() as u32 != expected_dims {
        return Err(AppError::new(
            "RECORD_INVALID",
            "Crisis record embedding dimension does not match the index",
        )
        .with_details(format!(
            "id={}; expected={}; got={}",
            record.id,
            expected_dims,
            record.embedding.len()
        )));
    }
    Ok(())
}
