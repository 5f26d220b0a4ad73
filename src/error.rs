use thiserror::Error;

use crate::store::StoreError;

/// Why a single inbound reading could not be fully processed.
///
/// None of these stop the ingestion loop; the message is still acknowledged.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("malformed reading: {0}")]
    Malformed(String),

    #[error("profile lookup failed: {0}")]
    ProfileLookup(#[source] StoreError),

    #[error("reading store failed: {0}")]
    ReadingStore(#[source] StoreError),

    #[error("alert persistence failed: {0}")]
    AlertStore(#[source] StoreError),
}

impl PipelineError {
    /// Label used for the processing-outcome metric.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Malformed(_) => "decode",
            PipelineError::ProfileLookup(_) => "profile_lookup",
            PipelineError::ReadingStore(_) => "reading_store",
            PipelineError::AlertStore(_) => "alert_store",
        }
    }
}
