//! Error types for deal and chat operations

use thiserror::Error;

use crate::models::{RequestId, RequestStatus};

/// Errors that can occur in request lifecycle and chat operations
#[derive(Error, Debug)]
pub enum DealsError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid participant: {0}")]
    InvalidParticipant(String),
    #[error("Invalid transition for request {id}: request is not pending")]
    InvalidTransition {
        id: RequestId,
        from: Option<RequestStatus>,
    },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DealsError {
    /// True when the error was raised before any backend call was issued.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            DealsError::Validation(_) | DealsError::InvalidParticipant(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DealsError>;
