//! Error types for the collabra system.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollabError {
    #[error("Access denied: {reason}")]
    AccessDenied { reason: String },

    #[error("Bad input: {message}")]
    BadInput { message: String },

    #[error("Object state error: {message}")]
    ObjectState { message: String },

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl CollabError {
    pub fn access_denied(reason: impl Into<String>) -> Self {
        CollabError::AccessDenied {
            reason: reason.into(),
        }
    }

    pub fn bad_input(message: impl Into<String>) -> Self {
        CollabError::BadInput {
            message: message.into(),
        }
    }

    pub fn object_state(message: impl Into<String>) -> Self {
        CollabError::ObjectState {
            message: message.into(),
        }
    }
}

pub type CollabResult<T> = Result<T, CollabError>;
