//! Domain error types.

use entity_store::{StoreError, UniqueField, UnknownSortField};
use thiserror::Error;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Input failed a shape or constraint check.
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// A unique value is already taken.
    #[error("{field} already exists")]
    DuplicateKey { field: UniqueField, value: String },

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The request is well-formed but cannot be served as asked.
    #[error("{0}")]
    InvalidInput(String),

    /// An infrastructure fault in the entity store.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl DomainError {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        DomainError::Validation {
            field,
            message: message.into(),
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateKey { field, value } => DomainError::DuplicateKey { field, value },
            StoreError::MissingReference { entity, id } => DomainError::NotFound { entity, id },
            other => DomainError::Store(other),
        }
    }
}

impl From<UnknownSortField> for DomainError {
    fn from(err: UnknownSortField) -> Self {
        DomainError::InvalidInput(err.to_string())
    }
}
