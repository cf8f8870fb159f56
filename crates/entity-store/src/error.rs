use thiserror::Error;

/// A column protected by a uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    /// `customers.email`
    Email,
}

impl std::fmt::Display for UniqueField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UniqueField::Email => write!(f, "Email"),
        }
    }
}

/// Errors that can occur when interacting with the entity store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A write would violate a uniqueness constraint.
    #[error("{field} already exists")]
    DuplicateKey { field: UniqueField, value: String },

    /// A write referenced a row that does not exist.
    #[error("{entity} not found: {id}")]
    MissingReference { entity: &'static str, id: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for entity store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
