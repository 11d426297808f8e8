use common::Version;
use thiserror::Error;

/// Errors that can occur when reading from or committing to the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row changed since it was read: the expected version did not match.
    #[error("Concurrency conflict on {entity} {id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        entity: &'static str,
        id: String,
        expected: Version,
        actual: Version,
    },

    /// An update or delete named a row that does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A unique key (SKU, slug, email, document number, ...) is already taken.
    #[error("Duplicate {entity} {key}")]
    UniqueViolation { entity: &'static str, key: String },

    /// A write would leave a dangling or orphaned reference.
    #[error("{entity} reference violation: {key}")]
    ReferenceViolation { entity: &'static str, key: String },

    /// A parent link would close a loop in a hierarchy.
    #[error("{entity} {id} would become its own ancestor")]
    Cycle { entity: &'static str, id: String },

    /// A stored row could not be turned back into a valid entity.
    #[error("Corrupt {entity} row {id}: {reason}")]
    Corrupt {
        entity: &'static str,
        id: String,
        reason: String,
    },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub(crate) fn conflict(
        entity: &'static str,
        id: impl ToString,
        expected: Version,
        actual: Version,
    ) -> Self {
        metrics::counter!("store_conflicts_total", "entity" => entity).increment(1);
        tracing::warn!(entity, expected = %expected, actual = %actual, "optimistic concurrency conflict");
        Self::ConcurrencyConflict {
            entity,
            id: id.to_string(),
            expected,
            actual,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn corrupt(entity: &'static str, id: impl ToString, reason: impl ToString) -> Self {
        Self::Corrupt {
            entity,
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
