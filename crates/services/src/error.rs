use common::MoneyError;
use domain::DomainError;
use store::StoreError;
use thiserror::Error;

/// Errors returned by the application services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed input, duplicate keys or a rule the request breaks.
    #[error("{0}")]
    Validation(String),

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Insufficient stock for {sku}: requested {requested}, available {available}")]
    InsufficientStock {
        sku: String,
        requested: i64,
        available: i64,
    },

    #[error("{0}")]
    InvalidQuantity(String),

    #[error("{0}")]
    CurrencyMismatch(String),

    /// The status machine does not allow the requested move.
    #[error("{0}")]
    InvalidTransition(String),

    /// The data changed underneath the request (stale version or a lost
    /// race on a unique key). Retrying with fresh data may succeed.
    #[error("{0}")]
    Conflict(String),

    /// Storage failure. Details are logged, not shown to clients.
    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<MoneyError> for ServiceError {
    fn from(err: MoneyError) -> Self {
        match err {
            MoneyError::CurrencyMismatch { .. } => Self::CurrencyMismatch(err.to_string()),
            MoneyError::InvalidCurrency(_) | MoneyError::Overflow => {
                Self::Validation(err.to_string())
            }
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(message) => Self::Validation(message),
            DomainError::InvalidQuantity { .. } => Self::InvalidQuantity(err.to_string()),
            DomainError::InsufficientStock {
                sku,
                requested,
                available,
            } => Self::InsufficientStock {
                sku,
                requested,
                available,
            },
            DomainError::InvalidTransition { .. } => Self::InvalidTransition(err.to_string()),
            DomainError::Money(money) => money.into(),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConcurrencyConflict { entity, .. } => Self::Conflict(format!(
                "The {entity} was modified by another request, please retry"
            )),
            StoreError::UniqueViolation { entity, .. } => Self::Conflict(format!(
                "A {entity} with the same unique key was created concurrently"
            )),
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::ReferenceViolation { entity, key } => {
                Self::Validation(format!("The {entity} is still referenced: {key}"))
            }
            StoreError::Cycle { .. } => Self::Validation(
                "A category cannot be moved beneath one of its own descendants".to_string(),
            ),
            other => Self::Store(other),
        }
    }
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Currency, Version};

    #[test]
    fn domain_errors_keep_their_kind() {
        let err: ServiceError = DomainError::InsufficientStock {
            sku: "LP-15-001".into(),
            requested: 3,
            available: 1,
        }
        .into();
        assert!(matches!(err, ServiceError::InsufficientStock { requested: 3, .. }));

        let err: ServiceError = DomainError::Money(MoneyError::CurrencyMismatch {
            left: Currency::EUR,
            right: Currency::USD,
        })
        .into();
        assert!(matches!(err, ServiceError::CurrencyMismatch(_)));
    }

    #[test]
    fn stale_versions_become_conflicts() {
        let err: ServiceError = StoreError::ConcurrencyConflict {
            entity: "product",
            id: "p-1".into(),
            expected: Version::first(),
            actual: Version::new(2),
        }
        .into();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }
}
