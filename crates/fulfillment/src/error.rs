//! Service-boundary error types.

use domain::{DomainError, ProductId};
use gateway::GatewayError;
use store::StoreError;
use thiserror::Error;

/// Coarse classification of a [`ServiceError`], used by transports to pick a
/// response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    InsufficientStock,
    InvalidTransition,
    Conflict,
    ThirdParty,
    Internal,
    Database,
}

/// Errors returned by the fulfillment services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The cart, product, order or payment does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    BadRequest(String),

    /// A demanded product does not have enough stock.
    #[error("Insufficient stock for product {product_id}")]
    InsufficientStock { product_id: ProductId },

    /// The requested status change is not an edge of the state graph.
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A payment gateway call or webhook verification failed.
    #[error("{operation} failed at the payment gateway: {source}")]
    ThirdParty {
        operation: &'static str,
        #[source]
        source: GatewayError,
    },

    /// A verified gateway event lacks a field we rely on.
    #[error("Malformed gateway event: {0}")]
    MalformedEvent(String),

    /// Persistence failed.
    #[error("{operation} failed: {source}")]
    Database {
        operation: &'static str,
        #[source]
        source: StoreError,
    },
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::NotFound { .. } => ErrorKind::NotFound,
            ServiceError::BadRequest(_) => ErrorKind::BadRequest,
            ServiceError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            ServiceError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            ServiceError::Conflict(_) => ErrorKind::Conflict,
            ServiceError::ThirdParty { .. } => ErrorKind::ThirdParty,
            ServiceError::MalformedEvent(_) => ErrorKind::Internal,
            ServiceError::Database { .. } => ErrorKind::Database,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ServiceError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Wraps a store failure with the operation that hit it.
    ///
    /// Stock shortfalls and key collisions keep their own kinds.
    pub(crate) fn store(operation: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| match source {
            StoreError::InsufficientStock { product_id } => {
                ServiceError::InsufficientStock { product_id }
            }
            StoreError::Duplicate { entity, id } => {
                ServiceError::Conflict(format!("{entity} {id} already exists"))
            }
            source => ServiceError::Database { operation, source },
        }
    }

    /// Wraps a gateway failure with the operation that hit it.
    pub(crate) fn gateway(operation: &'static str) -> impl FnOnce(GatewayError) -> Self {
        move |source| {
            metrics::counter!("gateway_errors_total", "operation" => operation).increment(1);
            ServiceError::ThirdParty { operation, source }
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidTransition { from, to } => ServiceError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            },
            DomainError::InvalidPaymentTransition { from, to } => {
                ServiceError::InvalidTransition {
                    from: from.to_string(),
                    to: to.to_string(),
                }
            }
            other => ServiceError::BadRequest(other.to_string()),
        }
    }
}

/// Convenience type alias for service results.
pub type Result<T> = std::result::Result<T, ServiceError>;
