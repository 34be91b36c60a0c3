use domain::ProductId;
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional stock decrement matched no row: the product does not
    /// have enough stock (or does not exist).
    #[error("Insufficient stock for product {product_id}")]
    InsufficientStock { product_id: ProductId },

    /// A row with the same key already exists.
    #[error("{entity} {id} already exists")]
    Duplicate { entity: &'static str, id: String },

    /// A stored row could not be decoded into the domain model.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// The store refused the operation (used by the in-memory store to
    /// simulate outages).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
