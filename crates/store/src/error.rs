use common::ProductId;
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A stock adjustment would take the product below zero.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
        available: i64,
    },

    /// A value does not fit the range the store can hold.
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// A uniqueness constraint was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Lock contention, timeout or serialization failure. Nothing was committed.
    #[error("Transient storage error: {0}")]
    Transient(String),

    /// The unit of work was already committed.
    #[error("Unit of work already closed")]
    TransactionClosed,

    /// A stored value could not be decoded into a record.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns true if retrying the whole operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

// Postgres error codes that mean "retry the transaction".
const LOCK_NOT_AVAILABLE: &str = "55P03";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";
const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::PoolTimedOut => StoreError::Transient(e.to_string()),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some(LOCK_NOT_AVAILABLE | SERIALIZATION_FAILURE | DEADLOCK_DETECTED) => {
                    StoreError::Transient(db_err.message().to_string())
                }
                Some(UNIQUE_VIOLATION) => StoreError::Conflict(
                    db_err
                        .constraint()
                        .map(|c| format!("unique constraint {c} violated"))
                        .unwrap_or_else(|| db_err.message().to_string()),
                ),
                Some(NUMERIC_VALUE_OUT_OF_RANGE) => {
                    StoreError::OutOfRange(db_err.message().to_string())
                }
                _ => StoreError::Database(e),
            },
            _ => StoreError::Database(e),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
