//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)          CoreError (pharma-core)            │
//! │       │                                   │                             │
//! │       ▼                                   ▼                             │
//! │  DbError (this module) ← classifies constraint / busy failures          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ApiError (apps/api) ← HTTP status + {"error", "message"} body          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use pharma_core::CoreError;
use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Duplicate manufacturer / ingredient / dosage form name
    /// - Duplicate (product, dosage_form, pack_size) variant
    /// - Duplicate barcode, phone, license or tracking number
    #[error("Duplicate value for {field}")]
    UniqueViolation { field: String },

    /// Foreign key constraint violation on insert/update.
    ///
    /// ## When This Occurs
    /// - Referencing a manufacturer, dosage form or batch that doesn't exist
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Delete blocked by rows that still reference the entity (RESTRICT).
    ///
    /// ## When This Occurs
    /// ```text
    /// DELETE manufacturer "Pfizer"
    ///      │
    ///      ▼
    /// products.manufacturer_id ON DELETE RESTRICT
    ///      │
    ///      ▼
    /// Protected { entity: "Manufacturer", id }  → 409
    /// ```
    #[error("{entity} {id} is still referenced and cannot be deleted")]
    Protected { entity: String, id: String },

    /// CHECK constraint violation (range or stock invariant).
    #[error("Check constraint failed: {0}")]
    CheckViolation(String),

    /// SQLite reported the database busy or locked.
    #[error("Database is busy")]
    Busy,

    /// A guarded update lost a race or found the row in an unexpected state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Business rule violation raised while running a workflow.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Turns a foreign key failure on DELETE into `Protected`.
    pub fn protect(self, entity: &str, id: &str) -> Self {
        match self {
            DbError::ForeignKeyViolation { .. } => DbError::Protected {
                entity: entity.to_string(),
                id: id.to_string(),
            },
            other => other,
        }
    }

    /// Whether retrying the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::Busy | DbError::PoolExhausted)
    }
}

/// SQLite primary/extended result codes for BUSY and LOCKED.
const BUSY_CODES: [&str; 5] = ["5", "6", "261", "262", "517"];

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → UNIQUE / FOREIGN KEY / CHECK / busy
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                let code = db_err.code();

                if msg.contains("UNIQUE constraint failed") {
                    // "UNIQUE constraint failed: products.brand_name"
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation { field }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("CHECK constraint failed") {
                    DbError::CheckViolation(msg.to_string())
                } else if msg.contains("database is locked")
                    || code.as_deref().is_some_and(|c| BUSY_CODES.contains(&c))
                {
                    DbError::Busy
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<pharma_core::ValidationError> for DbError {
    fn from(err: pharma_core::ValidationError) -> Self {
        DbError::Core(CoreError::Validation(err))
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protect_only_rewrites_fk_failures() {
        let fk = DbError::ForeignKeyViolation {
            message: "FOREIGN KEY constraint failed".to_string(),
        };
        assert!(matches!(
            fk.protect("Manufacturer", "m-1"),
            DbError::Protected { .. }
        ));

        let nf = DbError::not_found("Manufacturer", "m-1");
        assert!(matches!(nf.protect("Manufacturer", "m-1"), DbError::NotFound { .. }));
    }

    #[test]
    fn test_retryable() {
        assert!(DbError::Busy.is_retryable());
        assert!(!DbError::Conflict("x".to_string()).is_retryable());
    }
}
