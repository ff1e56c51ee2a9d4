//! # Engine Error Types
//!
//! Error types for the issuance, kardex and reconciliation services.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Engine Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Domain (Core)  │  │    Database     │  │   External              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Validation     │  │  NotFound       │  │  Authority              │ │
//! │  │  Conflict       │  │  UniqueViolation│  │  Notification           │ │
//! │  │  NotFound       │  │  PoolExhausted  │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │  Configuration  │  │    Lookups      │                              │
//! │  │                 │  │                 │                              │
//! │  │  Config         │  │  UnknownMerchant│                              │
//! │  │  ConfigLoad     │  │  UnknownCustomer│                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Handling Strategy
//! - Validation: reject synchronously, nothing was persisted
//! - Conflict: reject after detection, the transaction rolled back
//! - External: the document stays PENDING_SUBMISSION with `error_message`

use thiserror::Error;

use facturo_core::{CoreError, ErrorKind};
use facturo_db::DbError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error type covering every service failure.
#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Domain Errors
    // =========================================================================
    /// A business rule rejected the operation.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Merchant does not exist or is inactive.
    #[error("Unknown merchant: {0}")]
    UnknownMerchant(String),

    /// Customer does not exist for this merchant.
    #[error("Unknown customer: {0}")]
    UnknownCustomer(String),

    // =========================================================================
    // Database Errors
    // =========================================================================
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    // =========================================================================
    // External Errors
    // =========================================================================
    /// The tax authority could not be reached or answered garbage.
    ///
    /// ## When This Occurs
    /// - Network failure or timeout while submitting
    /// - Sandbox configured as unreachable
    #[error("Tax authority error: {0}")]
    Authority(String),

    /// A notification could not be delivered.
    #[error("Notification failed: {0}")]
    Notification(String),

    /// Failed to serialize a payload.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid engine configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Failed to read or parse the config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// The sweep loop is stopping.
    #[error("Engine is shutting down")]
    ShuttingDown,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Database(DbError::from(err))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl EngineError {
    /// Returns true if the operation can be retried as-is.
    ///
    /// ## Retryable Errors
    /// - Tax authority transport failures
    /// - Database contention (pool exhausted, database locked)
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Authority(_) => true,
            EngineError::Database(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Returns true if the input was rejected before anything was persisted.
    pub fn is_validation(&self) -> bool {
        match self {
            EngineError::Core(e) => e.kind() == ErrorKind::Validation,
            EngineError::Config(_) => true,
            _ => false,
        }
    }

    /// Returns true if the operation lost against the current data
    /// (stock, balance, state or a duplicate key).
    pub fn is_conflict(&self) -> bool {
        match self {
            EngineError::Core(e) => e.kind() == ErrorKind::Conflict,
            EngineError::Database(DbError::UniqueViolation { .. }) => true,
            _ => false,
        }
    }

    /// Returns true if a referenced entity does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            EngineError::Core(e) => e.kind() == ErrorKind::NotFound,
            EngineError::UnknownMerchant(_) | EngineError::UnknownCustomer(_) => true,
            EngineError::Database(DbError::NotFound { .. }) => true,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(self, EngineError::Config(_) | EngineError::ConfigLoadFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(EngineError::Authority("connection reset".into()).is_retryable());
        assert!(EngineError::Database(DbError::PoolExhausted).is_retryable());

        assert!(!EngineError::Config("bad".into()).is_retryable());
        assert!(!EngineError::Core(CoreError::UnknownMotive("99".into())).is_retryable());
    }

    #[test]
    fn test_classification_follows_core_kind() {
        let stock = EngineError::from(CoreError::InsufficientStock {
            code: "ARROZ".into(),
            available: 2,
            requested: 5,
        });
        assert!(stock.is_conflict());
        assert!(!stock.is_validation());

        let quantity = EngineError::from(CoreError::InvalidQuantity { quantity: 0 });
        assert!(quantity.is_validation());

        let missing = EngineError::from(CoreError::DocumentNotFound("d1".into()));
        assert!(missing.is_not_found());

        let duplicate = EngineError::from(DbError::duplicate("correlative", "F0A1-00000001"));
        assert!(duplicate.is_conflict());
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::UnknownMerchant("m-404".into());
        assert!(err.to_string().contains("m-404"));
    }
}
