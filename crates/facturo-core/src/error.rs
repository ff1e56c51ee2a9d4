//! # Error Types
//!
//! Domain-specific error types for facturo-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  facturo-core errors (this file)                                       │
//! │  ├── CoreError        - Domain rule violations                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  facturo-db errors (separate crate)                                    │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  facturo-engine errors                                                 │
//! │  └── EngineError      - What service callers see                       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → API layer           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Error Categories
//! Every [`CoreError`] maps to an [`ErrorKind`]:
//! - **Validation**: bad input, nothing was persisted
//! - **Conflict**: the request collided with current state (stock, balance)
//! - **NotFound**: a referenced entity does not exist

use thiserror::Error;

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse category used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected synchronously; retrying the same input will fail again.
    Validation,
    /// Rejected after detecting a conflicting state; caller may retry.
    Conflict,
    /// A referenced entity is missing.
    NotFound,
}

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Document type string is unknown, or not valid in this position.
    #[error("Invalid document type: {0}")]
    InvalidDocumentType(String),

    /// A note was requested without the type of the document it affects.
    ///
    /// ## When This Occurs
    /// - `next_number(merchant, CreditNote, None)`
    /// - A note request that omits the affected document
    #[error("Document type {doc_type} requires an affected document type")]
    MissingAffectedType { doc_type: String },

    /// Product does not exist, belongs to another merchant, or is inactive.
    #[error("Unknown product: {0}")]
    UnknownProduct(String),

    /// Line quantity is zero, negative or above the per-line maximum.
    #[error("Invalid quantity: {quantity}")]
    InvalidQuantity { quantity: i64 },

    /// Posting a SALIDA would leave negative stock.
    ///
    /// ## User Workflow
    /// ```text
    /// Sell 5 × ARROZ-5KG
    ///      │
    ///      ▼
    /// Ledger: stock = 3
    ///      │
    ///      ▼
    /// InsufficientStock { code: "ARROZ-5KG", available: 3, requested: 5 }
    /// ```
    #[error("Insufficient stock for {code}: available {available}, requested {requested}")]
    InsufficientStock {
        code: String,
        available: i64,
        requested: i64,
    },

    /// Document not found.
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// The lifecycle does not allow moving between these states.
    #[error("Document {document_id} cannot move from {from} to {to}")]
    InvalidStateTransition {
        document_id: String,
        from: String,
        to: String,
    },

    /// Document was already voided.
    #[error("Document {0} is already voided")]
    AlreadyVoided(String),

    /// Settlement amount exceeds the outstanding balance.
    #[error("Payment of {requested} exceeds balance {balance} on document {document_id}")]
    InsufficientBalance {
        document_id: String,
        balance: i64,
        requested: i64,
    },

    /// Payment amount is invalid.
    #[error("Invalid payment amount: {reason}")]
    InvalidPaymentAmount { reason: String },

    /// Motive code does not exist for either note kind.
    #[error("Unknown motive: {0}")]
    UnknownMotive(String),

    /// Motive exists but belongs to the other note kind.
    #[error("Motive {code} cannot be used on a {note_type}")]
    MotiveKindMismatch { code: String, note_type: String },

    /// The document a note refers to is missing or not eligible.
    #[error("Affected document not found: {0}")]
    AffectedDocumentNotFound(String),

    /// Motive needs explicit line detail that was not supplied.
    #[error("Motive {code} requires adjustment lines")]
    MissingAdjustmentLines { code: String },

    /// Adjustment detail is inconsistent with the affected document.
    #[error("Invalid adjustment: {reason}")]
    InvalidAdjustment { reason: String },

    /// Document type needs an identified customer.
    #[error("Customer required: {reason}")]
    CustomerRequired { reason: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InsufficientStock { .. }
            | CoreError::InsufficientBalance { .. }
            | CoreError::AlreadyVoided(_)
            | CoreError::InvalidStateTransition { .. } => ErrorKind::Conflict,
            CoreError::DocumentNotFound(_) | CoreError::AffectedDocumentNotFound(_) => {
                ErrorKind::NotFound
            }
            _ => ErrorKind::Validation,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., RUC with a bad check digit).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
