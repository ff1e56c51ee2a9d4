//! # facturo-core: Pure Business Logic for Facturo
//!
//! This crate holds the rules behind fiscal document issuance and the
//! perpetual inventory ledger (kardex), as pure functions with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Facturo Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              facturo-engine (services + ports)                  │   │
//! │  │  DocumentLifecycle, InventoryLedger, CreditDebitAdjuster, ...  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ facturo-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌───────────┐ ┌────────┐ ┌────────┐  │   │
//! │  │   │  money  │ │ series  │ │ valuation │ │ kardex │ │ motive │  │   │
//! │  │   │  Money  │ │ F0A1... │ │ IGV split │ │ W.A.C. │ │ 01..07 │  │   │
//! │  │   └─────────┘ └─────────┘ └───────────┘ └────────┘ └────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                   facturo-db (Database Layer)                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Document, StockMovement, ...)
//! - [`money`] - Money in céntimos and four-decimal unit costs
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation (RUC, DNI, quantities)
//! - [`series`] - Series lookup table and number formatting
//! - [`valuation`] - Line valuation (tax-inclusive ↔ tax-exclusive)
//! - [`kardex`] - Stock movement math and ledger replay
//! - [`motive`] - Credit/debit note motives and adjustment rules
//! - [`lifecycle`] - Document state machine and balance rules
//! - [`summary`] - Accounting summary over issued documents
//!
//! ## Example Usage
//!
//! ```rust
//! use facturo_core::money::Money;
//! use facturo_core::types::TaxRate;
//!
//! // S/ 11.80 including 18% IGV
//! let gross = Money::from_cents(1180);
//! let net = gross.net_of_tax(TaxRate::IGV);
//! assert_eq!(net.cents(), 1000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod kardex;
pub mod lifecycle;
pub mod money;
pub mod motive;
pub mod series;
pub mod summary;
pub mod types;
pub mod validation;
pub mod valuation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::{Money, UnitCost};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Currency used when a request does not specify one (ISO 4217).
pub const DEFAULT_CURRENCY: &str = "PEN";

/// Maximum lines allowed on a single document.
pub const MAX_DOCUMENT_LINES: usize = 200;

/// Maximum quantity of a single line.
///
/// ## Business Reason
/// Catches typing mistakes (10000 instead of 100) before stock moves.
pub const MAX_LINE_QUANTITY: i64 = 99_999;

/// Boletas above this total (S/ 700.00) must identify the customer.
pub const TICKET_IDENTIFICATION_THRESHOLD_CENTS: i64 = 70_000;
