//! # facturo-engine: Issuance, Kardex and Authority Services for Facturo
//!
//! This crate runs the business workflows of Facturo on top of the pure
//! rules in `facturo-core` and the repositories in `facturo-db`.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Engine (facade)                                │
//! │                                                                         │
//! │  SubmissionReconciler ──► CreditDebitAdjuster ──► DocumentLifecycle     │
//! │   submit / poll / sweep    notes 01..07, D01..D03  issue / void / settle│
//! │          │                                            │          │      │
//! │          ▼                                            ▼          ▼      │
//! │  TaxAuthorityClient                       InventoryLedger  SequenceAllocator
//! │  (SandboxAuthority)                              │                      │
//! │                                                  ▼                      │
//! │                                         NotificationSink                │
//! │                                         (TracingNotifier)               │
//! │                                                                         │
//! │  ISSUANCE TRANSACTION:                                                 │
//! │  number ──► document + lines ──► SALIDA per tracked line ──► payment   │
//! │  (one SQLite transaction; any failure rolls every step back)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`engine`] - `Engine` facade wiring every service
//! - [`sequence`] - Series and correlative allocation
//! - [`ledger`] - Kardex postings, weighted-average cost, replay checks
//! - [`lifecycle`] - Issuance, voiding, partial settlement, reporting
//! - [`adjuster`] - Credit and debit notes by motive
//! - [`reconciler`] - Tax authority submission, polling and the sweep loop
//! - [`ports`] - Traits for the authority, notifications and party lookups
//! - [`authority`], [`notifier`], [`directory`] - Shipped adapters
//! - [`config`] - Layered configuration
//! - [`error`] - Engine error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use facturo_engine::{Engine, EngineConfig};
//! use facturo_db::Database;
//!
//! let config = EngineConfig::load(None)?;
//! let db = Database::new(config.db_config()).await?;
//! let engine = Engine::from_config(&config, db)?;
//!
//! let outcome = engine.issue_formal(request).await?;
//! println!("{} -> {:?}", outcome.document().number(), outcome.document().state);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod adjuster;
pub mod authority;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod notifier;
pub mod ports;
pub mod reconciler;
pub mod sequence;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use adjuster::CreditDebitAdjuster;
pub use authority::{SandboxAuthority, SandboxBehavior};
pub use config::{EngineConfig, IssuanceSettings, SubmissionSettings, SweepSettings};
pub use directory::DbPartyDirectory;
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use ledger::{InventoryLedger, MovementRequest};
pub use lifecycle::DocumentLifecycle;
pub use notifier::TracingNotifier;
pub use ports::{
    AuthorityResponse, AuthorityStatus, NotificationSink, PartyDirectory, StockAlert,
    SubmissionPayload, TaxAuthorityClient,
};
pub use reconciler::{IssueOutcome, RetryPolicy, SubmissionReconciler, SweepReport, Sweeper, SweeperHandle};
pub use sequence::SequenceAllocator;
