//! # facturo-db: Database Layer for Facturo
//!
//! This crate provides database access for Facturo.
//! It uses SQLite for storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Facturo Data Flow                                │
//! │                                                                         │
//! │  facturo-engine (DocumentLifecycle, InventoryLedger, ...)              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     facturo-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │   │   │
//! │  │   │               │    │ products       │   │              │   │   │
//! │  │   │ SqlitePool    │◄───│ documents      │   │ 001_initial  │   │   │
//! │  │   │ Transactions  │    │ movements      │   │ 002_kardex   │   │   │
//! │  │   │               │    │ sequences ...  │   │              │   │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Repositories and Transactions
//!
//! Every repository function takes a [`sqlx::SqliteExecutor`], so the same
//! query runs against the pool or inside a transaction:
//!
//! ```rust,ignore
//! use facturo_db::{Database, DbConfig, repository::product};
//!
//! let db = Database::new(DbConfig::new("facturo.db")).await?;
//!
//! // Standalone read
//! let p = product::get(db.pool(), "product-id").await?;
//!
//! // Inside a transaction
//! let mut tx = db.begin().await?;
//! product::lock(&mut *tx, "product-id").await?;
//! tx.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
