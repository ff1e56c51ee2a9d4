//! # Repository Module
//!
//! Database access for Facturo, one module per aggregate.
//!
//! ## Executor-Generic Repositories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every function takes `E: SqliteExecutor<'e>`                          │
//! │                                                                         │
//! │     product::get(db.pool(), id)        ← standalone read               │
//! │     product::lock(&mut *tx, id)        ← inside a write transaction    │
//! │                                                                         │
//! │  The engine composes several repositories in ONE transaction:          │
//! │                                                                         │
//! │     sequence::next ─► document::insert ─► document::insert_line        │
//! │        ─► product::lock ─► movement::insert ─► product::update_stock   │
//! │     tx.commit()                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`party`] - Merchants and customers (read-mostly)
//! - [`product`] - Products, row locks, stock/cost updates
//! - [`document`] - Documents, lines, conditional state updates
//! - [`movement`] - Append-only kardex entries
//! - [`sequence`] - Atomic correlative counters
//! - [`payment`] - Payments against documents

pub mod document;
pub mod movement;
pub mod party;
pub mod payment;
pub mod product;
pub mod sequence;

/// Converts a page size to a SQLite LIMIT (0 means no limit).
pub(crate) fn sql_limit(limit: u32) -> i64 {
    if limit == 0 {
        -1
    } else {
        limit as i64
    }
}
