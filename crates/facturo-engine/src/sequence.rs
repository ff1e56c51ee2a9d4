//! # Sequence Allocator
//!
//! Hands out `(series, correlative)` pairs.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  (doc_type, affected) ──► series_for() ──► "FCA1"                      │
//! │                                               │                         │
//! │  (merchant, doc_type, series) ──► sequence::next (atomic upsert) ──► 42│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Issuance calls [`SequenceAllocator::allocate`] as the first write of its
//! own transaction, so a failed issuance gives the number back.
//! [`SequenceAllocator::next_number`] commits the number on its own and is
//! meant for callers that number documents outside the engine.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use facturo_core::series::series_for;
use facturo_core::DocumentType;
use facturo_db::repository::sequence;
use facturo_db::Database;

use crate::error::EngineResult;

/// Correlative allocation per `(merchant, type, series)`.
#[derive(Debug, Clone)]
pub struct SequenceAllocator {
    db: Database,
}

impl SequenceAllocator {
    pub fn new(db: Database) -> Self {
        SequenceAllocator { db }
    }

    /// Reserves and commits the next number.
    ///
    /// ## Errors
    /// - `MissingAffectedType`: a note without the affected type
    /// - `InvalidDocumentType`: a note on something other than an invoice or ticket
    pub async fn next_number(
        &self,
        merchant_id: &str,
        doc_type: DocumentType,
        affected: Option<DocumentType>,
    ) -> EngineResult<(String, i64)> {
        let mut tx = self.db.begin().await?;
        let (series, correlative) = Self::allocate(&mut tx, merchant_id, doc_type, affected).await?;
        tx.commit().await?;

        Ok((series.to_string(), correlative))
    }

    /// Reserves the next number inside the caller's transaction.
    pub async fn allocate(
        conn: &mut SqliteConnection,
        merchant_id: &str,
        doc_type: DocumentType,
        affected: Option<DocumentType>,
    ) -> EngineResult<(&'static str, i64)> {
        let series = series_for(doc_type, affected)?;
        let correlative = sequence::next(&mut *conn, merchant_id, doc_type, series, Utc::now()).await?;

        debug!(merchant_id = %merchant_id, doc_type = %doc_type, series, correlative, "Number reserved");

        Ok((series, correlative))
    }

    /// Last committed correlative of a series (0 when unused).
    pub async fn current(
        &self,
        merchant_id: &str,
        doc_type: DocumentType,
        affected: Option<DocumentType>,
    ) -> EngineResult<i64> {
        let series = series_for(doc_type, affected)?;
        Ok(sequence::current(self.db.pool(), merchant_id, doc_type, series).await?)
    }
}
