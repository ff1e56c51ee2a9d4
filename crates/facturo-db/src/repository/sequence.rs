//! # Sequence Repository
//!
//! Atomic correlative counters, one row per (merchant, type, series).
//!
//! ## Allocation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  INSERT ... ON CONFLICT DO UPDATE SET last = last + 1 RETURNING last   │
//! │                                                                         │
//! │  first call for a key:  seed = MAX(existing correlative) + 1           │
//! │  later calls:           last + 1                                        │
//! │                                                                         │
//! │  Run as the FIRST statement of the issuance transaction: it takes the  │
//! │  SQLite write lock, so concurrent issuers queue on busy_timeout and    │
//! │  each sees the previous caller's committed counter.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A rolled-back transaction gives its number back; a committed number is
//! never handed out twice.

use chrono::{DateTime, Utc};
use sqlx::SqliteExecutor;
use tracing::debug;

use crate::error::DbResult;
use facturo_core::DocumentType;

/// Allocates the next correlative for a series.
pub async fn next<'e, E>(
    executor: E,
    merchant_id: &str,
    doc_type: DocumentType,
    series: &str,
    now: DateTime<Utc>,
) -> DbResult<i64>
where
    E: SqliteExecutor<'e>,
{
    let correlative: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO document_sequences (merchant_id, doc_type, series, last_correlative, updated_at)
        VALUES (
            ?1, ?2, ?3,
            COALESCE(
                (SELECT MAX(correlative) FROM documents
                 WHERE merchant_id = ?1 AND doc_type = ?2 AND series = ?3),
                0
            ) + 1,
            ?4
        )
        ON CONFLICT (merchant_id, doc_type, series) DO UPDATE
        SET last_correlative = last_correlative + 1,
            updated_at = excluded.updated_at
        RETURNING last_correlative
        "#,
    )
    .bind(merchant_id)
    .bind(doc_type)
    .bind(series)
    .bind(now)
    .fetch_one(executor)
    .await?;

    debug!(merchant_id = %merchant_id, series = %series, correlative, "Allocated correlative");

    Ok(correlative)
}

/// Last allocated correlative, or 0 when the series is unused.
pub async fn current<'e, E>(
    executor: E,
    merchant_id: &str,
    doc_type: DocumentType,
    series: &str,
) -> DbResult<i64>
where
    E: SqliteExecutor<'e>,
{
    let last: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT last_correlative FROM document_sequences
        WHERE merchant_id = ?1 AND doc_type = ?2 AND series = ?3
        "#,
    )
    .bind(merchant_id)
    .bind(doc_type)
    .bind(series)
    .fetch_optional(executor)
    .await?;

    Ok(last.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{database, MERCHANT_ID};

    #[tokio::test]
    async fn test_counter_starts_at_one_and_increments() {
        let db = database().await;
        assert_eq!(current(db.pool(), MERCHANT_ID, DocumentType::Invoice, "F0A1").await.unwrap(), 0);

        for expected in 1..=3 {
            let n = next(db.pool(), MERCHANT_ID, DocumentType::Invoice, "F0A1", Utc::now())
                .await
                .unwrap();
            assert_eq!(n, expected);
        }

        // Independent key
        let ticket = next(db.pool(), MERCHANT_ID, DocumentType::Ticket, "B0A1", Utc::now())
            .await
            .unwrap();
        assert_eq!(ticket, 1);
        assert_eq!(current(db.pool(), MERCHANT_ID, DocumentType::Invoice, "F0A1").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_counter_seeded_from_existing_documents() {
        let db = database().await;
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO documents (id, merchant_id, doc_type, series, correlative, issue_date,
                                   state, created_at, updated_at)
            VALUES ('imported', ?1, 'invoice', 'F0A1', 41, ?2, 'accepted', ?2, ?2)
            "#,
        )
        .bind(MERCHANT_ID)
        .bind(now)
        .execute(db.pool())
        .await
        .unwrap();

        let n = next(db.pool(), MERCHANT_ID, DocumentType::Invoice, "F0A1", now).await.unwrap();
        assert_eq!(n, 42);
    }

    #[tokio::test]
    async fn test_rolled_back_number_is_reused() {
        let db = database().await;
        {
            let mut tx = db.begin().await.unwrap();
            let n = next(&mut *tx, MERCHANT_ID, DocumentType::Invoice, "F0A1", Utc::now())
                .await
                .unwrap();
            assert_eq!(n, 1);
        }
        let n = next(db.pool(), MERCHANT_ID, DocumentType::Invoice, "F0A1", Utc::now())
            .await
            .unwrap();
        assert_eq!(n, 1);
    }
}
