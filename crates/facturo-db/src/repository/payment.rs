//! # Payment Repository
//!
//! Payments recorded against documents. The document balance is updated
//! separately with [`crate::repository::document::apply_payment`] in the
//! same transaction.

use sqlx::SqliteExecutor;
use tracing::debug;

use crate::error::DbResult;
use facturo_core::Payment;

pub async fn insert<'e, E>(executor: E, payment: &Payment) -> DbResult<()>
where
    E: SqliteExecutor<'e>,
{
    debug!(
        document_id = %payment.document_id,
        amount_cents = payment.amount_cents,
        medium = ?payment.medium,
        "Recording payment"
    );

    sqlx::query(
        r#"
        INSERT INTO payments (id, document_id, amount_cents, medium, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(&payment.id)
    .bind(&payment.document_id)
    .bind(payment.amount_cents)
    .bind(payment.medium)
    .bind(payment.created_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Payments of a document, oldest first.
pub async fn for_document<'e, E>(executor: E, document_id: &str) -> DbResult<Vec<Payment>>
where
    E: SqliteExecutor<'e>,
{
    let payments = sqlx::query_as::<_, Payment>(
        r#"
        SELECT id, document_id, amount_cents, medium, created_at
        FROM payments
        WHERE document_id = ?1
        ORDER BY created_at, id
        "#,
    )
    .bind(document_id)
    .fetch_all(executor)
    .await?;

    Ok(payments)
}
