//! # Movement Repository
//!
//! The kardex: an append-only table of stock movements. Nothing here
//! updates or deletes a row.
//!
//! ## Ordering
//! `seq` is an AUTOINCREMENT key assigned at insert time, so ordering by
//! `seq` replays movements in the order they were committed for a product
//! (postings for one product are serialized by the product lock).

use sqlx::SqliteExecutor;
use tracing::debug;

use crate::error::DbResult;
use crate::repository::sql_limit;
use facturo_core::{MovementKind, MovementQuery, StockMovement};

const COLUMNS: &str = r#"
    id, seq, product_id, merchant_id, kind, quantity, stock_before, stock_after,
    unit_cost, cost_before, cost_after, document_id, note, created_at
"#;

/// Appends a movement and returns it with its assigned `seq`.
///
/// The `seq` field of the argument is ignored.
pub async fn insert<'e, E>(executor: E, movement: &StockMovement) -> DbResult<StockMovement>
where
    E: SqliteExecutor<'e>,
{
    debug!(
        product_id = %movement.product_id,
        kind = %movement.kind,
        quantity = movement.quantity,
        stock_after = movement.stock_after,
        "Appending stock movement"
    );

    let sql = format!(
        r#"
        INSERT INTO stock_movements (
            id, product_id, merchant_id, kind, quantity, stock_before, stock_after,
            unit_cost, cost_before, cost_after, document_id, note, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        RETURNING {}
        "#,
        COLUMNS
    );
    let stored = sqlx::query_as::<_, StockMovement>(&sql)
        .bind(&movement.id)
        .bind(&movement.product_id)
        .bind(&movement.merchant_id)
        .bind(movement.kind)
        .bind(movement.quantity)
        .bind(movement.stock_before)
        .bind(movement.stock_after)
        .bind(movement.unit_cost)
        .bind(movement.cost_before)
        .bind(movement.cost_after)
        .bind(&movement.document_id)
        .bind(&movement.note)
        .bind(movement.created_at)
        .fetch_one(executor)
        .await?;

    Ok(stored)
}

/// The most recent movement of a product.
pub async fn latest<'e, E>(executor: E, product_id: &str) -> DbResult<Option<StockMovement>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        "SELECT {} FROM stock_movements WHERE product_id = ?1 ORDER BY seq DESC LIMIT 1",
        COLUMNS
    );
    let movement = sqlx::query_as::<_, StockMovement>(&sql)
        .bind(product_id)
        .fetch_optional(executor)
        .await?;

    Ok(movement)
}

/// Full history of a product in replay order.
pub async fn for_product<'e, E>(executor: E, product_id: &str) -> DbResult<Vec<StockMovement>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        "SELECT {} FROM stock_movements WHERE product_id = ?1 ORDER BY seq",
        COLUMNS
    );
    let movements = sqlx::query_as::<_, StockMovement>(&sql)
        .bind(product_id)
        .fetch_all(executor)
        .await?;

    Ok(movements)
}

/// A page of a product's history within an optional date range.
pub async fn history<'e, E>(executor: E, product_id: &str, query: &MovementQuery) -> DbResult<Vec<StockMovement>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        r#"
        SELECT {} FROM stock_movements
        WHERE product_id = ?1
          AND (?2 IS NULL OR created_at >= ?2)
          AND (?3 IS NULL OR created_at <= ?3)
        ORDER BY seq
        LIMIT ?4 OFFSET ?5
        "#,
        COLUMNS
    );
    let movements = sqlx::query_as::<_, StockMovement>(&sql)
        .bind(product_id)
        .bind(query.from)
        .bind(query.to)
        .bind(sql_limit(query.limit))
        .bind(query.offset as i64)
        .fetch_all(executor)
        .await?;

    Ok(movements)
}

/// Units per product already put back by credit notes against a document.
///
/// Counts the INGRESO movements the notes actually posted, so notes still
/// awaiting a verdict or their effects contribute nothing.
pub async fn restocked_by_notes<'e, E>(executor: E, affected_id: &str) -> DbResult<Vec<(String, i64)>>
where
    E: SqliteExecutor<'e>,
{
    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT m.product_id, SUM(m.quantity)
        FROM stock_movements m
        JOIN documents n ON n.id = m.document_id
        WHERE n.affected_document_id = ?1
          AND n.doc_type = 'credit_note'
          AND m.kind = 'ingreso'
        GROUP BY m.product_id
        "#,
    )
    .bind(affected_id)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

/// Movements of one kind linked to a document, in posting order.
pub async fn by_document<'e, E>(executor: E, document_id: &str, kind: MovementKind) -> DbResult<Vec<StockMovement>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        r#"
        SELECT {} FROM stock_movements
        WHERE document_id = ?1 AND kind = ?2
        ORDER BY seq
        "#,
        COLUMNS
    );
    let movements = sqlx::query_as::<_, StockMovement>(&sql)
        .bind(document_id)
        .bind(kind)
        .fetch_all(executor)
        .await?;

    Ok(movements)
}

// =============================================================================
// Unit Tests
// =============================================================================
