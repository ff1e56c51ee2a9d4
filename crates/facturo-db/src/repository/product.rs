//! # Product Repository
//!
//! Product catalog access, plus the two writes the kardex needs.
//!
//! ## Stock Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  current_stock / average_cost are a CACHE of the latest movement.      │
//! │                                                                         │
//! │  Only the kardex posting routine calls update_stock(), always in the   │
//! │  same transaction as the movement insert:                              │
//! │                                                                         │
//! │     lock(tx, id) ─► latest movement ─► compute ─► movement::insert     │
//! │                                                ─► update_stock(tx)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqliteExecutor;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::sql_limit;
use facturo_core::Product;

const COLUMNS: &str = r#"
    id, merchant_id, code, name, price_cents, tax_rate_bps, track_inventory,
    current_stock, average_cost, min_stock, max_stock, is_active,
    created_at, updated_at
"#;

/// Inserts a new product.
///
/// ## Errors
/// `UniqueViolation` when the merchant already has a product with this code.
pub async fn insert<'e, E>(executor: E, product: &Product) -> DbResult<()>
where
    E: SqliteExecutor<'e>,
{
    debug!(id = %product.id, code = %product.code, "Inserting product");

    sqlx::query(
        r#"
        INSERT INTO products (
            id, merchant_id, code, name, price_cents, tax_rate_bps, track_inventory,
            current_stock, average_cost, min_stock, max_stock, is_active,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(&product.id)
    .bind(&product.merchant_id)
    .bind(&product.code)
    .bind(&product.name)
    .bind(product.price_cents)
    .bind(product.tax_rate_bps)
    .bind(product.track_inventory)
    .bind(product.current_stock)
    .bind(product.average_cost)
    .bind(product.min_stock)
    .bind(product.max_stock)
    .bind(product.is_active)
    .bind(product.created_at)
    .bind(product.updated_at)
    .execute(executor)
    .await
    .map_err(|e| match DbError::from(e) {
        DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
            field,
            value: product.code.clone(),
        },
        other => other,
    })?;

    Ok(())
}

/// Gets a product by its ID.
pub async fn get<'e, E>(executor: E, id: &str) -> DbResult<Option<Product>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!("SELECT {} FROM products WHERE id = ?1", COLUMNS);
    let product = sqlx::query_as::<_, Product>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;

    Ok(product)
}

/// Gets a product by merchant and code.
pub async fn get_by_code<'e, E>(executor: E, merchant_id: &str, code: &str) -> DbResult<Option<Product>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        "SELECT {} FROM products WHERE merchant_id = ?1 AND code = ?2",
        COLUMNS
    );
    let product = sqlx::query_as::<_, Product>(&sql)
        .bind(merchant_id)
        .bind(code)
        .fetch_optional(executor)
        .await?;

    Ok(product)
}

/// Lists a merchant's active products ordered by code.
pub async fn list_by_merchant<'e, E>(
    executor: E,
    merchant_id: &str,
    limit: u32,
    offset: u32,
) -> DbResult<Vec<Product>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        r#"
        SELECT {} FROM products
        WHERE merchant_id = ?1 AND is_active = 1
        ORDER BY code
        LIMIT ?2 OFFSET ?3
        "#,
        COLUMNS
    );
    let products = sqlx::query_as::<_, Product>(&sql)
        .bind(merchant_id)
        .bind(sql_limit(limit))
        .bind(offset as i64)
        .fetch_all(executor)
        .await?;

    Ok(products)
}

/// Counts a merchant's active products.
pub async fn count<'e, E>(executor: E, merchant_id: &str) -> DbResult<i64>
where
    E: SqliteExecutor<'e>,
{
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE merchant_id = ?1 AND is_active = 1")
            .bind(merchant_id)
            .fetch_one(executor)
            .await?;

    Ok(count)
}

/// Takes the write lock for a product inside a transaction.
///
/// SQLite has no row locks; a no-op UPDATE upgrades the transaction to a
/// writer so concurrent postings for the same product serialize here
/// instead of failing on commit. Returns false if the product does not exist.
pub async fn lock<'e, E>(executor: E, id: &str) -> DbResult<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("UPDATE products SET updated_at = updated_at WHERE id = ?1")
        .bind(id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() == 1)
}

/// Writes the cached stock and average cost after a movement.
pub async fn update_stock<'e, E>(
    executor: E,
    id: &str,
    current_stock: i64,
    average_cost: i64,
    now: DateTime<Utc>,
) -> DbResult<()>
where
    E: SqliteExecutor<'e>,
{
    debug!(id = %id, current_stock, average_cost, "Updating product stock");

    let result = sqlx::query(
        "UPDATE products SET current_stock = ?2, average_cost = ?3, updated_at = ?4 WHERE id = ?1",
    )
    .bind(id)
    .bind(current_stock)
    .bind(average_cost)
    .bind(now)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", id));
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
