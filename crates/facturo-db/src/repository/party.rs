//! # Party Repository
//!
//! Merchants and customers. The engine only reads them; inserts exist for
//! the seed binary and tests.

use sqlx::SqliteExecutor;
use tracing::debug;

use crate::error::DbResult;
use facturo_core::{Customer, Merchant};

/// Gets a merchant by ID.
pub async fn merchant<'e, E>(executor: E, id: &str) -> DbResult<Option<Merchant>>
where
    E: SqliteExecutor<'e>,
{
    let merchant = sqlx::query_as::<_, Merchant>(
        "SELECT id, ruc, business_name, is_active FROM merchants WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(merchant)
}

/// Gets a customer of a merchant.
pub async fn customer<'e, E>(executor: E, merchant_id: &str, id: &str) -> DbResult<Option<Customer>>
where
    E: SqliteExecutor<'e>,
{
    let customer = sqlx::query_as::<_, Customer>(
        r#"
        SELECT id, merchant_id, identity_kind, identity_number, name
        FROM customers
        WHERE id = ?1 AND merchant_id = ?2
        "#,
    )
    .bind(id)
    .bind(merchant_id)
    .fetch_optional(executor)
    .await?;

    Ok(customer)
}

pub async fn insert_merchant<'e, E>(executor: E, merchant: &Merchant) -> DbResult<()>
where
    E: SqliteExecutor<'e>,
{
    debug!(id = %merchant.id, ruc = %merchant.ruc, "Inserting merchant");

    sqlx::query("INSERT INTO merchants (id, ruc, business_name, is_active) VALUES (?1, ?2, ?3, ?4)")
        .bind(&merchant.id)
        .bind(&merchant.ruc)
        .bind(&merchant.business_name)
        .bind(merchant.is_active)
        .execute(executor)
        .await?;

    Ok(())
}

pub async fn insert_customer<'e, E>(executor: E, customer: &Customer) -> DbResult<()>
where
    E: SqliteExecutor<'e>,
{
    debug!(id = %customer.id, "Inserting customer");

    sqlx::query(
        r#"
        INSERT INTO customers (id, merchant_id, identity_kind, identity_number, name)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(&customer.id)
    .bind(&customer.merchant_id)
    .bind(customer.identity_kind)
    .bind(&customer.identity_number)
    .bind(&customer.name)
    .execute(executor)
    .await?;

    Ok(())
}
