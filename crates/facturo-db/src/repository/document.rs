//! # Document Repository
//!
//! Documents, their lines, and the conditional updates that move a
//! document through its lifecycle.
//!
//! ## Document Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  formal:    insert(PENDING_SUBMISSION) ──► update_submission()          │
//! │                                              ├── ACCEPTED              │
//! │                                              ├── REJECTED              │
//! │                                              └── PENDING (poll later)   │
//! │                                                                         │
//! │  informal:  insert(ISSUED) ──► apply_payment() ... ──► PAID             │
//! │                                                                         │
//! │  ISSUED / ACCEPTED ──► mark_voided() ──► VOIDED                         │
//! │                                                                         │
//! │  Every transition is a conditional UPDATE on the current state, so a   │
//! │  sweep and a call-time poll racing on the same document cannot both    │
//! │  win. rows_affected() == 0 means somebody else got there first.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqliteExecutor;
use tracing::debug;

use crate::error::DbResult;
use crate::repository::sql_limit;
use facturo_core::{Document, DocumentLine, DocumentQuery, DocumentState};

const COLUMNS: &str = r#"
    id, merchant_id, doc_type, series, correlative, customer_id, issue_date,
    currency, taxed_cents, exempt_cents, igv_cents, total_cents, balance_cents,
    settlement, state, remote_id, submission_attempts, error_message, xml_ref,
    cdr_ref, affected_document_id, affected_doc_type, motive_code,
    effects_applied_at, created_at, updated_at, voided_at
"#;

/// Motive codes whose notes cancel the affected document in reports.
const CANCELLING_MOTIVES: &str = "('01', '06')";

// =============================================================================
// Inserts
// =============================================================================

/// Inserts a document header.
pub async fn insert<'e, E>(executor: E, doc: &Document) -> DbResult<()>
where
    E: SqliteExecutor<'e>,
{
    debug!(
        id = %doc.id,
        number = %doc.number(),
        state = %doc.state,
        "Inserting document"
    );

    sqlx::query(
        r#"
        INSERT INTO documents (
            id, merchant_id, doc_type, series, correlative, customer_id, issue_date,
            currency, taxed_cents, exempt_cents, igv_cents, total_cents, balance_cents,
            settlement, state, remote_id, submission_attempts, error_message, xml_ref,
            cdr_ref, affected_document_id, affected_doc_type, motive_code,
            effects_applied_at, created_at, updated_at, voided_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
            ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27
        )
        "#,
    )
    .bind(&doc.id)
    .bind(&doc.merchant_id)
    .bind(doc.doc_type)
    .bind(&doc.series)
    .bind(doc.correlative)
    .bind(&doc.customer_id)
    .bind(doc.issue_date)
    .bind(&doc.currency)
    .bind(doc.taxed_cents)
    .bind(doc.exempt_cents)
    .bind(doc.igv_cents)
    .bind(doc.total_cents)
    .bind(doc.balance_cents)
    .bind(doc.settlement)
    .bind(doc.state)
    .bind(&doc.remote_id)
    .bind(doc.submission_attempts)
    .bind(&doc.error_message)
    .bind(&doc.xml_ref)
    .bind(&doc.cdr_ref)
    .bind(&doc.affected_document_id)
    .bind(doc.affected_doc_type)
    .bind(&doc.motive_code)
    .bind(doc.effects_applied_at)
    .bind(doc.created_at)
    .bind(doc.updated_at)
    .bind(doc.voided_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Inserts one document line.
pub async fn insert_line<'e, E>(executor: E, line: &DocumentLine) -> DbResult<()>
where
    E: SqliteExecutor<'e>,
{
    debug!(
        document_id = %line.document_id,
        line_number = line.line_number,
        quantity = line.quantity,
        "Inserting document line"
    );

    sqlx::query(
        r#"
        INSERT INTO document_lines (
            id, document_id, line_number, product_id, description, quantity,
            unit_price_cents, unit_value_cents, line_value_cents, tax_rate_bps,
            tax_cents, total_cents
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
    )
    .bind(&line.id)
    .bind(&line.document_id)
    .bind(line.line_number)
    .bind(&line.product_id)
    .bind(&line.description)
    .bind(line.quantity)
    .bind(line.unit_price_cents)
    .bind(line.unit_value_cents)
    .bind(line.line_value_cents)
    .bind(line.tax_rate_bps)
    .bind(line.tax_cents)
    .bind(line.total_cents)
    .execute(executor)
    .await?;

    Ok(())
}

// =============================================================================
// Reads
// =============================================================================

/// Gets a document by ID.
pub async fn get<'e, E>(executor: E, id: &str) -> DbResult<Option<Document>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!("SELECT {} FROM documents WHERE id = ?1", COLUMNS);
    let doc = sqlx::query_as::<_, Document>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;

    Ok(doc)
}

/// Gets the lines of a document in line order.
pub async fn lines<'e, E>(executor: E, document_id: &str) -> DbResult<Vec<DocumentLine>>
where
    E: SqliteExecutor<'e>,
{
    let lines = sqlx::query_as::<_, DocumentLine>(
        r#"
        SELECT id, document_id, line_number, product_id, description, quantity,
               unit_price_cents, unit_value_cents, line_value_cents, tax_rate_bps,
               tax_cents, total_cents
        FROM document_lines
        WHERE document_id = ?1
        ORDER BY line_number
        "#,
    )
    .bind(document_id)
    .fetch_all(executor)
    .await?;

    Ok(lines)
}

/// Lists a merchant's documents, newest first.
///
/// Type, state and the issue-date range are optional filters; the range is
/// inclusive on both ends.
pub async fn list<'e, E>(executor: E, query: &DocumentQuery) -> DbResult<Vec<Document>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        r#"
        SELECT {} FROM documents
        WHERE merchant_id = ?1
          AND (?2 IS NULL OR doc_type = ?2)
          AND (?3 IS NULL OR state = ?3)
          AND (?4 IS NULL OR issue_date >= ?4)
          AND (?5 IS NULL OR issue_date <= ?5)
        ORDER BY issue_date DESC, correlative DESC
        LIMIT ?6 OFFSET ?7
        "#,
        COLUMNS
    );
    let docs = sqlx::query_as::<_, Document>(&sql)
        .bind(&query.merchant_id)
        .bind(query.doc_type)
        .bind(query.state)
        .bind(query.from)
        .bind(query.to)
        .bind(sql_limit(query.limit))
        .bind(query.offset as i64)
        .fetch_all(executor)
        .await?;

    Ok(docs)
}

/// Every document of a merchant issued within the range, for reporting.
///
/// Filters on the issue date only. A note issued inside the range comes
/// back without its affected document when that one was issued earlier.
pub async fn list_for_summary<'e, E>(
    executor: E,
    merchant_id: &str,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> DbResult<Vec<Document>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        r#"
        SELECT {} FROM documents
        WHERE merchant_id = ?1
          AND (?2 IS NULL OR issue_date >= ?2)
          AND (?3 IS NULL OR issue_date <= ?3)
        ORDER BY issue_date, correlative
        "#,
        COLUMNS
    );
    let docs = sqlx::query_as::<_, Document>(&sql)
        .bind(merchant_id)
        .bind(from)
        .bind(to)
        .fetch_all(executor)
        .await?;

    Ok(docs)
}

/// Documents awaiting a verdict that the authority already knows about,
/// least recently touched first.
pub async fn pending_with_remote<'e, E>(executor: E, limit: u32) -> DbResult<Vec<Document>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        r#"
        SELECT {} FROM documents
        WHERE state = 'pending_submission' AND remote_id IS NOT NULL
        ORDER BY updated_at
        LIMIT ?1
        "#,
        COLUMNS
    );
    let docs = sqlx::query_as::<_, Document>(&sql)
        .bind(sql_limit(limit))
        .fetch_all(executor)
        .await?;

    Ok(docs)
}

/// Accepted notes whose effects were never applied (e.g. the process
/// stopped between the verdict and the effects).
pub async fn notes_awaiting_effects<'e, E>(executor: E, limit: u32) -> DbResult<Vec<Document>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        r#"
        SELECT {} FROM documents
        WHERE state = 'accepted'
          AND doc_type IN ('credit_note', 'debit_note')
          AND effects_applied_at IS NULL
        ORDER BY updated_at
        LIMIT ?1
        "#,
        COLUMNS
    );
    let docs = sqlx::query_as::<_, Document>(&sql)
        .bind(sql_limit(limit))
        .fetch_all(executor)
        .await?;

    Ok(docs)
}

/// Live credit notes against a document (not rejected or voided).
pub async fn credit_notes_for<'e, E>(executor: E, affected_id: &str) -> DbResult<Vec<Document>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        r#"
        SELECT {} FROM documents
        WHERE affected_document_id = ?1
          AND doc_type = 'credit_note'
          AND state IN ('pending_submission', 'accepted')
        ORDER BY created_at
        "#,
        COLUMNS
    );
    let docs = sqlx::query_as::<_, Document>(&sql)
        .bind(affected_id)
        .fetch_all(executor)
        .await?;

    Ok(docs)
}

/// Quantities already returned per product by live return notes
/// (motives 06 and 07) against a document.
pub async fn returned_quantities<'e, E>(executor: E, affected_id: &str) -> DbResult<Vec<(String, i64)>>
where
    E: SqliteExecutor<'e>,
{
    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT l.product_id, SUM(l.quantity)
        FROM document_lines l
        JOIN documents d ON d.id = l.document_id
        WHERE d.affected_document_id = ?1
          AND d.doc_type = 'credit_note'
          AND d.motive_code IN ('06', '07')
          AND d.state IN ('pending_submission', 'accepted')
          AND l.product_id IS NOT NULL
        GROUP BY l.product_id
        "#,
    )
    .bind(affected_id)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

/// True if a live cancellation note (motive 01 or 06) targets the document.
pub async fn has_cancellation<'e, E>(executor: E, affected_id: &str) -> DbResult<bool>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        r#"
        SELECT COUNT(*) FROM documents
        WHERE affected_document_id = ?1
          AND doc_type = 'credit_note'
          AND motive_code IN {}
          AND state IN ('pending_submission', 'accepted')
        "#,
        CANCELLING_MOTIVES
    );
    let count: i64 = sqlx::query_scalar(&sql)
        .bind(affected_id)
        .fetch_one(executor)
        .await?;

    Ok(count > 0)
}

// =============================================================================
// Conditional Updates
// =============================================================================

/// Counts a submission attempt while the document is still pending.
pub async fn mark_submission_attempt<'e, E>(executor: E, id: &str, now: DateTime<Utc>) -> DbResult<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE documents
        SET submission_attempts = submission_attempts + 1, updated_at = ?2
        WHERE id = ?1 AND state = 'pending_submission'
        "#,
    )
    .bind(id)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Outcome of one exchange with the tax authority.
#[derive(Debug, Clone, Default)]
pub struct SubmissionUpdate {
    pub state: Option<DocumentState>,
    pub remote_id: Option<String>,
    pub xml_ref: Option<String>,
    pub cdr_ref: Option<String>,
    pub error_message: Option<String>,
}

/// Records an authority response on a pending document.
///
/// `None` fields keep their stored value, except `error_message`, which is
/// always overwritten so an acceptance clears an earlier transport error.
/// Returns false when the document already left `pending_submission`.
pub async fn update_submission<'e, E>(
    executor: E,
    id: &str,
    update: &SubmissionUpdate,
    now: DateTime<Utc>,
) -> DbResult<bool>
where
    E: SqliteExecutor<'e>,
{
    debug!(
        id = %id,
        state = ?update.state,
        remote_id = ?update.remote_id,
        "Recording submission result"
    );

    let result = sqlx::query(
        r#"
        UPDATE documents
        SET state = COALESCE(?2, state),
            remote_id = COALESCE(?3, remote_id),
            xml_ref = COALESCE(?4, xml_ref),
            cdr_ref = COALESCE(?5, cdr_ref),
            error_message = ?6,
            updated_at = ?7
        WHERE id = ?1 AND state = 'pending_submission'
        "#,
    )
    .bind(id)
    .bind(update.state)
    .bind(&update.remote_id)
    .bind(&update.xml_ref)
    .bind(&update.cdr_ref)
    .bind(&update.error_message)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Records a transport or setup failure without changing the state.
pub async fn record_error<'e, E>(executor: E, id: &str, message: &str, now: DateTime<Utc>) -> DbResult<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE documents SET error_message = ?2, updated_at = ?3
        WHERE id = ?1 AND state = 'pending_submission'
        "#,
    )
    .bind(id)
    .bind(message)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Voids an issued or accepted document.
///
/// With `clear_balance` the outstanding balance is forced to zero.
/// Returns false when the document was not in a voidable state.
pub async fn mark_voided<'e, E>(
    executor: E,
    id: &str,
    clear_balance: bool,
    now: DateTime<Utc>,
) -> DbResult<bool>
where
    E: SqliteExecutor<'e>,
{
    debug!(id = %id, clear_balance, "Voiding document");

    let result = sqlx::query(
        r#"
        UPDATE documents
        SET state = 'voided',
            balance_cents = CASE WHEN ?2 THEN 0 ELSE balance_cents END,
            voided_at = ?3,
            updated_at = ?3
        WHERE id = ?1 AND state IN ('issued', 'accepted')
        "#,
    )
    .bind(id)
    .bind(clear_balance)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Decrements the balance if it covers `amount_cents`.
///
/// Settlement flips to `paid` at zero and `partial` otherwise. Returns the
/// new balance, or `None` when the guard failed (balance too small or the
/// document is not payable).
pub async fn apply_payment<'e, E>(
    executor: E,
    id: &str,
    amount_cents: i64,
    now: DateTime<Utc>,
) -> DbResult<Option<i64>>
where
    E: SqliteExecutor<'e>,
{
    let balance: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE documents
        SET balance_cents = balance_cents - ?2,
            settlement = CASE WHEN balance_cents - ?2 = 0 THEN 'paid' ELSE 'partial' END,
            updated_at = ?3
        WHERE id = ?1
          AND balance_cents >= ?2
          AND state IN ('pending_submission', 'accepted', 'issued')
        RETURNING balance_cents
        "#,
    )
    .bind(id)
    .bind(amount_cents)
    .bind(now)
    .fetch_optional(executor)
    .await?;

    Ok(balance)
}

/// Claims the right to apply an accepted note's effects.
///
/// Only one caller ever gets `true` for a given note.
pub async fn claim_effects<'e, E>(executor: E, id: &str, now: DateTime<Utc>) -> DbResult<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE documents SET effects_applied_at = ?2, updated_at = ?2
        WHERE id = ?1 AND state = 'accepted' AND effects_applied_at IS NULL
        "#,
    )
    .bind(id)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Notes on a claimed note why its effects did nothing.
pub async fn annotate_effects<'e, E>(executor: E, id: &str, message: &str, now: DateTime<Utc>) -> DbResult<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE documents SET error_message = ?2, updated_at = ?3
        WHERE id = ?1 AND effects_applied_at IS NOT NULL
        "#,
    )
    .bind(id)
    .bind(message)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Moves an unclaimed note to the back of the effects queue.
pub async fn defer_effects<'e, E>(executor: E, id: &str, now: DateTime<Utc>) -> DbResult<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE documents SET updated_at = ?2
        WHERE id = ?1 AND state = 'accepted' AND effects_applied_at IS NULL
        "#,
    )
    .bind(id)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

// =============================================================================
// Unit Tests
// =============================================================================
