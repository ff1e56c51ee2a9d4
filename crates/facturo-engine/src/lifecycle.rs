//! # Document Lifecycle
//!
//! Issues, voids and settles documents. Every stock and numbering effect of
//! an operation commits in the same transaction as the document itself.
//!
//! ## Issuance
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEFORE THE TRANSACTION (reads only, through the pool)                 │
//! │    lines / currency ─► merchant, customer ─► value_line() per line     │
//! │    ─► totals ─► customer rules ─► opening saldo                        │
//! │                                                                         │
//! │  ONE TRANSACTION                                                       │
//! │    1. SequenceAllocator::allocate   first write: takes the write lock  │
//! │    2. document::insert              PENDING_SUBMISSION or ISSUED       │
//! │    3. document::insert_line × N                                        │
//! │    4. ledger.post_in(SALIDA)        tracked lines only                 │
//! │    5. payment::insert               up-front payment, if any           │
//! │    COMMIT                                                               │
//! │                                                                         │
//! │  AFTER COMMIT: stock alerts. Submission is the reconciler's job.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any failure inside the transaction (insufficient stock, a duplicate
//! correlative) rolls back everything, including the reserved number.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use facturo_core::lifecycle::{ensure_transition, initial_state, opening_balance, settle, validate_customer};
use facturo_core::summary::{accounting_summary, AccountingSummary};
use facturo_core::validation::{validate_currency, validate_line_count};
use facturo_core::valuation::{value_line, DocumentTotals, LineValuation};
use facturo_core::{
    CoreError, Document, DocumentLine, DocumentQuery, DocumentState, IssueRequest, Money,
    MovementKind, Payment, PaymentMedium, Product, SettlementStatus,
};
use facturo_db::repository::{document, movement, payment, product};
use facturo_db::Database;

use crate::config::IssuanceSettings;
use crate::error::{EngineError, EngineResult};
use crate::ledger::{InventoryLedger, MovementRequest, PendingAlert};
use crate::ports::PartyDirectory;
use crate::sequence::SequenceAllocator;

/// Owns the document state machine.
#[derive(Clone)]
pub struct DocumentLifecycle {
    db: Database,
    directory: Arc<dyn PartyDirectory>,
    ledger: InventoryLedger,
    issuance: IssuanceSettings,
}

impl DocumentLifecycle {
    pub fn new(
        db: Database,
        directory: Arc<dyn PartyDirectory>,
        ledger: InventoryLedger,
        issuance: IssuanceSettings,
    ) -> Self {
        DocumentLifecycle {
            db,
            directory,
            ledger,
            issuance,
        }
    }

    pub fn ledger(&self) -> &InventoryLedger {
        &self.ledger
    }

    pub fn directory(&self) -> &Arc<dyn PartyDirectory> {
        &self.directory
    }

    // =========================================================================
    // Issuance
    // =========================================================================

    /// Issues an invoice or ticket in PENDING_SUBMISSION.
    ///
    /// ## Errors
    /// - `InvalidDocumentType`: not an invoice or ticket (notes go through
    ///   the adjuster)
    /// - `CustomerRequired`: invoice without a RUC customer, or a ticket
    ///   above S/ 700 without an identified customer
    /// - `InsufficientStock`: a tracked line exceeds the stock
    pub async fn issue_formal(&self, request: IssueRequest) -> EngineResult<Document> {
        if !request.doc_type.is_formal() || request.doc_type.is_note() {
            return Err(CoreError::InvalidDocumentType(request.doc_type.to_string()).into());
        }
        self.issue(request).await
    }

    /// Issues a sales note or order in ISSUED.
    pub async fn issue_informal(&self, request: IssueRequest) -> EngineResult<Document> {
        if request.doc_type.is_formal() {
            return Err(CoreError::InvalidDocumentType(request.doc_type.to_string()).into());
        }
        self.issue(request).await
    }

    async fn issue(&self, request: IssueRequest) -> EngineResult<Document> {
        validate_line_count(request.lines.len()).map_err(CoreError::from)?;
        let currency = request
            .currency
            .clone()
            .unwrap_or_else(|| self.issuance.default_currency.clone());
        validate_currency(&currency).map_err(CoreError::from)?;

        let merchant = self
            .directory
            .merchant(&request.merchant_id)
            .await?
            .filter(|m| m.is_active)
            .ok_or_else(|| EngineError::UnknownMerchant(request.merchant_id.clone()))?;

        let customer = match &request.customer_id {
            Some(id) => Some(
                self.directory
                    .customer(&merchant.id, id)
                    .await?
                    .ok_or_else(|| EngineError::UnknownCustomer(id.clone()))?,
            ),
            None => None,
        };

        let mut priced: Vec<(Product, LineValuation)> = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let item = product::get(self.db.pool(), &line.product_id)
                .await?
                .ok_or_else(|| CoreError::UnknownProduct(line.product_id.clone()))?;
            let valuation = value_line(
                &item,
                &merchant.id,
                line.quantity,
                line.unit_price_cents,
                line.discount_bps,
            )?;
            priced.push((item, valuation));
        }

        let totals = DocumentTotals::from_valuations(priced.iter().map(|(_, v)| v));
        validate_customer(request.doc_type, customer.as_ref(), totals.total)?;

        let medium = request.payment_medium.unwrap_or_default();
        let opening = opening_balance(totals.total, medium, request.advance_cents)?;

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let (series, correlative) =
            SequenceAllocator::allocate(&mut tx, &merchant.id, request.doc_type, None).await?;

        let doc = Document {
            id: Uuid::new_v4().to_string(),
            merchant_id: merchant.id.clone(),
            doc_type: request.doc_type,
            series: series.to_string(),
            correlative,
            customer_id: customer.as_ref().map(|c| c.id.clone()),
            issue_date: now,
            currency,
            taxed_cents: totals.taxed.cents(),
            exempt_cents: totals.exempt.cents(),
            igv_cents: totals.igv.cents(),
            total_cents: totals.total.cents(),
            balance_cents: opening.balance.cents(),
            settlement: SettlementStatus::from_balance(opening.balance, totals.total),
            state: initial_state(request.doc_type),
            remote_id: None,
            submission_attempts: 0,
            error_message: None,
            xml_ref: None,
            cdr_ref: None,
            affected_document_id: None,
            affected_doc_type: None,
            motive_code: None,
            effects_applied_at: None,
            created_at: now,
            updated_at: now,
            voided_at: None,
        };
        document::insert(&mut *tx, &doc).await?;

        let mut alerts = Vec::new();
        for (index, (item, valuation)) in priced.iter().enumerate() {
            let line = valuation.to_line(&doc.id, index as i64 + 1, Some(item.id.clone()), item.name.clone());
            document::insert_line(&mut *tx, &line).await?;

            if item.track_inventory {
                let sale = MovementRequest::new(&item.id, &merchant.id, MovementKind::Salida, valuation.quantity)
                    .document(&doc.id)
                    .note(format!("Venta {}", doc.number()));
                let posted = self.ledger.post_in(&mut tx, &sale).await?;
                alerts.extend(posted.alert);
            }
        }

        if let Some(amount) = opening.payment {
            record_payment(&mut tx, &doc.id, amount, medium, now).await?;
        }

        tx.commit().await?;
        self.ledger.dispatch(alerts).await;

        info!(
            document_id = %doc.id,
            number = %doc.number(),
            doc_type = %doc.doc_type,
            total = %doc.total(),
            balance = %doc.balance(),
            "Document issued"
        );

        Ok(doc)
    }

    // =========================================================================
    // Voiding
    // =========================================================================

    /// Voids an ISSUED or ACCEPTED document and returns its stock.
    ///
    /// Each SALIDA posted for the document is reversed by an INGRESO at the
    /// SALIDA's unit cost, less whatever accepted return notes already put
    /// back. Informal documents also get their saldo cleared.
    ///
    /// ## Errors
    /// - `DocumentNotFound`
    /// - `AlreadyVoided`: voiding twice
    /// - `InvalidStateTransition`: still pending, or rejected
    pub async fn void(&self, document_id: &str) -> EngineResult<Document> {
        let current = self.document(document_id).await?;
        ensure_transition(&current, DocumentState::Voided)?;

        let mut tx = self.db.begin().await?;
        let alerts = self.void_in(&mut tx, &current).await?;
        tx.commit().await?;
        self.ledger.dispatch(alerts).await;

        info!(document_id = %current.id, number = %current.number(), "Document voided");

        self.document(document_id).await
    }

    /// Voids inside the caller's transaction.
    ///
    /// The conditional state update runs first, so a concurrent void loses
    /// before any stock moves.
    pub async fn void_in(
        &self,
        conn: &mut SqliteConnection,
        doc: &Document,
    ) -> EngineResult<Vec<PendingAlert>> {
        let now = Utc::now();

        if !document::mark_voided(&mut *conn, &doc.id, !doc.doc_type.is_formal(), now).await? {
            let fresh = document::get(&mut *conn, &doc.id)
                .await?
                .ok_or_else(|| CoreError::DocumentNotFound(doc.id.clone()))?;
            ensure_transition(&fresh, DocumentState::Voided)?;
            return Err(CoreError::InvalidStateTransition {
                document_id: doc.id.clone(),
                from: fresh.state.to_string(),
                to: DocumentState::Voided.to_string(),
            }
            .into());
        }

        let mut alerts = Vec::new();
        if doc.doc_type.is_note() {
            return Ok(alerts);
        }

        let sales = movement::by_document(&mut *conn, &doc.id, MovementKind::Salida).await?;
        let mut restocked: HashMap<String, i64> =
            movement::restocked_by_notes(&mut *conn, &doc.id).await?.into_iter().collect();

        let mut reversed = 0;
        for sale in &sales {
            let sold = -sale.quantity;
            let returned = match restocked.get_mut(&sale.product_id) {
                Some(left) => {
                    let taken = (*left).min(sold);
                    *left -= taken;
                    taken
                }
                None => 0,
            };
            if sold == returned {
                continue;
            }

            let reversal = MovementRequest::new(&sale.product_id, &sale.merchant_id, MovementKind::Ingreso, sold - returned)
                .unit_cost(sale.unit_cost)
                .document(&doc.id)
                .note(format!("Anulación {}", doc.number()));
            let posted = self.ledger.post_in(&mut *conn, &reversal).await?;
            alerts.extend(posted.alert);
            reversed += 1;
        }

        debug!(document_id = %doc.id, reversed, "Stock reversed");

        Ok(alerts)
    }

    // =========================================================================
    // Settlement
    // =========================================================================

    /// Records a partial payment and lowers the saldo.
    ///
    /// ## Errors
    /// - `InvalidPaymentAmount`: `amount <= 0`
    /// - `InsufficientBalance`: `amount` above the saldo; nothing changes
    /// - `AlreadyVoided` / `InvalidStateTransition`: document not payable
    pub async fn settle_partial(
        &self,
        document_id: &str,
        amount_cents: i64,
        medium: PaymentMedium,
    ) -> EngineResult<Document> {
        let amount = Money::from_cents(amount_cents);
        let current = self.document(document_id).await?;
        settle(&current, amount)?;

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let Some(balance) = document::apply_payment(&mut *tx, document_id, amount_cents, now).await? else {
            // Lost a race: report what the document looks like now
            drop(tx);
            let fresh = self.document(document_id).await?;
            settle(&fresh, amount)?;
            return Err(CoreError::InsufficientBalance {
                document_id: document_id.to_string(),
                balance: fresh.balance_cents,
                requested: amount_cents,
            }
            .into());
        };

        record_payment(&mut tx, document_id, amount, medium, now).await?;
        tx.commit().await?;

        info!(document_id = %document_id, amount = %amount, balance, "Payment recorded");

        self.document(document_id).await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn document(&self, document_id: &str) -> EngineResult<Document> {
        document::get(self.db.pool(), document_id)
            .await?
            .ok_or_else(|| CoreError::DocumentNotFound(document_id.to_string()).into())
    }

    pub async fn lines(&self, document_id: &str) -> EngineResult<Vec<DocumentLine>> {
        Ok(document::lines(self.db.pool(), document_id).await?)
    }

    pub async fn payments(&self, document_id: &str) -> EngineResult<Vec<Payment>> {
        Ok(payment::for_document(self.db.pool(), document_id).await?)
    }

    pub async fn list(&self, query: &DocumentQuery) -> EngineResult<Vec<Document>> {
        Ok(document::list(self.db.pool(), query).await?)
    }

    /// Credit notes issued against a document, oldest first.
    pub async fn credit_notes(&self, document_id: &str) -> EngineResult<Vec<Document>> {
        Ok(document::credit_notes_for(self.db.pool(), document_id).await?)
    }

    /// Totals of a merchant's documents issued in `[from, to]`.
    pub async fn accounting_summary(
        &self,
        merchant_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> EngineResult<AccountingSummary> {
        let documents = document::list_for_summary(self.db.pool(), merchant_id, from, to).await?;
        Ok(accounting_summary(&documents))
    }
}

async fn record_payment(
    conn: &mut SqliteConnection,
    document_id: &str,
    amount: Money,
    medium: PaymentMedium,
    now: DateTime<Utc>,
) -> EngineResult<()> {
    payment::insert(
        &mut *conn,
        &Payment {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            amount_cents: amount.cents(),
            medium,
            created_at: now,
        },
    )
    .await?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
