//! # Engine Facade
//!
//! One entry point wiring the services together.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Engine                                                                 │
//! │    issue_formal / issue_note ──► lifecycle / adjuster ──► reconciler    │
//! │                                  (persist, post stock)    (submit when  │
//! │                                                           configured)   │
//! │    issue_informal, void, settle_partial ──► DocumentLifecycle           │
//! │    register_product, post, current_stock, reconcile ──► InventoryLedger │
//! │    next_number ──► SequenceAllocator                                    │
//! │    submit, retry_submission, sweep_once, sweeper ──► Reconciler         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failed submission never undoes an issuance: the caller gets the
//! persisted document inside a pending [`IssueOutcome`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use facturo_core::kardex::ReconcileReport;
use facturo_core::summary::AccountingSummary;
use facturo_core::{
    Document, DocumentLine, DocumentQuery, DocumentType, IssueRequest, MovementQuery, NewProduct,
    NoteRequest, Payment, PaymentMedium, Product, StockMovement, StockReading, ValuationRow,
};
use facturo_db::Database;

use crate::adjuster::CreditDebitAdjuster;
use crate::authority::SandboxAuthority;
use crate::config::{EngineConfig, IssuanceSettings};
use crate::directory::DbPartyDirectory;
use crate::error::EngineResult;
use crate::ledger::{InventoryLedger, MovementRequest};
use crate::lifecycle::DocumentLifecycle;
use crate::notifier::TracingNotifier;
use crate::ports::{NotificationSink, PartyDirectory, TaxAuthorityClient};
use crate::reconciler::{IssueOutcome, RetryPolicy, SubmissionReconciler, SweepReport, Sweeper, SweeperHandle};
use crate::sequence::SequenceAllocator;

/// Facade over the issuance, kardex and submission services.
#[derive(Clone)]
pub struct Engine {
    sequences: SequenceAllocator,
    adjuster: CreditDebitAdjuster,
    reconciler: SubmissionReconciler,
    submit_on_issue: bool,
}

impl Engine {
    pub fn new(
        db: Database,
        authority: Arc<dyn TaxAuthorityClient>,
        notifier: Arc<dyn NotificationSink>,
        directory: Arc<dyn PartyDirectory>,
        issuance: IssuanceSettings,
        policy: RetryPolicy,
        batch_size: u32,
    ) -> Self {
        let submit_on_issue = issuance.submit_on_issue;
        let ledger = InventoryLedger::new(db.clone(), notifier);
        let lifecycle = DocumentLifecycle::new(db.clone(), directory, ledger, issuance);
        let adjuster = CreditDebitAdjuster::new(db.clone(), lifecycle);
        let reconciler = SubmissionReconciler::new(db.clone(), authority, adjuster.clone(), policy, batch_size);

        Engine {
            sequences: SequenceAllocator::new(db),
            adjuster,
            reconciler,
            submit_on_issue,
        }
    }

    /// Wires the shipped adapters: sandbox authority per config, tracing
    /// notifier and the database party directory.
    ///
    /// ## Errors
    /// - `Config`: the configuration does not validate
    pub fn from_config(config: &EngineConfig, db: Database) -> EngineResult<Self> {
        config.validate()?;

        info!(
            authority = %config.authority,
            submit_on_issue = config.issuance.submit_on_issue,
            max_poll_attempts = config.submission.max_poll_attempts,
            "Engine configured"
        );

        Ok(Engine::new(
            db.clone(),
            Arc::new(SandboxAuthority::new(config.authority.clone())),
            Arc::new(TracingNotifier),
            Arc::new(DbPartyDirectory::new(db)),
            config.issuance.clone(),
            config.retry_policy(),
            config.sweep.batch_size,
        ))
    }

    pub fn lifecycle(&self) -> &DocumentLifecycle {
        self.adjuster.lifecycle()
    }

    pub fn ledger(&self) -> &InventoryLedger {
        self.lifecycle().ledger()
    }

    pub fn reconciler(&self) -> &SubmissionReconciler {
        &self.reconciler
    }

    // =========================================================================
    // Documents
    // =========================================================================

    /// Issues an invoice or ticket and, when configured, submits it.
    pub async fn issue_formal(&self, request: IssueRequest) -> EngineResult<IssueOutcome> {
        let doc = self.lifecycle().issue_formal(request).await?;
        Ok(self.after_issue(doc).await)
    }

    /// Issues a sales note, order or proforma.
    pub async fn issue_informal(&self, request: IssueRequest) -> EngineResult<Document> {
        self.lifecycle().issue_informal(request).await
    }

    /// Issues a credit or debit note and, when configured, submits it.
    pub async fn issue_note(&self, request: NoteRequest) -> EngineResult<IssueOutcome> {
        let note = self.adjuster.issue_note(request).await?;
        Ok(self.after_issue(note).await)
    }

    pub async fn void(&self, document_id: &str) -> EngineResult<Document> {
        self.lifecycle().void(document_id).await
    }

    pub async fn settle_partial(
        &self,
        document_id: &str,
        amount_cents: i64,
        medium: PaymentMedium,
    ) -> EngineResult<Document> {
        self.lifecycle().settle_partial(document_id, amount_cents, medium).await
    }

    pub async fn next_number(
        &self,
        merchant_id: &str,
        doc_type: DocumentType,
        affected: Option<DocumentType>,
    ) -> EngineResult<(String, i64)> {
        self.sequences.next_number(merchant_id, doc_type, affected).await
    }

    pub async fn document(&self, document_id: &str) -> EngineResult<Document> {
        self.lifecycle().document(document_id).await
    }

    pub async fn lines(&self, document_id: &str) -> EngineResult<Vec<DocumentLine>> {
        self.lifecycle().lines(document_id).await
    }

    pub async fn payments(&self, document_id: &str) -> EngineResult<Vec<Payment>> {
        self.lifecycle().payments(document_id).await
    }

    pub async fn list_documents(&self, query: &DocumentQuery) -> EngineResult<Vec<Document>> {
        self.lifecycle().list(query).await
    }

    pub async fn credit_notes(&self, document_id: &str) -> EngineResult<Vec<Document>> {
        self.lifecycle().credit_notes(document_id).await
    }

    pub async fn accounting_summary(
        &self,
        merchant_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> EngineResult<AccountingSummary> {
        self.lifecycle().accounting_summary(merchant_id, from, to).await
    }

    // =========================================================================
    // Kardex
    // =========================================================================

    pub async fn register_product(&self, new: NewProduct) -> EngineResult<Product> {
        self.ledger().register_product(new).await
    }

    pub async fn post(&self, request: MovementRequest) -> EngineResult<StockMovement> {
        self.ledger().post(request).await
    }

    pub async fn current_stock(&self, product_id: &str) -> EngineResult<StockReading> {
        self.ledger().current_stock(product_id).await
    }

    pub async fn movements(&self, product_id: &str, query: &MovementQuery) -> EngineResult<Vec<StockMovement>> {
        self.ledger().movements(product_id, query).await
    }

    pub async fn reconcile(&self, merchant_id: &str) -> EngineResult<ReconcileReport> {
        self.ledger().reconcile(merchant_id).await
    }

    pub async fn valuation(&self, merchant_id: &str) -> EngineResult<Vec<ValuationRow>> {
        self.ledger().valuation(merchant_id).await
    }

    // =========================================================================
    // Submission
    // =========================================================================

    pub async fn submit(&self, document_id: &str) -> EngineResult<IssueOutcome> {
        self.reconciler.submit(document_id).await
    }

    pub async fn retry_submission(&self, document_id: &str) -> EngineResult<IssueOutcome> {
        self.reconciler.retry_submission(document_id).await
    }

    pub async fn sweep_once(&self) -> EngineResult<SweepReport> {
        self.reconciler.sweep_once().await
    }

    /// Background sweep loop over this engine's reconciler.
    pub fn sweeper(&self, interval: Duration) -> (Sweeper, SweeperHandle) {
        Sweeper::new(self.reconciler.clone(), interval)
    }

    async fn after_issue(&self, doc: Document) -> IssueOutcome {
        if !self.submit_on_issue {
            return IssueOutcome::from_document(doc);
        }

        match self.reconciler.submit(&doc.id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(?e, document_id = %doc.id, "Submission after issuance failed");
                IssueOutcome::Pending {
                    document: doc,
                    reason: Some(e.to_string()),
                }
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
