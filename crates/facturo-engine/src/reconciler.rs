//! # Submission Reconciler
//!
//! Moves formal documents from PENDING_SUBMISSION to a verdict.
//!
//! ## Submission Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  submit(id)                                                             │
//! │    │                                                                    │
//! │    ├── not pending ─────────────────────────────► outcome from state   │
//! │    ├── has remote_id ──► poll_until_terminal ──┐                        │
//! │    └── build payload ──► authority.submit ─────┤                        │
//! │          │ setup error        │ transport error│                        │
//! │          ▼                    ▼                ▼                        │
//! │     error_message        error_message    update_submission             │
//! │     (stays pending)      (stays pending)  (WHERE pending) ──► won?      │
//! │                                                    │                    │
//! │                                   accepted note ◄──┘                    │
//! │                                         │                               │
//! │                                         ▼                               │
//! │                      CreditDebitAdjuster::apply_accepted_effects        │
//! │                                                                         │
//! │  Sweeper (own interval) ──► sweep_once()                                │
//! │    • re-polls pending documents that already have a remote_id          │
//! │    • re-applies effects of accepted notes that never got them          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every state write is conditional on the document still being pending,
//! so a call-time poll and the sweep can race without double-applying.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use facturo_core::{CoreError, Document, DocumentState};
use facturo_db::repository::document::{self, SubmissionUpdate};
use facturo_db::Database;

use crate::adjuster::CreditDebitAdjuster;
use crate::error::{EngineError, EngineResult};
use crate::ports::{AuthorityResponse, AuthorityStatus, SubmissionPayload, TaxAuthorityClient};

// =============================================================================
// Retry Policy
// =============================================================================

/// Call-time polling budget: `max_attempts` status queries, `interval` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            interval: Duration::from_secs(2),
        }
    }
}

/// Polls the authority until it answers with a verdict or the budget runs out.
///
/// Never fails: a transport error becomes a pending answer carrying the
/// error, and the last answer seen is returned when attempts are exhausted.
pub async fn poll_until_terminal(
    authority: &dyn TaxAuthorityClient,
    remote_id: &str,
    policy: &RetryPolicy,
) -> AuthorityResponse {
    let mut last = AuthorityResponse {
        status: AuthorityStatus::Pendiente,
        remote_id: Some(remote_id.to_string()),
        xml: None,
        cdr: None,
        error_message: None,
    };

    for attempt in 1..=policy.max_attempts {
        tokio::time::sleep(policy.interval).await;

        match authority.fetch_status(remote_id).await {
            Ok(response) if response.status.is_terminal() => {
                debug!(remote_id = %remote_id, attempt, status = ?response.status, "Verdict received");
                return response;
            }
            Ok(response) => last = response,
            Err(e) => {
                warn!(?e, remote_id = %remote_id, attempt, "Status query failed");
                last = AuthorityResponse::pending_with_error(remote_id, e.to_string());
            }
        }
    }

    debug!(remote_id = %remote_id, attempts = policy.max_attempts, "Poll budget exhausted");
    last
}

// =============================================================================
// Outcomes
// =============================================================================

/// What a synchronous caller learns about its submission.
#[derive(Debug, Clone)]
pub enum IssueOutcome {
    Accepted(Document),
    /// No verdict yet; `reason` carries the last transport or setup error.
    Pending {
        document: Document,
        reason: Option<String>,
    },
    Rejected {
        document: Document,
        reason: String,
    },
}

impl IssueOutcome {
    /// Reads the outcome off the stored state.
    pub fn from_document(document: Document) -> Self {
        match document.state {
            DocumentState::Accepted | DocumentState::Voided => IssueOutcome::Accepted(document),
            DocumentState::Rejected => IssueOutcome::Rejected {
                reason: document.error_message.clone().unwrap_or_default(),
                document,
            },
            _ => IssueOutcome::Pending {
                reason: document.error_message.clone(),
                document,
            },
        }
    }

    pub fn document(&self) -> &Document {
        match self {
            IssueOutcome::Accepted(document)
            | IssueOutcome::Pending { document, .. }
            | IssueOutcome::Rejected { document, .. } => document,
        }
    }

    pub fn into_document(self) -> Document {
        match self {
            IssueOutcome::Accepted(document)
            | IssueOutcome::Pending { document, .. }
            | IssueOutcome::Rejected { document, .. } => document,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, IssueOutcome::Accepted(_))
    }
}

/// Counters of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub checked: u32,
    pub accepted: u32,
    pub rejected: u32,
    pub still_pending: u32,
    pub errors: u32,
    /// Accepted notes whose effects were applied by this pass.
    pub effects_recovered: u32,
}

// =============================================================================
// Reconciler
// =============================================================================

/// Talks to the tax authority and feeds its answers back into the store.
#[derive(Clone)]
pub struct SubmissionReconciler {
    db: Database,
    authority: Arc<dyn TaxAuthorityClient>,
    adjuster: CreditDebitAdjuster,
    policy: RetryPolicy,
    batch_size: u32,
}

impl SubmissionReconciler {
    pub fn new(
        db: Database,
        authority: Arc<dyn TaxAuthorityClient>,
        adjuster: CreditDebitAdjuster,
        policy: RetryPolicy,
        batch_size: u32,
    ) -> Self {
        SubmissionReconciler {
            db,
            authority,
            adjuster,
            policy,
            batch_size,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Submits a formal document and waits for a verdict within the policy.
    ///
    /// Documents that already left PENDING_SUBMISSION are not sent again;
    /// their stored outcome is returned. A document that already has a
    /// remote id is polled instead of resubmitted.
    ///
    /// ## Errors
    /// - `DocumentNotFound`: unknown id
    /// - `InvalidDocumentType`: informal documents never go to the authority
    /// - `Database`: the store failed (authority failures are not errors)
    pub async fn submit(&self, document_id: &str) -> EngineResult<IssueOutcome> {
        let doc = self.load(document_id).await?;
        if !doc.doc_type.is_formal() {
            return Err(CoreError::InvalidDocumentType(format!(
                "{} documents are not submitted to the tax authority",
                doc.doc_type
            ))
            .into());
        }
        if doc.state != DocumentState::PendingSubmission {
            debug!(document_id = %document_id, state = doc.state.as_str(), "Already past submission");
            return Ok(IssueOutcome::from_document(doc));
        }

        let response = match doc.remote_id.as_deref() {
            Some(remote_id) => poll_until_terminal(&*self.authority, remote_id, &self.policy).await,
            None => match self.send(&doc).await? {
                Some(response) => response,
                None => return self.outcome(document_id).await,
            },
        };

        self.record(&doc, &response).await?;
        self.outcome(document_id).await
    }

    /// Manual retry for a document still awaiting its verdict.
    ///
    /// ## Errors
    /// - `InvalidStateTransition`: the document is no longer pending
    pub async fn retry_submission(&self, document_id: &str) -> EngineResult<IssueOutcome> {
        let doc = self.load(document_id).await?;
        if doc.state != DocumentState::PendingSubmission {
            return Err(CoreError::InvalidStateTransition {
                document_id: doc.id,
                from: doc.state.as_str().to_string(),
                to: DocumentState::PendingSubmission.as_str().to_string(),
            }
            .into());
        }

        info!(
            document_id = %document_id,
            attempts = doc.submission_attempts,
            "Retrying submission"
        );
        self.submit(document_id).await
    }

    /// Re-polls pending documents the authority already knows about, then
    /// applies the effects of accepted notes that never received them.
    ///
    /// Documents without a remote id are left alone; see [`Sweeper`].
    ///
    /// Per-document failures are counted, not returned.
    pub async fn sweep_once(&self) -> EngineResult<SweepReport> {
        let mut report = SweepReport::default();

        let pending = document::pending_with_remote(self.db.pool(), self.batch_size).await?;
        for doc in pending {
            let Some(remote_id) = doc.remote_id.as_deref() else {
                continue;
            };
            report.checked += 1;

            let response = match self.authority.fetch_status(remote_id).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(?e, document_id = %doc.id, "Sweep status query failed");
                    report.errors += 1;
                    document::record_error(self.db.pool(), &doc.id, &e.to_string(), Utc::now()).await?;
                    continue;
                }
            };

            if let Err(e) = self.record(&doc, &response).await {
                error!(?e, document_id = %doc.id, "Failed to record sweep result");
                report.errors += 1;
                continue;
            }

            match response.status {
                AuthorityStatus::Aceptado => report.accepted += 1,
                AuthorityStatus::Rechazado => report.rejected += 1,
                AuthorityStatus::Pendiente => report.still_pending += 1,
            }
        }

        let awaiting = document::notes_awaiting_effects(self.db.pool(), self.batch_size).await?;
        for note in awaiting {
            match self.adjuster.apply_accepted_effects(&note.id).await {
                Ok(true) => report.effects_recovered += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(?e, document_id = %note.id, "Note effects still cannot be applied");
                    report.errors += 1;
                }
            }
        }

        if report != SweepReport::default() {
            info!(
                checked = report.checked,
                accepted = report.accepted,
                rejected = report.rejected,
                still_pending = report.still_pending,
                errors = report.errors,
                effects_recovered = report.effects_recovered,
                "Sweep complete"
            );
        }

        Ok(report)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn load(&self, document_id: &str) -> EngineResult<Document> {
        document::get(self.db.pool(), document_id)
            .await?
            .ok_or_else(|| CoreError::DocumentNotFound(document_id.to_string()).into())
    }

    async fn outcome(&self, document_id: &str) -> EngineResult<IssueOutcome> {
        Ok(IssueOutcome::from_document(self.load(document_id).await?))
    }

    /// First contact with the authority. `None` means the attempt failed and
    /// the error is already on the document.
    async fn send(&self, doc: &Document) -> EngineResult<Option<AuthorityResponse>> {
        let payload = match self.payload(doc).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(?e, document_id = %doc.id, "Submission setup failed");
                document::record_error(self.db.pool(), &doc.id, &e.to_string(), Utc::now()).await?;
                return Ok(None);
            }
        };

        if !document::mark_submission_attempt(self.db.pool(), &doc.id, Utc::now()).await? {
            return Ok(None);
        }

        let response = match self.authority.submit(&payload).await {
            Ok(response) => response,
            Err(e) => {
                warn!(?e, document_id = %doc.id, number = %payload.number, "Submission failed");
                document::record_error(self.db.pool(), &doc.id, &e.to_string(), Utc::now()).await?;
                return Ok(None);
            }
        };

        info!(
            document_id = %doc.id,
            number = %payload.number,
            status = ?response.status,
            remote_id = ?response.remote_id,
            "Document submitted"
        );

        if response.status.is_terminal() {
            return Ok(Some(response));
        }

        // Keep the ticket so the sweep can take over if polling runs out
        self.store(&doc.id, &response).await?;
        match response.remote_id.as_deref() {
            Some(remote_id) => Ok(Some(
                poll_until_terminal(&*self.authority, remote_id, &self.policy).await,
            )),
            None => Ok(Some(response)),
        }
    }

    async fn payload(&self, doc: &Document) -> EngineResult<SubmissionPayload> {
        let directory = self.adjuster.lifecycle().directory();
        let merchant = directory
            .merchant(&doc.merchant_id)
            .await?
            .ok_or_else(|| EngineError::UnknownMerchant(doc.merchant_id.clone()))?;

        let customer = match doc.customer_id.as_deref() {
            Some(customer_id) => Some(
                directory
                    .customer(&doc.merchant_id, customer_id)
                    .await?
                    .ok_or_else(|| EngineError::UnknownCustomer(customer_id.to_string()))?,
            ),
            None => None,
        };

        let affected = match doc.affected_document_id.as_deref() {
            Some(affected_id) => Some(
                document::get(self.db.pool(), affected_id)
                    .await?
                    .ok_or_else(|| CoreError::AffectedDocumentNotFound(affected_id.to_string()))?,
            ),
            None => None,
        };

        let lines = document::lines(self.db.pool(), &doc.id).await?;
        let payload = SubmissionPayload::build(&merchant, doc, &lines, customer.as_ref(), affected.as_ref());
        debug!(document_id = %doc.id, bytes = payload.to_json()?.len(), "Payload built");

        Ok(payload)
    }

    /// Writes a response onto a pending document. Returns false when
    /// someone else already moved it.
    async fn store(&self, document_id: &str, response: &AuthorityResponse) -> EngineResult<bool> {
        let update = SubmissionUpdate {
            state: match response.status {
                AuthorityStatus::Aceptado => Some(DocumentState::Accepted),
                AuthorityStatus::Rechazado => Some(DocumentState::Rejected),
                AuthorityStatus::Pendiente => None,
            },
            remote_id: response.remote_id.clone(),
            xml_ref: response.xml.clone(),
            cdr_ref: response.cdr.clone(),
            error_message: response.error_message.clone(),
        };
        Ok(document::update_submission(self.db.pool(), document_id, &update, Utc::now()).await?)
    }

    /// Stores the response and, for a note this call accepted, applies its
    /// effects. An effects failure is left for the sweep.
    async fn record(&self, doc: &Document, response: &AuthorityResponse) -> EngineResult<()> {
        let won = self.store(&doc.id, response).await?;
        if !won || !response.status.is_terminal() {
            return Ok(());
        }

        match response.status {
            AuthorityStatus::Rechazado => warn!(
                document_id = %doc.id,
                number = %doc.number(),
                reason = ?response.error_message,
                "Document rejected"
            ),
            _ => info!(document_id = %doc.id, number = %doc.number(), "Document accepted"),
        }

        if response.status == AuthorityStatus::Aceptado && doc.doc_type.is_note() {
            if let Err(e) = self.adjuster.apply_accepted_effects(&doc.id).await {
                error!(?e, document_id = %doc.id, "Failed to apply note effects");
            }
        }

        Ok(())
    }
}

// =============================================================================
// Sweeper
// =============================================================================

/// Background loop running [`SubmissionReconciler::sweep_once`].
///
/// The sweep only polls. A document whose first submission never reached
/// the authority has no remote id and stays pending, with the transport
/// error in `error_message`, until someone calls
/// [`SubmissionReconciler::retry_submission`].
pub struct Sweeper {
    reconciler: SubmissionReconciler,
    interval: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping a running [`Sweeper`].
#[derive(Clone)]
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SweeperHandle {
    /// Asks the sweeper to stop after its current pass.
    pub async fn shutdown(&self) -> EngineResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| EngineError::ShuttingDown)
    }
}

impl Sweeper {
    pub fn new(reconciler: SubmissionReconciler, interval: Duration) -> (Self, SweeperHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let sweeper = Sweeper {
            reconciler,
            interval,
            shutdown_rx,
        };

        (sweeper, SweeperHandle { shutdown_tx })
    }

    /// Runs until shut down.
    pub async fn run(mut self) {
        info!(interval_secs = self.interval.as_secs_f64(), "Submission sweeper starting");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.reconciler.sweep_once().await {
                        error!(?e, "Sweep failed");
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Submission sweeper shutting down");
                    break;
                }
            }
        }

        info!("Submission sweeper stopped");
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::{SandboxAuthority, SandboxBehavior};
    use crate::directory::DbPartyDirectory;
    use crate::ports::PartyDirectory;
    use crate::testing::{self, MERCHANT_ID, RUC_CUSTOMER};
    use async_trait::async_trait;
    use facturo_core::{Customer, DocumentType, Merchant, NoteRequest, Product};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;

    /// Authority answering from a fixed script of status replies.
    struct ScriptedAuthority {
        submit: AuthorityStatus,
        polls: Mutex<Vec<EngineResult<AuthorityStatus>>>,
        status_calls: AtomicU32,
    }

    impl ScriptedAuthority {
        fn new(submit: AuthorityStatus, polls: Vec<EngineResult<AuthorityStatus>>) -> Self {
            ScriptedAuthority {
                submit,
                polls: Mutex::new(polls.into_iter().rev().collect()),
                status_calls: AtomicU32::new(0),
            }
        }

        fn response(status: AuthorityStatus) -> AuthorityResponse {
            AuthorityResponse {
                status,
                remote_id: Some("R-1".into()),
                xml: None,
                cdr: None,
                error_message: None,
            }
        }
    }

    #[async_trait]
    impl TaxAuthorityClient for ScriptedAuthority {
        async fn submit(&self, _payload: &SubmissionPayload) -> EngineResult<AuthorityResponse> {
            Ok(Self::response(self.submit))
        }

        async fn fetch_status(&self, _remote_id: &str) -> EngineResult<AuthorityResponse> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            match self.polls.lock().await.pop() {
                Some(Ok(status)) => Ok(Self::response(status)),
                Some(Err(e)) => Err(e),
                None => Ok(Self::response(AuthorityStatus::Pendiente)),
            }
        }
    }

    /// Directory that knows customers but has lost every merchant.
    struct NoMerchants(DbPartyDirectory);

    #[async_trait]
    impl PartyDirectory for NoMerchants {
        async fn merchant(&self, _id: &str) -> EngineResult<Option<Merchant>> {
            Ok(None)
        }

        async fn customer(&self, merchant_id: &str, id: &str) -> EngineResult<Option<Customer>> {
            self.0.customer(merchant_id, id).await
        }
    }

    fn reconciler(db: &Database, authority: Arc<dyn TaxAuthorityClient>) -> SubmissionReconciler {
        let adjuster = CreditDebitAdjuster::new(db.clone(), testing::lifecycle(db));
        SubmissionReconciler::new(db.clone(), authority, adjuster, testing::quick_policy(), 50)
    }

    async fn product(db: &Database) -> Product {
        testing::lifecycle(db)
            .ledger()
            .register_product(testing::new_product("ARROZ", 20))
            .await
            .unwrap()
    }

    async fn invoice(db: &Database, product: &Product) -> Document {
        testing::lifecycle(db)
            .issue_formal(testing::sale(
                DocumentType::Invoice,
                Some(RUC_CUSTOMER),
                &[(product.id.as_str(), 5)],
            ))
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_stops_at_first_verdict() {
        let authority = ScriptedAuthority::new(
            AuthorityStatus::Pendiente,
            vec![
                Ok(AuthorityStatus::Pendiente),
                Err(EngineError::Authority("timeout".into())),
                Ok(AuthorityStatus::Aceptado),
                Ok(AuthorityStatus::Rechazado),
            ],
        );
        let policy = RetryPolicy {
            max_attempts: 10,
            interval: Duration::from_secs(2),
        };

        let started = tokio::time::Instant::now();
        let response = poll_until_terminal(&authority, "R-1", &policy).await;

        assert_eq!(response.status, AuthorityStatus::Aceptado);
        assert_eq!(authority.status_calls.load(Ordering::SeqCst), 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(6) && elapsed < Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_budget_exhausted_keeps_last_answer() {
        let authority = ScriptedAuthority::new(
            AuthorityStatus::Pendiente,
            vec![
                Ok(AuthorityStatus::Pendiente),
                Err(EngineError::Authority("connection reset".into())),
            ],
        );
        let policy = RetryPolicy {
            max_attempts: 2,
            interval: Duration::from_millis(500),
        };

        let response = poll_until_terminal(&authority, "R-1", &policy).await;

        assert_eq!(response.status, AuthorityStatus::Pendiente);
        assert!(response.error_message.unwrap().contains("connection reset"));
        assert_eq!(authority.status_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_submit_accepts_and_is_idempotent() {
        let db = testing::database().await;
        let arroz = product(&db).await;
        let doc = invoice(&db, &arroz).await;
        let sandbox = Arc::new(SandboxAuthority::default());
        let reconciler = reconciler(&db, sandbox.clone());

        let outcome = reconciler.submit(&doc.id).await.unwrap();
        assert!(outcome.is_accepted());
        let stored = outcome.document();
        assert_eq!(stored.submission_attempts, 1);
        assert!(stored.cdr_ref.as_deref().unwrap().contains("F0A1-00000001"));

        let again = reconciler.submit(&doc.id).await.unwrap();
        assert!(again.is_accepted());
        assert_eq!(sandbox.submit_calls(), 1);
    }

    #[tokio::test]
    async fn test_pending_after_budget_then_sweep_accepts() {
        let db = testing::database().await;
        let arroz = product(&db).await;
        let doc = invoice(&db, &arroz).await;
        let sandbox = Arc::new(SandboxAuthority::new(SandboxBehavior::AcceptAfterPolls { polls: 5 }));
        let reconciler = reconciler(&db, sandbox.clone());

        let outcome = reconciler.submit(&doc.id).await.unwrap();
        let IssueOutcome::Pending { document, reason } = outcome else {
            panic!("expected pending outcome");
        };
        assert!(reason.is_none());
        assert_eq!(document.state, DocumentState::PendingSubmission);
        assert!(document.remote_id.is_some());
        assert_eq!(sandbox.status_calls(), 3);

        // Polls four and five happen in the sweep
        let first = reconciler.sweep_once().await.unwrap();
        assert_eq!((first.checked, first.still_pending), (1, 1));
        let second = reconciler.sweep_once().await.unwrap();
        assert_eq!((second.checked, second.accepted), (1, 1));

        let third = reconciler.sweep_once().await.unwrap();
        assert_eq!(third, SweepReport::default());
        assert_eq!(sandbox.submit_calls(), 1);
    }

    #[tokio::test]
    async fn test_rejection_is_terminal() {
        let db = testing::database().await;
        let arroz = product(&db).await;
        let doc = invoice(&db, &arroz).await;
        let sandbox = Arc::new(SandboxAuthority::new(SandboxBehavior::Reject {
            reason: "3105 - RUC del receptor no existe".into(),
        }));
        let reconciler = reconciler(&db, sandbox);

        let outcome = reconciler.submit(&doc.id).await.unwrap();
        let IssueOutcome::Rejected { document, reason } = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(document.state, DocumentState::Rejected);
        assert!(reason.starts_with("3105"));

        // Rejection never gives stock back
        let stock = testing::lifecycle(&db).ledger().current_stock(&arroz.id).await.unwrap();
        assert_eq!(stock.quantity, 15);

        let err = reconciler.retry_submission(&doc.id).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_unreachable_authority_keeps_document_pending() {
        let db = testing::database().await;
        let arroz = product(&db).await;
        let doc = invoice(&db, &arroz).await;
        let reconciler = reconciler(&db, Arc::new(SandboxAuthority::new(SandboxBehavior::Unreachable)));

        let outcome = reconciler.submit(&doc.id).await.unwrap();
        let IssueOutcome::Pending { document, reason } = outcome else {
            panic!("expected pending outcome");
        };
        assert!(reason.unwrap().contains("unreachable"));
        assert!(document.remote_id.is_none());

        // Without a remote id the sweep has nothing to poll
        assert_eq!(reconciler.sweep_once().await.unwrap().checked, 0);

        // The authority comes back: a manual retry submits again
        let healthy = super::SubmissionReconciler::new(
            db.clone(),
            Arc::new(SandboxAuthority::default()),
            CreditDebitAdjuster::new(db.clone(), testing::lifecycle(&db)),
            testing::quick_policy(),
            50,
        );
        let retried = healthy.retry_submission(&doc.id).await.unwrap();
        assert!(retried.is_accepted());
        assert_eq!(retried.document().submission_attempts, 2);
        assert!(retried.document().error_message.is_none());
    }

    #[tokio::test]
    async fn test_setup_failure_records_error_without_calling_authority() {
        let db = testing::database().await;
        let arroz = product(&db).await;
        let doc = invoice(&db, &arroz).await;
        let sandbox = Arc::new(SandboxAuthority::default());

        let lifecycle = crate::lifecycle::DocumentLifecycle::new(
            db.clone(),
            Arc::new(NoMerchants(DbPartyDirectory::new(db.clone()))),
            testing::lifecycle(&db).ledger().clone(),
            Default::default(),
        );
        let reconciler = SubmissionReconciler::new(
            db.clone(),
            sandbox.clone(),
            CreditDebitAdjuster::new(db.clone(), lifecycle),
            testing::quick_policy(),
            50,
        );

        let outcome = reconciler.submit(&doc.id).await.unwrap();
        let IssueOutcome::Pending { document, reason } = outcome else {
            panic!("expected pending outcome");
        };
        assert!(reason.unwrap().contains(MERCHANT_ID));
        assert_eq!(document.submission_attempts, 0);
        assert_eq!(sandbox.submit_calls(), 0);
    }

    #[tokio::test]
    async fn test_informal_documents_are_not_submitted() {
        let db = testing::database().await;
        let arroz = product(&db).await;
        let note = testing::lifecycle(&db)
            .issue_informal(testing::sale(DocumentType::SalesNote, None, &[(arroz.id.as_str(), 1)]))
            .await
            .unwrap();
        let reconciler = reconciler(&db, Arc::new(SandboxAuthority::default()));

        let err = reconciler.submit(&note.id).await.unwrap_err();
        assert!(err.is_validation());
        assert!(reconciler.submit("missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_accepted_cancellation_applies_effects_once() {
        let db = testing::database().await;
        let arroz = product(&db).await;
        let doc = invoice(&db, &arroz).await;
        let reconciler = reconciler(&db, Arc::new(SandboxAuthority::default()));
        assert!(reconciler.submit(&doc.id).await.unwrap().is_accepted());

        let note = reconciler
            .adjuster
            .issue_note(NoteRequest {
                merchant_id: MERCHANT_ID.into(),
                note_type: DocumentType::CreditNote,
                affected_document_id: doc.id.clone(),
                motive_code: "01".into(),
                lines: vec![],
                discount_cents: None,
            })
            .await
            .unwrap();

        let outcome = reconciler.submit(&note.id).await.unwrap();
        assert!(outcome.is_accepted());
        assert!(outcome.document().effects_applied_at.is_some());
        let invoice = reconciler.load(&doc.id).await.unwrap();
        assert_eq!(invoice.state, DocumentState::Voided);

        let stock = testing::lifecycle(&db).ledger().current_stock(&arroz.id).await.unwrap();
        assert_eq!(stock.quantity, 20);

        // Nothing left for the sweep
        let report = reconciler.sweep_once().await.unwrap();
        assert_eq!(report.effects_recovered, 0);
    }

    #[tokio::test]
    async fn test_sweep_recovers_unapplied_effects() {
        let db = testing::database().await;
        let arroz = product(&db).await;
        let doc = invoice(&db, &arroz).await;
        let reconciler = reconciler(&db, Arc::new(SandboxAuthority::default()));

        // Note accepted while its invoice was still pending
        let note = reconciler
            .adjuster
            .issue_note(NoteRequest {
                merchant_id: MERCHANT_ID.into(),
                note_type: DocumentType::CreditNote,
                affected_document_id: doc.id.clone(),
                motive_code: "01".into(),
                lines: vec![],
                discount_cents: None,
            })
            .await
            .unwrap();
        testing::accept(&db, &note.id).await;

        let blocked = reconciler.sweep_once().await.unwrap();
        assert_eq!((blocked.effects_recovered, blocked.errors), (0, 1));

        assert!(reconciler.submit(&doc.id).await.unwrap().is_accepted());
        let recovered = reconciler.sweep_once().await.unwrap();
        assert_eq!(recovered.effects_recovered, 1);

        let stock = testing::lifecycle(&db).ledger().current_stock(&arroz.id).await.unwrap();
        assert_eq!(stock.quantity, 20);
    }

    fn cancellation(affected: &Document) -> NoteRequest {
        NoteRequest {
            merchant_id: MERCHANT_ID.into(),
            note_type: DocumentType::CreditNote,
            affected_document_id: affected.id.clone(),
            motive_code: "01".into(),
            lines: vec![],
            discount_cents: None,
        }
    }

    #[tokio::test]
    async fn test_cancellation_of_rejected_invoice_settles_in_one_sweep() {
        let db = testing::database().await;
        let arroz = product(&db).await;
        let doc = invoice(&db, &arroz).await;
        let reconciler = reconciler(&db, Arc::new(SandboxAuthority::default()));

        let note = reconciler.adjuster.issue_note(cancellation(&doc)).await.unwrap();
        testing::accept(&db, &note.id).await;
        let rejected = SubmissionUpdate {
            state: Some(DocumentState::Rejected),
            error_message: Some("2017 - El receptor no existe".into()),
            ..Default::default()
        };
        assert!(document::update_submission(db.pool(), &doc.id, &rejected, Utc::now()).await.unwrap());

        let report = reconciler.sweep_once().await.unwrap();
        assert_eq!((report.effects_recovered, report.errors), (1, 0));

        let settled = reconciler.load(&note.id).await.unwrap();
        assert!(settled.effects_applied_at.is_some());
        assert!(settled.error_message.unwrap().contains("rejected"));
        assert!(document::notes_awaiting_effects(db.pool(), 10).await.unwrap().is_empty());

        // The rejected invoice keeps its state and its stock
        assert_eq!(reconciler.load(&doc.id).await.unwrap().state, DocumentState::Rejected);
        let stock = testing::lifecycle(&db).ledger().current_stock(&arroz.id).await.unwrap();
        assert_eq!(stock.quantity, 15);

        assert_eq!(reconciler.sweep_once().await.unwrap(), SweepReport::default());
    }

    #[tokio::test]
    async fn test_blocked_note_does_not_starve_the_batch() {
        let db = testing::database().await;
        let arroz = product(&db).await;
        let adjuster = CreditDebitAdjuster::new(db.clone(), testing::lifecycle(&db));
        let reconciler = SubmissionReconciler::new(
            db.clone(),
            Arc::new(SandboxAuthority::default()),
            adjuster.clone(),
            testing::quick_policy(),
            1,
        );

        // Accepted first, but its invoice never left pending
        let waiting = invoice(&db, &arroz).await;
        let blocked = adjuster.issue_note(cancellation(&waiting)).await.unwrap();
        testing::accept(&db, &blocked.id).await;

        let accepted = invoice(&db, &arroz).await;
        testing::accept(&db, &accepted.id).await;
        let healthy = adjuster.issue_note(cancellation(&accepted)).await.unwrap();
        testing::accept(&db, &healthy.id).await;

        let first = reconciler.sweep_once().await.unwrap();
        assert_eq!((first.effects_recovered, first.errors), (0, 1));

        let second = reconciler.sweep_once().await.unwrap();
        assert_eq!((second.effects_recovered, second.errors), (1, 0));
        assert_eq!(reconciler.load(&accepted.id).await.unwrap().state, DocumentState::Voided);

        let awaiting = document::notes_awaiting_effects(db.pool(), 10).await.unwrap();
        assert_eq!(awaiting.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(), vec![blocked.id.as_str()]);
    }

    #[tokio::test]
    async fn test_sweeper_runs_until_shutdown() {
        let db = testing::database().await;
        let arroz = product(&db).await;
        let doc = invoice(&db, &arroz).await;
        let sandbox = Arc::new(SandboxAuthority::new(SandboxBehavior::AcceptAfterPolls { polls: 4 }));
        let reconciler = reconciler(&db, sandbox.clone());

        assert!(matches!(
            reconciler.submit(&doc.id).await.unwrap(),
            IssueOutcome::Pending { .. }
        ));

        let (sweeper, handle) = Sweeper::new(reconciler.clone(), Duration::from_millis(5));
        let task = tokio::spawn(sweeper.run());

        let mut accepted = false;
        for _ in 0..200 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if reconciler.load(&doc.id).await.unwrap().state == DocumentState::Accepted {
                accepted = true;
                break;
            }
        }
        assert!(accepted);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
        assert!(matches!(handle.shutdown().await, Err(EngineError::ShuttingDown)));
    }
}
