//! # Collaborator Ports
//!
//! Traits for everything the engine talks to but does not own.
//!
//! ## Ports and Adapters
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  SubmissionReconciler ──► TaxAuthorityClient ◄── SandboxAuthority       │
//! │                                              ◄── (real SUNAT/OSE client)│
//! │                                                                         │
//! │  InventoryLedger ──────► NotificationSink   ◄── TracingNotifier         │
//! │                                              ◄── RecordingNotifier (tests)│
//! │                                                                         │
//! │  DocumentLifecycle ────► PartyDirectory     ◄── DbPartyDirectory        │
//! │                                                                         │
//! │  Services receive ports by constructor as Arc<dyn Port>, which keeps  │
//! │  the ledger free of any document or notification knowledge.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use facturo_core::{Customer, Document, DocumentLine, Merchant};

use crate::error::EngineResult;

// =============================================================================
// Tax Authority
// =============================================================================

/// Status vocabulary of the tax authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthorityStatus {
    /// Received, verdict not ready.
    Pendiente,
    /// Accepted; a CDR is available.
    Aceptado,
    /// Rejected. Terminal.
    Rechazado,
}

impl AuthorityStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AuthorityStatus::Pendiente)
    }
}

/// Answer to a submission or status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityResponse {
    pub status: AuthorityStatus,
    /// Ticket the authority assigned to the submission.
    pub remote_id: Option<String>,
    /// Reference to the signed XML.
    pub xml: Option<String>,
    /// Reference to the acceptance receipt.
    pub cdr: Option<String>,
    pub error_message: Option<String>,
}

impl AuthorityResponse {
    /// A pending answer carrying an error note, used when a poll fails.
    pub fn pending_with_error(remote_id: &str, message: impl Into<String>) -> Self {
        AuthorityResponse {
            status: AuthorityStatus::Pendiente,
            remote_id: Some(remote_id.to_string()),
            xml: None,
            cdr: None,
            error_message: Some(message.into()),
        }
    }
}

/// What gets sent to the authority for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionPayload {
    pub issuer_ruc: String,
    pub issuer_name: String,
    /// Authority catalog code ("01" invoice, "03" ticket, "07", "08").
    pub document_code: String,
    /// "F0A1-00000042".
    pub number: String,
    pub issue_date: DateTime<Utc>,
    pub currency: String,
    pub customer_identity: Option<String>,
    pub customer_name: Option<String>,
    pub taxed_cents: i64,
    pub exempt_cents: i64,
    pub igv_cents: i64,
    pub total_cents: i64,
    /// Number of the affected document, for notes.
    pub affected_number: Option<String>,
    pub affected_code: Option<String>,
    pub motive_code: Option<String>,
    pub lines: Vec<PayloadLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadLine {
    pub line_number: i64,
    pub description: String,
    pub quantity: i64,
    pub unit_value_cents: i64,
    pub unit_price_cents: i64,
    pub line_value_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
}

impl SubmissionPayload {
    /// Builds the payload of a document.
    ///
    /// `affected` is the document a note refers to.
    pub fn build(
        merchant: &Merchant,
        document: &Document,
        lines: &[DocumentLine],
        customer: Option<&Customer>,
        affected: Option<&Document>,
    ) -> Self {
        SubmissionPayload {
            issuer_ruc: merchant.ruc.clone(),
            issuer_name: merchant.business_name.clone(),
            document_code: document.doc_type.authority_code().unwrap_or_default().to_string(),
            number: document.number(),
            issue_date: document.issue_date,
            currency: document.currency.clone(),
            customer_identity: customer.and_then(|c| c.identity_number.clone()),
            customer_name: customer.map(|c| c.name.clone()),
            taxed_cents: document.taxed_cents,
            exempt_cents: document.exempt_cents,
            igv_cents: document.igv_cents,
            total_cents: document.total_cents,
            affected_number: affected.map(Document::number),
            affected_code: affected
                .and_then(|a| a.doc_type.authority_code())
                .map(String::from),
            motive_code: document.motive_code.clone(),
            lines: lines
                .iter()
                .map(|l| PayloadLine {
                    line_number: l.line_number,
                    description: l.description.clone(),
                    quantity: l.quantity,
                    unit_value_cents: l.unit_value_cents,
                    unit_price_cents: l.unit_price_cents,
                    line_value_cents: l.line_value_cents,
                    tax_cents: l.tax_cents,
                    total_cents: l.total_cents,
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Client of the external tax authority (SUNAT or an OSE).
#[async_trait]
pub trait TaxAuthorityClient: Send + Sync {
    /// Sends a document. Errors mean the authority never saw it.
    async fn submit(&self, payload: &SubmissionPayload) -> EngineResult<AuthorityResponse>;

    /// Asks for the verdict on an earlier submission.
    async fn fetch_status(&self, remote_id: &str) -> EngineResult<AuthorityResponse>;
}

// =============================================================================
// Notifications
// =============================================================================

/// Stock situation of a product that crossed a threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAlert {
    pub merchant_id: String,
    pub product_id: String,
    pub code: String,
    pub name: String,
    pub current_stock: i64,
    pub min_stock: Option<i64>,
}

/// Fire-and-forget alerts. The ledger logs failures and moves on.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify_low_stock(&self, alert: &StockAlert) -> EngineResult<()>;

    async fn notify_stock_out(&self, alert: &StockAlert) -> EngineResult<()>;
}

// =============================================================================
// Parties
// =============================================================================

/// Read-only lookup of merchants and customers.
#[async_trait]
pub trait PartyDirectory: Send + Sync {
    async fn merchant(&self, id: &str) -> EngineResult<Option<Merchant>>;

    async fn customer(&self, merchant_id: &str, id: &str) -> EngineResult<Option<Customer>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&AuthorityStatus::Aceptado).unwrap();
        assert_eq!(json, "\"ACEPTADO\"");
        let parsed: AuthorityStatus = serde_json::from_str("\"RECHAZADO\"").unwrap();
        assert_eq!(parsed, AuthorityStatus::Rechazado);
        assert!(!AuthorityStatus::Pendiente.is_terminal());
        assert!(AuthorityStatus::Rechazado.is_terminal());
    }
}
