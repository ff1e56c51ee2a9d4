//! # Accounting Summary
//!
//! Aggregates issued documents for a period.
//!
//! ## Inclusion Rules
//! ```text
//! document ──► voided?                          ──yes──► skip
//!          ──► rejected / draft?                ──yes──► skip
//!          ──► cancelled by an 01/06 note?      ──yes──► skip (and the note)
//!          ──► credit note?                     ──yes──► subtract
//!          └─► otherwise                                  add
//! ```
//!
//! Cancelled documents are collected into a set before aggregation, so a
//! document referenced by several cancellation notes still drops out once
//! and running the summary twice gives the same figures.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use ts_rs::TS;

use crate::money::Money;
use crate::motive;
use crate::types::{Document, DocumentState, DocumentType};

/// Per-type subtotal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TypeSubtotal {
    pub doc_type: DocumentType,
    pub count: usize,
    /// Signed: credit notes are negative.
    pub total: Money,
}

/// Totals of a merchant's documents over a period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AccountingSummary {
    pub document_count: usize,
    /// Documents left out (voided, rejected, cancelled).
    pub excluded_count: usize,
    pub taxed: Money,
    pub exempt: Money,
    pub igv: Money,
    pub total: Money,
    pub by_type: Vec<TypeSubtotal>,
}

fn counts(document: &Document) -> bool {
    matches!(
        document.state,
        DocumentState::PendingSubmission | DocumentState::Accepted | DocumentState::Issued
    )
}

/// True for a live credit note whose motive cancels its affected document.
fn is_cancellation(document: &Document) -> bool {
    document.doc_type == DocumentType::CreditNote
        && counts(document)
        && document
            .motive_code
            .as_deref()
            .and_then(|code| motive::lookup(DocumentType::CreditNote, code).ok())
            .is_some_and(|m| m.rule.cancels_affected())
}

/// Builds the summary.
pub fn accounting_summary(documents: &[Document]) -> AccountingSummary {
    let cancelled: HashSet<&str> = documents
        .iter()
        .filter(|d| is_cancellation(d))
        .filter_map(|d| d.affected_document_id.as_deref())
        .collect();

    let mut summary = AccountingSummary::default();

    for document in documents {
        let skip = !counts(document)
            || cancelled.contains(document.id.as_str())
            || (is_cancellation(document)
                && document
                    .affected_document_id
                    .as_deref()
                    .is_some_and(|id| documents.iter().any(|d| d.id == id)));
        if skip {
            summary.excluded_count += 1;
            continue;
        }

        let sign = if document.doc_type == DocumentType::CreditNote { -1 } else { 1 };
        let total = Money::from_cents(document.total_cents * sign);

        summary.document_count += 1;
        summary.taxed += Money::from_cents(document.taxed_cents * sign);
        summary.exempt += Money::from_cents(document.exempt_cents * sign);
        summary.igv += Money::from_cents(document.igv_cents * sign);
        summary.total += total;

        match summary.by_type.iter_mut().find(|s| s.doc_type == document.doc_type) {
            Some(subtotal) => {
                subtotal.count += 1;
                subtotal.total += total;
            }
            None => summary.by_type.push(TypeSubtotal {
                doc_type: document.doc_type,
                count: 1,
                total,
            }),
        }
    }

    summary
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SettlementStatus;
    use chrono::Utc;

    fn doc(id: &str, doc_type: DocumentType, state: DocumentState, total: i64) -> Document {
        let now = Utc::now();
        Document {
            id: id.into(),
            merchant_id: "m1".into(),
            doc_type,
            series: "F0A1".into(),
            correlative: 1,
            customer_id: None,
            issue_date: now,
            currency: "PEN".into(),
            taxed_cents: total * 100 / 118,
            exempt_cents: 0,
            igv_cents: total - total * 100 / 118,
            total_cents: total,
            balance_cents: 0,
            settlement: SettlementStatus::Paid,
            state,
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
        }
    }

    fn note(id: &str, affected: &str, motive: &str, total: i64) -> Document {
        let mut n = doc(id, DocumentType::CreditNote, DocumentState::Accepted, total);
        n.affected_document_id = Some(affected.into());
        n.affected_doc_type = Some(DocumentType::Invoice);
        n.motive_code = Some(motive.into());
        n
    }

    #[test]
    fn test_voided_documents_excluded() {
        let docs = vec![
            doc("a", DocumentType::Invoice, DocumentState::Accepted, 11_800),
            doc("b", DocumentType::SalesNote, DocumentState::Voided, 5_000),
            doc("c", DocumentType::Ticket, DocumentState::Rejected, 2_000),
        ];
        let summary = accounting_summary(&docs);
        assert_eq!(summary.document_count, 1);
        assert_eq!(summary.excluded_count, 2);
        assert_eq!(summary.total.cents(), 11_800);
    }

    #[test]
    fn test_cancellation_excluded_once_and_idempotent() {
        let docs = vec![
            doc("inv", DocumentType::Invoice, DocumentState::Accepted, 11_800),
            doc("inv2", DocumentType::Invoice, DocumentState::Accepted, 2_360),
            note("nc1", "inv", "01", 11_800),
            note("nc2", "inv", "01", 11_800),
        ];
        let first = accounting_summary(&docs);
        let second = accounting_summary(&docs);

        assert_eq!(first, second);
        assert_eq!(first.document_count, 1);
        assert_eq!(first.total.cents(), 2_360);
        assert_eq!(first.excluded_count, 3);
    }

    #[test]
    fn test_partial_credit_note_subtracts() {
        let docs = vec![
            doc("inv", DocumentType::Invoice, DocumentState::Accepted, 11_800),
            note("nc", "inv", "07", 2_360),
        ];
        let summary = accounting_summary(&docs);
        assert_eq!(summary.total.cents(), 9_440);
        assert_eq!(summary.by_type.len(), 2);
        assert_eq!(summary.by_type[1].total.cents(), -2_360);
    }

    #[test]
    fn test_cancellation_of_document_outside_period_still_counts_note() {
        let docs = vec![note("nc", "older-invoice", "01", 11_800)];
        let summary = accounting_summary(&docs);
        assert_eq!(summary.document_count, 1);
        assert_eq!(summary.total.cents(), -11_800);
    }
}
