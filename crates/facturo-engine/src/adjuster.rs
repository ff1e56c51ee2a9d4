//! # Credit and Debit Notes
//!
//! Builds notes from a motive and applies their effects once the tax
//! authority accepts them.
//!
//! ## Two Phases
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  issue_note()                          apply_accepted_effects()         │
//! │  ─────────────                         ────────────────────────         │
//! │  motive lookup                         claim_effects (first write)      │
//! │  affected document checks                 │ false ─► already applied    │
//! │  allocate FCA1/BCA1/FDA1/BDA1             ▼                             │
//! │  cancellation / return guards          01     ─► void the affected doc  │
//! │  build_adjustment()                    06, 07 ─► INGRESO per note line  │
//! │  persist note (PENDING_SUBMISSION)     others ─► nothing                │
//! │                                                                         │
//! │  Nothing touches stock or the affected document until acceptance.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The claim and the effects share one transaction: if an effect fails the
//! claim rolls back and the next sweep tries again. A cancellation whose
//! affected document is still pending goes to the back of the sweep queue;
//! one whose affected document was rejected is claimed with an error
//! message, since there is nothing left to void. Returns accepted after the
//! affected document was voided post nothing, because the void already
//! returned the stock.

use chrono::Utc;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use facturo_core::lifecycle::initial_state;
use facturo_core::motive::{build_adjustment, lookup, AdjustmentRule, StockEffect};
use facturo_core::valuation::DocumentTotals;
use facturo_core::{
    CoreError, Document, DocumentLine, DocumentState, Money, MovementKind, NoteRequest,
    SettlementStatus,
};
use facturo_db::repository::{document, movement};
use facturo_db::Database;

use crate::error::{EngineError, EngineResult};
use crate::ledger::MovementRequest;
use crate::lifecycle::DocumentLifecycle;
use crate::sequence::SequenceAllocator;

/// Issues notes and applies their accepted effects.
#[derive(Clone)]
pub struct CreditDebitAdjuster {
    db: Database,
    lifecycle: DocumentLifecycle,
}

impl CreditDebitAdjuster {
    pub fn new(db: Database, lifecycle: DocumentLifecycle) -> Self {
        CreditDebitAdjuster { db, lifecycle }
    }

    pub fn lifecycle(&self) -> &DocumentLifecycle {
        &self.lifecycle
    }

    /// Issues a credit or debit note in PENDING_SUBMISSION.
    ///
    /// ## Errors
    /// - `UnknownMotive` / `MotiveKindMismatch`
    /// - `AffectedDocumentNotFound`: missing, or owned by another merchant
    /// - `AlreadyVoided`: the affected document is voided
    /// - `InvalidAdjustment`: affected document not adjustable, already
    ///   cancelled, or returns beyond the sold quantity
    /// - `MissingAdjustmentLines`: motive needs line detail
    pub async fn issue_note(&self, request: NoteRequest) -> EngineResult<Document> {
        if !request.note_type.is_note() {
            return Err(CoreError::InvalidDocumentType(request.note_type.to_string()).into());
        }
        let motive = lookup(request.note_type, &request.motive_code)?;

        let merchant = self
            .lifecycle
            .directory()
            .merchant(&request.merchant_id)
            .await?
            .filter(|m| m.is_active)
            .ok_or_else(|| EngineError::UnknownMerchant(request.merchant_id.clone()))?;

        let affected = document::get(self.db.pool(), &request.affected_document_id)
            .await?
            .filter(|d| d.merchant_id == merchant.id)
            .ok_or_else(|| CoreError::AffectedDocumentNotFound(request.affected_document_id.clone()))?;

        if !affected.doc_type.is_note_target() {
            return Err(CoreError::InvalidAdjustment {
                reason: format!("a {} cannot be adjusted by a note", affected.doc_type),
            }
            .into());
        }
        match affected.state {
            DocumentState::Voided => return Err(CoreError::AlreadyVoided(affected.id.clone()).into()),
            DocumentState::PendingSubmission | DocumentState::Accepted => {}
            other => {
                return Err(CoreError::InvalidAdjustment {
                    reason: format!("document {} is {}", affected.number(), other),
                }
                .into())
            }
        }

        let mut base_lines = document::lines(self.db.pool(), &affected.id).await?;

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let (series, correlative) =
            SequenceAllocator::allocate(&mut tx, &merchant.id, request.note_type, Some(affected.doc_type)).await?;

        if document::has_cancellation(&mut *tx, &affected.id).await? {
            return Err(CoreError::InvalidAdjustment {
                reason: format!("document {} is already cancelled by a credit note", affected.number()),
            }
            .into());
        }

        match motive.rule {
            AdjustmentRule::FullCancellation | AdjustmentRule::FullReturn => {
                if !document::returned_quantities(&mut *tx, &affected.id).await?.is_empty() {
                    return Err(CoreError::InvalidAdjustment {
                        reason: format!("document {} already has item returns", affected.number()),
                    }
                    .into());
                }
            }
            AdjustmentRule::ItemReturn => {
                let returned = document::returned_quantities(&mut *tx, &affected.id).await?;
                deduct_returned(&mut base_lines, returned);
            }
            _ => {}
        }

        let adjusted = build_adjustment(motive, &base_lines, &request.lines, request.discount_cents)?;
        let totals = DocumentTotals::from_valuations(adjusted.iter().map(|l| &l.valuation));

        let note = Document {
            id: Uuid::new_v4().to_string(),
            merchant_id: merchant.id.clone(),
            doc_type: request.note_type,
            series: series.to_string(),
            correlative,
            customer_id: affected.customer_id.clone(),
            issue_date: now,
            currency: affected.currency.clone(),
            taxed_cents: totals.taxed.cents(),
            exempt_cents: totals.exempt.cents(),
            igv_cents: totals.igv.cents(),
            total_cents: totals.total.cents(),
            balance_cents: 0,
            settlement: SettlementStatus::from_balance(Money::zero(), totals.total),
            state: initial_state(request.note_type),
            remote_id: None,
            submission_attempts: 0,
            error_message: None,
            xml_ref: None,
            cdr_ref: None,
            affected_document_id: Some(affected.id.clone()),
            affected_doc_type: Some(affected.doc_type),
            motive_code: Some(motive.code.to_string()),
            effects_applied_at: None,
            created_at: now,
            updated_at: now,
            voided_at: None,
        };
        document::insert(&mut *tx, &note).await?;

        for (index, line) in adjusted.iter().enumerate() {
            let row = line.valuation.to_line(
                &note.id,
                index as i64 + 1,
                line.product_id.clone(),
                line.description.clone(),
            );
            document::insert_line(&mut *tx, &row).await?;
        }

        tx.commit().await?;

        info!(
            document_id = %note.id,
            number = %note.number(),
            affected = %affected.number(),
            motive = %motive.code,
            total = %note.total(),
            "Note issued"
        );

        Ok(note)
    }

    /// Applies the stock and void effects of an accepted note.
    ///
    /// Returns `false` when there was nothing to do: effects already
    /// applied, or the note is not accepted.
    pub async fn apply_accepted_effects(&self, note_id: &str) -> EngineResult<bool> {
        let note = self.lifecycle.document(note_id).await?;
        if !note.doc_type.is_note() {
            return Err(CoreError::InvalidDocumentType(note.doc_type.to_string()).into());
        }
        let motive = lookup(note.doc_type, note.motive_code.as_deref().unwrap_or_default())?;
        let affected_id = note
            .affected_document_id
            .clone()
            .ok_or_else(|| CoreError::AffectedDocumentNotFound(note.id.clone()))?;

        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        if !document::claim_effects(&mut *tx, note_id, now).await? {
            debug!(document_id = %note_id, "Note effects already applied or note not accepted");
            return Ok(false);
        }

        let affected = document::get(&mut *tx, &affected_id)
            .await?
            .ok_or_else(|| CoreError::AffectedDocumentNotFound(affected_id.clone()))?;

        let mut alerts = Vec::new();
        match motive.rule.stock_effect() {
            StockEffect::None => {}
            StockEffect::ViaVoid => match affected.state {
                DocumentState::Voided => {
                    info!(document_id = %affected.id, "Affected document already voided");
                }
                DocumentState::Rejected => {
                    let message = format!("affected document {} was rejected, nothing to void", affected.number());
                    warn!(document_id = %note_id, affected = %affected.id, "Cancellation has nothing to void");
                    document::annotate_effects(&mut *tx, note_id, &message, now).await?;
                }
                DocumentState::PendingSubmission => {
                    // Still waiting on its own verdict: retry on a later sweep
                    drop(tx);
                    document::defer_effects(self.db.pool(), note_id, now).await?;
                    return Err(CoreError::InvalidStateTransition {
                        document_id: affected.id.clone(),
                        from: affected.state.to_string(),
                        to: DocumentState::Voided.to_string(),
                    }
                    .into());
                }
                _ => {
                    alerts = self.lifecycle.void_in(&mut tx, &affected).await?;
                }
            },
            StockEffect::ReturnNoteLines if affected.is_voided() => {
                info!(document_id = %affected.id, "Affected document voided, stock already returned");
            }
            StockEffect::ReturnNoteLines => {
                let sales = movement::by_document(&mut *tx, &affected_id, MovementKind::Salida).await?;
                let lines = document::lines(&mut *tx, note_id).await?;
                for line in &lines {
                    let Some(product_id) = line.product_id.as_deref() else {
                        continue;
                    };
                    // Untracked products never left the ledger
                    let Some(sale) = sales.iter().find(|m| m.product_id == product_id) else {
                        continue;
                    };
                    let inflow = MovementRequest::new(product_id, &sale.merchant_id, MovementKind::Ingreso, line.quantity)
                        .unit_cost(sale.unit_cost)
                        .document(note_id)
                        .note(format!("Devolución {}", note.number()));
                    let posted = self.lifecycle.ledger().post_in(&mut tx, &inflow).await?;
                    alerts.extend(posted.alert);
                }
            }
        }

        tx.commit().await?;
        self.lifecycle.ledger().dispatch(alerts).await;

        info!(document_id = %note_id, number = %note.number(), motive = %motive.code, "Note effects applied");

        Ok(true)
    }
}

/// Lowers line quantities by what earlier return notes already took back,
/// earliest lines first.
fn deduct_returned(lines: &mut [DocumentLine], returned: Vec<(String, i64)>) {
    let mut remaining: HashMap<String, i64> = returned.into_iter().collect();
    for line in lines.iter_mut() {
        let Some(product_id) = line.product_id.as_deref() else {
            continue;
        };
        let Some(left) = remaining.get_mut(product_id) else {
            continue;
        };
        let taken = (*left).min(line.quantity);
        line.quantity -= taken;
        *left -= taken;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
