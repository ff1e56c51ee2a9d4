//! # Lifecycle Module
//!
//! The document state machine and the balance (saldo) rules.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  FORMAL (invoice, ticket, credit/debit note)                           │
//! │                                                                         │
//! │    Draft ──► PendingSubmission ──┬──► Accepted ──► Voided              │
//! │                                  └──► Rejected                          │
//! │                                                                         │
//! │  INFORMAL (sales note, order)                                          │
//! │                                                                         │
//! │    Draft ──► Issued ──► Voided                                         │
//! │                                                                         │
//! │  Voided is terminal. Rejected is terminal for the document; a fix is   │
//! │  a new document with a new number.                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Customer, Document, DocumentState, DocumentType, IdentityKind, PaymentMedium};
use crate::validation::{validate_dni, validate_payment_amount, validate_ruc};
use crate::TICKET_IDENTIFICATION_THRESHOLD_CENTS;

// =============================================================================
// Transitions
// =============================================================================

/// State a freshly issued document lands in.
pub const fn initial_state(doc_type: DocumentType) -> DocumentState {
    if doc_type.is_formal() {
        DocumentState::PendingSubmission
    } else {
        DocumentState::Issued
    }
}

/// Whether `from → to` is allowed for a document type.
pub fn can_transition(doc_type: DocumentType, from: DocumentState, to: DocumentState) -> bool {
    use DocumentState::*;

    if doc_type.is_formal() {
        matches!(
            (from, to),
            (Draft, PendingSubmission)
                | (PendingSubmission, Accepted)
                | (PendingSubmission, Rejected)
                | (Accepted, Voided)
        )
    } else {
        matches!((from, to), (Draft, Issued) | (Issued, Voided))
    }
}

/// Checks a transition of a persisted document.
///
/// ## Errors
/// - `AlreadyVoided`: the document is voided already
/// - `InvalidStateTransition`: any other disallowed move
pub fn ensure_transition(document: &Document, to: DocumentState) -> CoreResult<()> {
    if document.state == DocumentState::Voided {
        return Err(CoreError::AlreadyVoided(document.id.clone()));
    }
    if !can_transition(document.doc_type, document.state, to) {
        return Err(CoreError::InvalidStateTransition {
            document_id: document.id.clone(),
            from: document.state.to_string(),
            to: to.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Customer Rules
// =============================================================================

/// Checks that a document type may be issued to this customer.
///
/// ## Rules
/// - Invoice: customer with a valid RUC
/// - Ticket above S/ 700: customer with a valid RUC or DNI
/// - Everything else: no requirement
pub fn validate_customer(
    doc_type: DocumentType,
    customer: Option<&Customer>,
    total: Money,
) -> CoreResult<()> {
    if let Some(customer) = customer {
        match (customer.identity_kind, customer.identity_number.as_deref()) {
            (IdentityKind::Ruc, Some(number)) => validate_ruc(number)?,
            (IdentityKind::Dni, Some(number)) => validate_dni(number)?,
            _ => {}
        }
    }

    match doc_type {
        DocumentType::Invoice => match customer {
            Some(c) if c.identity_kind == IdentityKind::Ruc && c.is_identified() => Ok(()),
            _ => Err(CoreError::CustomerRequired {
                reason: "an invoice requires a customer with RUC".to_string(),
            }),
        },
        DocumentType::Ticket if total.cents() > TICKET_IDENTIFICATION_THRESHOLD_CENTS => {
            match customer {
                Some(c) if c.is_identified() => Ok(()),
                _ => Err(CoreError::CustomerRequired {
                    reason: format!(
                        "tickets above {} require an identified customer",
                        Money::from_cents(TICKET_IDENTIFICATION_THRESHOLD_CENTS)
                    ),
                }),
            }
        }
        _ => Ok(()),
    }
}

// =============================================================================
// Balance Rules
// =============================================================================

/// Balance and up-front payment of a new document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpeningBalance {
    pub balance: Money,
    /// Payment recorded at issue time, if any.
    pub payment: Option<Money>,
}

/// Computes the opening saldo from the payment medium.
///
/// - Cash / wallet: paid in full, balance zero
/// - Transfer / card: `total − advance` stays outstanding
///
/// ```rust
/// use facturo_core::lifecycle::opening_balance;
/// use facturo_core::money::Money;
/// use facturo_core::types::PaymentMedium;
///
/// let ob = opening_balance(Money::from_cents(5000), PaymentMedium::Transfer, Some(2000)).unwrap();
/// assert_eq!(ob.balance.cents(), 3000);
/// assert_eq!(ob.payment, Some(Money::from_cents(2000)));
/// ```
pub fn opening_balance(
    total: Money,
    medium: PaymentMedium,
    advance_cents: Option<i64>,
) -> CoreResult<OpeningBalance> {
    if medium.settles_in_full() {
        return Ok(OpeningBalance {
            balance: Money::zero(),
            payment: total.is_positive().then_some(total),
        });
    }

    let advance = Money::from_cents(advance_cents.unwrap_or(0));
    if advance.is_negative() || advance > total {
        return Err(CoreError::InvalidPaymentAmount {
            reason: format!("advance {} must be between S/ 0.00 and {}", advance, total),
        });
    }

    Ok(OpeningBalance {
        balance: total - advance,
        payment: advance.is_positive().then_some(advance),
    })
}

/// Validates a partial settlement and returns the new balance.
///
/// ## Errors
/// - `InvalidPaymentAmount`: `amount <= 0`
/// - `AlreadyVoided`: document is voided
/// - `InvalidStateTransition`: document was rejected by the authority
/// - `InsufficientBalance`: `amount > balance`
pub fn settle(document: &Document, amount: Money) -> CoreResult<Money> {
    validate_payment_amount(amount.cents())?;

    match document.state {
        DocumentState::Voided => return Err(CoreError::AlreadyVoided(document.id.clone())),
        DocumentState::Rejected | DocumentState::Draft => {
            return Err(CoreError::InvalidStateTransition {
                document_id: document.id.clone(),
                from: document.state.to_string(),
                to: "settled".to_string(),
            })
        }
        _ => {}
    }

    if amount > document.balance() {
        return Err(CoreError::InsufficientBalance {
            document_id: document.id.clone(),
            balance: document.balance_cents,
            requested: amount.cents(),
        });
    }

    Ok(document.balance() - amount)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SettlementStatus;
    use chrono::Utc;

    fn document(doc_type: DocumentType, state: DocumentState, balance: i64) -> Document {
        let now = Utc::now();
        Document {
            id: "d1".into(),
            merchant_id: "m1".into(),
            doc_type,
            series: "NV01".into(),
            correlative: 1,
            customer_id: None,
            issue_date: now,
            currency: "PEN".into(),
            taxed_cents: 0,
            exempt_cents: 0,
            igv_cents: 0,
            total_cents: 100,
            balance_cents: balance,
            settlement: SettlementStatus::Pending,
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

    fn customer(kind: IdentityKind, number: Option<&str>) -> Customer {
        Customer {
            id: "c1".into(),
            merchant_id: "m1".into(),
            identity_kind: kind,
            identity_number: number.map(String::from),
            name: "Cliente".into(),
        }
    }

    #[test]
    fn test_initial_states() {
        assert_eq!(initial_state(DocumentType::Invoice), DocumentState::PendingSubmission);
        assert_eq!(initial_state(DocumentType::CreditNote), DocumentState::PendingSubmission);
        assert_eq!(initial_state(DocumentType::SalesNote), DocumentState::Issued);
    }

    #[test]
    fn test_transitions() {
        use DocumentState::*;
        assert!(can_transition(DocumentType::Ticket, PendingSubmission, Accepted));
        assert!(can_transition(DocumentType::Ticket, Accepted, Voided));
        assert!(!can_transition(DocumentType::Ticket, PendingSubmission, Voided));
        assert!(!can_transition(DocumentType::Ticket, Rejected, Accepted));
        assert!(can_transition(DocumentType::Order, Issued, Voided));
        assert!(!can_transition(DocumentType::Order, Issued, Accepted));
    }

    #[test]
    fn test_void_twice() {
        let doc = document(DocumentType::SalesNote, DocumentState::Voided, 0);
        assert!(matches!(
            ensure_transition(&doc, DocumentState::Voided),
            Err(CoreError::AlreadyVoided(_))
        ));

        let pending = document(DocumentType::Invoice, DocumentState::PendingSubmission, 0);
        assert!(matches!(
            ensure_transition(&pending, DocumentState::Voided),
            Err(CoreError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_invoice_requires_ruc() {
        let total = Money::from_cents(1000);
        let ruc = customer(IdentityKind::Ruc, Some("20100070970"));
        let dni = customer(IdentityKind::Dni, Some("45678912"));
        let bad_ruc = customer(IdentityKind::Ruc, Some("20512345678"));

        assert!(validate_customer(DocumentType::Invoice, Some(&ruc), total).is_ok());
        assert!(matches!(
            validate_customer(DocumentType::Invoice, Some(&dni), total),
            Err(CoreError::CustomerRequired { .. })
        ));
        assert!(validate_customer(DocumentType::Invoice, None, total).is_err());
        assert!(matches!(
            validate_customer(DocumentType::Invoice, Some(&bad_ruc), total),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_ticket_threshold() {
        let walk_in = customer(IdentityKind::Unidentified, None);
        let dni = customer(IdentityKind::Dni, Some("45678912"));

        assert!(validate_customer(DocumentType::Ticket, None, Money::from_cents(70_000)).is_ok());
        assert!(validate_customer(DocumentType::Ticket, Some(&walk_in), Money::from_cents(70_001)).is_err());
        assert!(validate_customer(DocumentType::Ticket, Some(&dni), Money::from_cents(70_001)).is_ok());
        assert!(validate_customer(DocumentType::SalesNote, None, Money::from_cents(900_000)).is_ok());
    }

    #[test]
    fn test_opening_balance() {
        let total = Money::from_cents(5000);

        let cash = opening_balance(total, PaymentMedium::Cash, None).unwrap();
        assert_eq!(cash.balance, Money::zero());
        assert_eq!(cash.payment, Some(total));

        let card = opening_balance(total, PaymentMedium::Card, None).unwrap();
        assert_eq!(card.balance, total);
        assert_eq!(card.payment, None);

        assert!(opening_balance(total, PaymentMedium::Transfer, Some(6000)).is_err());
        assert!(opening_balance(total, PaymentMedium::Transfer, Some(-1)).is_err());
    }

    #[test]
    fn test_settle_rejects_overpayment() {
        let doc = document(DocumentType::SalesNote, DocumentState::Issued, 100);
        assert!(matches!(
            settle(&doc, Money::from_cents(150)),
            Err(CoreError::InsufficientBalance { balance: 100, requested: 150, .. })
        ));
        assert!(matches!(
            settle(&doc, Money::zero()),
            Err(CoreError::InvalidPaymentAmount { .. })
        ));
        assert_eq!(settle(&doc, Money::from_cents(40)).unwrap().cents(), 60);
        assert_eq!(settle(&doc, Money::from_cents(100)).unwrap().cents(), 0);
    }
}
