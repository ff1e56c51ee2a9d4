//! # Motive Module
//!
//! Credit/debit note motives and the adjustment rule each one applies.
//!
//! ## Motive Table
//! ```text
//! ┌──────┬────────┬─────────────────────────────┬────────────┬──────────────┐
//! │ Code │ Kind   │ Lines                       │ Affected   │ Stock        │
//! ├──────┼────────┼─────────────────────────────┼────────────┼──────────────┤
//! │ 01   │ credit │ copy of all original lines  │ VOID       │ full (void)  │
//! │ 02   │ credit │ copy of all original lines  │ unchanged  │ none         │
//! │ 03   │ credit │ originals + new descriptions│ unchanged  │ none         │
//! │ 04   │ credit │ one synthetic discount line │ unchanged  │ none         │
//! │ 05   │ credit │ (old − new price) per item  │ unchanged  │ none         │
//! │ 06   │ credit │ copy of all original lines  │ unchanged  │ full         │
//! │ 07   │ credit │ returned items              │ unchanged  │ returned qty │
//! │ 01-03│ debit  │ caller charge lines         │ unchanged  │ none         │
//! └──────┴────────┴─────────────────────────────┴────────────┴──────────────┘
//! ```
//!
//! Codes follow the tax authority catalogs 09 (credit) and 10 (debit), so
//! the same code can exist for both kinds.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{AdjustmentLine, DocumentLine, DocumentType, TaxRate};
use crate::validation::{validate_description, validate_line_quantity};
use crate::valuation::{DocumentTotals, LineValuation};

// =============================================================================
// Motive Catalog
// =============================================================================

/// Whether a motive belongs to credit or debit notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MotiveKind {
    Credit,
    Debit,
}

impl MotiveKind {
    /// The note type that carries this kind of motive.
    pub const fn note_type(&self) -> DocumentType {
        match self {
            MotiveKind::Credit => DocumentType::CreditNote,
            MotiveKind::Debit => DocumentType::DebitNote,
        }
    }
}

/// How a motive builds its lines and what it does after acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentRule {
    FullCancellation,
    RucCorrection,
    DescriptionCorrection,
    GlobalDiscount,
    ItemDiscount,
    FullReturn,
    ItemReturn,
    DebitCharge,
}

/// Stock consequence of an accepted note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockEffect {
    None,
    /// Reversal through voiding the affected document.
    ViaVoid,
    /// INGRESO of every product line of the note.
    ReturnNoteLines,
}

impl AdjustmentRule {
    /// Rules that cannot run without caller line detail.
    pub const fn requires_lines(&self) -> bool {
        matches!(
            self,
            AdjustmentRule::DescriptionCorrection
                | AdjustmentRule::ItemDiscount
                | AdjustmentRule::ItemReturn
                | AdjustmentRule::DebitCharge
        )
    }

    /// True when acceptance voids the affected document.
    pub const fn voids_affected(&self) -> bool {
        matches!(self, AdjustmentRule::FullCancellation)
    }

    pub const fn stock_effect(&self) -> StockEffect {
        match self {
            AdjustmentRule::FullCancellation => StockEffect::ViaVoid,
            AdjustmentRule::FullReturn | AdjustmentRule::ItemReturn => StockEffect::ReturnNoteLines,
            _ => StockEffect::None,
        }
    }

    /// True when the affected document drops out of accounting summaries.
    pub const fn cancels_affected(&self) -> bool {
        matches!(self, AdjustmentRule::FullCancellation | AdjustmentRule::FullReturn)
    }
}

/// A catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Motive {
    pub code: &'static str,
    pub kind: MotiveKind,
    pub description: &'static str,
    pub rule: AdjustmentRule,
}

/// Static motive table.
pub static MOTIVES: [Motive; 10] = [
    Motive { code: "01", kind: MotiveKind::Credit, description: "Anulación de la operación", rule: AdjustmentRule::FullCancellation },
    Motive { code: "02", kind: MotiveKind::Credit, description: "Anulación por error en el RUC", rule: AdjustmentRule::RucCorrection },
    Motive { code: "03", kind: MotiveKind::Credit, description: "Corrección por error en la descripción", rule: AdjustmentRule::DescriptionCorrection },
    Motive { code: "04", kind: MotiveKind::Credit, description: "Descuento global", rule: AdjustmentRule::GlobalDiscount },
    Motive { code: "05", kind: MotiveKind::Credit, description: "Descuento por ítem", rule: AdjustmentRule::ItemDiscount },
    Motive { code: "06", kind: MotiveKind::Credit, description: "Devolución total", rule: AdjustmentRule::FullReturn },
    Motive { code: "07", kind: MotiveKind::Credit, description: "Devolución por ítem", rule: AdjustmentRule::ItemReturn },
    Motive { code: "01", kind: MotiveKind::Debit, description: "Intereses por mora", rule: AdjustmentRule::DebitCharge },
    Motive { code: "02", kind: MotiveKind::Debit, description: "Aumento en el valor", rule: AdjustmentRule::DebitCharge },
    Motive { code: "03", kind: MotiveKind::Debit, description: "Penalidades / otros conceptos", rule: AdjustmentRule::DebitCharge },
];

/// Finds the motive for a note type.
///
/// ## Errors
/// - `InvalidDocumentType`: `note_type` is not a credit or debit note
/// - `MotiveKindMismatch`: the code exists only for the other kind
/// - `UnknownMotive`: the code does not exist at all
///
/// ```rust
/// use facturo_core::motive::{lookup, AdjustmentRule};
/// use facturo_core::types::DocumentType;
///
/// let motive = lookup(DocumentType::CreditNote, "01").unwrap();
/// assert_eq!(motive.rule, AdjustmentRule::FullCancellation);
/// assert!(lookup(DocumentType::DebitNote, "07").is_err());
/// ```
pub fn lookup(note_type: DocumentType, code: &str) -> CoreResult<&'static Motive> {
    let kind = match note_type {
        DocumentType::CreditNote => MotiveKind::Credit,
        DocumentType::DebitNote => MotiveKind::Debit,
        other => return Err(CoreError::InvalidDocumentType(other.to_string())),
    };
    let code = code.trim();

    if let Some(motive) = MOTIVES.iter().find(|m| m.kind == kind && m.code == code) {
        return Ok(motive);
    }
    if MOTIVES.iter().any(|m| m.code == code) {
        return Err(CoreError::MotiveKindMismatch {
            code: code.to_string(),
            note_type: note_type.to_string(),
        });
    }
    Err(CoreError::UnknownMotive(code.to_string()))
}

// =============================================================================
// Adjustment Lines
// =============================================================================

/// A note line before it is bound to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustedLine {
    pub product_id: Option<String>,
    pub description: String,
    pub valuation: LineValuation,
}

/// Description of the synthetic global discount line.
const GLOBAL_DISCOUNT_DESCRIPTION: &str = "Descuento global";

/// Builds the lines of a note from the affected document's lines.
///
/// ## Arguments
/// * `affected` - lines of the affected document, in line order
/// * `requested` - caller detail (meaning depends on the rule)
/// * `discount_cents` - global discount, IGV included (motive 04 only)
///
/// ## Errors
/// - `MissingAdjustmentLines`: rule needs detail and none was given
/// - `InvalidAdjustment`: detail inconsistent with the affected lines
pub fn build_adjustment(
    motive: &Motive,
    affected: &[DocumentLine],
    requested: &[AdjustmentLine],
    discount_cents: Option<i64>,
) -> CoreResult<Vec<AdjustedLine>> {
    if motive.rule.requires_lines() && requested.is_empty() {
        return Err(CoreError::MissingAdjustmentLines {
            code: motive.code.to_string(),
        });
    }

    match motive.rule {
        AdjustmentRule::FullCancellation | AdjustmentRule::RucCorrection | AdjustmentRule::FullReturn => {
            Ok(affected.iter().map(copy_line).collect())
        }
        AdjustmentRule::DescriptionCorrection => correct_descriptions(affected, requested),
        AdjustmentRule::GlobalDiscount => global_discount(affected, discount_cents),
        AdjustmentRule::ItemDiscount => item_discounts(affected, requested),
        AdjustmentRule::ItemReturn => item_returns(affected, requested),
        AdjustmentRule::DebitCharge => debit_charges(affected, requested),
    }
}

fn copy_line(line: &DocumentLine) -> AdjustedLine {
    AdjustedLine {
        product_id: line.product_id.clone(),
        description: line.description.clone(),
        valuation: LineValuation::from_line(line),
    }
}

fn find_line<'a>(affected: &'a [DocumentLine], line_number: Option<i64>) -> CoreResult<&'a DocumentLine> {
    let number = line_number.ok_or_else(|| CoreError::InvalidAdjustment {
        reason: "line_number is required".to_string(),
    })?;
    affected
        .iter()
        .find(|l| l.line_number == number)
        .ok_or_else(|| CoreError::InvalidAdjustment {
            reason: format!("affected document has no line {}", number),
        })
}

/// Rate used for lines that do not come from a product.
fn reference_rate(affected: &[DocumentLine]) -> TaxRate {
    affected
        .iter()
        .map(DocumentLine::tax_rate)
        .find(|r| !r.is_zero())
        .unwrap_or_else(TaxRate::zero)
}

fn correct_descriptions(
    affected: &[DocumentLine],
    requested: &[AdjustmentLine],
) -> CoreResult<Vec<AdjustedLine>> {
    let mut corrections: HashMap<i64, String> = HashMap::new();
    for req in requested {
        let original = find_line(affected, req.line_number)?;
        let description = req.description.as_deref().unwrap_or_default().trim();
        validate_description("description", description)?;
        corrections.insert(original.line_number, description.to_string());
    }

    Ok(affected
        .iter()
        .map(|line| {
            let mut adjusted = copy_line(line);
            if let Some(description) = corrections.remove(&line.line_number) {
                adjusted.description = description;
            }
            adjusted
        })
        .collect())
}

fn global_discount(affected: &[DocumentLine], discount_cents: Option<i64>) -> CoreResult<Vec<AdjustedLine>> {
    let amount = discount_cents.ok_or_else(|| CoreError::InvalidAdjustment {
        reason: "global discount amount is required".to_string(),
    })?;
    let affected_total = DocumentTotals::from_lines(affected).total;
    if amount <= 0 || amount > affected_total.cents() {
        return Err(CoreError::InvalidAdjustment {
            reason: format!(
                "discount {} must be positive and at most {}",
                Money::from_cents(amount),
                affected_total
            ),
        });
    }

    Ok(vec![AdjustedLine {
        product_id: None,
        description: GLOBAL_DISCOUNT_DESCRIPTION.to_string(),
        valuation: LineValuation::from_gross(Money::from_cents(amount), 1, reference_rate(affected)),
    }])
}

fn item_discounts(affected: &[DocumentLine], requested: &[AdjustmentLine]) -> CoreResult<Vec<AdjustedLine>> {
    requested
        .iter()
        .map(|req| {
            let original = find_line(affected, req.line_number)?;
            let new_price = req.unit_price_cents.ok_or_else(|| CoreError::InvalidAdjustment {
                reason: format!("line {}: new unit price is required", original.line_number),
            })?;
            if new_price < 0 || new_price >= original.unit_price_cents {
                return Err(CoreError::InvalidAdjustment {
                    reason: format!(
                        "line {}: new price must be below {}",
                        original.line_number,
                        Money::from_cents(original.unit_price_cents)
                    ),
                });
            }
            let quantity = req.quantity.unwrap_or(original.quantity);
            validate_line_quantity(quantity)?;
            if quantity > original.quantity {
                return Err(CoreError::InvalidAdjustment {
                    reason: format!(
                        "line {}: quantity {} exceeds original {}",
                        original.line_number, quantity, original.quantity
                    ),
                });
            }
            let difference = Money::from_cents(original.unit_price_cents - new_price);
            Ok(AdjustedLine {
                product_id: original.product_id.clone(),
                description: original.description.clone(),
                valuation: LineValuation::from_gross(difference, quantity, original.tax_rate()),
            })
        })
        .collect()
}

fn item_returns(affected: &[DocumentLine], requested: &[AdjustmentLine]) -> CoreResult<Vec<AdjustedLine>> {
    let mut returned: HashMap<i64, i64> = HashMap::new();
    let mut lines = Vec::with_capacity(requested.len());

    for req in requested {
        let original = find_line(affected, req.line_number)?;
        let quantity = req.quantity.ok_or_else(|| CoreError::InvalidAdjustment {
            reason: format!("line {}: returned quantity is required", original.line_number),
        })?;
        validate_line_quantity(quantity)?;

        let total_returned = returned.entry(original.line_number).or_insert(0);
        *total_returned += quantity;
        if *total_returned > original.quantity {
            return Err(CoreError::InvalidAdjustment {
                reason: format!(
                    "line {}: returned quantity {} exceeds original {}",
                    original.line_number, total_returned, original.quantity
                ),
            });
        }

        lines.push(AdjustedLine {
            product_id: original.product_id.clone(),
            description: original.description.clone(),
            valuation: LineValuation::from_gross(
                Money::from_cents(original.unit_price_cents),
                quantity,
                original.tax_rate(),
            ),
        });
    }

    Ok(lines)
}

fn debit_charges(affected: &[DocumentLine], requested: &[AdjustmentLine]) -> CoreResult<Vec<AdjustedLine>> {
    let default_rate = if affected.is_empty() {
        TaxRate::IGV
    } else {
        reference_rate(affected)
    };

    requested
        .iter()
        .map(|req| {
            let description = req.description.as_deref().unwrap_or_default().trim();
            validate_description("description", description)?;
            let quantity = req.quantity.unwrap_or(1);
            validate_line_quantity(quantity)?;
            let price = req.unit_price_cents.unwrap_or(0);
            if price <= 0 {
                return Err(CoreError::InvalidAdjustment {
                    reason: format!("charge '{}' needs a positive unit price", description),
                });
            }
            let rate = req.tax_rate_bps.map(TaxRate::from_bps).unwrap_or(default_rate);
            Ok(AdjustedLine {
                product_id: None,
                description: description.to_string(),
                valuation: LineValuation::from_gross(Money::from_cents(price), quantity, rate),
            })
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line(number: i64, product: &str, qty: i64, price: i64, rate: u32) -> DocumentLine {
        LineValuation::from_gross(Money::from_cents(price), qty, TaxRate::from_bps(rate)).to_line(
            "inv-1",
            number,
            Some(product.to_string()),
            format!("Producto {}", number),
        )
    }

    fn invoice_lines() -> Vec<DocumentLine> {
        vec![line(1, "p1", 5, 1180, 1800), line(2, "p2", 3, 500, 1800)]
    }

    fn credit(code: &str) -> &'static Motive {
        lookup(DocumentType::CreditNote, code).unwrap()
    }

    #[test]
    fn test_lookup() {
        assert_eq!(credit("06").rule, AdjustmentRule::FullReturn);
        assert_eq!(
            lookup(DocumentType::DebitNote, "02").unwrap().rule,
            AdjustmentRule::DebitCharge
        );
        assert!(matches!(
            lookup(DocumentType::DebitNote, "05"),
            Err(CoreError::MotiveKindMismatch { .. })
        ));
        assert!(matches!(
            lookup(DocumentType::CreditNote, "13"),
            Err(CoreError::UnknownMotive(_))
        ));
        assert!(matches!(
            lookup(DocumentType::Invoice, "01"),
            Err(CoreError::InvalidDocumentType(_))
        ));
    }

    #[test]
    fn test_rule_effects() {
        assert!(credit("01").rule.voids_affected());
        assert_eq!(credit("01").rule.stock_effect(), StockEffect::ViaVoid);
        assert_eq!(credit("06").rule.stock_effect(), StockEffect::ReturnNoteLines);
        assert_eq!(credit("07").rule.stock_effect(), StockEffect::ReturnNoteLines);
        assert_eq!(credit("02").rule.stock_effect(), StockEffect::None);
        assert!(!credit("06").rule.voids_affected());
        assert!(credit("06").rule.cancels_affected());
    }

    #[test]
    fn test_full_cancellation_copies_lines() {
        let affected = invoice_lines();
        let lines = build_adjustment(credit("01"), &affected, &[], None).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].valuation.quantity, 5);
        assert_eq!(lines[1].valuation.quantity, 3);
        assert_eq!(
            DocumentTotals::from_valuations(lines.iter().map(|l| &l.valuation)).total,
            DocumentTotals::from_lines(&affected).total
        );
    }

    #[test]
    fn test_missing_lines() {
        for code in ["03", "05", "07"] {
            assert!(matches!(
                build_adjustment(credit(code), &invoice_lines(), &[], None),
                Err(CoreError::MissingAdjustmentLines { .. })
            ));
        }
        let debit = lookup(DocumentType::DebitNote, "01").unwrap();
        assert!(matches!(
            build_adjustment(debit, &invoice_lines(), &[], None),
            Err(CoreError::MissingAdjustmentLines { .. })
        ));
    }

    #[test]
    fn test_description_correction_merges() {
        let req = AdjustmentLine {
            line_number: Some(2),
            description: Some("Aceite vegetal 1L".into()),
            ..Default::default()
        };
        let lines = build_adjustment(credit("03"), &invoice_lines(), &[req], None).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].description, "Producto 1");
        assert_eq!(lines[1].description, "Aceite vegetal 1L");
    }

    #[test]
    fn test_global_discount_line() {
        let lines = build_adjustment(credit("04"), &invoice_lines(), &[], Some(1180)).unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].product_id.is_none());
        assert_eq!(lines[0].valuation.line_value.cents(), 1000);
        assert_eq!(lines[0].valuation.tax_amount.cents(), 180);

        assert!(build_adjustment(credit("04"), &invoice_lines(), &[], Some(0)).is_err());
        assert!(build_adjustment(credit("04"), &invoice_lines(), &[], Some(1_000_000)).is_err());
        assert!(build_adjustment(credit("04"), &invoice_lines(), &[], None).is_err());
    }

    #[test]
    fn test_item_discount_uses_price_difference() {
        let req = AdjustmentLine {
            line_number: Some(1),
            unit_price_cents: Some(944),
            ..Default::default()
        };
        let lines = build_adjustment(credit("05"), &invoice_lines(), &[req], None).unwrap();
        // (11.80 − 9.44) × 5 = 11.80
        assert_eq!(lines[0].valuation.total_with_tax.cents(), 1180);
        assert_eq!(lines[0].valuation.quantity, 5);

        let raise = AdjustmentLine {
            line_number: Some(1),
            unit_price_cents: Some(1500),
            ..Default::default()
        };
        assert!(build_adjustment(credit("05"), &invoice_lines(), &[raise], None).is_err());
    }

    #[test]
    fn test_item_return_limits_quantity() {
        let ok = AdjustmentLine {
            line_number: Some(1),
            quantity: Some(2),
            ..Default::default()
        };
        let lines = build_adjustment(credit("07"), &invoice_lines(), &[ok.clone()], None).unwrap();
        assert_eq!(lines[0].product_id.as_deref(), Some("p1"));
        assert_eq!(lines[0].valuation.total_with_tax.cents(), 2360);

        let too_many = AdjustmentLine {
            line_number: Some(1),
            quantity: Some(4),
            ..Default::default()
        };
        assert!(matches!(
            build_adjustment(credit("07"), &invoice_lines(), &[ok, too_many], None),
            Err(CoreError::InvalidAdjustment { .. })
        ));

        let unknown_line = AdjustmentLine {
            line_number: Some(9),
            quantity: Some(1),
            ..Default::default()
        };
        assert!(build_adjustment(credit("07"), &invoice_lines(), &[unknown_line], None).is_err());
    }

    #[test]
    fn test_debit_charge_lines() {
        let debit = lookup(DocumentType::DebitNote, "01").unwrap();
        let req = AdjustmentLine {
            description: Some("Intereses por mora marzo".into()),
            unit_price_cents: Some(2360),
            ..Default::default()
        };
        let lines = build_adjustment(debit, &invoice_lines(), &[req], None).unwrap();
        assert!(lines[0].product_id.is_none());
        assert_eq!(lines[0].valuation.quantity, 1);
        assert_eq!(lines[0].valuation.line_value.cents(), 2000);

        let free = AdjustmentLine {
            description: Some("Penalidad".into()),
            ..Default::default()
        };
        assert!(build_adjustment(debit, &invoice_lines(), &[free], None).is_err());
    }
}
