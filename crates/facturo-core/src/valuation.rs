//! # Line Valuation
//!
//! Turns a requested line into its monetary breakdown.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  price (IGV incl.)   S/ 11.80                                          │
//! │       │  − discount                                                    │
//! │       ▼                                                                 │
//! │  unit_price          S/ 11.80                                          │
//! │       │  × quantity (3)                                                │
//! │       ▼                                                                 │
//! │  total_with_tax      S/ 35.40   (exact)                                │
//! │       │  ÷ 1.18                                                        │
//! │       ▼                                                                 │
//! │  line_value          S/ 30.00   (rounded once)                         │
//! │  tax_amount          S/  5.40   (= total − value, never rounded)       │
//! │  unit_value          S/ 10.00   (= unit_price ÷ 1.18)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Tax is derived as a difference so `line_value + tax_amount` always equals
//! the price the customer sees.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{DocumentLine, Product, TaxRate};
use crate::validation::{validate_discount_bps, validate_line_quantity, validate_price_cents};

// =============================================================================
// Line Valuation
// =============================================================================

/// Monetary breakdown of one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineValuation {
    pub quantity: i64,
    pub tax_rate: TaxRate,
    /// Unit price, IGV included, after discount.
    pub unit_price: Money,
    /// Unit price without IGV.
    pub unit_value: Money,
    /// Line amount without IGV.
    pub line_value: Money,
    pub tax_amount: Money,
    /// Line amount with IGV.
    pub total_with_tax: Money,
}

impl LineValuation {
    /// Values `quantity` units at a tax-inclusive unit price.
    pub fn from_gross(unit_price: Money, quantity: i64, tax_rate: TaxRate) -> Self {
        let total_with_tax = unit_price.multiply_quantity(quantity);
        let line_value = total_with_tax.net_of_tax(tax_rate);
        LineValuation {
            quantity,
            tax_rate,
            unit_price,
            unit_value: unit_price.net_of_tax(tax_rate),
            line_value,
            tax_amount: total_with_tax - line_value,
            total_with_tax,
        }
    }

    /// Rebuilds the valuation frozen on a persisted line.
    pub fn from_line(line: &DocumentLine) -> Self {
        LineValuation {
            quantity: line.quantity,
            tax_rate: line.tax_rate(),
            unit_price: Money::from_cents(line.unit_price_cents),
            unit_value: Money::from_cents(line.unit_value_cents),
            line_value: Money::from_cents(line.line_value_cents),
            tax_amount: Money::from_cents(line.tax_cents),
            total_with_tax: Money::from_cents(line.total_cents),
        }
    }

    /// Materializes the valuation as a document line.
    pub fn to_line(
        &self,
        document_id: &str,
        line_number: i64,
        product_id: Option<String>,
        description: impl Into<String>,
    ) -> DocumentLine {
        DocumentLine {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            line_number,
            product_id,
            description: description.into(),
            quantity: self.quantity,
            unit_price_cents: self.unit_price.cents(),
            unit_value_cents: self.unit_value.cents(),
            line_value_cents: self.line_value.cents(),
            tax_rate_bps: self.tax_rate.bps(),
            tax_cents: self.tax_amount.cents(),
            total_cents: self.total_with_tax.cents(),
        }
    }
}

/// Values a product line.
///
/// ## Errors
/// - `UnknownProduct`: product belongs to another merchant or is inactive
/// - `InvalidQuantity`: `quantity <= 0` or above the per-line maximum
/// - `Validation`: negative override price or discount above 100%
///
/// ## Example
/// ```rust,ignore
/// let v = value_line(&product, "merchant-1", 3, None, None)?;
/// assert_eq!(v.total_with_tax.cents(), 3 * product.price_cents);
/// ```
pub fn value_line(
    product: &Product,
    merchant_id: &str,
    quantity: i64,
    override_price_cents: Option<i64>,
    discount_bps: Option<u32>,
) -> CoreResult<LineValuation> {
    if product.merchant_id != merchant_id || !product.is_active {
        return Err(CoreError::UnknownProduct(product.id.clone()));
    }
    validate_line_quantity(quantity)?;

    let base_cents = override_price_cents.unwrap_or(product.price_cents);
    validate_price_cents(base_cents)?;
    let mut unit_price = Money::from_cents(base_cents);
    if let Some(bps) = discount_bps {
        validate_discount_bps(bps)?;
        unit_price = unit_price.apply_percentage_discount(bps);
    }

    Ok(LineValuation::from_gross(unit_price, quantity, product.tax_rate()))
}

// =============================================================================
// Document Totals
// =============================================================================

/// Aggregated amounts of a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DocumentTotals {
    /// Σ line_value of taxed lines (gravada).
    pub taxed: Money,
    /// Σ line_value of zero-rate lines (exonerada).
    pub exempt: Money,
    pub igv: Money,
    pub total: Money,
}

impl DocumentTotals {
    /// Adds one line.
    pub fn add(&mut self, line: &LineValuation) {
        if line.tax_rate.is_zero() {
            self.exempt += line.line_value;
        } else {
            self.taxed += line.line_value;
        }
        self.igv += line.tax_amount;
        self.total += line.total_with_tax;
    }

    /// Aggregates a set of lines.
    pub fn from_valuations<'a>(lines: impl IntoIterator<Item = &'a LineValuation>) -> Self {
        let mut totals = DocumentTotals::default();
        for line in lines {
            totals.add(line);
        }
        totals
    }

    /// Aggregates persisted lines.
    pub fn from_lines(lines: &[DocumentLine]) -> Self {
        let valuations: Vec<LineValuation> = lines.iter().map(LineValuation::from_line).collect();
        Self::from_valuations(&valuations)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn product(price_cents: i64, tax_rate_bps: u32) -> Product {
        Product {
            id: "p1".into(),
            merchant_id: "m1".into(),
            code: "ARROZ-5KG".into(),
            name: "Arroz Costeño 5kg".into(),
            price_cents,
            tax_rate_bps,
            track_inventory: true,
            current_stock: 10,
            average_cost: 0,
            min_stock: None,
            max_stock: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_value_taxed_line() {
        let v = value_line(&product(1180, 1800), "m1", 3, None, None).unwrap();
        assert_eq!(v.unit_price.cents(), 1180);
        assert_eq!(v.unit_value.cents(), 1000);
        assert_eq!(v.total_with_tax.cents(), 3540);
        assert_eq!(v.line_value.cents(), 3000);
        assert_eq!(v.tax_amount.cents(), 540);
    }

    #[test]
    fn test_tax_is_the_difference() {
        // 7 × S/ 3.90 = 27.30 → value 23.14, tax 4.16
        let v = value_line(&product(390, 1800), "m1", 7, None, None).unwrap();
        assert_eq!(v.total_with_tax.cents(), 2730);
        assert_eq!(v.line_value.cents(), 2314);
        assert_eq!(v.tax_amount.cents(), 416);
        assert_eq!(v.line_value + v.tax_amount, v.total_with_tax);
    }

    #[test]
    fn test_exempt_line() {
        let v = value_line(&product(500, 0), "m1", 2, None, None).unwrap();
        assert_eq!(v.line_value.cents(), 1000);
        assert_eq!(v.tax_amount.cents(), 0);
    }

    #[test]
    fn test_override_and_discount() {
        // override 20.00, 10% off → 18.00
        let v = value_line(&product(1180, 1800), "m1", 1, Some(2000), Some(1000)).unwrap();
        assert_eq!(v.unit_price.cents(), 1800);
        assert_eq!(v.total_with_tax.cents(), 1800);
    }

    #[test]
    fn test_foreign_or_inactive_product() {
        assert!(matches!(
            value_line(&product(100, 1800), "m2", 1, None, None),
            Err(CoreError::UnknownProduct(_))
        ));

        let mut inactive = product(100, 1800);
        inactive.is_active = false;
        assert!(matches!(
            value_line(&inactive, "m1", 1, None, None),
            Err(CoreError::UnknownProduct(_))
        ));
    }

    #[test]
    fn test_invalid_quantity() {
        assert!(matches!(
            value_line(&product(100, 1800), "m1", 0, None, None),
            Err(CoreError::InvalidQuantity { quantity: 0 })
        ));
    }

    #[test]
    fn test_document_totals() {
        let taxed = value_line(&product(1180, 1800), "m1", 2, None, None).unwrap();
        let exempt = value_line(&product(350, 0), "m1", 4, None, None).unwrap();
        let totals = DocumentTotals::from_valuations(&[taxed, exempt]);

        assert_eq!(totals.taxed.cents(), 2000);
        assert_eq!(totals.exempt.cents(), 1400);
        assert_eq!(totals.igv.cents(), 360);
        assert_eq!(totals.total.cents(), 3760);
    }

    #[test]
    fn test_line_round_trip() {
        let v = value_line(&product(1180, 1800), "m1", 2, None, None).unwrap();
        let line = v.to_line("d1", 1, Some("p1".into()), "Arroz");
        assert_eq!(LineValuation::from_line(&line), v);
        assert_eq!(DocumentTotals::from_lines(&[line]).total.cents(), 2360);
    }
}
