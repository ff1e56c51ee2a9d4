//! # Kardex Module
//!
//! Stock movement arithmetic, threshold detection and ledger replay.
//!
//! ## Movement Rules
//! ```text
//! ┌──────────────────┬────────────────────────────┬─────────────────────────┐
//! │ Kind             │ stock_after                │ average cost            │
//! ├──────────────────┼────────────────────────────┼─────────────────────────┤
//! │ INGRESO          │ before + qty               │ re-blended (weighted)   │
//! │ SALIDA           │ before − qty  (must ≥ 0)   │ unchanged               │
//! │ TRANSFERENCIA    │ before − qty  (must ≥ 0)   │ unchanged               │
//! │ AJUSTE           │ qty (absolute target)      │ unchanged               │
//! └──────────────────┴────────────────────────────┴─────────────────────────┘
//! ```
//!
//! Every persisted movement stores the signed delta it applied, so a replay
//! only needs `stock_after == stock_before + quantity` and a chain where each
//! entry starts where the previous one ended.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::UnitCost;
use crate::types::{MovementKind, Product, StockMovement};

// =============================================================================
// Movement Computation
// =============================================================================

/// Result of applying one movement to a product's stock and cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovementEffect {
    /// Signed delta actually applied.
    pub delta: i64,
    pub stock_after: i64,
    /// Unit cost recorded on the movement.
    pub unit_cost: UnitCost,
    pub cost_after: UnitCost,
}

/// Computes the effect of a movement.
///
/// ## Arguments
/// * `code` - product code, used in error messages
/// * `quantity` - units moved; for AJUSTE, the counted target
/// * `unit_cost` - inflow cost; defaults to the current average
///
/// ## Errors
/// - `InvalidQuantity`: non-positive quantity (negative target for AJUSTE)
/// - `InsufficientStock`: outflow larger than the available stock
///
/// ## Example
/// ```rust
/// use facturo_core::kardex::compute_movement;
/// use facturo_core::money::UnitCost;
/// use facturo_core::types::MovementKind;
///
/// let effect = compute_movement(
///     "ARROZ-5KG", MovementKind::Ingreso,
///     50, UnitCost::from_scaled(80_000),
///     10, Some(UnitCost::from_scaled(90_000)),
/// ).unwrap();
/// assert_eq!(effect.stock_after, 60);
/// assert_eq!(effect.cost_after.to_string(), "8.1667");
/// ```
pub fn compute_movement(
    code: &str,
    kind: MovementKind,
    stock_before: i64,
    cost_before: UnitCost,
    quantity: i64,
    unit_cost: Option<UnitCost>,
) -> CoreResult<MovementEffect> {
    match kind {
        MovementKind::Ingreso => {
            if quantity <= 0 {
                return Err(CoreError::InvalidQuantity { quantity });
            }
            let unit_cost = unit_cost.unwrap_or(cost_before);
            Ok(MovementEffect {
                delta: quantity,
                stock_after: stock_before + quantity,
                unit_cost,
                cost_after: UnitCost::weighted_average(stock_before, cost_before, quantity, unit_cost),
            })
        }
        MovementKind::Salida | MovementKind::Transferencia => {
            if quantity <= 0 {
                return Err(CoreError::InvalidQuantity { quantity });
            }
            let stock_after = stock_before - quantity;
            if stock_after < 0 {
                return Err(CoreError::InsufficientStock {
                    code: code.to_string(),
                    available: stock_before,
                    requested: quantity,
                });
            }
            Ok(MovementEffect {
                delta: -quantity,
                stock_after,
                unit_cost: cost_before,
                cost_after: cost_before,
            })
        }
        MovementKind::Ajuste => {
            if quantity < 0 {
                return Err(CoreError::InvalidQuantity { quantity });
            }
            Ok(MovementEffect {
                delta: quantity - stock_before,
                stock_after: quantity,
                unit_cost: unit_cost.unwrap_or(cost_before),
                cost_after: cost_before,
            })
        }
    }
}

// =============================================================================
// Threshold Alerts
// =============================================================================

/// Stock threshold crossed by a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdAlert {
    /// Stock fell to or below `min_stock`.
    LowStock,
    /// Stock reached zero.
    StockOut,
}

/// Detects a threshold crossing. Only a transition fires, so repeated
/// sales below the minimum do not repeat the alert.
pub fn crossed_threshold(
    stock_before: i64,
    stock_after: i64,
    min_stock: Option<i64>,
) -> Option<ThresholdAlert> {
    if stock_after <= 0 && stock_before > 0 {
        return Some(ThresholdAlert::StockOut);
    }
    match min_stock {
        Some(min) if stock_before > min && stock_after <= min => Some(ThresholdAlert::LowStock),
        _ => None,
    }
}

// =============================================================================
// Replay
// =============================================================================

/// An inconsistency found while replaying a product's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerIssue {
    /// An entry does not start where the previous one ended.
    BrokenLink {
        seq: i64,
        expected_before: i64,
        found_before: i64,
    },
    /// An entry's cost does not start where the previous one ended.
    BrokenCostLink {
        seq: i64,
        expected_cost: i64,
        found_cost: i64,
    },
    /// `stock_after != stock_before + quantity`.
    BadArithmetic { seq: i64 },
    /// Replayed stock differs from the product row.
    FinalStockMismatch { ledger: i64, stored: i64 },
    /// Product holds stock but has no movements.
    NoHistory { stored: i64 },
}

/// Replay result for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductReplay {
    pub product_id: String,
    pub code: String,
    pub movements: usize,
    /// Stock obtained by replaying from zero.
    pub replayed_stock: i64,
    pub stored_stock: i64,
    pub issues: Vec<LedgerIssue>,
}

impl ProductReplay {
    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Replays a product's movements (in `seq` order) from zero stock.
///
/// Reports issues; never corrects anything.
pub fn replay(product: &Product, movements: &[StockMovement]) -> ProductReplay {
    let mut issues = Vec::new();
    let mut stock = 0i64;
    let mut cost: Option<i64> = None;

    for movement in movements {
        if movement.stock_before != stock {
            issues.push(LedgerIssue::BrokenLink {
                seq: movement.seq,
                expected_before: stock,
                found_before: movement.stock_before,
            });
        }
        if let Some(expected_cost) = cost {
            if movement.cost_before != expected_cost {
                issues.push(LedgerIssue::BrokenCostLink {
                    seq: movement.seq,
                    expected_cost,
                    found_cost: movement.cost_before,
                });
            }
        }
        if movement.stock_after != movement.stock_before + movement.quantity {
            issues.push(LedgerIssue::BadArithmetic { seq: movement.seq });
        }
        stock = movement.stock_after;
        cost = Some(movement.cost_after);
    }

    if movements.is_empty() {
        if product.current_stock != 0 {
            issues.push(LedgerIssue::NoHistory {
                stored: product.current_stock,
            });
        }
    } else if stock != product.current_stock {
        issues.push(LedgerIssue::FinalStockMismatch {
            ledger: stock,
            stored: product.current_stock,
        });
    }

    ProductReplay {
        product_id: product.id.clone(),
        code: product.code.clone(),
        movements: movements.len(),
        replayed_stock: stock,
        stored_stock: product.current_stock,
        issues,
    }
}

/// Merchant-wide reconciliation report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReconcileReport {
    pub merchant_id: String,
    pub products_checked: usize,
    /// Only products with at least one issue.
    pub mismatches: Vec<ProductReplay>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn cost(scaled: i64) -> UnitCost {
        UnitCost::from_scaled(scaled)
    }

    #[test]
    fn test_ingreso_reblends_cost() {
        let e = compute_movement("X", MovementKind::Ingreso, 50, cost(80_000), 10, Some(cost(90_000)))
            .unwrap();
        assert_eq!(e.delta, 10);
        assert_eq!(e.stock_after, 60);
        assert_eq!(e.cost_after.scaled(), 81_667);
    }

    #[test]
    fn test_ingreso_defaults_to_current_cost() {
        let e = compute_movement("X", MovementKind::Ingreso, 5, cost(12_345), 5, None).unwrap();
        assert_eq!(e.unit_cost.scaled(), 12_345);
        assert_eq!(e.cost_after.scaled(), 12_345);
    }

    #[test]
    fn test_salida_keeps_cost_and_checks_stock() {
        let e = compute_movement("X", MovementKind::Salida, 8, cost(50_000), 3, None).unwrap();
        assert_eq!(e.delta, -3);
        assert_eq!(e.stock_after, 5);
        assert_eq!(e.cost_after.scaled(), 50_000);

        let err = compute_movement("ARROZ", MovementKind::Transferencia, 2, cost(0), 3, None)
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock { available: 2, requested: 3, .. }
        ));
    }

    #[test]
    fn test_ajuste_stores_signed_delta() {
        let down = compute_movement("X", MovementKind::Ajuste, 10, cost(10_000), 7, None).unwrap();
        assert_eq!(down.delta, -3);
        assert_eq!(down.stock_after, 7);

        let up = compute_movement("X", MovementKind::Ajuste, 10, cost(10_000), 12, None).unwrap();
        assert_eq!(up.delta, 2);
        assert_eq!(up.cost_after.scaled(), 10_000);

        assert!(compute_movement("X", MovementKind::Ajuste, 10, cost(0), -1, None).is_err());
    }

    #[test]
    fn test_non_positive_quantities_rejected() {
        for kind in [MovementKind::Ingreso, MovementKind::Salida, MovementKind::Transferencia] {
            assert!(matches!(
                compute_movement("X", kind, 10, cost(0), 0, None),
                Err(CoreError::InvalidQuantity { .. })
            ));
        }
    }

    #[test]
    fn test_threshold_crossing() {
        assert_eq!(crossed_threshold(6, 5, Some(5)), Some(ThresholdAlert::LowStock));
        assert_eq!(crossed_threshold(5, 4, Some(5)), None);
        assert_eq!(crossed_threshold(3, 0, Some(5)), Some(ThresholdAlert::StockOut));
        assert_eq!(crossed_threshold(0, 0, None), None);
        assert_eq!(crossed_threshold(10, 9, None), None);
    }

    fn product(stock: i64) -> Product {
        Product {
            id: "p1".into(),
            merchant_id: "m1".into(),
            code: "ACEITE-1L".into(),
            name: "Aceite 1L".into(),
            price_cents: 990,
            tax_rate_bps: 1800,
            track_inventory: true,
            current_stock: stock,
            average_cost: 60_000,
            min_stock: None,
            max_stock: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn movement(seq: i64, kind: MovementKind, before: i64, qty: i64, after: i64) -> StockMovement {
        StockMovement {
            id: format!("mv{}", seq),
            seq,
            product_id: "p1".into(),
            merchant_id: "m1".into(),
            kind,
            quantity: qty,
            stock_before: before,
            stock_after: after,
            unit_cost: 60_000,
            cost_before: 60_000,
            cost_after: 60_000,
            document_id: None,
            note: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_replay_consistent_ledger() {
        let movements = vec![
            movement(1, MovementKind::Ajuste, 0, 20, 20),
            movement(2, MovementKind::Salida, 20, -5, 15),
            movement(3, MovementKind::Ingreso, 15, 5, 20),
        ];
        let report = replay(&product(20), &movements);
        assert!(report.is_consistent());
        assert_eq!(report.replayed_stock, 20);
    }

    #[test]
    fn test_replay_reports_without_fixing() {
        let movements = vec![
            movement(1, MovementKind::Ajuste, 0, 20, 20),
            movement(2, MovementKind::Salida, 18, -5, 13),
        ];
        let report = replay(&product(15), &movements);
        assert_eq!(
            report.issues,
            vec![
                LedgerIssue::BrokenLink { seq: 2, expected_before: 20, found_before: 18 },
                LedgerIssue::FinalStockMismatch { ledger: 13, stored: 15 },
            ]
        );
        assert_eq!(report.stored_stock, 15);
    }

    #[test]
    fn test_replay_without_history() {
        assert!(replay(&product(0), &[]).is_consistent());
        assert_eq!(
            replay(&product(4), &[]).issues,
            vec![LedgerIssue::NoHistory { stored: 4 }]
        );
    }
}
