//! # Inventory Ledger (Kardex)
//!
//! Appends stock movements, keeps the weighted-average cost and answers
//! stock and valuation queries.
//!
//! ## Posting a Movement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  post_in(conn, request)              (inside the caller's transaction) │
//! │                                                                         │
//! │  1. product::lock        touch the row: takes the SQLite write lock    │
//! │  2. product::get         merchant check                                │
//! │  3. movement::latest     stock/cost before (product row if no history) │
//! │  4. compute_movement     SALIDA/TRANSFERENCIA −, INGRESO + and W.A.C.,  │
//! │                          AJUSTE absolute target                         │
//! │  5. movement::insert     append, seq assigned by SQLite                 │
//! │  6. product::update_stock                                               │
//! │                                                                         │
//! │  after COMMIT: dispatch threshold alerts (failures only logged)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The ledger knows nothing about documents beyond an optional link id,
//! and reaches the notifier only through [`NotificationSink`].

use chrono::Utc;
use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use facturo_core::kardex::{self, compute_movement, crossed_threshold, ReconcileReport, ThresholdAlert};
use facturo_core::validation::{
    validate_description, validate_price_cents, validate_product_code, validate_stock_level,
    validate_tax_rate_bps,
};
use facturo_core::{
    CoreError, MovementKind, MovementQuery, NewProduct, Product, StockMovement, StockReading,
    StockSource, UnitCost, ValidationError, ValuationRow,
};
use facturo_db::repository::{movement, product};
use facturo_db::Database;

use crate::error::EngineResult;
use crate::ports::{NotificationSink, StockAlert};

// =============================================================================
// Requests
// =============================================================================

/// A movement to post.
#[derive(Debug, Clone)]
pub struct MovementRequest {
    pub product_id: String,
    pub merchant_id: String,
    pub kind: MovementKind,
    /// Units moved; the counted target for AJUSTE.
    pub quantity: i64,
    /// Inflow cost in ten-thousandths; defaults to the current average.
    pub unit_cost: Option<i64>,
    pub document_id: Option<String>,
    pub note: Option<String>,
}

impl MovementRequest {
    pub fn new(
        product_id: impl Into<String>,
        merchant_id: impl Into<String>,
        kind: MovementKind,
        quantity: i64,
    ) -> Self {
        MovementRequest {
            product_id: product_id.into(),
            merchant_id: merchant_id.into(),
            kind,
            quantity,
            unit_cost: None,
            document_id: None,
            note: None,
        }
    }

    pub fn unit_cost(mut self, scaled: i64) -> Self {
        self.unit_cost = Some(scaled);
        self
    }

    pub fn document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Threshold alert waiting for the transaction to commit.
pub type PendingAlert = (ThresholdAlert, StockAlert);

/// Outcome of [`InventoryLedger::post_in`].
#[derive(Debug, Clone)]
pub struct Posted {
    pub movement: StockMovement,
    pub alert: Option<PendingAlert>,
}

// =============================================================================
// Inventory Ledger
// =============================================================================

/// The kardex service.
#[derive(Clone)]
pub struct InventoryLedger {
    db: Database,
    notifier: Arc<dyn NotificationSink>,
}

impl InventoryLedger {
    pub fn new(db: Database, notifier: Arc<dyn NotificationSink>) -> Self {
        InventoryLedger { db, notifier }
    }

    /// Posts one movement in its own transaction.
    ///
    /// ## Errors
    /// - `UnknownProduct`: missing, or owned by another merchant
    /// - `InvalidQuantity`: non-positive quantity (negative AJUSTE target)
    /// - `InsufficientStock`: outflow larger than the stock
    pub async fn post(&self, request: MovementRequest) -> EngineResult<StockMovement> {
        let mut tx = self.db.begin().await?;
        let posted = self.post_in(&mut tx, &request).await?;
        tx.commit().await?;

        self.dispatch(posted.alert.into_iter().collect()).await;
        Ok(posted.movement)
    }

    /// Posts one movement inside the caller's transaction.
    ///
    /// The returned alert must be handed to [`dispatch`](Self::dispatch)
    /// once the transaction has committed.
    pub async fn post_in(
        &self,
        conn: &mut SqliteConnection,
        request: &MovementRequest,
    ) -> EngineResult<Posted> {
        let now = Utc::now();
        let unknown = || CoreError::UnknownProduct(request.product_id.clone());

        if !product::lock(&mut *conn, &request.product_id).await? {
            return Err(unknown().into());
        }
        let item = product::get(&mut *conn, &request.product_id)
            .await?
            .filter(|p| p.merchant_id == request.merchant_id)
            .ok_or_else(unknown)?;

        let (stock_before, cost_before) = match movement::latest(&mut *conn, &item.id).await? {
            Some(last) => (last.stock_after, UnitCost::from_scaled(last.cost_after)),
            None => (item.current_stock, item.cost()),
        };

        let effect = compute_movement(
            &item.code,
            request.kind,
            stock_before,
            cost_before,
            request.quantity,
            request.unit_cost.map(UnitCost::from_scaled),
        )?;

        let stored = movement::insert(
            &mut *conn,
            &StockMovement {
                id: Uuid::new_v4().to_string(),
                seq: 0,
                product_id: item.id.clone(),
                merchant_id: item.merchant_id.clone(),
                kind: request.kind,
                quantity: effect.delta,
                stock_before,
                stock_after: effect.stock_after,
                unit_cost: effect.unit_cost.scaled(),
                cost_before: cost_before.scaled(),
                cost_after: effect.cost_after.scaled(),
                document_id: request.document_id.clone(),
                note: request.note.clone(),
                created_at: now,
            },
        )
        .await?;

        product::update_stock(&mut *conn, &item.id, effect.stock_after, effect.cost_after.scaled(), now)
            .await?;

        debug!(
            product_id = %item.id,
            kind = %request.kind,
            delta = effect.delta,
            stock_after = effect.stock_after,
            cost_after = %effect.cost_after,
            "Movement posted"
        );

        let alert = crossed_threshold(stock_before, effect.stock_after, item.min_stock).map(|kind| {
            (
                kind,
                StockAlert {
                    merchant_id: item.merchant_id.clone(),
                    product_id: item.id.clone(),
                    code: item.code.clone(),
                    name: item.name.clone(),
                    current_stock: effect.stock_after,
                    min_stock: item.min_stock,
                },
            )
        });

        Ok(Posted {
            movement: stored,
            alert,
        })
    }

    /// Delivers alerts. Failures are logged, never returned.
    pub async fn dispatch(&self, alerts: Vec<PendingAlert>) {
        for (kind, alert) in alerts {
            let result = match kind {
                ThresholdAlert::LowStock => self.notifier.notify_low_stock(&alert).await,
                ThresholdAlert::StockOut => self.notifier.notify_stock_out(&alert).await,
            };
            if let Err(e) = result {
                warn!(product_id = %alert.product_id, ?kind, error = %e, "Stock alert not delivered");
            }
        }
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// Creates a product and posts its opening AJUSTE, so the product has
    /// ledger history from the start (even at zero stock).
    pub async fn register_product(&self, new: NewProduct) -> EngineResult<Product> {
        validate_product_code(&new.code).map_err(CoreError::from)?;
        validate_description("name", &new.name).map_err(CoreError::from)?;
        validate_price_cents(new.price_cents).map_err(CoreError::from)?;
        validate_tax_rate_bps(new.tax_rate_bps).map_err(CoreError::from)?;
        validate_stock_level("opening_stock", new.opening_stock).map_err(CoreError::from)?;
        if let Some(min) = new.min_stock {
            validate_stock_level("min_stock", min).map_err(CoreError::from)?;
        }
        if let Some(max) = new.max_stock {
            validate_stock_level("max_stock", max).map_err(CoreError::from)?;
        }
        if new.opening_cost < 0 {
            return Err(CoreError::from(ValidationError::MustBePositive {
                field: "opening_cost".to_string(),
            })
            .into());
        }

        let now = Utc::now();
        let item = Product {
            id: Uuid::new_v4().to_string(),
            merchant_id: new.merchant_id.clone(),
            code: new.code.trim().to_string(),
            name: new.name.trim().to_string(),
            price_cents: new.price_cents,
            tax_rate_bps: new.tax_rate_bps,
            track_inventory: new.track_inventory,
            current_stock: 0,
            average_cost: new.opening_cost,
            min_stock: new.min_stock,
            max_stock: new.max_stock,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.db.begin().await?;
        product::insert(&mut *tx, &item).await?;
        let opening = MovementRequest::new(&item.id, &item.merchant_id, MovementKind::Ajuste, new.opening_stock)
            .unit_cost(new.opening_cost)
            .note("Inventario inicial");
        self.post_in(&mut tx, &opening).await?;
        tx.commit().await?;

        info!(product_id = %item.id, code = %item.code, opening_stock = new.opening_stock, "Product registered");

        Ok(Product {
            current_stock: new.opening_stock,
            ..item
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Current stock: `stock_after` of the latest movement.
    ///
    /// A product without movements falls back to its stored stock, flagged
    /// as [`StockSource::ProductFallback`].
    pub async fn current_stock(&self, product_id: &str) -> EngineResult<StockReading> {
        if let Some(last) = movement::latest(self.db.pool(), product_id).await? {
            return Ok(StockReading {
                quantity: last.stock_after,
                source: StockSource::Ledger,
            });
        }

        let item = product::get(self.db.pool(), product_id)
            .await?
            .ok_or_else(|| CoreError::UnknownProduct(product_id.to_string()))?;

        warn!(
            product_id = %item.id,
            code = %item.code,
            stored = item.current_stock,
            "Product has no kardex history, using stored stock"
        );

        Ok(StockReading {
            quantity: item.current_stock,
            source: StockSource::ProductFallback,
        })
    }

    /// Replays every active product of a merchant and reports mismatches.
    ///
    /// Nothing is corrected; an operator decides what to do.
    pub async fn reconcile(&self, merchant_id: &str) -> EngineResult<ReconcileReport> {
        let products = product::list_by_merchant(self.db.pool(), merchant_id, 0, 0).await?;
        let mut mismatches = Vec::new();

        for item in &products {
            let history = movement::for_product(self.db.pool(), &item.id).await?;
            let replay = kardex::replay(item, &history);
            if !replay.is_consistent() {
                warn!(
                    product_id = %item.id,
                    code = %item.code,
                    issues = replay.issues.len(),
                    replayed = replay.replayed_stock,
                    stored = replay.stored_stock,
                    "Kardex mismatch"
                );
                mismatches.push(replay);
            }
        }

        info!(
            merchant_id = %merchant_id,
            checked = products.len(),
            mismatches = mismatches.len(),
            "Kardex reconciliation finished"
        );

        Ok(ReconcileReport {
            merchant_id: merchant_id.to_string(),
            products_checked: products.len(),
            mismatches,
        })
    }

    /// Inventory value per tracked product at weighted-average cost.
    pub async fn valuation(&self, merchant_id: &str) -> EngineResult<Vec<ValuationRow>> {
        let products = product::list_by_merchant(self.db.pool(), merchant_id, 0, 0).await?;

        Ok(products
            .into_iter()
            .filter(|p| p.track_inventory)
            .map(|p| ValuationRow {
                total_value_cents: p.cost().total_for(p.current_stock).cents(),
                product_id: p.id,
                code: p.code,
                name: p.name,
                current_stock: p.current_stock,
                average_cost: p.average_cost,
            })
            .collect())
    }

    /// Movement history of a product, oldest first.
    pub async fn movements(&self, product_id: &str, query: &MovementQuery) -> EngineResult<Vec<StockMovement>> {
        Ok(movement::history(self.db.pool(), product_id, query).await?)
    }

    /// A product by id.
    pub async fn product(&self, product_id: &str) -> EngineResult<Product> {
        product::get(self.db.pool(), product_id)
            .await?
            .ok_or_else(|| CoreError::UnknownProduct(product_id.to_string()).into())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::RecordingNotifier;
    use crate::testing::{self, MERCHANT_ID};
    use facturo_core::kardex::LedgerIssue;

    async fn ledger() -> (InventoryLedger, Database, Arc<RecordingNotifier>) {
        let db = testing::database().await;
        let notifier = Arc::new(RecordingNotifier::new());
        (InventoryLedger::new(db.clone(), notifier.clone()), db, notifier)
    }

    #[tokio::test]
    async fn test_weighted_average_on_ingreso() {
        let (ledger, _db, _) = ledger().await;
        let item = ledger.register_product(testing::new_product("ARROZ", 50)).await.unwrap();

        let movement = ledger
            .post(
                MovementRequest::new(&item.id, MERCHANT_ID, MovementKind::Ingreso, 10).unit_cost(90_000),
            )
            .await
            .unwrap();

        assert_eq!(movement.stock_before, 50);
        assert_eq!(movement.stock_after, 60);
        assert_eq!(movement.cost_after, 81_667);
        assert_eq!(UnitCost::from_scaled(movement.cost_after).to_string(), "8.1667");

        let stored = ledger.product(&item.id).await.unwrap();
        assert_eq!(stored.current_stock, 60);
        assert_eq!(stored.average_cost, 81_667);
    }

    #[tokio::test]
    async fn test_outflows_and_adjustments_keep_cost() {
        let (ledger, _db, _) = ledger().await;
        let item = ledger.register_product(testing::new_product("AZUCAR", 20)).await.unwrap();

        let sale = ledger
            .post(MovementRequest::new(&item.id, MERCHANT_ID, MovementKind::Salida, 4))
            .await
            .unwrap();
        assert_eq!(sale.quantity, -4);
        assert_eq!(sale.unit_cost, 80_000);

        let count = ledger
            .post(MovementRequest::new(&item.id, MERCHANT_ID, MovementKind::Ajuste, 12).note("Conteo"))
            .await
            .unwrap();
        assert_eq!(count.stock_before, 16);
        assert_eq!(count.quantity, -4);
        assert_eq!(count.stock_after, 12);
        assert_eq!(count.cost_after, 80_000);

        let transfer = ledger
            .post(MovementRequest::new(&item.id, MERCHANT_ID, MovementKind::Transferencia, 2))
            .await
            .unwrap();
        assert_eq!(transfer.stock_after, 10);
    }

    #[tokio::test]
    async fn test_insufficient_stock_rolls_back() {
        let (ledger, _db, _) = ledger().await;
        let item = ledger.register_product(testing::new_product("ACEITE", 3)).await.unwrap();

        let err = ledger
            .post(MovementRequest::new(&item.id, MERCHANT_ID, MovementKind::Salida, 5))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        assert_eq!(ledger.current_stock(&item.id).await.unwrap().quantity, 3);
        let history = ledger.movements(&item.id, &MovementQuery::default()).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_foreign_or_missing_product_is_unknown() {
        let (ledger, _db, _) = ledger().await;
        let item = ledger.register_product(testing::new_product("LECHE", 3)).await.unwrap();

        let err = ledger
            .post(MovementRequest::new(&item.id, "other-merchant", MovementKind::Ingreso, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::EngineError::Core(CoreError::UnknownProduct(_))));

        let err = ledger
            .post(MovementRequest::new("missing", MERCHANT_ID, MovementKind::Ingreso, 1))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_current_stock_fallback_is_flagged() {
        let (ledger, db, _) = ledger().await;
        let legacy = testing::insert_legacy_product(&db, "legacy", "IMPORTADO", 10).await;

        let reading = ledger.current_stock(&legacy.id).await.unwrap();
        assert_eq!(reading.quantity, 10);
        assert_eq!(reading.source, StockSource::ProductFallback);

        ledger
            .post(MovementRequest::new(&legacy.id, MERCHANT_ID, MovementKind::Salida, 3))
            .await
            .unwrap();
        let reading = ledger.current_stock(&legacy.id).await.unwrap();
        assert_eq!(reading.quantity, 7);
        assert_eq!(reading.source, StockSource::Ledger);
    }

    #[tokio::test]
    async fn test_replay_matches_and_reports_drift() {
        let (ledger, db, _) = ledger().await;
        let item = ledger.register_product(testing::new_product("FIDEOS", 30)).await.unwrap();
        for (kind, qty) in [
            (MovementKind::Salida, 5),
            (MovementKind::Ingreso, 12),
            (MovementKind::Salida, 7),
            (MovementKind::Ajuste, 25),
        ] {
            ledger
                .post(MovementRequest::new(&item.id, MERCHANT_ID, kind, qty))
                .await
                .unwrap();
        }

        let report = ledger.reconcile(MERCHANT_ID).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.products_checked, 1);

        // Someone writes the cached stock behind the ledger's back
        product::update_stock(db.pool(), &item.id, 99, 80_000, Utc::now())
            .await
            .unwrap();

        let report = ledger.reconcile(MERCHANT_ID).await.unwrap();
        assert_eq!(report.mismatches.len(), 1);
        assert_eq!(
            report.mismatches[0].issues,
            vec![LedgerIssue::FinalStockMismatch { ledger: 25, stored: 99 }]
        );

        // Reported, not corrected
        assert_eq!(ledger.product(&item.id).await.unwrap().current_stock, 99);
    }

    #[tokio::test]
    async fn test_threshold_alerts_after_commit() {
        let (ledger, _db, notifier) = ledger().await;
        let item = ledger.register_product(testing::new_product("ATUN", 10)).await.unwrap();

        ledger
            .post(MovementRequest::new(&item.id, MERCHANT_ID, MovementKind::Salida, 6))
            .await
            .unwrap();
        ledger
            .post(MovementRequest::new(&item.id, MERCHANT_ID, MovementKind::Salida, 1))
            .await
            .unwrap();
        ledger
            .post(MovementRequest::new(&item.id, MERCHANT_ID, MovementKind::Salida, 3))
            .await
            .unwrap();

        let alerts = notifier.alerts().await;
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].0, ThresholdAlert::LowStock);
        assert_eq!(alerts[0].1.current_stock, 4);
        assert_eq!(alerts[1].0, ThresholdAlert::StockOut);
        assert_eq!(alerts[1].1.code, "ATUN");
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_fail_posting() {
        let db = testing::database().await;
        let ledger = InventoryLedger::new(db, Arc::new(RecordingNotifier::failing()));
        let item = ledger.register_product(testing::new_product("YOGURT", 1)).await.unwrap();

        let movement = ledger
            .post(MovementRequest::new(&item.id, MERCHANT_ID, MovementKind::Salida, 1))
            .await
            .unwrap();
        assert_eq!(movement.stock_after, 0);
    }

    #[tokio::test]
    async fn test_valuation() {
        let (ledger, _db, _) = ledger().await;
        ledger.register_product(testing::new_product("QUESO", 12)).await.unwrap();
        let mut service = testing::new_product("DELIVERY", 0);
        service.track_inventory = false;
        ledger.register_product(service).await.unwrap();

        let rows = ledger.valuation(MERCHANT_ID).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].code, "QUESO");
        // 12 × S/ 8.0000
        assert_eq!(rows[0].total_value_cents, 9_600);
    }

    #[tokio::test]
    async fn test_register_product_validates() {
        let (ledger, _db, _) = ledger().await;
        let mut bad = testing::new_product("OK", 1);
        bad.opening_stock = -1;
        assert!(ledger.register_product(bad).await.unwrap_err().is_validation());

        ledger.register_product(testing::new_product("DUP", 1)).await.unwrap();
        let err = ledger.register_product(testing::new_product("DUP", 1)).await.unwrap_err();
        assert!(err.is_conflict());
    }
}
