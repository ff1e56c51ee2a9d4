//! Fixtures shared by the engine tests.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;
use facturo_core::{
    Customer, DocumentState, DocumentType, IdentityKind, IssueRequest, LineRequest, Merchant,
    NewProduct, Product,
};
use facturo_db::repository::document::{self, SubmissionUpdate};
use facturo_db::repository::{party, product};
use facturo_db::{Database, DbConfig};

use crate::authority::{SandboxAuthority, SandboxBehavior};
use crate::config::IssuanceSettings;
use crate::directory::DbPartyDirectory;
use crate::ledger::InventoryLedger;
use crate::lifecycle::DocumentLifecycle;
use crate::notifier::RecordingNotifier;
use crate::reconciler::RetryPolicy;
use crate::Engine;

pub const MERCHANT_ID: &str = "merchant-1";
pub const RUC_CUSTOMER: &str = "customer-ruc";
pub const DNI_CUSTOMER: &str = "customer-dni";
pub const ANONYMOUS_CUSTOMER: &str = "customer-anon";

/// In-memory database with one merchant and three customers.
pub async fn database() -> Database {
    seed(Database::new(DbConfig::in_memory()).await.unwrap()).await
}

/// The same fixtures in a WAL file under `dir`, served by eight
/// connections so concurrent callers really overlap.
pub async fn file_database(dir: &TempDir) -> Database {
    let config = DbConfig::new(dir.path().join("facturo.db"))
        .max_connections(8)
        .busy_timeout(Duration::from_secs(30));
    seed(Database::new(config).await.unwrap()).await
}

async fn seed(db: Database) -> Database {
    party::insert_merchant(
        db.pool(),
        &Merchant {
            id: MERCHANT_ID.into(),
            ruc: "20100070970".into(),
            business_name: "Bodega Don Lucho SAC".into(),
            is_active: true,
        },
    )
    .await
    .unwrap();

    let customers = [
        (RUC_CUSTOMER, IdentityKind::Ruc, Some("20601030013"), "Comercial Andina SAC"),
        (DNI_CUSTOMER, IdentityKind::Dni, Some("45678912"), "Rosa Quispe Mamani"),
        (ANONYMOUS_CUSTOMER, IdentityKind::Unidentified, None, "Cliente varios"),
    ];
    for (id, identity_kind, number, name) in customers {
        party::insert_customer(
            db.pool(),
            &Customer {
                id: id.into(),
                merchant_id: MERCHANT_ID.into(),
                identity_kind,
                identity_number: number.map(String::from),
                name: name.into(),
            },
        )
        .await
        .unwrap();
    }
    db
}

/// Tracked product priced at 11.80 with IGV, opening cost 8.0000, min stock 5.
pub fn new_product(code: &str, opening_stock: i64) -> NewProduct {
    NewProduct {
        merchant_id: MERCHANT_ID.into(),
        code: code.into(),
        name: format!("Producto {}", code),
        price_cents: 1180,
        tax_rate_bps: 1800,
        track_inventory: true,
        opening_stock,
        opening_cost: 80_000,
        min_stock: Some(5),
        max_stock: None,
    }
}

/// A product row written directly, without any kardex entry.
pub async fn insert_legacy_product(db: &Database, id: &str, code: &str, stock: i64) -> Product {
    let now = Utc::now();
    let legacy = Product {
        id: id.into(),
        merchant_id: MERCHANT_ID.into(),
        code: code.into(),
        name: format!("Producto {}", code),
        price_cents: 1180,
        tax_rate_bps: 1800,
        track_inventory: true,
        current_stock: stock,
        average_cost: 80_000,
        min_stock: Some(5),
        max_stock: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    product::insert(db.pool(), &legacy).await.unwrap();
    legacy
}

/// A cash sale at catalog prices.
pub fn sale(doc_type: DocumentType, customer: Option<&str>, lines: &[(&str, i64)]) -> IssueRequest {
    IssueRequest {
        merchant_id: MERCHANT_ID.into(),
        doc_type,
        customer_id: customer.map(String::from),
        lines: lines
            .iter()
            .map(|(product_id, quantity)| LineRequest {
                product_id: product_id.to_string(),
                quantity: *quantity,
                unit_price_cents: None,
                discount_bps: None,
            })
            .collect(),
        currency: None,
        payment_medium: None,
        advance_cents: None,
    }
}

pub fn lifecycle(db: &Database) -> DocumentLifecycle {
    let ledger = InventoryLedger::new(db.clone(), Arc::new(RecordingNotifier::new()));
    DocumentLifecycle::new(
        db.clone(),
        Arc::new(DbPartyDirectory::new(db.clone())),
        ledger,
        IssuanceSettings::default(),
    )
}

/// Marks a pending document as accepted, as if the authority had answered.
pub async fn accept(db: &Database, id: &str) {
    let update = SubmissionUpdate {
        state: Some(DocumentState::Accepted),
        ..Default::default()
    };
    assert!(document::update_submission(db.pool(), id, &update, Utc::now()).await.unwrap());
}

/// Fast polling for tests: three attempts one millisecond apart.
pub fn quick_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        interval: Duration::from_millis(1),
    }
}

/// An engine wired to a scripted sandbox and a recording notifier.
pub struct Harness {
    pub engine: Engine,
    pub db: Database,
    pub authority: Arc<SandboxAuthority>,
    pub notifier: Arc<RecordingNotifier>,
}

pub async fn harness(behavior: SandboxBehavior, submit_on_issue: bool) -> Harness {
    let db = database().await;
    let authority = Arc::new(SandboxAuthority::new(behavior));
    let notifier = Arc::new(RecordingNotifier::new());
    let issuance = IssuanceSettings {
        submit_on_issue,
        ..Default::default()
    };
    let engine = Engine::new(
        db.clone(),
        authority.clone(),
        notifier.clone(),
        Arc::new(DbPartyDirectory::new(db.clone())),
        issuance,
        quick_policy(),
        50,
    );
    Harness {
        engine,
        db,
        authority,
        notifier,
    }
}
