//! # Seed Data Generator
//!
//! Populates a development database with a merchant, customers and a
//! small Peruvian grocery catalog.
//!
//! ## Usage
//! ```bash
//! # Seed ./facturo_dev.db
//! cargo run -p facturo-db --bin facturo-seed
//!
//! # Specify database path
//! cargo run -p facturo-db --bin facturo-seed -- --db ./data/facturo.db
//! ```
//!
//! ## Generated Data
//! - One merchant (RUC 20100070970)
//! - A business customer (RUC), a consumer (DNI) and the anonymous customer
//! - Products across a few categories, each with an opening AJUSTE
//!   movement so the kardex replays to the seeded stock

use chrono::Utc;
use std::env;
use uuid::Uuid;

use facturo_core::kardex::compute_movement;
use facturo_core::{
    Customer, IdentityKind, Merchant, MovementKind, Product, StockMovement, UnitCost,
};
use facturo_db::repository::{movement, party, product};
use facturo_db::{Database, DbConfig};

const MERCHANT_ID: &str = "merchant-dev";

/// (code prefix, products as (name, price in céntimos, IGV applies))
const CATEGORIES: &[(&str, &[(&str, i64, bool)])] = &[
    (
        "ABR",
        &[
            ("Arroz Costeño 5kg", 2490, true),
            ("Azúcar Rubia 1kg", 450, true),
            ("Aceite Primor 1L", 1090, true),
            ("Fideos Don Vittorio 500g", 380, true),
            ("Atún Florida 170g", 690, true),
        ],
    ),
    (
        "LAC",
        &[
            ("Leche Gloria Azul 400g", 420, true),
            ("Yogurt Laive 1L", 650, true),
            ("Queso Fresco 500g", 1250, true),
        ],
    ),
    (
        "BEB",
        &[
            ("Inca Kola 500ml", 300, true),
            ("Agua San Luis 625ml", 180, true),
            ("Chicha Morada 1L", 550, true),
        ],
    ),
    (
        "FRU",
        &[
            ("Plátano de Isla (kg)", 350, false),
            ("Papa Amarilla (kg)", 420, false),
            ("Limón (kg)", 590, false),
        ],
    ),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./facturo_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Facturo Seed Data Generator");
                println!();
                println!("Usage: facturo-seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./facturo_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Facturo Seed Data Generator");
    println!("==============================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    if party::merchant(db.pool(), MERCHANT_ID).await?.is_some() {
        let existing = product::count(db.pool(), MERCHANT_ID).await?;
        println!("⚠ Merchant already seeded with {} products", existing);
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    seed_parties(&db).await?;
    println!("✓ Merchant and customers created");

    println!();
    println!("Generating products...");

    let mut generated = 0;
    for (category_idx, (prefix, products)) in CATEGORIES.iter().enumerate() {
        for (product_idx, (name, price_cents, taxed)) in products.iter().enumerate() {
            let seed = category_idx * 10 + product_idx;
            let p = generate_product(prefix, product_idx, name, *price_cents, *taxed, seed);
            if let Err(e) = insert_with_opening_stock(&db, &p).await {
                eprintln!("Failed to insert {}: {}", p.code, e);
                continue;
            }
            generated += 1;
        }
    }

    println!("✓ Generated {} products with opening stock", generated);
    println!();
    println!("✓ Seed complete!");

    Ok(())
}

async fn seed_parties(db: &Database) -> Result<(), Box<dyn std::error::Error>> {
    party::insert_merchant(
        db.pool(),
        &Merchant {
            id: MERCHANT_ID.to_string(),
            ruc: "20100070970".to_string(),
            business_name: "Bodega Don Lucho SAC".to_string(),
            is_active: true,
        },
    )
    .await?;

    let customers = [
        (IdentityKind::Ruc, Some("20601030013"), "Comercial Andina SAC"),
        (IdentityKind::Dni, Some("45678912"), "María Quispe Huamán"),
        (IdentityKind::Unidentified, None, "Clientes Varios"),
    ];
    for (kind, number, name) in customers {
        party::insert_customer(
            db.pool(),
            &Customer {
                id: Uuid::new_v4().to_string(),
                merchant_id: MERCHANT_ID.to_string(),
                identity_kind: kind,
                identity_number: number.map(String::from),
                name: name.to_string(),
            },
        )
        .await?;
    }

    Ok(())
}

/// Inserts the product at zero stock, then posts the opening AJUSTE.
async fn insert_with_opening_stock(db: &Database, seeded: &Product) -> Result<(), Box<dyn std::error::Error>> {
    let now = Utc::now();
    let mut empty = seeded.clone();
    empty.current_stock = 0;

    let mut tx = db.begin().await?;
    product::insert(&mut *tx, &empty).await?;

    let cost = UnitCost::from_scaled(seeded.average_cost);
    let effect = compute_movement(
        &seeded.code,
        MovementKind::Ajuste,
        0,
        cost,
        seeded.current_stock,
        Some(cost),
    )?;
    movement::insert(
        &mut *tx,
        &StockMovement {
            id: Uuid::new_v4().to_string(),
            seq: 0,
            product_id: seeded.id.clone(),
            merchant_id: seeded.merchant_id.clone(),
            kind: MovementKind::Ajuste,
            quantity: effect.delta,
            stock_before: 0,
            stock_after: effect.stock_after,
            unit_cost: effect.unit_cost.scaled(),
            cost_before: cost.scaled(),
            cost_after: effect.cost_after.scaled(),
            document_id: None,
            note: Some("Inventario inicial".to_string()),
            created_at: now,
        },
    )
    .await?;
    product::update_stock(&mut *tx, &seeded.id, effect.stock_after, effect.cost_after.scaled(), now).await?;
    tx.commit().await?;

    Ok(())
}

/// Generates a product with deterministic stock and cost.
fn generate_product(prefix: &str, index: usize, name: &str, price_cents: i64, taxed: bool, seed: usize) -> Product {
    let now = Utc::now();

    // Cost between 60% and 80% of the tax-exclusive price
    let cost_pct = 60 + (seed % 20) as i64;
    let net_cents = if taxed { price_cents * 100 / 118 } else { price_cents };
    let average_cost = net_cents * cost_pct / 100 * (UnitCost::SCALE / 100);

    Product {
        id: Uuid::new_v4().to_string(),
        merchant_id: MERCHANT_ID.to_string(),
        code: format!("{}-{:03}", prefix, index + 1),
        name: name.to_string(),
        price_cents,
        tax_rate_bps: if taxed { 1800 } else { 0 },
        track_inventory: true,
        current_stock: 20 + ((seed * 7) % 80) as i64,
        average_cost,
        min_stock: Some(10),
        max_stock: Some(200),
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}
