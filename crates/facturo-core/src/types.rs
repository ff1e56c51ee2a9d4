//! # Domain Types
//!
//! Core domain types used throughout Facturo.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │    Document     │   │    Payment      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  code           │   │  series-number  │   │  document_id    │       │
//! │  │  price_cents    │   │  state          │   │  medium         │       │
//! │  │  current_stock  │   │  balance_cents  │   │  amount_cents   │       │
//! │  └────────┬────────┘   └────────┬────────┘   └─────────────────┘       │
//! │           │                     │                                       │
//! │  ┌────────▼────────┐   ┌────────▼────────┐   ┌─────────────────┐       │
//! │  │ StockMovement   │   │  DocumentLine   │   │  DocumentState  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  seq            │   │  quantity       │   │  Draft          │       │
//! │  │  kind           │   │  unit_value     │   │  Pending...     │       │
//! │  │  stock_before   │   │  line_value     │   │  Accepted       │       │
//! │  │  stock_after    │   │  tax_cents      │   │  Rejected       │       │
//! │  │  cost_after     │   │  total_cents    │   │  Issued/Voided  │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID: (product code, series + correlative) - human-readable

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::CoreError;
use crate::money::{Money, UnitCost};

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 1800 bps = 18% (IGV)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Peruvian general sales tax (IGV), 18%.
    pub const IGV: TaxRate = TaxRate(1800);

    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero tax rate (exonerado).
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    /// Checks if tax rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::IGV
    }
}

// =============================================================================
// Parties
// =============================================================================

/// The issuing business. Read-only for this crate.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Merchant {
    pub id: String,
    /// Taxpayer number (11 digits).
    pub ruc: String,
    pub business_name: String,
    pub is_active: bool,
}

/// Identity document carried by a customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    /// Taxpayer number: businesses and professionals.
    Ruc,
    /// National identity card.
    Dni,
    /// Walk-in customer without a document.
    #[cfg_attr(feature = "sqlx", sqlx(rename = "none"))]
    #[serde(rename = "none")]
    Unidentified,
}

/// A customer of a merchant. Read-only for this crate.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub merchant_id: String,
    pub identity_kind: IdentityKind,
    pub identity_number: Option<String>,
    pub name: String,
}

impl Customer {
    /// True when the customer carries a RUC or DNI.
    pub fn is_identified(&self) -> bool {
        self.identity_kind != IdentityKind::Unidentified
            && self
                .identity_number
                .as_deref()
                .is_some_and(|n| !n.trim().is_empty())
    }
}

// =============================================================================
// Product
// =============================================================================

/// A product available for sale.
///
/// `current_stock` and `average_cost` belong to the kardex: only a posted
/// movement changes them.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Merchant this product belongs to.
    pub merchant_id: String,

    /// Business code, unique per merchant.
    pub code: String,

    /// Display name shown on documents.
    pub name: String,

    /// Unit price in céntimos, IGV included.
    pub price_cents: i64,

    /// Tax rate in basis points (1800 = 18%, 0 = exonerado).
    pub tax_rate_bps: u32,

    /// Whether sales move stock.
    pub track_inventory: bool,

    /// Current stock level.
    pub current_stock: i64,

    /// Weighted-average unit cost in ten-thousandths of a sol.
    pub average_cost: i64,

    /// Low-stock threshold.
    pub min_stock: Option<i64>,

    /// Replenishment ceiling (reporting only).
    pub max_stock: Option<i64>,

    /// Whether product is active (soft delete).
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the tax-inclusive price.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Returns the tax-exclusive unit value derived from the price.
    pub fn unit_value(&self) -> Money {
        self.price().net_of_tax(self.tax_rate())
    }

    /// Returns the tax rate.
    #[inline]
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps)
    }

    /// Returns the weighted-average cost.
    #[inline]
    pub fn cost(&self) -> UnitCost {
        UnitCost::from_scaled(self.average_cost)
    }
}

/// Input for registering a new product.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewProduct {
    pub merchant_id: String,
    pub code: String,
    pub name: String,
    pub price_cents: i64,
    pub tax_rate_bps: u32,
    pub track_inventory: bool,
    /// Opening stock, posted as the first kardex entry.
    pub opening_stock: i64,
    /// Opening unit cost in ten-thousandths of a sol.
    pub opening_cost: i64,
    pub min_stock: Option<i64>,
    pub max_stock: Option<i64>,
}

// =============================================================================
// Document Type
// =============================================================================

/// The kind of sales document.
///
/// Formal types go to the tax authority; informal ones (sales notes and
/// orders) are internal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Factura (01).
    Invoice,
    /// Boleta de venta (03).
    Ticket,
    /// Nota de crédito (07).
    CreditNote,
    /// Nota de débito (08).
    DebitNote,
    /// Nota de venta: internal, never submitted.
    SalesNote,
    /// Pedido: internal, never submitted.
    Order,
}

impl DocumentType {
    /// Every document type, in catalog order.
    pub const ALL: [DocumentType; 6] = [
        DocumentType::Invoice,
        DocumentType::Ticket,
        DocumentType::CreditNote,
        DocumentType::DebitNote,
        DocumentType::SalesNote,
        DocumentType::Order,
    ];

    /// Stable lowercase name, matching the database column.
    pub const fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "invoice",
            DocumentType::Ticket => "ticket",
            DocumentType::CreditNote => "credit_note",
            DocumentType::DebitNote => "debit_note",
            DocumentType::SalesNote => "sales_note",
            DocumentType::Order => "order",
        }
    }

    /// Tax authority catalog code, for formal types only.
    pub const fn authority_code(&self) -> Option<&'static str> {
        match self {
            DocumentType::Invoice => Some("01"),
            DocumentType::Ticket => Some("03"),
            DocumentType::CreditNote => Some("07"),
            DocumentType::DebitNote => Some("08"),
            DocumentType::SalesNote | DocumentType::Order => None,
        }
    }

    /// True for types submitted to the tax authority.
    pub const fn is_formal(&self) -> bool {
        self.authority_code().is_some()
    }

    /// True for credit and debit notes.
    pub const fn is_note(&self) -> bool {
        matches!(self, DocumentType::CreditNote | DocumentType::DebitNote)
    }

    /// True for the types a note may affect.
    pub const fn is_note_target(&self) -> bool {
        matches!(self, DocumentType::Invoice | DocumentType::Ticket)
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses the lowercase name, the uppercase name or the catalog code.
impl FromStr for DocumentType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        DocumentType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized || t.authority_code() == Some(normalized.as_str()))
            .ok_or_else(|| CoreError::InvalidDocumentType(s.to_string()))
    }
}

// =============================================================================
// Document State
// =============================================================================

/// Lifecycle state of a document.
///
/// ```text
/// formal:    Draft ──► PendingSubmission ──► Accepted ──► Voided
///                                      └──► Rejected
/// informal:  Draft ──► Issued ──► Voided
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    Draft,
    PendingSubmission,
    Accepted,
    Rejected,
    Issued,
    Voided,
}

impl DocumentState {
    /// Stable lowercase name, matching the database column.
    pub const fn as_str(&self) -> &'static str {
        match self {
            DocumentState::Draft => "draft",
            DocumentState::PendingSubmission => "pending_submission",
            DocumentState::Accepted => "accepted",
            DocumentState::Rejected => "rejected",
            DocumentState::Issued => "issued",
            DocumentState::Voided => "voided",
        }
    }
}

impl Default for DocumentState {
    fn default() -> Self {
        DocumentState::Draft
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Settlement
// =============================================================================

/// How much of a document has been paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    Partial,
    Paid,
}

impl SettlementStatus {
    /// Derives the status from the outstanding and total amounts.
    pub fn from_balance(balance: Money, total: Money) -> Self {
        if balance.cents() <= 0 {
            SettlementStatus::Paid
        } else if balance < total {
            SettlementStatus::Partial
        } else {
            SettlementStatus::Pending
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Pending => "pending",
            SettlementStatus::Partial => "partial",
            SettlementStatus::Paid => "paid",
        }
    }
}

/// Payment medium used for a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMedium {
    /// Physical cash.
    Cash,
    /// Mobile wallet (Yape, Plin).
    Wallet,
    /// Bank transfer, possibly confirmed later.
    Transfer,
    /// Card on an external terminal, possibly deferred.
    Card,
}

impl PaymentMedium {
    /// Cash and wallet payments settle a sale on the spot.
    pub const fn settles_in_full(&self) -> bool {
        matches!(self, PaymentMedium::Cash | PaymentMedium::Wallet)
    }
}

impl Default for PaymentMedium {
    fn default() -> Self {
        PaymentMedium::Cash
    }
}

// =============================================================================
// Document
// =============================================================================

/// A sales document: formal (submitted) or informal.
///
/// Documents are never deleted; voiding is a state.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Document {
    pub id: String,
    pub merchant_id: String,
    pub doc_type: DocumentType,
    pub series: String,
    pub correlative: i64,
    pub customer_id: Option<String>,
    #[ts(as = "String")]
    pub issue_date: DateTime<Utc>,
    /// ISO 4217 currency code.
    pub currency: String,
    /// Operaciones gravadas (tax-exclusive).
    pub taxed_cents: i64,
    /// Operaciones exoneradas.
    pub exempt_cents: i64,
    pub igv_cents: i64,
    pub total_cents: i64,
    /// Outstanding balance (saldo). Never increases.
    pub balance_cents: i64,
    pub settlement: SettlementStatus,
    pub state: DocumentState,
    /// Identifier assigned by the tax authority.
    pub remote_id: Option<String>,
    pub submission_attempts: i64,
    pub error_message: Option<String>,
    pub xml_ref: Option<String>,
    pub cdr_ref: Option<String>,
    /// For notes: the document being adjusted.
    pub affected_document_id: Option<String>,
    pub affected_doc_type: Option<DocumentType>,
    pub motive_code: Option<String>,
    /// Set once the accepted note's stock/void effects ran.
    #[ts(as = "Option<String>")]
    pub effects_applied_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub voided_at: Option<DateTime<Utc>>,
}

impl Document {
    /// Printed number, e.g. `F0A1-00000042`.
    pub fn number(&self) -> String {
        crate::series::format_number(&self.series, self.correlative)
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn balance(&self) -> Money {
        Money::from_cents(self.balance_cents)
    }

    #[inline]
    pub fn is_voided(&self) -> bool {
        self.state == DocumentState::Voided
    }
}

/// A line of a document. Immutable once persisted.
///
/// Uses the snapshot pattern: description and prices are frozen at issue
/// time.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DocumentLine {
    pub id: String,
    pub document_id: String,
    /// 1-based position.
    pub line_number: i64,
    /// None for synthetic lines (global discount, debit charges).
    pub product_id: Option<String>,
    pub description: String,
    pub quantity: i64,
    /// Unit price, IGV included.
    pub unit_price_cents: i64,
    /// Unit value, IGV excluded.
    pub unit_value_cents: i64,
    /// Line value, IGV excluded.
    pub line_value_cents: i64,
    pub tax_rate_bps: u32,
    pub tax_cents: i64,
    /// Line total, IGV included.
    pub total_cents: i64,
}

impl DocumentLine {
    #[inline]
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps)
    }
}

// =============================================================================
// Payment
// =============================================================================

/// A payment towards a document.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub document_id: String,
    pub amount_cents: i64,
    pub medium: PaymentMedium,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Payment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Stock Movement
// =============================================================================

/// Kind of kardex entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Inflow: purchase, return, void reversal.
    Ingreso,
    /// Outflow: sale.
    Salida,
    /// Absolute correction to a counted quantity.
    Ajuste,
    /// Outflow to another location.
    Transferencia,
}

impl MovementKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Ingreso => "ingreso",
            MovementKind::Salida => "salida",
            MovementKind::Ajuste => "ajuste",
            MovementKind::Transferencia => "transferencia",
        }
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An append-only kardex entry.
///
/// `quantity` is always the signed delta actually applied, so
/// `stock_after == stock_before + quantity` for every kind.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockMovement {
    pub id: String,
    /// Global append order.
    pub seq: i64,
    pub product_id: String,
    pub merchant_id: String,
    pub kind: MovementKind,
    pub quantity: i64,
    pub stock_before: i64,
    pub stock_after: i64,
    /// Unit cost of this movement (ten-thousandths).
    pub unit_cost: i64,
    pub cost_before: i64,
    pub cost_after: i64,
    pub document_id: Option<String>,
    pub note: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    #[inline]
    pub fn unit_cost(&self) -> UnitCost {
        UnitCost::from_scaled(self.unit_cost)
    }
}

/// Where a stock figure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StockSource {
    /// `stock_after` of the latest movement.
    Ledger,
    /// Product row; the product has no movements.
    ProductFallback,
}

/// Current stock with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockReading {
    pub quantity: i64,
    pub source: StockSource,
}

/// One row of the inventory valuation report.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ValuationRow {
    pub product_id: String,
    pub code: String,
    pub name: String,
    pub current_stock: i64,
    pub average_cost: i64,
    /// `current_stock × average_cost`, rounded to céntimos.
    pub total_value_cents: i64,
}

// =============================================================================
// Requests
// =============================================================================

/// A requested sale line.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineRequest {
    pub product_id: String,
    pub quantity: i64,
    /// Overrides the product price (IGV included).
    pub unit_price_cents: Option<i64>,
    /// Line discount in basis points.
    pub discount_bps: Option<u32>,
}

/// A request to issue a sales document.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct IssueRequest {
    pub merchant_id: String,
    pub doc_type: DocumentType,
    pub customer_id: Option<String>,
    pub lines: Vec<LineRequest>,
    /// Defaults to PEN.
    pub currency: Option<String>,
    /// Defaults to cash.
    pub payment_medium: Option<PaymentMedium>,
    /// Amount paid up front for transfer/card sales.
    pub advance_cents: Option<i64>,
}

/// Caller-supplied detail for a note.
///
/// Which fields matter depends on the motive: `line_number` picks an
/// original line (motives 03, 05, 07), `description`/`quantity`/
/// `unit_price_cents` describe a free charge line (debit notes).
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AdjustmentLine {
    pub line_number: Option<i64>,
    pub description: Option<String>,
    pub quantity: Option<i64>,
    pub unit_price_cents: Option<i64>,
    pub tax_rate_bps: Option<u32>,
}

/// A request to issue a credit or debit note.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NoteRequest {
    pub merchant_id: String,
    pub note_type: DocumentType,
    pub affected_document_id: String,
    pub motive_code: String,
    #[serde(default)]
    pub lines: Vec<AdjustmentLine>,
    /// Global discount amount, IGV included (motive 04).
    pub discount_cents: Option<i64>,
}

/// Filters for listing documents.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DocumentQuery {
    pub merchant_id: String,
    pub doc_type: Option<DocumentType>,
    pub state: Option<DocumentState>,
    #[ts(as = "Option<String>")]
    pub from: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub to: Option<DateTime<Utc>>,
    pub limit: u32,
    pub offset: u32,
}

impl DocumentQuery {
    /// First page of a merchant's documents, newest first.
    pub fn for_merchant(merchant_id: impl Into<String>) -> Self {
        DocumentQuery {
            merchant_id: merchant_id.into(),
            doc_type: None,
            state: None,
            from: None,
            to: None,
            limit: 50,
            offset: 0,
        }
    }
}

/// Filters for a product's movement history.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MovementQuery {
    #[ts(as = "Option<String>")]
    pub from: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub to: Option<DateTime<Utc>>,
    /// 0 means no limit.
    pub limit: u32,
    pub offset: u32,
}

// =============================================================================
// Unit Tests
// =============================================================================
