//! # Validation Module
//!
//! Input validation for Facturo requests.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: API layer (out of this workspace)                            │
//! │  └── Deserialization into IssueRequest / NoteRequest                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: facturo-engine services                                      │
//! │  └── THIS MODULE: quantities, identities, amounts                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── UNIQUE (merchant, type, series, correlative)                      │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Validators run before anything is persisted, so a failure here never
//! leaves partial state behind.
//!
//! ## Usage
//! ```rust
//! use facturo_core::validation::{validate_ruc, validate_line_quantity};
//!
//! validate_ruc("20100070970").unwrap();
//! validate_line_quantity(5).unwrap();
//! ```

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::{MAX_DOCUMENT_LINES, MAX_LINE_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Weights of the RUC check digit (modulo 11).
const RUC_WEIGHTS: [u32; 10] = [5, 4, 3, 2, 7, 6, 5, 4, 3, 2];

/// Valid two-digit RUC prefixes (persons, non-domiciled, government, companies).
const RUC_PREFIXES: [&str; 4] = ["10", "15", "17", "20"];

// =============================================================================
// Identity Validators
// =============================================================================

/// Validates a RUC (taxpayer number).
///
/// ## Rules
/// - Exactly 11 digits
/// - Starts with 10, 15, 17 or 20
/// - Last digit matches the modulo-11 check digit
///
/// ## Example
/// ```rust
/// use facturo_core::validation::validate_ruc;
///
/// assert!(validate_ruc("20100070970").is_ok());
/// assert!(validate_ruc("20512345678").is_err()); // bad check digit
/// assert!(validate_ruc("2010007097").is_err());  // 10 digits
/// ```
pub fn validate_ruc(ruc: &str) -> ValidationResult<()> {
    let ruc = ruc.trim();

    if ruc.is_empty() {
        return Err(ValidationError::Required {
            field: "ruc".to_string(),
        });
    }

    if ruc.len() != 11 || !ruc.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "ruc".to_string(),
            reason: "must be 11 digits".to_string(),
        });
    }

    if !RUC_PREFIXES.iter().any(|p| ruc.starts_with(p)) {
        return Err(ValidationError::InvalidFormat {
            field: "ruc".to_string(),
            reason: "must start with 10, 15, 17 or 20".to_string(),
        });
    }

    let digits: Vec<u32> = ruc.chars().filter_map(|c| c.to_digit(10)).collect();
    let sum: u32 = digits
        .iter()
        .zip(RUC_WEIGHTS.iter())
        .map(|(d, w)| d * w)
        .sum();
    let expected = match 11 - (sum % 11) {
        10 => 0,
        11 => 1,
        d => d,
    };

    if digits[10] != expected {
        return Err(ValidationError::InvalidFormat {
            field: "ruc".to_string(),
            reason: "check digit mismatch".to_string(),
        });
    }

    Ok(())
}

/// Validates a DNI (national identity number): exactly 8 digits.
///
/// ## Example
/// ```rust
/// use facturo_core::validation::validate_dni;
///
/// assert!(validate_dni("45678912").is_ok());
/// assert!(validate_dni("4567891").is_err());
/// ```
pub fn validate_dni(dni: &str) -> ValidationResult<()> {
    let dni = dni.trim();

    if dni.is_empty() {
        return Err(ValidationError::Required {
            field: "dni".to_string(),
        });
    }

    if dni.len() != 8 || !dni.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "dni".to_string(),
            reason: "must be 8 digits".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Product Validators
// =============================================================================

/// Validates a product code.
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Letters, numbers, hyphens and underscores only
pub fn validate_product_code(code: &str) -> ValidationResult<()> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "code".to_string(),
        });
    }

    if code.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "code".to_string(),
            max: 50,
        });
    }

    if !code
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a product or line description (1 to 250 characters).
pub fn validate_description(field: &str, text: &str) -> ValidationResult<()> {
    let text = text.trim();

    if text.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if text.chars().count() > 250 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 250,
        });
    }

    Ok(())
}

/// Validates a tax rate in basis points (0 to 10000).
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10_000 {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate".to_string(),
            min: 0,
            max: 10_000,
        });
    }

    Ok(())
}

/// Validates a price in céntimos. Zero is allowed (free items).
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a stock figure (opening stock, AJUSTE target).
pub fn validate_stock_level(field: &str, quantity: i64) -> ValidationResult<()> {
    if quantity < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

// =============================================================================
// Document Validators
// =============================================================================

/// Validates the quantity of a document line.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed [`MAX_LINE_QUANTITY`]
///
/// ```text
/// validate_line_quantity(q)
///      │
///      ├── q <= 0?      → InvalidQuantity
///      ├── q > 99_999?  → InvalidQuantity
///      └── OK → value the line
/// ```
pub fn validate_line_quantity(quantity: i64) -> CoreResult<()> {
    if quantity <= 0 || quantity > MAX_LINE_QUANTITY {
        return Err(CoreError::InvalidQuantity { quantity });
    }

    Ok(())
}

/// Validates the number of lines on a document.
pub fn validate_line_count(count: usize) -> ValidationResult<()> {
    if count == 0 {
        return Err(ValidationError::Required {
            field: "lines".to_string(),
        });
    }

    if count > MAX_DOCUMENT_LINES {
        return Err(ValidationError::OutOfRange {
            field: "lines".to_string(),
            min: 1,
            max: MAX_DOCUMENT_LINES as i64,
        });
    }

    Ok(())
}

/// Validates a discount in basis points (0 to 10000).
pub fn validate_discount_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10_000 {
        return Err(ValidationError::OutOfRange {
            field: "discount".to_string(),
            min: 0,
            max: 10_000,
        });
    }

    Ok(())
}

/// Validates a payment amount in céntimos.
///
/// ## Rules
/// - Must be positive (> 0)
pub fn validate_payment_amount(cents: i64) -> CoreResult<()> {
    if cents <= 0 {
        return Err(CoreError::InvalidPaymentAmount {
            reason: "amount must be positive".to_string(),
        });
    }

    Ok(())
}

/// Validates a three-letter currency code.
pub fn validate_currency(code: &str) -> ValidationResult<()> {
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ValidationError::InvalidFormat {
            field: "currency".to_string(),
            reason: "must be a 3-letter ISO code".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ruc() {
        assert!(validate_ruc("20100070970").is_ok());
        assert!(validate_ruc("20601030013").is_ok());
        assert!(validate_ruc("10456789124").is_ok());

        assert!(validate_ruc("").is_err());
        assert!(validate_ruc("20512345678").is_err());
        assert!(validate_ruc("30100070970").is_err());
        assert!(validate_ruc("2010007097A").is_err());
    }

    #[test]
    fn test_validate_dni() {
        assert!(validate_dni("45678912").is_ok());
        assert!(validate_dni(" 45678912 ").is_ok());
        assert!(validate_dni("").is_err());
        assert!(validate_dni("456789123").is_err());
        assert!(validate_dni("4567891X").is_err());
    }

    #[test]
    fn test_validate_product_code() {
        assert!(validate_product_code("ARROZ-5KG").is_ok());
        assert!(validate_product_code("aceite_1l").is_ok());
        assert!(validate_product_code("").is_err());
        assert!(validate_product_code("has space").is_err());
        assert!(validate_product_code(&"A".repeat(51)).is_err());
    }

    #[test]
    fn test_validate_line_quantity() {
        assert!(validate_line_quantity(1).is_ok());
        assert!(validate_line_quantity(MAX_LINE_QUANTITY).is_ok());
        assert!(matches!(
            validate_line_quantity(0),
            Err(CoreError::InvalidQuantity { quantity: 0 })
        ));
        assert!(validate_line_quantity(-3).is_err());
        assert!(validate_line_quantity(MAX_LINE_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_line_count() {
        assert!(validate_line_count(1).is_ok());
        assert!(validate_line_count(0).is_err());
        assert!(validate_line_count(MAX_DOCUMENT_LINES + 1).is_err());
    }

    #[test]
    fn test_validate_payment_amount() {
        assert!(validate_payment_amount(1).is_ok());
        assert!(matches!(
            validate_payment_amount(0),
            Err(CoreError::InvalidPaymentAmount { .. })
        ));
        assert!(validate_payment_amount(-100).is_err());
    }

    #[test]
    fn test_validate_rates_and_currency() {
        assert!(validate_tax_rate_bps(1800).is_ok());
        assert!(validate_tax_rate_bps(10_001).is_err());
        assert!(validate_discount_bps(10_000).is_ok());
        assert!(validate_discount_bps(10_001).is_err());
        assert!(validate_currency("PEN").is_ok());
        assert!(validate_currency("pen").is_err());
        assert!(validate_price_cents(-1).is_err());
        assert!(validate_stock_level("opening_stock", -1).is_err());
    }
}
