//! # Series Module
//!
//! Fixed series table and document number formatting.
//!
//! ```text
//! ┌──────────────┬──────────┬────────┐
//! │ Type         │ Affected │ Series │
//! ├──────────────┼──────────┼────────┤
//! │ Invoice      │    -     │ F0A1   │
//! │ Ticket       │    -     │ B0A1   │
//! │ CreditNote   │ Invoice  │ FCA1   │
//! │ CreditNote   │ Ticket   │ BCA1   │
//! │ DebitNote    │ Invoice  │ FDA1   │
//! │ DebitNote    │ Ticket   │ BDA1   │
//! │ SalesNote    │    -     │ NV01   │
//! │ Order        │    -     │ PD01   │
//! └──────────────┴──────────┴────────┘
//! ```
//!
//! The prefix letter of a note series follows the document it affects, so a
//! credit note on a boleta lives in a `B` series.

use crate::error::{CoreError, CoreResult};
use crate::types::DocumentType;

/// Digits of the printed correlative.
const CORRELATIVE_WIDTH: usize = 8;

/// Resolves the series for a document type.
///
/// Notes require the affected type, which must be an invoice or a ticket.
/// Other types ignore `affected`.
///
/// ## Example
/// ```rust
/// use facturo_core::series::series_for;
/// use facturo_core::types::DocumentType;
///
/// assert_eq!(series_for(DocumentType::Invoice, None).unwrap(), "F0A1");
/// assert_eq!(
///     series_for(DocumentType::CreditNote, Some(DocumentType::Ticket)).unwrap(),
///     "BCA1"
/// );
/// assert!(series_for(DocumentType::DebitNote, None).is_err());
/// ```
pub fn series_for(
    doc_type: DocumentType,
    affected: Option<DocumentType>,
) -> CoreResult<&'static str> {
    let series = match doc_type {
        DocumentType::Invoice => "F0A1",
        DocumentType::Ticket => "B0A1",
        DocumentType::SalesNote => "NV01",
        DocumentType::Order => "PD01",
        DocumentType::CreditNote | DocumentType::DebitNote => {
            let affected = affected.ok_or_else(|| CoreError::MissingAffectedType {
                doc_type: doc_type.to_string(),
            })?;
            match (doc_type, affected) {
                (DocumentType::CreditNote, DocumentType::Invoice) => "FCA1",
                (DocumentType::CreditNote, DocumentType::Ticket) => "BCA1",
                (DocumentType::DebitNote, DocumentType::Invoice) => "FDA1",
                (DocumentType::DebitNote, DocumentType::Ticket) => "BDA1",
                (_, other) => return Err(CoreError::InvalidDocumentType(other.to_string())),
            }
        }
    };

    Ok(series)
}

/// String form of [`series_for`] for callers holding raw type names.
pub fn series_for_names(doc_type: &str, affected: Option<&str>) -> CoreResult<&'static str> {
    let doc_type: DocumentType = doc_type.parse()?;
    let affected = affected.map(str::parse::<DocumentType>).transpose()?;
    series_for(doc_type, affected)
}

/// Renders a document number: series, dash, zero-padded correlative.
///
/// ```rust
/// use facturo_core::series::format_number;
///
/// assert_eq!(format_number("F0A1", 42), "F0A1-00000042");
/// ```
pub fn format_number(series: &str, correlative: i64) -> String {
    format!("{}-{:0width$}", series, correlative, width = CORRELATIVE_WIDTH)
}

// =============================================================================
// Unit Tests
// =============================================================================
