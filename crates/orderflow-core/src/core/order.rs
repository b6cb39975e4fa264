// crates/orderflow-core/src/core/order.rs
// ============================================================================
// Module: Orderflow Canonical Order
// Description: Evidence-bearing parsed representation of a spreadsheet order.
// Purpose: Carry every extracted value with its source cell for audit.
// Dependencies: crate::core::{error, hashing, issue}, serde
// ============================================================================

//! ## Overview
//! The canonical order is the parser's output contract: a normalized customer
//! block, line items, and optional totals, where every extracted value carries
//! the sheet/cell evidence that substantiates it. Orders are versioned per
//! correction round; content is immutable once persisted. Monetary amounts are
//! integer minor units (cents) so arithmetic checks are exact.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::error::ErrorCode;
use crate::core::hashing::Sha256Digest;
use crate::core::issue::Issue;
use crate::core::issue::Severity;

// ============================================================================
// SECTION: Money
// ============================================================================

/// Monetary amount in integer minor units (cents).
///
/// # Invariants
/// - No currency conversion happens anywhere in Orderflow; amounts compare
///   only within one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates an amount from minor units.
    #[must_use]
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Returns the amount in minor units.
    #[must_use]
    pub const fn minor(self) -> i64 {
        self.0
    }
}

// ============================================================================
// SECTION: Evidence Cells
// ============================================================================

/// Source-cell evidence for an extracted value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceCell {
    /// Sheet name the value came from.
    pub sheet: String,
    /// Cell address in A1 notation.
    pub cell: String,
    /// Raw stored value.
    pub raw: String,
    /// Rendered display value.
    pub display: String,
}

/// Per-field evidence for one line item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineEvidence {
    /// Evidence for the description field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<EvidenceCell>,
    /// Evidence for the quantity field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<EvidenceCell>,
    /// Evidence for the unit price field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<EvidenceCell>,
    /// Evidence for the line total field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_total: Option<EvidenceCell>,
    /// Evidence for the SKU field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<EvidenceCell>,
    /// Evidence for the GTIN field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gtin: Option<EvidenceCell>,
}

// ============================================================================
// SECTION: Line Items
// ============================================================================

/// One order line as extracted from the spreadsheet.
///
/// # Invariants
/// - `quantity` is non-negative; zero is a valid quantity and produces no
///   issue.
/// - At least one of `sku` / `gtin` must be present for the line to be
///   resolvable; otherwise validation attaches a `MISSING_ITEM_IDENTIFIER`
///   issue.
/// - `unit_price` and `line_total` are audit-only; the draft submitted to the
///   external system always carries the catalog price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// One-based line number within the order.
    pub line_number: u32,
    /// Free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ordered quantity; zero is valid.
    pub quantity: f64,
    /// Spreadsheet unit price, audit-only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Money>,
    /// Spreadsheet line total, audit-only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_total: Option<Money>,
    /// Stock-keeping unit code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    /// Global trade item number (barcode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gtin: Option<String>,
    /// Per-field source evidence.
    #[serde(default)]
    pub evidence: LineEvidence,
}

impl LineItem {
    /// Returns true when the line carries neither SKU nor GTIN.
    #[must_use]
    pub const fn missing_identifier(&self) -> bool {
        self.sku.is_none() && self.gtin.is_none()
    }
}

// ============================================================================
// SECTION: Customer Block & Totals
// ============================================================================

/// Customer block extracted from the sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerBlock {
    /// Free-text customer name.
    pub name: String,
    /// Evidence for the customer name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<EvidenceCell>,
}

/// Declared order totals, when the sheet carries them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    /// Declared subtotal over line totals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtotal: Option<Money>,
    /// Declared tax amount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax: Option<Money>,
    /// Declared grand total.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grand_total: Option<Money>,
    /// Evidence for the subtotal cell.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<EvidenceCell>,
}

// ============================================================================
// SECTION: Parse Metadata
// ============================================================================

/// Reasons the parser may refuse a file outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockedReason {
    /// Workbook contains formulas and the formula policy is strict.
    Formulas,
    /// Workbook is password protected.
    Protected,
    /// Workbook bytes could not be parsed.
    Unparsable,
    /// Workbook exceeds the configured size limit.
    TooLarge,
}

/// Parse-time metadata for a canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderMeta {
    /// Original upload filename.
    pub source_filename: String,
    /// SHA-256 of the original file bytes.
    pub file_sha256: Sha256Digest,
    /// Detected language hint (BCP 47), when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Parser implementation version.
    pub parser_version: String,
    /// Whether formulas were encountered during parsing.
    pub had_formulas: bool,
}

// ============================================================================
// SECTION: Canonical Order
// ============================================================================

/// Versioned, evidence-bearing parsed representation of one order.
///
/// # Invariants
/// - `version` starts at 1 and increments once per correction round.
/// - The sum of line totals equals the declared subtotal within the
///   configured tolerance, or an `ARITHMETIC_MISMATCH` issue is present;
///   the issue is surfaced but non-blocking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalOrder {
    /// Version number of this order content.
    pub version: u32,
    /// Parse-time metadata.
    pub meta: OrderMeta,
    /// Customer block.
    pub customer: CustomerBlock,
    /// Order lines.
    pub lines: Vec<LineItem>,
    /// Declared totals, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totals: Option<OrderTotals>,
    /// Findings attached during parsing and validation.
    #[serde(default)]
    pub issues: Vec<Issue>,
}

impl CanonicalOrder {
    /// Runs structural validation, attaching any missing issues in place.
    ///
    /// Validation is idempotent: findings already present are not duplicated.
    /// `tolerance_minor` is the allowed absolute difference (minor units)
    /// between declared subtotal and the sum of line totals; the issue fires
    /// strictly beyond the tolerance.
    pub fn validate(&mut self, tolerance_minor: i64) {
        if let Some(issue) = self.arithmetic_issue(tolerance_minor)
            && !self.has_issue(ErrorCode::ArithmeticMismatch)
        {
            self.issues.push(issue);
        }

        let missing: Vec<u32> = self
            .lines
            .iter()
            .filter(|line| line.missing_identifier())
            .map(|line| line.line_number)
            .collect();
        for line_number in missing {
            let message = format!("line {line_number} carries neither SKU nor GTIN");
            if !self.issues.iter().any(|issue| {
                issue.code == ErrorCode::MissingItemIdentifier && issue.message.contains(&format!("line {line_number} "))
            }) {
                self.issues.push(Issue {
                    code: ErrorCode::MissingItemIdentifier,
                    severity: Severity::Error,
                    message,
                    evidence: None,
                    requires_human: true,
                });
            }
        }
    }

    /// Computes the arithmetic-mismatch issue, if the totals disagree.
    ///
    /// Returns `None` when no subtotal is declared, when any line lacks a
    /// total (the check is undefined), or when the difference is within
    /// tolerance.
    #[must_use]
    pub fn arithmetic_issue(&self, tolerance_minor: i64) -> Option<Issue> {
        let declared = self.totals.as_ref()?.subtotal?;
        let mut computed: i64 = 0;
        for line in &self.lines {
            computed = computed.checked_add(line.line_total?.minor())?;
        }
        let diff = declared.minor().abs_diff(computed);
        if diff > tolerance_minor.unsigned_abs() {
            Some(Issue::warning(
                ErrorCode::ArithmeticMismatch,
                format!(
                    "declared subtotal {} differs from computed line sum {} by {} minor units",
                    declared.minor(),
                    computed,
                    diff
                ),
            ))
        } else {
            None
        }
    }

    /// Returns true when an issue with the given code is present.
    #[must_use]
    pub fn has_issue(&self, code: ErrorCode) -> bool {
        self.issues.iter().any(|issue| issue.code == code)
    }

    /// Returns true when any issue requires human input.
    #[must_use]
    pub fn requires_human(&self) -> bool {
        self.issues.iter().any(|issue| issue.requires_human)
    }
}
