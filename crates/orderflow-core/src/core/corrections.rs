// crates/orderflow-core/src/core/corrections.rs
// ============================================================================
// Module: Orderflow Corrections
// Description: User correction patches producing new canonical-order versions.
// Purpose: Apply targeted field replacements without mutating prior versions.
// Dependencies: crate::core::{error, identifiers, order}, serde
// ============================================================================

//! ## Overview
//! A correction patch points at a field of the current canonical order and
//! supplies a replacement value. Applying a patch set produces a new order
//! version; prior versions stay untouched in the evidence store. Column pins
//! do not change order content: they become hard constraints on the next
//! committee round. An empty patch set yields byte-identical content under a
//! new version number, which is what isolates versioning from content.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::error::ErrorCode;
use crate::core::identifiers::ColumnId;
use crate::core::order::CanonicalOrder;

// ============================================================================
// SECTION: Patch Model
// ============================================================================

/// One targeted field replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum CorrectionPatch {
    /// Replace the free-text customer name.
    Customer {
        /// Replacement customer name.
        name: String,
    },
    /// Replace the quantity on one line.
    Quantity {
        /// Line number to patch.
        line: u32,
        /// Replacement quantity; must be non-negative.
        quantity: f64,
    },
    /// Replace (or clear) the SKU on one line.
    Sku {
        /// Line number to patch.
        line: u32,
        /// Replacement SKU, `null` to clear.
        sku: Option<String>,
    },
    /// Replace (or clear) the GTIN on one line.
    Gtin {
        /// Line number to patch.
        line: u32,
        /// Replacement GTIN, `null` to clear.
        gtin: Option<String>,
    },
    /// Replace (or clear) the description on one line.
    Description {
        /// Line number to patch.
        line: u32,
        /// Replacement description, `null` to clear.
        description: Option<String>,
    },
    /// Pin a canonical field to a specific column for committee re-runs.
    PinColumn {
        /// Canonical field to pin.
        field: String,
        /// Column the field is pinned to.
        column_id: ColumnId,
    },
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while applying correction patches.
#[derive(Debug, Error)]
pub enum CorrectionError {
    /// Patch referenced a line number that does not exist.
    #[error("patch references unknown line {0}")]
    UnknownLine(u32),
    /// Replacement quantity was negative.
    #[error("line {line}: quantity must be non-negative, got {quantity}")]
    NegativeQuantity {
        /// Line number of the offending patch.
        line: u32,
        /// Rejected quantity value.
        quantity: f64,
    },
    /// Replacement customer name was empty.
    #[error("customer name must not be empty")]
    EmptyCustomer,
}

// ============================================================================
// SECTION: Application
// ============================================================================

/// Applies a patch set, returning the next order version and column pins.
///
/// Content patches mutate the copied order and trigger re-validation of the
/// arithmetic and identifier invariants; pin patches only accumulate into the
/// returned map. When no content patch is present the returned order differs
/// from the input solely in its version number.
///
/// # Errors
///
/// Returns [`CorrectionError`] when a patch is not applicable; no partial
/// application happens on error.
pub fn apply_corrections(
    order: &CanonicalOrder,
    patches: &[CorrectionPatch],
    tolerance_minor: i64,
) -> Result<(CanonicalOrder, BTreeMap<String, ColumnId>), CorrectionError> {
    let mut next = order.clone();
    next.version = order.version.saturating_add(1);
    let mut pins = BTreeMap::new();
    let mut content_changed = false;

    for patch in patches {
        match patch {
            CorrectionPatch::Customer { name } => {
                if name.trim().is_empty() {
                    return Err(CorrectionError::EmptyCustomer);
                }
                next.customer.name = name.clone();
                content_changed = true;
            }
            CorrectionPatch::Quantity { line, quantity } => {
                if *quantity < 0.0 {
                    return Err(CorrectionError::NegativeQuantity {
                        line: *line,
                        quantity: *quantity,
                    });
                }
                line_mut(&mut next, *line)?.quantity = *quantity;
                content_changed = true;
            }
            CorrectionPatch::Sku { line, sku } => {
                line_mut(&mut next, *line)?.sku = sku.clone();
                content_changed = true;
            }
            CorrectionPatch::Gtin { line, gtin } => {
                line_mut(&mut next, *line)?.gtin = gtin.clone();
                content_changed = true;
            }
            CorrectionPatch::Description { line, description } => {
                line_mut(&mut next, *line)?.description = description.clone();
                content_changed = true;
            }
            CorrectionPatch::PinColumn { field, column_id } => {
                pins.insert(field.clone(), column_id.clone());
            }
        }
    }

    if content_changed {
        next.issues.retain(|issue| {
            issue.code != ErrorCode::ArithmeticMismatch && issue.code != ErrorCode::MissingItemIdentifier
        });
        next.validate(tolerance_minor);
    }

    Ok((next, pins))
}

/// Looks up a mutable line by number.
fn line_mut(
    order: &mut CanonicalOrder,
    line_number: u32,
) -> Result<&mut crate::core::order::LineItem, CorrectionError> {
    order
        .lines
        .iter_mut()
        .find(|line| line.line_number == line_number)
        .ok_or(CorrectionError::UnknownLine(line_number))
}
