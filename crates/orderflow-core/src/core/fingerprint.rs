// crates/orderflow-core/src/core/fingerprint.rs
// ============================================================================
// Module: Orderflow Fingerprints
// Description: Deterministic order fingerprint and date-bucket computation.
// Purpose: Key at-most-once draft creation per logically identical order.
// Dependencies: crate::core::{hashing, identifiers, order}, serde, time
// ============================================================================

//! ## Overview
//! Two order attempts that hash to the same fingerprint must resolve to the
//! same external draft. The fingerprint covers the original file digest, the
//! resolved customer, the normalized sorted line tuples, and a coarse date
//! bucket: the same order re-uploaded in the next bucket is intentionally not
//! deduplicated.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::core::hashing::HashError;
use crate::core::hashing::Sha256Digest;
use crate::core::identifiers::CustomerId;
use crate::core::order::LineItem;

// ============================================================================
// SECTION: Bucket Granularity
// ============================================================================

/// Date-bucket granularity for fingerprint computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BucketGranularity {
    /// Hour bucket, e.g. `2026-08-01T14`.
    Hour,
    /// Day bucket, e.g. `2026-08-01` (default).
    #[default]
    Day,
    /// ISO week bucket, e.g. `2026-W31`.
    Week,
    /// Month bucket, e.g. `2026-08`.
    Month,
}

/// Renders the bucket label for a unix-millisecond timestamp.
///
/// Timestamps that fall outside the representable calendar range collapse to
/// a single `invalid` bucket rather than failing draft creation.
#[must_use]
pub fn date_bucket(unix_millis: i64, granularity: BucketGranularity) -> String {
    let nanos = i128::from(unix_millis) * 1_000_000;
    let Ok(moment) = OffsetDateTime::from_unix_timestamp_nanos(nanos) else {
        return "invalid".to_string();
    };
    let date = moment.date();
    match granularity {
        BucketGranularity::Hour => format!(
            "{:04}-{:02}-{:02}T{:02}",
            date.year(),
            u8::from(date.month()),
            date.day(),
            moment.hour()
        ),
        BucketGranularity::Day => {
            format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
        }
        BucketGranularity::Week => {
            let (year, week, _) = date.to_iso_week_date();
            format!("{year:04}-W{week:02}")
        }
        BucketGranularity::Month => format!("{:04}-{:02}", date.year(), u8::from(date.month())),
    }
}

// ============================================================================
// SECTION: Fingerprint
// ============================================================================

/// Normalized line tuple entering the fingerprint.
#[derive(Debug, Clone, PartialEq, PartialOrd, Serialize)]
struct LineTuple {
    /// Uppercased, trimmed SKU (empty when absent).
    sku: String,
    /// Trimmed GTIN (empty when absent).
    gtin: String,
    /// Ordered quantity.
    quantity: f64,
}

/// Computes the deterministic fingerprint for one order attempt.
///
/// The recipe is SHA-256 over the concatenation of: the file digest, the
/// resolved customer id, the digest of the sorted normalized line tuples, and
/// the date-bucket label. Line tuples sort by SKU then GTIN, so line order in
/// the spreadsheet does not affect the fingerprint.
///
/// # Errors
///
/// Returns [`HashError`] when the line tuples cannot be canonicalized.
pub fn order_fingerprint(
    file_sha256: &Sha256Digest,
    customer_id: &CustomerId,
    lines: &[LineItem],
    bucket: &str,
) -> Result<Sha256Digest, HashError> {
    let mut tuples: Vec<LineTuple> = lines
        .iter()
        .map(|line| LineTuple {
            sku: line.sku.as_deref().unwrap_or("").trim().to_uppercase(),
            gtin: line.gtin.as_deref().unwrap_or("").trim().to_string(),
            quantity: line.quantity,
        })
        .collect();
    tuples.sort_by(|a, b| {
        a.sku
            .cmp(&b.sku)
            .then_with(|| a.gtin.cmp(&b.gtin))
            .then_with(|| a.quantity.total_cmp(&b.quantity))
    });
    let lines_digest = Sha256Digest::of_canonical_json(&tuples)?;

    let mut preimage = Vec::new();
    preimage.extend_from_slice(file_sha256.as_str().as_bytes());
    preimage.extend_from_slice(customer_id.as_str().as_bytes());
    preimage.extend_from_slice(lines_digest.as_str().as_bytes());
    preimage.extend_from_slice(bucket.as_bytes());
    Ok(Sha256Digest::of_bytes(&preimage))
}
