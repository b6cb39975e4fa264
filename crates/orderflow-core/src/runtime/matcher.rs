// crates/orderflow-core/src/runtime/matcher.rs
// ============================================================================
// Module: Orderflow Matching Engine
// Description: Customer and item resolution against the external catalog.
// Purpose: Classify matches deterministically with exact, barcode, and fuzzy
// strategies over a two-tier cache.
// Dependencies: crate::{core, interfaces}, serde_json, strsim
// ============================================================================

//! ## Overview
//! Customers resolve exact-first, then by normalized edit distance; items
//! resolve SKU-first, then GTIN, then (optionally) fuzzy name. Boundary
//! semantics are fixed: a fuzzy candidate is kept iff its score is at least
//! the threshold, and the outcome is ambiguous iff the top-two gap is
//! strictly below the ambiguity gap. Catalog lookups go through an in-memory
//! TTL tier backed by the durable match cache; during catalog outages stale
//! entries are served and flagged so the event log records the degradation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::core::CustomerMatch;
use crate::core::EngineError;
use crate::core::ErrorKind;
use crate::core::ItemMatch;
use crate::core::MatchCandidate;
use crate::core::MatchStatus;
use crate::core::Timestamp;
use crate::core::identifiers::TenantId;
use crate::core::order::LineItem;
use crate::interfaces::CachedCandidates;
use crate::interfaces::CatalogClient;
use crate::interfaces::CustomerCandidate;
use crate::interfaces::ItemCandidate;
use crate::interfaces::ItemQuery;
use crate::interfaces::MatchCache;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Matching behavior configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatcherConfig {
    /// Minimum normalized edit-distance score for a fuzzy candidate.
    pub fuzzy_threshold: f64,
    /// Top-two score gap below which the outcome is ambiguous.
    pub ambiguity_gap: f64,
    /// Whether fuzzy name matching is enabled for items.
    pub fuzzy_item_names: bool,
    /// In-memory cache TTL in seconds.
    pub cache_ttl_secs: u64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.75,
            ambiguity_gap: 0.10,
            fuzzy_item_names: true,
            cache_ttl_secs: 3_600,
        }
    }
}

// ============================================================================
// SECTION: Matcher
// ============================================================================

/// Search payload served by the cache, with staleness marker.
struct Fetched<T> {
    /// Candidates returned by the catalog or cache.
    candidates: Vec<T>,
    /// True when served from an expired entry during a catalog outage.
    stale: bool,
}

/// Matching engine over the catalog client and two-tier cache.
pub struct Matcher {
    /// Catalog client.
    catalog: Arc<dyn CatalogClient>,
    /// Durable cache tier.
    durable: Arc<dyn MatchCache>,
    /// In-memory cache tier.
    memory: Mutex<HashMap<String, CachedCandidates>>,
    /// Behavior configuration.
    config: MatcherConfig,
}

impl Matcher {
    /// Creates a matcher over the given catalog and durable cache.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        durable: Arc<dyn MatchCache>,
        config: MatcherConfig,
    ) -> Self {
        Self {
            catalog,
            durable,
            memory: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Resolves the order's free-text customer name.
    ///
    /// # Errors
    ///
    /// Returns a classified [`EngineError`] when the catalog fails and no
    /// stale cache entry can cover the query.
    pub fn match_customer(
        &self,
        name: &str,
        tenant: &TenantId,
        now: Timestamp,
    ) -> Result<CustomerMatch, EngineError> {
        let key = format!("{tenant}/customer/{}", name.trim().to_lowercase());
        let fetched: Fetched<CustomerCandidate> = self.cached(&key, now, || {
            self.catalog.search_customer(name, tenant)
        })?;

        let needle = name.trim().to_lowercase();
        if let Some(exact) = fetched
            .candidates
            .iter()
            .find(|candidate| candidate.display_name.trim().to_lowercase() == needle)
        {
            return Ok(CustomerMatch {
                status: MatchStatus::Resolved,
                candidates: vec![candidate_of(exact, 1.0)],
                customer_id: Some(exact.id.clone()),
                stale_cache: fetched.stale,
            });
        }

        let mut scored: Vec<(f64, &CustomerCandidate)> = fetched
            .candidates
            .iter()
            .map(|candidate| {
                (score(&needle, &candidate.display_name.trim().to_lowercase()), candidate)
            })
            .filter(|(value, _)| *value >= self.config.fuzzy_threshold)
            .collect();
        sort_scored(&mut scored, |candidate| candidate.id.as_str());

        let candidates: Vec<MatchCandidate> =
            scored.iter().map(|(value, candidate)| candidate_of(candidate, *value)).collect();

        match scored.as_slice() {
            [] => Ok(CustomerMatch {
                status: MatchStatus::NotFound,
                candidates,
                customer_id: None,
                stale_cache: fetched.stale,
            }),
            [(top, candidate), rest @ ..] => {
                let ambiguous =
                    rest.first().is_some_and(|(second, _)| top - second < self.config.ambiguity_gap);
                if ambiguous {
                    Ok(CustomerMatch {
                        status: MatchStatus::Ambiguous,
                        candidates,
                        customer_id: None,
                        stale_cache: fetched.stale,
                    })
                } else {
                    Ok(CustomerMatch {
                        status: MatchStatus::Resolved,
                        candidates,
                        customer_id: Some(candidate.id.clone()),
                        stale_cache: fetched.stale,
                    })
                }
            }
        }
    }

    /// Resolves one order line against catalog items.
    ///
    /// # Errors
    ///
    /// Returns a classified [`EngineError`] when the catalog fails and no
    /// stale cache entry can cover the query.
    pub fn match_item(
        &self,
        line: &LineItem,
        tenant: &TenantId,
        now: Timestamp,
    ) -> Result<ItemMatch, EngineError> {
        if let Some(sku) = line.sku.as_deref() {
            let needle = sku.trim().to_lowercase();
            let key = format!("{tenant}/item/sku/{needle}");
            let fetched: Fetched<ItemCandidate> = self.cached(&key, now, || {
                self.catalog.search_item(&ItemQuery::Sku(sku.trim().to_string()), tenant)
            })?;
            let exact: Vec<&ItemCandidate> = fetched
                .candidates
                .iter()
                .filter(|candidate| candidate.sku.trim().to_lowercase() == needle)
                .collect();
            match exact.as_slice() {
                [only] => {
                    return Ok(resolved_item(line.line_number, only, 1.0, fetched.stale));
                }
                [] => {}
                many => {
                    return Ok(ambiguous_item(line.line_number, many, fetched.stale));
                }
            }
        }

        if let Some(gtin) = line.gtin.as_deref() {
            let needle = gtin.trim().to_string();
            let key = format!("{tenant}/item/gtin/{needle}");
            let fetched: Fetched<ItemCandidate> = self.cached(&key, now, || {
                self.catalog.search_item(&ItemQuery::Gtin(needle.clone()), tenant)
            })?;
            let exact: Vec<&ItemCandidate> = fetched
                .candidates
                .iter()
                .filter(|candidate| candidate.gtin.as_deref() == Some(needle.as_str()))
                .collect();
            match exact.as_slice() {
                [only] => {
                    return Ok(resolved_item(line.line_number, only, 1.0, fetched.stale));
                }
                [] => {}
                many => {
                    return Ok(ambiguous_item(line.line_number, many, fetched.stale));
                }
            }
        }

        if self.config.fuzzy_item_names
            && let Some(description) = line.description.as_deref()
        {
            let needle = description.trim().to_lowercase();
            let key = format!("{tenant}/item/name/{needle}");
            let fetched: Fetched<ItemCandidate> = self.cached(&key, now, || {
                self.catalog.search_item(&ItemQuery::Name(description.trim().to_string()), tenant)
            })?;
            let mut scored: Vec<(f64, &ItemCandidate)> = fetched
                .candidates
                .iter()
                .map(|candidate| (score(&needle, &candidate.name.trim().to_lowercase()), candidate))
                .filter(|(value, _)| *value >= self.config.fuzzy_threshold)
                .collect();
            sort_scored(&mut scored, |candidate| candidate.id.as_str());

            let candidates: Vec<MatchCandidate> =
                scored.iter().map(|(value, candidate)| item_candidate_of(candidate, *value)).collect();
            match scored.as_slice() {
                [] => {}
                [(top, candidate), rest @ ..] => {
                    let ambiguous = rest
                        .first()
                        .is_some_and(|(second, _)| top - second < self.config.ambiguity_gap);
                    if ambiguous {
                        return Ok(ItemMatch {
                            line_number: line.line_number,
                            status: MatchStatus::Ambiguous,
                            candidates,
                            item_id: None,
                            catalog_price: None,
                            stale_cache: fetched.stale,
                        });
                    }
                    return Ok(resolved_item(line.line_number, candidate, *top, fetched.stale));
                }
            }
        }

        if line.missing_identifier() && line.description.is_none() {
            return Ok(ItemMatch {
                line_number: line.line_number,
                status: MatchStatus::NeedsUserInput,
                candidates: Vec::new(),
                item_id: None,
                catalog_price: None,
                stale_cache: false,
            });
        }

        Ok(ItemMatch {
            line_number: line.line_number,
            status: MatchStatus::NotFound,
            candidates: Vec::new(),
            item_id: None,
            catalog_price: None,
            stale_cache: false,
        })
    }

    /// Serves a search through the two-tier cache.
    ///
    /// Fresh entries short-circuit the catalog; misses populate both tiers.
    /// On transient catalog failure an expired entry, when present, is served
    /// with the stale flag set.
    fn cached<T>(
        &self,
        key: &str,
        now: Timestamp,
        fetch: impl FnOnce() -> Result<Vec<T>, EngineError>,
    ) -> Result<Fetched<T>, EngineError>
    where
        T: Serialize + DeserializeOwned,
    {
        let ttl_millis = i64::try_from(self.config.cache_ttl_secs.saturating_mul(1_000))
            .unwrap_or(i64::MAX);
        let fresh = |entry: &CachedCandidates| {
            now.as_millis().saturating_sub(entry.cached_at.as_millis()) <= ttl_millis
        };

        let cached_entry = {
            let memory = self.memory.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            memory.get(key).cloned()
        };
        let cached_entry = match cached_entry {
            Some(entry) => Some(entry),
            None => self.durable.get(key).unwrap_or_default(),
        };

        if let Some(entry) = &cached_entry
            && fresh(entry)
            && let Ok(candidates) = serde_json::from_value(entry.payload.clone())
        {
            return Ok(Fetched {
                candidates,
                stale: false,
            });
        }

        match fetch() {
            Ok(candidates) => {
                if let Ok(payload) = serde_json::to_value(&candidates) {
                    let entry = CachedCandidates {
                        payload,
                        cached_at: now,
                    };
                    self.memory
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .insert(key.to_string(), entry.clone());
                    // Durable-tier write failures degrade to memory-only caching.
                    let _unused = self.durable.put(key, &entry);
                }
                Ok(Fetched {
                    candidates,
                    stale: false,
                })
            }
            Err(error) if error.kind() == ErrorKind::Transient => {
                if let Some(entry) = cached_entry
                    && let Ok(candidates) = serde_json::from_value(entry.payload)
                {
                    return Ok(Fetched {
                        candidates,
                        stale: true,
                    });
                }
                Err(error)
            }
            Err(error) => Err(error),
        }
    }
}

// ============================================================================
// SECTION: Scoring Helpers
// ============================================================================

/// Normalized edit-distance score between two lowercased strings.
fn score(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// Sorts scored candidates best-first with a stable id tie-break.
fn sort_scored<T>(scored: &mut [(f64, &T)], id_of: impl Fn(&T) -> &str) {
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| id_of(a.1).cmp(id_of(b.1))));
}

/// Converts a customer candidate into the surfaced form.
fn candidate_of(candidate: &CustomerCandidate, value: f64) -> MatchCandidate {
    MatchCandidate {
        id: candidate.id.to_string(),
        label: candidate.display_name.clone(),
        score: value,
        unit_price: None,
    }
}

/// Converts an item candidate into the surfaced form.
fn item_candidate_of(candidate: &ItemCandidate, value: f64) -> MatchCandidate {
    MatchCandidate {
        id: candidate.id.to_string(),
        label: format!("{} ({})", candidate.name, candidate.sku),
        score: value,
        unit_price: Some(candidate.unit_price),
    }
}

/// Builds an ambiguous item match from exact-lookup collisions.
fn ambiguous_item(line_number: u32, collisions: &[&ItemCandidate], stale: bool) -> ItemMatch {
    ItemMatch {
        line_number,
        status: MatchStatus::Ambiguous,
        candidates: collisions.iter().map(|candidate| item_candidate_of(candidate, 1.0)).collect(),
        item_id: None,
        catalog_price: None,
        stale_cache: stale,
    }
}

/// Builds a resolved item match carrying the catalog price.
fn resolved_item(line_number: u32, candidate: &ItemCandidate, value: f64, stale: bool) -> ItemMatch {
    ItemMatch {
        line_number,
        status: MatchStatus::Resolved,
        candidates: vec![item_candidate_of(candidate, value)],
        item_id: Some(candidate.id.clone()),
        catalog_price: Some(candidate.unit_price),
        stale_cache: stale,
    }
}
