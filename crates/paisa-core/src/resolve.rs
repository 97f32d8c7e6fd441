//! Merchant resolution
//!
//! Maps raw statement descriptions to canonical merchants in two passes:
//! a pattern pass over each mapping's exact/wildcard patterns, then a
//! fuzzy pass against the canonical names for descriptions no pattern
//! claims. Pattern hits always win over fuzzy scores.

use std::collections::HashMap;

use regex::Regex;
use tracing::{debug, info};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{MerchantMapping, ResolvedMerchant, UnmappedMerchant};
use crate::similarity::token_set_ratio;

/// Similarity floor applied when a mapping does not carry its own
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.85;

/// Payment-rail prefixes that carry no merchant information
const RAIL_PREFIXES: [&str; 9] = [
    "UPI/", "NEFT/", "IMPS/", "RTGS/", "POS/", "ATM/", "CR/", "DR/", "TRF/",
];

/// Normalize a statement description for matching
///
/// Uppercases, strips payment-rail prefixes and trailing reference
/// noise (branch suffixes, UPI handles, transaction ids), drops date
/// fragments and long digit runs, and collapses the rest to
/// space-separated tokens.
pub fn normalize_description(description: &str) -> String {
    let mut text = description.trim().to_string();

    // Rail prefixes stack, e.g. "UPI/DR/1234/SWIGGY"
    let mut stripped = true;
    while stripped {
        stripped = false;
        for prefix in RAIL_PREFIXES {
            let head = text.get(..prefix.len());
            if head.is_some_and(|h| h.eq_ignore_ascii_case(prefix)) {
                text = text[prefix.len()..].to_string();
                stripped = true;
            }
        }
    }

    let mut text = text.to_uppercase();

    // Trailing reference noise, one layer at a time
    let suffixes = [
        r"\*[A-Z]+\d*$",  // *DELHI, *BANGALORE123
        r"-\d+$",         // -123
        r"\s+\d{6,}$",    // trailing transaction ids
        r"/[A-Z0-9]+$",   // /PAYTM, /PHONEPE
        r"@[A-Z]+$",      // @PAYTM, @YBL
    ];
    let mut stripped = true;
    while stripped {
        stripped = false;
        for suffix in suffixes {
            if let Ok(re) = Regex::new(suffix) {
                let next = re.replace(&text, "").trim_end().to_string();
                if next != text {
                    text = next;
                    stripped = true;
                }
            }
        }
    }

    // Dates and long digit runs are per-transaction noise
    if let Ok(re) = Regex::new(r"\d{1,4}[-/]\d{1,2}[-/]\d{1,4}") {
        text = re.replace_all(&text, " ").to_string();
    }
    if let Ok(re) = Regex::new(r"\d{4,}") {
        text = re.replace_all(&text, " ").to_string();
    }

    // Everything non-alphanumeric becomes a token boundary
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Compile a `*`/`?` glob into an anchored regex matching from the
/// start of the description
fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let escaped = regex::escape(&pattern.to_uppercase())
        .replace(r"\*", ".*")
        .replace(r"\?", ".");
    Ok(Regex::new(&format!("^{}", escaped))?)
}

/// Check one pattern against a normalized description
///
/// Globs match as anchored prefixes; plain patterns match as
/// substrings.
fn pattern_matches(normalized: &str, pattern: &str) -> bool {
    if pattern.contains('*') || pattern.contains('?') {
        glob_to_regex(pattern)
            .map(|re| re.is_match(normalized))
            .unwrap_or(false)
    } else {
        normalized.contains(&pattern.to_uppercase())
    }
}

/// Resolve a description against a set of mappings, without side effects
///
/// Pattern pass first: among all pattern hits the longest pattern wins
/// (most specific). Fuzzy pass only when no pattern matches: best
/// token-set score at or above each mapping's own threshold, ties
/// broken by higher usage count, then lower mapping id.
pub fn resolve_against(
    description: &str,
    mappings: &[MerchantMapping],
) -> Option<ResolvedMerchant> {
    let normalized = normalize_description(description);
    if normalized.is_empty() {
        return None;
    }

    // Pattern pass
    let mut pattern_hit: Option<(&MerchantMapping, &str)> = None;
    for mapping in mappings {
        for pattern in &mapping.patterns {
            if pattern_matches(&normalized, pattern) {
                let more_specific = match pattern_hit {
                    Some((_, best)) => pattern.len() > best.len(),
                    None => true,
                };
                if more_specific {
                    pattern_hit = Some((mapping, pattern));
                }
            }
        }
    }

    if let Some((mapping, pattern)) = pattern_hit {
        return Some(ResolvedMerchant {
            mapping_id: mapping.id,
            canonical_name: mapping.normalized_name.clone(),
            category_id: mapping.category_id,
            score: 1.0,
            matched_pattern: Some(pattern.to_string()),
        });
    }

    // Fuzzy pass
    let mut best: Option<(f64, &MerchantMapping, Option<&str>)> = None;
    for mapping in mappings {
        let threshold = mapping.fuzzy_threshold;

        let mut candidate: Option<(f64, Option<&str>)> = None;

        let name_score = token_set_ratio(&mapping.normalized_name.to_uppercase(), &normalized);
        if name_score >= threshold {
            candidate = Some((name_score, None));
        }

        // The wildcard-stripped patterns are a second fuzzy surface;
        // bank spellings often sit closer to a pattern than to the
        // display name.
        for pattern in &mapping.patterns {
            let bare = pattern.replace(['*', '?'], "");
            if bare.is_empty() {
                continue;
            }
            let score = token_set_ratio(&bare.to_uppercase(), &normalized);
            if score >= threshold && candidate.map_or(true, |(s, _)| score > s) {
                candidate = Some((score, Some(pattern.as_str())));
            }
        }

        if let Some((score, matched)) = candidate {
            let wins = match best {
                None => true,
                Some((best_score, best_mapping, _)) => {
                    score > best_score
                        || (score == best_score
                            && (mapping.usage_count > best_mapping.usage_count
                                || (mapping.usage_count == best_mapping.usage_count
                                    && mapping.id < best_mapping.id)))
                }
            };
            if wins {
                best = Some((score, mapping, matched));
            }
        }
    }

    best.map(|(score, mapping, matched)| ResolvedMerchant {
        mapping_id: mapping.id,
        canonical_name: mapping.normalized_name.clone(),
        category_id: mapping.category_id,
        score,
        matched_pattern: matched.map(|p| p.to_string()),
    })
}

/// Database-backed merchant resolver
pub struct MerchantResolver<'a> {
    db: &'a Database,
}

impl<'a> MerchantResolver<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Resolve a single description against the user's mappings,
    /// without touching any stored state
    pub fn resolve(&self, user_id: i64, description: &str) -> Result<Option<ResolvedMerchant>> {
        let mappings = self.db.list_mappings(user_id)?;
        Ok(resolve_against(description, &mappings))
    }

    /// Resolve one stored transaction and record the outcome
    ///
    /// On a hit this writes `merchant_name` (and the mapping's default
    /// category when the transaction has none) and increments the
    /// mapping's usage counter. No match is a normal outcome, not an
    /// error.
    pub fn resolve_transaction(
        &self,
        user_id: i64,
        transaction_id: i64,
    ) -> Result<Option<ResolvedMerchant>> {
        let tx = self
            .db
            .get_transaction(user_id, transaction_id)?
            .ok_or_else(|| Error::NotFound(format!("Transaction not found: {}", transaction_id)))?;

        let mappings = self.db.list_mappings(user_id)?;
        let resolution = resolve_against(&tx.description, &mappings);

        if let Some(ref resolved) = resolution {
            self.db.set_transaction_merchant(
                tx.id,
                &resolved.canonical_name,
                resolved.category_id,
            )?;
            self.db.increment_mapping_usage(resolved.mapping_id)?;
            debug!(
                transaction_id = tx.id,
                merchant = %resolved.canonical_name,
                score = resolved.score,
                "Resolved merchant"
            );
        }

        Ok(resolution)
    }

    /// Resolve every unresolved transaction of a user, returning the
    /// number resolved
    pub fn resolve_all(&self, user_id: i64) -> Result<usize> {
        let mappings = self.db.list_mappings(user_id)?;
        let unresolved = self.db.list_unresolved_transactions(user_id)?;

        let mut count = 0;
        for tx in &unresolved {
            if let Some(resolved) = resolve_against(&tx.description, &mappings) {
                self.db.set_transaction_merchant(
                    tx.id,
                    &resolved.canonical_name,
                    resolved.category_id,
                )?;
                self.db.increment_mapping_usage(resolved.mapping_id)?;
                count += 1;
            }
        }

        info!(
            user_id,
            resolved = count,
            scanned = unresolved.len(),
            "Bulk merchant resolution complete"
        );
        Ok(count)
    }

    /// Re-resolve all of a user's transactions against one mapping's
    /// patterns, returning the number updated
    ///
    /// Idempotent: transactions already carrying the mapping's name are
    /// skipped, so reapplying produces the same assignment.
    pub fn apply_mapping(
        &self,
        user_id: i64,
        mapping_id: i64,
        update_category: bool,
    ) -> Result<usize> {
        let mapping = self
            .db
            .get_mapping(user_id, mapping_id)?
            .ok_or_else(|| Error::NotFound(format!("Mapping not found: {}", mapping_id)))?;

        let transactions = self.db.list_transactions(user_id)?;
        let mut count = 0;

        for tx in &transactions {
            if let Some(existing) = &tx.merchant_name {
                if existing.eq_ignore_ascii_case(&mapping.normalized_name) {
                    continue; // Already mapped to this merchant
                }
            }

            let normalized = normalize_description(&tx.description);
            let matched = mapping
                .patterns
                .iter()
                .any(|pattern| pattern_matches(&normalized, pattern));

            if matched {
                let category = if update_category {
                    mapping.category_id
                } else {
                    None
                };
                self.db
                    .set_transaction_merchant(tx.id, &mapping.normalized_name, category)?;
                count += 1;
            }
        }

        info!(
            user_id,
            mapping_id,
            updated = count,
            "Applied mapping to transactions"
        );
        Ok(count)
    }

    /// Group a user's unresolved transactions by normalized description
    ///
    /// Surfaces the raw merchant shapes a user has not mapped yet,
    /// most frequent first, skipping names that already have a mapping.
    pub fn unmapped_merchants(&self, user_id: i64, limit: usize) -> Result<Vec<UnmappedMerchant>> {
        let unresolved = self.db.list_unresolved_transactions(user_id)?;
        let mappings = self.db.list_mappings(user_id)?;

        struct GroupAcc {
            count: i64,
            total: f64,
            first_seen: chrono::NaiveDate,
            last_seen: chrono::NaiveDate,
            samples: Vec<String>,
        }

        let mut groups: HashMap<String, GroupAcc> = HashMap::new();
        for tx in &unresolved {
            let name = normalize_description(&tx.description);
            if name.is_empty() {
                continue;
            }

            let entry = groups.entry(name).or_insert_with(|| GroupAcc {
                count: 0,
                total: 0.0,
                first_seen: tx.date,
                last_seen: tx.date,
                samples: Vec::new(),
            });
            entry.count += 1;
            entry.total += tx.amount;
            entry.first_seen = entry.first_seen.min(tx.date);
            entry.last_seen = entry.last_seen.max(tx.date);
            if entry.samples.len() < 3 {
                entry.samples.push(tx.description.clone());
            }
        }

        let mut unmapped: Vec<UnmappedMerchant> = groups
            .into_iter()
            .filter(|(name, _)| {
                !mappings
                    .iter()
                    .any(|m| m.normalized_name.eq_ignore_ascii_case(name))
            })
            .map(|(name, acc)| UnmappedMerchant {
                raw_name: name,
                transaction_count: acc.count,
                total_amount: acc.total,
                first_seen: acc.first_seen,
                last_seen: acc.last_seen,
                sample_descriptions: acc.samples,
            })
            .collect();

        unmapped.sort_by(|a, b| {
            b.transaction_count
                .cmp(&a.transaction_count)
                .then_with(|| a.raw_name.cmp(&b.raw_name))
        });
        unmapped.truncate(limit);

        Ok(unmapped)
    }
}
