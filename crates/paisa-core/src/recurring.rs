//! Recurring payment detection
//!
//! Groups resolved transactions by merchant, measures the day gaps
//! between charges, and classifies stable cadences into billing
//! intervals. Detection is recomputed from scratch on every run; the
//! persisted rules only carry the user's suggested/confirmed/dismissed
//! decisions, which the run reconciles against.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use tracing::{debug, info};

use crate::db::{Database, RuleDraft};
use crate::error::{Error, Result};
use crate::models::{
    NewRecurringRule, ReconciledPattern, RecurringInterval, RecurringListResponse, RecurringRule,
    RecurringStatus, RecurringSuggestion, RuleEdits, Transaction, TransactionType,
};

/// Detection thresholds
#[derive(Debug, Clone)]
pub struct RecurringConfig {
    /// Minimum charges before a merchant can be suggested
    pub min_occurrences: usize,
    /// Maximum std/mean of day gaps for a cadence to count as regular
    pub max_interval_cv: f64,
    /// Amount std/mean above which a pattern is variable-amount
    pub variable_amount_cv: f64,
    /// Confidence below which a fresh suggestion is not surfaced
    pub suggest_floor: f64,
}

impl Default for RecurringConfig {
    fn default() -> Self {
        Self {
            min_occurrences: 3,
            max_interval_cv: 0.30,
            variable_amount_cv: 0.20,
            suggest_floor: 0.50,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation
fn std_dev(values: &[f64], mean: f64) -> f64 {
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Classify an average gap into the nearest billing interval
///
/// Each interval accepts gaps within its own tolerance of the nominal
/// period; gaps that fall between the bands classify as nothing.
fn classify_interval(avg_days: f64) -> Option<RecurringInterval> {
    RecurringInterval::all()
        .into_iter()
        .find(|interval| (avg_days - interval.days()).abs() <= interval.tolerance())
}

/// Analyze one merchant's charges for a recurring cadence
///
/// Returns None when there are too few charges, the gaps are too
/// irregular, or the average gap matches no billing interval. The
/// confidence blends occurrence count, gap regularity and amount
/// stability (0.40 / 0.35 / 0.25).
pub fn analyze_group(
    merchant: &str,
    transactions: &[Transaction],
    config: &RecurringConfig,
) -> Option<RecurringSuggestion> {
    if transactions.len() < config.min_occurrences {
        return None;
    }

    let mut observed: Vec<(NaiveDate, f64, i64)> = transactions
        .iter()
        .map(|tx| (tx.date, tx.amount.abs(), tx.id))
        .collect();
    observed.sort_by(|a, b| a.0.cmp(&b.0).then(a.2.cmp(&b.2)));

    let gaps: Vec<f64> = observed
        .windows(2)
        .map(|w| (w[1].0 - w[0].0).num_days() as f64)
        .collect();

    let avg_days = mean(&gaps);
    if avg_days <= 0.0 {
        return None; // All charges on the same day
    }
    let std_days = std_dev(&gaps, avg_days);

    if std_days / avg_days > config.max_interval_cv {
        return None;
    }

    let interval = classify_interval(avg_days)?;

    let amounts: Vec<f64> = observed.iter().map(|(_, amount, _)| *amount).collect();
    let amount_mean = mean(&amounts);
    let amount_cv = if amount_mean > 0.0 {
        std_dev(&amounts, amount_mean) / amount_mean
    } else {
        0.0
    };
    let is_variable = amount_cv > config.variable_amount_cv;

    let count_term = (observed.len() as f64 / 10.0).min(1.0);
    let regularity_term = 1.0 - ((std_days / avg_days) / config.max_interval_cv).min(1.0);
    let amount_term = 1.0 - amount_cv.min(1.0);
    let confidence = 0.40 * count_term + 0.35 * regularity_term + 0.25 * amount_term;

    let last_date = observed[observed.len() - 1].0;
    let next_date = last_date + Duration::days(avg_days.round() as i64);

    Some(RecurringSuggestion {
        merchant: merchant.to_string(),
        amount: amount_mean,
        amount_min: is_variable
            .then(|| amounts.iter().cloned().fold(f64::INFINITY, f64::min)),
        amount_max: is_variable
            .then(|| amounts.iter().cloned().fold(f64::NEG_INFINITY, f64::max)),
        is_variable_amount: is_variable,
        interval,
        avg_days,
        std_days,
        confidence,
        last_date,
        next_date,
        transaction_count: observed.len(),
        transaction_ids: observed.into_iter().map(|(_, _, id)| id).collect(),
    })
}

/// Database-backed recurring payment detector
pub struct RecurringDetector<'a> {
    db: &'a Database,
    config: RecurringConfig,
}

impl<'a> RecurringDetector<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            config: RecurringConfig::default(),
        }
    }

    pub fn with_config(db: &'a Database, config: RecurringConfig) -> Self {
        Self { db, config }
    }

    /// Resolved expense/income transactions grouped by merchant
    ///
    /// Transfers and unresolved transactions never contribute to a
    /// cadence.
    fn merchant_groups(&self, user_id: i64) -> Result<BTreeMap<String, Vec<Transaction>>> {
        let transactions = self.db.list_transactions(user_id)?;

        let mut groups: BTreeMap<String, Vec<Transaction>> = BTreeMap::new();
        for tx in transactions {
            if tx.transaction_type == TransactionType::Transfer {
                continue;
            }
            let merchant = match &tx.merchant_name {
                Some(name) if !name.is_empty() => name.clone(),
                _ => continue,
            };
            groups.entry(merchant).or_default().push(tx);
        }

        Ok(groups)
    }

    /// Fold one detected pattern against the user's persisted rules
    fn reconcile(
        &self,
        user_id: i64,
        suggestion: RecurringSuggestion,
    ) -> Result<ReconciledPattern> {
        let rule = self.db.get_rule_by_merchant(user_id, &suggestion.merchant)?;

        match rule {
            Some(rule) if rule.status == RecurringStatus::Dismissed => {
                Ok(ReconciledPattern::Dismissed)
            }
            Some(rule) if rule.status == RecurringStatus::Confirmed => {
                self.db.refresh_rule_observations(
                    rule.id,
                    suggestion.last_date,
                    suggestion.next_date,
                    suggestion.transaction_count as i64,
                )?;
                let refreshed = self
                    .db
                    .get_rule(user_id, rule.id)?
                    .ok_or_else(|| Error::NotFound(format!("Rule not found: {}", rule.id)))?;
                Ok(ReconciledPattern::Confirmed(refreshed))
            }
            _ => Ok(ReconciledPattern::Suggested(suggestion)),
        }
    }

    /// Run detection over all of a user's transactions
    ///
    /// Returns fresh suggestions above the confidence floor (highest
    /// confidence first, larger amount on ties), confirmed rules
    /// refreshed with the latest observations, and the number of
    /// patterns suppressed by a dismissal.
    pub fn detect(&self, user_id: i64) -> Result<RecurringListResponse> {
        let groups = self.merchant_groups(user_id)?;

        let mut response = RecurringListResponse::default();
        for (merchant, transactions) in &groups {
            let Some(suggestion) = analyze_group(merchant, transactions, &self.config) else {
                continue;
            };

            match self.reconcile(user_id, suggestion)? {
                ReconciledPattern::Suggested(s) => {
                    if s.confidence >= self.config.suggest_floor {
                        response.suggestions.push(s);
                    }
                }
                ReconciledPattern::Confirmed(rule) => response.confirmed.push(rule),
                ReconciledPattern::Dismissed => response.dismissed_count += 1,
            }
        }

        response.suggestions.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then(b.amount.total_cmp(&a.amount))
        });

        info!(
            user_id,
            suggestions = response.suggestions.len(),
            confirmed = response.confirmed.len(),
            dismissed = response.dismissed_count,
            "Recurring detection complete"
        );
        Ok(response)
    }

    /// Confirm a merchant's recurring pattern, optionally editing it
    ///
    /// Re-detects the merchant's cadence and persists it as a confirmed
    /// rule; an existing suggested rule flips to confirmed instead.
    /// Edits override the detected values. A dismissed rule is terminal
    /// and must be deleted before the merchant can be confirmed.
    pub fn confirm(
        &self,
        user_id: i64,
        merchant: &str,
        edits: &RuleEdits,
    ) -> Result<RecurringRule> {
        if let Some(rule) = self.db.get_rule_by_merchant(user_id, merchant)? {
            if rule.status == RecurringStatus::Dismissed {
                return Err(Error::Conflict(format!(
                    "Rule for merchant {} was dismissed; delete it first",
                    merchant
                )));
            }
            self.db
                .set_rule_status(user_id, rule.id, RecurringStatus::Confirmed)?;
            self.db.apply_rule_edits(user_id, rule.id, edits)?;
            return self
                .db
                .get_rule(user_id, rule.id)?
                .ok_or_else(|| Error::NotFound(format!("Rule not found: {}", rule.id)));
        }

        let groups = self.merchant_groups(user_id)?;
        let suggestion = groups
            .get(merchant)
            .and_then(|txs| analyze_group(merchant, txs, &self.config));

        let draft = match suggestion {
            Some(s) => RuleDraft {
                merchant_name: merchant.to_string(),
                expected_amount: edits.expected_amount.unwrap_or(s.amount),
                amount_min: s.amount_min,
                amount_max: s.amount_max,
                is_variable_amount: s.is_variable_amount,
                interval: edits.interval.unwrap_or(s.interval),
                avg_days: s.avg_days,
                status: RecurringStatus::Confirmed,
                confidence: s.confidence,
                last_transaction_date: Some(s.last_date),
                next_expected_date: edits.next_expected_date.or(Some(s.next_date)),
                transaction_count: s.transaction_count as i64,
                category_id: edits.category_id,
            },
            // No detectable cadence, so the edits must supply the shape
            None => {
                let (Some(amount), Some(interval)) = (edits.expected_amount, edits.interval)
                else {
                    return Err(Error::InvalidData(format!(
                        "No recurring pattern detected for merchant: {}",
                        merchant
                    )));
                };
                RuleDraft {
                    merchant_name: merchant.to_string(),
                    expected_amount: amount,
                    amount_min: None,
                    amount_max: None,
                    is_variable_amount: false,
                    interval,
                    avg_days: interval.days(),
                    status: RecurringStatus::Confirmed,
                    confidence: 1.0,
                    last_transaction_date: None,
                    next_expected_date: edits.next_expected_date,
                    transaction_count: 0,
                    category_id: edits.category_id,
                }
            }
        };

        let rule = self.db.insert_rule(user_id, &draft)?;
        debug!(user_id, merchant, rule_id = rule.id, "Confirmed recurring rule");
        Ok(rule)
    }

    /// Dismiss a merchant's recurring pattern
    ///
    /// The dismissal persists, so the merchant stays suppressed on
    /// every later detection run until the rule is deleted.
    pub fn dismiss(&self, user_id: i64, merchant: &str) -> Result<RecurringRule> {
        if let Some(rule) = self.db.get_rule_by_merchant(user_id, merchant)? {
            self.db
                .set_rule_status(user_id, rule.id, RecurringStatus::Dismissed)?;
            return self
                .db
                .get_rule(user_id, rule.id)?
                .ok_or_else(|| Error::NotFound(format!("Rule not found: {}", rule.id)));
        }

        let groups = self.merchant_groups(user_id)?;
        let suggestion = groups
            .get(merchant)
            .and_then(|txs| analyze_group(merchant, txs, &self.config))
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "No recurring pattern detected for merchant: {}",
                    merchant
                ))
            })?;

        let draft = RuleDraft {
            merchant_name: merchant.to_string(),
            expected_amount: suggestion.amount,
            amount_min: suggestion.amount_min,
            amount_max: suggestion.amount_max,
            is_variable_amount: suggestion.is_variable_amount,
            interval: suggestion.interval,
            avg_days: suggestion.avg_days,
            status: RecurringStatus::Dismissed,
            confidence: suggestion.confidence,
            last_transaction_date: Some(suggestion.last_date),
            next_expected_date: Some(suggestion.next_date),
            transaction_count: suggestion.transaction_count as i64,
            category_id: None,
        };

        let rule = self.db.insert_rule(user_id, &draft)?;
        debug!(user_id, merchant, rule_id = rule.id, "Dismissed recurring rule");
        Ok(rule)
    }

    /// Create a recurring rule by hand, without any detected history
    ///
    /// Manual rules are confirmed immediately with full confidence.
    pub fn create_manual_rule(
        &self,
        user_id: i64,
        rule: &NewRecurringRule,
    ) -> Result<RecurringRule> {
        let draft = RuleDraft {
            merchant_name: rule.merchant_name.clone(),
            expected_amount: rule.expected_amount,
            amount_min: None,
            amount_max: None,
            is_variable_amount: false,
            interval: rule.interval,
            avg_days: rule.interval.days(),
            status: RecurringStatus::Confirmed,
            confidence: 1.0,
            last_transaction_date: None,
            next_expected_date: rule.next_expected_date,
            transaction_count: 0,
            category_id: rule.category_id,
        };

        self.db.insert_rule(user_id, &draft)
    }
}
