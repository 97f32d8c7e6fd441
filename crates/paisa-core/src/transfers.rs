//! Self-transfer detection
//!
//! Pairs a debit in one account with a matching credit in another so
//! money moved between a user's own accounts stops counting as spending.
//! Candidates are scored, then resolved greedily so each transaction
//! ends up in at most one pair.

use tracing::{debug, info};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{
    Transaction, TransactionType, TransferCandidate, TransferLink, TransferSide,
};
use crate::similarity::token_overlap;

/// Description keywords that mark an explicit transfer
const TRANSFER_KEYWORDS: [&str; 7] = ["transfer", "trf", "neft", "imps", "rtgs", "upi", "self"];

/// Matching thresholds for transfer detection
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Maximum days between the debit and the credit
    pub days_window: i64,
    /// Relative amount difference tolerated; 0.0 means exact match only
    pub amount_tolerance: f64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            days_window: 2,
            amount_tolerance: 0.01,
        }
    }
}

impl TransferConfig {
    fn validate(&self) -> Result<()> {
        if self.days_window <= 0 {
            return Err(Error::InvalidData(format!(
                "Days window must be positive, got {}",
                self.days_window
            )));
        }
        if self.amount_tolerance < 0.0 {
            return Err(Error::InvalidData(format!(
                "Amount tolerance cannot be negative, got {}",
                self.amount_tolerance
            )));
        }
        Ok(())
    }
}

fn side(tx: &Transaction) -> TransferSide {
    TransferSide {
        transaction_id: tx.id,
        account_id: tx.account_id,
        date: tx.date,
        amount: tx.amount,
        description: tx.description.clone(),
    }
}

fn has_transfer_keyword(description: &str) -> bool {
    let lower = description.to_lowercase();
    TRANSFER_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Score a debit/credit pair in [0, 1]
///
/// Starts from 1.0, decays with the date gap and the relative amount
/// difference, and gets boosted when the descriptions carry transfer
/// keywords or overlap in tokens.
fn score_pair(debit: &Transaction, credit: &Transaction, config: &TransferConfig) -> f64 {
    let date_diff = (credit.date - debit.date).num_days().abs();
    let date_factor = 1.0 - 0.2 * (date_diff as f64 / config.days_window as f64);

    let debit_amount = debit.amount.abs();
    let amount_diff_pct = if debit_amount > 0.0 {
        (debit_amount - credit.amount.abs()).abs() / debit_amount
    } else {
        0.0
    };

    let mut score = date_factor * (1.0 - amount_diff_pct);

    if has_transfer_keyword(&debit.description) || has_transfer_keyword(&credit.description) {
        score *= 1.2;
    }
    if token_overlap(&debit.description, &credit.description) >= 0.5 {
        score *= 1.1;
    }

    score.clamp(0.0, 1.0)
}

/// Whether a debit/credit pair is even eligible for matching
fn pair_matches(debit: &Transaction, credit: &Transaction, config: &TransferConfig) -> bool {
    if debit.account_id == credit.account_id {
        return false;
    }
    if (credit.date - debit.date).num_days().abs() > config.days_window {
        return false;
    }

    let debit_amount = debit.amount.abs();
    let credit_amount = credit.amount.abs();
    if debit_amount == 0.0 {
        return false;
    }
    (debit_amount - credit_amount).abs() / debit_amount <= config.amount_tolerance
}

/// Database-backed transfer detector
pub struct TransferDetector<'a> {
    db: &'a Database,
    config: TransferConfig,
}

impl<'a> TransferDetector<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            config: TransferConfig::default(),
        }
    }

    pub fn with_config(db: &'a Database, config: TransferConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { db, config })
    }

    /// Detect likely self-transfer pairs among unlinked transactions
    ///
    /// Transactions already in a transfer link or already typed as
    /// transfers never enter the pool. Conflicts are resolved greedily:
    /// highest score first, smaller date gap then lower ids on ties, and
    /// each transaction joins at most one pair. Results come back
    /// highest score first.
    pub fn detect_potential(&self, user_id: i64) -> Result<Vec<TransferCandidate>> {
        let linked = self.db.linked_transaction_ids(user_id)?;
        let transactions = self.db.list_transactions(user_id)?;

        let pool: Vec<&Transaction> = transactions
            .iter()
            .filter(|tx| {
                !linked.contains(&tx.id) && tx.transaction_type != TransactionType::Transfer
            })
            .collect();

        let debits: Vec<&Transaction> = pool.iter().copied().filter(|tx| tx.amount < 0.0).collect();
        let credits: Vec<&Transaction> =
            pool.iter().copied().filter(|tx| tx.amount > 0.0).collect();

        // Score every eligible pair, then settle conflicts greedily
        let mut scored: Vec<(f64, i64, &Transaction, &Transaction)> = Vec::new();
        for debit in &debits {
            for credit in &credits {
                if pair_matches(debit, credit, &self.config) {
                    let score = score_pair(debit, credit, &self.config);
                    let date_diff = (credit.date - debit.date).num_days().abs();
                    scored.push((score, date_diff, debit, credit));
                }
            }
        }

        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then(a.1.cmp(&b.1))
                .then(a.2.id.cmp(&b.2.id))
                .then(a.3.id.cmp(&b.3.id))
        });

        let mut taken = std::collections::HashSet::new();
        let mut candidates = Vec::new();
        for (score, date_diff, debit, credit) in scored {
            if taken.contains(&debit.id) || taken.contains(&credit.id) {
                continue;
            }
            taken.insert(debit.id);
            taken.insert(credit.id);
            candidates.push(TransferCandidate {
                debit: side(debit),
                credit: side(credit),
                confidence_score: score,
                date_diff_days: date_diff,
                amount: debit.amount.abs(),
            });
        }

        debug!(
            user_id,
            candidates = candidates.len(),
            "Transfer detection complete"
        );
        Ok(candidates)
    }

    /// Link a debit and a credit as one self-transfer
    ///
    /// Validates ownership, direction, distinct accounts and the amount
    /// tolerance, then inserts the link and re-types both transactions
    /// as transfers so they drop out of spending and recurring
    /// detection.
    pub fn link(
        &self,
        user_id: i64,
        debit_transaction_id: i64,
        credit_transaction_id: i64,
        confidence_score: Option<f64>,
        is_confirmed: bool,
    ) -> Result<TransferLink> {
        let debit = self
            .db
            .get_transaction(user_id, debit_transaction_id)?
            .ok_or_else(|| {
                Error::NotFound(format!("Transaction not found: {}", debit_transaction_id))
            })?;
        let credit = self
            .db
            .get_transaction(user_id, credit_transaction_id)?
            .ok_or_else(|| {
                Error::NotFound(format!("Transaction not found: {}", credit_transaction_id))
            })?;

        if debit.amount >= 0.0 {
            return Err(Error::InvalidData(format!(
                "Debit side must be negative, transaction {} has amount {}",
                debit.id, debit.amount
            )));
        }
        if credit.amount <= 0.0 {
            return Err(Error::InvalidData(format!(
                "Credit side must be positive, transaction {} has amount {}",
                credit.id, credit.amount
            )));
        }
        if debit.account_id == credit.account_id {
            return Err(Error::InvalidData(
                "Both sides of a transfer are in the same account".into(),
            ));
        }

        let debit_amount = debit.amount.abs();
        let amount_diff_pct = (debit_amount - credit.amount.abs()).abs() / debit_amount;
        if amount_diff_pct > self.config.amount_tolerance {
            return Err(Error::InvalidData(format!(
                "Amounts differ by {:.2}%, beyond the tolerance",
                amount_diff_pct * 100.0
            )));
        }

        let link = self.db.insert_transfer_link(
            user_id,
            debit.id,
            credit.id,
            debit_amount,
            debit.date,
            confidence_score,
            is_confirmed,
        )?;

        self.db
            .set_transaction_type(debit.id, TransactionType::Transfer)?;
        self.db
            .set_transaction_type(credit.id, TransactionType::Transfer)?;

        info!(
            user_id,
            link_id = link.id,
            debit_id = debit.id,
            credit_id = credit.id,
            "Linked transfer"
        );
        Ok(link)
    }

    /// Remove a transfer link and restore both transactions
    ///
    /// The debit side reverts to an expense and the credit side to
    /// income, making both eligible for matching again.
    pub fn unlink(&self, user_id: i64, link_id: i64) -> Result<TransferLink> {
        let link = self.db.delete_transfer_link(user_id, link_id)?;

        self.db
            .set_transaction_type(link.debit_transaction_id, TransactionType::Expense)?;
        self.db
            .set_transaction_type(link.credit_transaction_id, TransactionType::Income)?;

        info!(user_id, link_id, "Unlinked transfer");
        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn tx(id: i64, account: i64, date: &str, amount: f64, desc: &str) -> Transaction {
        Transaction {
            id,
            user_id: 1,
            account_id: account,
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            description: desc.to_string(),
            amount,
            transaction_type: if amount < 0.0 {
                TransactionType::Expense
            } else {
                TransactionType::Income
            },
            merchant_name: None,
            category_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn exact_pair_scores_high() {
        let config = TransferConfig::default();
        let debit = tx(1, 1, "2024-03-10", -20000.0, "NEFT TO SAVINGS");
        let credit = tx(2, 2, "2024-03-10", 20000.0, "NEFT FROM CHECKING");

        assert!(pair_matches(&debit, &credit, &config));
        let score = score_pair(&debit, &credit, &config);
        assert!(score >= 0.9, "score was {}", score);
    }

    #[test]
    fn same_account_never_matches() {
        let config = TransferConfig::default();
        let debit = tx(1, 1, "2024-03-10", -500.0, "TRANSFER");
        let credit = tx(2, 1, "2024-03-10", 500.0, "TRANSFER");
        assert!(!pair_matches(&debit, &credit, &config));
    }

    #[test]
    fn date_gap_beyond_window_rejected() {
        let config = TransferConfig::default();
        let debit = tx(1, 1, "2024-03-10", -500.0, "TRF");
        let credit = tx(2, 2, "2024-03-13", 500.0, "TRF");
        assert!(!pair_matches(&debit, &credit, &config));
    }

    #[test]
    fn date_gap_lowers_the_score() {
        let config = TransferConfig::default();
        let debit = tx(1, 1, "2024-03-10", -500.0, "PAYMENT A");
        let same_day = tx(2, 2, "2024-03-10", 500.0, "PAYMENT B");
        let next_day = tx(3, 2, "2024-03-11", 500.0, "PAYMENT B");

        let s0 = score_pair(&debit, &same_day, &config);
        let s1 = score_pair(&debit, &next_day, &config);
        assert!(s0 > s1);
    }

    #[test]
    fn strict_tolerance_requires_exact_amounts() {
        let config = TransferConfig {
            days_window: 2,
            amount_tolerance: 0.0,
        };
        let debit = tx(1, 1, "2024-03-10", -1000.0, "TRF");
        let near = tx(2, 2, "2024-03-10", 999.0, "TRF");
        let exact = tx(3, 2, "2024-03-10", 1000.0, "TRF");

        assert!(!pair_matches(&debit, &near, &config));
        assert!(pair_matches(&debit, &exact, &config));
    }

    #[test]
    fn lenient_tolerance_accepts_small_differences() {
        let config = TransferConfig::default();
        let debit = tx(1, 1, "2024-03-10", -1000.0, "TRF");
        let near = tx(2, 2, "2024-03-10", 995.0, "TRF");
        assert!(pair_matches(&debit, &near, &config));
    }

    #[test]
    fn zero_days_window_invalid() {
        let config = TransferConfig {
            days_window: 0,
            amount_tolerance: 0.01,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn keyword_boost_raises_the_score() {
        let config = TransferConfig::default();
        let debit_plain = tx(1, 1, "2024-03-10", -500.0, "PAYMENT OUT");
        let credit_plain = tx(2, 2, "2024-03-11", 500.0, "DEPOSIT IN");
        let debit_kw = tx(3, 1, "2024-03-10", -500.0, "NEFT OUT");
        let credit_kw = tx(4, 2, "2024-03-11", 500.0, "DEPOSIT IN");

        let plain = score_pair(&debit_plain, &credit_plain, &config);
        let boosted = score_pair(&debit_kw, &credit_kw, &config);
        assert!(boosted > plain);
    }
}
