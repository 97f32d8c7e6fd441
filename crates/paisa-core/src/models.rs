//! Domain models for Paisa

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A bank account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Transaction direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Transfer => "transfer",
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            "transfer" => Ok(Self::Transfer),
            _ => Err(format!("Unknown transaction type: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A financial transaction
///
/// Owned by the external transaction store; the engine only ever writes
/// `merchant_name`, `category_id` and `transaction_type` back to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub account_id: i64,
    pub date: NaiveDate,
    /// Raw statement description
    pub description: String,
    /// Negative = expense/debit, positive = income/credit
    pub amount: f64,
    pub transaction_type: TransactionType,
    /// Canonical merchant name, written by the merchant resolver
    pub merchant_name: Option<String>,
    pub category_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// A new transaction to be stored (before DB insertion)
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub account_id: i64,
    pub date: NaiveDate,
    pub description: String,
    pub amount: f64,
    pub transaction_type: TransactionType,
    pub merchant_name: Option<String>,
    pub category_id: Option<i64>,
}

/// A merchant mapping: canonical name plus the patterns that match it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantMapping {
    pub id: i64,
    pub user_id: i64,
    /// Canonical display name, e.g. "Swiggy"
    pub normalized_name: String,
    /// Exact strings or `*`-wildcard globs, e.g. ["SWIGGY*", "SWIGGY DELHI"]
    pub patterns: Vec<String>,
    /// Default category assigned on resolution
    pub category_id: Option<i64>,
    /// Minimum similarity in (0,1] for non-pattern matches
    pub fuzzy_threshold: f64,
    /// Shareable across users
    pub is_public: bool,
    /// Incremented on each successful resolution
    pub usage_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A new merchant mapping (before DB insertion)
#[derive(Debug, Clone)]
pub struct NewMerchantMapping {
    pub normalized_name: String,
    pub patterns: Vec<String>,
    pub category_id: Option<i64>,
    /// Defaults to [`crate::resolve::DEFAULT_FUZZY_THRESHOLD`] when None
    pub fuzzy_threshold: Option<f64>,
    pub is_public: bool,
}

/// How a description was resolved to a mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedMerchant {
    pub mapping_id: i64,
    pub canonical_name: String,
    pub category_id: Option<i64>,
    /// 1.0 for pattern hits, the similarity score for fuzzy hits
    pub score: f64,
    /// The pattern that matched, None for fuzzy name matches
    pub matched_pattern: Option<String>,
}

/// Summary of unresolved transactions sharing a normalized description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnmappedMerchant {
    pub raw_name: String,
    pub transaction_count: i64,
    pub total_amount: f64,
    pub first_seen: NaiveDate,
    pub last_seen: NaiveDate,
    pub sample_descriptions: Vec<String>,
}

/// Recurring rule lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurringStatus {
    Suggested,
    Confirmed,
    Dismissed,
}

impl RecurringStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Suggested => "suggested",
            Self::Confirmed => "confirmed",
            Self::Dismissed => "dismissed",
        }
    }
}

impl std::str::FromStr for RecurringStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "suggested" => Ok(Self::Suggested),
            "confirmed" => Ok(Self::Confirmed),
            "dismissed" => Ok(Self::Dismissed),
            _ => Err(format!("Unknown recurring status: {}", s)),
        }
    }
}

/// Canonical billing periods for recurring payments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecurringInterval {
    Weekly,
    #[serde(rename = "Bi-weekly")]
    BiWeekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl RecurringInterval {
    /// Nominal period length in days
    pub fn days(&self) -> f64 {
        match self {
            Self::Weekly => 7.0,
            Self::BiWeekly => 14.0,
            Self::Monthly => 30.0,
            Self::Quarterly => 91.0,
            Self::Yearly => 365.0,
        }
    }

    /// Accepted deviation from the nominal period, in days
    pub fn tolerance(&self) -> f64 {
        match self {
            Self::Weekly => 2.0,
            Self::BiWeekly => 3.0,
            Self::Monthly => 5.0,
            Self::Quarterly => 10.0,
            Self::Yearly => 20.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "Weekly",
            Self::BiWeekly => "Bi-weekly",
            Self::Monthly => "Monthly",
            Self::Quarterly => "Quarterly",
            Self::Yearly => "Yearly",
        }
    }

    /// All intervals, ordered by period length
    pub fn all() -> [RecurringInterval; 5] {
        [
            Self::Weekly,
            Self::BiWeekly,
            Self::Monthly,
            Self::Quarterly,
            Self::Yearly,
        ]
    }
}

impl std::str::FromStr for RecurringInterval {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Weekly" => Ok(Self::Weekly),
            "Bi-weekly" => Ok(Self::BiWeekly),
            "Monthly" => Ok(Self::Monthly),
            "Quarterly" => Ok(Self::Quarterly),
            "Yearly" => Ok(Self::Yearly),
            _ => Err(format!("Unknown recurring interval: {}", s)),
        }
    }
}

impl std::fmt::Display for RecurringInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted, user-curated recurring payment rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringRule {
    pub id: i64,
    pub user_id: i64,
    pub merchant_name: String,
    pub expected_amount: f64,
    pub amount_min: Option<f64>,
    pub amount_max: Option<f64>,
    pub is_variable_amount: bool,
    pub interval: RecurringInterval,
    pub avg_days: f64,
    pub status: RecurringStatus,
    pub confidence: f64,
    pub last_transaction_date: Option<NaiveDate>,
    pub next_expected_date: Option<NaiveDate>,
    pub transaction_count: i64,
    pub category_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A manually entered recurring rule (before DB insertion)
#[derive(Debug, Clone)]
pub struct NewRecurringRule {
    pub merchant_name: String,
    pub expected_amount: f64,
    pub interval: RecurringInterval,
    pub next_expected_date: Option<NaiveDate>,
    pub category_id: Option<i64>,
}

/// A detected recurring payment, recomputed on every detection run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringSuggestion {
    pub merchant: String,
    /// Mean charge for fixed-amount patterns, mean of observed for variable
    pub amount: f64,
    pub amount_min: Option<f64>,
    pub amount_max: Option<f64>,
    pub is_variable_amount: bool,
    pub interval: RecurringInterval,
    pub avg_days: f64,
    pub std_days: f64,
    pub confidence: f64,
    pub last_date: NaiveDate,
    pub next_date: NaiveDate,
    pub transaction_count: usize,
    /// Contributing transactions, oldest first
    pub transaction_ids: Vec<i64>,
}

/// Reconciliation outcome for one detected merchant pattern
///
/// Detection recomputes suggestions each run and folds them against the
/// persisted rules; modeling the three outcomes explicitly keeps the
/// reconciliation exhaustive instead of a nullable-status check.
#[derive(Debug, Clone)]
pub enum ReconciledPattern {
    /// No rule yet, surface as a fresh suggestion
    Suggested(RecurringSuggestion),
    /// Rule confirmed by the user, refreshed with the latest observations
    Confirmed(RecurringRule),
    /// Rule dismissed by the user, suppressed entirely
    Dismissed,
}

/// Detection output consumed by the presentation layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecurringListResponse {
    pub suggestions: Vec<RecurringSuggestion>,
    pub confirmed: Vec<RecurringRule>,
    pub dismissed_count: usize,
}

/// User edits applied while confirming a suggestion
#[derive(Debug, Clone, Default)]
pub struct RuleEdits {
    pub expected_amount: Option<f64>,
    pub interval: Option<RecurringInterval>,
    pub next_expected_date: Option<NaiveDate>,
    pub category_id: Option<i64>,
}

/// A confirmed link between a debit and a credit transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferLink {
    pub id: i64,
    pub user_id: i64,
    pub debit_transaction_id: i64,
    pub credit_transaction_id: i64,
    /// Absolute value of the moved amount
    pub amount: f64,
    pub transfer_date: NaiveDate,
    pub confidence_score: Option<f64>,
    pub is_confirmed: bool,
    pub created_at: DateTime<Utc>,
}

/// One side of a potential transfer pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSide {
    pub transaction_id: i64,
    pub account_id: i64,
    pub date: NaiveDate,
    pub amount: f64,
    pub description: String,
}

/// A scored debit/credit pair surfaced by transfer detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferCandidate {
    pub debit: TransferSide,
    pub credit: TransferSide,
    pub confidence_score: f64,
    pub date_diff_days: i64,
    /// Absolute value of the debit amount
    pub amount: f64,
}

/// A monthly spending limit for one category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub id: i64,
    pub user_id: i64,
    pub category_id: i64,
    pub monthly_limit: f64,
    pub created_at: DateTime<Utc>,
}

/// Category spend measured against its budget for one month
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetProgress {
    pub category_id: i64,
    pub monthly_limit: f64,
    pub spent: f64,
    pub remaining: f64,
    pub percent_used: f64,
    pub over_budget: bool,
}
