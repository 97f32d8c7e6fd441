//! Paisa Core Library
//!
//! Transaction intelligence for the Paisa personal finance tool:
//! - Database access and migrations
//! - Merchant resolution from raw statement descriptions
//! - Recurring payment detection with a suggest/confirm/dismiss lifecycle
//! - Self-transfer detection between a user's own accounts
//! - Budget progress aggregation

pub mod budget;
pub mod db;
pub mod error;
pub mod models;
pub mod recurring;
pub mod resolve;
pub mod similarity;
pub mod transfers;

pub use budget::{budget_progress, category_progress};
pub use db::{Database, RuleDraft};
pub use error::{Error, Result};
pub use models::{
    Account, Budget, BudgetProgress, MerchantMapping, NewMerchantMapping, NewRecurringRule,
    NewTransaction, ReconciledPattern, RecurringInterval, RecurringListResponse, RecurringRule,
    RecurringStatus, RecurringSuggestion, ResolvedMerchant, RuleEdits, Transaction,
    TransactionType, TransferCandidate, TransferLink, TransferSide, UnmappedMerchant,
};
pub use recurring::{RecurringConfig, RecurringDetector};
pub use resolve::{MerchantResolver, DEFAULT_FUZZY_THRESHOLD};
pub use transfers::{TransferConfig, TransferDetector};
