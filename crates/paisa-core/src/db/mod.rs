//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `transactions` - Transaction store operations
//! - `mappings` - Merchant mapping CRUD and usage counters
//! - `rules` - Recurring rule lifecycle operations
//! - `transfers` - Transfer link creation and removal
//! - `budgets` - Budget CRUD and monthly spend aggregation

use std::sync::Arc;

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tempfile::TempDir;
use tracing::info;

use crate::error::Result;

mod budgets;
mod mappings;
mod rules;
mod transactions;
mod transfers;

pub use rules::RuleDraft;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
    /// Keeps a throwaway database's directory alive; removed on the
    /// last drop
    _temp_dir: Option<Arc<TempDir>>,
}

impl Database {
    /// Create a new database connection pool
    pub fn new(path: &str) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
            _temp_dir: None,
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throwaway database (for testing)
    ///
    /// Uses a temporary file rather than `:memory:` because each pooled
    /// connection would otherwise see its own empty database. The file
    /// lives in a [`TempDir`] that is deleted when the last clone drops.
    pub fn in_memory() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("paisa.db");

        let mut db = Self::new(&path.to_string_lossy())?;
        db._temp_dir = Some(Arc::new(dir));
        Ok(db)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- WAL mode: better concurrency, readers don't block writers
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Accounts (bank accounts, one owner per account)
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_accounts_user ON accounts(user_id);

            -- Transactions (owned by the store; the engine writes back
            -- merchant_name, category_id and transaction_type only)
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                account_id INTEGER NOT NULL REFERENCES accounts(id),
                date DATE NOT NULL,
                description TEXT NOT NULL,
                amount REAL NOT NULL,
                transaction_type TEXT NOT NULL DEFAULT 'expense',
                merchant_name TEXT,
                category_id INTEGER,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_user_date ON transactions(user_id, date);
            CREATE INDEX IF NOT EXISTS idx_transactions_merchant ON transactions(merchant_name);
            CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions(account_id);

            -- Merchant mappings (canonical name + match patterns as JSON array)
            CREATE TABLE IF NOT EXISTS merchant_mappings (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                normalized_name TEXT NOT NULL,
                patterns TEXT NOT NULL DEFAULT '[]',
                category_id INTEGER,
                fuzzy_threshold REAL NOT NULL DEFAULT 0.85,
                is_public BOOLEAN NOT NULL DEFAULT FALSE,
                usage_count INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(user_id, normalized_name)
            );

            CREATE INDEX IF NOT EXISTS idx_mappings_user ON merchant_mappings(user_id);

            -- Recurring rules (user-curated lifecycle state, keyed by merchant)
            CREATE TABLE IF NOT EXISTS recurring_rules (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                merchant_name TEXT NOT NULL,
                expected_amount REAL NOT NULL,
                amount_min REAL,
                amount_max REAL,
                is_variable_amount BOOLEAN NOT NULL DEFAULT FALSE,
                interval TEXT NOT NULL,
                avg_days REAL NOT NULL,
                status TEXT NOT NULL DEFAULT 'suggested',
                confidence REAL NOT NULL DEFAULT 0.0,
                last_transaction_date DATE,
                next_expected_date DATE,
                transaction_count INTEGER NOT NULL DEFAULT 0,
                category_id INTEGER,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(user_id, merchant_name)
            );

            CREATE INDEX IF NOT EXISTS idx_rules_user_status ON recurring_rules(user_id, status);

            -- Transfer links (at most one link per transaction on either side,
            -- enforced by the UNIQUE columns plus the conditional insert)
            CREATE TABLE IF NOT EXISTS transfer_links (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                debit_transaction_id INTEGER NOT NULL UNIQUE REFERENCES transactions(id),
                credit_transaction_id INTEGER NOT NULL UNIQUE REFERENCES transactions(id),
                amount REAL NOT NULL,
                transfer_date DATE NOT NULL,
                confidence_score REAL,
                is_confirmed BOOLEAN NOT NULL DEFAULT TRUE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_transfer_links_user ON transfer_links(user_id);

            -- Budgets (monthly category limits)
            CREATE TABLE IF NOT EXISTS budgets (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                category_id INTEGER NOT NULL,
                monthly_limit REAL NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(user_id, category_id)
            );
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}
