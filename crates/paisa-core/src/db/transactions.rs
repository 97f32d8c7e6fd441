//! Transaction store operations

use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{NewTransaction, Transaction, TransactionType};

const TX_COLUMNS: &str = "id, user_id, account_id, date, description, amount, \
                          transaction_type, merchant_name, category_id, created_at";

pub(crate) fn row_to_transaction(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let date_str: String = row.get(3)?;
    let type_str: String = row.get(6)?;
    let created_at_str: String = row.get(9)?;

    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        account_id: row.get(2)?,
        date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?,
        description: row.get(4)?,
        amount: row.get(5)?,
        transaction_type: TransactionType::from_str(&type_str)
            .unwrap_or(TransactionType::Expense),
        merchant_name: row.get(7)?,
        category_id: row.get(8)?,
        created_at: parse_datetime(&created_at_str),
    })
}

impl Database {
    /// Create an account, or return the existing one with the same name
    pub fn upsert_account(&self, user_id: i64, name: &str) -> Result<i64> {
        let conn = self.conn()?;

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM accounts WHERE user_id = ? AND name = ?",
                params![user_id, name],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            return Ok(id);
        }

        conn.execute(
            "INSERT INTO accounts (user_id, name) VALUES (?, ?)",
            params![user_id, name],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Insert a transaction, returning its id
    pub fn insert_transaction(&self, user_id: i64, tx: &NewTransaction) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO transactions
                (user_id, account_id, date, description, amount, transaction_type, merchant_name, category_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                user_id,
                tx.account_id,
                tx.date.to_string(),
                tx.description,
                tx.amount,
                tx.transaction_type.as_str(),
                tx.merchant_name,
                tx.category_id,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Get a transaction by id, scoped to its owner
    pub fn get_transaction(&self, user_id: i64, id: i64) -> Result<Option<Transaction>> {
        let conn = self.conn()?;

        conn.query_row(
            &format!(
                "SELECT {} FROM transactions WHERE id = ? AND user_id = ?",
                TX_COLUMNS
            ),
            params![id, user_id],
            row_to_transaction,
        )
        .optional()
        .map_err(Error::from)
    }

    /// List all of a user's transactions, oldest first
    pub fn list_transactions(&self, user_id: i64) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions WHERE user_id = ? ORDER BY date, id",
            TX_COLUMNS
        ))?;

        let transactions = stmt
            .query_map(params![user_id], row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(transactions)
    }

    /// List a user's transactions with no resolved merchant
    pub fn list_unresolved_transactions(&self, user_id: i64) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions \
             WHERE user_id = ? AND (merchant_name IS NULL OR merchant_name = '') \
             ORDER BY date, id",
            TX_COLUMNS
        ))?;

        let transactions = stmt
            .query_map(params![user_id], row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(transactions)
    }

    /// Write a resolved merchant name (and optionally a category) back
    /// to a transaction
    pub fn set_transaction_merchant(
        &self,
        id: i64,
        merchant_name: &str,
        category_id: Option<i64>,
    ) -> Result<()> {
        let conn = self.conn()?;

        if let Some(cat) = category_id {
            // Only fill in the category if the transaction has none yet
            conn.execute(
                "UPDATE transactions SET merchant_name = ?, \
                 category_id = COALESCE(category_id, ?) WHERE id = ?",
                params![merchant_name, cat, id],
            )?;
        } else {
            conn.execute(
                "UPDATE transactions SET merchant_name = ? WHERE id = ?",
                params![merchant_name, id],
            )?;
        }

        Ok(())
    }

    /// Re-type a transaction (used when linking/unlinking transfers)
    pub fn set_transaction_type(&self, id: i64, transaction_type: TransactionType) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE transactions SET transaction_type = ? WHERE id = ?",
            params![transaction_type.as_str(), id],
        )?;
        Ok(())
    }
}
