//! Budget operations

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::Budget;

fn row_to_budget(row: &Row<'_>) -> rusqlite::Result<Budget> {
    let created_at_str: String = row.get(4)?;

    Ok(Budget {
        id: row.get(0)?,
        user_id: row.get(1)?,
        category_id: row.get(2)?,
        monthly_limit: row.get(3)?,
        created_at: parse_datetime(&created_at_str),
    })
}

impl Database {
    /// Create or update a monthly budget for a category
    pub fn upsert_budget(&self, user_id: i64, category_id: i64, monthly_limit: f64) -> Result<i64> {
        if monthly_limit <= 0.0 {
            return Err(Error::InvalidData(format!(
                "Monthly limit must be positive, got {}",
                monthly_limit
            )));
        }

        let conn = self.conn()?;

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM budgets WHERE user_id = ? AND category_id = ?",
                params![user_id, category_id],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            conn.execute(
                "UPDATE budgets SET monthly_limit = ? WHERE id = ?",
                params![monthly_limit, id],
            )?;
            return Ok(id);
        }

        conn.execute(
            "INSERT INTO budgets (user_id, category_id, monthly_limit) VALUES (?, ?, ?)",
            params![user_id, category_id, monthly_limit],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// List all of a user's budgets
    pub fn list_budgets(&self, user_id: i64) -> Result<Vec<Budget>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, user_id, category_id, monthly_limit, created_at \
             FROM budgets WHERE user_id = ? ORDER BY category_id",
        )?;

        let budgets = stmt
            .query_map(params![user_id], row_to_budget)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(budgets)
    }

    /// Total expense spend in a category between two dates, inclusive
    ///
    /// Transfers and income are excluded; the sum is returned as a
    /// positive magnitude.
    pub fn category_spend(
        &self,
        user_id: i64,
        category_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<f64> {
        let conn = self.conn()?;

        let spent: f64 = conn.query_row(
            "SELECT COALESCE(SUM(ABS(amount)), 0.0) FROM transactions \
             WHERE user_id = ? AND category_id = ? AND transaction_type = 'expense' \
               AND date >= ? AND date <= ?",
            params![user_id, category_id, from.to_string(), to.to_string()],
            |row| row.get(0),
        )?;

        Ok(spent)
    }
}
