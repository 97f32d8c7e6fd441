//! Transfer link operations

use std::collections::HashSet;

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::TransferLink;

const LINK_COLUMNS: &str = "id, user_id, debit_transaction_id, credit_transaction_id, \
                            amount, transfer_date, confidence_score, is_confirmed, created_at";

fn row_to_link(row: &Row<'_>) -> rusqlite::Result<TransferLink> {
    let date_str: String = row.get(5)?;
    let created_at_str: String = row.get(8)?;

    Ok(TransferLink {
        id: row.get(0)?,
        user_id: row.get(1)?,
        debit_transaction_id: row.get(2)?,
        credit_transaction_id: row.get(3)?,
        amount: row.get(4)?,
        transfer_date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?,
        confidence_score: row.get(6)?,
        is_confirmed: row.get(7)?,
        created_at: parse_datetime(&created_at_str),
    })
}

impl Database {
    /// Insert a transfer link only if neither transaction is already
    /// linked on either side
    ///
    /// The guard is a single conditional INSERT, not a read followed by
    /// a write, so concurrent link attempts cannot both succeed; the
    /// UNIQUE columns back it up at the schema level. Fails with
    /// `Conflict` when a side is taken.
    pub fn insert_transfer_link(
        &self,
        user_id: i64,
        debit_transaction_id: i64,
        credit_transaction_id: i64,
        amount: f64,
        transfer_date: NaiveDate,
        confidence_score: Option<f64>,
        is_confirmed: bool,
    ) -> Result<TransferLink> {
        let conn = self.conn()?;

        let affected = conn.execute(
            r#"
            INSERT INTO transfer_links
                (user_id, debit_transaction_id, credit_transaction_id, amount,
                 transfer_date, confidence_score, is_confirmed)
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7
            WHERE NOT EXISTS (
                SELECT 1 FROM transfer_links
                WHERE debit_transaction_id IN (?2, ?3)
                   OR credit_transaction_id IN (?2, ?3)
            )
            "#,
            params![
                user_id,
                debit_transaction_id,
                credit_transaction_id,
                amount,
                transfer_date.to_string(),
                confidence_score,
                is_confirmed,
            ],
        )?;

        if affected == 0 {
            return Err(Error::Conflict(format!(
                "Transaction {} or {} is already part of a transfer link",
                debit_transaction_id, credit_transaction_id
            )));
        }

        let id = conn.last_insert_rowid();
        drop(conn);

        self.get_transfer_link(user_id, id)?
            .ok_or_else(|| Error::NotFound(format!("Transfer link {} vanished after insert", id)))
    }

    /// Get a transfer link by id, scoped to its owner
    pub fn get_transfer_link(&self, user_id: i64, id: i64) -> Result<Option<TransferLink>> {
        let conn = self.conn()?;

        conn.query_row(
            &format!(
                "SELECT {} FROM transfer_links WHERE id = ? AND user_id = ?",
                LINK_COLUMNS
            ),
            params![id, user_id],
            row_to_link,
        )
        .optional()
        .map_err(Error::from)
    }

    /// List all of a user's transfer links, newest first
    pub fn list_transfer_links(&self, user_id: i64) -> Result<Vec<TransferLink>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transfer_links WHERE user_id = ? ORDER BY transfer_date DESC, id DESC",
            LINK_COLUMNS
        ))?;

        let links = stmt
            .query_map(params![user_id], row_to_link)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(links)
    }

    /// Ids of all transactions already claimed by a transfer link
    pub fn linked_transaction_ids(&self, user_id: i64) -> Result<HashSet<i64>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT debit_transaction_id, credit_transaction_id \
             FROM transfer_links WHERE user_id = ?",
        )?;

        let mut ids = HashSet::new();
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (debit, credit) = row?;
            ids.insert(debit);
            ids.insert(credit);
        }

        Ok(ids)
    }

    /// Delete a transfer link, returning the deleted row
    pub fn delete_transfer_link(&self, user_id: i64, id: i64) -> Result<TransferLink> {
        let link = self
            .get_transfer_link(user_id, id)?
            .ok_or_else(|| Error::NotFound(format!("Transfer link not found: {}", id)))?;

        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM transfer_links WHERE id = ? AND user_id = ?",
            params![id, user_id],
        )?;

        Ok(link)
    }
}
