//! Recurring rule operations

use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{RecurringInterval, RecurringRule, RecurringStatus, RuleEdits};

const RULE_COLUMNS: &str =
    "id, user_id, merchant_name, expected_amount, amount_min, amount_max, is_variable_amount, \
     interval, avg_days, status, confidence, last_transaction_date, next_expected_date, \
     transaction_count, category_id, created_at, updated_at";

/// Field set for inserting a recurring rule row
#[derive(Debug, Clone)]
pub struct RuleDraft {
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
}

fn row_to_rule(row: &Row<'_>) -> rusqlite::Result<RecurringRule> {
    let interval_str: String = row.get(7)?;
    let status_str: String = row.get(9)?;
    let last_date_str: Option<String> = row.get(11)?;
    let next_date_str: Option<String> = row.get(12)?;
    let created_at_str: String = row.get(15)?;
    let updated_at_str: String = row.get(16)?;

    Ok(RecurringRule {
        id: row.get(0)?,
        user_id: row.get(1)?,
        merchant_name: row.get(2)?,
        expected_amount: row.get(3)?,
        amount_min: row.get(4)?,
        amount_max: row.get(5)?,
        is_variable_amount: row.get(6)?,
        interval: RecurringInterval::from_str(&interval_str)
            .unwrap_or(RecurringInterval::Monthly),
        avg_days: row.get(8)?,
        status: RecurringStatus::from_str(&status_str).unwrap_or(RecurringStatus::Suggested),
        confidence: row.get(10)?,
        last_transaction_date: last_date_str
            .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        next_expected_date: next_date_str
            .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        transaction_count: row.get(13)?,
        category_id: row.get(14)?,
        created_at: parse_datetime(&created_at_str),
        updated_at: parse_datetime(&updated_at_str),
    })
}

impl Database {
    /// Insert a recurring rule
    ///
    /// Fails with `Conflict` if the user already has a rule for the
    /// merchant; rules are keyed one-per-merchant.
    pub fn insert_rule(&self, user_id: i64, draft: &RuleDraft) -> Result<RecurringRule> {
        if draft.merchant_name.trim().is_empty() {
            return Err(Error::InvalidData("Merchant name cannot be empty".into()));
        }
        if draft.expected_amount <= 0.0 {
            return Err(Error::InvalidData(format!(
                "Expected amount must be positive, got {}",
                draft.expected_amount
            )));
        }

        let conn = self.conn()?;

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM recurring_rules WHERE user_id = ? AND merchant_name = ?",
                params![user_id, draft.merchant_name],
                |row| row.get(0),
            )
            .optional()?;

        if existing.is_some() {
            return Err(Error::Conflict(format!(
                "Rule already exists for merchant: {}",
                draft.merchant_name
            )));
        }

        conn.execute(
            r#"
            INSERT INTO recurring_rules
                (user_id, merchant_name, expected_amount, amount_min, amount_max,
                 is_variable_amount, interval, avg_days, status, confidence,
                 last_transaction_date, next_expected_date, transaction_count, category_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                user_id,
                draft.merchant_name,
                draft.expected_amount,
                draft.amount_min,
                draft.amount_max,
                draft.is_variable_amount,
                draft.interval.as_str(),
                draft.avg_days,
                draft.status.as_str(),
                draft.confidence,
                draft.last_transaction_date.map(|d| d.to_string()),
                draft.next_expected_date.map(|d| d.to_string()),
                draft.transaction_count,
                draft.category_id,
            ],
        )?;

        let id = conn.last_insert_rowid();
        drop(conn);

        self.get_rule(user_id, id)?
            .ok_or_else(|| Error::NotFound(format!("Rule {} vanished after insert", id)))
    }

    /// Get a rule by id, scoped to its owner
    pub fn get_rule(&self, user_id: i64, id: i64) -> Result<Option<RecurringRule>> {
        let conn = self.conn()?;

        conn.query_row(
            &format!(
                "SELECT {} FROM recurring_rules WHERE id = ? AND user_id = ?",
                RULE_COLUMNS
            ),
            params![id, user_id],
            row_to_rule,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Get a rule by merchant name
    pub fn get_rule_by_merchant(
        &self,
        user_id: i64,
        merchant_name: &str,
    ) -> Result<Option<RecurringRule>> {
        let conn = self.conn()?;

        conn.query_row(
            &format!(
                "SELECT {} FROM recurring_rules WHERE user_id = ? AND merchant_name = ?",
                RULE_COLUMNS
            ),
            params![user_id, merchant_name],
            row_to_rule,
        )
        .optional()
        .map_err(Error::from)
    }

    /// List a user's rules, optionally filtered by status
    pub fn list_rules(
        &self,
        user_id: i64,
        status: Option<RecurringStatus>,
    ) -> Result<Vec<RecurringRule>> {
        let conn = self.conn()?;

        let rules = if let Some(status) = status {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM recurring_rules WHERE user_id = ? AND status = ? \
                 ORDER BY merchant_name",
                RULE_COLUMNS
            ))?;
            let rules = stmt
                .query_map(params![user_id, status.as_str()], row_to_rule)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rules
        } else {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM recurring_rules WHERE user_id = ? ORDER BY merchant_name",
                RULE_COLUMNS
            ))?;
            let rules = stmt
                .query_map(params![user_id], row_to_rule)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rules
        };

        Ok(rules)
    }

    /// Refresh a confirmed rule with the latest detection observations
    ///
    /// Only the observation fields move: last/next dates and the
    /// occurrence count. Everything the user curated while confirming
    /// (amount, interval, category) stays untouched.
    pub fn refresh_rule_observations(
        &self,
        id: i64,
        last_transaction_date: NaiveDate,
        next_expected_date: NaiveDate,
        transaction_count: i64,
    ) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            UPDATE recurring_rules
            SET last_transaction_date = ?,
                next_expected_date = ?,
                transaction_count = ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
            params![
                last_transaction_date.to_string(),
                next_expected_date.to_string(),
                transaction_count,
                id,
            ],
        )?;

        Ok(())
    }

    /// Apply user edits to a rule's curated fields
    ///
    /// Only the provided fields change; observations stay untouched.
    pub fn apply_rule_edits(&self, user_id: i64, id: i64, edits: &RuleEdits) -> Result<()> {
        if let Some(amount) = edits.expected_amount {
            if amount <= 0.0 {
                return Err(Error::InvalidData(format!(
                    "Expected amount must be positive, got {}",
                    amount
                )));
            }
        }

        let rule = self
            .get_rule(user_id, id)?
            .ok_or_else(|| Error::NotFound(format!("Rule not found: {}", id)))?;

        let conn = self.conn()?;
        conn.execute(
            r#"
            UPDATE recurring_rules
            SET expected_amount = ?,
                interval = ?,
                avg_days = ?,
                next_expected_date = ?,
                category_id = ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
            params![
                edits.expected_amount.unwrap_or(rule.expected_amount),
                edits.interval.unwrap_or(rule.interval).as_str(),
                edits
                    .interval
                    .map(|i| i.days())
                    .unwrap_or(rule.avg_days),
                edits
                    .next_expected_date
                    .or(rule.next_expected_date)
                    .map(|d| d.to_string()),
                edits.category_id.or(rule.category_id),
                id,
            ],
        )?;

        Ok(())
    }

    /// Update a rule's lifecycle status
    pub fn set_rule_status(&self, user_id: i64, id: i64, status: RecurringStatus) -> Result<()> {
        let conn = self.conn()?;

        let affected = conn.execute(
            "UPDATE recurring_rules SET status = ?, updated_at = CURRENT_TIMESTAMP \
             WHERE id = ? AND user_id = ?",
            params![status.as_str(), id, user_id],
        )?;

        if affected == 0 {
            return Err(Error::NotFound(format!("Rule not found: {}", id)));
        }

        Ok(())
    }

    /// Delete a rule; the merchant becomes re-suggestible on the next
    /// detection run
    pub fn delete_rule(&self, user_id: i64, id: i64) -> Result<()> {
        let conn = self.conn()?;

        let affected = conn.execute(
            "DELETE FROM recurring_rules WHERE id = ? AND user_id = ?",
            params![id, user_id],
        )?;

        if affected == 0 {
            return Err(Error::NotFound(format!("Rule not found: {}", id)));
        }

        Ok(())
    }
}
