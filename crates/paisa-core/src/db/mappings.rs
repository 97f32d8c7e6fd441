//! Merchant mapping operations

use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{MerchantMapping, NewMerchantMapping};
use crate::resolve::DEFAULT_FUZZY_THRESHOLD;

const MAPPING_COLUMNS: &str = "id, user_id, normalized_name, patterns, category_id, \
                               fuzzy_threshold, is_public, usage_count, created_at, updated_at";

fn row_to_mapping(row: &Row<'_>) -> rusqlite::Result<MerchantMapping> {
    let patterns_json: String = row.get(3)?;
    let created_at_str: String = row.get(8)?;
    let updated_at_str: String = row.get(9)?;

    Ok(MerchantMapping {
        id: row.get(0)?,
        user_id: row.get(1)?,
        normalized_name: row.get(2)?,
        patterns: serde_json::from_str(&patterns_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?,
        category_id: row.get(4)?,
        fuzzy_threshold: row.get(5)?,
        is_public: row.get(6)?,
        usage_count: row.get(7)?,
        created_at: parse_datetime(&created_at_str),
        updated_at: parse_datetime(&updated_at_str),
    })
}

fn validate_mapping(name: &str, patterns: &[String], fuzzy_threshold: f64) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidData("Merchant name cannot be empty".into()));
    }
    if !(fuzzy_threshold > 0.0 && fuzzy_threshold <= 1.0) {
        return Err(Error::InvalidData(format!(
            "Fuzzy threshold must be in (0, 1], got {}",
            fuzzy_threshold
        )));
    }
    for (i, pattern) in patterns.iter().enumerate() {
        if patterns[..i].contains(pattern) {
            return Err(Error::Conflict(format!(
                "Duplicate pattern on mapping: {}",
                pattern
            )));
        }
    }
    Ok(())
}

impl Database {
    /// Create a merchant mapping
    ///
    /// Fails with `Conflict` if the user already has a mapping with the
    /// same canonical name or the pattern list contains duplicates, and
    /// with `InvalidData` for an empty name or out-of-range threshold.
    pub fn create_mapping(
        &self,
        user_id: i64,
        mapping: &NewMerchantMapping,
    ) -> Result<MerchantMapping> {
        let fuzzy_threshold = mapping.fuzzy_threshold.unwrap_or(DEFAULT_FUZZY_THRESHOLD);
        validate_mapping(&mapping.normalized_name, &mapping.patterns, fuzzy_threshold)?;

        let conn = self.conn()?;

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM merchant_mappings WHERE user_id = ? AND normalized_name = ?",
                params![user_id, mapping.normalized_name],
                |row| row.get(0),
            )
            .optional()?;

        if existing.is_some() {
            return Err(Error::Conflict(format!(
                "Mapping already exists for merchant: {}",
                mapping.normalized_name
            )));
        }

        conn.execute(
            r#"
            INSERT INTO merchant_mappings
                (user_id, normalized_name, patterns, category_id, fuzzy_threshold, is_public)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                user_id,
                mapping.normalized_name,
                serde_json::to_string(&mapping.patterns)?,
                mapping.category_id,
                fuzzy_threshold,
                mapping.is_public,
            ],
        )?;

        let id = conn.last_insert_rowid();
        drop(conn);

        self.get_mapping(user_id, id)?
            .ok_or_else(|| Error::NotFound(format!("Mapping {} vanished after insert", id)))
    }

    /// Get a mapping by id, scoped to its owner
    pub fn get_mapping(&self, user_id: i64, id: i64) -> Result<Option<MerchantMapping>> {
        let conn = self.conn()?;

        conn.query_row(
            &format!(
                "SELECT {} FROM merchant_mappings WHERE id = ? AND user_id = ?",
                MAPPING_COLUMNS
            ),
            params![id, user_id],
            row_to_mapping,
        )
        .optional()
        .map_err(Error::from)
    }

    /// List all of a user's mappings, by canonical name
    pub fn list_mappings(&self, user_id: i64) -> Result<Vec<MerchantMapping>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM merchant_mappings WHERE user_id = ? ORDER BY normalized_name",
            MAPPING_COLUMNS
        ))?;

        let mappings = stmt
            .query_map(params![user_id], row_to_mapping)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(mappings)
    }

    /// Add a pattern to an existing mapping
    ///
    /// Fails with `Conflict` if the mapping already carries the pattern.
    pub fn add_mapping_pattern(&self, user_id: i64, id: i64, pattern: &str) -> Result<()> {
        if pattern.trim().is_empty() {
            return Err(Error::InvalidData("Pattern cannot be empty".into()));
        }

        let mapping = self
            .get_mapping(user_id, id)?
            .ok_or_else(|| Error::NotFound(format!("Mapping not found: {}", id)))?;

        if mapping.patterns.iter().any(|p| p == pattern) {
            return Err(Error::Conflict(format!(
                "Duplicate pattern on mapping: {}",
                pattern
            )));
        }

        let mut patterns = mapping.patterns;
        patterns.push(pattern.to_string());

        let conn = self.conn()?;
        conn.execute(
            "UPDATE merchant_mappings SET patterns = ?, updated_at = CURRENT_TIMESTAMP \
             WHERE id = ?",
            params![serde_json::to_string(&patterns)?, id],
        )?;

        Ok(())
    }

    /// Atomically increment a mapping's usage counter
    ///
    /// A single UPDATE so concurrent resolutions never lose increments.
    pub fn increment_mapping_usage(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE merchant_mappings SET usage_count = usage_count + 1, \
             updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![id],
        )?;
        Ok(())
    }

    /// Delete a mapping
    pub fn delete_mapping(&self, user_id: i64, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let affected = conn.execute(
            "DELETE FROM merchant_mappings WHERE id = ? AND user_id = ?",
            params![id, user_id],
        )?;

        if affected == 0 {
            return Err(Error::NotFound(format!("Mapping not found: {}", id)));
        }

        Ok(())
    }
}
