//! Budget progress aggregation
//!
//! Measures expense spend per category against the monthly limits.
//! Transfers never count as spending, which is the main reason the
//! transfer detector exists.

use chrono::NaiveDate;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::BudgetProgress;

/// First and last day of a calendar month
fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| Error::InvalidData(format!("Invalid month: {}-{}", year, month)))?;

    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let end = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .ok_or_else(|| Error::InvalidData(format!("Invalid month: {}-{}", year, month)))?
        .pred_opt()
        .ok_or_else(|| Error::InvalidData(format!("Invalid month: {}-{}", year, month)))?;

    Ok((start, end))
}

fn progress_for(category_id: i64, monthly_limit: f64, spent: f64) -> BudgetProgress {
    BudgetProgress {
        category_id,
        monthly_limit,
        spent,
        remaining: monthly_limit - spent,
        percent_used: if monthly_limit > 0.0 {
            spent / monthly_limit * 100.0
        } else {
            0.0
        },
        over_budget: spent > monthly_limit,
    }
}

/// Progress of every budget for one calendar month, by category
pub fn budget_progress(
    db: &Database,
    user_id: i64,
    year: i32,
    month: u32,
) -> Result<Vec<BudgetProgress>> {
    let (start, end) = month_bounds(year, month)?;
    let budgets = db.list_budgets(user_id)?;

    budgets
        .iter()
        .map(|budget| {
            let spent = db.category_spend(user_id, budget.category_id, start, end)?;
            Ok(progress_for(budget.category_id, budget.monthly_limit, spent))
        })
        .collect()
}

/// Progress of one category's budget for one calendar month
pub fn category_progress(
    db: &Database,
    user_id: i64,
    category_id: i64,
    year: i32,
    month: u32,
) -> Result<BudgetProgress> {
    let (start, end) = month_bounds(year, month)?;

    let budget = db
        .list_budgets(user_id)?
        .into_iter()
        .find(|b| b.category_id == category_id)
        .ok_or_else(|| Error::NotFound(format!("No budget for category: {}", category_id)))?;

    let spent = db.category_spend(user_id, category_id, start, end)?;
    Ok(progress_for(category_id, budget.monthly_limit, spent))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_bounds_cover_the_whole_month() {
        let (start, end) = month_bounds(2024, 2).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn december_rolls_into_the_next_year() {
        let (start, end) = month_bounds(2024, 12).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
    }

    #[test]
    fn invalid_month_rejected() {
        assert!(month_bounds(2024, 13).is_err());
        assert!(month_bounds(2024, 0).is_err());
    }

    #[test]
    fn over_budget_flagged() {
        let p = progress_for(1, 1000.0, 1200.0);
        assert!(p.over_budget);
        assert_eq!(p.remaining, -200.0);
        assert!((p.percent_used - 120.0).abs() < 1e-9);
    }

    #[test]
    fn under_budget_reports_remaining() {
        let p = progress_for(1, 1000.0, 400.0);
        assert!(!p.over_budget);
        assert_eq!(p.remaining, 600.0);
        assert!((p.percent_used - 40.0).abs() < 1e-9);
    }
}
