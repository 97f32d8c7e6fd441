//! End-to-end tests over a throwaway database

use chrono::NaiveDate;

use paisa_core::{
    budget_progress, Database, MerchantResolver, NewMerchantMapping, NewRecurringRule,
    NewTransaction, RecurringDetector, RecurringInterval, RecurringStatus, RuleEdits,
    TransactionType, TransferDetector,
};

const USER: i64 = 1;

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn insert_tx(
    db: &Database,
    account_id: i64,
    date_str: &str,
    description: &str,
    amount: f64,
) -> i64 {
    db.insert_transaction(
        USER,
        &NewTransaction {
            account_id,
            date: date(date_str),
            description: description.to_string(),
            amount,
            transaction_type: if amount < 0.0 {
                TransactionType::Expense
            } else {
                TransactionType::Income
            },
            merchant_name: None,
            category_id: None,
        },
    )
    .unwrap()
}

fn mapping(name: &str, patterns: &[&str], category_id: Option<i64>) -> NewMerchantMapping {
    NewMerchantMapping {
        normalized_name: name.to_string(),
        patterns: patterns.iter().map(|p| p.to_string()).collect(),
        category_id,
        fuzzy_threshold: None,
        is_public: false,
    }
}

#[test]
fn merchant_resolution_end_to_end() {
    let db = Database::in_memory().unwrap();
    let account = db.upsert_account(USER, "Checking").unwrap();

    let swiggy = db
        .create_mapping(USER, &mapping("Swiggy", &["SWIGGY*"], Some(7)))
        .unwrap();
    db.create_mapping(USER, &mapping("Netflix", &["NETFLIX*"], Some(9)))
        .unwrap();

    let t1 = insert_tx(&db, account, "2024-01-05", "UPI/SWIGGY ORDER 12345", -450.0);
    let t2 = insert_tx(&db, account, "2024-01-06", "NETFLIX.COM*4521890", -649.0);
    // Misspelled beyond the fuzzy floor, stays unresolved
    let t3 = insert_tx(&db, account, "2024-01-07", "SWIGGI FOOD DEL", -380.0);

    let resolver = MerchantResolver::new(&db);
    let resolved = resolver.resolve_all(USER).unwrap();
    assert_eq!(resolved, 2);

    let tx = db.get_transaction(USER, t1).unwrap().unwrap();
    assert_eq!(tx.merchant_name.as_deref(), Some("Swiggy"));
    assert_eq!(tx.category_id, Some(7));

    let tx = db.get_transaction(USER, t2).unwrap().unwrap();
    assert_eq!(tx.merchant_name.as_deref(), Some("Netflix"));

    let tx = db.get_transaction(USER, t3).unwrap().unwrap();
    assert!(tx.merchant_name.is_none());

    // Usage counters move only on the mappings that matched
    let swiggy = db.get_mapping(USER, swiggy.id).unwrap().unwrap();
    assert_eq!(swiggy.usage_count, 1);

    // The leftover shows up as an unmapped merchant
    let unmapped = resolver.unmapped_merchants(USER, 10).unwrap();
    assert_eq!(unmapped.len(), 1);
    assert_eq!(unmapped[0].raw_name, "SWIGGI FOOD DEL");
    assert_eq!(unmapped[0].transaction_count, 1);
}

#[test]
fn apply_mapping_is_idempotent() {
    let db = Database::in_memory().unwrap();
    let account = db.upsert_account(USER, "Checking").unwrap();
    let m = db
        .create_mapping(USER, &mapping("Swiggy", &["SWIGGY*"], Some(7)))
        .unwrap();

    insert_tx(&db, account, "2024-01-05", "SWIGGY ORDER 1", -450.0);
    insert_tx(&db, account, "2024-01-06", "SWIGGY ORDER 2", -450.0);
    insert_tx(&db, account, "2024-01-07", "ZOMATO ORDER", -300.0);

    let resolver = MerchantResolver::new(&db);
    assert_eq!(resolver.apply_mapping(USER, m.id, true).unwrap(), 2);
    assert_eq!(resolver.apply_mapping(USER, m.id, true).unwrap(), 0);
}

#[test]
fn recurring_lifecycle_end_to_end() {
    let db = Database::in_memory().unwrap();
    let account = db.upsert_account(USER, "Checking").unwrap();
    db.create_mapping(USER, &mapping("Netflix", &["NETFLIX*"], None))
        .unwrap();
    db.create_mapping(USER, &mapping("Spotify", &["SPOTIFY*"], None))
        .unwrap();

    for d in ["2024-01-05", "2024-02-04", "2024-03-06"] {
        insert_tx(&db, account, d, "NETFLIX SUBSCRIPTION", -649.0);
    }
    for d in ["2024-01-10", "2024-02-09", "2024-03-11"] {
        insert_tx(&db, account, d, "SPOTIFY PREMIUM", -119.0);
    }

    MerchantResolver::new(&db).resolve_all(USER).unwrap();
    let detector = RecurringDetector::new(&db);

    // Both merchants surface as suggestions, higher amount first on
    // similar confidence
    let response = detector.detect(USER).unwrap();
    assert_eq!(response.suggestions.len(), 2);
    assert!(response.confirmed.is_empty());
    let netflix = response
        .suggestions
        .iter()
        .find(|s| s.merchant == "Netflix")
        .unwrap();
    assert_eq!(netflix.interval, RecurringInterval::Monthly);
    assert!(!netflix.is_variable_amount);
    assert_eq!(netflix.transaction_count, 3);

    // Confirm one, dismiss the other
    let rule = detector
        .confirm(USER, "Netflix", &RuleEdits::default())
        .unwrap();
    assert_eq!(rule.status, RecurringStatus::Confirmed);
    detector.dismiss(USER, "Spotify").unwrap();

    // Detection runs are stable: confirmed refreshes, dismissed stays
    // suppressed, nothing is re-suggested
    let response = detector.detect(USER).unwrap();
    assert!(response.suggestions.is_empty());
    assert_eq!(response.confirmed.len(), 1);
    assert_eq!(response.confirmed[0].merchant_name, "Netflix");
    assert_eq!(response.dismissed_count, 1);

    // A new charge refreshes the confirmed rule's observations
    insert_tx(&db, account, "2024-04-05", "NETFLIX SUBSCRIPTION", -649.0);
    MerchantResolver::new(&db).resolve_all(USER).unwrap();
    let response = detector.detect(USER).unwrap();
    assert_eq!(response.confirmed[0].transaction_count, 4);
    assert_eq!(
        response.confirmed[0].last_transaction_date,
        Some(date("2024-04-05"))
    );
}

#[test]
fn confirm_applies_edits() {
    let db = Database::in_memory().unwrap();
    let account = db.upsert_account(USER, "Checking").unwrap();
    db.create_mapping(USER, &mapping("Netflix", &["NETFLIX*"], None))
        .unwrap();
    for d in ["2024-01-05", "2024-02-04", "2024-03-06"] {
        insert_tx(&db, account, d, "NETFLIX SUBSCRIPTION", -649.0);
    }
    MerchantResolver::new(&db).resolve_all(USER).unwrap();

    let rule = RecurringDetector::new(&db)
        .confirm(
            USER,
            "Netflix",
            &RuleEdits {
                expected_amount: Some(799.0),
                category_id: Some(3),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(rule.expected_amount, 799.0);
    assert_eq!(rule.category_id, Some(3));
    assert_eq!(rule.interval, RecurringInterval::Monthly);
}

#[test]
fn detection_preserves_confirmed_edits() {
    let db = Database::in_memory().unwrap();
    let account = db.upsert_account(USER, "Checking").unwrap();
    db.create_mapping(USER, &mapping("Netflix", &["NETFLIX*"], None))
        .unwrap();
    for d in ["2024-01-05", "2024-02-04", "2024-03-06"] {
        insert_tx(&db, account, d, "NETFLIX SUBSCRIPTION", -649.0);
    }
    MerchantResolver::new(&db).resolve_all(USER).unwrap();

    let detector = RecurringDetector::new(&db);
    detector
        .confirm(
            USER,
            "Netflix",
            &RuleEdits {
                expected_amount: Some(799.0),
                ..Default::default()
            },
        )
        .unwrap();

    // A later run refreshes observations but never the edited amount
    insert_tx(&db, account, "2024-04-05", "NETFLIX SUBSCRIPTION", -649.0);
    MerchantResolver::new(&db).resolve_all(USER).unwrap();
    let response = detector.detect(USER).unwrap();

    assert_eq!(response.confirmed[0].expected_amount, 799.0);
    assert_eq!(response.confirmed[0].transaction_count, 4);
    assert_eq!(
        response.confirmed[0].last_transaction_date,
        Some(date("2024-04-05"))
    );
}

#[test]
fn dismissed_merchants_cannot_be_confirmed() {
    let db = Database::in_memory().unwrap();
    let account = db.upsert_account(USER, "Checking").unwrap();
    db.create_mapping(USER, &mapping("Spotify", &["SPOTIFY*"], None))
        .unwrap();
    for d in ["2024-01-10", "2024-02-09", "2024-03-11"] {
        insert_tx(&db, account, d, "SPOTIFY PREMIUM", -119.0);
    }
    MerchantResolver::new(&db).resolve_all(USER).unwrap();

    let detector = RecurringDetector::new(&db);
    let rule = detector.dismiss(USER, "Spotify").unwrap();

    let err = detector
        .confirm(USER, "Spotify", &RuleEdits::default())
        .unwrap_err();
    assert!(matches!(err, paisa_core::Error::Conflict(_)));

    // Deleting the dismissal makes the merchant confirmable again
    db.delete_rule(USER, rule.id).unwrap();
    let rule = detector
        .confirm(USER, "Spotify", &RuleEdits::default())
        .unwrap();
    assert_eq!(rule.status, RecurringStatus::Confirmed);
}

#[test]
fn manual_rule_without_history() {
    let db = Database::in_memory().unwrap();
    let detector = RecurringDetector::new(&db);

    let rule = detector
        .create_manual_rule(
            USER,
            &NewRecurringRule {
                merchant_name: "Rent".to_string(),
                expected_amount: 25000.0,
                interval: RecurringInterval::Monthly,
                next_expected_date: Some(date("2024-05-01")),
                category_id: None,
            },
        )
        .unwrap();
    assert_eq!(rule.status, RecurringStatus::Confirmed);
    assert_eq!(rule.confidence, 1.0);
    assert_eq!(rule.transaction_count, 0);
}

#[test]
fn transfer_detection_and_linking() {
    let db = Database::in_memory().unwrap();
    let checking = db.upsert_account(USER, "Checking").unwrap();
    let savings = db.upsert_account(USER, "Savings").unwrap();

    let debit = insert_tx(&db, checking, "2024-03-10", "NEFT TO SAVINGS", -20000.0);
    let credit = insert_tx(&db, savings, "2024-03-10", "NEFT FROM CHECKING", 20000.0);
    insert_tx(&db, checking, "2024-03-12", "SWIGGY ORDER", -450.0);

    let detector = TransferDetector::new(&db);
    let candidates = detector.detect_potential(USER).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].debit.transaction_id, debit);
    assert_eq!(candidates[0].credit.transaction_id, credit);
    assert!(candidates[0].confidence_score >= 0.9);

    let link = detector
        .link(USER, debit, credit, Some(candidates[0].confidence_score), true)
        .unwrap();
    assert_eq!(link.amount, 20000.0);

    // Both sides are re-typed and leave the candidate pool
    let tx = db.get_transaction(USER, debit).unwrap().unwrap();
    assert_eq!(tx.transaction_type, TransactionType::Transfer);
    assert!(detector.detect_potential(USER).unwrap().is_empty());

    // Unlink restores direction types and re-eligibility
    detector.unlink(USER, link.id).unwrap();
    let tx = db.get_transaction(USER, debit).unwrap().unwrap();
    assert_eq!(tx.transaction_type, TransactionType::Expense);
    let tx = db.get_transaction(USER, credit).unwrap().unwrap();
    assert_eq!(tx.transaction_type, TransactionType::Income);
    assert_eq!(detector.detect_potential(USER).unwrap().len(), 1);
}

#[test]
fn conflicting_credits_resolve_to_the_closer_date() {
    let db = Database::in_memory().unwrap();
    let checking = db.upsert_account(USER, "Checking").unwrap();
    let savings = db.upsert_account(USER, "Savings").unwrap();
    let wallet = db.upsert_account(USER, "Wallet").unwrap();

    let debit = insert_tx(&db, checking, "2024-03-10", "TRANSFER OUT", -5000.0);
    let same_day = insert_tx(&db, savings, "2024-03-10", "TRANSFER IN", 5000.0);
    insert_tx(&db, wallet, "2024-03-11", "TRANSFER IN", 5000.0);

    let candidates = TransferDetector::new(&db).detect_potential(USER).unwrap();
    // One debit can only anchor one pair; the same-day credit wins
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].debit.transaction_id, debit);
    assert_eq!(candidates[0].credit.transaction_id, same_day);
    assert_eq!(candidates[0].date_diff_days, 0);
}

#[test]
fn equal_candidates_resolve_to_the_lower_id() {
    let db = Database::in_memory().unwrap();
    let checking = db.upsert_account(USER, "Checking").unwrap();
    let savings = db.upsert_account(USER, "Savings").unwrap();
    let wallet = db.upsert_account(USER, "Wallet").unwrap();

    // Two credits indistinguishable by score and date gap; only the
    // transaction id separates them
    let debit = insert_tx(&db, checking, "2024-03-10", "TRANSFER OUT", -5000.0);
    let first = insert_tx(&db, savings, "2024-03-10", "TRANSFER IN", 5000.0);
    let second = insert_tx(&db, wallet, "2024-03-10", "TRANSFER IN", 5000.0);
    assert!(first < second);

    let candidates = TransferDetector::new(&db).detect_potential(USER).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].debit.transaction_id, debit);
    assert_eq!(candidates[0].credit.transaction_id, first);
}

#[test]
fn linked_transfers_stay_out_of_recurring_and_budgets() {
    let db = Database::in_memory().unwrap();
    let checking = db.upsert_account(USER, "Checking").unwrap();
    let savings = db.upsert_account(USER, "Savings").unwrap();
    db.upsert_budget(USER, 7, 10000.0).unwrap();

    // A monthly cadence of transfers must not become a suggestion or
    // count as category spend
    let detector = TransferDetector::new(&db);
    for (out_d, in_d) in [
        ("2024-01-05", "2024-01-05"),
        ("2024-02-04", "2024-02-04"),
        ("2024-03-06", "2024-03-06"),
    ] {
        let debit = insert_tx(&db, checking, out_d, "NEFT TO SAVINGS", -5000.0);
        let credit = insert_tx(&db, savings, in_d, "NEFT FROM CHECKING", 5000.0);
        db.set_transaction_merchant(debit, "Savings Sweep", Some(7))
            .unwrap();
        detector.link(USER, debit, credit, None, true).unwrap();
    }

    let response = RecurringDetector::new(&db).detect(USER).unwrap();
    assert!(response.suggestions.is_empty());

    let progress = budget_progress(&db, USER, 2024, 3).unwrap();
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].spent, 0.0);
}

#[test]
fn budget_progress_over_and_under() {
    let db = Database::in_memory().unwrap();
    let account = db.upsert_account(USER, "Checking").unwrap();
    db.upsert_budget(USER, 7, 1000.0).unwrap();
    db.upsert_budget(USER, 9, 2000.0).unwrap();

    for (d, amount) in [("2024-03-05", -700.0), ("2024-03-15", -500.0)] {
        let id = insert_tx(&db, account, d, "SWIGGY", amount);
        db.set_transaction_merchant(id, "Swiggy", Some(7)).unwrap();
        let conn_tx = db.get_transaction(USER, id).unwrap().unwrap();
        assert_eq!(conn_tx.category_id, Some(7));
    }
    // Spend outside the month is ignored
    let id = insert_tx(&db, account, "2024-04-01", "SWIGGY", -999.0);
    db.set_transaction_merchant(id, "Swiggy", Some(7)).unwrap();

    let progress = budget_progress(&db, USER, 2024, 3).unwrap();
    assert_eq!(progress.len(), 2);

    let food = progress.iter().find(|p| p.category_id == 7).unwrap();
    assert_eq!(food.spent, 1200.0);
    assert!(food.over_budget);
    assert_eq!(food.remaining, -200.0);

    let other = progress.iter().find(|p| p.category_id == 9).unwrap();
    assert_eq!(other.spent, 0.0);
    assert!(!other.over_budget);
}

#[test]
fn users_are_fully_isolated() {
    let db = Database::in_memory().unwrap();
    let a1 = db.upsert_account(1, "Checking").unwrap();
    let a2 = db.upsert_account(2, "Checking").unwrap();

    db.create_mapping(1, &mapping("Swiggy", &["SWIGGY*"], None))
        .unwrap();
    insert_tx(&db, a1, "2024-01-05", "SWIGGY ORDER", -450.0);

    db.insert_transaction(
        2,
        &NewTransaction {
            account_id: a2,
            date: date("2024-01-05"),
            description: "SWIGGY ORDER".to_string(),
            amount: -450.0,
            transaction_type: TransactionType::Expense,
            merchant_name: None,
            category_id: None,
        },
    )
    .unwrap();

    // User 2 has no mappings, so their identical transaction stays put
    assert_eq!(MerchantResolver::new(&db).resolve_all(1).unwrap(), 1);
    assert_eq!(MerchantResolver::new(&db).resolve_all(2).unwrap(), 0);
}
