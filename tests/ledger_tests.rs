// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;

use fintrack::db;
use fintrack::error::LedgerError;
use fintrack::ledger::{Command, Ledger, QueryFilter};
use fintrack::models::{CategoryKind, EntityKind, EntitySnapshot, Origin};

fn ledger() -> Ledger {
    Ledger::open(db::open_in_memory().unwrap(), "u1")
}

fn add_category(ledger: &mut Ledger, name: &str) -> String {
    let snap = ledger
        .apply(Command::CreateCategory {
            name: name.into(),
            kind: CategoryKind::Expense,
            budget_minor: None,
        })
        .unwrap();
    snap.id().to_string()
}

fn add_tx(ledger: &mut Ledger, cat: &str, date: &str, amount_minor: i64) -> String {
    let snap = ledger
        .apply(Command::CreateTransaction {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            amount_minor,
            currency: "USD".into(),
            category_id: cat.into(),
            note: None,
        })
        .unwrap();
    snap.id().to_string()
}

#[test]
fn create_then_read_roundtrip() {
    let mut ledger = ledger();
    let cat = add_category(&mut ledger, "Groceries");
    let id = add_tx(&mut ledger, &cat, "2024-05-03", -2000);

    let snap = ledger.read(EntityKind::Transaction, &id).unwrap().unwrap();
    let EntitySnapshot::Transaction(t) = snap else {
        panic!("expected a transaction");
    };
    assert_eq!(t.amount_minor, -2000);
    assert_eq!(t.revision, 1);
    assert_eq!(t.origin, Origin::Local);
    assert!(!t.deleted);
}

#[test]
fn create_rejects_unknown_and_deleted_category() {
    let mut ledger = ledger();
    let err = ledger
        .apply(Command::CreateTransaction {
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            amount_minor: -100,
            currency: "USD".into(),
            category_id: "nope".into(),
            note: None,
        })
        .unwrap_err();
    assert!(matches!(err, LedgerError::Invalid(_)));

    let cat = add_category(&mut ledger, "Travel");
    ledger
        .apply(Command::DeleteCategory { id: cat.clone() })
        .unwrap();
    let err = ledger
        .apply(Command::CreateTransaction {
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            amount_minor: -100,
            currency: "USD".into(),
            category_id: cat,
            note: None,
        })
        .unwrap_err();
    assert!(matches!(err, LedgerError::Invalid(_)));
    // Invalid commands are never journaled: only the category's
    // (coalesced) create+delete entry is queued.
    assert_eq!(ledger.pending_changes().unwrap(), 1);
}

#[test]
fn bad_currency_is_invalid() {
    let mut ledger = ledger();
    let cat = add_category(&mut ledger, "Misc");
    let err = ledger
        .apply(Command::CreateTransaction {
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            amount_minor: -100,
            currency: "usd".into(),
            category_id: cat,
            note: None,
        })
        .unwrap_err();
    assert!(matches!(err, LedgerError::Invalid(_)));
}

#[test]
fn zero_amount_memo_is_allowed() {
    let mut ledger = ledger();
    let cat = add_category(&mut ledger, "Notes");
    let id = add_tx(&mut ledger, &cat, "2024-05-01", 0);
    assert!(ledger.read(EntityKind::Transaction, &id).unwrap().is_some());
}

#[test]
fn revision_increments_on_every_mutation() {
    let mut ledger = ledger();
    let cat = add_category(&mut ledger, "Groceries");
    let id = add_tx(&mut ledger, &cat, "2024-05-03", -2000);

    let snap = ledger
        .apply(Command::UpdateTransaction {
            id: id.clone(),
            date: None,
            amount_minor: Some(-2500),
            currency: None,
            category_id: None,
            note: Some("weekly".into()),
        })
        .unwrap();
    assert_eq!(snap.revision(), 2);

    let snap = ledger
        .apply(Command::DeleteTransaction { id: id.clone() })
        .unwrap();
    assert_eq!(snap.revision(), 3);
    assert!(snap.deleted());

    // The tombstone is still readable; mutating it is NotFound.
    assert!(ledger.read(EntityKind::Transaction, &id).unwrap().is_some());
    let err = ledger
        .apply(Command::DeleteTransaction { id })
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));
}

#[test]
fn update_unknown_id_is_not_found() {
    let mut ledger = ledger();
    let err = ledger
        .apply(Command::UpdateTransaction {
            id: "missing".into(),
            date: None,
            amount_minor: Some(1),
            currency: None,
            category_id: None,
            note: None,
        })
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));
}

#[test]
fn query_orders_newest_first_and_skips_tombstones() {
    let mut ledger = ledger();
    let cat = add_category(&mut ledger, "Groceries");
    add_tx(&mut ledger, &cat, "2024-05-01", -100);
    let mid = add_tx(&mut ledger, &cat, "2024-05-15", -200);
    add_tx(&mut ledger, &cat, "2024-05-30", -300);
    ledger
        .apply(Command::DeleteTransaction { id: mid })
        .unwrap();

    let views = ledger.query(&QueryFilter::default()).unwrap();
    let dates: Vec<String> = views.iter().map(|v| v.tx.date.to_string()).collect();
    assert_eq!(dates, vec!["2024-05-30", "2024-05-01"]);

    let all = ledger
        .query(&QueryFilter {
            include_deleted: true,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(all.len(), 3);
}

#[test]
fn deleted_category_still_resolves_in_queries() {
    let mut ledger = ledger();
    let cat = add_category(&mut ledger, "Groceries");
    add_tx(&mut ledger, &cat, "2024-05-03", -2000);
    ledger
        .apply(Command::DeleteCategory { id: cat.clone() })
        .unwrap();

    let views = ledger.query(&QueryFilter::default()).unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].category_name, "Groceries");
    // But new references to the tombstone are rejected.
    let err = ledger
        .apply(Command::CreateTransaction {
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            amount_minor: -500,
            currency: "USD".into(),
            category_id: cat,
            note: None,
        })
        .unwrap_err();
    assert!(matches!(err, LedgerError::Invalid(_)));
}

#[test]
fn note_pattern_filters_query() {
    let mut ledger = ledger();
    let cat = add_category(&mut ledger, "Dining");
    ledger
        .apply(Command::CreateTransaction {
            date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            amount_minor: -1200,
            currency: "USD".into(),
            category_id: cat.clone(),
            note: Some("coffee with Sam".into()),
        })
        .unwrap();
    ledger
        .apply(Command::CreateTransaction {
            date: NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
            amount_minor: -5400,
            currency: "USD".into(),
            category_id: cat,
            note: Some("team lunch".into()),
        })
        .unwrap();

    let views = ledger
        .query(&QueryFilter {
            note_pattern: Some("(?i)coffee".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].tx.amount_minor, -1200);

    let err = ledger
        .query(&QueryFilter {
            note_pattern: Some("(unclosed".into()),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, LedgerError::Invalid(_)));
}

#[test]
fn category_budget_can_be_set_and_cleared() {
    let mut ledger = ledger();
    let cat = add_category(&mut ledger, "Groceries");

    ledger
        .apply(Command::UpdateCategory {
            id: cat.clone(),
            name: None,
            budget_minor: Some(Some(25_000)),
        })
        .unwrap();
    let cats = ledger.categories(false).unwrap();
    assert_eq!(cats[0].budget_minor, Some(25_000));

    ledger
        .apply(Command::UpdateCategory {
            id: cat,
            name: None,
            budget_minor: Some(None),
        })
        .unwrap();
    let cats = ledger.categories(false).unwrap();
    assert_eq!(cats[0].budget_minor, None);
}
