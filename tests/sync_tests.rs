// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{DateTime, TimeZone, Utc};

use fintrack::db;
use fintrack::error::LedgerError;
use fintrack::ledger::{Command, Ledger};
use fintrack::models::{CategoryKind, EntityKind, EntitySnapshot, Identity, Origin, Transaction};
use fintrack::remote::{self, SharedRemote};
use fintrack::sync::{CancelToken, SyncEngine, load_cursor, status};

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}

fn ledger() -> Ledger {
    Ledger::open(db::open_in_memory().unwrap(), "u1")
}

fn identity() -> Identity {
    Identity::new("u1", true)
}

fn engine(remote: &SharedRemote) -> SyncEngine<SharedRemote> {
    SyncEngine::new(remote.clone())
}

fn cycle(engine: &mut SyncEngine<SharedRemote>, ledger: &mut Ledger) -> fintrack::sync::SyncReport {
    engine
        .run_cycle(ledger, &identity(), &CancelToken::new())
        .unwrap()
}

fn add_category_at(ledger: &mut Ledger, name: &str, at: DateTime<Utc>) -> String {
    ledger
        .apply_at(
            Command::CreateCategory {
                name: name.into(),
                kind: CategoryKind::Expense,
                budget_minor: None,
            },
            at,
        )
        .unwrap()
        .id()
        .to_string()
}

fn add_tx_at(ledger: &mut Ledger, cat: &str, amount_minor: i64, at: DateTime<Utc>) -> String {
    ledger
        .apply_at(
            Command::CreateTransaction {
                date: chrono::NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
                amount_minor,
                currency: "USD".into(),
                category_id: cat.into(),
                note: None,
            },
            at,
        )
        .unwrap()
        .id()
        .to_string()
}

fn update_amount_at(ledger: &mut Ledger, id: &str, amount_minor: i64, at: DateTime<Utc>) {
    ledger
        .apply_at(
            Command::UpdateTransaction {
                id: id.into(),
                date: None,
                amount_minor: Some(amount_minor),
                currency: None,
                category_id: None,
                note: None,
            },
            at,
        )
        .unwrap();
}

fn read_tx(ledger: &Ledger, id: &str) -> Transaction {
    match ledger.read(EntityKind::Transaction, id).unwrap().unwrap() {
        EntitySnapshot::Transaction(t) => t,
        _ => panic!("expected transaction"),
    }
}

fn bucket(ledger: &Ledger, cat: &str, period: &str) -> (i64, i64) {
    fintrack::aggregate::read_bucket(ledger.conn(), "u1", cat, period).unwrap()
}

/// Two devices of the same user against one remote, with a seeded
/// synced transaction on both.
fn two_devices() -> (Ledger, Ledger, SharedRemote, String, String) {
    let remote = remote::shared();
    let mut a = ledger();
    let mut b = ledger();

    let cat = add_category_at(&mut a, "Groceries", ts(0));
    let tx = add_tx_at(&mut a, &cat, -2000, ts(1));
    cycle(&mut engine(&remote), &mut a);
    cycle(&mut engine(&remote), &mut b);
    assert_eq!(read_tx(&b, &tx).amount_minor, -2000);
    (a, b, remote, cat, tx)
}

#[test]
fn push_drains_journal_and_marks_synced() {
    let remote = remote::shared();
    let mut a = ledger();
    let cat = add_category_at(&mut a, "Groceries", ts(0));
    let tx = add_tx_at(&mut a, &cat, -2000, ts(1));
    assert_eq!(a.pending_changes().unwrap(), 2);

    let report = cycle(&mut engine(&remote), &mut a);
    assert_eq!(report.pushed, 2);
    assert_eq!(a.pending_changes().unwrap(), 0);
    assert_eq!(remote.borrow().doc_count(), 2);
    assert_eq!(read_tx(&a, &tx).origin, Origin::Synced);
}

#[test]
fn pull_replicates_to_second_device() {
    let (_a, b, _remote, cat, tx) = two_devices();
    let t = read_tx(&b, &tx);
    assert_eq!(t.amount_minor, -2000);
    assert_eq!(t.origin, Origin::Synced);
    assert_eq!(bucket(&b, &cat, "2024-05"), (-2000, 1));
    // The category replicated too, with its name resolvable.
    let cats = b.categories(false).unwrap();
    assert_eq!(cats.len(), 1);
    assert_eq!(cats[0].name, "Groceries");
}

#[test]
fn reapplying_remote_changes_is_a_noop() {
    let (mut a, mut b, remote, cat, tx) = two_devices();

    // A full re-run of both devices settles with nothing to do.
    let report = cycle(&mut engine(&remote), &mut b);
    assert_eq!(report.pulled, 0);
    assert_eq!(report.pushed, 0);
    let report = cycle(&mut engine(&remote), &mut a);
    assert_eq!(report.pulled, 0);
    assert_eq!(report.pushed, 0);

    // Replaying the exact stored snapshot leaves ledger and index alone.
    let before = bucket(&b, &cat, "2024-05");
    let snap = b.read(EntityKind::Transaction, &tx).unwrap().unwrap();
    assert!(!b.apply_remote(&snap).unwrap());
    assert_eq!(bucket(&b, &cat, "2024-05"), before);
}

// The worked example: a local offline edit loses to a remote edit with
// a later timestamp, and the aggregate reflects the winner exactly once.
#[test]
fn remote_edit_with_later_timestamp_wins() {
    let (mut a, mut b, remote, cat, tx) = two_devices();

    update_amount_at(&mut b, &tx, -2500, ts(200));
    cycle(&mut engine(&remote), &mut b);

    // Concurrent, earlier local edit on A while offline.
    update_amount_at(&mut a, &tx, -2100, ts(100));
    let report = cycle(&mut engine(&remote), &mut a);
    assert_eq!(report.conflicts, 1);

    let t = read_tx(&a, &tx);
    assert_eq!(t.amount_minor, -2500);
    assert!(!t.deleted);
    assert_eq!(bucket(&a, &cat, "2024-05"), (-2500, 1));
    // The losing intent is gone from the journal.
    assert_eq!(a.pending_changes().unwrap(), 0);

    // Both devices settle on the same snapshot.
    cycle(&mut engine(&remote), &mut b);
    let ta = read_tx(&a, &tx);
    let tb = read_tx(&b, &tx);
    assert_eq!(ta.amount_minor, tb.amount_minor);
    assert_eq!(ta.revision, tb.revision);
    assert_eq!(ta.deleted, tb.deleted);
}

#[test]
fn local_edit_with_later_timestamp_wins() {
    let (mut a, mut b, remote, cat, tx) = two_devices();

    update_amount_at(&mut b, &tx, -2500, ts(100));
    cycle(&mut engine(&remote), &mut b);

    update_amount_at(&mut a, &tx, -2100, ts(200));
    let report = cycle(&mut engine(&remote), &mut a);
    assert_eq!(report.conflicts, 1);
    assert_eq!(report.pushed, 1);

    cycle(&mut engine(&remote), &mut b);
    let ta = read_tx(&a, &tx);
    let tb = read_tx(&b, &tx);
    assert_eq!(ta.amount_minor, -2100);
    assert_eq!(tb.amount_minor, -2100);
    // Revisions stay monotonic on every replica.
    assert!(tb.revision > 2);
    assert_eq!(ta.revision, tb.revision);
    assert_eq!(bucket(&b, &cat, "2024-05"), (-2100, 1));
}

#[test]
fn delete_loses_to_later_concurrent_update() {
    let (mut a, mut b, remote, cat, tx) = two_devices();

    a.apply_at(Command::DeleteTransaction { id: tx.clone() }, ts(100))
        .unwrap();
    update_amount_at(&mut b, &tx, -2500, ts(200));
    cycle(&mut engine(&remote), &mut b);

    cycle(&mut engine(&remote), &mut a);
    let t = read_tx(&a, &tx);
    assert!(!t.deleted, "delete with an earlier timestamp must lose");
    assert_eq!(t.amount_minor, -2500);
    assert_eq!(bucket(&a, &cat, "2024-05"), (-2500, 1));
}

#[test]
fn strictly_later_delete_wins() {
    let (mut a, mut b, remote, cat, tx) = two_devices();

    update_amount_at(&mut b, &tx, -2500, ts(100));
    cycle(&mut engine(&remote), &mut b);

    a.apply_at(Command::DeleteTransaction { id: tx.clone() }, ts(200))
        .unwrap();
    cycle(&mut engine(&remote), &mut a);
    cycle(&mut engine(&remote), &mut b);

    assert!(read_tx(&a, &tx).deleted);
    assert!(read_tx(&b, &tx).deleted);
    assert_eq!(bucket(&b, &cat, "2024-05"), (0, 0));
    assert_eq!(bucket(&a, &cat, "2024-05"), (0, 0));
}

// A lagging pull cursor means the conflict surfaces on push instead:
// the conditional write is rejected and merged, never blindly applied.
#[test]
fn stale_push_is_rejected_and_merged() {
    let (mut a, mut b, remote, _cat, tx) = two_devices();

    // B lands two remote changes: an unrelated create, then the edit.
    let cat2 = add_category_at(&mut b, "Dining", ts(50));
    let _other = add_tx_at(&mut b, &cat2, -700, ts(60));
    update_amount_at(&mut b, &tx, -2500, ts(200));
    cycle(&mut engine(&remote), &mut b);

    // A edits concurrently (earlier) and pulls with a tiny batch, so
    // its cursor stops before B's edit and the push hits the conflict.
    update_amount_at(&mut a, &tx, -2100, ts(100));
    let mut eng = SyncEngine::new(remote.clone()).with_batch_limit(1);
    let report = eng.run_cycle(&mut a, &identity(), &CancelToken::new()).unwrap();
    assert_eq!(report.conflicts, 1);
    assert_eq!(read_tx(&a, &tx).amount_minor, -2500);
    assert_eq!(a.pending_changes().unwrap(), 0);

    // Draining the rest of the feed re-applies nothing.
    let report = cycle(&mut engine(&remote), &mut a);
    assert_eq!(report.conflicts, 0);
    assert_eq!(read_tx(&a, &tx).amount_minor, -2500);
}

#[test]
fn concurrent_category_rename_converges() {
    let remote = remote::shared();
    let mut a = ledger();
    let mut b = ledger();
    let cat = add_category_at(&mut a, "Food", ts(0));
    cycle(&mut engine(&remote), &mut a);
    cycle(&mut engine(&remote), &mut b);

    b.apply_at(
        Command::UpdateCategory {
            id: cat.clone(),
            name: Some("Dining".into()),
            budget_minor: None,
        },
        ts(200),
    )
    .unwrap();
    cycle(&mut engine(&remote), &mut b);

    a.apply_at(
        Command::UpdateCategory {
            id: cat.clone(),
            name: Some("Restaurants".into()),
            budget_minor: None,
        },
        ts(100),
    )
    .unwrap();
    cycle(&mut engine(&remote), &mut a);

    let names: Vec<String> = a.categories(false).unwrap().into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["Dining".to_string()]);
}

#[test]
fn offline_cycle_keeps_changes_queued() {
    let remote = remote::shared();
    let mut a = ledger();
    let cat = add_category_at(&mut a, "Groceries", ts(0));
    add_tx_at(&mut a, &cat, -2000, ts(1));

    remote.borrow_mut().set_offline(true);
    let report = cycle(&mut engine(&remote), &mut a);
    assert!(report.offline.is_some());
    assert_eq!(report.pushed, 0);
    assert_eq!(a.pending_changes().unwrap(), 2);

    // Local reads keep working offline; nothing was lost.
    assert_eq!(bucket(&a, &cat, "2024-05"), (-2000, 1));

    remote.borrow_mut().set_offline(false);
    let report = cycle(&mut engine(&remote), &mut a);
    assert_eq!(report.pushed, 2);
    assert_eq!(a.pending_changes().unwrap(), 0);
}

#[test]
fn cancelled_cycle_touches_nothing() {
    let remote = remote::shared();
    let mut a = ledger();
    let cat = add_category_at(&mut a, "Groceries", ts(0));
    add_tx_at(&mut a, &cat, -2000, ts(1));

    let token = CancelToken::new();
    token.cancel();
    let mut eng = engine(&remote);
    eng.run_cycle(&mut a, &identity(), &token).unwrap();

    assert_eq!(a.pending_changes().unwrap(), 2);
    assert_eq!(remote.borrow().doc_count(), 0);
    assert_eq!(load_cursor(a.conn(), "u1").unwrap(), 0);
}

#[test]
fn invalid_session_refuses_to_sync() {
    let remote = remote::shared();
    let mut a = ledger();
    let err = engine(&remote)
        .run_cycle(&mut a, &Identity::new("u1", false), &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, LedgerError::Invalid(_)));
}

#[test]
fn cursor_survives_restart_and_overlap_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.sqlite");
    let remote = remote::shared();

    {
        let conn = db::open_at(&path).unwrap();
        let mut a = Ledger::open(conn, "u1");
        let cat = add_category_at(&mut a, "Groceries", ts(0));
        add_tx_at(&mut a, &cat, -2000, ts(1));
        cycle(&mut engine(&remote), &mut a);
        // A second pass walks the cursor over this device's own echoes.
        let report = cycle(&mut engine(&remote), &mut a);
        assert!(report.cursor > 0);
    }

    // Restart: the persisted cursor resumes; nothing replays.
    let conn = db::open_at(&path).unwrap();
    let info = status(&conn, "u1").unwrap();
    assert!(info.cursor > 0);
    assert_eq!(info.pending, 0);

    let mut a = Ledger::open(conn, "u1");
    let report = cycle(&mut engine(&remote), &mut a);
    assert_eq!(report.pulled, 0);
    assert_eq!(report.pushed, 0);
    assert_eq!(report.cursor, info.cursor);
}

#[test]
fn shared_feed_ignores_other_users() {
    let remote = remote::shared();
    let mut other = Ledger::open(db::open_in_memory().unwrap(), "u2");
    let cat = add_category_at(&mut other, "Groceries", ts(0));
    add_tx_at(&mut other, &cat, -2000, ts(1));
    let mut eng = SyncEngine::new(remote.clone());
    eng.run_cycle(&mut other, &Identity::new("u2", true), &CancelToken::new())
        .unwrap();

    let mut a = ledger();
    let report = cycle(&mut engine(&remote), &mut a);
    assert_eq!(report.pulled, 0);
    assert!(a.categories(false).unwrap().is_empty());
    // The cursor still advances past foreign changes.
    assert!(report.cursor > 0);
}
