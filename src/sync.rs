// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Bidirectional reconciliation between the local ledger and the
//! remote collection.
//!
//! The engine is a pure background consumer: local reads and writes
//! never wait on it. One `run_cycle` pulls remote changes since the
//! persisted cursor, then drains the journal with conditional writes.
//! Conflicts resolve by last-writer-wins on the modification timestamp,
//! tie-broken by revision and then in the remote's favor; a delete only
//! beats a concurrent live update when its timestamp is strictly later.
//! Reapplying any remote change is a no-op, so a crash mid-batch is
//! safe to resume.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{LedgerError, RemoteError};
use crate::journal;
use crate::ledger::Ledger;
use crate::models::{EntitySnapshot, Identity, JournalEntry};
use crate::remote::RemoteCollection;

/// Cooperative cancellation. Checked between batch items, never
/// mid-item, so an interrupted cycle leaves every entry either fully
/// processed or untouched.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

const BACKOFF_BASE_SECS: i64 = 5;
const BACKOFF_CAP_SECS: i64 = 900;

/// Exponential backoff for failed journal entries, capped at 15min.
pub fn backoff_delay(attempts: i64) -> Duration {
    let exp = attempts.clamp(0, 8) as u32;
    Duration::seconds((BACKOFF_BASE_SECS << exp).min(BACKOFF_CAP_SECS))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Local,
    Remote,
}

/// Deterministic merge: every replica evaluating the same pair picks
/// the same winner, which is what makes the ledger converge.
pub fn choose_winner(local: &EntitySnapshot, remote: &EntitySnapshot) -> Side {
    // A delete competing with a live update wins only when strictly
    // later; deletion is a normal mutation, not a veto.
    match (local.deleted(), remote.deleted()) {
        (true, false) => {
            return if local.modified_at() > remote.modified_at() {
                Side::Local
            } else {
                Side::Remote
            };
        }
        (false, true) => {
            return if remote.modified_at() > local.modified_at() {
                Side::Remote
            } else {
                Side::Local
            };
        }
        _ => {}
    }
    match local.modified_at().cmp(&remote.modified_at()) {
        std::cmp::Ordering::Greater => Side::Local,
        std::cmp::Ordering::Less => Side::Remote,
        std::cmp::Ordering::Equal => {
            if local.revision() > remote.revision() {
                Side::Local
            } else {
                Side::Remote
            }
        }
    }
}

/// What one cycle accomplished. `offline` carries the transport error
/// when the remote was unreachable; pending entries simply wait.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub pushed: usize,
    pub pulled: usize,
    pub conflicts: usize,
    pub deferred: usize,
    pub cursor: i64,
    pub offline: Option<String>,
}

pub fn load_cursor(conn: &Connection, user_id: &str) -> Result<i64, LedgerError> {
    let cur: Option<i64> = conn
        .query_row(
            "SELECT cursor FROM sync_cursors WHERE user_id=?1",
            params![user_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(cur.unwrap_or(0))
}

fn save_cursor(conn: &Connection, user_id: &str, cursor: i64) -> Result<(), LedgerError> {
    conn.execute(
        "INSERT INTO sync_cursors(user_id, cursor, last_synced_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(user_id) DO UPDATE SET
            cursor=excluded.cursor, last_synced_at=excluded.last_synced_at",
        params![user_id, cursor, Utc::now()],
    )?;
    Ok(())
}

#[derive(Debug)]
pub struct SyncStatusInfo {
    pub cursor: i64,
    pub pending: i64,
    pub last_synced_at: Option<DateTime<Utc>>,
}

pub fn status(conn: &Connection, user_id: &str) -> Result<SyncStatusInfo, LedgerError> {
    let row: Option<(i64, Option<DateTime<Utc>>)> = conn
        .query_row(
            "SELECT cursor, last_synced_at FROM sync_cursors WHERE user_id=?1",
            params![user_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let (cursor, last_synced_at) = row.unwrap_or((0, None));
    Ok(SyncStatusInfo {
        cursor,
        pending: journal::pending_count(conn, user_id)?,
        last_synced_at,
    })
}

pub struct SyncEngine<R: RemoteCollection> {
    remote: R,
    batch_limit: usize,
}

impl<R: RemoteCollection> SyncEngine<R> {
    pub fn new(remote: R) -> Self {
        Self {
            remote,
            batch_limit: 50,
        }
    }

    pub fn with_batch_limit(mut self, batch_limit: usize) -> Self {
        self.batch_limit = batch_limit.max(1);
        self
    }

    /// One reconciliation pass: pull, then push. Requires a valid
    /// session; the local ledger stays fully usable without one.
    pub fn run_cycle(
        &mut self,
        ledger: &mut Ledger,
        identity: &Identity,
        cancel: &CancelToken,
    ) -> Result<SyncReport, LedgerError> {
        if !identity.session_valid {
            return Err(LedgerError::Invalid(
                "session is not valid; sign in to sync".into(),
            ));
        }

        let mut report = SyncReport {
            cursor: load_cursor(ledger.conn(), ledger.user_id())?,
            ..Default::default()
        };

        // Entries stranded in flight by a crash roll back to pending.
        ledger.conn().execute(
            "UPDATE journal SET status='pending' WHERE user_id=?1 AND status='in_flight'",
            params![ledger.user_id()],
        )?;

        self.pull(ledger, &mut report, cancel)?;
        if !cancel.is_cancelled() && report.offline.is_none() {
            self.push(ledger, &mut report, cancel)?;
        }
        Ok(report)
    }

    fn pull(
        &mut self,
        ledger: &mut Ledger,
        report: &mut SyncReport,
        cancel: &CancelToken,
    ) -> Result<(), LedgerError> {
        let user = ledger.user_id().to_string();
        let changes = match self.remote.watch_since(report.cursor) {
            Ok(c) => c,
            Err(RemoteError::Conflict { .. }) => Vec::new(),
            Err(RemoteError::Unavailable(e)) => {
                report.offline = Some(e);
                return Ok(());
            }
        };

        for change in changes.into_iter().take(self.batch_limit) {
            if cancel.is_cancelled() {
                break;
            }
            // Ignore other users' documents on a shared feed.
            if change.snapshot.user_id() != user {
                save_cursor(ledger.conn(), &user, change.seq)?;
                report.cursor = change.seq;
                continue;
            }
            match journal::get(ledger.conn(), change.snapshot.id())? {
                None => {
                    if ledger.apply_remote(&change.snapshot)? {
                        report.pulled += 1;
                    }
                }
                Some(entry) => {
                    // A change at or below the entry's token is one we
                    // already observed (often our own push echoing back
                    // on the feed); only newer remote state conflicts.
                    if change.snapshot.revision() > entry.base_revision {
                        report.conflicts += 1;
                        self.resolve_pull_conflict(ledger, &entry, &change.snapshot, report)?;
                    }
                }
            }
            save_cursor(ledger.conn(), &user, change.seq)?;
            report.cursor = change.seq;
        }
        Ok(())
    }

    fn resolve_pull_conflict(
        &mut self,
        ledger: &mut Ledger,
        entry: &JournalEntry,
        remote_snap: &EntitySnapshot,
        report: &mut SyncReport,
    ) -> Result<(), LedgerError> {
        match choose_winner(&entry.snapshot, remote_snap) {
            Side::Remote => {
                // The queued local change loses and is discarded; the
                // remote state lands even if the local revision raced
                // ahead of it.
                journal::discard(ledger.conn(), &entry.entity_id)?;
                ledger.resolve_to_remote(remote_snap)?;
                report.pulled += 1;
            }
            Side::Local => {
                // Keep the local intent, but the next push must carry
                // the remote revision we just observed, and the queued
                // snapshot must outrank it.
                journal::set_base_revision(
                    ledger.conn(),
                    &entry.entity_id,
                    remote_snap.revision(),
                )?;
                if entry.snapshot.revision() <= remote_snap.revision() {
                    ledger.raise_revision(
                        entry.entity_kind,
                        &entry.entity_id,
                        remote_snap.revision() + 1,
                    )?;
                }
            }
        }
        Ok(())
    }

    fn push(
        &mut self,
        ledger: &mut Ledger,
        report: &mut SyncReport,
        cancel: &CancelToken,
    ) -> Result<(), LedgerError> {
        let user = ledger.user_id().to_string();
        let now = Utc::now();
        let entries = journal::peek_batch(ledger.conn(), &user, self.batch_limit, now)?;

        for entry in entries {
            if cancel.is_cancelled() {
                break;
            }
            journal::mark_in_flight(ledger.conn(), &entry.entity_id)?;
            let expected = (entry.base_revision > 0).then_some(entry.base_revision);
            match self
                .remote
                .put(&entry.entity_id, &entry.snapshot, expected)
            {
                Ok(revision) => {
                    journal::mark_acknowledged(ledger.conn(), &entry.entity_id, revision)?;
                    ledger.mark_synced(entry.entity_kind, &entry.entity_id, revision)?;
                    report.pushed += 1;
                }
                Err(RemoteError::Conflict { .. }) => {
                    report.conflicts += 1;
                    self.resolve_push_conflict(ledger, entry, report)?;
                }
                Err(RemoteError::Unavailable(e)) => {
                    journal::mark_failed(
                        ledger.conn(),
                        &entry.entity_id,
                        &e,
                        now + backoff_delay(entry.attempts),
                    )?;
                    report.deferred += 1;
                    report.offline = Some(e);
                    break;
                }
            }
        }
        Ok(())
    }

    /// A concurrent remote write beat this entry's token. Fetch the
    /// winner candidate and merge instead of blindly overwriting.
    fn resolve_push_conflict(
        &mut self,
        ledger: &mut Ledger,
        mut entry: JournalEntry,
        report: &mut SyncReport,
    ) -> Result<(), LedgerError> {
        let now = Utc::now();
        let doc = match self.remote.get(&entry.entity_id) {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                // Conflict against a document we cannot fetch; retry
                // later rather than guessing.
                journal::mark_failed(
                    ledger.conn(),
                    &entry.entity_id,
                    "conflict but document missing",
                    now + backoff_delay(entry.attempts),
                )?;
                report.deferred += 1;
                return Ok(());
            }
            Err(e) => {
                journal::mark_failed(
                    ledger.conn(),
                    &entry.entity_id,
                    &e.to_string(),
                    now + backoff_delay(entry.attempts),
                )?;
                report.deferred += 1;
                return Ok(());
            }
        };

        match choose_winner(&entry.snapshot, &doc.snapshot) {
            Side::Remote => {
                journal::discard(ledger.conn(), &entry.entity_id)?;
                ledger.resolve_to_remote(&doc.snapshot)?;
                report.pulled += 1;
            }
            Side::Local => {
                // Re-push on top of the observed revision, raised so
                // every replica sees revisions move forward.
                let new_rev = entry.snapshot.revision().max(doc.revision + 1);
                if new_rev != entry.snapshot.revision() {
                    ledger.raise_revision(entry.entity_kind, &entry.entity_id, new_rev)?;
                    entry.snapshot.set_revision(new_rev);
                }
                journal::set_base_revision(ledger.conn(), &entry.entity_id, doc.revision)?;
                match self
                    .remote
                    .put(&entry.entity_id, &entry.snapshot, Some(doc.revision))
                {
                    Ok(revision) => {
                        journal::mark_acknowledged(ledger.conn(), &entry.entity_id, revision)?;
                        ledger.mark_synced(entry.entity_kind, &entry.entity_id, revision)?;
                        report.pushed += 1;
                    }
                    Err(e) => {
                        // Lost another race or went offline; back off
                        // and re-resolve next cycle.
                        journal::mark_failed(
                            ledger.conn(),
                            &entry.entity_id,
                            &e.to_string(),
                            now + backoff_delay(entry.attempts),
                        )?;
                        report.deferred += 1;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Origin, Transaction};
    use chrono::TimeZone;

    fn snap(revision: i64, modified_secs: i64, deleted: bool) -> EntitySnapshot {
        EntitySnapshot::Transaction(Transaction {
            id: "t1".into(),
            user_id: "u".into(),
            date: chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            amount_minor: -2000,
            currency: "USD".into(),
            category_id: "c1".into(),
            note: None,
            revision,
            deleted,
            modified_at: Utc.timestamp_opt(modified_secs, 0).unwrap(),
            origin: Origin::Local,
        })
    }

    #[test]
    fn later_writer_wins() {
        assert_eq!(choose_winner(&snap(2, 100, false), &snap(5, 50, false)), Side::Local);
        assert_eq!(choose_winner(&snap(9, 50, false), &snap(2, 100, false)), Side::Remote);
    }

    #[test]
    fn timestamp_tie_breaks_on_revision_then_remote() {
        assert_eq!(choose_winner(&snap(3, 100, false), &snap(2, 100, false)), Side::Local);
        assert_eq!(choose_winner(&snap(2, 100, false), &snap(3, 100, false)), Side::Remote);
        assert_eq!(choose_winner(&snap(2, 100, false), &snap(2, 100, false)), Side::Remote);
    }

    #[test]
    fn delete_needs_strictly_later_timestamp() {
        // Local delete vs remote live update at the same instant:
        // the update survives.
        assert_eq!(choose_winner(&snap(2, 100, true), &snap(2, 100, false)), Side::Remote);
        assert_eq!(choose_winner(&snap(2, 101, true), &snap(2, 100, false)), Side::Local);
        // And symmetrically for a remote delete.
        assert_eq!(choose_winner(&snap(2, 100, false), &snap(2, 100, true)), Side::Local);
        assert_eq!(choose_winner(&snap(2, 100, false), &snap(2, 101, true)), Side::Remote);
    }

    #[test]
    fn both_deleted_falls_back_to_last_writer() {
        assert_eq!(choose_winner(&snap(2, 200, true), &snap(2, 100, true)), Side::Local);
        assert_eq!(choose_winner(&snap(2, 100, true), &snap(2, 100, true)), Side::Remote);
    }

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_delay(0), Duration::seconds(5));
        assert_eq!(backoff_delay(1), Duration::seconds(10));
        assert_eq!(backoff_delay(4), Duration::seconds(80));
        assert_eq!(backoff_delay(20), Duration::seconds(900));
    }
}
