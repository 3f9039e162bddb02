// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Append-only intent log for local mutations awaiting replication.
//!
//! One row per entity: a newer mutation for an entity that already has
//! a pending row replaces op and snapshot in place, keeping the row's
//! sequence slot and its `base_revision` token. Ordering relative to
//! other entities is preserved; intra-entity history collapses because
//! the remote only ever needs the final state.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::LedgerError;
use crate::models::{EntityKind, EntitySnapshot, JournalEntry, JournalOp, SyncStatus};

pub fn enqueue(
    conn: &Connection,
    op: JournalOp,
    snapshot: &EntitySnapshot,
    base_revision: i64,
) -> Result<(), LedgerError> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT op FROM journal WHERE entity_id=?1",
            params![snapshot.id()],
            |r| r.get(0),
        )
        .optional()?;

    let body = serde_json::to_string(snapshot)?;
    match existing {
        Some(prev_op) => {
            // Create stays Create until the remote has seen the entity;
            // a Delete supersedes whatever intent was queued.
            let merged = match (JournalOp::parse(&prev_op), op) {
                (_, JournalOp::Delete) => JournalOp::Delete,
                (Some(JournalOp::Create), _) => JournalOp::Create,
                _ => JournalOp::Update,
            };
            conn.execute(
                "UPDATE journal SET op=?1, snapshot=?2, revision=?3, status='pending',
                        attempts=0, not_before=NULL, last_error=NULL
                 WHERE entity_id=?4",
                params![merged.as_str(), body, snapshot.revision(), snapshot.id()],
            )?;
        }
        None => {
            conn.execute(
                "INSERT INTO journal(user_id, entity_kind, entity_id, op, snapshot,
                                     revision, base_revision, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending')",
                params![
                    snapshot.user_id(),
                    snapshot.kind().as_str(),
                    snapshot.id(),
                    op.as_str(),
                    body,
                    snapshot.revision(),
                    base_revision
                ],
            )?;
        }
    }
    Ok(())
}

struct RawRow {
    seq: i64,
    entity_kind: String,
    entity_id: String,
    op: String,
    snapshot: String,
    base_revision: i64,
    status: String,
    attempts: i64,
    not_before: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

fn read_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        seq: r.get(0)?,
        entity_kind: r.get(1)?,
        entity_id: r.get(2)?,
        op: r.get(3)?,
        snapshot: r.get(4)?,
        base_revision: r.get(5)?,
        status: r.get(6)?,
        attempts: r.get(7)?,
        not_before: r.get(8)?,
        last_error: r.get(9)?,
    })
}

fn decode(raw: RawRow) -> Result<JournalEntry, LedgerError> {
    Ok(JournalEntry {
        seq: raw.seq,
        entity_kind: EntityKind::parse(&raw.entity_kind).unwrap_or(EntityKind::Transaction),
        entity_id: raw.entity_id,
        op: JournalOp::parse(&raw.op).unwrap_or(JournalOp::Update),
        snapshot: serde_json::from_str(&raw.snapshot)?,
        base_revision: raw.base_revision,
        status: SyncStatus::parse(&raw.status),
        attempts: raw.attempts,
        not_before: raw.not_before,
        last_error: raw.last_error,
    })
}

const ENTRY_COLS: &str =
    "seq, entity_kind, entity_id, op, snapshot, base_revision, status, attempts, not_before, last_error";

/// Entries eligible for push right now, in local sequence order.
/// Failed entries come back once their backoff deadline has passed.
pub fn peek_batch(
    conn: &Connection,
    user_id: &str,
    max_n: usize,
    now: DateTime<Utc>,
) -> Result<Vec<JournalEntry>, LedgerError> {
    let sql = format!(
        "SELECT {ENTRY_COLS} FROM journal
         WHERE user_id=?1 AND status IN ('pending','failed')
           AND (not_before IS NULL OR not_before <= ?2)
         ORDER BY seq LIMIT ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id, now, max_n as i64], read_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(decode(row?)?);
    }
    Ok(out)
}

pub fn get(conn: &Connection, entity_id: &str) -> Result<Option<JournalEntry>, LedgerError> {
    let sql = format!("SELECT {ENTRY_COLS} FROM journal WHERE entity_id=?1");
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row(params![entity_id], read_row).optional()?;
    match row {
        Some(raw) => Ok(Some(decode(raw)?)),
        None => Ok(None),
    }
}

pub fn mark_in_flight(conn: &Connection, entity_id: &str) -> Result<(), LedgerError> {
    conn.execute(
        "UPDATE journal SET status='in_flight' WHERE entity_id=?1",
        params![entity_id],
    )?;
    Ok(())
}

/// Remote confirmed the entity at `revision`. The row is destroyed
/// unless a newer local mutation raced in after the push started.
pub fn mark_acknowledged(
    conn: &Connection,
    entity_id: &str,
    revision: i64,
) -> Result<(), LedgerError> {
    conn.execute(
        "DELETE FROM journal WHERE entity_id=?1 AND revision <= ?2",
        params![entity_id, revision],
    )?;
    Ok(())
}

pub fn mark_failed(
    conn: &Connection,
    entity_id: &str,
    reason: &str,
    not_before: DateTime<Utc>,
) -> Result<(), LedgerError> {
    conn.execute(
        "UPDATE journal SET status='failed', attempts=attempts+1,
                not_before=?1, last_error=?2
         WHERE entity_id=?3",
        params![not_before, reason, entity_id],
    )?;
    Ok(())
}

/// Drop a losing local change after conflict resolution.
pub fn discard(conn: &Connection, entity_id: &str) -> Result<(), LedgerError> {
    conn.execute("DELETE FROM journal WHERE entity_id=?1", params![entity_id])?;
    Ok(())
}

/// Advance the concurrency token after observing a newer remote
/// revision that lost the merge: the next push must carry it.
pub fn set_base_revision(
    conn: &Connection,
    entity_id: &str,
    base_revision: i64,
) -> Result<(), LedgerError> {
    conn.execute(
        "UPDATE journal SET base_revision=?1 WHERE entity_id=?2",
        params![base_revision, entity_id],
    )?;
    Ok(())
}

/// Rewrite the queued snapshot's revision (e.g. raised above a remote
/// revision the local side just out-merged).
pub fn set_snapshot_revision(
    conn: &Connection,
    entity_id: &str,
    revision: i64,
) -> Result<(), LedgerError> {
    let body: Option<String> = conn
        .query_row(
            "SELECT snapshot FROM journal WHERE entity_id=?1",
            params![entity_id],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(body) = body {
        let mut snap: EntitySnapshot = serde_json::from_str(&body)?;
        snap.set_revision(revision);
        conn.execute(
            "UPDATE journal SET snapshot=?1, revision=?2 WHERE entity_id=?3",
            params![serde_json::to_string(&snap)?, revision, entity_id],
        )?;
    }
    Ok(())
}

pub fn pending_count(conn: &Connection, user_id: &str) -> Result<i64, LedgerError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM journal WHERE user_id=?1",
        params![user_id],
        |r| r.get(0),
    )?;
    Ok(n)
}
