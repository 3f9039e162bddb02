// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Incrementally maintained per-category/per-month sums and counts.
//!
//! Invariant: a bucket equals the sum over all non-deleted transactions
//! whose category and period match. `rebuild_all` from the full history
//! must produce exactly the incrementally maintained state; `verify`
//! checks that equivalence and reports drift.

use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeMap;

use crate::error::LedgerError;
use crate::models::{Bucket, Transaction};

/// Apply the signed delta for one transaction change. Old and new may
/// land in different buckets when the category or date moved.
pub fn on_transaction_changed(
    conn: &Connection,
    old: Option<&Transaction>,
    new: Option<&Transaction>,
) -> Result<(), LedgerError> {
    if let Some(t) = old {
        if !t.deleted {
            bump(conn, t, -t.amount_minor, -1)?;
        }
    }
    if let Some(t) = new {
        if !t.deleted {
            bump(conn, t, t.amount_minor, 1)?;
        }
    }
    Ok(())
}

fn bump(conn: &Connection, t: &Transaction, dsum: i64, dcount: i64) -> Result<(), LedgerError> {
    conn.execute(
        "INSERT INTO buckets(user_id, category_id, period, sum_minor, count)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id, category_id, period)
         DO UPDATE SET sum_minor = sum_minor + excluded.sum_minor,
                       count = count + excluded.count",
        params![t.user_id, t.category_id, t.period(), dsum, dcount],
    )?;
    Ok(())
}

/// (sum, count) for one bucket; (0, 0) when it was never touched.
pub fn read_bucket(
    conn: &Connection,
    user_id: &str,
    category_id: &str,
    period: &str,
) -> Result<(i64, i64), LedgerError> {
    let row: Option<(i64, i64)> = conn
        .query_row(
            "SELECT sum_minor, count FROM buckets
             WHERE user_id=?1 AND category_id=?2 AND period=?3",
            params![user_id, category_id, period],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    Ok(row.unwrap_or((0, 0)))
}

/// All buckets for one period, for charting and budget reports.
pub fn read_period(conn: &Connection, user_id: &str, period: &str) -> Result<Vec<Bucket>, LedgerError> {
    let mut stmt = conn.prepare(
        "SELECT category_id, period, sum_minor, count FROM buckets
         WHERE user_id=?1 AND period=?2 ORDER BY category_id",
    )?;
    let rows = stmt.query_map(params![user_id, period], |r| {
        Ok(Bucket {
            category_id: r.get(0)?,
            period: r.get(1)?,
            sum_minor: r.get(2)?,
            count: r.get(3)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn recompute(
    conn: &Connection,
    user_id: &str,
) -> Result<BTreeMap<(String, String), (i64, i64)>, LedgerError> {
    let mut stmt = conn.prepare(
        "SELECT category_id, substr(date,1,7) AS period,
                SUM(amount_minor), COUNT(*)
         FROM transactions WHERE user_id=?1 AND deleted=0
         GROUP BY category_id, period",
    )?;
    let rows = stmt.query_map(params![user_id], |r| {
        Ok((
            (r.get::<_, String>(0)?, r.get::<_, String>(1)?),
            (r.get::<_, i64>(2)?, r.get::<_, i64>(3)?),
        ))
    })?;
    let mut map = BTreeMap::new();
    for row in rows {
        let (key, val) = row?;
        map.insert(key, val);
    }
    Ok(map)
}

/// Full recomputation for integrity repair. Buckets with no remaining
/// contributions are zeroed, not dropped.
pub fn rebuild_all(conn: &Connection, user_id: &str) -> Result<(), LedgerError> {
    conn.execute(
        "UPDATE buckets SET sum_minor=0, count=0 WHERE user_id=?1",
        params![user_id],
    )?;
    for ((category_id, period), (sum, count)) in recompute(conn, user_id)? {
        conn.execute(
            "INSERT INTO buckets(user_id, category_id, period, sum_minor, count)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id, category_id, period)
             DO UPDATE SET sum_minor=excluded.sum_minor, count=excluded.count",
            params![user_id, category_id, period, sum, count],
        )?;
    }
    Ok(())
}

/// One bucket whose stored values disagree with the transaction table.
#[derive(Debug, Clone)]
pub struct Drift {
    pub category_id: String,
    pub period: String,
    pub stored_sum: i64,
    pub actual_sum: i64,
    pub stored_count: i64,
    pub actual_count: i64,
}

/// Compare stored buckets against a fresh recomputation. An empty
/// result means the incremental maintenance is intact.
pub fn verify(conn: &Connection, user_id: &str) -> Result<Vec<Drift>, LedgerError> {
    let actual = recompute(conn, user_id)?;
    let mut stmt = conn.prepare(
        "SELECT category_id, period, sum_minor, count FROM buckets WHERE user_id=?1",
    )?;
    let rows = stmt.query_map(params![user_id], |r| {
        Ok((
            (r.get::<_, String>(0)?, r.get::<_, String>(1)?),
            (r.get::<_, i64>(2)?, r.get::<_, i64>(3)?),
        ))
    })?;
    let mut stored = BTreeMap::new();
    for row in rows {
        let (key, val) = row?;
        stored.insert(key, val);
    }

    let mut drifts = Vec::new();
    let mut keys: Vec<_> = stored.keys().cloned().collect();
    for key in actual.keys() {
        if !stored.contains_key(key) {
            keys.push(key.clone());
        }
    }
    keys.sort();
    keys.dedup();
    for key in keys {
        let (stored_sum, stored_count) = stored.get(&key).copied().unwrap_or((0, 0));
        let (actual_sum, actual_count) = actual.get(&key).copied().unwrap_or((0, 0));
        if stored_sum != actual_sum || stored_count != actual_count {
            drifts.push(Drift {
                category_id: key.0,
                period: key.1,
                stored_sum,
                actual_sum,
                stored_count,
                actual_count,
            });
        }
    }
    Ok(drifts)
}
