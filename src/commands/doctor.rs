// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use rusqlite::Connection;

use crate::aggregate;
use crate::utils::{fmt_minor, pretty_table};

/// Integrity check: compare stored aggregate buckets against a fresh
/// recomputation. Drift is repairable, never fatal.
pub fn handle(conn: &Connection, user_id: &str, repair: bool) -> Result<()> {
    let drifts = aggregate::verify(conn, user_id)?;
    if drifts.is_empty() {
        println!("doctor: aggregates match the ledger");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = drifts
        .iter()
        .map(|d| {
            vec![
                d.category_id.clone(),
                d.period.clone(),
                fmt_minor(d.stored_sum),
                fmt_minor(d.actual_sum),
                format!("{}/{}", d.stored_count, d.actual_count),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(
            &["Category", "Period", "Stored", "Actual", "Count s/a"],
            rows,
        )
    );

    if repair {
        aggregate::rebuild_all(conn, user_id)?;
        let after = aggregate::verify(conn, user_id)?;
        if after.is_empty() {
            println!("doctor: rebuilt {} drifting bucket(s)", drifts.len());
        } else {
            println!("doctor: {} bucket(s) still drifting after rebuild", after.len());
        }
    } else {
        println!("doctor: run with --repair to rebuild aggregates");
    }
    Ok(())
}
