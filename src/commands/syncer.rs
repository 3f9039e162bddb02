// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::db;
use crate::ledger::Ledger;
use crate::models::Identity;
use crate::remote::HttpRemote;
use crate::sync::{self, CancelToken, SyncEngine};

pub fn handle(conn: Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("configure", sub)) => {
            let url = sub.get_one::<String>("url").unwrap();
            db::set_setting(&conn, "remote_url", url)?;
            println!("Remote set to {}", url);
            Ok(())
        }
        Some(("run", sub)) => run(conn, sub),
        Some(("status", _)) => status(&conn),
        _ => Ok(()),
    }
}

fn run(conn: Connection, sub: &clap::ArgMatches) -> Result<()> {
    let batch: usize = *sub.get_one::<usize>("batch").unwrap_or(&50);
    let url = db::get_setting(&conn, "remote_url")?
        .context("No remote configured; run `fintrack sync configure --url ...`")?;
    let user = db::current_user(&conn)?;
    let session_valid = db::get_setting(&conn, "session_valid")?
        .map(|v| v != "0")
        .unwrap_or(true);
    let identity = Identity::new(user, session_valid);

    let mut ledger = Ledger::open(conn, identity.user_id.clone());
    let remote = HttpRemote::new(url)?;
    let mut engine = SyncEngine::new(remote).with_batch_limit(batch);

    let report = engine.run_cycle(&mut ledger, &identity, &CancelToken::new())?;
    println!(
        "Sync: pushed {}, pulled {}, conflicts {}, deferred {} (cursor {})",
        report.pushed, report.pulled, report.conflicts, report.deferred, report.cursor
    );
    if let Some(err) = report.offline {
        println!("Remote unreachable, changes stay queued: {}", err);
    }
    let pending = ledger.pending_changes()?;
    if pending > 0 {
        println!("{} change(s) not yet synced", pending);
    }
    Ok(())
}

fn status(conn: &Connection) -> Result<()> {
    let user = db::current_user(conn)?;
    let info = sync::status(conn, &user)?;
    println!("Cursor: {}", info.cursor);
    println!("Pending changes: {}", info.pending);
    match info.last_synced_at {
        Some(at) => println!("Last synced: {}", at),
        None => println!("Last synced: never"),
    }
    Ok(())
}
