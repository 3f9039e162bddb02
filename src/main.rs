// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;

use fintrack::ledger::{Ledger, LedgerSession};
use fintrack::lock::AppLockGate;
use fintrack::{cli, commands, db, utils};

fn main() -> Result<()> {
    let cli = cli::build_cli();
    let matches = cli.get_matches();

    let conn = db::open_or_init()?;

    match matches.subcommand() {
        Some(("init", sub)) => {
            if let Some(user) = sub.get_one::<String>("user") {
                db::set_current_user(&conn, user)?;
            }
            if let Some(ccy) = sub.get_one::<String>("base-currency") {
                utils::set_base_currency(&conn, ccy)?;
            }
            println!("Database initialized at {}", db::db_path()?.display());
        }
        Some(("lock", sub)) => commands::lockctl::handle(&conn, sub)?,
        // Background reconciliation bypasses the app lock gate.
        Some(("sync", sub)) => commands::syncer::handle(conn, sub)?,
        Some(("doctor", sub)) => {
            let user = db::current_user(&conn)?;
            commands::doctor::handle(&conn, &user, sub.get_flag("repair"))?;
        }
        Some((name @ ("category" | "tx" | "report" | "export"), sub)) => {
            let user = db::current_user(&conn)?;
            let mut gate = AppLockGate::from_settings(&conn)?;
            if !gate.is_unlocked() {
                commands::lockctl::unlock_interactive(&mut gate)?;
            }
            let mut ledger = Ledger::open(conn, user);
            let mut session = LedgerSession::new(&mut ledger, &gate);
            match name {
                "category" => commands::categories::handle(&mut session, sub)?,
                "tx" => commands::transactions::handle(&mut session, sub)?,
                "report" => commands::reports::handle(&session, sub)?,
                "export" => commands::exporter::handle(&session, sub)?,
                _ => unreachable!(),
            }
        }
        _ => {
            cli::build_cli().print_help()?;
            println!();
        }
    }
    Ok(())
}
