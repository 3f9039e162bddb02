// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use rusqlite::Connection;
use std::io::Write;

use crate::lock::{self, AppLockGate, Verdict, VerificationGate};

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("enable", sub)) => {
            let secs: i64 = *sub.get_one::<i64>("timeout-secs").unwrap_or(&120);
            lock::set_lock_enabled(conn, true)?;
            lock::set_lock_timeout(conn, secs)?;
            println!("App lock enabled ({}s inactivity timeout)", secs);
        }
        Some(("disable", _)) => {
            lock::set_lock_enabled(conn, false)?;
            println!("App lock disabled");
        }
        Some(("status", _)) => {
            let enabled = lock::lock_enabled(conn)?;
            println!("App lock: {}", if enabled { "enabled" } else { "disabled" });
        }
        _ => {}
    }
    Ok(())
}

/// Stand-in for the platform verification prompt: asks on the terminal.
pub struct StdinVerifier;

impl VerificationGate for StdinVerifier {
    fn verify(&mut self) -> Verdict {
        print!("Ledger is locked. Unlock? [y/N] ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => Verdict::Cancelled,
            Ok(_) => {
                if line.trim().eq_ignore_ascii_case("y") {
                    Verdict::Allow
                } else {
                    Verdict::Deny
                }
            }
        }
    }
}

/// Run the unlock round trip before a UI command touches the ledger.
pub fn unlock_interactive(gate: &mut AppLockGate) -> Result<()> {
    if gate.unlock_via(&mut StdinVerifier) {
        Ok(())
    } else {
        anyhow::bail!("verification failed; the ledger stays locked")
    }
}
