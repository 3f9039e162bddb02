// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use serde_json::json;

use crate::ledger::{LedgerSession, QueryFilter};
use crate::utils::fmt_minor;

pub fn handle(session: &LedgerSession<'_>, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("transactions", sub)) => export_transactions(session, sub),
        _ => Ok(()),
    }
}

fn export_transactions(session: &LedgerSession<'_>, sub: &clap::ArgMatches) -> Result<()> {
    let fmt = sub.get_one::<String>("format").unwrap().to_lowercase();
    let out = sub.get_one::<String>("out").unwrap();

    let views = session.query(&QueryFilter::default())?;

    match fmt.as_str() {
        "csv" => {
            let mut wtr = csv::Writer::from_path(out)?;
            wtr.write_record(["id", "date", "amount", "currency", "category", "note"])?;
            for v in &views {
                wtr.write_record([
                    v.tx.id.as_str(),
                    &v.tx.date.to_string(),
                    &fmt_minor(v.tx.amount_minor),
                    v.tx.currency.as_str(),
                    v.category_name.as_str(),
                    v.tx.note.as_deref().unwrap_or(""),
                ])?;
            }
            wtr.flush()?;
        }
        "json" => {
            let items: Vec<_> = views
                .iter()
                .map(|v| {
                    json!({
                        "id": v.tx.id,
                        "date": v.tx.date.to_string(),
                        "amount": fmt_minor(v.tx.amount_minor),
                        "currency": v.tx.currency,
                        "category": v.category_name,
                        "note": v.tx.note,
                    })
                })
                .collect();
            std::fs::write(out, serde_json::to_string_pretty(&items)?)?;
        }
        _ => {
            eprintln!("Unknown format: {} (use csv|json)", fmt);
        }
    }
    println!("Exported {} transactions to {}", views.len(), out);
    Ok(())
}
