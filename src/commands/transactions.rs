// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use serde::Serialize;

use crate::ledger::{Command, LedgerSession, QueryFilter};
use crate::models::EntitySnapshot;
use crate::utils::{
    fmt_minor, get_base_currency, maybe_print_json, normalize_currency, parse_amount_minor,
    parse_date, parse_month, pretty_table,
};

pub fn handle(session: &mut LedgerSession<'_>, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(session, sub)?,
        Some(("list", sub)) => list(session, sub)?,
        Some(("edit", sub)) => edit(session, sub)?,
        Some(("rm", sub)) => rm(session, sub)?,
        _ => {}
    }
    Ok(())
}

fn add(session: &mut LedgerSession<'_>, sub: &clap::ArgMatches) -> Result<()> {
    let date = parse_date(sub.get_one::<String>("date").unwrap())?;
    let amount_minor = parse_amount_minor(sub.get_one::<String>("amount").unwrap())?;
    let category_id = sub.get_one::<String>("category").unwrap().clone();
    let note = sub.get_one::<String>("note").cloned();
    let currency = match sub.get_one::<String>("currency") {
        Some(c) => normalize_currency(c)?,
        None => get_base_currency(session.conn()?)?,
    };

    let snap = session.apply(Command::CreateTransaction {
        date,
        amount_minor,
        currency,
        category_id,
        note,
    })?;
    if let EntitySnapshot::Transaction(t) = snap {
        println!(
            "Recorded {} {} on {} (id {})",
            fmt_minor(t.amount_minor),
            t.currency,
            t.date,
            t.id
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct TxRow {
    id: String,
    date: String,
    amount: String,
    currency: String,
    category: String,
    note: String,
    synced: bool,
}

fn list(session: &LedgerSession<'_>, sub: &clap::ArgMatches) -> Result<()> {
    let filter = QueryFilter {
        month: sub
            .get_one::<String>("month")
            .map(|m| parse_month(m))
            .transpose()?,
        category_id: sub.get_one::<String>("category").cloned(),
        include_deleted: sub.get_flag("deleted"),
        note_pattern: sub.get_one::<String>("note-pattern").cloned(),
        limit: sub.get_one::<usize>("limit").copied(),
    };
    let views = session.query(&filter)?;

    let rows: Vec<TxRow> = views
        .iter()
        .map(|v| TxRow {
            id: v.tx.id.clone(),
            date: v.tx.date.to_string(),
            amount: fmt_minor(v.tx.amount_minor),
            currency: v.tx.currency.clone(),
            category: v.category_name.clone(),
            note: v.tx.note.clone().unwrap_or_default(),
            synced: v.tx.origin == crate::models::Origin::Synced,
        })
        .collect();

    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &rows)? {
        let table_rows: Vec<Vec<String>> = rows
            .iter()
            .map(|r| {
                vec![
                    r.date.clone(),
                    r.amount.clone(),
                    r.currency.clone(),
                    r.category.clone(),
                    r.note.clone(),
                    if r.synced { String::new() } else { "pending".into() },
                    r.id.clone(),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(
                &["Date", "Amount", "CCY", "Category", "Note", "Sync", "ID"],
                table_rows,
            )
        );
    }
    Ok(())
}

fn edit(session: &mut LedgerSession<'_>, sub: &clap::ArgMatches) -> Result<()> {
    let id = sub.get_one::<String>("id").unwrap().clone();
    let date = sub
        .get_one::<String>("date")
        .map(|d| parse_date(d))
        .transpose()?;
    let amount_minor = sub
        .get_one::<String>("amount")
        .map(|a| parse_amount_minor(a))
        .transpose()?;
    let currency = sub
        .get_one::<String>("currency")
        .map(|c| normalize_currency(c))
        .transpose()?;
    let category_id = sub.get_one::<String>("category").cloned();
    let note = sub.get_one::<String>("note").cloned();

    session.apply(Command::UpdateTransaction {
        id: id.clone(),
        date,
        amount_minor,
        currency,
        category_id,
        note,
    })?;
    println!("Updated {}", id);
    Ok(())
}

fn rm(session: &mut LedgerSession<'_>, sub: &clap::ArgMatches) -> Result<()> {
    let id = sub.get_one::<String>("id").unwrap().clone();
    session.apply(Command::DeleteTransaction { id: id.clone() })?;
    println!("Deleted {} (kept as tombstone until synced)", id);
    Ok(())
}
