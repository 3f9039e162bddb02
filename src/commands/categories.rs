// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;

use crate::ledger::{Command, LedgerSession};
use crate::models::{CategoryKind, EntitySnapshot};
use crate::utils::{fmt_minor, maybe_print_json, parse_amount_minor, pretty_table};

pub fn handle(session: &mut LedgerSession<'_>, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(session, sub)?,
        Some(("list", sub)) => list(session, sub)?,
        Some(("set-budget", sub)) => set_budget(session, sub)?,
        Some(("rm", sub)) => rm(session, sub)?,
        _ => {}
    }
    Ok(())
}

fn add(session: &mut LedgerSession<'_>, sub: &clap::ArgMatches) -> Result<()> {
    let name = sub.get_one::<String>("name").unwrap().clone();
    let kind = CategoryKind::parse(sub.get_one::<String>("kind").unwrap())
        .unwrap_or(CategoryKind::Expense);
    let budget_minor = sub
        .get_one::<String>("budget")
        .map(|s| parse_amount_minor(s))
        .transpose()?;

    let snap = session.apply(Command::CreateCategory {
        name,
        kind,
        budget_minor,
    })?;
    if let EntitySnapshot::Category(c) = snap {
        println!("Added category '{}' ({}) id {}", c.name, c.kind.as_str(), c.id);
    }
    Ok(())
}

fn list(session: &LedgerSession<'_>, sub: &clap::ArgMatches) -> Result<()> {
    let include_deleted = sub.get_flag("all");
    let cats = session.categories(include_deleted)?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &cats)? {
        let rows: Vec<Vec<String>> = cats
            .iter()
            .map(|c| {
                vec![
                    c.id.clone(),
                    c.name.clone(),
                    c.kind.as_str().to_string(),
                    c.budget_minor.map(fmt_minor).unwrap_or_default(),
                    if c.deleted { "yes".into() } else { String::new() },
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(&["ID", "Name", "Kind", "Budget", "Deleted"], rows)
        );
    }
    Ok(())
}

fn set_budget(session: &mut LedgerSession<'_>, sub: &clap::ArgMatches) -> Result<()> {
    let id = sub.get_one::<String>("id").unwrap().clone();
    let budget_minor = if sub.get_flag("none") {
        Some(None)
    } else if let Some(s) = sub.get_one::<String>("amount") {
        Some(Some(parse_amount_minor(s)?))
    } else {
        anyhow::bail!("Pass --amount or --none");
    };

    session.apply(Command::UpdateCategory {
        id: id.clone(),
        name: None,
        budget_minor,
    })?;
    println!("Updated budget for {}", id);
    Ok(())
}

fn rm(session: &mut LedgerSession<'_>, sub: &clap::ArgMatches) -> Result<()> {
    let id = sub.get_one::<String>("id").unwrap().clone();
    session.apply(Command::DeleteCategory { id: id.clone() })?;
    println!("Removed category {} (kept as tombstone)", id);
    Ok(())
}
