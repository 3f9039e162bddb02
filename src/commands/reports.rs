// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use std::collections::BTreeMap;

use crate::aggregate;
use crate::ledger::LedgerSession;
use crate::utils::{fmt_minor, maybe_print_json, parse_month, pretty_table};

pub fn handle(session: &LedgerSession<'_>, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("cashflow", sub)) => cashflow(session, sub)?,
        Some(("spend-by-category", sub)) => spend_by_category(session, sub)?,
        Some(("budget", sub)) => budget(session, sub)?,
        _ => {}
    }
    Ok(())
}

fn cashflow(session: &LedgerSession<'_>, sub: &clap::ArgMatches) -> Result<()> {
    let months: usize = *sub.get_one::<usize>("months").unwrap_or(&12);
    let conn = session.conn()?;

    let mut stmt = conn.prepare(
        "SELECT substr(date,1,7) AS month,
                SUM(CASE WHEN amount_minor > 0 THEN amount_minor ELSE 0 END),
                SUM(CASE WHEN amount_minor < 0 THEN -amount_minor ELSE 0 END)
         FROM transactions WHERE user_id=?1 AND deleted=0
         GROUP BY month ORDER BY month",
    )?;
    let rows = stmt.query_map([session.user_id()], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, i64>(1)?,
            r.get::<_, i64>(2)?,
        ))
    })?;

    let mut map = BTreeMap::new();
    for row in rows {
        let (m, inc, exp) = row?;
        map.insert(m, (inc, exp));
    }
    let data: Vec<Vec<String>> = map
        .iter()
        .rev()
        .take(months)
        .map(|(m, (inc, exp))| vec![m.clone(), fmt_minor(*inc), fmt_minor(*exp)])
        .collect();

    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        println!("{}", pretty_table(&["Month", "Income", "Expense"], data));
    }
    Ok(())
}

fn spend_by_category(session: &LedgerSession<'_>, sub: &clap::ArgMatches) -> Result<()> {
    let month = parse_month(sub.get_one::<String>("month").unwrap())?;
    let conn = session.conn()?;

    // Served straight from the aggregate index.
    let buckets = aggregate::read_period(conn, session.user_id(), &month)?;
    let names: BTreeMap<String, String> = session
        .categories(true)?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();

    let mut items: Vec<_> = buckets
        .into_iter()
        .filter(|b| b.count > 0 || b.sum_minor != 0)
        .collect();
    items.sort_by_key(|b| b.sum_minor);

    let data: Vec<Vec<String>> = items
        .iter()
        .map(|b| {
            vec![
                names
                    .get(&b.category_id)
                    .cloned()
                    .unwrap_or_else(|| b.category_id.clone()),
                fmt_minor(b.sum_minor),
                b.count.to_string(),
            ]
        })
        .collect();

    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        println!("{}", pretty_table(&["Category", "Total", "Count"], data));
    }
    Ok(())
}

fn budget(session: &LedgerSession<'_>, sub: &clap::ArgMatches) -> Result<()> {
    let month = parse_month(sub.get_one::<String>("month").unwrap())?;
    let conn = session.conn()?;

    let mut data = Vec::new();
    for cat in session.categories(false)? {
        let Some(limit) = cat.budget_minor else {
            continue;
        };
        let (sum, _count) = aggregate::read_bucket(conn, session.user_id(), &cat.id, &month)?;
        // Budgets track spending; expenses are negative in the ledger.
        let spent = -sum;
        let status = if spent > limit { "OVER" } else { "ok" };
        data.push(vec![
            cat.name.clone(),
            fmt_minor(limit),
            fmt_minor(spent),
            status.to_string(),
        ]);
    }

    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        println!(
            "{}",
            pretty_table(&["Category", "Budget", "Spent", "Status"], data)
        );
    }
    Ok(())
}
