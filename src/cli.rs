// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{Arg, ArgAction, Command, value_parser};

fn json_flags(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Print as pretty JSON"),
    )
    .arg(
        Arg::new("jsonl")
            .long("jsonl")
            .action(ArgAction::SetTrue)
            .help("Print as JSON lines"),
    )
}

pub fn build_cli() -> Command {
    Command::new("fintrack")
        .about("Local-first personal finance ledger with offline sync")
        .version(clap::crate_version!())
        .subcommand(
            Command::new("init")
                .about("Initialize the local ledger database")
                .arg(Arg::new("user").long("user").help("Identity to scope records to"))
                .arg(
                    Arg::new("base-currency")
                        .long("base-currency")
                        .help("Default currency for new transactions"),
                ),
        )
        .subcommand(
            Command::new("category")
                .about("Manage categories")
                .subcommand(
                    Command::new("add")
                        .about("Add a category")
                        .arg(Arg::new("name").required(true))
                        .arg(
                            Arg::new("kind")
                                .long("kind")
                                .value_parser(["income", "expense"])
                                .default_value("expense"),
                        )
                        .arg(
                            Arg::new("budget")
                                .long("budget")
                                .help("Monthly budget limit, e.g. 250.00"),
                        ),
                )
                .subcommand(json_flags(
                    Command::new("list").about("List categories").arg(
                        Arg::new("all")
                            .long("all")
                            .action(ArgAction::SetTrue)
                            .help("Include soft-deleted categories"),
                    ),
                ))
                .subcommand(
                    Command::new("set-budget")
                        .about("Set or clear a category's monthly budget")
                        .arg(Arg::new("id").required(true))
                        .arg(Arg::new("amount").long("amount").help("New limit, e.g. 250.00"))
                        .arg(
                            Arg::new("none")
                                .long("none")
                                .action(ArgAction::SetTrue)
                                .help("Remove the limit"),
                        ),
                )
                .subcommand(
                    Command::new("rm")
                        .about("Soft-delete a category (history keeps resolving it)")
                        .arg(Arg::new("id").required(true)),
                ),
        )
        .subcommand(
            Command::new("tx")
                .about("Record and browse transactions")
                .subcommand(
                    Command::new("add")
                        .about("Record a transaction (negative amount = expense)")
                        .arg(Arg::new("date").long("date").required(true).help("YYYY-MM-DD"))
                        .arg(
                            Arg::new("amount")
                                .long("amount")
                                .required(true)
                                .allow_hyphen_values(true)
                                .help("Signed decimal amount, e.g. -20.00"),
                        )
                        .arg(Arg::new("category").long("category").required(true).help("Category id"))
                        .arg(Arg::new("note").long("note"))
                        .arg(Arg::new("currency").long("currency").help("Defaults to the base currency")),
                )
                .subcommand(json_flags(
                    Command::new("list")
                        .about("List transactions, newest first")
                        .arg(Arg::new("month").long("month").help("YYYY-MM"))
                        .arg(Arg::new("category").long("category").help("Category id"))
                        .arg(
                            Arg::new("limit")
                                .long("limit")
                                .value_parser(value_parser!(usize)),
                        )
                        .arg(
                            Arg::new("deleted")
                                .long("deleted")
                                .action(ArgAction::SetTrue)
                                .help("Include tombstoned entries"),
                        )
                        .arg(
                            Arg::new("note-pattern")
                                .long("note-pattern")
                                .help("Regex matched against notes"),
                        ),
                ))
                .subcommand(
                    Command::new("edit")
                        .about("Edit a transaction")
                        .arg(Arg::new("id").required(true))
                        .arg(Arg::new("date").long("date"))
                        .arg(
                            Arg::new("amount")
                                .long("amount")
                                .allow_hyphen_values(true),
                        )
                        .arg(Arg::new("category").long("category"))
                        .arg(Arg::new("note").long("note").help("Empty string clears the note"))
                        .arg(Arg::new("currency").long("currency")),
                )
                .subcommand(
                    Command::new("rm")
                        .about("Delete a transaction (kept as a tombstone for sync)")
                        .arg(Arg::new("id").required(true)),
                ),
        )
        .subcommand(
            Command::new("report")
                .about("Aggregated views")
                .subcommand(json_flags(
                    Command::new("cashflow")
                        .about("Monthly income vs expense")
                        .arg(
                            Arg::new("months")
                                .long("months")
                                .value_parser(value_parser!(usize))
                                .default_value("12"),
                        ),
                ))
                .subcommand(json_flags(
                    Command::new("spend-by-category")
                        .about("Per-category totals for one month")
                        .arg(Arg::new("month").long("month").required(true).help("YYYY-MM")),
                ))
                .subcommand(json_flags(
                    Command::new("budget")
                        .about("Budget limits vs actuals for one month")
                        .arg(Arg::new("month").long("month").required(true).help("YYYY-MM")),
                )),
        )
        .subcommand(
            Command::new("export").about("Export data").subcommand(
                Command::new("transactions")
                    .about("Export transactions")
                    .arg(
                        Arg::new("format")
                            .long("format")
                            .value_parser(["csv", "json"])
                            .default_value("csv"),
                    )
                    .arg(Arg::new("out").long("out").required(true)),
            ),
        )
        .subcommand(
            Command::new("sync")
                .about("Replicate the ledger against the configured remote")
                .subcommand(
                    Command::new("configure")
                        .about("Set the remote endpoint")
                        .arg(Arg::new("url").long("url").required(true)),
                )
                .subcommand(
                    Command::new("run").about("Run one sync cycle").arg(
                        Arg::new("batch")
                            .long("batch")
                            .value_parser(value_parser!(usize))
                            .default_value("50"),
                    ),
                )
                .subcommand(Command::new("status").about("Cursor and pending changes")),
        )
        .subcommand(
            Command::new("lock")
                .about("App lock preference")
                .subcommand(
                    Command::new("enable").about("Require verification").arg(
                        Arg::new("timeout-secs")
                            .long("timeout-secs")
                            .value_parser(value_parser!(i64))
                            .default_value("120"),
                    ),
                )
                .subcommand(Command::new("disable").about("Disable the lock"))
                .subcommand(Command::new("status").about("Show the lock preference")),
        )
        .subcommand(
            Command::new("doctor")
                .about("Check aggregate integrity against the ledger")
                .arg(
                    Arg::new("repair")
                        .long("repair")
                        .action(ArgAction::SetTrue)
                        .help("Rebuild aggregates when drift is found"),
                ),
        )
}
