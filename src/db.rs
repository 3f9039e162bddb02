// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use rusqlite::{Connection, OptionalExtension, params};
use std::fs;
use std::path::PathBuf;

static APP: Lazy<(&str, &str, &str)> =
    Lazy::new(|| ("com.alphavelocity", "Fintrack", "fintrack"));

pub fn db_path() -> Result<PathBuf> {
    let proj = ProjectDirs::from(APP.0, APP.1, APP.2)
        .context("Could not determine platform-specific data dir")?;
    let data_dir = proj.data_dir();
    fs::create_dir_all(data_dir).context("Failed to create data dir")?;
    Ok(data_dir.join("fintrack.sqlite"))
}

pub fn open_or_init() -> Result<Connection> {
    open_at(&db_path()?)
}

/// Open (or create) a ledger database at an explicit path.
pub fn open_at(path: &std::path::Path) -> Result<Connection> {
    let mut conn =
        Connection::open(path).with_context(|| format!("Open DB at {}", path.display()))?;
    init_schema(&mut conn)?;
    Ok(conn)
}

/// In-memory database with the full schema. Used by the test suites and
/// by tooling that wants a scratch ledger.
pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("Open in-memory DB")?;
    init_schema(&mut conn)?;
    Ok(conn)
}

fn init_schema(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS settings(
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS categories(
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        name TEXT NOT NULL,
        kind TEXT NOT NULL CHECK(kind IN ('income','expense')),
        budget_minor INTEGER,
        revision INTEGER NOT NULL,
        deleted INTEGER NOT NULL DEFAULT 0,
        modified_at TEXT NOT NULL,
        origin TEXT NOT NULL DEFAULT 'local'
    );
    CREATE INDEX IF NOT EXISTS idx_categories_user ON categories(user_id);

    -- No FK on category_id: pulled transactions may arrive before their
    -- category, and soft-deleted categories must keep resolving.
    -- Referential checks happen in the ledger write path instead.
    CREATE TABLE IF NOT EXISTS transactions(
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        date TEXT NOT NULL,
        amount_minor INTEGER NOT NULL,
        currency TEXT NOT NULL,
        category_id TEXT NOT NULL,
        note TEXT,
        revision INTEGER NOT NULL,
        deleted INTEGER NOT NULL DEFAULT 0,
        modified_at TEXT NOT NULL,
        origin TEXT NOT NULL DEFAULT 'local'
    );
    CREATE INDEX IF NOT EXISTS idx_transactions_user_date ON transactions(user_id, date);
    CREATE INDEX IF NOT EXISTS idx_transactions_category ON transactions(category_id);

    -- One row per entity: newer local mutations coalesce in place,
    -- keeping the original sequence slot.
    CREATE TABLE IF NOT EXISTS journal(
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        entity_kind TEXT NOT NULL,
        entity_id TEXT NOT NULL UNIQUE,
        op TEXT NOT NULL,
        snapshot TEXT NOT NULL,
        revision INTEGER NOT NULL,
        base_revision INTEGER NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        attempts INTEGER NOT NULL DEFAULT 0,
        not_before TEXT,
        last_error TEXT
    );

    CREATE TABLE IF NOT EXISTS buckets(
        user_id TEXT NOT NULL,
        category_id TEXT NOT NULL,
        period TEXT NOT NULL,
        sum_minor INTEGER NOT NULL DEFAULT 0,
        count INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY(user_id, category_id, period)
    );

    CREATE TABLE IF NOT EXISTS sync_cursors(
        user_id TEXT PRIMARY KEY,
        cursor INTEGER NOT NULL DEFAULT 0,
        last_synced_at TEXT
    );
    "#,
    )?;
    Ok(())
}

pub fn get_setting(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT value FROM settings WHERE key=?1", params![key], |r| {
        r.get(0)
    })
    .optional()
}

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![key, value],
    )?;
    Ok(())
}

/// The user everything local is scoped to. Assigned by the external
/// identity provider; defaults to "local" for a signed-out ledger.
pub fn current_user(conn: &Connection) -> rusqlite::Result<String> {
    Ok(get_setting(conn, "user_id")?.unwrap_or_else(|| "local".to_string()))
}

pub fn set_current_user(conn: &Connection, user_id: &str) -> rusqlite::Result<()> {
    set_setting(conn, "user_id", user_id)
}
