// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! The ledger store: single source of truth for the UI.
//!
//! A successful `apply` persists the new entity state with a bumped
//! revision, queues a journal entry for replication, and folds the
//! aggregate delta, all in one SQLite transaction, so callers observe a
//! consistent view the moment the call returns. Reads never touch the
//! network.

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::aggregate;
use crate::error::LedgerError;
use crate::journal;
use crate::lock::AppLockGate;
use crate::models::{
    Category, CategoryKind, EntityKind, EntitySnapshot, JournalOp, Origin, Transaction,
    TransactionView,
};
use crate::utils::currency_ok;

/// A UI-initiated mutation. Update fields set to `None` keep the stored
/// value; an empty note or `Some(None)` budget clears the field.
#[derive(Debug, Clone)]
pub enum Command {
    CreateTransaction {
        date: NaiveDate,
        amount_minor: i64,
        currency: String,
        category_id: String,
        note: Option<String>,
    },
    UpdateTransaction {
        id: String,
        date: Option<NaiveDate>,
        amount_minor: Option<i64>,
        currency: Option<String>,
        category_id: Option<String>,
        note: Option<String>,
    },
    DeleteTransaction {
        id: String,
    },
    CreateCategory {
        name: String,
        kind: CategoryKind,
        budget_minor: Option<i64>,
    },
    UpdateCategory {
        id: String,
        name: Option<String>,
        budget_minor: Option<Option<i64>>,
    },
    DeleteCategory {
        id: String,
    },
}

/// Filter for `query`. Results are ordered by date descending, then id,
/// and exclude tombstones unless asked for.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub month: Option<String>,
    pub category_id: Option<String>,
    pub include_deleted: bool,
    pub note_pattern: Option<String>,
    pub limit: Option<usize>,
}

pub struct Ledger {
    conn: Connection,
    user_id: String,
}

impl Ledger {
    pub fn open(conn: Connection, user_id: impl Into<String>) -> Self {
        Self {
            conn,
            user_id: user_id.into(),
        }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Journal rows still awaiting remote acknowledgment: the
    /// "not yet synced" indicator.
    pub fn pending_changes(&self) -> Result<i64, LedgerError> {
        journal::pending_count(&self.conn, &self.user_id)
    }

    pub fn apply(&mut self, cmd: Command) -> Result<EntitySnapshot, LedgerError> {
        self.apply_at(cmd, Utc::now())
    }

    /// `apply` with an explicit mutation timestamp. Import flows and
    /// tests use this to control the conflict-resolution clock.
    pub fn apply_at(
        &mut self,
        cmd: Command,
        at: DateTime<Utc>,
    ) -> Result<EntitySnapshot, LedgerError> {
        let user = self.user_id.clone();
        let tx = self.conn.transaction()?;
        let snap = match cmd {
            Command::CreateTransaction {
                date,
                amount_minor,
                currency,
                category_id,
                note,
            } => create_transaction(&tx, &user, at, date, amount_minor, currency, category_id, note)?,
            Command::UpdateTransaction {
                id,
                date,
                amount_minor,
                currency,
                category_id,
                note,
            } => update_transaction(&tx, &user, at, &id, date, amount_minor, currency, category_id, note)?,
            Command::DeleteTransaction { id } => delete_transaction(&tx, &user, at, &id)?,
            Command::CreateCategory {
                name,
                kind,
                budget_minor,
            } => create_category(&tx, &user, at, name, kind, budget_minor)?,
            Command::UpdateCategory {
                id,
                name,
                budget_minor,
            } => update_category(&tx, &user, at, &id, name, budget_minor)?,
            Command::DeleteCategory { id } => delete_category(&tx, &user, at, &id)?,
        };
        tx.commit()?;
        Ok(snap)
    }

    /// Point lookup. Tombstoned entities come back with their deleted
    /// flag set; callers that only want live rows check it.
    pub fn read(&self, kind: EntityKind, id: &str) -> Result<Option<EntitySnapshot>, LedgerError> {
        match kind {
            EntityKind::Transaction => Ok(load_transaction(&self.conn, &self.user_id, id)?
                .map(EntitySnapshot::Transaction)),
            EntityKind::Category => {
                Ok(load_category(&self.conn, &self.user_id, id)?.map(EntitySnapshot::Category))
            }
        }
    }

    pub fn query(&self, filter: &QueryFilter) -> Result<Vec<TransactionView>, LedgerError> {
        let note_re = match &filter.note_pattern {
            Some(p) => Some(
                Regex::new(p)
                    .map_err(|e| LedgerError::Invalid(format!("bad note pattern '{p}': {e}")))?,
            ),
            None => None,
        };

        let mut sql = String::from(
            "SELECT t.id, t.user_id, t.date, t.amount_minor, t.currency, t.category_id,
                    t.note, t.revision, t.deleted, t.modified_at, t.origin,
                    c.name, c.kind
             FROM transactions t
             LEFT JOIN categories c ON t.category_id = c.id
             WHERE t.user_id = ?1",
        );
        let mut args: Vec<String> = vec![self.user_id.clone()];
        if !filter.include_deleted {
            sql.push_str(" AND t.deleted = 0");
        }
        if let Some(month) = &filter.month {
            args.push(month.clone());
            sql.push_str(&format!(" AND substr(t.date,1,7) = ?{}", args.len()));
        }
        if let Some(cat) = &filter.category_id {
            args.push(cat.clone());
            sql.push_str(&format!(" AND t.category_id = ?{}", args.len()));
        }
        sql.push_str(" ORDER BY t.date DESC, t.id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let params_ref: Vec<&dyn rusqlite::ToSql> =
            args.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
        let rows = stmt.query_map(rusqlite::params_from_iter(params_ref), |r| {
            Ok(TransactionView {
                tx: tx_from_row(r)?,
                category_name: r
                    .get::<_, Option<String>>(11)?
                    .unwrap_or_else(|| "(unknown)".to_string()),
                category_kind: r
                    .get::<_, Option<String>>(12)?
                    .and_then(|s| CategoryKind::parse(&s))
                    .unwrap_or(CategoryKind::Expense),
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            let view = row?;
            if let Some(re) = &note_re {
                let hay = view.tx.note.as_deref().unwrap_or("");
                if !re.is_match(hay) {
                    continue;
                }
            }
            out.push(view);
            if let Some(limit) = filter.limit {
                if out.len() >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }

    /// Live categories (or all, including tombstones) for pickers and
    /// reports.
    pub fn categories(&self, include_deleted: bool) -> Result<Vec<Category>, LedgerError> {
        let mut sql = String::from(
            "SELECT id, user_id, name, kind, budget_minor, revision, deleted, modified_at, origin
             FROM categories WHERE user_id = ?1",
        );
        if !include_deleted {
            sql.push_str(" AND deleted = 0");
        }
        sql.push_str(" ORDER BY name");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![self.user_id], cat_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Sync-engine entry point: fold one remote change into the store.
    /// Idempotent: a change whose revision is not newer than the local
    /// row is a no-op and returns false. Never journaled.
    pub fn apply_remote(&mut self, snapshot: &EntitySnapshot) -> Result<bool, LedgerError> {
        self.apply_remote_inner(snapshot, false)
    }

    /// Conflict-resolution landing: the remote side won the merge, so
    /// its snapshot replaces local state even when the discarded local
    /// revision had raced ahead of it.
    pub fn resolve_to_remote(&mut self, snapshot: &EntitySnapshot) -> Result<(), LedgerError> {
        self.apply_remote_inner(snapshot, true)?;
        Ok(())
    }

    fn apply_remote_inner(
        &mut self,
        snapshot: &EntitySnapshot,
        force: bool,
    ) -> Result<bool, LedgerError> {
        let user = self.user_id.clone();
        let tx = self.conn.transaction()?;
        let applied = match snapshot {
            EntitySnapshot::Transaction(incoming) => {
                let old = load_transaction(&tx, &user, &incoming.id)?;
                if !force && old.as_ref().is_some_and(|t| t.revision >= incoming.revision) {
                    false
                } else {
                    let mut row = incoming.clone();
                    row.origin = Origin::Synced;
                    upsert_transaction(&tx, &row)?;
                    aggregate::on_transaction_changed(&tx, old.as_ref(), Some(&row))?;
                    true
                }
            }
            EntitySnapshot::Category(incoming) => {
                let old = load_category(&tx, &user, &incoming.id)?;
                if !force && old.as_ref().is_some_and(|c| c.revision >= incoming.revision) {
                    false
                } else {
                    let mut row = incoming.clone();
                    row.origin = Origin::Synced;
                    upsert_category(&tx, &row)?;
                    true
                }
            }
        };
        tx.commit()?;
        Ok(applied)
    }

    /// Flip origin to Synced once the remote acknowledged exactly this
    /// revision. A newer local mutation keeps the row Local.
    pub fn mark_synced(
        &mut self,
        kind: EntityKind,
        id: &str,
        revision: i64,
    ) -> Result<(), LedgerError> {
        let table = match kind {
            EntityKind::Transaction => "transactions",
            EntityKind::Category => "categories",
        };
        self.conn.execute(
            &format!("UPDATE {table} SET origin='synced' WHERE id=?1 AND revision=?2"),
            params![id, revision],
        )?;
        Ok(())
    }

    /// Raise a row's revision above a remote revision it just
    /// out-merged, so the monotonic revision guarantee holds on every
    /// replica. Amounts are untouched, so no aggregate delta.
    pub fn raise_revision(
        &mut self,
        kind: EntityKind,
        id: &str,
        revision: i64,
    ) -> Result<(), LedgerError> {
        let table = match kind {
            EntityKind::Transaction => "transactions",
            EntityKind::Category => "categories",
        };
        self.conn.execute(
            &format!("UPDATE {table} SET revision=?1 WHERE id=?2 AND revision < ?1"),
            params![revision, id],
        )?;
        journal::set_snapshot_revision(&self.conn, id, revision)
    }
}

/// UI-facing handle: same contract as [`Ledger`], but every call checks
/// the app lock gate first. The sync engine holds the `Ledger` directly
/// and keeps reconciling while the screen is locked.
pub struct LedgerSession<'a> {
    ledger: &'a mut Ledger,
    gate: &'a AppLockGate,
}

impl<'a> LedgerSession<'a> {
    pub fn new(ledger: &'a mut Ledger, gate: &'a AppLockGate) -> Self {
        Self { ledger, gate }
    }

    fn ensure_unlocked(&self) -> Result<(), LedgerError> {
        if self.gate.is_unlocked() {
            Ok(())
        } else {
            Err(LedgerError::Locked)
        }
    }

    pub fn apply(&mut self, cmd: Command) -> Result<EntitySnapshot, LedgerError> {
        self.ensure_unlocked()?;
        self.ledger.apply(cmd)
    }

    pub fn apply_at(
        &mut self,
        cmd: Command,
        at: DateTime<Utc>,
    ) -> Result<EntitySnapshot, LedgerError> {
        self.ensure_unlocked()?;
        self.ledger.apply_at(cmd, at)
    }

    pub fn read(&self, kind: EntityKind, id: &str) -> Result<Option<EntitySnapshot>, LedgerError> {
        self.ensure_unlocked()?;
        self.ledger.read(kind, id)
    }

    pub fn query(&self, filter: &QueryFilter) -> Result<Vec<TransactionView>, LedgerError> {
        self.ensure_unlocked()?;
        self.ledger.query(filter)
    }

    pub fn categories(&self, include_deleted: bool) -> Result<Vec<Category>, LedgerError> {
        self.ensure_unlocked()?;
        self.ledger.categories(include_deleted)
    }

    /// Gate-checked access to the underlying connection for read-only
    /// surfaces (reports, export).
    pub fn conn(&self) -> Result<&Connection, LedgerError> {
        self.ensure_unlocked()?;
        Ok(self.ledger.conn())
    }

    pub fn user_id(&self) -> &str {
        self.ledger.user_id()
    }

    pub fn pending_changes(&self) -> Result<i64, LedgerError> {
        self.ledger.pending_changes()
    }
}

// ── command handlers ────────────────────────────────────────────

fn validate_currency(ccy: &str) -> Result<(), LedgerError> {
    if currency_ok(ccy) {
        Ok(())
    } else {
        Err(LedgerError::Invalid(format!("bad currency code '{ccy}'")))
    }
}

/// Create-time referential check: the category must exist and be live.
/// Historical rows may point at tombstoned categories; new ones may not.
fn require_live_category(conn: &Connection, user: &str, id: &str) -> Result<(), LedgerError> {
    let deleted: Option<bool> = conn
        .query_row(
            "SELECT deleted FROM categories WHERE id=?1 AND user_id=?2",
            params![id, user],
            |r| r.get(0),
        )
        .optional()?;
    match deleted {
        None => Err(LedgerError::Invalid(format!("unknown category '{id}'"))),
        Some(true) => Err(LedgerError::Invalid(format!("category '{id}' is deleted"))),
        Some(false) => Ok(()),
    }
}

/// Concurrency token for the next push: the revision the remote last
/// acknowledged, or 0 for an entity it has never seen. A pending
/// journal entry keeps its original token through coalescing.
fn base_revision_for(origin: Origin, revision: i64) -> i64 {
    match origin {
        Origin::Synced => revision,
        Origin::Local => 0,
    }
}

#[allow(clippy::too_many_arguments)]
fn create_transaction(
    conn: &Connection,
    user: &str,
    at: DateTime<Utc>,
    date: NaiveDate,
    amount_minor: i64,
    currency: String,
    category_id: String,
    note: Option<String>,
) -> Result<EntitySnapshot, LedgerError> {
    validate_currency(&currency)?;
    require_live_category(conn, user, &category_id)?;

    let t = Transaction {
        id: Uuid::new_v4().to_string(),
        user_id: user.to_string(),
        date,
        amount_minor,
        currency,
        category_id,
        note: note.filter(|n| !n.is_empty()),
        revision: 1,
        deleted: false,
        modified_at: at,
        origin: Origin::Local,
    };
    upsert_transaction(conn, &t)?;
    let snap = EntitySnapshot::Transaction(t.clone());
    journal::enqueue(conn, JournalOp::Create, &snap, 0)?;
    aggregate::on_transaction_changed(conn, None, Some(&t))?;
    Ok(snap)
}

#[allow(clippy::too_many_arguments)]
fn update_transaction(
    conn: &Connection,
    user: &str,
    at: DateTime<Utc>,
    id: &str,
    date: Option<NaiveDate>,
    amount_minor: Option<i64>,
    currency: Option<String>,
    category_id: Option<String>,
    note: Option<String>,
) -> Result<EntitySnapshot, LedgerError> {
    let old = load_live_transaction(conn, user, id)?;
    let base = base_revision_for(old.origin, old.revision);

    let mut new = old.clone();
    if let Some(d) = date {
        new.date = d;
    }
    if let Some(a) = amount_minor {
        new.amount_minor = a;
    }
    if let Some(c) = currency {
        validate_currency(&c)?;
        new.currency = c;
    }
    if let Some(c) = category_id {
        require_live_category(conn, user, &c)?;
        new.category_id = c;
    }
    if let Some(n) = note {
        new.note = if n.is_empty() { None } else { Some(n) };
    }
    new.revision = old.revision + 1;
    new.modified_at = at;
    new.origin = Origin::Local;

    upsert_transaction(conn, &new)?;
    let snap = EntitySnapshot::Transaction(new.clone());
    journal::enqueue(conn, JournalOp::Update, &snap, base)?;
    aggregate::on_transaction_changed(conn, Some(&old), Some(&new))?;
    Ok(snap)
}

fn delete_transaction(
    conn: &Connection,
    user: &str,
    at: DateTime<Utc>,
    id: &str,
) -> Result<EntitySnapshot, LedgerError> {
    let old = load_live_transaction(conn, user, id)?;
    let base = base_revision_for(old.origin, old.revision);

    let mut new = old.clone();
    new.deleted = true;
    new.revision = old.revision + 1;
    new.modified_at = at;
    new.origin = Origin::Local;

    upsert_transaction(conn, &new)?;
    let snap = EntitySnapshot::Transaction(new.clone());
    journal::enqueue(conn, JournalOp::Delete, &snap, base)?;
    aggregate::on_transaction_changed(conn, Some(&old), Some(&new))?;
    Ok(snap)
}

fn create_category(
    conn: &Connection,
    user: &str,
    at: DateTime<Utc>,
    name: String,
    kind: CategoryKind,
    budget_minor: Option<i64>,
) -> Result<EntitySnapshot, LedgerError> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(LedgerError::Invalid("category name is empty".into()));
    }
    let c = Category {
        id: Uuid::new_v4().to_string(),
        user_id: user.to_string(),
        name,
        kind,
        budget_minor,
        revision: 1,
        deleted: false,
        modified_at: at,
        origin: Origin::Local,
    };
    upsert_category(conn, &c)?;
    let snap = EntitySnapshot::Category(c);
    journal::enqueue(conn, JournalOp::Create, &snap, 0)?;
    Ok(snap)
}

fn update_category(
    conn: &Connection,
    user: &str,
    at: DateTime<Utc>,
    id: &str,
    name: Option<String>,
    budget_minor: Option<Option<i64>>,
) -> Result<EntitySnapshot, LedgerError> {
    let old = load_live_category(conn, user, id)?;
    let base = base_revision_for(old.origin, old.revision);

    let mut new = old.clone();
    if let Some(n) = name {
        let n = n.trim().to_string();
        if n.is_empty() {
            return Err(LedgerError::Invalid("category name is empty".into()));
        }
        new.name = n;
    }
    if let Some(b) = budget_minor {
        new.budget_minor = b;
    }
    new.revision = old.revision + 1;
    new.modified_at = at;
    new.origin = Origin::Local;

    upsert_category(conn, &new)?;
    let snap = EntitySnapshot::Category(new);
    journal::enqueue(conn, JournalOp::Update, &snap, base)?;
    Ok(snap)
}

/// Soft delete. Historical transactions keep resolving the tombstone;
/// only new references are rejected.
fn delete_category(
    conn: &Connection,
    user: &str,
    at: DateTime<Utc>,
    id: &str,
) -> Result<EntitySnapshot, LedgerError> {
    let old = load_live_category(conn, user, id)?;
    let base = base_revision_for(old.origin, old.revision);

    let mut new = old.clone();
    new.deleted = true;
    new.revision = old.revision + 1;
    new.modified_at = at;
    new.origin = Origin::Local;

    upsert_category(conn, &new)?;
    let snap = EntitySnapshot::Category(new);
    journal::enqueue(conn, JournalOp::Delete, &snap, base)?;
    Ok(snap)
}

// ── row mapping ─────────────────────────────────────────────────

fn tx_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: r.get(0)?,
        user_id: r.get(1)?,
        date: r.get(2)?,
        amount_minor: r.get(3)?,
        currency: r.get(4)?,
        category_id: r.get(5)?,
        note: r.get(6)?,
        revision: r.get(7)?,
        deleted: r.get(8)?,
        modified_at: r.get(9)?,
        origin: Origin::parse(&r.get::<_, String>(10)?),
    })
}

fn cat_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: r.get(0)?,
        user_id: r.get(1)?,
        name: r.get(2)?,
        kind: CategoryKind::parse(&r.get::<_, String>(3)?).unwrap_or(CategoryKind::Expense),
        budget_minor: r.get(4)?,
        revision: r.get(5)?,
        deleted: r.get(6)?,
        modified_at: r.get(7)?,
        origin: Origin::parse(&r.get::<_, String>(8)?),
    })
}

const TX_COLS: &str =
    "id, user_id, date, amount_minor, currency, category_id, note, revision, deleted, modified_at, origin";
const CAT_COLS: &str =
    "id, user_id, name, kind, budget_minor, revision, deleted, modified_at, origin";

pub(crate) fn load_transaction(
    conn: &Connection,
    user: &str,
    id: &str,
) -> Result<Option<Transaction>, LedgerError> {
    let sql = format!("SELECT {TX_COLS} FROM transactions WHERE id=?1 AND user_id=?2");
    Ok(conn
        .query_row(&sql, params![id, user], tx_from_row)
        .optional()?)
}

pub(crate) fn load_category(
    conn: &Connection,
    user: &str,
    id: &str,
) -> Result<Option<Category>, LedgerError> {
    let sql = format!("SELECT {CAT_COLS} FROM categories WHERE id=?1 AND user_id=?2");
    Ok(conn
        .query_row(&sql, params![id, user], cat_from_row)
        .optional()?)
}

fn load_live_transaction(
    conn: &Connection,
    user: &str,
    id: &str,
) -> Result<Transaction, LedgerError> {
    match load_transaction(conn, user, id)? {
        Some(t) if !t.deleted => Ok(t),
        _ => Err(LedgerError::NotFound {
            kind: "transaction",
            id: id.to_string(),
        }),
    }
}

fn load_live_category(conn: &Connection, user: &str, id: &str) -> Result<Category, LedgerError> {
    match load_category(conn, user, id)? {
        Some(c) if !c.deleted => Ok(c),
        _ => Err(LedgerError::NotFound {
            kind: "category",
            id: id.to_string(),
        }),
    }
}

fn upsert_transaction(conn: &Connection, t: &Transaction) -> Result<(), LedgerError> {
    conn.execute(
        "INSERT INTO transactions(id, user_id, date, amount_minor, currency, category_id,
                                  note, revision, deleted, modified_at, origin)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(id) DO UPDATE SET
            date=excluded.date, amount_minor=excluded.amount_minor,
            currency=excluded.currency, category_id=excluded.category_id,
            note=excluded.note, revision=excluded.revision,
            deleted=excluded.deleted, modified_at=excluded.modified_at,
            origin=excluded.origin",
        params![
            t.id,
            t.user_id,
            t.date,
            t.amount_minor,
            t.currency,
            t.category_id,
            t.note,
            t.revision,
            t.deleted,
            t.modified_at,
            t.origin.as_str()
        ],
    )?;
    Ok(())
}

fn upsert_category(conn: &Connection, c: &Category) -> Result<(), LedgerError> {
    conn.execute(
        "INSERT INTO categories(id, user_id, name, kind, budget_minor, revision,
                                deleted, modified_at, origin)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET
            name=excluded.name, kind=excluded.kind,
            budget_minor=excluded.budget_minor, revision=excluded.revision,
            deleted=excluded.deleted, modified_at=excluded.modified_at,
            origin=excluded.origin",
        params![
            c.id,
            c.user_id,
            c.name,
            c.kind.as_str(),
            c.budget_minor,
            c.revision,
            c.deleted,
            c.modified_at,
            c.origin.as_str()
        ],
    )?;
    Ok(())
}
