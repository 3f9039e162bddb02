// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Where the latest revision of an entity came from. `Local` means the
/// change has not yet been confirmed by the remote; `Synced` means the
/// stored revision matches what the remote acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Local,
    Synced,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Local => "local",
            Origin::Synced => "synced",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "synced" => Origin::Synced,
            _ => Origin::Local,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    Income,
    Expense,
}

impl CategoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryKind::Income => "income",
            CategoryKind::Expense => "expense",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "income" => Some(CategoryKind::Income),
            "expense" => Some(CategoryKind::Expense),
            _ => None,
        }
    }
}

/// A single ledger entry. Amounts are signed integer minor units
/// (cents); expenses are negative, income positive. Zero is allowed for
/// memo-only entries. Rows are tombstoned on delete, never removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub amount_minor: i64,
    pub currency: String,
    pub category_id: String,
    pub note: Option<String>,
    pub revision: i64,
    pub deleted: bool,
    pub modified_at: DateTime<Utc>,
    pub origin: Origin,
}

impl Transaction {
    /// Aggregation period key, e.g. "2024-05".
    pub fn period(&self) -> String {
        self.date.format("%Y-%m").to_string()
    }

    pub fn is_income(&self) -> bool {
        self.amount_minor > 0
    }

    pub fn is_expense(&self) -> bool {
        self.amount_minor < 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub kind: CategoryKind,
    /// Monthly budget limit in minor units; None means no limit.
    pub budget_minor: Option<i64>,
    pub revision: i64,
    pub deleted: bool,
    pub modified_at: DateTime<Utc>,
    pub origin: Origin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Transaction,
    Category,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Transaction => "transaction",
            EntityKind::Category => "category",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transaction" => Some(EntityKind::Transaction),
            "category" => Some(EntityKind::Category),
            _ => None,
        }
    }
}

/// Full post-mutation state of an entity. This is what the journal
/// stores and what crosses the wire to the remote collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum EntitySnapshot {
    Transaction(Transaction),
    Category(Category),
}

impl EntitySnapshot {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntitySnapshot::Transaction(_) => EntityKind::Transaction,
            EntitySnapshot::Category(_) => EntityKind::Category,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            EntitySnapshot::Transaction(t) => &t.id,
            EntitySnapshot::Category(c) => &c.id,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            EntitySnapshot::Transaction(t) => &t.user_id,
            EntitySnapshot::Category(c) => &c.user_id,
        }
    }

    pub fn revision(&self) -> i64 {
        match self {
            EntitySnapshot::Transaction(t) => t.revision,
            EntitySnapshot::Category(c) => c.revision,
        }
    }

    pub fn set_revision(&mut self, revision: i64) {
        match self {
            EntitySnapshot::Transaction(t) => t.revision = revision,
            EntitySnapshot::Category(c) => c.revision = revision,
        }
    }

    pub fn deleted(&self) -> bool {
        match self {
            EntitySnapshot::Transaction(t) => t.deleted,
            EntitySnapshot::Category(c) => c.deleted,
        }
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        match self {
            EntitySnapshot::Transaction(t) => t.modified_at,
            EntitySnapshot::Category(c) => c.modified_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalOp {
    Create,
    Update,
    Delete,
}

impl JournalOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalOp::Create => "create",
            JournalOp::Update => "update",
            JournalOp::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(JournalOp::Create),
            "update" => Some(JournalOp::Update),
            "delete" => Some(JournalOp::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Pending,
    InFlight,
    Acknowledged,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::InFlight => "in_flight",
            SyncStatus::Acknowledged => "acknowledged",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "in_flight" => SyncStatus::InFlight,
            "acknowledged" => SyncStatus::Acknowledged,
            "failed" => SyncStatus::Failed,
            _ => SyncStatus::Pending,
        }
    }
}

/// A durable record of local intent not yet confirmed by the remote.
/// One row per entity; newer local mutations coalesce into the existing
/// row, keeping its sequence slot.
#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub seq: i64,
    pub op: JournalOp,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub snapshot: EntitySnapshot,
    /// The entity revision last observed on the remote (0 when the
    /// entity has never been pushed). Used as the optimistic
    /// concurrency token for conditional writes.
    pub base_revision: i64,
    pub status: SyncStatus,
    pub attempts: i64,
    pub not_before: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Opaque identity from the external sign-in provider. Everything
/// persisted locally is scoped to `user_id`; the sync engine refuses to
/// run while the session is invalid, but local reads and writes keep
/// working.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub session_valid: bool,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, session_valid: bool) -> Self {
        Self {
            user_id: user_id.into(),
            session_valid,
        }
    }
}

/// Query result row: a transaction with its category resolved for
/// display. The join resolves soft-deleted categories too, so history
/// keeps rendering after a category is removed.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionView {
    #[serde(flatten)]
    pub tx: Transaction,
    pub category_name: String,
    pub category_kind: CategoryKind,
}

/// One aggregate cell: running sum and count of non-deleted
/// transactions for (category, period).
#[derive(Debug, Clone, Serialize)]
pub struct Bucket {
    pub category_id: String,
    pub period: String,
    pub sum_minor: i64,
    pub count: i64,
}
