// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use thiserror::Error;

/// Errors raised by the local ledger. None of these are fatal to the
/// process; the ledger stays usable offline regardless of what the sync
/// side is doing.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Malformed command (unknown category, bad currency code, ...).
    /// Rejected synchronously, never journaled.
    #[error("invalid command: {0}")]
    Invalid(String),

    /// Referenced entity is missing or already deleted.
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// UI access denied while the app lock gate is not unlocked.
    #[error("ledger is locked")]
    Locked,

    /// Aggregate index drift. Recovered with a rebuild, not fatal.
    #[error("aggregate drift: {0}")]
    Integrity(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("snapshot encoding error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Errors from the remote collection. Conflicts are consumed by the
/// merge policy and never surface to callers of the ledger; transport
/// failures only ever show up as "not yet synced".
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Conditional write rejected; the remote holds `current`.
    #[error("revision conflict, remote is at {current}")]
    Conflict { current: i64 },

    /// Network or server failure. Retried with backoff.
    #[error("remote unavailable: {0}")]
    Unavailable(String),
}
