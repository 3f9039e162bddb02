// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! App lock gate: a small state machine in front of UI ledger access.
//!
//! Verification itself (biometric prompt, device credential) is an
//! external capability behind [`VerificationGate`]; the gate only
//! tracks state. Background reconciliation is never gated.

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;

use crate::db::{get_setting, set_setting};
use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Locked,
    AwaitingVerification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny,
    Cancelled,
}

/// External verifier (biometric prompt, passcode dialog, test fake).
pub trait VerificationGate {
    fn verify(&mut self) -> Verdict;
}

pub const DEFAULT_TIMEOUT_SECS: i64 = 120;

#[derive(Debug)]
pub struct AppLockGate {
    state: LockState,
    enabled: bool,
    timeout: Duration,
    last_activity: Option<DateTime<Utc>>,
}

impl AppLockGate {
    /// Cold start: `Locked` when the preference is enabled, `Unlocked`
    /// otherwise.
    pub fn new(enabled: bool, timeout: Duration) -> Self {
        Self {
            state: if enabled {
                LockState::Locked
            } else {
                LockState::Unlocked
            },
            enabled,
            timeout,
            last_activity: None,
        }
    }

    pub fn from_settings(conn: &Connection) -> Result<Self, LedgerError> {
        let enabled = get_setting(conn, "lock_enabled")?
            .map(|v| v == "1")
            .unwrap_or(false);
        let secs = get_setting(conn, "lock_timeout_secs")?
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Ok(Self::new(enabled, Duration::seconds(secs)))
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn is_unlocked(&self) -> bool {
        self.state == LockState::Unlocked
    }

    /// UI interaction happened; resets the inactivity clock.
    pub fn note_activity(&mut self, now: DateTime<Utc>) {
        if self.state == LockState::Unlocked {
            self.last_activity = Some(now);
        }
    }

    /// App moved to background: an enabled gate locks immediately.
    pub fn on_background(&mut self) {
        if self.enabled && self.state == LockState::Unlocked {
            self.state = LockState::Locked;
        }
    }

    /// Inactivity check; call periodically with the current time.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        if !self.enabled || self.state != LockState::Unlocked {
            return;
        }
        if let Some(last) = self.last_activity {
            if now - last >= self.timeout {
                self.state = LockState::Locked;
            }
        }
    }

    /// A UI unlock attempt moves Locked → AwaitingVerification.
    /// Returns false when there is nothing to unlock.
    pub fn request_unlock(&mut self) -> bool {
        if self.state == LockState::Locked {
            self.state = LockState::AwaitingVerification;
            true
        } else {
            false
        }
    }

    /// Outcome of the external verification. Allow unlocks; deny or
    /// cancel falls back to Locked.
    pub fn complete_verification(&mut self, verdict: Verdict) {
        if self.state != LockState::AwaitingVerification {
            return;
        }
        self.state = match verdict {
            Verdict::Allow => LockState::Unlocked,
            Verdict::Deny | Verdict::Cancelled => LockState::Locked,
        };
        if self.state == LockState::Unlocked {
            self.last_activity = Some(Utc::now());
        }
    }

    /// Full unlock round trip through an external verifier.
    pub fn unlock_via(&mut self, gate: &mut dyn VerificationGate) -> bool {
        if !self.request_unlock() {
            return self.is_unlocked();
        }
        let verdict = gate.verify();
        self.complete_verification(verdict);
        self.is_unlocked()
    }
}

pub fn lock_enabled(conn: &Connection) -> Result<bool, LedgerError> {
    Ok(get_setting(conn, "lock_enabled")?
        .map(|v| v == "1")
        .unwrap_or(false))
}

pub fn set_lock_enabled(conn: &Connection, enabled: bool) -> Result<(), LedgerError> {
    set_setting(conn, "lock_enabled", if enabled { "1" } else { "0" })?;
    Ok(())
}

pub fn set_lock_timeout(conn: &Connection, secs: i64) -> Result<(), LedgerError> {
    set_setting(conn, "lock_timeout_secs", &secs.to_string())?;
    Ok(())
}
