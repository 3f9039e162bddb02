// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! The abstract remote collection and its two backends.
//!
//! The sync engine only ever sees this trait: conditional writes keyed
//! by entity id with a revision token, and an ordered change feed. The
//! in-memory backend doubles as the multi-device fixture in the test
//! suites; the HTTP backend talks JSON to a document endpoint.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::RemoteError;
use crate::models::EntitySnapshot;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteDoc {
    pub snapshot: EntitySnapshot,
    pub revision: i64,
}

/// One item of the ordered change feed. `seq` is the remote's global
/// change sequence, the pull cursor's unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteChange {
    pub seq: i64,
    pub snapshot: EntitySnapshot,
}

pub trait RemoteCollection {
    fn get(&self, entity_id: &str) -> Result<Option<RemoteDoc>, RemoteError>;

    /// Conditional write. `expected_revision` is the revision the
    /// client last observed (None for a document it believes absent);
    /// a mismatch fails with `Conflict` carrying the current revision.
    /// Returns the revision now stored.
    fn put(
        &mut self,
        entity_id: &str,
        snapshot: &EntitySnapshot,
        expected_revision: Option<i64>,
    ) -> Result<i64, RemoteError>;

    /// Changes with a sequence greater than `cursor`, in order.
    fn watch_since(&self, cursor: i64) -> Result<Vec<RemoteChange>, RemoteError>;
}

/// In-process remote. Serves the test suites and offline demos, and is
/// the reference behavior for conditional writes and the change feed.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    docs: HashMap<String, RemoteDoc>,
    log: Vec<RemoteChange>,
    next_seq: i64,
    offline: bool,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a network partition: every call fails until restored.
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    pub fn doc_count(&self) -> usize {
        self.docs.len()
    }

    pub fn change_count(&self) -> usize {
        self.log.len()
    }

    fn check_online(&self) -> Result<(), RemoteError> {
        if self.offline {
            Err(RemoteError::Unavailable("network unreachable".into()))
        } else {
            Ok(())
        }
    }
}

impl RemoteCollection for MemoryRemote {
    fn get(&self, entity_id: &str) -> Result<Option<RemoteDoc>, RemoteError> {
        self.check_online()?;
        Ok(self.docs.get(entity_id).cloned())
    }

    fn put(
        &mut self,
        entity_id: &str,
        snapshot: &EntitySnapshot,
        expected_revision: Option<i64>,
    ) -> Result<i64, RemoteError> {
        self.check_online()?;
        let current = self.docs.get(entity_id).map(|d| d.revision);
        match (current, expected_revision) {
            (None, None) => {}
            (Some(cur), Some(exp)) if cur == exp => {}
            (Some(cur), _) => return Err(RemoteError::Conflict { current: cur }),
            (None, Some(_)) => return Err(RemoteError::Conflict { current: 0 }),
        }
        let revision = snapshot.revision();
        self.docs.insert(
            entity_id.to_string(),
            RemoteDoc {
                snapshot: snapshot.clone(),
                revision,
            },
        );
        self.next_seq += 1;
        self.log.push(RemoteChange {
            seq: self.next_seq,
            snapshot: snapshot.clone(),
        });
        Ok(revision)
    }

    fn watch_since(&self, cursor: i64) -> Result<Vec<RemoteChange>, RemoteError> {
        self.check_online()?;
        Ok(self
            .log
            .iter()
            .filter(|c| c.seq > cursor)
            .cloned()
            .collect())
    }
}

/// Shared handle to one in-memory remote, so several engines (devices
/// in a test, a demo pair) reconcile against the same store.
pub type SharedRemote = Rc<RefCell<MemoryRemote>>;

pub fn shared() -> SharedRemote {
    Rc::new(RefCell::new(MemoryRemote::new()))
}

impl RemoteCollection for SharedRemote {
    fn get(&self, entity_id: &str) -> Result<Option<RemoteDoc>, RemoteError> {
        self.borrow().get(entity_id)
    }

    fn put(
        &mut self,
        entity_id: &str,
        snapshot: &EntitySnapshot,
        expected_revision: Option<i64>,
    ) -> Result<i64, RemoteError> {
        self.borrow_mut().put(entity_id, snapshot, expected_revision)
    }

    fn watch_since(&self, cursor: i64) -> Result<Vec<RemoteChange>, RemoteError> {
        self.borrow().watch_since(cursor)
    }
}

#[derive(Serialize)]
struct PutBody<'a> {
    snapshot: &'a EntitySnapshot,
    expected_revision: Option<i64>,
}

#[derive(Deserialize)]
struct PutReply {
    revision: i64,
}

#[derive(Deserialize)]
struct ConflictReply {
    current: i64,
}

/// Document-endpoint backend over blocking HTTP.
///
/// GET  {base}/entities/{id}        -> 200 RemoteDoc | 404
/// PUT  {base}/entities/{id}        -> 200 {revision} | 409 {current}
/// GET  {base}/changes?since={seq}  -> 200 [RemoteChange]
pub struct HttpRemote {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RemoteError> {
        let client = crate::utils::http_client()
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn transient(e: reqwest::Error) -> RemoteError {
        RemoteError::Unavailable(e.to_string())
    }
}

impl RemoteCollection for HttpRemote {
    fn get(&self, entity_id: &str) -> Result<Option<RemoteDoc>, RemoteError> {
        let url = format!("{}/entities/{}", self.base_url, entity_id);
        let resp = self.client.get(&url).send().map_err(Self::transient)?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp.error_for_status().map_err(Self::transient)?;
        let doc: RemoteDoc = resp.json().map_err(Self::transient)?;
        Ok(Some(doc))
    }

    fn put(
        &mut self,
        entity_id: &str,
        snapshot: &EntitySnapshot,
        expected_revision: Option<i64>,
    ) -> Result<i64, RemoteError> {
        let url = format!("{}/entities/{}", self.base_url, entity_id);
        let resp = self
            .client
            .put(&url)
            .json(&PutBody {
                snapshot,
                expected_revision,
            })
            .send()
            .map_err(Self::transient)?;
        if resp.status() == reqwest::StatusCode::CONFLICT {
            let body: ConflictReply = resp.json().map_err(Self::transient)?;
            return Err(RemoteError::Conflict {
                current: body.current,
            });
        }
        let resp = resp.error_for_status().map_err(Self::transient)?;
        let body: PutReply = resp.json().map_err(Self::transient)?;
        Ok(body.revision)
    }

    fn watch_since(&self, cursor: i64) -> Result<Vec<RemoteChange>, RemoteError> {
        let url = format!("{}/changes?since={}", self.base_url, cursor);
        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(Self::transient)?
            .error_for_status()
            .map_err(Self::transient)?;
        let changes: Vec<RemoteChange> = resp.json().map_err(Self::transient)?;
        Ok(changes)
    }
}
