//! Correlation table for outstanding requests
//!
//! Owned exclusively by the connection task. Every entry leaves the table
//! exactly once: through `resolve`, `expire`, or `fail_all`.

use super::types::TransportError;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Reply channel for a single request
pub type Reply = oneshot::Sender<Result<Value, TransportError>>;

/// A request waiting for its response
#[derive(Debug)]
pub struct PendingRequest {
    reply: Reply,
    deadline: Instant,
}

/// Outstanding requests keyed by correlation id
#[derive(Debug)]
pub struct PendingTable {
    next_id: u64,
    entries: HashMap<u64, PendingRequest>,
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingTable {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            entries: HashMap::new(),
        }
    }

    /// Store a reply handle and return its freshly assigned id
    pub fn register(&mut self, reply: Reply, deadline: Instant) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, PendingRequest { reply, deadline });
        id
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Complete request `id`. Returns false if it was not outstanding.
    pub fn resolve(&mut self, id: u64, result: Result<Value, TransportError>) -> bool {
        match self.entries.remove(&id) {
            Some(pending) => {
                // Caller may have stopped waiting; the entry is gone either way.
                let _ = pending.reply.send(result);
                true
            }
            None => false,
        }
    }

    /// Earliest deadline among outstanding requests
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|p| p.deadline).min()
    }

    /// Fail every request whose deadline is at or before `now`
    pub fn expire(&mut self, now: Instant) -> Vec<u64> {
        let expired: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            self.resolve(*id, Err(TransportError::Timeout { req_id: *id }));
        }
        expired
    }

    /// Fail everything, e.g. when the connection carrying the requests is lost
    pub fn fail_all(&mut self, err: TransportError) -> usize {
        let count = self.entries.len();
        for (_, pending) in self.entries.drain() {
            let _ = pending.reply.send(Err(err.clone()));
        }
        count
    }
}
