//! The queryable data-service contract.
//!
//! Rows travel as JSON objects; typed crates decode them with
//! `serde_json::from_value`. Mutations return affected-row counts so callers
//! can log them, and every mutation is visible on the per-resource change
//! feed exposed by [`DataService::subscribe`].

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::{DataError, Result};
use crate::filter::Filter;

// ---------------------------------------------------------------------------
// Change feed types
// ---------------------------------------------------------------------------

/// Kind of mutation observed on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One change-feed notification.
///
/// The feed is coarse-grained: any mutation anywhere in the resource emits an
/// event, with the affected row attached when the backend has it (inserts) and
/// absent for bulk mutations.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub resource: String,
    pub kind: ChangeKind,
    pub row: Option<Value>,
}

/// Which change kinds a subscription wants delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMask {
    pub insert: bool,
    pub update: bool,
    pub delete: bool,
}

impl EventMask {
    pub fn all() -> Self {
        Self {
            insert: true,
            update: true,
            delete: true,
        }
    }

    pub fn accepts(&self, kind: ChangeKind) -> bool {
        match kind {
            ChangeKind::Insert => self.insert,
            ChangeKind::Update => self.update,
            ChangeKind::Delete => self.delete,
        }
    }
}

/// Live handle on a resource's change feed.
///
/// Dropping the handle tears the subscription down; [`unsubscribe`] is the
/// explicit spelling of the same thing. Leaking one leaks a live feed per
/// mounted consumer.
#[derive(Debug)]
pub struct Subscription {
    resource: String,
    mask: EventMask,
    receiver: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn new(
        resource: String,
        mask: EventMask,
        receiver: broadcast::Receiver<ChangeEvent>,
    ) -> Self {
        Self {
            resource,
            mask,
            receiver,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Wait for the next event matching the subscription's mask.
    ///
    /// A lagged receiver skips ahead rather than failing: the consumers of
    /// this feed recompute from scratch on every event, so missing an
    /// intermediate one is harmless.
    pub async fn recv(&mut self) -> Result<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.mask.accepts(event.kind) => return Ok(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(resource = %self.resource, skipped, "change feed lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return Err(DataError::FeedClosed),
            }
        }
    }

    /// Explicitly drop the subscription.
    pub fn unsubscribe(self) {}
}

// ---------------------------------------------------------------------------
// Service contract
// ---------------------------------------------------------------------------

/// Contract of the external relational data service.
///
/// `projection` is `"*"` or a comma-separated field list. Reads that match
/// nothing return an empty vector; that is a normal outcome, never an error.
#[async_trait]
pub trait DataService: Send + Sync {
    /// Read rows from `resource` matching `filter`, shaped by `projection`.
    async fn read(&self, resource: &str, projection: &str, filter: &Filter) -> Result<Vec<Value>>;

    /// Insert one record. Fails with [`DataError::UniqueViolation`] when the
    /// record collides with a declared unique key.
    async fn insert(&self, resource: &str, record: Value) -> Result<()>;

    /// Merge `patch` into every row matching `filter`; returns the number of
    /// rows touched.
    async fn update(&self, resource: &str, patch: Value, filter: &Filter) -> Result<u64>;

    /// Count rows matching `filter`.
    async fn count(&self, resource: &str, filter: &Filter) -> Result<u64>;

    /// Subscribe to the resource's change feed.
    fn subscribe(&self, resource: &str, mask: EventMask) -> Result<Subscription>;
}
