//! Live unread-message count.
//!
//! The counter derives one aggregate from two dependent queries (the
//! subject's conversations, then the unread messages inside them) and keeps
//! it current by re-running both on every event of the coarse-grained
//! `messages` change feed. Snapshots are published on a watch channel for
//! badge display.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use metier_data::{DataError, DataService, EventMask, Filter, IdentityProvider};
use metier_shared::constants::{RESOURCE_CONVERSATIONS, RESOURCE_MESSAGES};
use metier_shared::SubjectId;

/// Lifecycle phase of the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnreadPhase {
    /// A (re)computation is in flight.
    Loading,
    Ready,
    Error,
}

/// One published aggregate value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnreadSnapshot {
    pub phase: UnreadPhase,
    pub count: u64,
}

/// Live unread counter bound to the active session.
///
/// Dropping the counter (or calling [`shutdown`](UnreadCounter::shutdown))
/// aborts the feed task, which drops the subscription; leaking it would leak
/// one live subscription per mounted badge.
pub struct UnreadCounter {
    snapshot_rx: watch::Receiver<UnreadSnapshot>,
    feed_task: Option<JoinHandle<()>>,
}

impl UnreadCounter {
    /// Resolve the session, compute the initial count and start following
    /// the message change feed. Without a session the counter settles at
    /// `Ready(0)` and never subscribes.
    pub async fn start(
        identity: Arc<dyn IdentityProvider>,
        data: Arc<dyn DataService>,
    ) -> Self {
        let (tx, rx) = watch::channel(UnreadSnapshot {
            phase: UnreadPhase::Loading,
            count: 0,
        });

        let session = match identity.session().await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "unread counter could not resolve session");
                tx.send_replace(UnreadSnapshot {
                    phase: UnreadPhase::Error,
                    count: 0,
                });
                return Self {
                    snapshot_rx: rx,
                    feed_task: None,
                };
            }
        };

        let Some(session) = session else {
            tx.send_replace(UnreadSnapshot {
                phase: UnreadPhase::Ready,
                count: 0,
            });
            return Self {
                snapshot_rx: rx,
                feed_task: None,
            };
        };
        let subject = session.subject;

        let mut subscription = match data.subscribe(RESOURCE_MESSAGES, EventMask::all()) {
            Ok(sub) => sub,
            Err(e) => {
                warn!(error = %e, "unread counter could not subscribe");
                tx.send_replace(UnreadSnapshot {
                    phase: UnreadPhase::Error,
                    count: 0,
                });
                return Self {
                    snapshot_rx: rx,
                    feed_task: None,
                };
            }
        };

        publish(&tx, recompute(data.as_ref(), subject).await);

        let feed_task = tokio::spawn(async move {
            while let Ok(event) = subscription.recv().await {
                debug!(kind = ?event.kind, "message feed event, recomputing unread count");
                tx.send_modify(|s| s.phase = UnreadPhase::Loading);
                publish(&tx, recompute(data.as_ref(), subject).await);
            }
        });

        Self {
            snapshot_rx: rx,
            feed_task: Some(feed_task),
        }
    }

    /// Current aggregate value.
    pub fn snapshot(&self) -> UnreadSnapshot {
        *self.snapshot_rx.borrow()
    }

    /// Watch channel for badge rendering.
    pub fn watch(&self) -> watch::Receiver<UnreadSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Stop following the change feed. Idempotent; also runs on drop.
    pub fn shutdown(&self) {
        if let Some(task) = &self.feed_task {
            task.abort();
        }
    }
}

impl Drop for UnreadCounter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The two-query aggregate: conversations involving the subject, then the
/// count of unread messages inside them. An empty conversation set
/// short-circuits to zero without the second query.
async fn recompute(data: &dyn DataService, subject: SubjectId) -> Result<u64, DataError> {
    let conversations = data
        .read(
            RESOURCE_CONVERSATIONS,
            "id",
            &Filter::all().either_eq(&["consumer_id", "provider_id"], subject.to_string()),
        )
        .await?;

    let ids: Vec<Value> = conversations
        .iter()
        .filter_map(|row| row.get("id").cloned())
        .collect();
    if ids.is_empty() {
        return Ok(0);
    }

    data.count(
        RESOURCE_MESSAGES,
        &Filter::all()
            .is_in("conversation_id", ids)
            .ne("sender_id", subject.to_string())
            .eq("read", false),
    )
    .await
}

fn publish(tx: &watch::Sender<UnreadSnapshot>, result: Result<u64, DataError>) {
    match result {
        Ok(count) => tx.send_replace(UnreadSnapshot {
            phase: UnreadPhase::Ready,
            count,
        }),
        Err(e) => {
            warn!(error = %e, "unread recomputation failed");
            // Declared fallback: zero, never a stale positive count.
            tx.send_replace(UnreadSnapshot {
                phase: UnreadPhase::Error,
                count: 0,
            })
        }
    };
}
