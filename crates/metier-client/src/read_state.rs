//! Best-effort read-flag mutation on messages.
//!
//! Marking messages read is a fire-and-forget consequence of "message
//! viewed": the operations here return nothing and never surface failures to
//! their caller. Failures are logged and, for callers that do care, forwarded
//! to an optional failure hook.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use metier_data::{DataService, Filter, IdentityProvider};
use metier_shared::constants::{RESOURCE_CONVERSATIONS, RESOURCE_MESSAGES};
use metier_shared::SubjectId;

use crate::error::ClientError;

type FailureHook = Arc<dyn Fn(&ClientError) + Send + Sync>;

/// Marks messages read on behalf of the active session's subject.
#[derive(Clone)]
pub struct ReadStateMutator {
    identity: Arc<dyn IdentityProvider>,
    data: Arc<dyn DataService>,
    on_failure: Option<FailureHook>,
}

impl ReadStateMutator {
    pub fn new(identity: Arc<dyn IdentityProvider>, data: Arc<dyn DataService>) -> Self {
        Self {
            identity,
            data,
            on_failure: None,
        }
    }

    /// Observe swallowed failures without changing the best-effort contract.
    pub fn with_failure_hook(
        mut self,
        hook: impl Fn(&ClientError) + Send + Sync + 'static,
    ) -> Self {
        self.on_failure = Some(Arc::new(hook));
        self
    }

    /// Mark every message in `conversation_id` that someone else sent as
    /// read. Idempotent; a no-op without a session.
    pub async fn mark_conversation_read(&self, conversation_id: Uuid) {
        let Some(subject) = self.subject().await else {
            return;
        };

        let filter = Filter::all()
            .eq("conversation_id", conversation_id.to_string())
            .ne("sender_id", subject.to_string())
            .eq("read", false);

        match self
            .data
            .update(RESOURCE_MESSAGES, json!({"read": true}), &filter)
            .await
        {
            Ok(affected) => {
                debug!(%conversation_id, affected, "conversation marked read")
            }
            Err(e) => self.report(ClientError::Data(e)),
        }
    }

    /// Mark every message addressed to the subject, across all of their
    /// conversations, as read in one bulk update.
    pub async fn mark_all_read(&self) {
        let Some(subject) = self.subject().await else {
            return;
        };

        let conversations = match self
            .data
            .read(
                RESOURCE_CONVERSATIONS,
                "id",
                &Filter::all().either_eq(&["consumer_id", "provider_id"], subject.to_string()),
            )
            .await
        {
            Ok(rows) => rows,
            Err(e) => return self.report(ClientError::Data(e)),
        };

        let ids: Vec<Value> = conversations
            .iter()
            .filter_map(|row| row.get("id").cloned())
            .collect();
        if ids.is_empty() {
            return;
        }

        let filter = Filter::all()
            .is_in("conversation_id", ids)
            .ne("sender_id", subject.to_string())
            .eq("read", false);

        match self
            .data
            .update(RESOURCE_MESSAGES, json!({"read": true}), &filter)
            .await
        {
            Ok(affected) => debug!(subject = %subject, affected, "all conversations marked read"),
            Err(e) => self.report(ClientError::Data(e)),
        }
    }

    /// The active subject, or `None` when signed out (the operations above
    /// silently do nothing in that case).
    async fn subject(&self) -> Option<SubjectId> {
        match self.identity.session().await {
            Ok(session) => session.map(|s| s.subject),
            Err(e) => {
                self.report(ClientError::from(e));
                None
            }
        }
    }

    fn report(&self, err: ClientError) {
        warn!(error = %err, "read-state mutation failed (swallowed)");
        if let Some(hook) = &self.on_failure {
            hook(&err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use metier_data::{MemoryDataService, MemoryIdentityProvider};
    use metier_shared::{Conversation, Message, Session};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn session(subject: SubjectId) -> Session {
        Session {
            access_token: "tok".to_string(),
            subject,
            email: "b@example.com".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            metadata: HashMap::new(),
        }
    }

    fn message(conversation: Uuid, sender: SubjectId, read: bool) -> Value {
        serde_json::to_value(Message {
            id: Uuid::new_v4(),
            conversation_id: conversation,
            sender_id: sender,
            body: "salut".to_string(),
            read,
            created_at: Utc::now(),
        })
        .unwrap()
    }

    /// Conversation C between A (consumer) and B (provider), three messages
    /// from A of which one is already read.
    async fn seed_conversation(
        data: &MemoryDataService,
        a: SubjectId,
        b: SubjectId,
    ) -> Uuid {
        let convo = Conversation {
            id: Uuid::new_v4(),
            consumer_id: a,
            provider_id: b,
            created_at: Utc::now(),
        };
        let id = convo.id;
        data.seed(
            RESOURCE_CONVERSATIONS,
            vec![serde_json::to_value(convo).unwrap()],
        )
        .await;
        data.seed(
            RESOURCE_MESSAGES,
            vec![
                message(id, a, false),
                message(id, a, false),
                message(id, a, true),
            ],
        )
        .await;
        id
    }

    async fn unread_by(data: &MemoryDataService, convo: Uuid, subject: SubjectId) -> u64 {
        data.count(
            RESOURCE_MESSAGES,
            &Filter::all()
                .eq("conversation_id", convo.to_string())
                .ne("sender_id", subject.to_string())
                .eq("read", false),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn marking_a_conversation_read_is_idempotent() {
        let data = Arc::new(MemoryDataService::new());
        let (a, b) = (SubjectId::new(), SubjectId::new());
        let convo = seed_conversation(&data, a, b).await;
        assert_eq!(unread_by(&data, convo, b).await, 2);

        let identity = Arc::new(MemoryIdentityProvider::with_session(session(b)));
        let mutator = ReadStateMutator::new(identity, data.clone());

        mutator.mark_conversation_read(convo).await;
        assert_eq!(unread_by(&data, convo, b).await, 0);

        mutator.mark_conversation_read(convo).await;
        assert_eq!(unread_by(&data, convo, b).await, 0, "second call is a no-op");

        // A's own sent messages are untouched either way.
        assert_eq!(unread_by(&data, convo, a).await, 0);
    }

    #[tokio::test]
    async fn mark_all_read_covers_every_conversation_of_the_subject() {
        let data = Arc::new(MemoryDataService::new());
        let (a, b, c) = (SubjectId::new(), SubjectId::new(), SubjectId::new());
        let first = seed_conversation(&data, a, b).await;
        let second = seed_conversation(&data, b, c).await; // b is consumer here
        let foreign = seed_conversation(&data, a, c).await; // b not a participant
        // One message addressed to b in the second conversation too, so the
        // bulk update has to reach both of b's conversations.
        data.seed(RESOURCE_MESSAGES, vec![message(second, c, false)]).await;
        assert_eq!(unread_by(&data, first, b).await, 2);
        assert_eq!(unread_by(&data, second, b).await, 1);

        let identity = Arc::new(MemoryIdentityProvider::with_session(session(b)));
        ReadStateMutator::new(identity, data.clone()).mark_all_read().await;

        assert_eq!(unread_by(&data, first, b).await, 0);
        assert_eq!(unread_by(&data, second, b).await, 0);
        assert_eq!(unread_by(&data, foreign, c).await, 2, "other pairs untouched");
    }

    #[tokio::test]
    async fn without_a_session_nothing_happens() {
        let data = Arc::new(MemoryDataService::new());
        let (a, b) = (SubjectId::new(), SubjectId::new());
        let convo = seed_conversation(&data, a, b).await;

        let identity = Arc::new(MemoryIdentityProvider::anonymous());
        let mutator = ReadStateMutator::new(identity, data.clone());
        mutator.mark_conversation_read(convo).await;
        mutator.mark_all_read().await;

        assert_eq!(unread_by(&data, convo, b).await, 2);
    }

    #[tokio::test]
    async fn failures_are_swallowed_but_reach_the_hook() {
        let data = Arc::new(MemoryDataService::new());
        let (a, b) = (SubjectId::new(), SubjectId::new());
        seed_conversation(&data, a, b).await;
        data.set_read_failure(true);

        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let identity = Arc::new(MemoryIdentityProvider::with_session(session(b)));
        let mutator = ReadStateMutator::new(identity, data.clone())
            .with_failure_hook(move |_err| {
                seen.fetch_add(1, Ordering::SeqCst);
            });

        // Returns normally despite the backend failure underneath.
        mutator.mark_all_read().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
