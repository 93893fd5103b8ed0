//! In-memory implementations of both collaborator contracts.
//!
//! Used for local development and as the substitutable backend in tests
//! everywhere above this crate. Rows live as JSON objects behind a
//! `tokio::sync::RwLock`; each resource gets a broadcast change feed.
//!
//! The service keeps a read-call counter, an optional injected read latency
//! and a read-failure switch, so tests can assert cache behavior ("zero
//! remote reads"), race in-flight fetches against teardown, and drive error
//! states without a real backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use metier_shared::{Session, User};

use crate::error::{DataError, Result};
use crate::filter::Filter;
use crate::identity::{AuthEvent, IdentityError, IdentityProvider};
use crate::service::{ChangeEvent, ChangeKind, DataService, EventMask, Subscription};

/// Capacity of each per-resource broadcast feed.
const FEED_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Data service
// ---------------------------------------------------------------------------

/// In-memory [`DataService`] with per-resource change feeds and declared
/// unique keys.
pub struct MemoryDataService {
    tables: RwLock<HashMap<String, Vec<Value>>>,
    feeds: std::sync::Mutex<HashMap<String, broadcast::Sender<ChangeEvent>>>,
    /// resource -> fields that must be unique across its rows.
    unique_keys: HashMap<String, Vec<String>>,
    read_calls: AtomicU64,
    read_delay_ms: AtomicU64,
    fail_reads: AtomicBool,
}

impl MemoryDataService {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            feeds: std::sync::Mutex::new(HashMap::new()),
            unique_keys: HashMap::new(),
            read_calls: AtomicU64::new(0),
            read_delay_ms: AtomicU64::new(0),
            fail_reads: AtomicBool::new(false),
        }
    }

    /// Declare a unique key on `resource.field`. Inserts that collide fail
    /// with [`DataError::UniqueViolation`].
    pub fn with_unique_key(mut self, resource: &str, field: &str) -> Self {
        self.unique_keys
            .entry(resource.to_string())
            .or_default()
            .push(field.to_string());
        self
    }

    /// Total number of `read` calls served so far.
    pub fn reads(&self) -> u64 {
        self.read_calls.load(Ordering::Relaxed)
    }

    /// Delay every `read` by `latency` (test hook for in-flight races).
    pub fn set_read_latency(&self, latency: Duration) {
        self.read_delay_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Make every subsequent `read`/`count` fail (test hook).
    pub fn set_read_failure(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    /// Load rows directly, bypassing unique checks and the change feed.
    pub async fn seed(&self, resource: &str, rows: Vec<Value>) {
        let mut tables = self.tables.write().await;
        tables
            .entry(resource.to_string())
            .or_default()
            .extend(rows);
    }

    fn emit(&self, event: ChangeEvent) {
        if let Ok(feeds) = self.feeds.lock() {
            if let Some(tx) = feeds.get(&event.resource) {
                // No receivers is fine; the feed is fire-and-forget.
                let _ = tx.send(event);
            }
        }
    }

    async fn pre_read(&self) -> Result<()> {
        self.read_calls.fetch_add(1, Ordering::Relaxed);
        let delay = self.read_delay_ms.load(Ordering::Relaxed);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(DataError::Backend("injected read failure".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryDataService {
    fn default() -> Self {
        Self::new()
    }
}

/// Shape a row according to a `"*"` or comma-separated projection.
fn project(row: &Value, projection: &str) -> Value {
    if projection.trim() == "*" {
        return row.clone();
    }
    let mut shaped = serde_json::Map::new();
    for field in projection.split(',') {
        let field = field.trim();
        if let Some(v) = row.get(field) {
            shaped.insert(field.to_string(), v.clone());
        }
    }
    Value::Object(shaped)
}

#[async_trait]
impl DataService for MemoryDataService {
    async fn read(&self, resource: &str, projection: &str, filter: &Filter) -> Result<Vec<Value>> {
        self.pre_read().await?;
        let tables = self.tables.read().await;
        let rows = tables
            .get(resource)
            .map(|rows| {
                rows.iter()
                    .filter(|r| filter.matches(r))
                    .map(|r| project(r, projection))
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    async fn insert(&self, resource: &str, record: Value) -> Result<()> {
        if !record.is_object() {
            return Err(DataError::Backend("record must be a JSON object".to_string()));
        }

        let mut tables = self.tables.write().await;
        let rows = tables.entry(resource.to_string()).or_default();

        if let Some(keys) = self.unique_keys.get(resource) {
            for key in keys {
                let candidate = record.get(key);
                if candidate.is_some() && rows.iter().any(|r| r.get(key) == candidate) {
                    return Err(DataError::UniqueViolation {
                        resource: resource.to_string(),
                    });
                }
            }
        }

        rows.push(record.clone());
        drop(tables);

        debug!(resource, "row inserted");
        self.emit(ChangeEvent {
            resource: resource.to_string(),
            kind: ChangeKind::Insert,
            row: Some(record),
        });
        Ok(())
    }

    async fn update(&self, resource: &str, patch: Value, filter: &Filter) -> Result<u64> {
        let patch = match patch.as_object() {
            Some(obj) => obj.clone(),
            None => return Err(DataError::Backend("patch must be a JSON object".to_string())),
        };

        let mut affected = 0u64;
        {
            let mut tables = self.tables.write().await;
            if let Some(rows) = tables.get_mut(resource) {
                for row in rows.iter_mut().filter(|r| filter.matches(r)) {
                    if let Some(obj) = row.as_object_mut() {
                        for (k, v) in &patch {
                            obj.insert(k.clone(), v.clone());
                        }
                        affected += 1;
                    }
                }
            }
        }

        if affected > 0 {
            debug!(resource, affected, "rows updated");
            self.emit(ChangeEvent {
                resource: resource.to_string(),
                kind: ChangeKind::Update,
                row: None,
            });
        }
        Ok(affected)
    }

    async fn count(&self, resource: &str, filter: &Filter) -> Result<u64> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(DataError::Backend("injected read failure".to_string()));
        }
        let tables = self.tables.read().await;
        let n = tables
            .get(resource)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).count())
            .unwrap_or(0);
        Ok(n as u64)
    }

    fn subscribe(&self, resource: &str, mask: EventMask) -> Result<Subscription> {
        let mut feeds = self
            .feeds
            .lock()
            .map_err(|e| DataError::Backend(format!("feed registry poisoned: {e}")))?;
        let tx = feeds
            .entry(resource.to_string())
            .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0);
        Ok(Subscription::new(
            resource.to_string(),
            mask,
            tx.subscribe(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Identity provider
// ---------------------------------------------------------------------------

struct IdentityInner {
    session: Option<Session>,
    /// One-shot confirmation codes and the session each one unlocks.
    codes: HashMap<String, Session>,
}

/// In-memory [`IdentityProvider`] with registered one-shot codes.
pub struct MemoryIdentityProvider {
    inner: RwLock<IdentityInner>,
    events: broadcast::Sender<AuthEvent>,
}

impl MemoryIdentityProvider {
    /// Signed-out provider with no registered codes.
    pub fn anonymous() -> Self {
        Self {
            inner: RwLock::new(IdentityInner {
                session: None,
                codes: HashMap::new(),
            }),
            events: broadcast::channel(FEED_CAPACITY).0,
        }
    }

    /// Provider already holding an active session.
    pub fn with_session(session: Session) -> Self {
        Self {
            inner: RwLock::new(IdentityInner {
                session: Some(session),
                codes: HashMap::new(),
            }),
            events: broadcast::channel(FEED_CAPACITY).0,
        }
    }

    /// Register a confirmation code that exchanges into `session`.
    pub async fn register_code(&self, code: &str, session: Session) {
        let mut inner = self.inner.write().await;
        inner.codes.insert(code.to_string(), session);
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn exchange_code(&self, code: &str) -> std::result::Result<Session, IdentityError> {
        let mut inner = self.inner.write().await;
        match inner.codes.remove(code) {
            Some(session) => {
                inner.session = Some(session.clone());
                let _ = self.events.send(AuthEvent::SignedIn(session.clone()));
                Ok(session)
            }
            None => Err(IdentityError::Exchange(
                "invalid or expired confirmation code".to_string(),
            )),
        }
    }

    async fn session(&self) -> std::result::Result<Option<Session>, IdentityError> {
        Ok(self.inner.read().await.session.clone())
    }

    async fn user(&self) -> std::result::Result<Option<User>, IdentityError> {
        Ok(self.inner.read().await.session.as_ref().map(|s| User {
            id: s.subject,
            email: s.email.clone(),
        }))
    }

    async fn sign_out(&self) -> std::result::Result<(), IdentityError> {
        let mut inner = self.inner.write().await;
        inner.session = None;
        let _ = self.events.send(AuthEvent::SignedOut);
        Ok(())
    }

    fn on_auth_change(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
