//! Cached, mount-aware query coordination.
//!
//! A [`QueryClient`] owns the process-wide [`QueryCache`] and a handle to the
//! data service. One-shot callers use [`QueryClient::fetch`]; views that want
//! an observable `{rows, loading, error}` state use [`QueryClient::watch`],
//! which returns a [`Query`] whose state updates stop the moment the query is
//! unmounted.
//!
//! Cancellation is cooperative: unmounting flips the mount-guard and cancels
//! the refetch timer, but an in-flight remote read is not aborted at the
//! transport level. Its result still lands in the cache; only the delivery to
//! the torn-down consumer is suppressed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use metier_data::{DataError, DataService, Filter};

use crate::cache::QueryCache;

/// What to read: resource, projection and filter. The triple's deterministic
/// signature is the cache key.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub resource: String,
    pub projection: String,
    pub filter: Filter,
}

impl QuerySpec {
    pub fn new(resource: &str, projection: &str, filter: Filter) -> Self {
        Self {
            resource: resource.to_string(),
            projection: projection.to_string(),
            filter,
        }
    }

    /// Cache key: `resource:projection:filter-signature`.
    pub fn key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.resource,
            self.projection,
            self.filter.signature()
        )
    }
}

/// Per-watch options.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// `false` suppresses all fetching; the query reports `loading = false`
    /// and never touches the data service.
    pub enabled: bool,
    /// Recurring fetch cadence while the query is mounted.
    pub refetch_interval: Option<Duration>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            refetch_interval: None,
        }
    }
}

/// Observable state of one watched query.
#[derive(Debug, Clone, Default)]
pub struct QueryState {
    /// Last delivered rows; untouched by later failures.
    pub rows: Option<Vec<Value>>,
    pub loading: bool,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Read-through query client. Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct QueryClient {
    data: Arc<dyn DataService>,
    cache: QueryCache,
}

impl QueryClient {
    pub fn new(data: Arc<dyn DataService>) -> Self {
        Self {
            data,
            cache: QueryCache::new(),
        }
    }

    /// Client over an externally owned cache (shared across clients).
    pub fn with_cache(data: Arc<dyn DataService>, cache: QueryCache) -> Self {
        Self { data, cache }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Read-through fetch: a fresh cache entry is returned without I/O, a
    /// miss or stale entry triggers exactly one remote read. Failures leave
    /// any prior entry untouched.
    pub async fn fetch(&self, spec: &QuerySpec) -> Result<Vec<Value>, DataError> {
        if let Some(rows) = self.cache.get_fresh(&spec.key()).await {
            return Ok(rows);
        }
        self.fetch_remote(spec).await
    }

    /// Unconditional remote read, cached on success.
    pub async fn fetch_remote(&self, spec: &QuerySpec) -> Result<Vec<Value>, DataError> {
        let rows = self
            .data
            .read(&spec.resource, &spec.projection, &spec.filter)
            .await?;
        self.cache.put(&spec.key(), rows.clone()).await;
        Ok(rows)
    }

    /// Start watching a query; the returned [`Query`] owns the mount-guard.
    pub fn watch(&self, spec: QuerySpec, options: QueryOptions) -> Query {
        Query::spawn(self.clone(), spec, options)
    }

    /// Spawn the periodic TTL sweep that keeps the cache from growing
    /// without bound. The caller owns the handle.
    pub fn start_ttl_sweep(&self, every: Duration) -> JoinHandle<()> {
        let cache = self.cache.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await; // the first tick fires immediately
            loop {
                interval.tick().await;
                cache.purge_stale().await;
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Watched query
// ---------------------------------------------------------------------------

struct QueryInner {
    client: QueryClient,
    spec: QuerySpec,
    /// Mount-guard: flipped false at teardown so a late resolution cannot
    /// mutate the consumer's observable state.
    mounted: AtomicBool,
    state_tx: watch::Sender<QueryState>,
}

impl QueryInner {
    fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    fn deliver(&self, apply: impl FnOnce(&mut QueryState)) {
        if self.is_mounted() {
            self.state_tx.send_modify(apply);
        }
    }

    async fn run_fetch(&self, force: bool) {
        if !self.is_mounted() {
            return;
        }
        self.deliver(|s| s.loading = true);

        let result = if force {
            self.client.cache.invalidate(&self.spec.key()).await;
            self.client.fetch_remote(&self.spec).await
        } else {
            self.client.fetch(&self.spec).await
        };

        // The cache is already up to date; state delivery alone is guarded.
        match result {
            Ok(rows) => self.deliver(|s| {
                s.rows = Some(rows);
                s.loading = false;
                s.error = None;
            }),
            Err(e) => {
                warn!(key = %self.spec.key(), error = %e, "query fetch failed");
                self.deliver(|s| {
                    s.error = Some(e.to_string());
                    s.loading = false;
                });
            }
        }
    }
}

/// A mounted, observable query. Dropping it (or calling
/// [`unmount`](Query::unmount)) tears it down.
pub struct Query {
    inner: Arc<QueryInner>,
    refetch_timer: Option<JoinHandle<()>>,
}

impl Query {
    fn spawn(client: QueryClient, spec: QuerySpec, options: QueryOptions) -> Self {
        let (state_tx, _) = watch::channel(QueryState {
            rows: None,
            loading: options.enabled,
            error: None,
        });
        let inner = Arc::new(QueryInner {
            client,
            spec,
            mounted: AtomicBool::new(true),
            state_tx,
        });

        let mut refetch_timer = None;
        if options.enabled {
            let initial = inner.clone();
            // Deliberately not aborted on unmount: the guard discards its
            // result instead, mirroring transport-level non-cancellation.
            tokio::spawn(async move {
                initial.run_fetch(false).await;
            });

            if let Some(every) = options.refetch_interval {
                let periodic = inner.clone();
                refetch_timer = Some(tokio::spawn(async move {
                    let mut interval = tokio::time::interval(every);
                    interval.tick().await; // skip the immediate first tick
                    loop {
                        interval.tick().await;
                        if !periodic.is_mounted() {
                            break;
                        }
                        periodic.run_fetch(false).await;
                    }
                }));
            }
        }

        Self {
            inner,
            refetch_timer,
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> QueryState {
        self.inner.state_tx.borrow().clone()
    }

    /// Watch channel for state changes.
    pub fn subscribe(&self) -> watch::Receiver<QueryState> {
        self.inner.state_tx.subscribe()
    }

    /// Evict the cache entry and fetch unconditionally, bypassing TTL.
    pub async fn refetch(&self) {
        self.inner.run_fetch(true).await;
    }

    /// Tear the query down: flip the mount-guard and cancel the refetch
    /// timer. Idempotent.
    pub fn unmount(&self) {
        if self.inner.mounted.swap(false, Ordering::SeqCst) {
            debug!(key = %self.inner.spec.key(), "query unmounted");
        }
        if let Some(timer) = &self.refetch_timer {
            timer.abort();
        }
    }
}

impl Drop for Query {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::QUERY_TTL;
    use metier_data::MemoryDataService;
    use serde_json::json;

    async fn seeded_service() -> Arc<MemoryDataService> {
        let data = Arc::new(MemoryDataService::new());
        data.seed(
            "profiles",
            vec![json!({"id": "a", "role": "consumer", "email": "a@x"})],
        )
        .await;
        data
    }

    fn profile_spec() -> QuerySpec {
        QuerySpec::new("profiles", "*", Filter::all().eq("id", "a"))
    }

    #[tokio::test]
    async fn second_fetch_within_ttl_hits_cache() {
        let data = seeded_service().await;
        let client = QueryClient::new(data.clone());

        let first = client.fetch(&profile_spec()).await.unwrap();
        let second = client.fetch(&profile_spec()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(data.reads(), 1, "second call must perform zero remote reads");
    }

    #[tokio::test(start_paused = true)]
    async fn stale_entry_triggers_exactly_one_new_read() {
        let data = seeded_service().await;
        let client = QueryClient::new(data.clone());

        client.fetch(&profile_spec()).await.unwrap();
        tokio::time::advance(QUERY_TTL + Duration::from_secs(1)).await;
        client.fetch(&profile_spec()).await.unwrap();

        assert_eq!(data.reads(), 2);
    }

    #[tokio::test]
    async fn refetch_bypasses_ttl() {
        let data = seeded_service().await;
        let client = QueryClient::new(data.clone());
        let query = client.watch(profile_spec(), QueryOptions::default());

        query.refetch().await;
        query.refetch().await;
        // Initial spawned fetch may or may not have hit the cache first, but
        // the two explicit refetches are unconditional.
        assert!(data.reads() >= 2);
        assert!(query.state().rows.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn unmounted_query_discards_late_resolution() {
        let data = seeded_service().await;
        data.set_read_latency(Duration::from_millis(100));
        let client = QueryClient::new(data.clone());

        let query = client.watch(profile_spec(), QueryOptions::default());
        tokio::task::yield_now().await; // let the fetch task reach the read
        query.unmount();

        // Let the in-flight read resolve.
        tokio::time::sleep(Duration::from_millis(500)).await;

        let state = query.state();
        assert!(state.rows.is_none(), "late delivery must be discarded");
        assert!(state.error.is_none());

        // The result still landed in the cache for later callers.
        data.set_read_latency(Duration::from_millis(0));
        client.fetch(&profile_spec()).await.unwrap();
        assert_eq!(data.reads(), 1, "cache kept the discarded result");
    }

    #[tokio::test]
    async fn disabled_query_never_touches_the_service() {
        let data = seeded_service().await;
        let client = QueryClient::new(data.clone());

        let query = client.watch(
            profile_spec(),
            QueryOptions {
                enabled: false,
                refetch_interval: Some(Duration::from_millis(10)),
            },
        );
        tokio::task::yield_now().await;

        let state = query.state();
        assert!(!state.loading);
        assert!(state.rows.is_none());
        assert_eq!(data.reads(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn refetch_interval_fires_until_unmount() {
        let data = seeded_service().await;
        let client = QueryClient::new(data.clone());
        // TTL of zero so every interval tick reaches the service.
        let client = QueryClient::with_cache(
            client.data.clone(),
            QueryCache::with_ttl(Duration::from_millis(0)),
        );

        let query = client.watch(
            profile_spec(),
            QueryOptions {
                enabled: true,
                refetch_interval: Some(Duration::from_secs(5)),
            },
        );

        tokio::time::sleep(Duration::from_secs(16)).await;
        let after_three_ticks = data.reads();
        assert!(after_three_ticks >= 3, "got {after_three_ticks} reads");

        query.unmount();
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(data.reads(), after_three_ticks, "timer must stop at unmount");
    }

    #[tokio::test]
    async fn error_state_leaves_prior_rows_untouched() {
        let data = seeded_service().await;
        let client = QueryClient::new(data.clone());
        let query = client.watch(profile_spec(), QueryOptions::default());
        query.refetch().await;
        assert!(query.state().rows.is_some());

        data.set_read_failure(true);
        query.refetch().await;

        let state = query.state();
        assert!(state.error.is_some());
        assert!(!state.loading);
        assert!(state.rows.is_some(), "previous rows remain");
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_sweep_evicts_stale_entries() {
        let data = seeded_service().await;
        let client = QueryClient::new(data.clone());
        client.fetch(&profile_spec()).await.unwrap();
        assert_eq!(client.cache().len().await, 1);

        let sweeper = client.start_ttl_sweep(Duration::from_secs(10));
        tokio::time::sleep(QUERY_TTL + Duration::from_secs(15)).await;
        assert!(client.cache().is_empty().await);
        sweeper.abort();
    }
}
