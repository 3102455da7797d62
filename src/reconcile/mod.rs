//! Reconciliation core
//!
//! The per-kind control loop: fetch the current external representation of
//! one (namespace, name), diff it against the kind's store, and apply
//! insert/update/delete. The loop is level-triggered and idempotent;
//! re-running it with no external change overwrites the store entry with
//! identical data. Transient failures are returned to the driving controller
//! together with a fixed-delay requeue directive, never retried
//! synchronously.
//!
//! Concurrency: reconciliation must be safe across different
//! (namespace, name) keys and different kinds. The driving watch layer is
//! expected to serialize reconciliation per key; stores must be safe under
//! concurrent access from multiple workers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::error::{Error, Result};

// =============================================================================
// Requests and Outcomes
// =============================================================================

/// Identifies one object of one kind for a single reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReconcileRequest {
    pub namespace: String,
    pub name: String,
}

impl ReconcileRequest {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

/// Result of a successful reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Internal state agrees with external state; wait for the next change
    Done,
    /// Run the pass again after a delay
    RequeueAfter(Duration),
}

// =============================================================================
// Backoff Policy
// =============================================================================

/// Requeue policy applied to transient reconciliation failures.
///
/// One policy object is shared by every call site; low-volume control-plane
/// reconciliation uses a fixed delay rather than exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    delay: Duration,
}

impl BackoffPolicy {
    /// Requeue after a fixed delay
    pub const fn fixed(delay: Duration) -> Self {
        Self { delay }
    }

    /// Delay before the next attempt
    pub fn next_delay(&self) -> Duration {
        self.delay
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(60))
    }
}

// =============================================================================
// Collaborator Traits
// =============================================================================

/// Identity accessors every mirrored resource kind must expose
pub trait ResourceObject: Clone + Send + Sync + 'static {
    /// Unique identifier of the object
    fn uid(&self) -> &str;
    /// Object name
    fn name(&self) -> &str;
    /// Object namespace, if namespaced
    fn namespace(&self) -> Option<&str>;
}

/// Fetches the current external representation of one object.
///
/// An absent object surfaces as [`Error::NotFound`]; any other failure is
/// treated as transient by the reconciler.
#[async_trait]
pub trait Fetch<R>: Send + Sync {
    async fn fetch(&self, namespace: &str, name: &str) -> Result<R>;
}

/// Internal system of record for one resource kind, keyed by UID.
///
/// All operations must be safe under concurrent access from multiple
/// reconciliation workers.
#[async_trait]
pub trait Store<R>: Send + Sync {
    /// Look up a mirrored object; [`Error::NotFound`] when absent
    async fn get(&self, uid: &str) -> Result<R>;
    /// Insert a new object; fails when the UID already exists
    async fn insert(&self, obj: R) -> Result<()>;
    /// Overwrite an existing object
    async fn update(&self, obj: R) -> Result<()>;
    /// Remove an object by name; a no-op when absent
    async fn delete(&self, name: &str) -> Result<()>;
}

/// Object-safe reconciliation entry point, one per registered kind
#[async_trait]
pub trait Reconcile: Send + Sync {
    /// Run one reconciliation pass for the request.
    ///
    /// Transient failures are returned as `Err`; the driving controller
    /// logs them and requeues per [`Reconcile::error_outcome`].
    async fn reconcile(&self, req: ReconcileRequest) -> Result<ReconcileOutcome>;

    /// Requeue directive accompanying a failed pass
    fn error_outcome(&self, err: &Error) -> ReconcileOutcome;
}

// =============================================================================
// Kind Reconciler
// =============================================================================

/// The generic per-kind reconciler: fetch, diff against the store, apply.
pub struct KindReconciler<R> {
    fetcher: Arc<dyn Fetch<R>>,
    store: Arc<dyn Store<R>>,
    backoff: BackoffPolicy,
}

impl<R: ResourceObject> KindReconciler<R> {
    pub fn new(
        fetcher: Arc<dyn Fetch<R>>,
        store: Arc<dyn Store<R>>,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            fetcher,
            store,
            backoff,
        }
    }
}

#[async_trait]
impl<R: ResourceObject> Reconcile for KindReconciler<R> {
    async fn reconcile(&self, req: ReconcileRequest) -> Result<ReconcileOutcome> {
        let fetched = match self.fetcher.fetch(&req.namespace, &req.name).await {
            Ok(obj) => obj,
            Err(err) if err.is_not_found() => {
                // Externally deleted: drop the mirrored copy, if any.
                debug!(namespace = %req.namespace, name = %req.name, "object gone, removing store entry");
                self.store.delete(&req.name).await?;
                return Ok(ReconcileOutcome::Done);
            }
            Err(err) => return Err(err),
        };

        match self.store.get(fetched.uid()).await {
            Ok(_) => {}
            Err(err) if err.is_not_found() => {
                debug!(namespace = %req.namespace, name = %req.name, uid = %fetched.uid(), "mirroring new object");
                self.store.insert(fetched.clone()).await?;
            }
            Err(err) => return Err(err),
        }

        self.store.update(fetched).await?;
        Ok(ReconcileOutcome::Done)
    }

    fn error_outcome(&self, _err: &Error) -> ReconcileOutcome {
        ReconcileOutcome::RequeueAfter(self.backoff.next_delay())
    }
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// Concurrent in-memory [`Store`] keyed by UID
#[derive(Debug)]
pub struct MemoryStore<R> {
    kind: String,
    by_uid: DashMap<String, R>,
}

impl<R> MemoryStore<R> {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            by_uid: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_uid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_uid.is_empty()
    }
}

#[async_trait]
impl<R: ResourceObject> Store<R> for MemoryStore<R> {
    async fn get(&self, uid: &str) -> Result<R> {
        self.by_uid
            .get(uid)
            .map(|entry| entry.clone())
            .ok_or_else(|| Error::not_found(&self.kind, uid))
    }

    async fn insert(&self, obj: R) -> Result<()> {
        let uid = obj.uid().to_string();
        if self.by_uid.contains_key(&uid) {
            return Err(Error::ResourceExists {
                kind: self.kind.clone(),
                name: uid,
            });
        }
        self.by_uid.insert(uid, obj);
        Ok(())
    }

    async fn update(&self, obj: R) -> Result<()> {
        self.by_uid.insert(obj.uid().to_string(), obj);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.by_uid.retain(|_, obj| obj.name() != name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq)]
    struct TestObj {
        uid: String,
        namespace: String,
        name: String,
        payload: String,
    }

    impl TestObj {
        fn influx() -> Self {
            Self {
                uid: "abc123".into(),
                namespace: "default".into(),
                name: "influx-1".into(),
                payload: "v1".into(),
            }
        }
    }

    impl ResourceObject for TestObj {
        fn uid(&self) -> &str {
            &self.uid
        }
        fn name(&self) -> &str {
            &self.name
        }
        fn namespace(&self) -> Option<&str> {
            Some(&self.namespace)
        }
    }

    /// Fetcher returning scripted responses in order
    struct ScriptedFetcher {
        responses: Mutex<VecDeque<Result<TestObj>>>,
    }

    impl ScriptedFetcher {
        fn new(responses: Vec<Result<TestObj>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
            })
        }
    }

    #[async_trait]
    impl Fetch<TestObj> for ScriptedFetcher {
        async fn fetch(&self, _namespace: &str, _name: &str) -> Result<TestObj> {
            self.responses
                .lock()
                .pop_front()
                .expect("fetch called more times than scripted")
        }
    }

    /// Store wrapper recording operation order
    struct RecordingStore {
        inner: MemoryStore<TestObj>,
        ops: Mutex<Vec<&'static str>>,
        fail_get: Mutex<Option<Error>>,
        fail_update: Mutex<Option<Error>>,
    }

    impl RecordingStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                inner: MemoryStore::new("datasource"),
                ops: Mutex::new(Vec::new()),
                fail_get: Mutex::new(None),
                fail_update: Mutex::new(None),
            })
        }

        fn ops(&self) -> Vec<&'static str> {
            self.ops.lock().clone()
        }
    }

    #[async_trait]
    impl Store<TestObj> for RecordingStore {
        async fn get(&self, uid: &str) -> Result<TestObj> {
            self.ops.lock().push("get");
            if let Some(err) = self.fail_get.lock().take() {
                return Err(err);
            }
            self.inner.get(uid).await
        }
        async fn insert(&self, obj: TestObj) -> Result<()> {
            self.ops.lock().push("insert");
            self.inner.insert(obj).await
        }
        async fn update(&self, obj: TestObj) -> Result<()> {
            self.ops.lock().push("update");
            if let Some(err) = self.fail_update.lock().take() {
                return Err(err);
            }
            self.inner.update(obj).await
        }
        async fn delete(&self, name: &str) -> Result<()> {
            self.ops.lock().push("delete");
            self.inner.delete(name).await
        }
    }

    fn reconciler(
        fetcher: Arc<ScriptedFetcher>,
        store: Arc<RecordingStore>,
    ) -> KindReconciler<TestObj> {
        KindReconciler::new(fetcher, store, BackoffPolicy::default())
    }

    #[tokio::test]
    async fn test_full_lifecycle_scenario() {
        // Kind "datasource", namespace "default", name "influx-1", UID "abc123".
        let obj = TestObj::influx();
        let store = RecordingStore::new();
        let req = ReconcileRequest::new("default", "influx-1");

        // First pass: fetch succeeds, store is empty -> insert then update.
        let fetcher = ScriptedFetcher::new(vec![Ok(obj.clone())]);
        let rec = reconciler(fetcher, store.clone());
        let outcome = rec.reconcile(req.clone()).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Done);
        assert_eq!(store.ops(), vec!["get", "insert", "update"]);
        assert_eq!(store.inner.len(), 1);
        assert_eq!(store.inner.get("abc123").await.unwrap(), obj);

        // Second pass with identical external state: get succeeds,
        // update overwrites with identical data.
        store.ops.lock().clear();
        let fetcher = ScriptedFetcher::new(vec![Ok(obj.clone())]);
        let rec = reconciler(fetcher, store.clone());
        let outcome = rec.reconcile(req.clone()).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Done);
        assert_eq!(store.ops(), vec!["get", "update"]);
        assert_eq!(store.inner.len(), 1);
        assert_eq!(store.inner.get("abc123").await.unwrap(), obj);

        // Third pass after external deletion: fetch is NotFound -> delete.
        store.ops.lock().clear();
        let fetcher =
            ScriptedFetcher::new(vec![Err(Error::not_found("datasource", "influx-1"))]);
        let rec = reconciler(fetcher, store.clone());
        let outcome = rec.reconcile(req).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Done);
        assert_eq!(store.ops(), vec!["delete"]);
        assert!(store.inner.is_empty());
    }

    #[tokio::test]
    async fn test_not_found_with_empty_store_is_noop() {
        let store = RecordingStore::new();
        let fetcher =
            ScriptedFetcher::new(vec![Err(Error::not_found("datasource", "influx-1"))]);
        let rec = reconciler(fetcher, store.clone());

        let outcome = rec
            .reconcile(ReconcileRequest::new("default", "influx-1"))
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Done);
        assert!(store.inner.is_empty());
    }

    #[tokio::test]
    async fn test_transient_fetch_error_requeues() {
        let store = RecordingStore::new();
        let fetcher = ScriptedFetcher::new(vec![Err(Error::Internal("watch transport down".into()))]);
        let rec = reconciler(fetcher, store.clone());

        let err = rec
            .reconcile(ReconcileRequest::new("default", "influx-1"))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Internal(_));
        assert_eq!(
            rec.error_outcome(&err),
            ReconcileOutcome::RequeueAfter(Duration::from_secs(60))
        );
        // No store mutation on a failed fetch.
        assert!(store.ops().is_empty());
    }

    #[tokio::test]
    async fn test_transient_store_get_error_requeues() {
        let store = RecordingStore::new();
        *store.fail_get.lock() = Some(Error::Internal("store unavailable".into()));
        let fetcher = ScriptedFetcher::new(vec![Ok(TestObj::influx())]);
        let rec = reconciler(fetcher, store.clone());

        let err = rec
            .reconcile(ReconcileRequest::new("default", "influx-1"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.ops(), vec!["get"]);
        assert!(store.inner.is_empty());
    }

    #[tokio::test]
    async fn test_transient_update_error_requeues() {
        let store = RecordingStore::new();
        *store.fail_update.lock() = Some(Error::Internal("store unavailable".into()));
        let fetcher = ScriptedFetcher::new(vec![Ok(TestObj::influx())]);
        let rec = reconciler(fetcher, store.clone());

        let err = rec
            .reconcile(ReconcileRequest::new("default", "influx-1"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.ops(), vec!["get", "insert", "update"]);
    }

    #[tokio::test]
    async fn test_configurable_backoff_delay() {
        let store = RecordingStore::new();
        let fetcher = ScriptedFetcher::new(vec![]);
        let rec = KindReconciler::new(
            fetcher,
            store,
            BackoffPolicy::fixed(Duration::from_secs(5)),
        );

        let err = Error::Internal("boom".into());
        assert_eq!(
            rec.error_outcome(&err),
            ReconcileOutcome::RequeueAfter(Duration::from_secs(5))
        );
    }

    #[tokio::test]
    async fn test_memory_store_semantics() {
        let store: MemoryStore<TestObj> = MemoryStore::new("datasource");
        let obj = TestObj::influx();

        assert_matches!(store.get("abc123").await, Err(Error::NotFound { .. }));

        store.insert(obj.clone()).await.unwrap();
        assert_matches!(
            store.insert(obj.clone()).await,
            Err(Error::ResourceExists { .. })
        );

        let mut updated = obj.clone();
        updated.payload = "v2".into();
        store.update(updated.clone()).await.unwrap();
        assert_eq!(store.get("abc123").await.unwrap(), updated);
        assert_eq!(store.len(), 1);

        // Delete by name, and deleting an absent name is a no-op.
        store.delete("influx-1").await.unwrap();
        assert!(store.is_empty());
        store.delete("influx-1").await.unwrap();
    }
}
