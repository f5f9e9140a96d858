//! Shared fixtures: a scripted adapter and a single-kind harness.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tether_reconciler::{
    ApplyResponse, BackoffPolicy, DeleteResponse, DependencyResolver, InMemoryEventRecorder,
    InMemoryRecordStore, ObjectKey, Operation, ProvisionState, ReconcileOutcome, Reconciler, ReconcilerConfig,
    Record, RecordStore, ResourceAdapter, ResourceDefinition, ResourceSpec, ShutdownSignal, Status,
    VerifyResponse,
};
use tokio::sync::Mutex;

pub const KIND: &str = "Widget";
pub const FINALIZER: &str = "widget.finalizers.tether.io";
pub const MIN_BACKOFF: Duration = Duration::from_millis(10);
pub const MAX_BACKOFF: Duration = Duration::from_millis(160);

/// Adapter that replays scripted responses per operation.
///
/// Unscripted calls fall back to success: create and update succeed,
/// verify reports Ready, delete succeeds.
#[derive(Default)]
pub struct ScriptedAdapter {
    creates: Mutex<VecDeque<ApplyResponse<String>>>,
    updates: Mutex<VecDeque<ApplyResponse<String>>>,
    verifies: Mutex<VecDeque<VerifyResponse<String>>>,
    deletes: Mutex<VecDeque<DeleteResponse>>,
    calls: Mutex<Vec<Operation>>,
    dependencies_seen: Mutex<Vec<usize>>,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn push_create(&self, response: ApplyResponse<String>) {
        self.creates.lock().await.push_back(response);
    }

    pub async fn push_update(&self, response: ApplyResponse<String>) {
        self.updates.lock().await.push_back(response);
    }

    pub async fn push_verify(&self, response: VerifyResponse<String>) {
        self.verifies.lock().await.push_back(response);
    }

    pub async fn push_delete(&self, response: DeleteResponse) {
        self.deletes.lock().await.push_back(response);
    }

    /// Every call sleeps this long before answering.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.lock().await = Some(delay);
    }

    pub async fn calls(&self) -> Vec<Operation> {
        self.calls.lock().await.clone()
    }

    pub async fn count(&self, operation: Operation) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|op| **op == operation)
            .count()
    }

    /// Number of resolved dependencies passed to each call.
    pub async fn dependencies_seen(&self) -> Vec<usize> {
        self.dependencies_seen.lock().await.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, operation: Operation, resource: ResourceSpec<'_, String, String>) {
        self.calls.lock().await.push(operation);
        self.dependencies_seen
            .lock()
            .await
            .push(resource.dependencies.len());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ResourceAdapter<String, String> for ScriptedAdapter {
    async fn create(&self, resource: ResourceSpec<'_, String, String>) -> ApplyResponse<String> {
        self.enter(Operation::Create, resource).await;
        let response = self.creates.lock().await.pop_front();
        self.leave();
        response.unwrap_or_else(ApplyResponse::succeeded)
    }

    async fn update(&self, resource: ResourceSpec<'_, String, String>) -> ApplyResponse<String> {
        self.enter(Operation::Update, resource).await;
        let response = self.updates.lock().await.pop_front();
        self.leave();
        response.unwrap_or_else(ApplyResponse::succeeded)
    }

    async fn verify(&self, resource: ResourceSpec<'_, String, String>) -> VerifyResponse<String> {
        self.enter(Operation::Verify, resource).await;
        let response = self.verifies.lock().await.pop_front();
        self.leave();
        response.unwrap_or_else(VerifyResponse::ready)
    }

    async fn delete(&self, resource: ResourceSpec<'_, String, String>) -> DeleteResponse {
        self.enter(Operation::Delete, resource).await;
        let response = self.deletes.lock().await.pop_front();
        self.leave();
        response.unwrap_or(DeleteResponse::Succeeded)
    }
}

pub fn test_config() -> ReconcilerConfig {
    ReconcilerConfig::default()
        .with_backoff(BackoffPolicy::new(MIN_BACKOFF, MAX_BACKOFF, 2))
        .with_adapter_timeout(Duration::from_secs(5))
}

/// One kind wired to an in-memory store and recorder.
pub struct Harness {
    pub store: Arc<InMemoryRecordStore<String, String>>,
    pub adapter: Arc<ScriptedAdapter>,
    pub recorder: Arc<InMemoryEventRecorder>,
    pub reconciler: Reconciler<String, String>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ReconcilerConfig) -> Self {
        Self::build(config, None)
    }

    pub fn with_resolver(resolver: Arc<dyn DependencyResolver<String, String>>) -> Self {
        Self::build(test_config(), Some(resolver))
    }

    fn build(
        config: ReconcilerConfig,
        resolver: Option<Arc<dyn DependencyResolver<String, String>>>,
    ) -> Self {
        let store = Arc::new(InMemoryRecordStore::<String, String>::new());
        let adapter = ScriptedAdapter::new();
        let recorder = Arc::new(InMemoryEventRecorder::new());

        let builder = Reconciler::builder(ResourceDefinition::new(KIND))
            .with_adapter(adapter.clone())
            .with_store(store.clone())
            .with_recorder(recorder.clone())
            .with_config(config);
        let builder = match resolver {
            Some(resolver) => builder.with_resolver(resolver),
            None => builder,
        };

        let reconciler = builder.build().expect("harness reconciler builds");
        Self {
            store,
            adapter,
            recorder,
            reconciler,
        }
    }

    /// Store a fresh record and return its key.
    pub async fn seed(&self, name: &str, spec: &str) -> ObjectKey {
        let key = ObjectKey::new("default", name);
        let record = self
            .reconciler
            .definition()
            .new_record(key.clone(), spec.to_string());
        self.store.create(record).await.expect("seed record");
        key
    }

    /// Store a record that an earlier pass already took to `status`.
    pub async fn seed_with_status(&self, name: &str, status: Status<String>) -> ObjectKey {
        let key = ObjectKey::new("default", name);
        let mut record = self
            .reconciler
            .definition()
            .new_record(key.clone(), name.to_string());
        record.meta.add_finalizer(FINALIZER);
        record.status = Some(status);
        self.store.create(record).await.expect("seed record");
        key
    }

    pub async fn pass(&self, key: &ObjectKey) -> ReconcileOutcome {
        self.reconciler
            .reconcile_one(key, &ShutdownSignal::never())
            .await
    }

    pub async fn record(&self, key: &ObjectKey) -> Option<Record<String, String>> {
        self.store.get(key).await.expect("store read")
    }

    pub async fn status(&self, key: &ObjectKey) -> Option<Status<String>> {
        self.record(key).await.and_then(|r| r.status)
    }

    /// Stored state, `Uninitialized` if no status was written yet.
    pub async fn state(&self, key: &ObjectKey) -> ProvisionState {
        self.status(key).await.map_or_else(ProvisionState::default, |s| s.state)
    }

    pub async fn payload(&self, key: &ObjectKey) -> Option<String> {
        self.status(key).await.and_then(|s| s.payload)
    }

    pub async fn has_finalizer(&self, key: &ObjectKey) -> bool {
        self.record(key)
            .await
            .is_some_and(|r| r.meta.has_finalizer(FINALIZER))
    }

    pub async fn reasons(&self, key: &ObjectKey) -> Vec<String> {
        self.recorder.reasons_for(key).await
    }
}
