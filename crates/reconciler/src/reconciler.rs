//! Reconciler implementation.
//!
//! One [`Reconciler`] drives every record of one kind. A pass re-derives
//! what to do from the stored status and the deletion flag alone, so passes
//! are idempotent and may be repeated at any time.

use std::future::Future;
use std::sync::Arc;

use tether_core::{
    AdapterError, Error, ObjectKey, Operation, ProvisionState, Record, Result, Status,
};
use tracing::{Instrument, debug, error, info, info_span, warn};
use ulid::Ulid;

use crate::adapter::{ResourceAdapter, ResourceSpec};
use crate::backoff::BackoffTracker;
use crate::config::{ReconcilerConfig, as_millis};
use crate::definition::ResourceDefinition;
use crate::dependency::{DependencyResolver, DependencySet, NoDependencies, ResolveMode};
use crate::events::{EventRecorder, EventType, ReconcileEvent, TracingEventRecorder, reasons};
use crate::shutdown::ShutdownSignal;
use crate::store::RecordStore;
use crate::types::{
    ApplyResponse, DeleteResponse, DesiredSpec, ReconcileOutcome, StatusPayload, VerifyResponse,
};

/// Where a single pass left the record.
#[derive(Debug)]
enum Step {
    /// Backend matches the desired state.
    Converged,
    /// Record is gone or needs nothing from us.
    Gone,
    /// Progress depends on the backend or a dependency; look again later.
    Waiting(&'static str),
    Failed(Error),
}

/// Reconciler for one resource kind.
pub struct Reconciler<S: DesiredSpec, P: StatusPayload> {
    definition: ResourceDefinition<S, P>,
    adapter: Arc<dyn ResourceAdapter<S, P>>,
    resolver: Arc<dyn DependencyResolver<S, P>>,
    store: Arc<dyn RecordStore<S, P>>,
    recorder: Arc<dyn EventRecorder>,
    config: ReconcilerConfig,
    backoff: BackoffTracker,
}

impl<S: DesiredSpec, P: StatusPayload> Reconciler<S, P> {
    /// Start building a reconciler for `definition`.
    pub fn builder(definition: ResourceDefinition<S, P>) -> ReconcilerBuilder<S, P> {
        ReconcilerBuilder::new(definition)
    }

    #[must_use]
    pub const fn definition(&self) -> &ResourceDefinition<S, P> {
        &self.definition
    }

    #[must_use]
    pub const fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn RecordStore<S, P>> {
        &self.store
    }

    /// Run one pass for `key`, retrying the whole pass on storage
    /// conflicts.
    pub async fn reconcile_one(&self, key: &ObjectKey, shutdown: &ShutdownSignal) -> ReconcileOutcome {
        let span = info_span!(
            "reconcile",
            pass_id = %Ulid::new(),
            kind = %self.definition.kind(),
            key = %key
        );
        self.reconcile_with_retries(key, shutdown)
            .instrument(span)
            .await
    }

    async fn reconcile_with_retries(&self, key: &ObjectKey, shutdown: &ShutdownSignal) -> ReconcileOutcome {
        let mut conflicts: u32 = 0;
        loop {
            let step = self.run_pass(key, shutdown).await;
            match step {
                Step::Failed(err) if err.is_conflict() => {
                    if conflicts >= self.config.max_conflict_retries {
                        let delay = self.backoff.next(key).await;
                        debug!(
                            conflicts,
                            delay_ms = as_millis(delay),
                            "Conflict retries exhausted, requeueing"
                        );
                        return ReconcileOutcome::RequeueAfter(delay);
                    }
                    conflicts = conflicts.saturating_add(1);
                    debug!(attempt = conflicts, error = %err, "Storage conflict, re-running pass");
                }
                other => return self.finish(key, other).await,
            }
        }
    }

    async fn finish(&self, key: &ObjectKey, step: Step) -> ReconcileOutcome {
        match step {
            Step::Converged => {
                self.backoff.reset(key).await;
                match self.config.resync_interval {
                    Some(interval) => {
                        debug!(delay_ms = as_millis(interval), "Converged, scheduling resync");
                        ReconcileOutcome::RequeueAfter(interval)
                    }
                    None => {
                        debug!("Converged");
                        ReconcileOutcome::Done
                    }
                }
            }
            Step::Gone => {
                self.backoff.reset(key).await;
                ReconcileOutcome::Done
            }
            Step::Waiting(reason) => {
                let delay = self.backoff.next(key).await;
                debug!(reason, delay_ms = as_millis(delay), "Requeueing");
                ReconcileOutcome::RequeueAfter(delay)
            }
            Step::Failed(Error::Cancelled) => {
                info!("Pass cancelled by shutdown");
                ReconcileOutcome::Failed {
                    error: Error::Cancelled,
                    requeue_after: None,
                }
            }
            Step::Failed(err) if err.is_transient() => {
                let delay = self.backoff.next(key).await;
                warn!(error = %err, delay_ms = as_millis(delay), "Pass failed, will retry");
                ReconcileOutcome::Failed {
                    error: err,
                    requeue_after: Some(delay),
                }
            }
            Step::Failed(err) if err.is_retryable() => {
                // A backend refusal is only re-checked at the ceiling delay.
                let delay = self.backoff.ceiling(key).await;
                error!(error = %err, delay_ms = as_millis(delay), "Backend refused, will re-check");
                ReconcileOutcome::Failed {
                    error: err,
                    requeue_after: Some(delay),
                }
            }
            Step::Failed(err) => {
                self.backoff.reset(key).await;
                error!(error = %err, "Pass failed, not retrying");
                self.event(key, EventType::Warning, reasons::RECONCILE_FAILED, err.to_string())
                    .await;
                ReconcileOutcome::Failed {
                    error: err,
                    requeue_after: None,
                }
            }
        }
    }

    async fn run_pass(&self, key: &ObjectKey, shutdown: &ShutdownSignal) -> Step {
        match self.try_pass(key, shutdown).await {
            Ok(step) => step,
            Err(err) => Step::Failed(err),
        }
    }

    async fn try_pass(&self, key: &ObjectKey, shutdown: &ShutdownSignal) -> Result<Step> {
        if shutdown.is_shutdown() {
            return Err(Error::Cancelled);
        }

        let Some(mut record) = self.store.get(key).await? else {
            debug!("Record not found, nothing to do");
            return Ok(Step::Gone);
        };
        let status = self.definition.accessor().get_status(&record)?;
        let gate = self.definition.finalizer_gate();

        if record.is_deletion_requested() {
            if !gate.has_finalizer(&record) {
                debug!("Deletion requested and no finalizer held, nothing to do");
                return Ok(Step::Gone);
            }
            return self.delete_path(record, status, shutdown).await;
        }

        if gate.add_finalizer(&mut record) {
            // A fresh record gets its zero status in the same write.
            self.definition
                .accessor()
                .set_status(&mut record, status.clone())?;
            record = self.store.update(record).await?;
            debug!(finalizer = gate.name(), "Finalizer added");
        }

        let dependencies = match self.resolver.dependencies(&record, ResolveMode::Strict).await {
            Ok(dependencies) => dependencies,
            Err(Error::DependencyNotFound { kind, key: missing }) => {
                let message = format!("dependency {kind} '{missing}' does not exist");
                self.defer(key, message).await;
                return Ok(Step::Waiting("dependency missing"));
            }
            Err(err) => return Err(err),
        };
        if !dependencies.all_ready() {
            let message = format!("waiting on {}", dependencies.describe_not_ready());
            self.defer(key, message).await;
            return Ok(Step::Waiting("dependencies not ready"));
        }

        debug!(state = %status.state, "Dispatching");
        match status.state {
            ProvisionState::Uninitialized | ProvisionState::Provisioning => {
                self.apply(record, &dependencies, Operation::Create, shutdown)
                    .await
            }
            ProvisionState::AwaitingVerification
            | ProvisionState::Ready
            | ProvisionState::Deleting => {
                self.verify(record, status, &dependencies, shutdown).await
            }
        }
    }

    /// Create or update, then record what the backend reported.
    async fn apply(
        &self,
        record: Record<S, P>,
        dependencies: &DependencySet,
        operation: Operation,
        shutdown: &ShutdownSignal,
    ) -> Result<Step> {
        let key = record.key().clone();
        let resource = ResourceSpec::new(&record, dependencies);
        let response: ApplyResponse<P> = if operation == Operation::Update {
            self.call(shutdown, self.adapter.update(resource)).await?
        } else {
            self.call(shutdown, self.adapter.create(resource)).await?
        };
        debug!(%operation, result = %response.result(), "Applied");

        let (done_reason, failed_reason) = if operation == Operation::Update {
            (reasons::UPDATED, reasons::UPDATE_FAILED)
        } else {
            (reasons::CREATED, reasons::CREATE_FAILED)
        };

        match response {
            ApplyResponse::Succeeded(payload) => {
                let status = Status::new(ProvisionState::Ready).with_optional_payload(payload);
                self.persist(record, status).await?;
                info!(%operation, state = %ProvisionState::Ready, "Resource ready");
                self.event(&key, EventType::Normal, done_reason, format!("{operation} succeeded"))
                    .await;
                self.event(&key, EventType::Normal, reasons::READY, "backend resource is ready")
                    .await;
                Ok(Step::Converged)
            }
            ApplyResponse::AwaitingVerification(payload) => {
                let status = Status::new(ProvisionState::AwaitingVerification)
                    .with_optional_payload(payload);
                self.persist(record, status).await?;
                info!(%operation, state = %ProvisionState::AwaitingVerification, "Awaiting verification");
                self.event(
                    &key,
                    EventType::Normal,
                    reasons::AWAITING_VERIFICATION,
                    format!("{operation} accepted, waiting for the backend"),
                )
                .await;
                Ok(Step::Waiting("awaiting verification"))
            }
            ApplyResponse::Error(source) => {
                self.event(&key, EventType::Warning, failed_reason, source.to_string())
                    .await;
                Err(Error::adapter(operation, source))
            }
        }
    }

    async fn verify(
        &self,
        record: Record<S, P>,
        status: Status<P>,
        dependencies: &DependencySet,
        shutdown: &ShutdownSignal,
    ) -> Result<Step> {
        let key = record.key().clone();
        let response: VerifyResponse<P> = self
            .call(shutdown, self.adapter.verify(ResourceSpec::new(&record, dependencies)))
            .await?;
        let response = response.not_found_as_missing();
        debug!(result = %response.result(), "Verified");

        match response {
            VerifyResponse::Missing => {
                self.persist(record, Status::new(ProvisionState::Uninitialized))
                    .await?;
                info!(state = %ProvisionState::Uninitialized, "Backend resource missing, will create");
                Ok(Step::Waiting("backend resource missing"))
            }
            VerifyResponse::RecreateRequired => {
                self.persist(record, Status::new(ProvisionState::Provisioning))
                    .await?;
                info!(state = %ProvisionState::Provisioning, "Backend resource must be recreated");
                self.event(
                    &key,
                    EventType::Normal,
                    reasons::RECREATING,
                    "backend resource must be recreated",
                )
                .await;
                Ok(Step::Waiting("recreate required"))
            }
            VerifyResponse::UpdateRequired => {
                self.apply(record, dependencies, Operation::Update, shutdown)
                    .await
            }
            VerifyResponse::Provisioning(payload) | VerifyResponse::Deleting(payload) => {
                if let Some(payload) = payload.filter(|p| status.payload.as_ref() != Some(p)) {
                    self.persist(record, Status::new(status.state).with_payload(payload))
                        .await?;
                }
                Ok(Step::Waiting("backend still converging"))
            }
            VerifyResponse::Ready(payload) => {
                let payload_changed = payload
                    .as_ref()
                    .is_some_and(|p| status.payload.as_ref() != Some(p));
                let became_ready = !status.state.is_ready();
                if became_ready || payload_changed {
                    let status = Status::new(ProvisionState::Ready).with_optional_payload(payload);
                    self.persist(record, status).await?;
                }
                if became_ready {
                    info!(state = %ProvisionState::Ready, "Resource ready");
                    self.event(&key, EventType::Normal, reasons::READY, "backend resource is ready")
                        .await;
                }
                Ok(Step::Converged)
            }
            VerifyResponse::Error(source) => {
                self.event(&key, EventType::Warning, reasons::VERIFY_FAILED, source.to_string())
                    .await;
                Err(Error::adapter(Operation::Verify, source))
            }
        }
    }

    /// Tear down the backend resource, then release the finalizer.
    async fn delete_path(
        &self,
        record: Record<S, P>,
        status: Status<P>,
        shutdown: &ShutdownSignal,
    ) -> Result<Step> {
        let key = record.key().clone();

        // Dependencies that are already gone must not hold the delete.
        let dependencies = self
            .resolver
            .dependencies(&record, ResolveMode::SkipMissing)
            .await?;
        if !dependencies.all_ready() {
            let message = format!("delete waiting on {}", dependencies.describe_not_ready());
            self.defer(&key, message).await;
            return Ok(Step::Waiting("dependencies not ready"));
        }

        if status.state == ProvisionState::Deleting {
            let response: VerifyResponse<P> = self
                .call(shutdown, self.adapter.verify(ResourceSpec::new(&record, &dependencies)))
                .await?;
            let response = response.not_found_as_missing();
            debug!(result = %response.result(), "Verified pending delete");

            return match response {
                VerifyResponse::Missing => self.finalize(record).await,
                VerifyResponse::Error(source) => {
                    self.event(&key, EventType::Warning, reasons::VERIFY_FAILED, source.to_string())
                        .await;
                    Err(Error::adapter(Operation::Verify, source))
                }
                _ => Ok(Step::Waiting("backend deletion in progress")),
            };
        }

        let response: DeleteResponse = self
            .call(shutdown, self.adapter.delete(ResourceSpec::new(&record, &dependencies)))
            .await?;
        let response = response.not_found_as_already_deleted();
        debug!(result = %response.result(), "Deleted");

        match response {
            DeleteResponse::AlreadyDeleted | DeleteResponse::Succeeded => self.finalize(record).await,
            DeleteResponse::AwaitingVerification => {
                self.persist(record, Status::new(ProvisionState::Deleting))
                    .await?;
                info!(state = %ProvisionState::Deleting, "Backend deletion in progress");
                self.event(&key, EventType::Normal, reasons::DELETING, "backend deletion started")
                    .await;
                Ok(Step::Waiting("awaiting deletion"))
            }
            DeleteResponse::Error(source) => {
                self.event(&key, EventType::Warning, reasons::DELETE_FAILED, source.to_string())
                    .await;
                Err(Error::adapter(Operation::Delete, source))
            }
        }
    }

    async fn finalize(&self, mut record: Record<S, P>) -> Result<Step> {
        let key = record.key().clone();
        let gate = self.definition.finalizer_gate();
        gate.remove_finalizer(&mut record);
        self.store.update(record).await?;
        info!(finalizer = gate.name(), "Finalizer removed, deletion complete");
        self.event(&key, EventType::Normal, reasons::DELETED, "backend resource deleted")
            .await;
        Ok(Step::Gone)
    }

    /// Write `status` into the record and store it.
    async fn persist(&self, mut record: Record<S, P>, status: Status<P>) -> Result<Record<S, P>> {
        self.definition.accessor().set_status(&mut record, status)?;
        self.store.update(record).await
    }

    /// Run one adapter call under the configured deadline. Shutdown wins
    /// over a pending call; an expired deadline becomes an adapter error.
    async fn call<T, F>(&self, shutdown: &ShutdownSignal, call: F) -> Result<T>
    where
        F: Future<Output = T>,
        T: From<AdapterError>,
    {
        let mut signal = shutdown.clone();
        let timeout = self.config.adapter_timeout;

        tokio::select! {
            biased;
            () = signal.cancelled() => Err(Error::Cancelled),
            result = tokio::time::timeout(timeout, call) => Ok(result.unwrap_or_else(|_| {
                warn!(timeout_ms = as_millis(timeout), "Adapter call timed out");
                T::from(AdapterError::TimedOut { timeout_ms: as_millis(timeout) })
            })),
        }
    }

    async fn defer(&self, key: &ObjectKey, message: String) {
        debug!(reason = %message, "Deferring until dependencies are ready");
        self.event(key, EventType::Normal, reasons::DEPENDENCIES_NOT_READY, message)
            .await;
    }

    async fn event(
        &self,
        key: &ObjectKey,
        event_type: EventType,
        reason: &str,
        message: impl Into<String> + Send,
    ) {
        let event = ReconcileEvent::new(
            self.definition.kind(),
            key.clone(),
            event_type,
            reason,
            message,
        );
        self.recorder.record(event).await;
    }
}

/// Builder for Reconciler.
pub struct ReconcilerBuilder<S: DesiredSpec, P: StatusPayload> {
    definition: ResourceDefinition<S, P>,
    adapter: Option<Arc<dyn ResourceAdapter<S, P>>>,
    resolver: Option<Arc<dyn DependencyResolver<S, P>>>,
    store: Option<Arc<dyn RecordStore<S, P>>>,
    recorder: Option<Arc<dyn EventRecorder>>,
    config: ReconcilerConfig,
}

impl<S: DesiredSpec, P: StatusPayload> ReconcilerBuilder<S, P> {
    pub fn new(definition: ResourceDefinition<S, P>) -> Self {
        Self {
            definition,
            adapter: None,
            resolver: None,
            store: None,
            recorder: None,
            config: ReconcilerConfig::default(),
        }
    }

    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn ResourceAdapter<S, P>>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Defaults to [`NoDependencies`].
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn DependencyResolver<S, P>>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn RecordStore<S, P>>) -> Self {
        self.store = Some(store);
        self
    }

    /// Defaults to [`TracingEventRecorder`].
    #[must_use]
    pub fn with_recorder(mut self, recorder: Arc<dyn EventRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the reconciler.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the adapter or store is missing or the
    /// configuration does not validate.
    pub fn build(self) -> Result<Reconciler<S, P>> {
        let adapter = self
            .adapter
            .ok_or_else(|| Error::invalid_config("adapter is required"))?;
        let store = self
            .store
            .ok_or_else(|| Error::invalid_config("record store is required"))?;
        self.config.validate()?;

        Ok(Reconciler {
            definition: self.definition,
            adapter,
            resolver: self.resolver.unwrap_or_else(|| Arc::new(NoDependencies)),
            store,
            recorder: self
                .recorder
                .unwrap_or_else(|| Arc::new(TracingEventRecorder)),
            backoff: BackoffTracker::new(self.config.backoff),
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use crate::backoff::BackoffPolicy;
    use crate::events::InMemoryEventRecorder;
    use crate::store::InMemoryRecordStore;

    /// Succeeds on create; counts calls.
    #[derive(Default)]
    struct CountingAdapter {
        creates: Mutex<u32>,
    }

    #[async_trait]
    impl ResourceAdapter<String, String> for CountingAdapter {
        async fn create(&self, resource: ResourceSpec<'_, String, String>) -> ApplyResponse<String> {
            let mut creates = self.creates.lock().await;
            *creates = creates.saturating_add(1);
            ApplyResponse::succeeded_with_status(format!("id-{}", resource.spec()))
        }

        async fn verify(&self, _resource: ResourceSpec<'_, String, String>) -> VerifyResponse<String> {
            VerifyResponse::ready()
        }

        async fn delete(&self, _resource: ResourceSpec<'_, String, String>) -> DeleteResponse {
            DeleteResponse::Succeeded
        }
    }

    /// Store whose updates always conflict.
    struct ConflictingStore {
        inner: InMemoryRecordStore<String, String>,
    }

    #[async_trait]
    impl RecordStore<String, String> for ConflictingStore {
        async fn get(&self, key: &ObjectKey) -> Result<Option<Record<String, String>>> {
            self.inner.get(key).await
        }

        async fn update(&self, record: Record<String, String>) -> Result<Record<String, String>> {
            Err(Error::conflict(record.key().to_string(), 1, 2))
        }

        async fn delete(&self, key: &ObjectKey) -> Result<()> {
            self.inner.delete(key).await
        }
    }

    fn definition() -> ResourceDefinition<String, String> {
        ResourceDefinition::new("Queue")
    }

    fn config() -> ReconcilerConfig {
        ReconcilerConfig::default().with_backoff(BackoffPolicy::new(
            Duration::from_millis(10),
            Duration::from_millis(80),
            2,
        ))
    }

    #[test]
    fn test_builder_requires_adapter_and_store() {
        let missing_adapter = Reconciler::builder(definition())
            .with_store(Arc::new(InMemoryRecordStore::<String, String>::new()))
            .build();
        assert!(matches!(missing_adapter, Err(Error::InvalidConfig { .. })));

        let missing_store = Reconciler::builder(definition())
            .with_adapter(Arc::new(CountingAdapter::default()))
            .build();
        assert!(matches!(missing_store, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_builder_validates_config() {
        let result = Reconciler::builder(definition())
            .with_adapter(Arc::new(CountingAdapter::default()))
            .with_store(Arc::new(InMemoryRecordStore::<String, String>::new()))
            .with_config(ReconcilerConfig::default().with_adapter_timeout(Duration::ZERO))
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_single_pass_reaches_ready() {
        let store = Arc::new(InMemoryRecordStore::<String, String>::new());
        let adapter = Arc::new(CountingAdapter::default());
        let reconciler = Reconciler::builder(definition())
            .with_adapter(adapter.clone())
            .with_store(store.clone())
            .with_config(config())
            .build()
            .expect("reconciler builds");

        let key = ObjectKey::new("default", "orders");
        let record = reconciler.definition().new_record(key.clone(), "orders".to_string());
        assert!(store.create(record).await.is_ok());

        let outcome = reconciler.reconcile_one(&key, &ShutdownSignal::never()).await;
        assert_eq!(outcome, ReconcileOutcome::Done);
        assert_eq!(*adapter.creates.lock().await, 1);

        let stored = store.get(&key).await.ok().flatten();
        let status = stored.as_ref().and_then(|r| r.status.clone());
        assert_eq!(status.as_ref().map(|s| s.state), Some(ProvisionState::Ready));
        assert_eq!(status.and_then(|s| s.payload), Some("id-orders".to_string()));
        assert!(stored.is_some_and(|r| r.meta.has_finalizer("queue.finalizers.tether.io")));
    }

    #[tokio::test]
    async fn test_conflicts_requeue_after_retries() {
        let inner = InMemoryRecordStore::<String, String>::new();
        let key = ObjectKey::new("default", "orders");
        assert!(
            inner
                .create(Record::new("Queue", key.clone(), "orders".to_string()))
                .await
                .is_ok()
        );
        let recorder = Arc::new(InMemoryEventRecorder::new());
        let adapter = Arc::new(CountingAdapter::default());

        let reconciler = Reconciler::builder(definition())
            .with_adapter(adapter.clone())
            .with_store(Arc::new(ConflictingStore { inner }))
            .with_recorder(recorder.clone())
            .with_config(config().with_max_conflict_retries(2))
            .build()
            .expect("reconciler builds");

        let outcome = reconciler.reconcile_one(&key, &ShutdownSignal::never()).await;
        assert_eq!(outcome, ReconcileOutcome::RequeueAfter(Duration::from_millis(10)));
        // The finalizer write conflicts every time, so create is never reached.
        assert_eq!(*adapter.creates.lock().await, 0);
        assert_eq!(recorder.count().await, 0);
    }

    /// Given a record that already backed off twice
    /// When a pass ends in a terminal failure
    /// Then its backoff entry is dropped
    #[tokio::test]
    async fn test_terminal_failure_resets_backoff() {
        let store = Arc::new(InMemoryRecordStore::<String, String>::new());
        let key = ObjectKey::new("default", "orders");
        store
            .create(Record::new("Topic", key.clone(), "orders".to_string()))
            .await
            .expect("seed record");
        let reconciler = Reconciler::builder(definition())
            .with_adapter(Arc::new(CountingAdapter::default()))
            .with_store(store)
            .with_config(config())
            .build()
            .expect("reconciler builds");
        reconciler.backoff.next(&key).await;
        reconciler.backoff.next(&key).await;
        assert_eq!(reconciler.backoff.attempts(&key).await, 2);

        let outcome = reconciler.reconcile_one(&key, &ShutdownSignal::never()).await;

        assert!(matches!(outcome.error(), Some(Error::TypeMismatch { .. })));
        assert_eq!(outcome.requeue_after(), None);
        assert_eq!(reconciler.backoff.attempts(&key).await, 0);
    }
}
