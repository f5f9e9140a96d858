//! Two resource kinds against a simulated cloud, driven by the
//! reconciliation loop.
//!
//! Run with: cargo run -p tether-reconciler --example in_memory_controller [config.toml]
//!
//! Set `RUST_LOG=debug` to see every pass. Press Ctrl+C to stop early.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tether_reconciler::{
    AdapterError, ApplyResponse, ControllerConfig, DeleteResponse, DependencyDirectory,
    DependencyRef, InMemoryRecordStore, Notification, ObjectKey, ProvisionState, Reconciler,
    ReconciliationLoop, RecordStore, ReferenceResolver, Registry, ResourceAdapter,
    ResourceDefinition, ResourceSpec, Shutdown, ShutdownSignal, VerifyResponse,
    install_signal_handlers,
};
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct NetworkSpec {
    cidr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct NetworkStatus {
    network_id: String,
}

#[derive(Debug, Clone)]
struct InstanceSpec {
    network: String,
    size: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct InstanceStatus {
    instance_id: String,
    network_id: String,
}

/// Networks take a few polls to come up; instances are immediate.
#[derive(Default)]
struct FakeCloud {
    /// network id -> polls left until ready
    networks: Mutex<HashMap<String, u32>>,
    instances: Mutex<HashMap<String, String>>,
}

struct NetworkAdapter {
    cloud: Arc<FakeCloud>,
}

#[async_trait]
impl ResourceAdapter<NetworkSpec, NetworkStatus> for NetworkAdapter {
    async fn create(
        &self,
        resource: ResourceSpec<'_, NetworkSpec, NetworkStatus>,
    ) -> ApplyResponse<NetworkStatus> {
        let network_id = format!("net-{}", resource.record.key().name);
        info!(cidr = %resource.spec().cidr, %network_id, "cloud: creating network");
        self.cloud.networks.lock().await.insert(network_id.clone(), 3);
        ApplyResponse::awaiting_verification_with_status(NetworkStatus { network_id })
    }

    async fn verify(
        &self,
        resource: ResourceSpec<'_, NetworkSpec, NetworkStatus>,
    ) -> VerifyResponse<NetworkStatus> {
        let Some(status) = resource.payload() else {
            return VerifyResponse::Missing;
        };
        let mut networks = self.cloud.networks.lock().await;
        match networks.get_mut(&status.network_id) {
            None => VerifyResponse::Missing,
            Some(0) => VerifyResponse::ready(),
            Some(polls) => {
                *polls = polls.saturating_sub(1);
                VerifyResponse::provisioning()
            }
        }
    }

    async fn delete(&self, resource: ResourceSpec<'_, NetworkSpec, NetworkStatus>) -> DeleteResponse {
        let Some(status) = resource.payload() else {
            return DeleteResponse::AlreadyDeleted;
        };
        match self.cloud.networks.lock().await.remove(&status.network_id) {
            Some(_) => DeleteResponse::Succeeded,
            None => DeleteResponse::AlreadyDeleted,
        }
    }
}

struct InstanceAdapter {
    cloud: Arc<FakeCloud>,
}

#[async_trait]
impl ResourceAdapter<InstanceSpec, InstanceStatus> for InstanceAdapter {
    async fn create(
        &self,
        resource: ResourceSpec<'_, InstanceSpec, InstanceStatus>,
    ) -> ApplyResponse<InstanceStatus> {
        let network = resource
            .dependencies
            .first_of_kind("Network")
            .ok_or_else(|| AdapterError::rejected("instance has no network"))
            .and_then(|dep| {
                dep.payload_as::<NetworkStatus>()
                    .map_err(|e| AdapterError::rejected(e.to_string()))
            });
        let network = match network {
            Ok(network) => network,
            Err(e) => return ApplyResponse::Error(e),
        };

        let instance_id = format!("i-{}", resource.record.key().name);
        info!(size = %resource.spec().size, %instance_id, network_id = %network.network_id, "cloud: launching instance");
        self.cloud
            .instances
            .lock()
            .await
            .insert(instance_id.clone(), network.network_id.clone());
        ApplyResponse::succeeded_with_status(InstanceStatus {
            instance_id,
            network_id: network.network_id,
        })
    }

    async fn verify(
        &self,
        resource: ResourceSpec<'_, InstanceSpec, InstanceStatus>,
    ) -> VerifyResponse<InstanceStatus> {
        let Some(status) = resource.payload() else {
            return VerifyResponse::Missing;
        };
        match self.cloud.instances.lock().await.get(&status.instance_id) {
            None => VerifyResponse::Missing,
            Some(network_id) if *network_id == status.network_id => VerifyResponse::ready(),
            // Instances cannot move between networks in place.
            Some(_) => VerifyResponse::RecreateRequired,
        }
    }

    async fn delete(&self, resource: ResourceSpec<'_, InstanceSpec, InstanceStatus>) -> DeleteResponse {
        let removed = match resource.payload() {
            Some(status) => self.cloud.instances.lock().await.remove(&status.instance_id),
            None => None,
        };
        if removed.is_some() {
            info!("cloud: instance terminated");
            DeleteResponse::Succeeded
        } else {
            DeleteResponse::AlreadyDeleted
        }
    }
}

/// Poll `check` until it holds. Gives up on shutdown or after 30s.
async fn wait_for<F, Fut>(what: &str, mut signal: ShutdownSignal, mut check: F) -> anyhow::Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let poll = async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };
    tokio::select! {
        () = signal.cancelled() => anyhow::bail!("interrupted while waiting for {what}"),
        result = tokio::time::timeout(Duration::from_secs(30), poll) => {
            result.with_context(|| format!("timed out waiting for {what}"))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ControllerConfig::from_file(&path)
            .with_context(|| format!("loading controller config from {path}"))?,
        None => ControllerConfig::default(),
    };
    info!(workers = config.workers, "Starting in-memory controller");

    let cloud = Arc::new(FakeCloud::default());
    let networks = Arc::new(InMemoryRecordStore::<NetworkSpec, NetworkStatus>::new());
    let instances = Arc::new(InMemoryRecordStore::<InstanceSpec, InstanceStatus>::new());

    let network_reconciler = Reconciler::builder(ResourceDefinition::new("Network"))
        .with_adapter(Arc::new(NetworkAdapter {
            cloud: Arc::clone(&cloud),
        }))
        .with_store(networks.clone())
        .with_config(config.reconciler.clone())
        .build()?;

    let directory = DependencyDirectory::new().with_kind("Network", networks.clone());
    let resolver = ReferenceResolver::new(directory, |record: &tether_reconciler::Record<InstanceSpec, InstanceStatus>| {
        Ok(vec![DependencyRef::new(
            "Network",
            ObjectKey::new(record.key().namespace.clone(), record.spec.network.clone()),
        )])
    });
    let instance_reconciler = Reconciler::builder(ResourceDefinition::new("Instance"))
        .with_adapter(Arc::new(InstanceAdapter {
            cloud: Arc::clone(&cloud),
        }))
        .with_resolver(Arc::new(resolver))
        .with_store(instances.clone())
        .with_config(config.reconciler.clone())
        .build()?;

    let registry = Registry::new()
        .with(Arc::new(network_reconciler))?
        .with(Arc::new(instance_reconciler))?;

    let shutdown = Shutdown::new();
    let signals = install_signal_handlers(shutdown.clone());
    let controller = ReconciliationLoop::new(registry, config)?.with_shutdown(shutdown.clone());
    let handle = controller.handle();
    let controller_task = tokio::spawn(controller.run());

    // The instance is declared first; it waits until its network is Ready.
    let web = ObjectKey::new("default", "web");
    let vpc = ObjectKey::new("default", "vpc");
    instances
        .create(tether_reconciler::Record::new(
            "Instance",
            web.clone(),
            InstanceSpec {
                network: "vpc".to_string(),
                size: "small".to_string(),
            },
        ))
        .await?;
    networks
        .create(tether_reconciler::Record::new(
            "Network",
            vpc.clone(),
            NetworkSpec {
                cidr: "10.0.0.0/16".to_string(),
            },
        ))
        .await?;
    handle
        .notify(Notification::new("Instance", web.clone()).with_reason("created"))
        .await?;
    handle
        .notify(Notification::new("Network", vpc.clone()).with_reason("created"))
        .await?;

    let state_of = |key: ObjectKey| {
        let instances = Arc::clone(&instances);
        async move {
            instances
                .get(&key)
                .await
                .ok()
                .flatten()
                .and_then(|r| r.status)
                .map(|s| s.state)
        }
    };

    wait_for("instance to become ready", shutdown.signal(), || {
        let state = state_of(web.clone());
        async move { state.await == Some(ProvisionState::Ready) }
    })
    .await?;
    info!(instance = %web, "Instance is ready, deleting it");

    instances.delete(&web).await?;
    handle
        .notify(Notification::new("Instance", web.clone()).with_reason("deleted"))
        .await?;
    wait_for("instance record to be released", shutdown.signal(), || {
        let instances = Arc::clone(&instances);
        let web = web.clone();
        async move { !instances.contains(&web).await }
    })
    .await?;
    info!(
        instances = cloud.instances.lock().await.len(),
        networks = cloud.networks.lock().await.len(),
        "Cloud state after teardown"
    );

    shutdown.trigger();
    controller_task.await??;
    signals.abort();
    info!("Controller stopped");
    Ok(())
}
