//! Bridge service
//!
//! Wires the registered coremodels to the external declarative store: one
//! protocol client per schema group/version, one watch-driven controller
//! per reconcilable kind, all owned for the process lifetime. The whole
//! subsystem is gated by a feature flag; when the flag is off a disabled
//! service is returned and no call site needs its own conditional.
//!
//! - [`clientset`]: multi-version client dispatch
//! - [`manager`]: watch-driven controller manager

pub mod clientset;
pub mod manager;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::ApiResource;
use kube::Config;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::components::SchemaRegistry;
use crate::config::{BridgeConfig, FeatureFlags, FLAG_COREMODEL_BRIDGE};
use crate::error::{Error, Result};
use crate::schema::{CoreSchemaList, ObjectSchema};

pub use clientset::{Clientset, DynamicFetcher};
pub use manager::{ControllerManager, NamedController};

// =============================================================================
// Scheme
// =============================================================================

/// Accumulated wire descriptors of every registered kind
#[derive(Debug, Default)]
pub struct Scheme {
    resources: HashMap<String, ApiResource>,
}

impl Scheme {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a schema's runtime resource descriptor to the scheme
    pub fn add(&mut self, schema: &ObjectSchema) -> Result<()> {
        let name = schema.name().to_string();
        if self.resources.contains_key(&name) {
            return Err(Error::SchemeConflict(name));
        }
        self.resources.insert(name, schema.api_resource().clone());
        Ok(())
    }

    /// Wire descriptor for a kind, if registered
    pub fn resource(&self, name: &str) -> Option<&ApiResource> {
        self.resources.get(name)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

// =============================================================================
// Service
// =============================================================================

enum State {
    Disabled,
    Enabled(Box<Inner>),
}

struct Inner {
    config: Config,
    clients: Clientset,
    schemas: CoreSchemaList,
    scheme: Scheme,
    manager: ControllerManager,
}

/// The bridge/orchestration service
pub struct Service {
    state: State,
}

impl Service {
    /// Assemble the bridge from configuration, feature flags, and the
    /// schema registry.
    ///
    /// With the bridge flag off this returns a disabled service. Otherwise
    /// construction is all-or-nothing: a missing connection descriptor, a
    /// malformed kubeconfig, a scheme conflict, or any controller
    /// registration failure aborts the whole service.
    pub async fn new(
        config: &BridgeConfig,
        features: &FeatureFlags,
        registry: &SchemaRegistry,
    ) -> Result<Self> {
        if !features.is_enabled(FLAG_COREMODEL_BRIDGE) {
            info!("coremodel bridge is disabled by feature flag");
            return Ok(Self {
                state: State::Disabled,
            });
        }

        let kube_config = Self::connection_config(config).await?;
        let backoff = config.backoff();

        let models = registry.coremodels();
        let mut schemas: CoreSchemaList = Vec::with_capacity(models.len());
        let mut scheme = Scheme::new();
        for model in &models {
            schemas.push(model.schema().clone());
            scheme.add(model.schema())?;
        }

        let clients = Clientset::new(&kube_config, &schemas)?;

        let mut manager = ControllerManager::new();
        for model in &models {
            let Some(factory) = model.reconciler_factory() else {
                continue;
            };

            let schema = model.schema();
            let resource = scheme.resource(schema.name()).ok_or_else(|| {
                Error::ControllerRegistration {
                    name: schema.name().to_string(),
                    reason: "kind is missing from the scheme".into(),
                }
            })?;
            let client = clients.client_for_schema(schema)?.clone();

            let fetcher = Arc::new(DynamicFetcher::new(client.clone(), resource.clone()));
            let reconciler = factory.build(fetcher, backoff);
            manager.register(NamedController::new(
                format!("{}-controller", schema.name()),
                client,
                resource.clone(),
                reconciler,
            ))?;
            debug!(kind = %schema.name(), "registered controller");
        }

        info!(
            schemas = schemas.len(),
            controllers = manager.len(),
            "coremodel bridge assembled"
        );

        Ok(Self {
            state: State::Enabled(Box::new(Inner {
                config: kube_config,
                clients,
                schemas,
                scheme,
                manager,
            })),
        })
    }

    /// Build the connection configuration from the configured descriptor
    async fn connection_config(config: &BridgeConfig) -> Result<Config> {
        if config.kubeconfig_path.is_empty() {
            return Err(Error::Configuration(
                "kubeconfig path cannot be empty when the coremodel bridge is enabled".into(),
            ));
        }

        let path = Path::new(&config.kubeconfig_path);
        if !path.exists() {
            return Err(Error::Configuration(format!(
                "cannot find kubeconfig file at '{}'",
                path.display()
            )));
        }

        let kubeconfig = Kubeconfig::read_from(path)?;
        Ok(Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?)
    }

    /// Whether the subsystem is a no-op for this process
    pub fn is_disabled(&self) -> bool {
        matches!(self.state, State::Disabled)
    }

    fn inner(&self) -> Result<&Inner> {
        match &self.state {
            State::Disabled => Err(Error::BridgeDisabled),
            State::Enabled(inner) => Ok(inner),
        }
    }

    /// Schemas the bridge was assembled over, in registration order
    pub fn schemas(&self) -> Result<&CoreSchemaList> {
        Ok(&self.inner()?.schemas)
    }

    /// The multi-version client dispatcher
    pub fn client(&self) -> Result<&Clientset> {
        Ok(&self.inner()?.clients)
    }

    /// Accumulated wire descriptors
    pub fn scheme(&self) -> Result<&Scheme> {
        Ok(&self.inner()?.scheme)
    }

    /// The watch-driven controller manager
    pub fn controller_manager(&self) -> Result<&ControllerManager> {
        Ok(&self.inner()?.manager)
    }

    /// Base connection configuration
    pub fn connection(&self) -> Result<&Config> {
        Ok(&self.inner()?.config)
    }

    /// Start the watch manager and block until it stops or `shutdown`
    /// fires; the manager's terminal error, if any, is propagated.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        self.inner()?.manager.run(shutdown).await
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.state {
            State::Disabled => f.debug_struct("Service").field("disabled", &true).finish(),
            State::Enabled(inner) => f
                .debug_struct("Service")
                .field("schemas", &inner.schemas.len())
                .field("controllers", &inner.manager.names())
                .finish(),
        }
    }
}
