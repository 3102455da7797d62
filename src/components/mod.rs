//! Coremodel components
//!
//! A coremodel is the kind descriptor handed to the bridge: the kind's
//! object schema plus, when the kind is reconciled into an internal store,
//! a factory for its reconciler. Whether a kind reconciles is decided at
//! construction time, not probed at registration time.
//!
//! - [`datasource`]: the datasource kind

pub mod datasource;

use std::collections::HashSet;
use std::sync::Arc;

use kube::core::DynamicObject;
use parking_lot::RwLock;
use tracing::warn;

use crate::reconcile::{BackoffPolicy, Fetch, Reconcile};
use crate::schema::ObjectSchema;

// =============================================================================
// Coremodel Descriptor
// =============================================================================

/// Builds a kind's reconciler once the bridge can supply the kind's
/// transport-level fetcher and retry policy. Kinds own translation and
/// storage; the bridge owns clients and the backoff policy.
pub trait ReconcilerFactory: Send + Sync {
    fn build(
        &self,
        fetcher: Arc<dyn Fetch<DynamicObject>>,
        backoff: BackoffPolicy,
    ) -> Arc<dyn Reconcile>;
}

/// Descriptor of one registered kind
#[derive(Clone)]
pub struct Coremodel {
    schema: ObjectSchema,
    reconciler: Option<Arc<dyn ReconcilerFactory>>,
}

impl Coremodel {
    /// A kind that is schematized but not mirrored into a store
    pub fn new(schema: ObjectSchema) -> Self {
        Self {
            schema,
            reconciler: None,
        }
    }

    /// A kind that is watched and reconciled into its store
    pub fn with_reconciler(schema: ObjectSchema, factory: Arc<dyn ReconcilerFactory>) -> Self {
        Self {
            schema,
            reconciler: Some(factory),
        }
    }

    pub fn schema(&self) -> &ObjectSchema {
        &self.schema
    }

    pub fn reconciler_factory(&self) -> Option<&Arc<dyn ReconcilerFactory>> {
        self.reconciler.as_ref()
    }
}

impl std::fmt::Debug for Coremodel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coremodel")
            .field("schema", &self.schema.name())
            .field("reconciled", &self.reconciler.is_some())
            .finish()
    }
}

// =============================================================================
// Schema Registry
// =============================================================================

/// Collects all known kind descriptors before any client exists.
///
/// One registry instance is constructed during process assembly and passed
/// by reference to schema providers and to the bridge service; registration
/// is safe to call from independent initialization paths. There is no
/// removal; the registry lives as long as the process.
#[derive(Default)]
pub struct SchemaRegistry {
    inner: RwLock<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    models: Vec<Coremodel>,
    names: HashSet<String>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kind descriptor.
    ///
    /// Returns false on a duplicate name or a malformed schema; duplicates
    /// are rejected, never overwritten.
    pub fn register(&self, model: Coremodel) -> bool {
        if !model.schema().is_well_formed() {
            warn!(kind = %model.schema().name(), "rejecting malformed schema registration");
            return false;
        }

        let mut inner = self.inner.write();
        if !inner.names.insert(model.schema().name().to_string()) {
            warn!(kind = %model.schema().name(), "rejecting duplicate schema registration");
            return false;
        }
        inner.models.push(model);
        true
    }

    /// All registered descriptors, in registration order
    pub fn coremodels(&self) -> Vec<Coremodel> {
        self.inner.read().models.clone()
    }
}
