//! Coremodel Bridge
//!
//! A schema-versioned reconciliation bridge: externally declared custom
//! resources are kept synchronized with an internal persisted store, while
//! each kind's schema is allowed to evolve through a versioned lineage.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Bridge Service                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌───────────────┐   ┌────────────────┐   ┌───────────────────┐  │
//! │  │    Schema     │   │    Clientset   │   │    Controller     │  │
//! │  │   Registry    │──▶│ (per group/ver)│──▶│     Manager       │  │
//! │  └───────┬───────┘   └────────────────┘   └─────────┬─────────┘  │
//! │          │                                          │            │
//! │  ┌───────┴───────┐                        ┌─────────┴─────────┐  │
//! │  │   Lineage +   │                        │  Kind Reconciler  │  │
//! │  │    Kernel     │                        │ fetch→diff→apply  │  │
//! │  └───────────────┘                        └─────────┬─────────┘  │
//! │                                                     │            │
//! │                                           ┌─────────┴─────────┐  │
//! │                                           │  Per-kind Store   │  │
//! │                                           └───────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each kind's lineage is compiled from an embedded artifact at process
//! start; a kind whose internal model type has drifted from its canonical
//! schema version fails loading, and the process must not serve it.
//!
//! # Modules
//!
//! - [`schema`]: schema lineages, translation kernels, object schemas
//! - [`components`]: the schema registry and the registered kinds
//! - [`reconcile`]: the per-kind reconciliation loop and its collaborators
//! - [`bridge`]: service assembly, client dispatch, controller manager
//! - [`config`]: configuration section and feature flags
//! - [`error`]: error types and handling

pub mod bridge;
pub mod components;
pub mod config;
pub mod error;
pub mod reconcile;
pub mod schema;

// Re-export commonly used types
pub use bridge::{Clientset, ControllerManager, DynamicFetcher, NamedController, Scheme, Service};

pub use components::{Coremodel, ReconcilerFactory, SchemaRegistry};

pub use config::{BridgeConfig, FeatureFlags, FLAG_COREMODEL_BRIDGE};

pub use error::{Error, Result};

pub use reconcile::{
    BackoffPolicy, Fetch, KindReconciler, MemoryStore, Reconcile, ReconcileOutcome,
    ReconcileRequest, ResourceObject, Store,
};

pub use schema::{
    CoreSchemaList, FieldKind, FieldSpec, Lineage, LineageSchema, NativeSchema, ObjectSchema,
    SchemaVersion, TranslationKernel, VersionSchema,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
