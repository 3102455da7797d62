//! Datasource coremodel
//!
//! The datasource kind mirrors externally declared datasource objects into
//! an internal store. Its canonical shape is governed by the embedded
//! lineage artifact; the hand-written [`DataSourceSpec`] model is checked
//! against lineage version 0.0 at load time, so the owning process cannot
//! start serving this kind if the two have drifted apart.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use kube::core::DynamicObject;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::components::{Coremodel, ReconcilerFactory};
use crate::error::{Error, Result};
use crate::reconcile::{
    BackoffPolicy, Fetch, KindReconciler, Reconcile, ResourceObject, Store,
};
use crate::schema::{Lineage, LineageSchema, ObjectSchema, SchemaVersion, TranslationKernel};

/// Group this kind is served under
pub const GROUP_NAME: &str = "coremodels.bridge.dev";
/// Served group version
pub const GROUP_VERSION: &str = "v1alpha1";

/// Embedded schema-definition artifact; its path and filename are fixed.
const LINEAGE_ARTIFACT: &str = include_str!("datasource.yaml");

// =============================================================================
// Model
// =============================================================================

/// Internal model of one datasource, canonical per lineage version 0.0
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "coremodels.bridge.dev",
    version = "v1alpha1",
    kind = "DataSource",
    plural = "datasources",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceSpec {
    /// Datasource plugin type (e.g. "influxdb")
    pub r#type: String,

    /// Access mode: "proxy" or "direct"
    pub access: String,

    /// Endpoint URL
    #[serde(default)]
    pub url: String,

    /// Username for the endpoint
    #[serde(default)]
    pub user: String,

    /// Database name, for datasources that address one
    #[serde(default)]
    pub database: String,

    /// Send basic auth headers
    #[serde(default)]
    pub basic_auth: bool,

    /// Whether this is the default datasource
    #[serde(default)]
    pub is_default: bool,

    /// Disallow edits through the declarative surface
    #[serde(default)]
    pub read_only: bool,

    /// Plugin-specific settings
    #[serde(default)]
    pub json_data: BTreeMap<String, Value>,

    /// Send credentials on cross-site requests
    #[serde(default)]
    pub with_credentials: bool,
}

impl ResourceObject for DataSource {
    fn uid(&self) -> &str {
        self.metadata.uid.as_deref().unwrap_or_default()
    }

    fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    fn namespace(&self) -> Option<&str> {
        self.metadata.namespace.as_deref()
    }
}

// =============================================================================
// Lineage
// =============================================================================

/// Compile and verify the datasource lineage.
///
/// Constructing the JSON kernel checks consistency across every version in
/// the lineage, and the assignability check guarantees [`DataSourceSpec`]
/// still matches the canonical schema. Either failure is fatal: the process
/// must not start serving this kind.
pub fn new_lineage() -> Result<Lineage> {
    let lineage = Lineage::parse(LINEAGE_ARTIFACT)?;

    let _ = new_json_kernel(&lineage)?;

    lineage
        .schema(SchemaVersion::CANONICAL)?
        .assignable_to::<DataSourceSpec>(lineage.name())?;

    Ok(lineage)
}

/// JSON-decoding kernel targeting the canonical version
pub fn new_json_kernel(lineage: &Lineage) -> Result<TranslationKernel<DataSourceSpec>> {
    TranslationKernel::new(lineage, SchemaVersion::CANONICAL)
}

/// Object schema for the datasource kind
pub fn new_schema() -> Result<ObjectSchema> {
    LineageSchema::new(
        new_lineage()?,
        GROUP_NAME,
        GROUP_VERSION,
        "DataSource",
        "datasources",
    )
}

// =============================================================================
// Reconciler Wiring
// =============================================================================

/// Translates fetched wire objects into kernel-validated [`DataSource`]s
struct DataSourceFetcher {
    inner: Arc<dyn Fetch<DynamicObject>>,
    kernel: TranslationKernel<DataSourceSpec>,
}

#[async_trait]
impl Fetch<DataSource> for DataSourceFetcher {
    async fn fetch(&self, namespace: &str, name: &str) -> Result<DataSource> {
        let obj = self.inner.fetch(namespace, name).await?;

        // The store is keyed by UID; uid-less objects would all collide
        // under one empty key.
        if obj.metadata.uid.as_deref().map_or(true, str::is_empty) {
            return Err(Error::Internal(format!(
                "datasource '{}' carries no uid",
                name
            )));
        }

        let payload = obj.data.get("spec").cloned().ok_or_else(|| {
            Error::Internal(format!("datasource '{}' carries no spec payload", name))
        })?;
        let spec = self.kernel.decode_value(payload)?;

        let mut ds = DataSource::new(name, spec);
        ds.metadata = obj.metadata;
        Ok(ds)
    }
}

struct DataSourceReconcilerFactory {
    store: Arc<dyn Store<DataSource>>,
    kernel: TranslationKernel<DataSourceSpec>,
}

impl ReconcilerFactory for DataSourceReconcilerFactory {
    fn build(
        &self,
        fetcher: Arc<dyn Fetch<DynamicObject>>,
        backoff: BackoffPolicy,
    ) -> Arc<dyn Reconcile> {
        Arc::new(KindReconciler::new(
            Arc::new(DataSourceFetcher {
                inner: fetcher,
                kernel: self.kernel.clone(),
            }),
            self.store.clone(),
            backoff,
        ))
    }
}

/// Build the registrable datasource coremodel, bound to its store.
///
/// Fails fast on a broken lineage or a drifted model type.
pub fn coremodel(store: Arc<dyn Store<DataSource>>) -> Result<Coremodel> {
    let lineage = new_lineage()?;
    let kernel = new_json_kernel(&lineage)?;
    let schema = LineageSchema::new(lineage, GROUP_NAME, GROUP_VERSION, "DataSource", "datasources")?;

    Ok(Coremodel::with_reconciler(
        schema,
        Arc::new(DataSourceReconcilerFactory { store, kernel }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{MemoryStore, ReconcileOutcome, ReconcileRequest};
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_lineage_loads_and_model_is_assignable() {
        let lineage = new_lineage().unwrap();
        assert_eq!(lineage.name(), "datasource");
        assert_eq!(lineage.versions().len(), 2);
    }

    #[test]
    fn test_kernel_decodes_canonical_payload() {
        let lineage = new_lineage().unwrap();
        let kernel = new_json_kernel(&lineage).unwrap();

        let spec = kernel
            .decode_value(json!({
                "type": "influxdb",
                "access": "proxy",
                "url": "http://influx:8086",
                "isDefault": true,
                "jsonData": { "httpMode": "GET" },
            }))
            .unwrap();

        assert_eq!(spec.r#type, "influxdb");
        assert_eq!(spec.access, "proxy");
        assert!(spec.is_default);
        assert_eq!(spec.json_data["httpMode"], json!("GET"));
    }

    #[test]
    fn test_kernel_decodes_null_optional_field_to_default() {
        let lineage = new_lineage().unwrap();
        let kernel = new_json_kernel(&lineage).unwrap();

        let spec = kernel
            .decode_value(json!({
                "type": "influxdb",
                "access": "proxy",
                "url": null,
            }))
            .unwrap();
        assert_eq!(spec.url, "");
    }

    #[test]
    fn test_kernel_rejects_nonconforming_payload() {
        let lineage = new_lineage().unwrap();
        let kernel = new_json_kernel(&lineage).unwrap();

        // Missing required "access"
        assert_matches!(
            kernel.decode_value(json!({ "type": "influxdb" })),
            Err(Error::Validation { .. })
        );
        // 0.1-only field is not part of the canonical version
        assert_matches!(
            kernel.decode_value(json!({
                "type": "influxdb",
                "access": "proxy",
                "secureJsonFields": {},
            })),
            Err(Error::Validation { .. })
        );
    }

    #[test]
    fn test_schema_capabilities() {
        let schema = new_schema().unwrap();
        assert_eq!(schema.name(), "datasource");
        assert_eq!(schema.group_name(), GROUP_NAME);
        assert_eq!(schema.group_version(), GROUP_VERSION);
        assert_eq!(schema.api_resource().kind, "DataSource");
        assert_eq!(schema.api_resource().plural, "datasources");
    }

    struct OneShotFetcher(DynamicObject);

    #[async_trait]
    impl Fetch<DynamicObject> for OneShotFetcher {
        async fn fetch(&self, _namespace: &str, _name: &str) -> Result<DynamicObject> {
            Ok(self.0.clone())
        }
    }

    fn dynamic_datasource() -> DynamicObject {
        let schema = new_schema().unwrap();
        let mut obj = DynamicObject::new("influx-1", schema.api_resource()).within("default");
        obj.metadata.uid = Some("abc123".into());
        obj.data = json!({
            "spec": {
                "type": "influxdb",
                "access": "proxy",
                "url": "http://influx:8086",
            }
        });
        obj
    }

    #[tokio::test]
    async fn test_reconciler_mirrors_fetched_object() {
        let store = Arc::new(MemoryStore::<DataSource>::new("datasource"));
        let model = coremodel(store.clone()).unwrap();

        let reconciler = model
            .reconciler_factory()
            .expect("datasource carries a reconciler")
            .build(
                Arc::new(OneShotFetcher(dynamic_datasource())),
                BackoffPolicy::default(),
            );

        let outcome = reconciler
            .reconcile(ReconcileRequest::new("default", "influx-1"))
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Done);

        let mirrored = store.get("abc123").await.unwrap();
        assert_eq!(mirrored.name(), "influx-1");
        assert_eq!(mirrored.spec.r#type, "influxdb");
        assert_eq!(mirrored.spec.url, "http://influx:8086");
    }

    #[tokio::test]
    async fn test_reconciler_rejects_object_without_uid() {
        let store = Arc::new(MemoryStore::<DataSource>::new("datasource"));
        let model = coremodel(store.clone()).unwrap();

        let mut obj = dynamic_datasource();
        obj.metadata.uid = None;
        let reconciler = model
            .reconciler_factory()
            .unwrap()
            .build(Arc::new(OneShotFetcher(obj)), BackoffPolicy::default());

        let err = reconciler
            .reconcile(ReconcileRequest::new("default", "influx-1"))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Internal(_));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_reconciler_rejects_drifted_payload() {
        let store = Arc::new(MemoryStore::<DataSource>::new("datasource"));
        let model = coremodel(store.clone()).unwrap();

        let mut obj = dynamic_datasource();
        obj.data = json!({ "spec": { "type": "influxdb" } });
        let reconciler = model
            .reconciler_factory()
            .unwrap()
            .build(Arc::new(OneShotFetcher(obj)), BackoffPolicy::default());

        let err = reconciler
            .reconcile(ReconcileRequest::new("default", "influx-1"))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Validation { .. });
        assert!(store.is_empty());
    }
}
