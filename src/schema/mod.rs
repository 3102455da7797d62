//! Object schemas
//!
//! An object schema describes one resource kind: its canonical name, group
//! identifier, group version, an OpenAPI-style validation document, and the
//! `ApiResource` used to address its objects on the wire. Two concrete forms
//! exist: a native schema, whose canonical shape is a Rust type, and a
//! lineage-backed schema, whose canonical shape is a versioned lineage plus
//! a translation kernel.
//!
//! - [`lineage`]: versioned schema lineages compiled from embedded artifacts
//! - [`kernel`]: decode/validate kernels bound to one lineage version

pub mod kernel;
pub mod lineage;

use std::sync::Arc;

use kube::core::{ApiResource, GroupVersionKind};
use serde_json::Value;

use crate::error::Result;

pub use kernel::TranslationKernel;
pub use lineage::{FieldKind, FieldSpec, Lineage, SchemaVersion, VersionSchema};

/// Ordered collection of object schemas, built once at startup.
/// Insertion order is registration order.
pub type CoreSchemaList = Vec<ObjectSchema>;

// =============================================================================
// Object Schema
// =============================================================================

/// Schema of one resource kind, tagged by how its canonical shape is defined
#[derive(Debug, Clone)]
pub enum ObjectSchema {
    /// Canonical shape defined directly by a Rust type
    Native(NativeSchema),
    /// Canonical shape defined by a versioned lineage
    Lineage(LineageSchema),
}

impl ObjectSchema {
    /// Canonical name of the schematized kind
    pub fn name(&self) -> &str {
        match self {
            ObjectSchema::Native(s) => &s.name,
            ObjectSchema::Lineage(s) => s.lineage.name(),
        }
    }

    /// Group identifier
    pub fn group_name(&self) -> &str {
        match self {
            ObjectSchema::Native(s) => &s.group_name,
            ObjectSchema::Lineage(s) => &s.group_name,
        }
    }

    /// Group version string
    pub fn group_version(&self) -> &str {
        match self {
            ObjectSchema::Native(s) => &s.group_version,
            ObjectSchema::Lineage(s) => &s.group_version,
        }
    }

    /// Wire-level resource descriptor for this kind
    pub fn api_resource(&self) -> &ApiResource {
        match self {
            ObjectSchema::Native(s) => &s.resource,
            ObjectSchema::Lineage(s) => &s.resource,
        }
    }

    /// OpenAPI-style validation document
    pub fn openapi_schema(&self) -> &Value {
        match self {
            ObjectSchema::Native(s) => &s.openapi,
            ObjectSchema::Lineage(s) => &s.openapi,
        }
    }

    /// Lineage backing this schema, if it is lineage-defined
    pub fn lineage(&self) -> Option<&Lineage> {
        match self {
            ObjectSchema::Native(_) => None,
            ObjectSchema::Lineage(s) => Some(&s.lineage),
        }
    }

    /// A registrable schema carries a non-empty name, group, and version.
    pub fn is_well_formed(&self) -> bool {
        !self.name().is_empty() && !self.group_name().is_empty() && !self.group_version().is_empty()
    }
}

// =============================================================================
// Native Schema
// =============================================================================

/// Schema whose canonical shape is expressed as a Rust type, in traditional
/// Kubernetes style.
#[derive(Debug, Clone)]
pub struct NativeSchema {
    name: String,
    group_name: String,
    group_version: String,
    openapi: Value,
    resource: ApiResource,
}

impl NativeSchema {
    /// Build a native schema from a typed resource and its OpenAPI-style
    /// validation document (typically generated with schemars from the
    /// type's spec).
    pub fn of<K>(openapi: Value) -> ObjectSchema
    where
        K: kube::Resource<DynamicType = ()>,
    {
        ObjectSchema::Native(NativeSchema {
            name: K::kind(&()).to_ascii_lowercase(),
            group_name: K::group(&()).into_owned(),
            group_version: K::version(&()).into_owned(),
            openapi,
            resource: ApiResource::erase::<K>(&()),
        })
    }
}

// =============================================================================
// Lineage Schema
// =============================================================================

/// Schema whose canonical shape is expressed by a versioned lineage
#[derive(Debug, Clone)]
pub struct LineageSchema {
    lineage: Arc<Lineage>,
    group_name: String,
    group_version: String,
    openapi: Value,
    resource: ApiResource,
}

impl LineageSchema {
    /// Build a lineage-backed schema. The OpenAPI document is derived from
    /// the lineage's canonical version.
    pub fn new(
        lineage: Lineage,
        group_name: &str,
        group_version: &str,
        kind: &str,
        plural: &str,
    ) -> Result<ObjectSchema> {
        let openapi = lineage.schema(SchemaVersion::CANONICAL)?.openapi_document();
        let gvk = GroupVersionKind::gvk(group_name, group_version, kind);

        Ok(ObjectSchema::Lineage(LineageSchema {
            lineage: Arc::new(lineage),
            group_name: group_name.to_string(),
            group_version: group_version.to_string(),
            openapi,
            resource: ApiResource::from_gvk_with_plural(&gvk, plural),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTIFACT: &str = r#"
name: widget
versions:
  - version: "0.0"
    fields:
      title: { kind: string, required: true }
"#;

    #[test]
    fn test_native_schema_capabilities() {
        use crate::components::datasource::{DataSource, DataSourceSpec};

        let openapi = serde_json::to_value(schemars::schema_for!(DataSourceSpec)).unwrap();
        let schema = NativeSchema::of::<DataSource>(openapi);
        assert_eq!(schema.name(), "datasource");
        assert_eq!(schema.group_name(), "coremodels.bridge.dev");
        assert_eq!(schema.group_version(), "v1alpha1");
        assert_eq!(schema.api_resource().plural, "datasources");
        assert!(schema.openapi_schema().is_object());
        assert!(schema.lineage().is_none());
        assert!(schema.is_well_formed());
    }

    #[test]
    fn test_lineage_schema_capabilities() {
        let lineage = Lineage::parse(ARTIFACT).unwrap();
        let schema =
            LineageSchema::new(lineage, "things.example.dev", "v1alpha1", "Widget", "widgets")
                .unwrap();

        assert_eq!(schema.name(), "widget");
        assert_eq!(schema.group_name(), "things.example.dev");
        assert_eq!(schema.group_version(), "v1alpha1");
        assert_eq!(schema.api_resource().kind, "Widget");
        assert_eq!(schema.api_resource().plural, "widgets");
        assert_eq!(schema.openapi_schema()["type"], "object");
        assert!(schema.lineage().is_some());
        assert!(schema.is_well_formed());
    }
}
