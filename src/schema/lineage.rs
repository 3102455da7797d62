//! Schema lineages
//!
//! A lineage is the ordered sequence of schema versions for one resource
//! kind. It is authored as an embedded YAML artifact, compiled into memory
//! at process start, and validated before the owning kind may serve: version
//! 0.0 is the canonical shape, and the kind's internal model type must be
//! structurally assignable to it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

// =============================================================================
// Schema Version
// =============================================================================

/// An immutable (major, minor) pair identifying one snapshot of a kind's
/// shape within its lineage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion {
    pub major: u16,
    pub minor: u16,
}

impl SchemaVersion {
    /// The canonical, foundational version of every lineage.
    pub const CANONICAL: SchemaVersion = SchemaVersion { major: 0, minor: 0 };

    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Parse a `"major.minor"` version string.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || Error::Internal(format!("invalid schema version: '{}'", s));
        let (major, minor) = s.split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

// =============================================================================
// Field Specifications
// =============================================================================

/// JSON shape of a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Bool,
    Object,
    Array,
}

impl FieldKind {
    /// OpenAPI type name for this kind
    pub fn openapi_type(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Bool => "boolean",
            FieldKind::Object => "object",
            FieldKind::Array => "array",
        }
    }

    /// Whether a JSON value conforms to this kind. Null is treated as
    /// "unset" and never a kind mismatch on its own.
    fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (FieldKind::String, Value::String(_)) => true,
            (FieldKind::Number, Value::Number(_)) => true,
            (FieldKind::Bool, Value::Bool(_)) => true,
            (FieldKind::Object, Value::Object(_)) => true,
            (FieldKind::Array, Value::Array(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.openapi_type())
    }
}

/// One field of a version schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
}

// =============================================================================
// Version Schema
// =============================================================================

/// The complete shape of one schema version within a lineage
#[derive(Debug, Clone, PartialEq)]
pub struct VersionSchema {
    version: SchemaVersion,
    fields: BTreeMap<String, FieldSpec>,
}

impl VersionSchema {
    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldSpec> {
        &self.fields
    }

    /// Validate a decoded payload against this version.
    ///
    /// Required fields must be present and non-null, present fields must
    /// match their declared kind, and unknown fields are rejected.
    pub fn validate(&self, lineage: &str, payload: &Value) -> Result<()> {
        let fail = |reason: String| Error::Validation {
            lineage: lineage.to_string(),
            version: self.version,
            reason,
        };

        let obj = payload
            .as_object()
            .ok_or_else(|| fail("payload is not an object".into()))?;

        for (name, spec) in &self.fields {
            match obj.get(name) {
                Some(value) if !spec.kind.matches(value) => {
                    return Err(fail(format!(
                        "field '{}' should be {}, got {}",
                        name,
                        spec.kind,
                        json_kind(value)
                    )));
                }
                Some(Value::Null) | None if spec.required => {
                    return Err(fail(format!("required field '{}' is missing", name)));
                }
                _ => {}
            }
        }

        for name in obj.keys() {
            if !self.fields.contains_key(name) {
                return Err(fail(format!("unknown field '{}'", name)));
            }
        }

        Ok(())
    }

    /// Check that a model type is structurally assignable to this version.
    ///
    /// Every required field must have a counterpart of a compatible kind in
    /// the serialized form of `T::default()`, shared fields must agree on
    /// kind, and model fields absent from the schema are treated as drift.
    /// This gate runs at process start so hand-written internal types can
    /// never silently diverge from the versioned schema.
    pub fn assignable_to<T>(&self, lineage: &str) -> Result<()>
    where
        T: Default + Serialize,
    {
        let fail = |reason: String| Error::NotAssignable {
            lineage: lineage.to_string(),
            version: self.version,
            reason,
        };

        let model = serde_json::to_value(T::default())?;
        let obj = model
            .as_object()
            .ok_or_else(|| fail("model type does not serialize to an object".into()))?;

        for (name, spec) in &self.fields {
            match obj.get(name) {
                Some(value) => {
                    if !spec.kind.matches(value) {
                        return Err(fail(format!(
                            "field '{}' should be {}, model has {}",
                            name,
                            spec.kind,
                            json_kind(value)
                        )));
                    }
                }
                None if spec.required => {
                    return Err(fail(format!(
                        "required field '{}' has no counterpart in the model type",
                        name
                    )));
                }
                None => {}
            }
        }

        for name in obj.keys() {
            if !self.fields.contains_key(name) {
                return Err(fail(format!(
                    "model field '{}' does not exist in the schema",
                    name
                )));
            }
        }

        Ok(())
    }

    /// OpenAPI-style validation document for this version
    pub fn openapi_document(&self) -> Value {
        let properties: serde_json::Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, spec)| {
                (
                    name.clone(),
                    serde_json::json!({ "type": spec.kind.openapi_type() }),
                )
            })
            .collect();
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name.as_str())
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// Lineage
// =============================================================================

/// Raw artifact layout, as authored
#[derive(Debug, Deserialize)]
struct LineageDoc {
    name: String,
    versions: Vec<VersionDoc>,
}

#[derive(Debug, Deserialize)]
struct VersionDoc {
    version: String,
    #[serde(default)]
    fields: BTreeMap<String, FieldSpec>,
}

/// An ordered sequence of schema versions for one resource kind
#[derive(Debug, Clone)]
pub struct Lineage {
    name: String,
    versions: Vec<VersionSchema>,
}

impl Lineage {
    /// Compile an embedded schema-definition artifact into a lineage.
    ///
    /// The artifact must name the kind, contain at least one version, start
    /// at the canonical version 0.0, and list versions in strictly
    /// increasing order.
    pub fn parse(artifact: &str) -> Result<Self> {
        let doc: LineageDoc = serde_yaml::from_str(artifact)?;

        let invalid = |reason: String| Error::InvalidLineage {
            name: doc.name.clone(),
            reason,
        };

        if doc.name.is_empty() {
            return Err(Error::InvalidLineage {
                name: "<unnamed>".into(),
                reason: "lineage name is empty".into(),
            });
        }
        if doc.versions.is_empty() {
            return Err(invalid("lineage contains no versions".into()));
        }

        let mut versions = Vec::with_capacity(doc.versions.len());
        for v in &doc.versions {
            let version = SchemaVersion::parse(&v.version).map_err(|_| {
                invalid(format!("malformed version string '{}'", v.version))
            })?;
            versions.push(VersionSchema {
                version,
                fields: v.fields.clone(),
            });
        }

        if versions[0].version != SchemaVersion::CANONICAL {
            return Err(invalid(format!(
                "first version must be {}, found {}",
                SchemaVersion::CANONICAL,
                versions[0].version
            )));
        }
        for pair in versions.windows(2) {
            if pair[1].version <= pair[0].version {
                return Err(invalid(format!(
                    "versions out of order: {} follows {}",
                    pair[1].version, pair[0].version
                )));
            }
        }

        Ok(Self {
            name: doc.name,
            versions,
        })
    }

    /// Canonical name of the kind this lineage schematizes
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All versions, oldest first
    pub fn versions(&self) -> &[VersionSchema] {
        &self.versions
    }

    /// Look up one version's schema
    pub fn schema(&self, version: SchemaVersion) -> Result<&VersionSchema> {
        self.versions
            .iter()
            .find(|s| s.version == version)
            .ok_or(Error::VersionNotFound {
                name: self.name.clone(),
                version,
            })
    }

    /// Verify the migration/validity relations between adjacent versions.
    ///
    /// Within one major, a successor may only add fields, added fields must
    /// be optional, and existing fields keep both kind and requiredness.
    /// Cross-major pairs are unconstrained. Violations surface as
    /// [`Error::InvalidLineage`], never a silent pass.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Error::InvalidLineage {
            name: self.name.clone(),
            reason,
        };

        for pair in self.versions.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if prev.version.major != next.version.major {
                continue;
            }

            for (name, spec) in &prev.fields {
                match next.fields.get(name) {
                    None => {
                        return Err(invalid(format!(
                            "field '{}' removed between {} and {}",
                            name, prev.version, next.version
                        )));
                    }
                    Some(succ) if succ.kind != spec.kind => {
                        return Err(invalid(format!(
                            "field '{}' changed kind between {} and {}",
                            name, prev.version, next.version
                        )));
                    }
                    Some(succ) if succ.required != spec.required => {
                        return Err(invalid(format!(
                            "field '{}' changed requiredness between {} and {}",
                            name, prev.version, next.version
                        )));
                    }
                    Some(_) => {}
                }
            }

            for (name, spec) in &next.fields {
                if !prev.fields.contains_key(name) && spec.required {
                    return Err(invalid(format!(
                        "field '{}' added as required in {}",
                        name, next.version
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    const ARTIFACT: &str = r#"
name: widget
versions:
  - version: "0.0"
    fields:
      title: { kind: string, required: true }
      count: { kind: number }
      tags: { kind: array }
  - version: "0.1"
    fields:
      title: { kind: string, required: true }
      count: { kind: number }
      tags: { kind: array }
      hidden: { kind: bool }
"#;

    #[test]
    fn test_parse_and_lookup() {
        let lin = Lineage::parse(ARTIFACT).unwrap();
        assert_eq!(lin.name(), "widget");
        assert_eq!(lin.versions().len(), 2);

        let zero = lin.schema(SchemaVersion::CANONICAL).unwrap();
        assert_eq!(zero.fields().len(), 3);

        assert_matches!(
            lin.schema(SchemaVersion::new(3, 0)),
            Err(Error::VersionNotFound { .. })
        );
    }

    #[test]
    fn test_parse_rejects_missing_canonical() {
        let artifact = r#"
name: widget
versions:
  - version: "1.0"
    fields:
      title: { kind: string, required: true }
"#;
        assert_matches!(
            Lineage::parse(artifact),
            Err(Error::InvalidLineage { .. })
        );
    }

    #[test]
    fn test_parse_rejects_out_of_order_versions() {
        let artifact = r#"
name: widget
versions:
  - version: "0.0"
  - version: "0.2"
  - version: "0.1"
"#;
        assert_matches!(
            Lineage::parse(artifact),
            Err(Error::InvalidLineage { .. })
        );
    }

    #[test]
    fn test_lineage_validate_rejects_removed_field() {
        let artifact = r#"
name: widget
versions:
  - version: "0.0"
    fields:
      title: { kind: string, required: true }
  - version: "0.1"
    fields: {}
"#;
        let lin = Lineage::parse(artifact).unwrap();
        assert_matches!(lin.validate(), Err(Error::InvalidLineage { .. }));
    }

    #[test]
    fn test_lineage_validate_rejects_required_addition() {
        let artifact = r#"
name: widget
versions:
  - version: "0.0"
    fields:
      title: { kind: string, required: true }
  - version: "0.1"
    fields:
      title: { kind: string, required: true }
      owner: { kind: string, required: true }
"#;
        let lin = Lineage::parse(artifact).unwrap();
        assert_matches!(lin.validate(), Err(Error::InvalidLineage { .. }));
    }

    #[test]
    fn test_lineage_validate_allows_major_break() {
        let artifact = r#"
name: widget
versions:
  - version: "0.0"
    fields:
      title: { kind: string, required: true }
  - version: "1.0"
    fields:
      label: { kind: string, required: true }
"#;
        let lin = Lineage::parse(artifact).unwrap();
        lin.validate().unwrap();
    }

    #[test]
    fn test_payload_validation() {
        let lin = Lineage::parse(ARTIFACT).unwrap();
        let zero = lin.schema(SchemaVersion::CANONICAL).unwrap();

        zero.validate("widget", &json!({ "title": "a", "count": 2 }))
            .unwrap();

        // Missing required field
        assert_matches!(
            zero.validate("widget", &json!({ "count": 2 })),
            Err(Error::Validation { .. })
        );

        // Kind mismatch
        assert_matches!(
            zero.validate("widget", &json!({ "title": 7 })),
            Err(Error::Validation { .. })
        );

        // Unknown field
        assert_matches!(
            zero.validate("widget", &json!({ "title": "a", "bogus": true })),
            Err(Error::Validation { .. })
        );
    }

    #[derive(Default, Serialize)]
    struct GoodModel {
        title: String,
        count: u32,
        tags: Vec<String>,
    }

    #[derive(Default, Serialize)]
    struct MissingField {
        count: u32,
        tags: Vec<String>,
    }

    #[derive(Default, Serialize)]
    struct DriftedModel {
        title: String,
        count: u32,
        tags: Vec<String>,
        extra: bool,
    }

    #[test]
    fn test_assignability() {
        let lin = Lineage::parse(ARTIFACT).unwrap();
        let zero = lin.schema(SchemaVersion::CANONICAL).unwrap();

        zero.assignable_to::<GoodModel>("widget").unwrap();
        assert_matches!(
            zero.assignable_to::<MissingField>("widget"),
            Err(Error::NotAssignable { .. })
        );
        assert_matches!(
            zero.assignable_to::<DriftedModel>("widget"),
            Err(Error::NotAssignable { .. })
        );
    }

    #[test]
    fn test_openapi_document() {
        let lin = Lineage::parse(ARTIFACT).unwrap();
        let doc = lin.schema(SchemaVersion::CANONICAL).unwrap().openapi_document();
        assert_eq!(doc["type"], "object");
        assert_eq!(doc["properties"]["title"]["type"], "string");
        assert_eq!(doc["required"], json!(["title"]));
    }

    #[test]
    fn test_version_parse_and_display() {
        let v = SchemaVersion::parse("1.4").unwrap();
        assert_eq!(v, SchemaVersion::new(1, 4));
        assert_eq!(v.to_string(), "1.4");
        assert!(SchemaVersion::parse("1").is_err());
        assert!(SchemaVersion::parse("a.b").is_err());
    }
}
