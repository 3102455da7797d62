//! Translation kernels
//!
//! A kernel is a compiled JSON decoder bound to one lineage and one target
//! schema version. Construction validates the whole lineage; decoding
//! validates each payload against the target version before deserializing
//! it into the internal model type.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Result;
use crate::schema::lineage::{Lineage, SchemaVersion, VersionSchema};

/// A compiled, validated decoder from raw JSON payloads into one kind's
/// internal model type `T`.
pub struct TranslationKernel<T> {
    lineage_name: String,
    schema: VersionSchema,
    _model: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> TranslationKernel<T> {
    /// Bind a kernel to `lineage` targeting version `to`.
    ///
    /// Fails if the lineage's internal consistency checks fail for any
    /// adjacent version pair, or if the target version does not exist.
    pub fn new(lineage: &Lineage, to: SchemaVersion) -> Result<Self> {
        lineage.validate()?;
        let schema = lineage.schema(to)?.clone();

        Ok(Self {
            lineage_name: lineage.name().to_string(),
            schema,
            _model: PhantomData,
        })
    }

    /// Name of the lineage this kernel is bound to
    pub fn lineage_name(&self) -> &str {
        &self.lineage_name
    }

    /// Version the kernel decodes to
    pub fn target_version(&self) -> SchemaVersion {
        self.schema.version()
    }

    /// Decode a raw JSON payload into the model type, failing if the
    /// payload does not conform to the target schema version.
    pub fn decode(&self, raw: &[u8]) -> Result<T> {
        let value: Value = serde_json::from_slice(raw)?;
        self.decode_value(value)
    }

    /// Decode an already-parsed JSON value into the model type.
    ///
    /// An explicit null means "unset": validation treats it as an absent
    /// field, so it is dropped here and the model field takes its default
    /// instead of failing deserialization.
    pub fn decode_value(&self, mut value: Value) -> Result<T> {
        self.schema.validate(&self.lineage_name, &value)?;
        if let Value::Object(map) = &mut value {
            map.retain(|_, v| !v.is_null());
        }
        Ok(serde_json::from_value(value)?)
    }
}

impl<T> Clone for TranslationKernel<T> {
    fn clone(&self) -> Self {
        Self {
            lineage_name: self.lineage_name.clone(),
            schema: self.schema.clone(),
            _model: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for TranslationKernel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationKernel")
            .field("lineage", &self.lineage_name)
            .field("target", &self.schema.version())
            .finish()
    }
}
