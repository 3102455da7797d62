//! Multi-version client dispatch
//!
//! One protocol client is constructed per distinct (group, version) pair
//! across all registered schemas, each from its own clone of the base
//! connection configuration so version-specific serialization settings
//! cannot leak between kinds. The client map is built once at startup and
//! read-only afterwards.

use std::collections::HashMap;

use async_trait::async_trait;
use kube::api::Api;
use kube::core::{ApiResource, DynamicObject};
use kube::{Client, Config};
use tracing::debug;

use crate::error::{Error, Result};
use crate::reconcile::Fetch;
use crate::schema::{CoreSchemaList, ObjectSchema};

/// Key of one protocol client
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GroupVersion {
    group: String,
    version: String,
}

impl GroupVersion {
    fn of(schema: &ObjectSchema) -> Self {
        Self {
            group: schema.group_name().to_string(),
            version: schema.group_version().to_string(),
        }
    }
}

// =============================================================================
// Clientset
// =============================================================================

/// Routes typed requests to the protocol client for a schema's group/version
pub struct Clientset {
    clients: HashMap<GroupVersion, Client>,
}

impl Clientset {
    /// Construct exactly one client per distinct (group, version) across
    /// `schemas`, each from a clone of `config`.
    pub fn new(config: &Config, schemas: &CoreSchemaList) -> Result<Self> {
        let mut clients = HashMap::with_capacity(schemas.len());

        for schema in schemas {
            let gv = GroupVersion::of(schema);
            if clients.contains_key(&gv) {
                continue;
            }

            debug!(group = %gv.group, version = %gv.version, "constructing protocol client");
            let client = Client::try_from(config.clone())?;
            clients.insert(gv, client);
        }

        Ok(Self { clients })
    }

    /// Number of distinct (group, version) clients held
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Client for a schema's (group, version).
    ///
    /// A missing client is a registration/construction ordering bug, not a
    /// transient condition.
    pub fn client_for_schema(&self, schema: &ObjectSchema) -> Result<&Client> {
        let gv = GroupVersion::of(schema);
        self.clients
            .get(&gv)
            .ok_or(Error::ClientNotRegistered {
                group: gv.group,
                version: gv.version,
            })
    }
}

// The held clients carry no useful Debug form of their own.
impl std::fmt::Debug for Clientset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<String> = self
            .clients
            .keys()
            .map(|gv| format!("{}/{}", gv.group, gv.version))
            .collect();
        keys.sort();
        f.debug_struct("Clientset").field("clients", &keys).finish()
    }
}

// =============================================================================
// Dynamic Fetcher
// =============================================================================

/// Transport-level [`Fetch`] over one kind's client and wire descriptor.
///
/// An apiserver 404 is surfaced as a structured [`Error::NotFound`], so
/// callers branch on the reason rather than on error identity.
pub struct DynamicFetcher {
    client: Client,
    resource: ApiResource,
}

impl DynamicFetcher {
    pub fn new(client: Client, resource: ApiResource) -> Self {
        Self { client, resource }
    }
}

#[async_trait]
impl Fetch<DynamicObject> for DynamicFetcher {
    async fn fetch(&self, namespace: &str, name: &str) -> Result<DynamicObject> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &self.resource);

        match api.get(name).await {
            Ok(obj) => Ok(obj),
            Err(kube::Error::Api(resp)) if resp.code == 404 => {
                Err(Error::not_found(&self.resource.kind, name))
            }
            Err(err) => Err(err.into()),
        }
    }
}
