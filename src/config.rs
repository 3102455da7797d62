//! Bridge configuration
//!
//! The bridge is configured from a named section of the owning process's
//! configuration and gated by a feature flag; both collaborators live
//! outside this crate, which only defines the shapes it consumes.

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

use crate::reconcile::BackoffPolicy;

/// Feature flag gating the whole subsystem
pub const FLAG_COREMODEL_BRIDGE: &str = "coremodelBridge";

/// Configuration section for the bridge service
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Path to the connection descriptor (kubeconfig). Required whenever
    /// the bridge feature is enabled.
    pub kubeconfig_path: String,

    /// Fixed requeue delay, in seconds, applied to transient
    /// reconciliation failures
    pub requeue_delay_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            kubeconfig_path: String::new(),
            requeue_delay_secs: 60,
        }
    }
}

impl BridgeConfig {
    /// Backoff policy shared by every reconciler the bridge registers
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::fixed(Duration::from_secs(self.requeue_delay_secs))
    }
}

/// Set of enabled feature flags, as evaluated by the owning process
#[derive(Debug, Clone, Default)]
pub struct FeatureFlags {
    enabled: HashSet<String>,
}

impl FeatureFlags {
    pub fn new<I, S>(flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            enabled: flags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn enable(&mut self, flag: impl Into<String>) {
        self.enabled.insert(flag.into());
    }

    pub fn is_enabled(&self, flag: &str) -> bool {
        self.enabled.contains(flag)
    }
}
