use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Bridge-level defaults for one host process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Root directory under which per-task spill directories are created.
    pub spill_root: String,
    /// Target row count per columnar batch requested from the native side.
    pub batch_size_rows: usize,
    /// When set, the native side persists its inputs for offline debugging.
    pub save_input: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            spill_root: ".nvq_spill".to_string(),
            batch_size_rows: 8192,
            save_input: false,
        }
    }
}

/// Key prefixes the native engine recognizes in its session configuration.
///
/// Host session properties outside these prefixes are dropped before the map
/// is serialized into the plan extension; the native side never sees them.
pub const NATIVE_CONF_PREFIXES: &[&str] = &["spill.", "memory.", "batch.", "codegen."];

/// Host-supplied session properties threaded into plan assembly.
///
/// Replaces ambient session-config lookup with an explicit argument: callers
/// construct one per execution request and pass it down, so there is no
/// hidden coupling to a global session object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    entries: BTreeMap<String, String>,
}

impl SessionConfig {
    /// Empty session configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets one property, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Looks up one property.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Properties the native engine recognizes, in sorted key order.
    ///
    /// Sorted order makes downstream serialization deterministic for
    /// identical inputs.
    #[must_use]
    pub fn native_subset(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .filter(|(k, _)| NATIVE_CONF_PREFIXES.iter().any(|p| k.starts_with(p)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl FromIterator<(String, String)> for SessionConfig {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
