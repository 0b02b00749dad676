//! Archive settings.

use serde::{Deserialize, Serialize};

use crate::canonical::canonical_hash_hex;
use crate::graph::GraphOptions;

/// Default prefix of generated node names.
pub const DEFAULT_GNAME_PREFIX: &str = "_g";

/// Default name of the side-data table.
pub const DEFAULT_DATA_NAME: &str = "_arrays";

/// Settings for one [`Archive`](super::Archive).
///
/// ## Parameters
///
/// - `scoped`: render each node in its own function scope instead of one
///   flat namespace
/// - `tostring`: inline arrays as packed bytes rather than printed text
/// - `check_on_insert`: compute the representation of each inserted object
///   immediately so unarchivable objects fail at insertion
/// - `array_threshold`: arrays with more elements go to the side-data table
///   (`None` never offloads)
/// - `backup_data`: keep `.bak` copies of overwritten side-data files
/// - `single_item_mode`: the archive holds exactly one named object
/// - `allowed_names`: underscore-prefixed names that may still be inserted
/// - `gname_prefix`: prefix of generated node names
/// - `robust_replace`: use the parse-tree substitution engine
/// - `data_name`: name the side-data table is bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Scoped rendering.
    pub scoped: bool,
    /// Packed-byte array representation.
    pub tostring: bool,
    /// Eager validation on insert.
    pub check_on_insert: bool,
    /// Largest array size that is inlined.
    pub array_threshold: Option<usize>,
    /// Keep backups of overwritten side data.
    pub backup_data: bool,
    /// Only one object may be inserted.
    pub single_item_mode: bool,
    /// Underscore-prefixed names that are allowed.
    pub allowed_names: Vec<String>,
    /// Prefix of generated names.
    pub gname_prefix: String,
    /// Exact substitution engine.
    pub robust_replace: bool,
    /// Side-data table name.
    pub data_name: String,
}

impl ArchiveConfig {
    /// Parse a config from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Set scoped rendering.
    pub fn with_scoped(mut self, scoped: bool) -> Self {
        self.scoped = scoped;
        self
    }

    /// Set the array representation.
    pub fn with_tostring(mut self, tostring: bool) -> Self {
        self.tostring = tostring;
        self
    }

    /// Set eager validation.
    pub fn with_check_on_insert(mut self, check: bool) -> Self {
        self.check_on_insert = check;
        self
    }

    /// Set the array offload threshold.
    pub fn with_array_threshold(mut self, threshold: Option<usize>) -> Self {
        self.array_threshold = threshold;
        self
    }

    /// Set whether side-data backups are kept.
    pub fn with_backup_data(mut self, backup: bool) -> Self {
        self.backup_data = backup;
        self
    }

    /// Set single-item mode.
    pub fn with_single_item_mode(mut self, single: bool) -> Self {
        self.single_item_mode = single;
        self
    }

    /// Allow an underscore-prefixed name.
    pub fn with_allowed_name(mut self, name: impl Into<String>) -> Self {
        self.allowed_names.push(name.into());
        self
    }

    /// Set the generated-name prefix.
    pub fn with_gname_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.gname_prefix = prefix.into();
        self
    }

    /// Select the substitution engine.
    pub fn with_robust_replace(mut self, robust: bool) -> Self {
        self.robust_replace = robust;
        self
    }

    /// Set the side-data table name.
    pub fn with_data_name(mut self, name: impl Into<String>) -> Self {
        self.data_name = name.into();
        self
    }

    /// Whether `name` is explicitly allowed.
    pub fn is_allowed(&self, name: &str) -> bool {
        self.allowed_names.iter().any(|allowed| allowed == name)
    }

    /// Options for graph construction.
    pub fn graph_options(&self) -> GraphOptions {
        GraphOptions {
            robust_replace: self.robust_replace,
            gname_prefix: self.gname_prefix.clone(),
        }
    }

    /// Hash of the settings, stable across runs.
    pub fn params_hash(&self) -> Result<String, serde_json::Error> {
        canonical_hash_hex(self)
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            scoped: true,
            tostring: true,
            check_on_insert: false,
            array_threshold: None,
            backup_data: true,
            single_item_mode: false,
            allowed_names: Vec::new(),
            gname_prefix: DEFAULT_GNAME_PREFIX.to_string(),
            robust_replace: true,
            data_name: DEFAULT_DATA_NAME.to_string(),
        }
    }
}
