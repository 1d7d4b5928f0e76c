//! managed asset type.

use serde::{Deserialize, Serialize};

/// unique identifier for an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub u64);

impl From<u64> for AssetId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// a managed remote asset (host, database, application, ...).
///
/// an asset belongs to zero or more hierarchy nodes; that membership
/// lives in the directory, not on the asset itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// unique identifier.
    pub id: AssetId,

    /// display name.
    pub name: String,

    /// network address (hostname or ip).
    pub address: String,

    /// protocols the asset speaks (e.g. "ssh", "rdp").
    pub protocols: Vec<String>,

    /// inactive assets stay in the directory but are skipped
    /// by the resolution engine.
    pub is_active: bool,
}

impl Asset {
    /// true if `needle` case-insensitively matches the name or address.
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.name.to_lowercase().contains(&needle)
            || self.address.to_lowercase().contains(&needle)
    }
}
