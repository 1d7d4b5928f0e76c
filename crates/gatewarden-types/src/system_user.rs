//! system user (credential identity) type.

use serde::{Deserialize, Serialize};

/// unique identifier for a system user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SystemUserId(pub u64);

impl From<u64> for SystemUserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SystemUserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// the credential identity a connection is made *as* (e.g. the
/// "root" or "deploy" account on a host). grants pair resources
/// with the system users that may be used to reach them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemUser {
    /// unique identifier.
    pub id: SystemUserId,

    /// display name.
    pub name: String,

    /// account name used on the remote side.
    pub username: String,

    /// protocol this credential applies to (e.g. "ssh").
    pub protocol: String,
}
