//! user and user-group types.

use serde::{Deserialize, Serialize};

/// unique identifier for a user.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct UserId(pub u64);

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// unique identifier for a user group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserGroupId(pub u64);

impl From<u64> for UserGroupId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserGroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// a human user that grants apply to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// unique identifier.
    pub id: UserId,

    /// login name, unique.
    pub username: String,

    /// display name.
    pub name: String,

    /// inactive users resolve to no access.
    pub is_active: bool,
}

/// a named group of users. membership lives in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGroup {
    /// unique identifier.
    pub id: UserGroupId,

    /// display name.
    pub name: String,
}
