//! permission grant type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::ActionSet;
use crate::asset::AssetId;
use crate::node::NodeId;
use crate::system_user::SystemUserId;
use crate::user::{UserGroupId, UserId};

/// unique identifier for a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GrantId(pub u64);

impl From<u64> for GrantId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for GrantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// a rule binding principals to resources, credential identities and
/// allowed actions, valid over a time window.
///
/// the engine treats grants as an immutable read model: they are created
/// and mutated elsewhere, and every mutation arrives as an invalidation
/// event carrying only ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// unique identifier.
    pub id: GrantId,

    /// name, unique per deployment.
    pub name: String,

    /// users this grant applies to directly.
    #[serde(default)]
    pub users: Vec<UserId>,

    /// user groups this grant applies to. membership is resolved at
    /// expansion time, never snapshotted into the grant.
    #[serde(default)]
    pub user_groups: Vec<UserGroupId>,

    /// directly granted assets.
    #[serde(default)]
    pub assets: Vec<AssetId>,

    /// granted hierarchy nodes. node membership is transitive: granting
    /// a node grants all its current and future descendant assets.
    #[serde(default)]
    pub nodes: Vec<NodeId>,

    /// credential identities usable on the granted resources.
    #[serde(default)]
    pub system_users: Vec<SystemUserId>,

    /// allowed actions.
    pub actions: ActionSet,

    /// start of the validity window.
    pub date_start: DateTime<Utc>,

    /// end of the validity window.
    pub date_expired: DateTime<Utc>,

    /// inactive grants convey nothing regardless of the window.
    pub is_active: bool,
}

impl Grant {
    /// true if the grant conveys access at `now`:
    /// active and strictly inside its validity window.
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.date_start < now && now < self.date_expired
    }

    /// true if the grant names no principal at all.
    ///
    /// such a grant is valid but can never match anyone.
    pub fn has_no_principals(&self) -> bool {
        self.users.is_empty() && self.user_groups.is_empty()
    }

    /// true if `user` (directly) or any of `groups` appears in the
    /// grant's principal sets.
    pub fn applies_to(&self, user: UserId, groups: &[UserGroupId]) -> bool {
        self.users.contains(&user) || groups.iter().any(|g| self.user_groups.contains(g))
    }
}
