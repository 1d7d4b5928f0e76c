//! test utilities for creating fixture grants, assets and nodes.
//!
//! this module provides builder patterns for creating test instances
//! of gatewarden types without needing to specify all fields.

use chrono::{Duration, Utc};

use crate::{
    ActionSet, Asset, AssetId, Grant, GrantId, Node, NodeId, NodeKey, SystemUser, SystemUserId,
    User, UserGroupId, UserId,
};

/// builder for creating test [`Grant`] instances.
///
/// # example
/// ```
/// use gatewarden_types::test_utils::TestGrantBuilder;
/// use gatewarden_types::{ActionSet, UserId};
///
/// let grant = TestGrantBuilder::new(1)
///     .for_user(UserId(1))
///     .with_actions(ActionSet::CONNECT)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct TestGrantBuilder {
    id: u64,
    name: Option<String>,
    users: Vec<UserId>,
    user_groups: Vec<UserGroupId>,
    assets: Vec<AssetId>,
    nodes: Vec<NodeId>,
    system_users: Vec<SystemUserId>,
    actions: ActionSet,
    is_active: bool,
    expired: bool,
}

impl TestGrantBuilder {
    /// create a new builder with the given grant id.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            name: None,
            users: vec![],
            user_groups: vec![],
            assets: vec![],
            nodes: vec![],
            system_users: vec![SystemUserId(1)],
            actions: ActionSet::CONNECT,
            is_active: true,
            expired: false,
        }
    }

    /// add a direct user principal.
    pub fn for_user(mut self, user: UserId) -> Self {
        self.users.push(user);
        self
    }

    /// add a user-group principal.
    pub fn for_group(mut self, group: UserGroupId) -> Self {
        self.user_groups.push(group);
        self
    }

    /// add a directly granted asset.
    pub fn on_asset(mut self, asset: AssetId) -> Self {
        self.assets.push(asset);
        self
    }

    /// add a granted node.
    pub fn on_node(mut self, node: NodeId) -> Self {
        self.nodes.push(node);
        self
    }

    /// replace the credential identities (default: system user 1).
    pub fn with_system_users(mut self, system_users: Vec<SystemUserId>) -> Self {
        self.system_users = system_users;
        self
    }

    /// set the allowed actions (default: connect).
    pub fn with_actions(mut self, actions: ActionSet) -> Self {
        self.actions = actions;
        self
    }

    /// mark the grant inactive.
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// put the validity window entirely in the past.
    pub fn expired(mut self) -> Self {
        self.expired = true;
        self
    }

    /// build the grant.
    pub fn build(self) -> Grant {
        let now = Utc::now();
        let (start, end) = if self.expired {
            (now - Duration::days(2), now - Duration::days(1))
        } else {
            (now - Duration::days(1), now + Duration::days(365))
        };
        Grant {
            id: GrantId(self.id),
            name: self.name.unwrap_or_else(|| format!("grant-{}", self.id)),
            users: self.users,
            user_groups: self.user_groups,
            assets: self.assets,
            nodes: self.nodes,
            system_users: self.system_users,
            actions: self.actions,
            date_start: start,
            date_expired: end,
            is_active: self.is_active,
        }
    }
}

/// create a test asset with the given id, named "asset-{id}".
pub fn test_asset(id: u64) -> Asset {
    Asset {
        id: AssetId(id),
        name: format!("asset-{}", id),
        address: format!("10.0.0.{}", id),
        protocols: vec!["ssh".to_string()],
        is_active: true,
    }
}

/// create a test node with the given id and key.
pub fn test_node(id: u64, key: &str) -> Node {
    Node {
        id: NodeId(id),
        key: NodeKey::parse(key).expect("test node key must be valid"),
        value: format!("node-{}", id),
    }
}

/// create a test user with the given id, named "user-{id}".
pub fn test_user(id: u64) -> User {
    User {
        id: UserId(id),
        username: format!("user-{}", id),
        name: format!("User {}", id),
        is_active: true,
    }
}

/// create a test system user with the given id.
pub fn test_system_user(id: u64) -> SystemUser {
    SystemUser {
        id: SystemUserId(id),
        name: format!("sysuser-{}", id),
        username: format!("svc{}", id),
        protocol: "ssh".to_string(),
    }
}
