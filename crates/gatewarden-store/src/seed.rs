//! declarative directory contents, loadable from a file at startup.
//!
//! the seed is a plain serde document so operators can keep the whole
//! directory in version control and feed it to `gatewarden serve
//! --directory-file`. applying a seed replaces nothing: entities are
//! upserted on top of whatever the store already holds.

use serde::Deserialize;

use gatewarden_types::{
    Asset, AssetId, Grant, Node, SystemUser, User, UserGroup, UserGroupId, UserId,
};

use crate::MemStore;

/// full directory contents for bootstrapping a store.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DirectorySeed {
    /// user accounts.
    pub users: Vec<User>,
    /// user groups.
    pub groups: Vec<UserGroup>,
    /// group memberships, keyed by group id.
    pub group_members: Vec<GroupMembersSeed>,
    /// credential identities.
    pub system_users: Vec<SystemUser>,
    /// connectable endpoints.
    pub assets: Vec<Asset>,
    /// hierarchy nodes. keys must already form a consistent tree.
    pub nodes: Vec<Node>,
    /// asset-to-node placements, keyed by asset id.
    pub memberships: Vec<AssetMembershipSeed>,
    /// permission grants.
    pub grants: Vec<Grant>,
    /// per-user favorite assets.
    pub favorites: Vec<FavoriteSeed>,
}

/// members of one group.
#[derive(Debug, Deserialize)]
pub struct GroupMembersSeed {
    /// the group.
    pub group: UserGroupId,
    /// its members.
    pub members: Vec<UserId>,
}

/// the nodes one asset lives under.
#[derive(Debug, Deserialize)]
pub struct AssetMembershipSeed {
    /// the asset.
    pub asset: AssetId,
    /// node ids it is placed under.
    pub nodes: Vec<gatewarden_types::NodeId>,
}

/// one user's favorite assets.
#[derive(Debug, Deserialize)]
pub struct FavoriteSeed {
    /// the user.
    pub user: UserId,
    /// their favorites.
    pub assets: Vec<AssetId>,
}

impl MemStore {
    /// upsert everything in `seed` into the store.
    ///
    /// intended for startup, before the invalidation bus is serving
    /// traffic, so the mutation events the individual upserts would
    /// produce are deliberately discarded.
    pub fn apply_seed(&self, seed: DirectorySeed) {
        for user in seed.users {
            self.upsert_user(user);
        }
        for group in seed.groups {
            self.upsert_group(group);
        }
        for system_user in seed.system_users {
            self.upsert_system_user(system_user);
        }
        for asset in seed.assets {
            self.upsert_asset(asset);
        }
        for node in seed.nodes {
            self.upsert_node(node);
        }
        for membership in seed.group_members {
            let _ = self.set_group_members(membership.group, membership.members);
        }
        for placement in seed.memberships {
            for node in placement.nodes {
                let _ = self.link_asset(placement.asset, node);
            }
        }
        for grant in seed.grants {
            let _ = self.upsert_grant(grant);
        }
        for favorite in seed.favorites {
            for asset in favorite.assets {
                self.mark_favorite(favorite.user, asset);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use gatewarden_engine::Directory;
    use gatewarden_types::NodeKey;

    use super::*;

    #[tokio::test]
    async fn seed_round_trips_through_the_directory() {
        let raw = r#"{
            "users": [
                {"id": 1, "username": "alice", "name": "Alice", "is_active": true}
            ],
            "groups": [{"id": 1, "name": "ops"}],
            "group_members": [{"group": 1, "members": [1]}],
            "system_users": [
                {"id": 1, "name": "root", "username": "root", "protocol": "ssh"}
            ],
            "assets": [
                {"id": 101, "name": "db01", "address": "10.0.0.1",
                 "protocols": ["ssh"], "is_active": true}
            ],
            "nodes": [
                {"id": 1, "key": "1", "value": "Default"},
                {"id": 2, "key": "1:4", "value": "prod"}
            ],
            "memberships": [{"asset": 101, "nodes": [2]}],
            "grants": [
                {"id": 1, "name": "ops-prod", "users": [], "user_groups": [1],
                 "assets": [], "nodes": [2], "system_users": [1], "actions": 3,
                 "date_start": "2020-01-01T00:00:00Z",
                 "date_expired": "2099-01-01T00:00:00Z", "is_active": true}
            ],
            "favorites": [{"user": 1, "assets": [101]}]
        }"#;
        let seed: DirectorySeed = serde_json::from_str(raw).unwrap();

        let store = MemStore::new();
        store.apply_seed(seed);

        let groups = store.groups_of(UserId(1)).await.unwrap();
        assert_eq!(groups, vec![UserGroupId(1)]);
        let prod: NodeKey = "1:4".parse().unwrap();
        let assets = store.node_asset_ids(&prod).await.unwrap();
        assert_eq!(assets, vec![AssetId(101)]);
        assert_eq!(store.favorites(UserId(1)).await.unwrap(), vec![AssetId(101)]);
    }
}
