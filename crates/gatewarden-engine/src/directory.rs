//! read-only provider interface the engine consumes.
//!
//! storage of users, groups, assets, nodes and grants is somebody else's
//! job; the engine only needs these lookups. implementations must be
//! cheaply cloneable handles (the cache clones them into background
//! rebuild tasks).

use std::future::Future;

use chrono::{DateTime, Utc};
use gatewarden_types::{
    Asset, AssetId, Grant, GrantId, Node, NodeId, NodeKey, SystemUser, SystemUserId, User,
    UserGroupId, UserId,
};

use crate::error::DirectoryError;

type Result<T> = std::result::Result<T, DirectoryError>;

/// read accessor over the persisted entities the engine resolves against.
///
/// every method reads *current* state: invalidation events carry only
/// identifiers, and the engine re-reads through this trait to avoid
/// stale-event races.
pub trait Directory: Clone + Send + Sync + 'static {
    // ─── users & groups ─────────────────────────────────────────────

    /// get a user by id. `None` if unknown.
    fn get_user(&self, id: UserId) -> impl Future<Output = Result<Option<User>>> + Send;

    /// ids of the groups a user belongs to.
    fn groups_of(&self, user: UserId) -> impl Future<Output = Result<Vec<UserGroupId>>> + Send;

    /// ids of the members of a group. unknown groups resolve to empty.
    fn group_members(&self, group: UserGroupId)
    -> impl Future<Output = Result<Vec<UserId>>> + Send;

    // ─── grants ─────────────────────────────────────────────────────

    /// get a grant by id. `None` if deleted.
    fn get_grant(&self, id: GrantId) -> impl Future<Output = Result<Option<Grant>>> + Send;

    /// grants that are effective at `as_of` and whose principal set
    /// intersects `{user} ∪ groups`.
    fn list_effective_grants(
        &self,
        user: UserId,
        groups: &[UserGroupId],
        as_of: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Grant>>> + Send;

    // ─── hierarchy ──────────────────────────────────────────────────

    /// get a node by id. `None` if unknown.
    fn get_node(&self, id: NodeId) -> impl Future<Output = Result<Option<Node>>> + Send;

    /// get nodes by key, skipping keys that don't exist.
    fn nodes_by_keys(&self, keys: &[NodeKey]) -> impl Future<Output = Result<Vec<Node>>> + Send;

    /// all strict descendants of `key`, by key-prefix match.
    fn descendants(&self, key: &NodeKey) -> impl Future<Output = Result<Vec<Node>>> + Send;

    // ─── assets ─────────────────────────────────────────────────────

    /// get assets by id, skipping ids that don't exist.
    fn assets_by_ids(&self, ids: &[AssetId]) -> impl Future<Output = Result<Vec<Asset>>> + Send;

    /// keys of the nodes an asset belongs to (possibly empty).
    fn asset_memberships(&self, asset: AssetId)
    -> impl Future<Output = Result<Vec<NodeKey>>> + Send;

    /// ids of the assets directly on a node (own membership only,
    /// no descendants).
    fn node_asset_ids(&self, key: &NodeKey) -> impl Future<Output = Result<Vec<AssetId>>> + Send;

    // ─── system users & favorites ───────────────────────────────────

    /// get a system user by id. `None` if unknown.
    fn get_system_user(
        &self,
        id: SystemUserId,
    ) -> impl Future<Output = Result<Option<SystemUser>>> + Send;

    /// ids of the assets a user marked favorite.
    fn favorites(&self, user: UserId) -> impl Future<Output = Result<Vec<AssetId>>> + Send;
}
