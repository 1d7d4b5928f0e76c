//! copy-on-write in-memory store.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use gatewarden_engine::{Directory, DirectoryError, MutationEvent};
use gatewarden_types::{
    Asset, AssetId, Grant, GrantId, Node, NodeId, NodeKey, SystemUser, SystemUserId, User,
    UserGroup, UserGroupId, UserId,
};

type Result<T> = std::result::Result<T, DirectoryError>;

/// one immutable generation of the directory contents.
#[derive(Debug, Clone, Default)]
struct State {
    users: HashMap<UserId, User>,
    groups: HashMap<UserGroupId, UserGroup>,
    group_members: HashMap<UserGroupId, BTreeSet<UserId>>,
    system_users: HashMap<SystemUserId, SystemUser>,
    assets: HashMap<AssetId, Asset>,
    nodes: HashMap<NodeId, Node>,
    /// asset → nodes it belongs to. kept by id so node moves don't
    /// orphan memberships.
    asset_nodes: HashMap<AssetId, BTreeSet<NodeId>>,
    favorites: HashMap<UserId, BTreeSet<AssetId>>,
    grants: HashMap<GrantId, Grant>,
}

impl State {
    fn node_id_by_key(&self, key: &NodeKey) -> Option<NodeId> {
        self.nodes
            .values()
            .find(|node| &node.key == key)
            .map(|node| node.id)
    }
}

/// in-memory directory with copy-on-write semantics.
///
/// reads grab the current `Arc<State>` and never block writers; writes
/// clone the state, mutate the clone and swap it in. clones of the
/// store share the same underlying state.
#[derive(Clone)]
pub struct MemStore {
    state: Arc<RwLock<Arc<State>>>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    /// create an empty store.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(Arc::new(State::default()))),
        }
    }

    fn snapshot(&self) -> Arc<State> {
        Arc::clone(&self.state.read().expect("state lock poisoned"))
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut guard = self.state.write().expect("state lock poisoned");
        let mut next = (**guard).clone();
        let out = f(&mut next);
        *guard = Arc::new(next);
        out
    }

    // ─── directory content ──────────────────────────────────────────

    /// insert or replace a user.
    pub fn upsert_user(&self, user: User) {
        self.mutate(|state| {
            state.users.insert(user.id, user);
        });
    }

    /// insert or replace a user group.
    pub fn upsert_group(&self, group: UserGroup) {
        self.mutate(|state| {
            state.groups.insert(group.id, group);
        });
    }

    /// insert or replace a system user.
    pub fn upsert_system_user(&self, system_user: SystemUser) {
        self.mutate(|state| {
            state.system_users.insert(system_user.id, system_user);
        });
    }

    /// insert or replace an asset.
    pub fn upsert_asset(&self, asset: Asset) {
        self.mutate(|state| {
            state.assets.insert(asset.id, asset);
        });
    }

    /// insert or replace a hierarchy node.
    pub fn upsert_node(&self, node: Node) {
        self.mutate(|state| {
            state.nodes.insert(node.id, node);
        });
    }

    /// mark an asset favorite for a user. the caller is responsible
    /// for invalidating that user's cached view.
    pub fn mark_favorite(&self, user: UserId, asset: AssetId) {
        self.mutate(|state| {
            state.favorites.entry(user).or_default().insert(asset);
        });
    }

    // ─── mutations that produce invalidation events ─────────────────

    /// replace a group's membership, returning the event describing the
    /// delta for the invalidation bus.
    pub fn set_group_members(
        &self,
        group: UserGroupId,
        members: Vec<UserId>,
    ) -> MutationEvent {
        self.mutate(|state| {
            let next: BTreeSet<UserId> = members.into_iter().collect();
            let previous = state.group_members.insert(group, next.clone()).unwrap_or_default();
            MutationEvent::GroupMembershipChanged {
                group,
                added: next.difference(&previous).copied().collect(),
                removed: previous.difference(&next).copied().collect(),
            }
        })
    }

    /// insert or replace a grant.
    pub fn upsert_grant(&self, grant: Grant) -> MutationEvent {
        self.mutate(|state| {
            let id = grant.id;
            state.grants.insert(id, grant);
            MutationEvent::GrantChanged(id)
        })
    }

    /// delete a grant.
    pub fn remove_grant(&self, id: GrantId) -> MutationEvent {
        self.mutate(|state| {
            state.grants.remove(&id);
            MutationEvent::GrantChanged(id)
        })
    }

    /// put an asset on a node.
    pub fn link_asset(&self, asset: AssetId, node: NodeId) -> MutationEvent {
        self.mutate(|state| {
            state.asset_nodes.entry(asset).or_default().insert(node);
            MutationEvent::HierarchyChanged(node)
        })
    }

    /// take an asset off a node.
    pub fn unlink_asset(&self, asset: AssetId, node: NodeId) -> MutationEvent {
        self.mutate(|state| {
            if let Some(nodes) = state.asset_nodes.get_mut(&asset) {
                nodes.remove(&node);
            }
            MutationEvent::HierarchyChanged(node)
        })
    }

    /// move a node (and its whole subtree) to a new key.
    pub fn move_node(&self, id: NodeId, new_key: NodeKey) -> MutationEvent {
        self.mutate(|state| {
            let Some(old_key) = state.nodes.get(&id).map(|node| node.key.clone()) else {
                return MutationEvent::HierarchyChanged(id);
            };
            let descendants: Vec<NodeId> = state
                .nodes
                .values()
                .filter(|node| old_key.is_ancestor_of(&node.key))
                .map(|node| node.id)
                .collect();
            for descendant in descendants {
                if let Some(node) = state.nodes.get_mut(&descendant) {
                    let suffix = node.key.as_str()[old_key.as_str().len()..].to_string();
                    let rewritten = format!("{}{}", new_key.as_str(), suffix);
                    if let Ok(key) = NodeKey::parse(&rewritten) {
                        node.key = key;
                    }
                }
            }
            if let Some(node) = state.nodes.get_mut(&id) {
                node.key = new_key;
            }
            MutationEvent::HierarchyChanged(id)
        })
    }
}

impl Directory for MemStore {
    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.snapshot().users.get(&id).cloned())
    }

    async fn groups_of(&self, user: UserId) -> Result<Vec<UserGroupId>> {
        let state = self.snapshot();
        let mut groups: Vec<UserGroupId> = state
            .group_members
            .iter()
            .filter(|(_, members)| members.contains(&user))
            .map(|(group, _)| *group)
            .collect();
        groups.sort();
        Ok(groups)
    }

    async fn group_members(&self, group: UserGroupId) -> Result<Vec<UserId>> {
        Ok(self
            .snapshot()
            .group_members
            .get(&group)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn get_grant(&self, id: GrantId) -> Result<Option<Grant>> {
        Ok(self.snapshot().grants.get(&id).cloned())
    }

    async fn list_effective_grants(
        &self,
        user: UserId,
        groups: &[UserGroupId],
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Grant>> {
        let state = self.snapshot();
        let mut grants: Vec<Grant> = state
            .grants
            .values()
            .filter(|grant| grant.is_effective(as_of) && grant.applies_to(user, groups))
            .cloned()
            .collect();
        grants.sort_by_key(|grant| grant.id);
        Ok(grants)
    }

    async fn get_node(&self, id: NodeId) -> Result<Option<Node>> {
        Ok(self.snapshot().nodes.get(&id).cloned())
    }

    async fn nodes_by_keys(&self, keys: &[NodeKey]) -> Result<Vec<Node>> {
        let state = self.snapshot();
        let mut nodes: Vec<Node> = state
            .nodes
            .values()
            .filter(|node| keys.contains(&node.key))
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(nodes)
    }

    async fn descendants(&self, key: &NodeKey) -> Result<Vec<Node>> {
        let state = self.snapshot();
        let mut nodes: Vec<Node> = state
            .nodes
            .values()
            .filter(|node| key.is_ancestor_of(&node.key))
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(nodes)
    }

    async fn assets_by_ids(&self, ids: &[AssetId]) -> Result<Vec<Asset>> {
        let state = self.snapshot();
        let mut assets: Vec<Asset> = ids
            .iter()
            .filter_map(|id| state.assets.get(id).cloned())
            .collect();
        assets.sort_by_key(|asset| asset.id);
        assets.dedup_by_key(|asset| asset.id);
        Ok(assets)
    }

    async fn asset_memberships(&self, asset: AssetId) -> Result<Vec<NodeKey>> {
        let state = self.snapshot();
        let mut keys: Vec<NodeKey> = state
            .asset_nodes
            .get(&asset)
            .into_iter()
            .flatten()
            .filter_map(|node_id| state.nodes.get(node_id).map(|node| node.key.clone()))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn node_asset_ids(&self, key: &NodeKey) -> Result<Vec<AssetId>> {
        let state = self.snapshot();
        let Some(node_id) = state.node_id_by_key(key) else {
            return Ok(Vec::new());
        };
        let mut ids: Vec<AssetId> = state
            .asset_nodes
            .iter()
            .filter(|(_, nodes)| nodes.contains(&node_id))
            .map(|(asset, _)| *asset)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn get_system_user(&self, id: SystemUserId) -> Result<Option<SystemUser>> {
        Ok(self.snapshot().system_users.get(&id).cloned())
    }

    async fn favorites(&self, user: UserId) -> Result<Vec<AssetId>> {
        Ok(self
            .snapshot()
            .favorites
            .get(&user)
            .map(|assets| assets.iter().copied().collect())
            .unwrap_or_default())
    }
}
