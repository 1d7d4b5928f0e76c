//! per-user materialized tree over the asset hierarchy.
//!
//! [`materialize`] turns an [`EffectiveAccess`] set into a single
//! immutable snapshot: every node the user's tree should show, with its
//! grant status and asset counts, plus the full asset → account → action
//! map. the snapshot is replaced wholesale on rebuild, never patched.

use std::collections::{BTreeMap, BTreeSet};

use gatewarden_types::{Asset, AssetId, Node, NodeKey, UserId};
use serde::Serialize;

use crate::directory::Directory;
use crate::error::Result;
use crate::expand::{AccountMap, EffectiveAccess, Provenance};

/// key of the synthetic node listing the user's favorite assets.
pub const FAVORITE_NODE_KEY: &str = "favorite";

/// key of the synthetic node listing accessible assets outside the
/// hierarchy.
pub const UNGROUPED_NODE_KEY: &str = "ungrouped";

/// why a node appears in a user's tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeStatus {
    /// the node itself is granted.
    Granted,
    /// a strict ancestor is granted, so the whole subtree is.
    Indirect,
    /// not granted; shown only because a descendant node or a
    /// contained asset is granted.
    Visible,
}

impl NodeStatus {
    /// true if the node's own assets are all accessible.
    pub fn grants_assets(self) -> bool {
        matches!(self, NodeStatus::Granted | NodeStatus::Indirect)
    }
}

/// one node of the materialized tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRecord {
    /// the hierarchy node.
    pub node: Node,
    /// why it is in the tree.
    pub status: NodeStatus,
    /// accessible assets on this node specifically (own memberships
    /// intersected with the accessible set), ordered by name.
    pub asset_ids: Vec<AssetId>,
    /// `asset_ids.len()`, kept separate so collapsed UI nodes don't
    /// need the id list.
    pub asset_count: usize,
    /// own count plus the counts of every descendant in the tree.
    pub asset_count_total: usize,
}

/// the precomputed, per-user view of reachable nodes and assets.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MaterializedUserTree {
    /// the user this view belongs to.
    pub user: UserId,
    /// every visible node, keyed (and ordered) by node key.
    pub nodes: BTreeMap<NodeKey, NodeRecord>,
    /// accessible asset → system user → allowed actions. the action set
    /// is the union over all reachable paths.
    pub asset_actions: BTreeMap<AssetId, AccountMap>,
    /// display data for every accessible asset.
    pub assets: BTreeMap<AssetId, Asset>,
    /// accessible assets the user marked favorite, ordered by name.
    pub favorite_assets: Vec<AssetId>,
    /// accessible assets not belonging to any node, ordered by name.
    pub ungrouped_assets: Vec<AssetId>,
}

impl MaterializedUserTree {
    /// records whose node is a direct child of `parent`
    /// (`None` = root nodes).
    pub fn children(&self, parent: Option<&NodeKey>) -> Vec<&NodeRecord> {
        self.nodes
            .values()
            .filter(|record| match parent {
                Some(key) => key.is_parent_of(&record.node.key),
                None => record.node.key.depth() == 1,
            })
            .collect()
    }

    /// the record for `key`, if visible.
    pub fn node(&self, key: &NodeKey) -> Option<&NodeRecord> {
        self.nodes.get(key)
    }

    /// all accessible asset ids, ordered by name.
    pub fn all_asset_ids(&self) -> Vec<AssetId> {
        let mut ids: Vec<AssetId> = self.asset_actions.keys().copied().collect();
        self.sort_by_name(&mut ids);
        ids
    }

    /// true if `system_user` may perform `action` on `asset`.
    pub fn allows(
        &self,
        asset: AssetId,
        system_user: gatewarden_types::SystemUserId,
        action: gatewarden_types::Action,
    ) -> bool {
        self.asset_actions
            .get(&asset)
            .and_then(|accounts| accounts.get(&system_user))
            .is_some_and(|entry| entry.actions.allows(action))
    }

    fn sort_by_name(&self, ids: &mut [AssetId]) {
        ids.sort_by(|a, b| {
            let name = |id: &AssetId| self.assets.get(id).map(|a| a.name.as_str()).unwrap_or("");
            name(a).cmp(name(b)).then(a.cmp(b))
        });
    }
}

/// build the materialized tree for `user` from its effective access set.
///
/// re-reads hierarchy and asset state through the directory, so a tree
/// built after a mutation event reflects current membership even if the
/// event raced the grant set.
pub async fn materialize<D: Directory>(
    store: &D,
    user: UserId,
    access: &EffectiveAccess,
) -> Result<MaterializedUserTree> {
    let mut tree = MaterializedUserTree {
        user,
        ..Default::default()
    };

    // step 1: expand node grants to the assets they cover. the action map
    // of a granted node is inherited by every asset under it, and a node
    // granted twice (or through an ancestor as well) unions the maps.
    let mut asset_actions: BTreeMap<AssetId, AccountMap> = access.asset_grants.clone();
    let mut covered_keys: BTreeMap<NodeKey, NodeStatus> = BTreeMap::new();

    for (granted_key, accounts) in &access.node_grants {
        covered_keys.insert(granted_key.clone(), NodeStatus::Granted);

        let mut subtree_asset_ids = store.node_asset_ids(granted_key).await?;
        for descendant in store.descendants(granted_key).await? {
            covered_keys
                .entry(descendant.key.clone())
                .or_insert(NodeStatus::Indirect);
            subtree_asset_ids.extend(store.node_asset_ids(&descendant.key).await?);
        }

        for asset_id in subtree_asset_ids {
            let merged = asset_actions.entry(asset_id).or_default();
            for (system_user, entry) in accounts {
                merged
                    .entry(*system_user)
                    .or_default()
                    .merge(entry.actions, entry.provenance | Provenance::VIA_NODE);
            }
        }
    }

    // a directly granted node that also sits under another granted node
    // keeps the stronger `Granted` status; the or_insert above never
    // downgrades it.

    // step 2: resolve assets, dropping dangling and inactive ones so a
    // stale reference never grants access.
    let wanted: Vec<AssetId> = asset_actions.keys().copied().collect();
    for asset in store.assets_by_ids(&wanted).await? {
        if asset.is_active {
            tree.assets.insert(asset.id, asset);
        }
    }
    asset_actions.retain(|id, _| tree.assets.contains_key(id));
    tree.asset_actions = asset_actions;

    // step 3: nodes holding directly granted assets are visible even
    // without a node grant, as are the ancestors of everything shown.
    let mut membership_cache: BTreeMap<AssetId, Vec<NodeKey>> = BTreeMap::new();
    for asset_id in tree.asset_actions.keys() {
        let memberships = store.asset_memberships(*asset_id).await?;
        membership_cache.insert(*asset_id, memberships);
    }
    for asset_id in access.asset_grants.keys() {
        let Some(memberships) = membership_cache.get(asset_id) else {
            continue;
        };
        for key in memberships {
            covered_keys
                .entry(key.clone())
                .or_insert(NodeStatus::Visible);
        }
    }

    let mut ancestor_keys: BTreeSet<NodeKey> = BTreeSet::new();
    for key in covered_keys.keys() {
        ancestor_keys.extend(key.ancestors());
    }
    for key in ancestor_keys {
        covered_keys.entry(key).or_insert(NodeStatus::Visible);
    }

    // step 4: attach node display data; keys the hierarchy no longer
    // knows are dropped (node deleted since the grant was written).
    let keys: Vec<NodeKey> = covered_keys.keys().cloned().collect();
    let known_nodes = store.nodes_by_keys(&keys).await?;
    for node in known_nodes {
        let status = covered_keys[&node.key];
        let own_ids = store.node_asset_ids(&node.key).await?;
        let mut asset_ids: Vec<AssetId> = own_ids
            .into_iter()
            .filter(|id| tree.asset_actions.contains_key(id))
            .collect();
        asset_ids.sort_by(|a, b| {
            let name = |id: &AssetId| tree.assets.get(id).map(|a| a.name.as_str()).unwrap_or("");
            name(a).cmp(name(b)).then(a.cmp(b))
        });
        let asset_count = asset_ids.len();
        tree.nodes.insert(
            node.key.clone(),
            NodeRecord {
                node,
                status,
                asset_ids,
                asset_count,
                asset_count_total: asset_count,
            },
        );
    }

    // step 5: roll own counts up the ancestor chain so collapsed
    // ancestors show non-zero totals. reverse key order visits children
    // before their parents.
    let ordered: Vec<NodeKey> = tree.nodes.keys().cloned().collect();
    for key in ordered.iter().rev() {
        let total = tree.nodes[key].asset_count_total;
        if let Some(parent) = key.parent() {
            if let Some(record) = tree.nodes.get_mut(&parent) {
                record.asset_count_total += total;
            }
        }
    }

    // step 6: synthetic views. both are computed over the accessible set,
    // never separately granted.
    let mut favorites: Vec<AssetId> = store
        .favorites(user)
        .await?
        .into_iter()
        .filter(|id| tree.asset_actions.contains_key(id))
        .collect();
    tree.sort_by_name(&mut favorites);
    favorites.dedup();
    tree.favorite_assets = favorites;

    let mut ungrouped: Vec<AssetId> = tree
        .asset_actions
        .keys()
        .filter(|id| membership_cache.get(id).is_none_or(|m| m.is_empty()))
        .copied()
        .collect();
    tree.sort_by_name(&mut ungrouped);
    tree.ungrouped_assets = ungrouped;

    Ok(tree)
}
