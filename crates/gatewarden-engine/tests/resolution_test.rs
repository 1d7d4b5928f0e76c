//! end-to-end tests for grant expansion, tree materialization and the
//! resolution cache, run against the in-memory directory.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use gatewarden_engine::{
    CacheState, Directory, DirectoryError, Error, FAVORITE_NODE_KEY, InvalidationBus,
    MutationEvent, NodeStatus, PageRequest, ResolutionCache, UNGROUPED_NODE_KEY, expand,
    materialize,
};
use gatewarden_store::MemStore;
use gatewarden_types::test_utils::{
    TestGrantBuilder, test_asset, test_node, test_system_user, test_user,
};
use gatewarden_types::{
    Action, ActionSet, Asset, AssetId, Grant, GrantId, Node, NodeId, NodeKey, RebuildConfig,
    SystemUser, SystemUserId, User, UserGroupId, UserId,
};

const ALICE: UserId = UserId(1);
const BOB: UserId = UserId(2);
const OPS: UserGroupId = UserGroupId(1);
const DB01: AssetId = AssetId(101);
const DB02: AssetId = AssetId(102);
const WEB01: AssetId = AssetId(103);
const LONE01: AssetId = AssetId(104);
const SU: SystemUserId = SystemUserId(1);

fn key(s: &str) -> NodeKey {
    s.parse().expect("valid key")
}

/// hierarchy:
///   1          (root)
///   1:4        prod, holds db01
///   1:4:9      db, holds db02
///   1:7        web, holds web01
/// lone01 belongs to no node. alice is in group "ops", bob in nothing.
fn fixture() -> MemStore {
    let store = MemStore::new();
    store.upsert_user(test_user(1));
    store.upsert_user(test_user(2));
    store.upsert_group(gatewarden_types::UserGroup {
        id: OPS,
        name: "ops".to_string(),
    });
    store.set_group_members(OPS, vec![ALICE]);
    store.upsert_system_user(test_system_user(1));

    store.upsert_node(test_node(1, "1"));
    store.upsert_node(test_node(2, "1:4"));
    store.upsert_node(test_node(3, "1:4:9"));
    store.upsert_node(test_node(4, "1:7"));

    for id in [101, 102, 103, 104] {
        store.upsert_asset(test_asset(id));
    }
    store.link_asset(DB01, NodeId(2));
    store.link_asset(DB02, NodeId(3));
    store.link_asset(WEB01, NodeId(4));

    store
}

fn cache_over(store: &MemStore) -> Arc<ResolutionCache<MemStore>> {
    let config = RebuildConfig {
        debounce_ms: 10,
        ..RebuildConfig::default()
    };
    Arc::new(ResolutionCache::new(store.clone(), config))
}

fn connect_upload() -> ActionSet {
    ActionSet::from_iter([Action::Connect, Action::Upload])
}

/// a group grant on a node flows down to a member's view of the
/// node's assets.
#[tokio::test]
async fn group_node_grant_reaches_member() {
    let store = fixture();
    store.upsert_grant(
        TestGrantBuilder::new(1)
            .for_group(OPS)
            .on_node(NodeId(2))
            .with_actions(connect_upload())
            .build(),
    );

    let cache = cache_over(&store);
    let page = cache
        .node_assets(ALICE, "1:4", PageRequest::default(), true)
        .await
        .unwrap()
        .value;

    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].asset.id, DB01);
    assert_eq!(page.items[0].accounts.len(), 1);
    assert_eq!(page.items[0].accounts[0].system_user, SU);
    assert_eq!(page.items[0].accounts[0].actions, connect_upload());

    // the descendant node inherits the grant
    let child = cache
        .node_assets(ALICE, "1:4:9", PageRequest::default(), true)
        .await
        .unwrap()
        .value;
    assert_eq!(child.total, 1);
    assert_eq!(child.items[0].asset.id, DB02);

    // bob is not in ops and sees nothing
    let bob = cache
        .node_assets(BOB, "1:4", PageRequest::default(), true)
        .await
        .unwrap()
        .value;
    assert_eq!(bob.total, 0);
}

/// layering a direct grant on top of a group grant unions the action
/// sets; deleting one layer leaves exactly the other.
#[tokio::test]
async fn action_additivity_across_paths() {
    let store = fixture();
    store.upsert_grant(
        TestGrantBuilder::new(1)
            .for_group(OPS)
            .on_node(NodeId(2))
            .with_actions(connect_upload())
            .build(),
    );
    store.upsert_grant(
        TestGrantBuilder::new(2)
            .for_user(ALICE)
            .on_asset(DB01)
            .with_actions(ActionSet::single(Action::Download))
            .build(),
    );

    let cache = cache_over(&store);
    let tree = cache.snapshot(ALICE, false).await.unwrap().value;
    let entry = &tree.asset_actions[&DB01][&SU];
    assert_eq!(
        entry.actions,
        connect_upload() | ActionSet::single(Action::Download)
    );

    // deleting the node grant must leave download, never zero
    store.remove_grant(gatewarden_types::GrantId(1));
    cache.invalidate(ALICE);
    let tree = cache.rebuild(ALICE).await.unwrap();
    assert_eq!(
        tree.asset_actions[&DB01][&SU].actions,
        ActionSet::single(Action::Download)
    );
    // db02 was only reachable through the node grant
    assert!(!tree.asset_actions.contains_key(&DB02));
}

/// adding a grant never removes an accessible triple; removing one
/// never adds a triple.
#[tokio::test]
async fn union_monotonicity() {
    let store = fixture();
    store.upsert_grant(
        TestGrantBuilder::new(1)
            .for_user(ALICE)
            .on_asset(DB01)
            .with_actions(ActionSet::CONNECT)
            .build(),
    );

    let before = expand(&store, ALICE, Utc::now()).await.unwrap();
    let before_tree = materialize(&store, ALICE, &before).await.unwrap();

    store.upsert_grant(
        TestGrantBuilder::new(2)
            .for_user(ALICE)
            .on_node(NodeId(4))
            .with_actions(ActionSet::ALL)
            .build(),
    );
    let after = expand(&store, ALICE, Utc::now()).await.unwrap();
    let after_tree = materialize(&store, ALICE, &after).await.unwrap();

    for (asset, accounts) in &before_tree.asset_actions {
        for (system_user, entry) in accounts {
            let grown = &after_tree.asset_actions[asset][system_user];
            assert!(
                grown.actions.contains(entry.actions),
                "adding a grant removed access to {asset}"
            );
        }
    }

    // removal: the new grant's triples disappear, the old ones survive
    store.remove_grant(gatewarden_types::GrantId(2));
    let shrunk = expand(&store, ALICE, Utc::now()).await.unwrap();
    let shrunk_tree = materialize(&store, ALICE, &shrunk).await.unwrap();
    assert_eq!(shrunk_tree.asset_actions, before_tree.asset_actions);
}

/// an asset linked under a granted node after the last rebuild becomes
/// accessible on the next one.
#[tokio::test]
async fn node_inheritance_covers_future_assets() {
    let store = fixture();
    store.upsert_grant(
        TestGrantBuilder::new(1)
            .for_user(ALICE)
            .on_node(NodeId(2))
            .build(),
    );

    let cache = cache_over(&store);
    let tree = cache.snapshot(ALICE, false).await.unwrap().value;
    assert!(!tree.asset_actions.contains_key(&WEB01));

    // move web01 under the granted subtree
    store.unlink_asset(WEB01, NodeId(4));
    let event = store.link_asset(WEB01, NodeId(3));
    let bus = InvalidationBus::spawn(
        Arc::clone(&cache),
        RebuildConfig {
            debounce_ms: 10,
            ..RebuildConfig::default()
        },
    );
    bus.on_mutation(event).await.unwrap();

    assert_eq!(cache.state(ALICE), CacheState::Stale);
    let tree = cache.snapshot(ALICE, false).await.unwrap().value;
    assert!(tree.asset_actions.contains_key(&WEB01));
}

/// two rebuilds from identical state produce identical snapshots.
#[tokio::test]
async fn rebuild_is_idempotent() {
    let store = fixture();
    store.upsert_grant(
        TestGrantBuilder::new(1)
            .for_group(OPS)
            .on_node(NodeId(2))
            .on_asset(LONE01)
            .with_actions(connect_upload())
            .build(),
    );
    store.mark_favorite(ALICE, DB01);

    let access_a = expand(&store, ALICE, Utc::now()).await.unwrap();
    let access_b = expand(&store, ALICE, Utc::now()).await.unwrap();
    assert_eq!(access_a, access_b);

    let tree_a = materialize(&store, ALICE, &access_a).await.unwrap();
    let tree_b = materialize(&store, ALICE, &access_b).await.unwrap();
    assert_eq!(tree_a, tree_b);
    assert_eq!(
        serde_json::to_vec(&tree_a).unwrap(),
        serde_json::to_vec(&tree_b).unwrap()
    );
}

/// the affected user is stale before `on_mutation` returns: there is
/// no window where the mutation exists but the cache still reads READY.
#[tokio::test]
async fn staleness_bound_holds() {
    let store = fixture();
    let grant = TestGrantBuilder::new(1)
        .for_user(ALICE)
        .on_asset(DB01)
        .build();
    store.upsert_grant(grant.clone());

    let cache = cache_over(&store);
    cache.rebuild(ALICE).await.unwrap();
    assert_eq!(cache.state(ALICE), CacheState::Ready);

    let bus = InvalidationBus::spawn(
        Arc::clone(&cache),
        RebuildConfig {
            // long debounce: the rebuild must not be what flips the state
            debounce_ms: 60_000,
            ..RebuildConfig::default()
        },
    );
    let event = store.upsert_grant(grant);
    bus.on_mutation(event).await.unwrap();
    assert_eq!(cache.state(ALICE), CacheState::Stale);

    // idempotent: replaying the event is harmless
    bus.on_mutation(MutationEvent::GrantChanged(gatewarden_types::GrantId(1)))
        .await
        .unwrap();
    assert_eq!(cache.state(ALICE), CacheState::Stale);
}

/// moving an asset out of its node removes it from the node listing;
/// with a direct grant it resurfaces under the ungrouped pseudo-node,
/// without one it disappears entirely.
#[tokio::test]
async fn asset_moved_out_of_node() {
    let store = fixture();
    store.upsert_grant(
        TestGrantBuilder::new(1)
            .for_group(OPS)
            .on_node(NodeId(2))
            .build(),
    );
    store.upsert_grant(
        TestGrantBuilder::new(2)
            .for_user(ALICE)
            .on_asset(DB01)
            .with_actions(ActionSet::single(Action::Download))
            .build(),
    );

    let cache = cache_over(&store);
    store.unlink_asset(DB01, NodeId(2));

    let page = cache
        .node_assets(ALICE, "1:4", PageRequest::default(), true)
        .await
        .unwrap()
        .value;
    assert!(page.items.iter().all(|item| item.asset.id != DB01));

    let ungrouped = cache
        .node_assets(ALICE, UNGROUPED_NODE_KEY, PageRequest::default(), true)
        .await
        .unwrap()
        .value;
    assert_eq!(ungrouped.total, 1);
    assert_eq!(ungrouped.items[0].asset.id, DB01);
    // only the direct grant reaches it now
    assert_eq!(
        ungrouped.items[0].accounts[0].actions,
        ActionSet::single(Action::Download)
    );

    // without the direct grant the asset is gone entirely
    store.remove_grant(gatewarden_types::GrantId(2));
    cache.invalidate(ALICE);
    let tree = cache.snapshot(ALICE, false).await.unwrap().value;
    assert!(!tree.asset_actions.contains_key(&DB01));
    assert!(tree.ungrouped_assets.is_empty());
}

/// expired and inactive grants convey nothing.
#[tokio::test]
async fn ineffective_grants_are_ignored() {
    let store = fixture();
    store.upsert_grant(
        TestGrantBuilder::new(1)
            .for_user(ALICE)
            .on_asset(DB01)
            .expired()
            .build(),
    );
    store.upsert_grant(
        TestGrantBuilder::new(2)
            .for_user(ALICE)
            .on_asset(DB02)
            .inactive()
            .build(),
    );

    let access = expand(&store, ALICE, Utc::now()).await.unwrap();
    assert!(access.is_empty());
}

/// stale foreign keys never grant access: unknown nodes, assets and
/// system users referenced by a grant are dropped silently.
#[tokio::test]
async fn dangling_references_are_dropped() {
    let store = fixture();
    store.upsert_grant(
        TestGrantBuilder::new(1)
            .for_user(ALICE)
            .on_node(NodeId(99))
            .on_asset(AssetId(999))
            .build(),
    );
    store.upsert_grant(
        TestGrantBuilder::new(2)
            .for_user(ALICE)
            .on_asset(DB01)
            .with_system_users(vec![SystemUserId(42)])
            .build(),
    );

    let access = expand(&store, ALICE, Utc::now()).await.unwrap();
    assert!(access.is_empty());

    // an unknown user resolves to nothing rather than erroring
    let access = expand(&store, UserId(77), Utc::now()).await.unwrap();
    assert!(access.is_empty());
}

/// node statuses: granted node, inherited descendants, visible
/// ancestors, and the always-present pseudo-nodes.
#[tokio::test]
async fn tree_statuses_and_counts() {
    let store = fixture();
    store.upsert_grant(
        TestGrantBuilder::new(1)
            .for_group(OPS)
            .on_node(NodeId(2))
            .build(),
    );
    store.upsert_grant(
        TestGrantBuilder::new(2)
            .for_user(ALICE)
            .on_asset(WEB01)
            .build(),
    );
    store.mark_favorite(ALICE, DB01);

    let cache = cache_over(&store);
    let tree = cache.snapshot(ALICE, false).await.unwrap().value;

    assert_eq!(tree.nodes[&key("1:4")].status, NodeStatus::Granted);
    assert_eq!(tree.nodes[&key("1:4:9")].status, NodeStatus::Indirect);
    // root is just filler above the granted subtree
    assert_eq!(tree.nodes[&key("1")].status, NodeStatus::Visible);
    // holds a directly granted asset but is not itself granted
    assert_eq!(tree.nodes[&key("1:7")].status, NodeStatus::Visible);

    // counts: own vs subtree
    assert_eq!(tree.nodes[&key("1:4")].asset_count, 1);
    assert_eq!(tree.nodes[&key("1:4")].asset_count_total, 2);
    assert_eq!(tree.nodes[&key("1")].asset_count, 0);
    assert_eq!(tree.nodes[&key("1")].asset_count_total, 3);

    // root listing carries the pseudo-nodes
    let roots = cache.node_children(ALICE, None, true).await.unwrap().value;
    let keys: Vec<&str> = roots.iter().map(|entry| entry.key.as_str()).collect();
    assert!(keys.contains(&"1"));
    assert!(keys.contains(&FAVORITE_NODE_KEY));
    assert!(keys.contains(&UNGROUPED_NODE_KEY));

    let favorite = roots
        .iter()
        .find(|entry| entry.key == FAVORITE_NODE_KEY)
        .unwrap();
    assert_eq!(favorite.asset_count, 1);

    // children query under a key
    let children = cache
        .node_children(ALICE, Some(&key("1:4")), true)
        .await
        .unwrap()
        .value;
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].key, "1:4:9");
}

/// favorites are a view over the accessible set, not a grant.
#[tokio::test]
async fn favorites_intersect_accessible() {
    let store = fixture();
    store.upsert_grant(
        TestGrantBuilder::new(1)
            .for_user(ALICE)
            .on_asset(DB01)
            .build(),
    );
    store.mark_favorite(ALICE, DB01);
    store.mark_favorite(ALICE, WEB01); // favorite but not granted

    let cache = cache_over(&store);
    let favorites = cache
        .node_assets(ALICE, FAVORITE_NODE_KEY, PageRequest::default(), true)
        .await
        .unwrap()
        .value;
    assert_eq!(favorites.total, 1);
    assert_eq!(favorites.items[0].asset.id, DB01);
}

/// flat asset listing with search and pagination.
#[tokio::test]
async fn all_assets_filter_and_paging() {
    let store = fixture();
    store.upsert_grant(
        TestGrantBuilder::new(1)
            .for_user(ALICE)
            .on_node(NodeId(1))
            .build(),
    );
    store.upsert_grant(
        TestGrantBuilder::new(2)
            .for_user(ALICE)
            .on_asset(LONE01)
            .build(),
    );

    let cache = cache_over(&store);
    let all = cache
        .all_assets(ALICE, None, PageRequest::default(), true)
        .await
        .unwrap()
        .value;
    assert_eq!(all.total, 4);

    let filtered = cache
        .all_assets(ALICE, Some("asset-103"), PageRequest::default(), true)
        .await
        .unwrap()
        .value;
    assert_eq!(filtered.total, 1);
    assert_eq!(filtered.items[0].asset.id, WEB01);

    let page = cache
        .all_assets(
            ALICE,
            None,
            PageRequest {
                offset: 2,
                limit: 1,
            },
            true,
        )
        .await
        .unwrap()
        .value;
    assert_eq!(page.total, 4);
    assert_eq!(page.items.len(), 1);
}

/// the point-check consults the union of reachable paths.
#[tokio::test]
async fn validate_point_check() {
    let store = fixture();
    store.upsert_grant(
        TestGrantBuilder::new(1)
            .for_group(OPS)
            .on_node(NodeId(2))
            .with_actions(connect_upload())
            .build(),
    );

    let cache = cache_over(&store);
    assert!(cache.validate(ALICE, DB01, SU, Action::Connect).await.unwrap());
    assert!(cache.validate(ALICE, DB01, SU, Action::Upload).await.unwrap());
    assert!(!cache.validate(ALICE, DB01, SU, Action::Delete).await.unwrap());
    assert!(
        !cache
            .validate(ALICE, DB01, SystemUserId(9), Action::Connect)
            .await
            .unwrap()
    );
    assert!(!cache.validate(BOB, DB01, SU, Action::Connect).await.unwrap());
    // unknown asset is simply "no access"
    assert!(
        !cache
            .validate(ALICE, AssetId(9999), SU, Action::Connect)
            .await
            .unwrap()
    );
}

/// serving stale while a rebuild is pending keeps the old answer and
/// flags it.
#[tokio::test]
async fn stale_reads_serve_last_known_good() {
    let store = fixture();
    store.upsert_grant(
        TestGrantBuilder::new(1)
            .for_user(ALICE)
            .on_asset(DB01)
            .build(),
    );

    let cache = cache_over(&store);
    let fresh = cache.snapshot(ALICE, true).await.unwrap();
    assert!(!fresh.stale);

    cache.invalidate(ALICE);
    let served = cache.snapshot(ALICE, true).await.unwrap();
    assert!(served.stale);
    // same underlying snapshot, not a recompute
    assert!(Arc::ptr_eq(&served.value, &fresh.value));
}

/// group membership changes affect exactly the users who joined or
/// left.
#[tokio::test]
async fn group_membership_change_invalidates_members() {
    let store = fixture();
    store.upsert_grant(
        TestGrantBuilder::new(1)
            .for_group(OPS)
            .on_node(NodeId(2))
            .build(),
    );

    let cache = cache_over(&store);
    cache.rebuild(ALICE).await.unwrap();
    cache.rebuild(BOB).await.unwrap();

    let bus = InvalidationBus::spawn(
        Arc::clone(&cache),
        RebuildConfig {
            debounce_ms: 60_000,
            ..RebuildConfig::default()
        },
    );

    // bob joins ops: bob is affected, alice is not
    let event = store.set_group_members(OPS, vec![ALICE, BOB]);
    bus.on_mutation(event).await.unwrap();
    assert_eq!(cache.state(ALICE), CacheState::Ready);
    assert_eq!(cache.state(BOB), CacheState::Stale);

    cache.rebuild(BOB).await.unwrap();
    let tree = cache.snapshot(BOB, false).await.unwrap().value;
    assert!(tree.asset_actions.contains_key(&DB01));
}

/// evicting a user drops the snapshot; the next read rebuilds from
/// scratch.
#[tokio::test]
async fn evicted_user_starts_empty() {
    let store = fixture();
    store.upsert_grant(
        TestGrantBuilder::new(1)
            .for_user(ALICE)
            .on_asset(DB01)
            .build(),
    );

    let cache = cache_over(&store);
    cache.rebuild(ALICE).await.unwrap();
    assert_eq!(cache.state(ALICE), CacheState::Ready);

    cache.evict(ALICE);
    assert_eq!(cache.state(ALICE), CacheState::Empty);
    assert!(cache.cached_users().is_empty());

    let tree = cache.snapshot(ALICE, true).await.unwrap();
    assert!(!tree.stale);
    assert!(tree.value.asset_actions.contains_key(&DB01));
}

/// principal-delta events invalidate the moved users plus the grant's
/// current principals; resource-delta events invalidate the current
/// principals only.
#[tokio::test]
async fn grant_delta_events_scope_invalidation() {
    let store = fixture();
    store.upsert_grant(
        TestGrantBuilder::new(1)
            .for_user(ALICE)
            .on_asset(DB01)
            .build(),
    );

    let cache = cache_over(&store);
    cache.rebuild(ALICE).await.unwrap();
    cache.rebuild(BOB).await.unwrap();
    let bus = InvalidationBus::spawn(
        Arc::clone(&cache),
        RebuildConfig {
            debounce_ms: 60_000,
            ..RebuildConfig::default()
        },
    );

    // bob was just removed from the grant: both he and the remaining
    // principals go stale
    bus.on_mutation(MutationEvent::GrantPrincipalsChanged {
        grant: gatewarden_types::GrantId(1),
        added_users: vec![],
        removed_users: vec![BOB],
        added_groups: vec![],
        removed_groups: vec![],
    })
    .await
    .unwrap();
    assert_eq!(cache.state(ALICE), CacheState::Stale);
    assert_eq!(cache.state(BOB), CacheState::Stale);

    cache.rebuild(ALICE).await.unwrap();
    cache.rebuild(BOB).await.unwrap();

    // a resource edit touches only the grant's principals
    bus.on_mutation(MutationEvent::GrantResourcesChanged {
        grant: gatewarden_types::GrantId(1),
        added: vec![gatewarden_engine::ResourceRef::Asset(DB02)],
        removed: vec![],
    })
    .await
    .unwrap();
    assert_eq!(cache.state(ALICE), CacheState::Stale);
    assert_eq!(cache.state(BOB), CacheState::Ready);
}

/// a deleted grant cannot name its previous principals, so the bus
/// degrades to invalidating every cached user.
#[tokio::test]
async fn deleted_grant_invalidates_cached_users() {
    let store = fixture();
    store.upsert_grant(
        TestGrantBuilder::new(1)
            .for_user(ALICE)
            .on_asset(DB01)
            .build(),
    );

    let cache = cache_over(&store);
    cache.rebuild(ALICE).await.unwrap();
    cache.rebuild(BOB).await.unwrap();

    let bus = InvalidationBus::spawn(
        Arc::clone(&cache),
        RebuildConfig {
            debounce_ms: 60_000,
            ..RebuildConfig::default()
        },
    );
    let event = store.remove_grant(gatewarden_types::GrantId(1));
    bus.on_mutation(event).await.unwrap();

    assert_eq!(cache.state(ALICE), CacheState::Stale);
    assert_eq!(cache.state(BOB), CacheState::Stale);
}

/// directory handle that delegates to the in-memory store but can be
/// switched into an outage mode where grant listing fails. also counts
/// grant listings, one per tree computation.
#[derive(Clone)]
struct OutageStore {
    inner: MemStore,
    offline: Arc<AtomicBool>,
    grant_reads: Arc<AtomicU32>,
}

impl OutageStore {
    fn new(inner: MemStore) -> Self {
        Self {
            inner,
            offline: Arc::new(AtomicBool::new(false)),
            grant_reads: Arc::new(AtomicU32::new(0)),
        }
    }

    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    fn grant_reads(&self) -> u32 {
        self.grant_reads.load(Ordering::Acquire)
    }
}

impl Directory for OutageStore {
    async fn get_user(&self, id: UserId) -> Result<Option<User>, DirectoryError> {
        self.inner.get_user(id).await
    }

    async fn groups_of(&self, user: UserId) -> Result<Vec<UserGroupId>, DirectoryError> {
        self.inner.groups_of(user).await
    }

    async fn group_members(&self, group: UserGroupId) -> Result<Vec<UserId>, DirectoryError> {
        self.inner.group_members(group).await
    }

    async fn get_grant(&self, id: GrantId) -> Result<Option<Grant>, DirectoryError> {
        self.inner.get_grant(id).await
    }

    async fn list_effective_grants(
        &self,
        user: UserId,
        groups: &[UserGroupId],
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Grant>, DirectoryError> {
        self.grant_reads.fetch_add(1, Ordering::AcqRel);
        if self.offline.load(Ordering::Acquire) {
            return Err(DirectoryError::new("directory offline"));
        }
        self.inner.list_effective_grants(user, groups, as_of).await
    }

    async fn get_node(&self, id: NodeId) -> Result<Option<Node>, DirectoryError> {
        self.inner.get_node(id).await
    }

    async fn nodes_by_keys(&self, keys: &[NodeKey]) -> Result<Vec<Node>, DirectoryError> {
        self.inner.nodes_by_keys(keys).await
    }

    async fn descendants(&self, key: &NodeKey) -> Result<Vec<Node>, DirectoryError> {
        self.inner.descendants(key).await
    }

    async fn assets_by_ids(&self, ids: &[AssetId]) -> Result<Vec<Asset>, DirectoryError> {
        self.inner.assets_by_ids(ids).await
    }

    async fn asset_memberships(&self, asset: AssetId) -> Result<Vec<NodeKey>, DirectoryError> {
        self.inner.asset_memberships(asset).await
    }

    async fn node_asset_ids(&self, key: &NodeKey) -> Result<Vec<AssetId>, DirectoryError> {
        self.inner.node_asset_ids(key).await
    }

    async fn get_system_user(
        &self,
        id: SystemUserId,
    ) -> Result<Option<SystemUser>, DirectoryError> {
        self.inner.get_system_user(id).await
    }

    async fn favorites(&self, user: UserId) -> Result<Vec<AssetId>, DirectoryError> {
        self.inner.favorites(user).await
    }
}

/// while the directory is failing, the previous snapshot stays
/// authoritative: rebuilds error, the failure counter climbs, and
/// reads degrade to the last known good tree. recovery resets the
/// counter.
#[tokio::test]
async fn rebuild_failure_keeps_previous_snapshot() {
    let store = fixture();
    store.upsert_grant(
        TestGrantBuilder::new(1)
            .for_user(ALICE)
            .on_asset(DB01)
            .build(),
    );

    let outage = OutageStore::new(store.clone());
    let cache = Arc::new(ResolutionCache::new(
        outage.clone(),
        RebuildConfig {
            debounce_ms: 10,
            ..RebuildConfig::default()
        },
    ));

    let good = cache.rebuild(ALICE).await.unwrap();
    assert_eq!(cache.failure_count(ALICE), 0);

    outage.set_offline(true);
    cache.invalidate(ALICE);

    for expected in 1..=3u32 {
        let err = cache.rebuild(ALICE).await.unwrap_err();
        assert!(matches!(err, Error::RebuildFailed { user, .. } if user == ALICE));
        assert_eq!(cache.failure_count(ALICE), expected);
    }
    assert_eq!(cache.state(ALICE), CacheState::Stale);

    // a strict read degrades to the last known good tree, flagged stale
    let served = cache.snapshot(ALICE, false).await.unwrap();
    assert!(served.stale);
    assert!(Arc::ptr_eq(&served.value, &good));

    // a user with no snapshot yet has nothing to degrade to
    assert!(cache.snapshot(BOB, false).await.is_err());

    outage.set_offline(false);
    let rebuilt = cache.rebuild(ALICE).await.unwrap();
    assert!(!Arc::ptr_eq(&rebuilt, &good));
    assert_eq!(cache.failure_count(ALICE), 0);
    assert_eq!(cache.state(ALICE), CacheState::Ready);
}

/// two rebuild calls racing for the same user share one computation:
/// the loser joins the winner's result instead of recomputing.
#[tokio::test]
async fn concurrent_rebuilds_share_one_computation() {
    let store = fixture();
    store.upsert_grant(
        TestGrantBuilder::new(1)
            .for_user(ALICE)
            .on_asset(DB01)
            .build(),
    );

    let outage = OutageStore::new(store.clone());
    let cache = Arc::new(ResolutionCache::new(
        outage.clone(),
        RebuildConfig {
            debounce_ms: 10,
            ..RebuildConfig::default()
        },
    ));

    cache.rebuild(ALICE).await.unwrap();
    let before = outage.grant_reads();

    cache.invalidate(ALICE);
    let (first, second) = tokio::join!(cache.rebuild(ALICE), cache.rebuild(ALICE));
    assert!(Arc::ptr_eq(&first.unwrap(), &second.unwrap()));
    assert_eq!(outage.grant_reads() - before, 1);
}
