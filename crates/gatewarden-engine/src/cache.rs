//! per-user snapshot cache over the materialized tree.
//!
//! staleness is tracked with generation counters: invalidation bumps a
//! per-user generation, and a snapshot is fresh only while its built
//! generation matches. readers never mutate: a rebuild swaps in a new
//! `Arc` snapshot, so the read path is a pair of atomic loads plus a
//! short lock on the snapshot slot. rebuilds are single-flight per user:
//! a rebuild already running is joined, never duplicated.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use gatewarden_types::{Action, Asset, AssetId, NodeKey, RebuildConfig, SystemUserId, UserId};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::directory::Directory;
use crate::error::{Error, Result};
use crate::expand::{Provenance, expand};
use crate::tree::{
    FAVORITE_NODE_KEY, MaterializedUserTree, NodeStatus, UNGROUPED_NODE_KEY, materialize,
};

/// lifecycle of one user's cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    /// never built.
    Empty,
    /// a rebuild is in flight.
    Building,
    /// snapshot matches the latest generation.
    Ready,
    /// snapshot exists but a newer invalidation has arrived.
    Stale,
}

/// per-user cache slot.
struct UserEntry {
    /// bumped on every invalidation. starts at 1 so that 0 can mean
    /// "never built" in `built_generation`.
    generation: AtomicU64,
    /// generation the current snapshot was built against.
    built_generation: AtomicU64,
    /// the snapshot itself, swapped wholesale on rebuild.
    snapshot: RwLock<Option<Arc<MaterializedUserTree>>>,
    /// single-flight rebuild guard.
    rebuild_lock: tokio::sync::Mutex<()>,
    /// consecutive rebuild failures, for alert escalation.
    failures: AtomicU32,
}

impl UserEntry {
    fn new() -> Self {
        Self {
            generation: AtomicU64::new(1),
            built_generation: AtomicU64::new(0),
            snapshot: RwLock::new(None),
            rebuild_lock: tokio::sync::Mutex::new(()),
            failures: AtomicU32::new(0),
        }
    }

    fn current_snapshot(&self) -> Option<Arc<MaterializedUserTree>> {
        self.snapshot.read().expect("snapshot lock poisoned").clone()
    }

    fn is_fresh(&self) -> bool {
        let built = self.built_generation.load(Ordering::Acquire);
        built != 0 && built == self.generation.load(Ordering::Acquire)
    }
}

/// pagination request. a zero limit falls back to the default page size.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageRequest {
    /// items to skip.
    #[serde(default)]
    pub offset: usize,
    /// maximum items to return.
    #[serde(default)]
    pub limit: usize,
}

impl PageRequest {
    /// default page size.
    pub const DEFAULT_LIMIT: usize = 50;
    /// hard cap on page size.
    pub const MAX_LIMIT: usize = 1000;

    fn effective_limit(self) -> usize {
        match self.limit {
            0 => Self::DEFAULT_LIMIT,
            n => n.min(Self::MAX_LIMIT),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { offset: 0, limit: 0 }
    }
}

/// one page of results plus the total count, so the UI can paginate
/// without re-walking the tree.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    /// the requested slice.
    pub items: Vec<T>,
    /// total matching items before pagination.
    pub total: usize,
    /// echo of the request offset.
    pub offset: usize,
    /// the limit actually applied.
    pub limit: usize,
}

impl<T> Page<T> {
    fn slice(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len();
        let limit = request.effective_limit();
        let items = all
            .into_iter()
            .skip(request.offset)
            .take(limit)
            .collect();
        Self {
            items,
            total,
            offset: request.offset,
            limit,
        }
    }

    /// a page with no items, echoing the request's shape.
    pub fn empty(request: PageRequest) -> Self {
        Self::slice(Vec::new(), request)
    }
}

/// a node as served to the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct NodeEntry {
    /// node key, or a pseudo-node key (`favorite`, `ungrouped`).
    pub key: String,
    /// display name.
    pub value: String,
    /// why the node is shown.
    pub status: NodeStatus,
    /// accessible assets on the node itself.
    pub asset_count: usize,
    /// accessible assets on the node and all descendants.
    pub asset_count_total: usize,
}

/// one credential identity usable on an asset, with its allowed actions.
#[derive(Debug, Clone, Serialize)]
pub struct AssetAccount {
    /// the system user to connect as.
    pub system_user: SystemUserId,
    /// allowed actions, unioned over every reachable path.
    pub actions: gatewarden_types::ActionSet,
    /// where the access came from (UI only).
    pub provenance: Provenance,
}

/// an asset as served to the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct AssetGrant {
    /// the asset.
    pub asset: Asset,
    /// usable credential identities, ordered by id.
    pub accounts: Vec<AssetAccount>,
}

/// a query answer plus the soft staleness signal: `stale` means the
/// value came from a snapshot that a pending rebuild will replace.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    /// the answer.
    pub value: T,
    /// true if served from a stale snapshot.
    pub stale: bool,
}

/// per-user materialized-view cache with generation-based invalidation.
pub struct ResolutionCache<D: Directory> {
    store: D,
    config: RebuildConfig,
    entries: RwLock<HashMap<UserId, Arc<UserEntry>>>,
}

impl<D: Directory> ResolutionCache<D> {
    /// create an empty cache over the given directory.
    pub fn new(store: D, config: RebuildConfig) -> Self {
        Self {
            store,
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// the directory handle this cache resolves against.
    pub fn store(&self) -> &D {
        &self.store
    }

    fn entry(&self, user: UserId) -> Arc<UserEntry> {
        if let Some(entry) = self.entries.read().expect("entries lock poisoned").get(&user) {
            return Arc::clone(entry);
        }
        let mut entries = self.entries.write().expect("entries lock poisoned");
        Arc::clone(entries.entry(user).or_insert_with(|| Arc::new(UserEntry::new())))
    }

    /// mark a user's view stale. idempotent: marking an already-stale
    /// entry just bumps the generation again. users that were never
    /// cached are ignored; their first read builds fresh anyway.
    pub fn invalidate(&self, user: UserId) {
        if let Some(entry) = self.entries.read().expect("entries lock poisoned").get(&user) {
            entry.generation.fetch_add(1, Ordering::Release);
        }
    }

    /// drop a user's entry entirely, snapshot included. for user
    /// deletion or idle reaping; a later read starts from empty.
    pub fn evict(&self, user: UserId) {
        self.entries
            .write()
            .expect("entries lock poisoned")
            .remove(&user);
    }

    /// users that currently hold a cache entry.
    pub fn cached_users(&self) -> Vec<UserId> {
        self.entries
            .read()
            .expect("entries lock poisoned")
            .keys()
            .copied()
            .collect()
    }

    /// consecutive rebuild failures recorded for a user. resets to
    /// zero on the next successful rebuild.
    pub fn failure_count(&self, user: UserId) -> u32 {
        self.entries
            .read()
            .expect("entries lock poisoned")
            .get(&user)
            .map(|entry| entry.failures.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// observable lifecycle state for a user's entry.
    pub fn state(&self, user: UserId) -> CacheState {
        let Some(entry) = self
            .entries
            .read()
            .expect("entries lock poisoned")
            .get(&user)
            .cloned()
        else {
            return CacheState::Empty;
        };
        if entry.rebuild_lock.try_lock().is_err() {
            return CacheState::Building;
        }
        if entry.built_generation.load(Ordering::Acquire) == 0 {
            CacheState::Empty
        } else if entry.is_fresh() {
            CacheState::Ready
        } else {
            CacheState::Stale
        }
    }

    /// rebuild a user's snapshot, joining an in-flight rebuild instead
    /// of duplicating it.
    ///
    /// a rebuild superseded by a newer invalidation while running still
    /// publishes its snapshot and is immediately stale again: never
    /// wrong, only possibly already outdated. on failure the
    /// previous snapshot stays authoritative.
    pub async fn rebuild(&self, user: UserId) -> Result<Arc<MaterializedUserTree>> {
        let entry = self.entry(user);
        let _guard = entry.rebuild_lock.lock().await;

        // another task may have rebuilt while we waited for the lock
        if entry.is_fresh() {
            if let Some(snapshot) = entry.current_snapshot() {
                return Ok(snapshot);
            }
        }

        let target = entry.generation.load(Ordering::Acquire);
        debug!(user = %user, generation = target, "rebuilding materialized tree");

        match self.compute(user).await {
            Ok(tree) => {
                let snapshot = Arc::new(tree);
                *entry.snapshot.write().expect("snapshot lock poisoned") =
                    Some(Arc::clone(&snapshot));
                entry.built_generation.store(target, Ordering::Release);
                entry.failures.store(0, Ordering::Release);
                Ok(snapshot)
            }
            Err(Error::Directory(source)) => {
                let failures = entry.failures.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_alert_threshold {
                    error!(
                        user = %user,
                        failures,
                        %source,
                        "tree rebuild keeps failing; serving last known good view"
                    );
                } else {
                    warn!(user = %user, failures, %source, "tree rebuild failed");
                }
                Err(Error::RebuildFailed { user, source })
            }
            Err(other) => Err(other),
        }
    }

    /// compute a tree without touching cache bookkeeping.
    async fn compute(&self, user: UserId) -> Result<MaterializedUserTree> {
        let access = expand(&self.store, user, Utc::now()).await?;
        materialize(&self.store, user, &access).await
    }

    /// get the freshest snapshot available.
    ///
    /// with `allow_stale`, a stale snapshot is returned immediately and
    /// a background rebuild is scheduled. otherwise the caller waits for
    /// the rebuild, bounded by the configured cold-wait: if an in-flight
    /// rebuild holds the lock longer than that, we fall back to a
    /// synchronous one-off computation so a cold read never hangs.
    pub async fn snapshot(
        self: &Arc<Self>,
        user: UserId,
        allow_stale: bool,
    ) -> Result<Resolved<Arc<MaterializedUserTree>>> {
        let entry = self.entry(user);

        if entry.is_fresh() {
            if let Some(snapshot) = entry.current_snapshot() {
                return Ok(Resolved {
                    value: snapshot,
                    stale: false,
                });
            }
        }

        if allow_stale {
            if let Some(snapshot) = entry.current_snapshot() {
                let cache = Arc::clone(self);
                tokio::spawn(async move {
                    let _ = cache.rebuild(user).await;
                });
                return Ok(Resolved {
                    value: snapshot,
                    stale: true,
                });
            }
        }

        let wait = Duration::from_millis(self.config.cold_wait_ms);
        match tokio::time::timeout(wait, self.rebuild(user)).await {
            Ok(Ok(snapshot)) => Ok(Resolved {
                value: snapshot,
                stale: false,
            }),
            Ok(Err(err)) => {
                // degrade to last known good rather than failing the read
                if let Some(snapshot) = entry.current_snapshot() {
                    Ok(Resolved {
                        value: snapshot,
                        stale: true,
                    })
                } else {
                    Err(err)
                }
            }
            Err(_elapsed) => {
                warn!(user = %user, "rebuild wait exceeded; computing synchronously");
                let tree = self.compute(user).await?;
                Ok(Resolved {
                    value: Arc::new(tree),
                    stale: false,
                })
            }
        }
    }

    // ─── query surface ──────────────────────────────────────────────

    /// children of a node, or root nodes plus the `favorite` /
    /// `ungrouped` pseudo-nodes when `parent` is `None`.
    pub async fn node_children(
        self: &Arc<Self>,
        user: UserId,
        parent: Option<&NodeKey>,
        allow_stale: bool,
    ) -> Result<Resolved<Vec<NodeEntry>>> {
        let resolved = self.snapshot(user, allow_stale).await?;
        let tree = &resolved.value;

        let mut entries: Vec<NodeEntry> = tree
            .children(parent)
            .into_iter()
            .map(|record| NodeEntry {
                key: record.node.key.to_string(),
                value: record.node.value.clone(),
                status: record.status,
                asset_count: record.asset_count,
                asset_count_total: record.asset_count_total,
            })
            .collect();

        if parent.is_none() {
            entries.push(NodeEntry {
                key: FAVORITE_NODE_KEY.to_string(),
                value: "Favorites".to_string(),
                status: NodeStatus::Visible,
                asset_count: tree.favorite_assets.len(),
                asset_count_total: tree.favorite_assets.len(),
            });
            entries.push(NodeEntry {
                key: UNGROUPED_NODE_KEY.to_string(),
                value: "Ungrouped".to_string(),
                status: NodeStatus::Visible,
                asset_count: tree.ungrouped_assets.len(),
                asset_count_total: tree.ungrouped_assets.len(),
            });
        }

        Ok(Resolved {
            value: entries,
            stale: resolved.stale,
        })
    }

    /// paginated assets accessible through one node (own membership
    /// only), or through a pseudo-node.
    ///
    /// unknown or invisible node keys resolve to an empty page, never
    /// an error.
    pub async fn node_assets(
        self: &Arc<Self>,
        user: UserId,
        key: &str,
        page: PageRequest,
        allow_stale: bool,
    ) -> Result<Resolved<Page<AssetGrant>>> {
        let resolved = self.snapshot(user, allow_stale).await?;
        let tree = &resolved.value;

        let ids: Vec<AssetId> = match key {
            FAVORITE_NODE_KEY => tree.favorite_assets.clone(),
            UNGROUPED_NODE_KEY => tree.ungrouped_assets.clone(),
            _ => match NodeKey::parse(key) {
                Ok(node_key) => tree
                    .node(&node_key)
                    .map(|record| record.asset_ids.clone())
                    .unwrap_or_default(),
                Err(_) => Vec::new(),
            },
        };

        let grants = self.asset_grants(tree, &ids);
        Ok(Resolved {
            value: Page::slice(grants, page),
            stale: resolved.stale,
        })
    }

    /// paginated flat list of every accessible asset, optionally
    /// filtered by a name/address substring.
    pub async fn all_assets(
        self: &Arc<Self>,
        user: UserId,
        search: Option<&str>,
        page: PageRequest,
        allow_stale: bool,
    ) -> Result<Resolved<Page<AssetGrant>>> {
        let resolved = self.snapshot(user, allow_stale).await?;
        let tree = &resolved.value;

        let ids: Vec<AssetId> = tree
            .all_asset_ids()
            .into_iter()
            .filter(|id| match search {
                Some(needle) if !needle.is_empty() => tree
                    .assets
                    .get(id)
                    .is_some_and(|asset| asset.matches_search(needle)),
                _ => true,
            })
            .collect();

        let grants = self.asset_grants(tree, &ids);
        Ok(Resolved {
            value: Page::slice(grants, page),
            stale: resolved.stale,
        })
    }

    /// point-check used by the enforcement layer at connection time.
    ///
    /// always resolves against a fresh snapshot (recomputing if none
    /// exists) since this directly gates a connection attempt.
    pub async fn validate(
        self: &Arc<Self>,
        user: UserId,
        asset: AssetId,
        system_user: SystemUserId,
        action: Action,
    ) -> Result<bool> {
        let resolved = self.snapshot(user, false).await?;
        Ok(resolved.value.allows(asset, system_user, action))
    }

    fn asset_grants(&self, tree: &MaterializedUserTree, ids: &[AssetId]) -> Vec<AssetGrant> {
        ids.iter()
            .filter_map(|id| {
                let asset = tree.assets.get(id)?;
                let accounts = tree
                    .asset_actions
                    .get(id)?
                    .iter()
                    .map(|(system_user, entry)| AssetAccount {
                        system_user: *system_user,
                        actions: entry.actions,
                        provenance: entry.provenance,
                    })
                    .collect();
                Some(AssetGrant {
                    asset: asset.clone(),
                    accounts,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_slice_respects_offset_and_limit() {
        let page = Page::slice(
            (0..10).collect(),
            PageRequest {
                offset: 3,
                limit: 4,
            },
        );
        assert_eq!(page.items, vec![3, 4, 5, 6]);
        assert_eq!(page.total, 10);
        assert_eq!(page.offset, 3);
        assert_eq!(page.limit, 4);
    }

    #[test]
    fn page_zero_limit_uses_default() {
        let page = Page::slice(vec![1, 2, 3], PageRequest::default());
        assert_eq!(page.limit, PageRequest::DEFAULT_LIMIT);
        assert_eq!(page.items.len(), 3);
    }

    #[test]
    fn page_limit_is_capped() {
        let page: Page<u32> = Page::empty(PageRequest {
            offset: 0,
            limit: 1_000_000,
        });
        assert_eq!(page.limit, PageRequest::MAX_LIMIT);
    }
}
