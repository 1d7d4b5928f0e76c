//! mutation-event intake and rebuild scheduling.
//!
//! writers publish id-only events here; the bus resolves the affected
//! user set from *current* directory state, marks those users stale
//! before [`on_mutation`](InvalidationBus::on_mutation) returns, and
//! queues debounced background rebuilds. delivery is at-least-once and
//! idempotent: re-marking a stale entry is a no-op, and a duplicate
//! rebuild joins the in-flight one.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use gatewarden_types::{AssetId, GrantId, NodeId, RebuildConfig, UserGroupId, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::cache::ResolutionCache;
use crate::directory::Directory;
use crate::error::Result;

/// a resource referenced by a grant-resource mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceRef {
    /// an asset.
    Asset(AssetId),
    /// a hierarchy node.
    Node(NodeId),
}

/// a mutation somewhere in the grant/group/hierarchy state.
///
/// payloads carry identifiers only; the bus re-reads current state from
/// the directory so a delayed event can never resurrect old data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationEvent {
    /// a grant was created, updated or deleted.
    GrantChanged(GrantId),
    /// a grant's principal sets changed.
    GrantPrincipalsChanged {
        /// the grant.
        grant: GrantId,
        /// users added to the grant.
        added_users: Vec<UserId>,
        /// users removed from the grant.
        removed_users: Vec<UserId>,
        /// groups added to the grant.
        added_groups: Vec<UserGroupId>,
        /// groups removed from the grant.
        removed_groups: Vec<UserGroupId>,
    },
    /// a grant's asset/node sets changed.
    GrantResourcesChanged {
        /// the grant.
        grant: GrantId,
        /// resources added to the grant.
        added: Vec<ResourceRef>,
        /// resources removed from the grant.
        removed: Vec<ResourceRef>,
    },
    /// users joined or left a group.
    GroupMembershipChanged {
        /// the group.
        group: UserGroupId,
        /// users added to the group.
        added: Vec<UserId>,
        /// users removed from the group.
        removed: Vec<UserId>,
    },
    /// a hierarchy node was moved, renamed or deleted. treated as
    /// affecting every cached user; hierarchy edits are rare and the
    /// coarse invalidation keeps the closure computation trivial.
    HierarchyChanged(NodeId),
}

/// receives mutation events and keeps the cache honest.
#[derive(Clone)]
pub struct InvalidationBus<D: Directory> {
    cache: Arc<ResolutionCache<D>>,
    queue: mpsc::UnboundedSender<UserId>,
}

impl<D: Directory> InvalidationBus<D> {
    /// create a bus and spawn its debounce worker.
    pub fn spawn(cache: Arc<ResolutionCache<D>>, config: RebuildConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(debounce_worker(Arc::clone(&cache), config, rx));
        Self { cache, queue: tx }
    }

    /// handle one mutation event.
    ///
    /// every affected user's cache is marked stale before this returns;
    /// the rebuilds themselves happen later, coalesced per user over
    /// the configured debounce window.
    pub async fn on_mutation(&self, event: MutationEvent) -> Result<()> {
        let affected = self.affected_users(&event).await?;
        debug!(?event, affected = affected.len(), "processing mutation event");

        for user in &affected {
            self.cache.invalidate(*user);
        }
        for user in affected {
            // worker gone only during shutdown; stale marks still stand
            let _ = self.queue.send(user);
        }
        Ok(())
    }

    /// the minimal user set whose materialized view the event can change.
    async fn affected_users(&self, event: &MutationEvent) -> Result<BTreeSet<UserId>> {
        let store = self.cache.store();
        match event {
            MutationEvent::GrantChanged(grant) => match store.get_grant(*grant).await? {
                Some(grant) => {
                    self.principal_closure(&grant.users, &grant.user_groups)
                        .await
                }
                // deleted grant: its previous principals are gone with
                // it, so degrade to invalidating every cached user
                None => Ok(self.cache.cached_users().into_iter().collect()),
            },
            MutationEvent::GrantPrincipalsChanged {
                grant,
                added_users,
                removed_users,
                added_groups,
                removed_groups,
            } => {
                let mut users: Vec<UserId> = added_users.clone();
                users.extend(removed_users);
                let mut groups: Vec<UserGroupId> = added_groups.clone();
                groups.extend(removed_groups);
                let mut affected = self.principal_closure(&users, &groups).await?;
                if let Some(grant) = store.get_grant(*grant).await? {
                    affected
                        .extend(self.principal_closure(&grant.users, &grant.user_groups).await?);
                }
                Ok(affected)
            }
            MutationEvent::GrantResourcesChanged { grant, .. } => {
                match store.get_grant(*grant).await? {
                    Some(grant) => {
                        self.principal_closure(&grant.users, &grant.user_groups)
                            .await
                    }
                    None => Ok(self.cache.cached_users().into_iter().collect()),
                }
            }
            MutationEvent::GroupMembershipChanged { added, removed, .. } => {
                let mut affected: BTreeSet<UserId> = added.iter().copied().collect();
                affected.extend(removed);
                Ok(affected)
            }
            MutationEvent::HierarchyChanged(_) => {
                Ok(self.cache.cached_users().into_iter().collect())
            }
        }
    }

    /// users named directly plus the members of every named group.
    async fn principal_closure(
        &self,
        users: &[UserId],
        groups: &[UserGroupId],
    ) -> Result<BTreeSet<UserId>> {
        let mut closure: BTreeSet<UserId> = users.iter().copied().collect();
        for group in groups {
            closure.extend(self.cache.store().group_members(*group).await?);
        }
        Ok(closure)
    }
}

/// coalesces per-user rebuild requests over the debounce window, then
/// fires them with retry/backoff. a user invalidated again while a
/// window is open keeps the original deadline, so an event storm for
/// one user costs a single rebuild.
async fn debounce_worker<D: Directory>(
    cache: Arc<ResolutionCache<D>>,
    config: RebuildConfig,
    mut rx: mpsc::UnboundedReceiver<UserId>,
) {
    let debounce = Duration::from_millis(config.debounce_ms);
    let tick_period = (debounce / 4).clamp(Duration::from_millis(10), Duration::from_millis(500));
    let mut tick = tokio::time::interval(tick_period);
    let mut pending: HashMap<UserId, Instant> = HashMap::new();

    info!(debounce_ms = config.debounce_ms, "invalidation worker started");
    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(user) => {
                    pending.entry(user).or_insert_with(|| Instant::now() + debounce);
                }
                None => break,
            },
            _ = tick.tick() => {
                let now = Instant::now();
                let due: Vec<UserId> = pending
                    .iter()
                    .filter(|(_, deadline)| **deadline <= now)
                    .map(|(user, _)| *user)
                    .collect();
                for user in due {
                    pending.remove(&user);
                    tokio::spawn(rebuild_with_retry(
                        Arc::clone(&cache),
                        config.clone(),
                        user,
                    ));
                }
            }
        }
    }
    info!("invalidation worker stopped");
}

/// rebuild with exponential backoff. failure logging and the
/// consecutive-failure alert live in the cache; this only paces the
/// retries.
async fn rebuild_with_retry<D: Directory>(
    cache: Arc<ResolutionCache<D>>,
    config: RebuildConfig,
    user: UserId,
) {
    let mut delay = Duration::from_millis(config.retry_backoff_ms);
    for _ in 0..config.failure_alert_threshold.max(1) {
        if cache.rebuild(user).await.is_ok() {
            return;
        }
        tokio::time::sleep(delay).await;
        delay *= 2;
    }
}
