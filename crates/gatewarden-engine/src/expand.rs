//! grant expansion: from persisted grants to an effective-access set.
//!
//! [`expand`] selects the grants effective for a user (directly or through
//! group membership) and flattens their resources × credential-identities
//! cross-products into per-resource action maps. node grants are kept
//! lazy here: they resolve to a [`NodeKey`] but are not expanded to
//! descendant assets until materialization, so node-level browsing never
//! pays the nodes × assets cost.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use gatewarden_types::{ActionSet, AssetId, NodeKey, SystemUserId, UserId};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::directory::Directory;
use crate::error::Result;

/// how an access entry was obtained. union of tags, for display only;
/// access decisions never look at provenance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Provenance(u8);

impl Provenance {
    /// granted to the user directly.
    pub const DIRECT: Provenance = Provenance(0b1);
    /// inherited through a user-group.
    pub const VIA_GROUP: Provenance = Provenance(0b10);
    /// inherited from a granted ancestor node.
    pub const VIA_NODE: Provenance = Provenance(0b100);

    /// union of two provenance sets.
    pub const fn union(self, other: Provenance) -> Provenance {
        Provenance(self.0 | other.0)
    }

    /// true if `tag` is present.
    pub const fn has(self, tag: Provenance) -> bool {
        self.0 & tag.0 == tag.0
    }

    /// ordered labels for display.
    pub fn labels(self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.has(Self::DIRECT) {
            out.push("direct");
        }
        if self.has(Self::VIA_GROUP) {
            out.push("via-group");
        }
        if self.has(Self::VIA_NODE) {
            out.push("via-node");
        }
        out
    }

    fn from_label(label: &str) -> Option<Provenance> {
        match label {
            "direct" => Some(Self::DIRECT),
            "via-group" => Some(Self::VIA_GROUP),
            "via-node" => Some(Self::VIA_NODE),
            _ => None,
        }
    }
}

impl std::ops::BitOr for Provenance {
    type Output = Provenance;

    fn bitor(self, rhs: Provenance) -> Provenance {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for Provenance {
    fn bitor_assign(&mut self, rhs: Provenance) {
        self.0 |= rhs.0;
    }
}

impl Serialize for Provenance {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let labels = self.labels();
        let mut seq = serializer.serialize_seq(Some(labels.len()))?;
        for label in labels {
            seq.serialize_element(label)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Provenance {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let labels = Vec::<String>::deserialize(deserializer)?;
        let mut out = Provenance::default();
        for label in &labels {
            out |= Provenance::from_label(label)
                .ok_or_else(|| de::Error::custom(format!("unknown provenance tag: {label}")))?;
        }
        Ok(out)
    }
}

/// the actions allowed for one (resource, system-user) pair, with
/// provenance tags accumulated across every grant that contributed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEntry {
    /// union of the contributing grants' action sets.
    pub actions: ActionSet,
    /// union of provenance tags (UI only).
    pub provenance: Provenance,
}

impl AccessEntry {
    /// merge another contribution into this entry. actions only
    /// accumulate, never override or subtract.
    pub fn merge(&mut self, actions: ActionSet, provenance: Provenance) {
        self.actions |= actions;
        self.provenance |= provenance;
    }
}

/// per-system-user access map for one resource.
pub type AccountMap = BTreeMap<SystemUserId, AccessEntry>;

/// the expanded, merged access set for one user.
///
/// node grants stay keyed by node; the materializer expands them to
/// descendant assets. btree maps keep iteration deterministic so two
/// rebuilds from the same state produce identical snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EffectiveAccess {
    /// node-level grants, keyed by node key.
    pub node_grants: BTreeMap<NodeKey, AccountMap>,
    /// direct asset grants, keyed by asset id.
    pub asset_grants: BTreeMap<AssetId, AccountMap>,
}

impl EffectiveAccess {
    /// true if the user has no access at all.
    pub fn is_empty(&self) -> bool {
        self.node_grants.is_empty() && self.asset_grants.is_empty()
    }
}

/// expand the grants effective for `user` at `now` into an access set.
///
/// dangling references never grant access: an unknown user expands to
/// nothing, and unknown nodes / assets / system users referenced by a
/// grant are silently dropped (treated as revoked).
pub async fn expand<D: Directory>(
    store: &D,
    user: UserId,
    now: DateTime<Utc>,
) -> Result<EffectiveAccess> {
    let mut access = EffectiveAccess::default();

    let Some(user_record) = store.get_user(user).await? else {
        return Ok(access);
    };
    if !user_record.is_active {
        return Ok(access);
    }

    let groups = store.groups_of(user).await?;
    let grants = store.list_effective_grants(user, &groups, now).await?;

    for grant in grants {
        let mut origin = Provenance::default();
        if grant.users.contains(&user) {
            origin |= Provenance::DIRECT;
        }
        if groups.iter().any(|g| grant.user_groups.contains(g)) {
            origin |= Provenance::VIA_GROUP;
        }
        if origin == Provenance::default() {
            // a principal edit raced the listing; the grant no longer
            // names this user
            continue;
        }

        // drop credential identities that no longer exist
        let mut system_users = Vec::with_capacity(grant.system_users.len());
        for id in &grant.system_users {
            if store.get_system_user(*id).await?.is_some() {
                system_users.push(*id);
            }
        }
        if system_users.is_empty() {
            continue;
        }

        for node_id in &grant.nodes {
            let Some(node) = store.get_node(*node_id).await? else {
                continue;
            };
            let accounts = access.node_grants.entry(node.key).or_default();
            for su in &system_users {
                accounts
                    .entry(*su)
                    .or_default()
                    .merge(grant.actions, origin | Provenance::VIA_NODE);
            }
        }

        let known_assets = store.assets_by_ids(&grant.assets).await?;
        for asset in known_assets {
            let accounts = access.asset_grants.entry(asset.id).or_default();
            for su in &system_users {
                accounts.entry(*su).or_default().merge(grant.actions, origin);
            }
        }
    }

    Ok(access)
}
