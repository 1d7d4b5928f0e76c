//! permission resolution and tree-cache engine for gatewarden.
//!
//! this crate answers one question fast: *what can this user reach right
//! now?* it expands permission grants (direct and group-inherited) into an
//! effective-access set, materializes a per-user view of the asset
//! hierarchy from it, and caches that view so interactive tree browsing
//! never recomputes from scratch. mutations arrive as id-only events on
//! the [`InvalidationBus`], which marks affected users stale and schedules
//! debounced background rebuilds.
//!
//! the engine never stores entities itself: it reads them through the
//! [`Directory`] trait and treats everything behind it as an immutable
//! read model.

#![warn(missing_docs)]

pub mod bus;
pub mod cache;
pub mod directory;
pub mod error;
pub mod expand;
pub mod tree;

pub use bus::{InvalidationBus, MutationEvent, ResourceRef};
pub use cache::{
    AssetAccount, AssetGrant, CacheState, NodeEntry, Page, PageRequest, Resolved, ResolutionCache,
};
pub use directory::Directory;
pub use error::{DirectoryError, Error, Result};
pub use expand::{AccessEntry, EffectiveAccess, Provenance, expand};
pub use tree::{
    FAVORITE_NODE_KEY, MaterializedUserTree, NodeRecord, NodeStatus, UNGROUPED_NODE_KEY,
    materialize,
};
