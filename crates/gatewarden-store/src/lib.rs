//! in-memory directory backing the resolution engine.
//!
//! this crate is the "external collaborator" side of the engine's
//! [`Directory`](gatewarden_engine::Directory) contract: a copy-on-write
//! store of users, groups, assets, nodes, system users and grants.
//! reads clone an `Arc` and walk an immutable state; writes build the
//! next state and swap it in atomically. mutators return the
//! [`MutationEvent`](gatewarden_engine::MutationEvent) the caller must
//! feed to the invalidation bus; the store itself never talks to the
//! cache.

#![warn(missing_docs)]

mod memory;
mod seed;

pub use memory::MemStore;
pub use seed::{AssetMembershipSeed, DirectorySeed, FavoriteSeed, GroupMembersSeed};
