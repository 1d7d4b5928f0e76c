//! shared domain types for gatewarden.
//!
//! this crate holds the types every other crate speaks:
//! - id newtypes for users, groups, assets, nodes, system users and grants
//! - [`ActionSet`]: the bitmask of allowed actions on an asset
//! - [`NodeKey`]: the colon-delimited hierarchy path
//! - the persisted read-model types ([`Grant`], [`Asset`], [`Node`], ...)
//! - server [`Config`]

#![warn(missing_docs)]

pub mod action;
pub mod asset;
pub mod config;
pub mod grant;
pub mod node;
pub mod system_user;
pub mod user;

#[doc(hidden)]
pub mod test_utils;

pub use action::{Action, ActionParseError, ActionSet};
pub use asset::{Asset, AssetId};
pub use config::{Config, RebuildConfig};
pub use grant::{Grant, GrantId};
pub use node::{Node, NodeId, NodeKey, NodeKeyParseError};
pub use system_user::{SystemUser, SystemUserId};
pub use user::{User, UserGroup, UserGroupId, UserId};
