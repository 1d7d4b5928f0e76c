//! http handlers for the gatewarden query api.

mod error;
mod health;
mod perms;

pub use error::ApiError;
pub use health::health;
pub use perms::{node_assets, node_children, user_assets, validate};
