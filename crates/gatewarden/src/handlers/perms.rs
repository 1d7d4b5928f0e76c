//! permission query endpoints: per-user tree browsing, flat asset
//! listing, and the connection-time point check.
//!
//! every response that came from a stale snapshot carries
//! `X-Gatewarden-Stale: true` so clients can surface a refresh hint.
//! read queries degrade rather than fail: resolution trouble yields an
//! empty answer, and a failed point check denies.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use gatewarden_engine::{
    AssetGrant, FAVORITE_NODE_KEY, NodeEntry, Page, PageRequest, UNGROUPED_NODE_KEY,
};
use gatewarden_types::{Action, AssetId, NodeKey, SystemUserId, UserId};

use crate::AppState;
use crate::handlers::ApiError;

/// header set on responses served from a snapshot with a pending rebuild.
pub const STALE_HEADER: &str = "x-gatewarden-stale";

fn stale_headers(stale: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if stale {
        headers.insert(STALE_HEADER, HeaderValue::from_static("true"));
    }
    headers
}

/// query parameters for the node-children endpoint.
#[derive(Debug, Deserialize)]
pub struct ChildrenQuery {
    /// parent node key; omitted means the root level.
    pub key: Option<String>,
}

/// pagination query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    /// items to skip.
    #[serde(default)]
    pub offset: usize,
    /// maximum items to return (0 = default page size).
    #[serde(default)]
    pub limit: usize,
}

impl From<PageQuery> for PageRequest {
    fn from(q: PageQuery) -> Self {
        PageRequest {
            offset: q.offset,
            limit: q.limit,
        }
    }
}

/// query parameters for the flat asset listing.
#[derive(Debug, Deserialize)]
pub struct AssetsQuery {
    /// substring filter on asset name / address.
    pub search: Option<String>,
    /// items to skip.
    #[serde(default)]
    pub offset: usize,
    /// maximum items to return (0 = default page size).
    #[serde(default)]
    pub limit: usize,
}

/// response body for the node-children endpoint.
#[derive(Debug, Serialize)]
pub struct ChildrenResponse {
    /// child nodes (plus pseudo-nodes at the root level).
    pub nodes: Vec<NodeEntry>,
}

/// GET /api/v1/perms/users/{user_id}/nodes/children - children of a node
/// in the user's materialized tree, or the root level (including the
/// `favorite` / `ungrouped` pseudo-nodes) when `key` is omitted.
pub async fn node_children(
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
    Query(query): Query<ChildrenQuery>,
) -> Result<Response, ApiError> {
    let parent = match query.key.as_deref() {
        None => None,
        // pseudo-nodes are leaves: they hold assets, never children
        Some(FAVORITE_NODE_KEY) | Some(UNGROUPED_NODE_KEY) => {
            return Ok(Json(ChildrenResponse { nodes: Vec::new() }).into_response());
        }
        Some(raw) => Some(
            NodeKey::parse(raw).map_err(|e| ApiError::bad_request(e.to_string()))?,
        ),
    };

    let user = UserId(user_id);
    match state
        .cache
        .node_children(user, parent.as_ref(), true)
        .await
    {
        Ok(resolved) => Ok((
            stale_headers(resolved.stale),
            Json(ChildrenResponse {
                nodes: resolved.value,
            }),
        )
            .into_response()),
        Err(err) => {
            warn!(user = %user, error = %err, "node children query degraded to empty");
            Ok(Json(ChildrenResponse { nodes: Vec::new() }).into_response())
        }
    }
}

/// GET /api/v1/perms/users/{user_id}/nodes/{key}/assets - paginated
/// assets on one node of the user's tree. `key` may be a hierarchy key
/// or one of the pseudo-node keys.
pub async fn node_assets(
    State(state): State<AppState>,
    Path((user_id, key)): Path<(u64, String)>,
    Query(query): Query<PageQuery>,
) -> Result<Response, ApiError> {
    let user = UserId(user_id);
    let page: PageRequest = query.into();
    match state.cache.node_assets(user, &key, page, true).await {
        Ok(resolved) => Ok((stale_headers(resolved.stale), Json(resolved.value)).into_response()),
        Err(err) => {
            warn!(user = %user, key = %key, error = %err, "node assets query degraded to empty");
            Ok(Json(Page::<AssetGrant>::empty(page)).into_response())
        }
    }
}

/// GET /api/v1/perms/users/{user_id}/assets - paginated flat list of
/// every asset the user can reach, optionally filtered by substring.
pub async fn user_assets(
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
    Query(query): Query<AssetsQuery>,
) -> Result<Response, ApiError> {
    let user = UserId(user_id);
    let page = PageRequest {
        offset: query.offset,
        limit: query.limit,
    };
    match state
        .cache
        .all_assets(user, query.search.as_deref(), page, true)
        .await
    {
        Ok(resolved) => Ok((stale_headers(resolved.stale), Json(resolved.value)).into_response()),
        Err(err) => {
            warn!(user = %user, error = %err, "asset listing degraded to empty");
            Ok(Json(Page::<AssetGrant>::empty(page)).into_response())
        }
    }
}

/// query parameters for the validation endpoint.
#[derive(Debug, Deserialize)]
pub struct ValidateQuery {
    /// the acting user.
    pub user_id: u64,
    /// the target asset.
    pub asset_id: u64,
    /// the credential identity to connect as.
    pub system_user_id: u64,
    /// the action label (`connect`, `upload`, ...).
    pub action: String,
}

/// response body for the validation endpoint.
#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    /// whether the (user, asset, system user, action) tuple is allowed.
    pub allowed: bool,
}

/// GET /api/v1/perms/validate - connection-time point check.
///
/// always resolves against a fresh snapshot. any resolution failure
/// denies rather than erroring, since this gates a connection attempt.
pub async fn validate(
    State(state): State<AppState>,
    Query(query): Query<ValidateQuery>,
) -> Result<Json<ValidateResponse>, ApiError> {
    let action: Action = query
        .action
        .parse()
        .map_err(|e: gatewarden_types::ActionParseError| ApiError::bad_request(e.to_string()))?;

    let allowed = match state
        .cache
        .validate(
            UserId(query.user_id),
            AssetId(query.asset_id),
            SystemUserId(query.system_user_id),
            action,
        )
        .await
    {
        Ok(allowed) => allowed,
        Err(err) => {
            warn!(user = query.user_id, error = %err, "validation failed; denying");
            false
        }
    };

    Ok(Json(ValidateResponse { allowed }))
}
