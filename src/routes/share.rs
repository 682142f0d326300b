use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE, REFERER, USER_AGENT},
        HeaderMap,
    },
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::assets::{self, SignedUrl};
use crate::auth::AuthenticatedUser;
use crate::error::AppResult;
use crate::models::ShareableLink;
use crate::routes::assets::AssetResponse;
use crate::sharing::{self, ViewContext};
use crate::state::AppState;
use crate::utils::time::to_iso;

const FORWARDED_FOR: &str = "x-forwarded-for";
const MAX_HEADER_CHARS: usize = 1024;

#[derive(Serialize)]
pub struct LinkResponse {
    pub id: Uuid,
    pub token: String,
    pub asset_id: Uuid,
    pub created_by: Uuid,
    pub expires_at: String,
    pub max_views: Option<i32>,
    pub view_count: i32,
    pub is_active: bool,
    pub is_valid: bool,
    pub url: String,
    pub qr_url: String,
    pub created_at: String,
    pub updated_at: String,
}

pub(crate) fn to_link_response(state: &AppState, link: ShareableLink) -> LinkResponse {
    LinkResponse {
        is_valid: link.is_valid(),
        url: state.share_url(&link.token),
        qr_url: state.share_qr_url(&link.token),
        id: link.id,
        token: link.token,
        asset_id: link.asset_id,
        created_by: link.created_by,
        expires_at: to_iso(link.expires_at),
        max_views: link.max_views,
        view_count: link.view_count,
        is_active: link.is_active,
        created_at: to_iso(link.created_at),
        updated_at: to_iso(link.updated_at),
    }
}

#[derive(Serialize)]
pub struct SharedAssetResponse {
    pub asset: AssetResponse,
    pub signed_url: SignedUrl,
    pub shareable_link: LinkResponse,
}

fn header_text(headers: &HeaderMap, name: impl axum::http::header::AsHeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().chars().take(MAX_HEADER_CHARS).collect::<String>())
        .filter(|value| !value.is_empty())
}

/// The first `X-Forwarded-For` hop wins over the socket peer address when it
/// parses as an IP address.
fn view_context(headers: &HeaderMap, peer: Option<SocketAddr>) -> ViewContext {
    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|hop| hop.trim().parse::<IpAddr>().ok());

    ViewContext {
        ip_address: forwarded
            .or_else(|| peer.map(|addr| addr.ip()))
            .map(|ip| ip.to_string()),
        user_agent: header_text(headers, USER_AGENT),
        referer: header_text(headers, REFERER),
    }
}

pub async fn resolve_share(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> AppResult<Json<SharedAssetResponse>> {
    let view = view_context(&headers, connect_info.map(|ConnectInfo(addr)| addr));

    // Content is checked and presigned before the view is spent.
    let (_, shared) = {
        let mut conn = state.db()?;
        sharing::check_link(&mut conn, &token)?
    };
    let signed_url = assets::signed_url(&state, &shared).await?;

    let (asset, link) = {
        let mut conn = state.db()?;
        sharing::resolve_link(&mut conn, &token, &view)?
    };

    info!(
        link_id = %link.id,
        asset_id = %asset.id,
        view_count = link.view_count,
        "shareable link resolved"
    );

    Ok(Json(SharedAssetResponse {
        asset: asset.into(),
        signed_url,
        shareable_link: to_link_response(&state, link),
    }))
}

pub async fn share_qr(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<impl IntoResponse> {
    let (link, _) = {
        let mut conn = state.db()?;
        sharing::check_link(&mut conn, &token)?
    };

    let png = sharing::render_qr_png(&state.share_url(&link.token))?;
    Ok((
        [(CONTENT_TYPE, "image/png"), (CACHE_CONTROL, "no-store")],
        png,
    ))
}

pub async fn deactivate_link(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(link_id): Path<Uuid>,
) -> AppResult<Json<LinkResponse>> {
    let mut conn = state.db()?;
    let link = sharing::deactivate_link(&mut conn, &user.identity(), link_id)?;
    Ok(Json(to_link_response(&state, link)))
}
