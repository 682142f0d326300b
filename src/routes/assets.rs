use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;
use uuid::Uuid;

use crate::assets::{
    self, human_readable_size, AssetFilters, AssetLifecycle, SignedUrl, UpdateAssetRequest,
    UploadAssetRequest, UploadFields,
};
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::Asset;
use crate::policy::{authorize, can, Action};
use crate::routes::share::{to_link_response, LinkResponse};
use crate::sharing::{self, CreateLinkRequest};
use crate::state::AppState;
use crate::utils::time::to_iso;

const DETAIL_LINK_LIMIT: i64 = 5;

#[derive(Serialize)]
pub struct AssetResponse {
    pub id: Uuid,
    pub name: String,
    pub original_filename: String,
    pub file_type: String,
    pub mime_type: String,
    pub file_size: i64,
    pub human_readable_size: String,
    pub description: Option<String>,
    pub metadata: Value,
    pub status: String,
    pub category: String,
    pub uploaded_by: Uuid,
    pub company_id: Option<Uuid>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Asset> for AssetResponse {
    fn from(asset: Asset) -> Self {
        Self {
            id: asset.id,
            human_readable_size: human_readable_size(asset.file_size),
            name: asset.name,
            original_filename: asset.original_filename,
            file_type: asset.file_type,
            mime_type: asset.mime_type,
            file_size: asset.file_size,
            description: asset.description,
            metadata: asset.metadata,
            status: asset.status,
            category: asset.category,
            uploaded_by: asset.uploaded_by,
            company_id: asset.company_id,
            created_at: to_iso(asset.created_at),
            updated_at: to_iso(asset.updated_at),
        }
    }
}

#[derive(Serialize)]
pub struct AssetDetailResponse {
    pub asset: AssetResponse,
    pub signed_url: SignedUrl,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shareable_links: Option<Vec<LinkResponse>>,
}

#[derive(Serialize)]
pub struct AssetDownloadResponse {
    pub url: String,
    pub expires_in: u64,
    pub filename: String,
}

#[derive(Serialize)]
pub struct AssetDeletedResponse {
    pub id: Uuid,
    pub lifecycle: AssetLifecycle,
}

#[derive(Deserialize)]
pub struct CreateLinkPayload {
    pub expires_at: chrono::DateTime<Utc>,
    pub max_views: Option<i32>,
}

pub async fn list_assets(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(filters): Query<AssetFilters>,
) -> AppResult<Json<Vec<AssetResponse>>> {
    let identity = user.identity();
    let mut conn = state.db()?;
    let rows = assets::list_assets(&mut conn, &identity, &filters)?;
    Ok(Json(rows.into_iter().map(AssetResponse::from).collect()))
}

pub async fn upload_asset(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<AssetResponse>)> {
    let identity = user.identity();
    authorize(&identity, Action::Create, None)?;

    let mut fields = UploadFields::default();
    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("file") => {
                fields.original_filename = field.file_name().map(|n| n.to_string());
                fields.content_type = field.content_type().map(|mime| mime.to_string());
                let data = field.bytes().await.map_err(|err| {
                    error!(error = %err, "failed to read file bytes");
                    AppError::bad_request(format!("failed to read file bytes: {err}"))
                })?;
                fields.bytes = Some(data.to_vec());
            }
            Some(text_field @ ("name" | "description" | "category" | "company_id" | "metadata")) => {
                let value = field.text().await.map_err(|err| {
                    AppError::bad_request(format!("invalid {text_field} field: {err}"))
                })?;
                match text_field {
                    "name" => fields.name = Some(value),
                    "description" => fields.description = Some(value),
                    "category" => fields.category = Some(value),
                    "company_id" => fields.company_id = Some(value),
                    _ => fields.metadata = Some(value),
                }
            }
            _ => {}
        }
    }

    let request = UploadAssetRequest::validate(fields, state.config.upload_max_bytes)?;
    let asset = assets::upload_asset(&state, &identity, request).await?;
    Ok((StatusCode::CREATED, Json(asset.into())))
}

pub async fn get_asset(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(asset_id): Path<Uuid>,
) -> AppResult<Json<AssetDetailResponse>> {
    let identity = user.identity();
    let (asset, links) = {
        let mut conn = state.db()?;
        let asset = assets::find_asset(&mut conn, asset_id)?;
        authorize(&identity, Action::View, Some(&asset))?;
        let links = if can(&identity, Action::Share, Some(&asset)) {
            Some(sharing::recent_links(&mut conn, asset.id, Some(DETAIL_LINK_LIMIT))?)
        } else {
            None
        };
        (asset, links)
    };

    let signed_url = assets::signed_url(&state, &asset).await?;

    Ok(Json(AssetDetailResponse {
        asset: asset.into(),
        signed_url,
        shareable_links: links.map(|links| {
            links
                .into_iter()
                .map(|link| to_link_response(&state, link))
                .collect()
        }),
    }))
}

pub async fn update_asset(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(asset_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<AssetResponse>> {
    let identity = user.identity();
    let request = UpdateAssetRequest::from_json(&body)?;
    let mut conn = state.db()?;
    let asset = assets::update_asset(&mut conn, &identity, asset_id, request)?;
    Ok(Json(asset.into()))
}

pub async fn delete_asset(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(asset_id): Path<Uuid>,
) -> AppResult<Json<AssetDeletedResponse>> {
    let lifecycle = assets::delete_asset(&state, &user.identity(), asset_id).await?;
    Ok(Json(AssetDeletedResponse {
        id: asset_id,
        lifecycle,
    }))
}

pub async fn force_delete_asset(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(asset_id): Path<Uuid>,
) -> AppResult<Json<AssetDeletedResponse>> {
    let lifecycle = assets::force_delete_asset(&state, &user.identity(), asset_id).await?;
    Ok(Json(AssetDeletedResponse {
        id: asset_id,
        lifecycle,
    }))
}

pub async fn download_asset(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(asset_id): Path<Uuid>,
) -> AppResult<Json<AssetDownloadResponse>> {
    let identity = user.identity();
    let asset = {
        let mut conn = state.db()?;
        assets::find_asset(&mut conn, asset_id)?
    };
    authorize(&identity, Action::Download, Some(&asset))?;

    let signed = assets::signed_url(&state, &asset).await?;
    Ok(Json(AssetDownloadResponse {
        url: signed.url,
        expires_in: signed.expires_in,
        filename: asset.original_filename,
    }))
}

pub async fn list_asset_links(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(asset_id): Path<Uuid>,
) -> AppResult<Json<Vec<LinkResponse>>> {
    let mut conn = state.db()?;
    let links = sharing::list_links(&mut conn, &user.identity(), asset_id)?;
    Ok(Json(
        links
            .into_iter()
            .map(|link| to_link_response(&state, link))
            .collect(),
    ))
}

pub async fn create_asset_link(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(asset_id): Path<Uuid>,
    Json(payload): Json<CreateLinkPayload>,
) -> AppResult<(StatusCode, Json<LinkResponse>)> {
    let request = CreateLinkRequest::validate(payload.expires_at, payload.max_views, Utc::now())?;
    let mut conn = state.db()?;
    let link = sharing::create_link(&mut conn, &user.identity(), asset_id, &request)?;
    Ok((StatusCode::CREATED, Json(to_link_response(&state, link))))
}
