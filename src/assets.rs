//! Asset records and the upload, update, delete and signed-URL workflows.
//!
//! Blob writes always complete before the row is inserted, and blob removal
//! always precedes record removal. Neither pair is transactional across the
//! two stores; the failure modes are logged where they occur.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use axum::http::StatusCode;
use chrono::{NaiveDate, Utc};
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::PgConnection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::activity::{
    self, EVENT_CREATED, EVENT_DELETED, EVENT_FORCE_DELETED, EVENT_UPDATED, SUBJECT_ASSET,
};
use crate::classifier::{classify, FileType};
use crate::config::DeleteMode;
use crate::error::{AppError, AppResult};
use crate::models::{Asset, NewAsset};
use crate::policy::{authorize, Action, Identity};
use crate::schema::{assets, companies};
use crate::sharing;
use crate::state::AppState;
use crate::storage::StorageError;
use crate::utils::json::{patch_field, Patch};

pub const MAX_NAME_LENGTH: usize = 255;
pub const MAX_FILENAME_LENGTH: usize = 255;
pub const MAX_MIME_TYPE_LENGTH: usize = 255;
pub const DEFAULT_STATUS: &str = "active";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetCategory {
    #[default]
    Media,
    Marketing,
    Branding,
    Product,
    Campaign,
    Legal,
    Other,
}

impl AssetCategory {
    pub const ALL: [AssetCategory; 7] = [
        AssetCategory::Media,
        AssetCategory::Marketing,
        AssetCategory::Branding,
        AssetCategory::Product,
        AssetCategory::Campaign,
        AssetCategory::Legal,
        AssetCategory::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AssetCategory::Media => "media",
            AssetCategory::Marketing => "marketing",
            AssetCategory::Branding => "branding",
            AssetCategory::Product => "product",
            AssetCategory::Campaign => "campaign",
            AssetCategory::Legal => "legal",
            AssetCategory::Other => "other",
        }
    }
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetCategory {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        AssetCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| format!("unknown category '{value}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetLifecycle {
    Active,
    SoftDeleted,
    HardDeleted,
}

impl Asset {
    /// A loaded row is never `HardDeleted`; only a delete returns that state.
    pub fn lifecycle(&self) -> AssetLifecycle {
        if self.deleted_at.is_some() {
            AssetLifecycle::SoftDeleted
        } else {
            AssetLifecycle::Active
        }
    }
}

/// Multipart fields as received, before validation.
#[derive(Debug, Default)]
pub struct UploadFields {
    pub bytes: Option<Vec<u8>>,
    pub original_filename: Option<String>,
    pub content_type: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub company_id: Option<String>,
    pub metadata: Option<String>,
}

#[derive(Debug)]
pub struct UploadAssetRequest {
    pub bytes: Vec<u8>,
    pub name: String,
    pub original_filename: String,
    pub mime_type: String,
    pub description: Option<String>,
    pub category: AssetCategory,
    pub company_id: Option<Uuid>,
    pub metadata: Value,
}

impl UploadAssetRequest {
    pub fn validate(fields: UploadFields, max_bytes: u64) -> AppResult<Self> {
        let bytes = fields
            .bytes
            .ok_or_else(|| AppError::bad_request("file field is required"))?;
        if bytes.is_empty() {
            return Err(AppError::bad_request("file field must not be empty"));
        }
        if bytes.len() as u64 > max_bytes {
            return Err(AppError::bad_request(format!(
                "file exceeds the maximum upload size of {}",
                human_readable_size(i64::try_from(max_bytes).unwrap_or(i64::MAX))
            )));
        }

        let original_filename = fields
            .original_filename
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AppError::bad_request("filename is required"))?;
        ensure_max_chars("filename", &original_filename, MAX_FILENAME_LENGTH)?;

        let name = validate_name(fields.name.as_deref().unwrap_or_default())?;

        let category = match fields.category.as_deref().map(str::trim) {
            None | Some("") => AssetCategory::default(),
            Some(raw) => raw.parse().map_err(AppError::bad_request)?,
        };

        let company_id = match fields.company_id.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                Uuid::parse_str(raw)
                    .map_err(|_| AppError::bad_request("company_id must be a valid UUID"))?,
            ),
        };

        let metadata = match fields.metadata.as_deref().map(str::trim) {
            None | Some("") => Value::Object(Default::default()),
            Some(raw) => {
                let parsed: Value = serde_json::from_str(raw).map_err(|err| {
                    AppError::bad_request(format!("metadata must be valid JSON: {err}"))
                })?;
                if !parsed.is_object() {
                    return Err(AppError::bad_request("metadata must be a JSON object"));
                }
                parsed
            }
        };

        let description = fields
            .description
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());

        let mime_type = resolve_mime_type(fields.content_type.as_deref(), &original_filename);
        ensure_max_chars("content type", &mime_type, MAX_MIME_TYPE_LENGTH)?;

        Ok(Self {
            bytes,
            name,
            original_filename,
            mime_type,
            description,
            category,
            company_id,
            metadata,
        })
    }
}

#[derive(Debug)]
pub struct UpdateAssetRequest {
    pub name: Option<String>,
    pub description: Patch<String>,
    pub category: Option<AssetCategory>,
    pub company_id: Patch<Uuid>,
}

impl UpdateAssetRequest {
    pub fn from_json(body: &Value) -> AppResult<Self> {
        if !body.is_object() {
            return Err(AppError::bad_request("request body must be a JSON object"));
        }

        let name = match patch_field::<String>(body, "name").map_err(AppError::bad_request)? {
            Patch::Omitted => None,
            Patch::Null => return Err(AppError::bad_request("name must not be null")),
            Patch::Value(name) => Some(validate_name(&name)?),
        };

        let description = match patch_field::<String>(body, "description")
            .map_err(AppError::bad_request)?
        {
            Patch::Value(text) if text.trim().is_empty() => Patch::Null,
            Patch::Value(text) => Patch::Value(text.trim().to_string()),
            other => other,
        };

        let category = match patch_field::<String>(body, "category")
            .map_err(AppError::bad_request)?
        {
            Patch::Omitted => None,
            Patch::Null => return Err(AppError::bad_request("category must not be null")),
            Patch::Value(raw) => Some(raw.parse().map_err(AppError::bad_request)?),
        };

        let company_id = patch_field::<Uuid>(body, "company_id").map_err(AppError::bad_request)?;

        let request = Self {
            name,
            description,
            category,
            company_id,
        };

        if request.is_empty() {
            return Err(AppError::bad_request("no changes provided"));
        }
        Ok(request)
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_omitted()
            && self.category.is_none()
            && self.company_id.is_omitted()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AssetFilters {
    pub file_type: Option<String>,
    pub category: Option<String>,
    pub company_id: Option<Uuid>,
}

#[derive(AsChangeset)]
#[diesel(table_name = assets)]
struct AssetChangeset {
    name: Option<String>,
    description: Option<Option<String>>,
    category: Option<String>,
    company_id: Option<Option<Uuid>>,
    updated_at: chrono::NaiveDateTime,
}

#[derive(Debug, Serialize)]
pub struct SignedUrl {
    pub url: String,
    pub expires_in: u64,
}

fn ensure_max_chars(field: &str, value: &str, max: usize) -> AppResult<()> {
    if value.chars().count() > max {
        return Err(AppError::bad_request(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

fn validate_name(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    ensure_max_chars("name", trimmed, MAX_NAME_LENGTH)?;
    Ok(trimmed.to_string())
}

fn resolve_mime_type(declared: Option<&str>, original_filename: &str) -> String {
    match declared.map(str::trim) {
        Some(mime) if !mime.is_empty() && mime != "application/octet-stream" => mime.to_string(),
        _ => mime_guess::from_path(original_filename)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    }
}

/// `assets/YYYY/MM/DD/<uuid>.<ext>`, keeping a sanitized extension when there is one.
pub fn storage_path_for(original_filename: &str, date: NaiveDate, id: Uuid) -> String {
    let extension: String = Path::new(original_filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();

    let prefix = format!("assets/{}/{id}", date.format("%Y/%m/%d"));
    if extension.is_empty() {
        prefix
    } else {
        format!("{prefix}.{extension}")
    }
}

pub fn human_readable_size(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes.max(0) as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[unit])
}

fn inline_content_disposition(filename: &str) -> Option<String> {
    if filename.is_empty() {
        return None;
    }

    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' | '\r' | '\n' => '_',
            _ => ch,
        })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    Some(format!(
        "inline; filename=\"{sanitized}\"; filename*=UTF-8''{encoded}"
    ))
}

pub fn ensure_company_active(conn: &mut PgConnection, company_id: Uuid) -> AppResult<()> {
    let active: bool = diesel::select(exists(
        companies::table
            .filter(companies::id.eq(company_id))
            .filter(companies::is_active.eq(true)),
    ))
    .get_result(conn)?;
    if !active {
        return Err(AppError::bad_request("company does not exist or is inactive"));
    }
    Ok(())
}

/// Loads a non-deleted asset; tombstoned rows read as absent.
pub fn find_asset(conn: &mut PgConnection, asset_id: Uuid) -> AppResult<Asset> {
    assets::table
        .find(asset_id)
        .filter(assets::deleted_at.is_null())
        .first(conn)
        .map_err(AppError::from)
}

pub fn list_assets(
    conn: &mut PgConnection,
    identity: &Identity,
    filters: &AssetFilters,
) -> AppResult<Vec<Asset>> {
    authorize(identity, Action::ViewAny, None)?;

    let mut query = assets::table
        .filter(assets::deleted_at.is_null())
        .into_boxed();

    if !identity.is_admin() {
        query = query.filter(assets::uploaded_by.eq(identity.user_id));
    }
    if let Some(raw) = filters.file_type.as_deref() {
        let file_type: FileType = raw.parse().map_err(AppError::bad_request)?;
        query = query.filter(assets::file_type.eq(file_type.as_str()));
    }
    if let Some(raw) = filters.category.as_deref() {
        let category: AssetCategory = raw.parse().map_err(AppError::bad_request)?;
        query = query.filter(assets::category.eq(category.as_str()));
    }
    if let Some(company_id) = filters.company_id {
        query = query.filter(assets::company_id.eq(company_id));
    }

    let rows = query
        .order((assets::created_at.desc(), assets::id.asc()))
        .load(conn)?;
    Ok(rows)
}

pub async fn upload_asset(
    state: &AppState,
    identity: &Identity,
    request: UploadAssetRequest,
) -> AppResult<Asset> {
    authorize(identity, Action::Create, None)?;

    if let Some(company_id) = request.company_id {
        let mut conn = state.db()?;
        ensure_company_active(&mut conn, company_id)?;
    }

    let UploadAssetRequest {
        bytes,
        name,
        original_filename,
        mime_type,
        description,
        category,
        company_id,
        metadata,
    } = request;

    let asset_id = Uuid::new_v4();
    let file_path = storage_path_for(&original_filename, Utc::now().date_naive(), asset_id);
    let file_size = bytes.len() as i64;

    state
        .storage
        .put_object(
            &file_path,
            bytes,
            Some(mime_type.clone()),
            inline_content_disposition(&original_filename),
        )
        .await
        .map_err(|err| {
            error!(error = %err, key = %file_path, "failed to store asset content");
            AppError::from(err)
        })?;

    let file_type = classify(&mime_type);
    let new_asset = NewAsset {
        id: asset_id,
        name,
        original_filename,
        file_path: file_path.clone(),
        file_type: file_type.as_str().to_string(),
        mime_type,
        file_size,
        description,
        metadata,
        status: DEFAULT_STATUS.to_string(),
        category: category.as_str().to_string(),
        uploaded_by: identity.user_id,
        company_id,
    };

    let mut conn = state.db()?;
    let inserted = conn.transaction::<Asset, AppError, _>(|conn| {
        diesel::insert_into(assets::table)
            .values(&new_asset)
            .execute(conn)?;
        let asset: Asset = assets::table.find(asset_id).first(conn)?;
        activity::record(
            conn,
            SUBJECT_ASSET,
            asset.id,
            Some(identity.user_id),
            EVENT_CREATED,
            json!({ "attributes": activity::asset_properties(&asset) }),
        )?;
        Ok(asset)
    });

    match inserted {
        Ok(asset) => {
            info!(
                asset_id = %asset.id,
                file_type = %asset.file_type,
                file_size = asset.file_size,
                uploaded_by = %asset.uploaded_by,
                "asset uploaded"
            );
            Ok(asset)
        }
        Err(err) => {
            warn!(
                key = %file_path,
                error = %err,
                "asset row insert failed after content was stored; blob left behind"
            );
            Err(err)
        }
    }
}

pub fn update_asset(
    conn: &mut PgConnection,
    identity: &Identity,
    asset_id: Uuid,
    request: UpdateAssetRequest,
) -> AppResult<Asset> {
    let existing = find_asset(conn, asset_id)?;
    authorize(identity, Action::Update, Some(&existing))?;

    if let Patch::Value(company_id) = request.company_id {
        ensure_company_active(conn, company_id)?;
    }

    let changeset = AssetChangeset {
        name: request.name,
        description: request.description.into_changeset(),
        category: request.category.map(|category| category.as_str().to_string()),
        company_id: request.company_id.into_changeset(),
        updated_at: Utc::now().naive_utc(),
    };

    conn.transaction::<Asset, AppError, _>(|conn| {
        diesel::update(assets::table.find(asset_id))
            .set(&changeset)
            .execute(conn)?;
        let updated: Asset = assets::table.find(asset_id).first(conn)?;
        activity::record(
            conn,
            SUBJECT_ASSET,
            asset_id,
            Some(identity.user_id),
            EVENT_UPDATED,
            json!({
                "old": activity::asset_properties(&existing),
                "attributes": activity::asset_properties(&updated),
            }),
        )?;
        Ok(updated)
    })
}

fn record_removal_failed(asset: &Asset, err: &AppError) -> AppError {
    error!(
        asset_id = %asset.id,
        key = %asset.file_path,
        error = %err,
        "asset content removed but record removal failed"
    );
    AppError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "asset content was removed but the asset record could not be deleted",
    )
}

pub async fn delete_asset(
    state: &AppState,
    identity: &Identity,
    asset_id: Uuid,
) -> AppResult<AssetLifecycle> {
    let asset = {
        let mut conn = state.db()?;
        find_asset(&mut conn, asset_id)?
    };
    authorize(identity, Action::Delete, Some(&asset))?;

    state.storage.delete_object(&asset.file_path).await?;

    let mode = state.config.asset_delete_mode;
    let removed = state.db().and_then(|mut conn| {
        conn.transaction::<AssetLifecycle, AppError, _>(|conn| {
            let deactivated = sharing::deactivate_links_for_asset(conn, asset.id)?;
            let lifecycle = match mode {
                DeleteMode::Soft => {
                    let now = Utc::now().naive_utc();
                    diesel::update(assets::table.find(asset.id))
                        .set((assets::deleted_at.eq(Some(now)), assets::updated_at.eq(now)))
                        .execute(conn)?;
                    AssetLifecycle::SoftDeleted
                }
                DeleteMode::Hard => {
                    diesel::delete(assets::table.find(asset.id)).execute(conn)?;
                    AssetLifecycle::HardDeleted
                }
            };
            activity::record(
                conn,
                SUBJECT_ASSET,
                asset.id,
                Some(identity.user_id),
                EVENT_DELETED,
                json!({
                    "old": activity::asset_properties(&asset),
                    "deactivated_links": deactivated,
                }),
            )?;
            Ok(lifecycle)
        })
    });

    match removed {
        Ok(lifecycle) => {
            info!(asset_id = %asset.id, lifecycle = ?lifecycle, "asset deleted");
            Ok(lifecycle)
        }
        Err(err) => Err(record_removal_failed(&asset, &err)),
    }
}

/// Physically removes an asset, including one that is already soft-deleted.
pub async fn force_delete_asset(
    state: &AppState,
    identity: &Identity,
    asset_id: Uuid,
) -> AppResult<AssetLifecycle> {
    let asset: Asset = {
        let mut conn = state.db()?;
        assets::table.find(asset_id).first(&mut conn)?
    };
    authorize(identity, Action::ForceDelete, Some(&asset))?;

    state.storage.delete_object(&asset.file_path).await?;

    let removed = state.db().and_then(|mut conn| {
        conn.transaction::<(), AppError, _>(|conn| {
            diesel::delete(assets::table.find(asset.id)).execute(conn)?;
            activity::record(
                conn,
                SUBJECT_ASSET,
                asset.id,
                Some(identity.user_id),
                EVENT_FORCE_DELETED,
                json!({ "old": activity::asset_properties(&asset) }),
            )?;
            Ok(())
        })
    });

    match removed {
        Ok(()) => {
            info!(asset_id = %asset.id, "asset force deleted");
            Ok(AssetLifecycle::HardDeleted)
        }
        Err(err) => Err(record_removal_failed(&asset, &err)),
    }
}

/// Presigns a download URL after confirming the object still exists.
pub async fn signed_url(state: &AppState, asset: &Asset) -> AppResult<SignedUrl> {
    let ttl = state.config.signed_url_ttl_seconds;
    if !state.storage.object_exists(&asset.file_path).await? {
        warn!(asset_id = %asset.id, key = %asset.file_path, "asset content missing from storage");
        return Err(StorageError::ObjectMissing(asset.file_path.clone()).into());
    }

    let url = state
        .storage
        .presign_get_object(&asset.file_path, Duration::from_secs(ttl))
        .await?;

    Ok(SignedUrl {
        url,
        expires_in: ttl,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(bytes: &[u8]) -> UploadFields {
        UploadFields {
            bytes: Some(bytes.to_vec()),
            original_filename: Some("Brand Guide.PDF".into()),
            content_type: Some("application/pdf".into()),
            name: Some("Brand guide".into()),
            ..Default::default()
        }
    }

    #[test]
    fn storage_path_keeps_sanitized_extension() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        let id = Uuid::nil();
        assert_eq!(
            storage_path_for("Brand Guide.PDF", date, id),
            format!("assets/2024/03/07/{id}.pdf")
        );
        assert_eq!(
            storage_path_for("weird.t$g!z", date, id),
            format!("assets/2024/03/07/{id}.tgz")
        );
        assert_eq!(
            storage_path_for("README", date, id),
            format!("assets/2024/03/07/{id}")
        );
    }

    #[test]
    fn human_readable_size_rounds_to_two_places() {
        assert_eq!(human_readable_size(0), "0 B");
        assert_eq!(human_readable_size(512), "512 B");
        assert_eq!(human_readable_size(1536), "1.5 KB");
        assert_eq!(human_readable_size(1024 * 1024), "1 MB");
        assert_eq!(human_readable_size(1_288_490_189), "1.2 GB");
    }

    #[test]
    fn upload_validation_accepts_minimal_fields() {
        let request = UploadAssetRequest::validate(fields(b"%PDF-1.4"), 1024).unwrap();
        assert_eq!(request.name, "Brand guide");
        assert_eq!(request.category, AssetCategory::Media);
        assert_eq!(request.metadata, json!({}));
        assert_eq!(request.mime_type, "application/pdf");
    }

    #[test]
    fn upload_validation_rejects_bad_input() {
        let cases = [
            UploadFields {
                bytes: None,
                ..fields(b"x")
            },
            fields(b""),
            UploadFields {
                name: Some("   ".into()),
                ..fields(b"x")
            },
            UploadFields {
                name: Some("n".repeat(MAX_NAME_LENGTH + 1)),
                ..fields(b"x")
            },
            UploadFields {
                category: Some("memes".into()),
                ..fields(b"x")
            },
            UploadFields {
                company_id: Some("not-a-uuid".into()),
                ..fields(b"x")
            },
            UploadFields {
                metadata: Some("[1, 2]".into()),
                ..fields(b"x")
            },
            UploadFields {
                original_filename: Some(format!("{}.png", "a".repeat(MAX_FILENAME_LENGTH))),
                ..fields(b"x")
            },
            UploadFields {
                content_type: Some(format!("image/{}", "x".repeat(MAX_MIME_TYPE_LENGTH))),
                ..fields(b"x")
            },
        ];
        for case in cases {
            let err = UploadAssetRequest::validate(case, 1024).unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn upload_validation_enforces_size_limit() {
        let err = UploadAssetRequest::validate(fields(&[0u8; 11]), 10).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(UploadAssetRequest::validate(fields(&[0u8; 10]), 10).is_ok());
    }

    #[test]
    fn octet_stream_falls_back_to_extension_guess() {
        let request = UploadAssetRequest::validate(
            UploadFields {
                original_filename: Some("hero.png".into()),
                content_type: Some("application/octet-stream".into()),
                ..fields(b"png")
            },
            1024,
        )
        .unwrap();
        assert_eq!(request.mime_type, "image/png");
    }

    #[test]
    fn update_request_requires_a_change() {
        let err = UpdateAssetRequest::from_json(&json!({})).unwrap_err();
        assert_eq!(err.message(), "no changes provided");

        let request =
            UpdateAssetRequest::from_json(&json!({ "description": null, "category": "Legal" }))
                .unwrap();
        assert_eq!(request.description, Patch::Null);
        assert_eq!(request.category, Some(AssetCategory::Legal));
        assert!(request.company_id.is_omitted());

        assert!(UpdateAssetRequest::from_json(&json!({ "name": null })).is_err());
        assert!(UpdateAssetRequest::from_json(&json!({ "category": "memes" })).is_err());
    }

    #[test]
    fn content_disposition_escapes_quotes() {
        let header = inline_content_disposition("a\"b.pdf").unwrap();
        assert!(header.starts_with("inline; filename=\"a_b.pdf\""));
        assert!(inline_content_disposition("").is_none());
    }
}
