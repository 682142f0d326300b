//! Shareable links: token issue, validity, the counted public resolve and QR rendering.

use std::io::Cursor;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::PgConnection;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use qrcode::{Color, QrCode};
use rand::{rngs::OsRng, RngCore};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::activity::{self, EVENT_CREATED, EVENT_DEACTIVATED, SUBJECT_SHAREABLE_LINK};
use crate::assets::find_asset;
use crate::error::{AppError, AppResult};
use crate::models::{Asset, NewShareableLink, NewShareableLinkView, ShareableLink};
use crate::policy::{authorize, Action, Identity};
use crate::schema::{assets, shareable_link_views, shareable_links};

pub const TOKEN_BYTES: usize = 32;
const TOKEN_ATTEMPTS: usize = 3;

pub const QR_MIN_SIZE: u32 = 300;
pub const QR_QUIET_ZONE: u32 = 4;

const LINK_NOT_VALID: &str = "this link has expired or is no longer available";

/// 32 bytes from the OS RNG, base64url without padding (43 characters).
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

impl ShareableLink {
    pub fn is_valid_at(&self, now: NaiveDateTime) -> bool {
        self.is_active
            && now < self.expires_at
            && self.max_views.map_or(true, |max| self.view_count < max)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now().naive_utc())
    }
}

#[derive(Debug, Clone)]
pub struct CreateLinkRequest {
    pub expires_at: NaiveDateTime,
    pub max_views: Option<i32>,
}

impl CreateLinkRequest {
    pub fn validate(
        expires_at: DateTime<Utc>,
        max_views: Option<i32>,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        if expires_at <= now {
            return Err(AppError::bad_request("expires_at must be in the future"));
        }
        if matches!(max_views, Some(max) if max < 1) {
            return Err(AppError::bad_request("max_views must be at least 1"));
        }
        Ok(Self {
            expires_at: expires_at.naive_utc(),
            max_views,
        })
    }
}

/// Request metadata captured with every counted view.
#[derive(Debug, Clone, Default)]
pub struct ViewContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
}

pub fn create_link(
    conn: &mut PgConnection,
    identity: &Identity,
    asset_id: Uuid,
    request: &CreateLinkRequest,
) -> AppResult<ShareableLink> {
    let asset = find_asset(conn, asset_id)?;
    authorize(identity, Action::Share, Some(&asset))?;

    for attempt in 1..=TOKEN_ATTEMPTS {
        let new_link = NewShareableLink {
            id: Uuid::new_v4(),
            token: generate_token(),
            asset_id: asset.id,
            created_by: identity.user_id,
            expires_at: request.expires_at,
            max_views: request.max_views,
        };

        let created = conn.transaction::<ShareableLink, DieselError, _>(|conn| {
            let link: ShareableLink = diesel::insert_into(shareable_links::table)
                .values(&new_link)
                .get_result(conn)?;
            activity::record(
                conn,
                SUBJECT_SHAREABLE_LINK,
                link.id,
                Some(identity.user_id),
                EVENT_CREATED,
                json!({ "attributes": activity::link_properties(&link) }),
            )?;
            Ok(link)
        });

        match created {
            Ok(link) => {
                info!(link_id = %link.id, asset_id = %asset.id, "shareable link created");
                return Ok(link);
            }
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                warn!(attempt, asset_id = %asset.id, "share token collision, regenerating");
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(AppError::conflict("could not allocate a unique share token"))
}

/// Counts one view and returns the shared asset.
///
/// The increment is a single conditional UPDATE, so concurrent resolves of a
/// link with one view left produce exactly one success.
pub fn resolve_link(
    conn: &mut PgConnection,
    token: &str,
    view: &ViewContext,
) -> AppResult<(Asset, ShareableLink)> {
    conn.transaction::<(Asset, ShareableLink), AppError, _>(|conn| {
        let now = Utc::now().naive_utc();

        let counted: Option<ShareableLink> = diesel::update(
            shareable_links::table
                .filter(shareable_links::token.eq(token))
                .filter(shareable_links::is_active.eq(true))
                .filter(shareable_links::expires_at.gt(now))
                .filter(
                    shareable_links::max_views.is_null().or(shareable_links::view_count
                        .lt(shareable_links::max_views.assume_not_null())),
                ),
        )
        .set((
            shareable_links::view_count.eq(shareable_links::view_count + 1),
            shareable_links::updated_at.eq(now),
        ))
        .get_result(conn)
        .optional()?;

        let Some(link) = counted else {
            let known: bool = diesel::select(exists(
                shareable_links::table.filter(shareable_links::token.eq(token)),
            ))
            .get_result(conn)?;
            return Err(if known {
                AppError::forbidden(LINK_NOT_VALID)
            } else {
                AppError::not_found()
            });
        };

        // Rolls the increment back when the asset went away underneath the link.
        let asset: Asset = assets::table
            .find(link.asset_id)
            .filter(assets::deleted_at.is_null())
            .first(conn)
            .optional()?
            .ok_or_else(|| AppError::forbidden(LINK_NOT_VALID))?;

        diesel::insert_into(shareable_link_views::table)
            .values(&NewShareableLinkView {
                id: Uuid::new_v4(),
                shareable_link_id: link.id,
                ip_address: view.ip_address.clone(),
                user_agent: view.user_agent.clone(),
                referer: view.referer.clone(),
            })
            .execute(conn)?;

        Ok((asset, link))
    })
}

/// Read-only validity check; never counts a view.
pub fn check_link(conn: &mut PgConnection, token: &str) -> AppResult<(ShareableLink, Asset)> {
    let link: ShareableLink = shareable_links::table
        .filter(shareable_links::token.eq(token))
        .first(conn)
        .optional()?
        .ok_or_else(AppError::not_found)?;

    if !link.is_valid() {
        return Err(AppError::forbidden(LINK_NOT_VALID));
    }

    let asset: Asset = assets::table
        .find(link.asset_id)
        .filter(assets::deleted_at.is_null())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::forbidden(LINK_NOT_VALID))?;

    Ok((link, asset))
}

pub fn deactivate_link(
    conn: &mut PgConnection,
    identity: &Identity,
    link_id: Uuid,
) -> AppResult<ShareableLink> {
    let link: ShareableLink = shareable_links::table.find(link_id).first(conn)?;
    let asset: Asset = assets::table.find(link.asset_id).first(conn)?;
    authorize(identity, Action::Share, Some(&asset))?;

    if !link.is_active {
        return Ok(link);
    }

    conn.transaction::<ShareableLink, AppError, _>(|conn| {
        let updated: ShareableLink = diesel::update(shareable_links::table.find(link_id))
            .set((
                shareable_links::is_active.eq(false),
                shareable_links::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(conn)?;
        activity::record(
            conn,
            SUBJECT_SHAREABLE_LINK,
            link_id,
            Some(identity.user_id),
            EVENT_DEACTIVATED,
            json!({
                "old": activity::link_properties(&link),
                "attributes": activity::link_properties(&updated),
            }),
        )?;
        Ok(updated)
    })
}

pub fn deactivate_links_for_asset(conn: &mut PgConnection, asset_id: Uuid) -> QueryResult<usize> {
    diesel::update(
        shareable_links::table
            .filter(shareable_links::asset_id.eq(asset_id))
            .filter(shareable_links::is_active.eq(true)),
    )
    .set((
        shareable_links::is_active.eq(false),
        shareable_links::updated_at.eq(Utc::now().naive_utc()),
    ))
    .execute(conn)
}

pub fn list_links(
    conn: &mut PgConnection,
    identity: &Identity,
    asset_id: Uuid,
) -> AppResult<Vec<ShareableLink>> {
    let asset = find_asset(conn, asset_id)?;
    authorize(identity, Action::Share, Some(&asset))?;
    recent_links(conn, asset.id, None)
}

pub fn recent_links(
    conn: &mut PgConnection,
    asset_id: Uuid,
    limit: Option<i64>,
) -> AppResult<Vec<ShareableLink>> {
    let mut query = shareable_links::table
        .filter(shareable_links::asset_id.eq(asset_id))
        .order((shareable_links::created_at.desc(), shareable_links::id.asc()))
        .into_boxed();
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    Ok(query.load(conn)?)
}

/// Renders `content` as a PNG QR code at least [`QR_MIN_SIZE`] pixels wide.
pub fn render_qr_png(content: &str) -> AppResult<Vec<u8>> {
    let code = QrCode::new(content.as_bytes()).map_err(AppError::internal)?;
    let modules = code.width() as u32;
    let colors = code.to_colors();

    let span = modules + 2 * QR_QUIET_ZONE;
    let scale = QR_MIN_SIZE.div_ceil(span).max(1);
    let size = span * scale;

    let image = GrayImage::from_fn(size, size, |x, y| {
        let (mx, my) = (x / scale, y / scale);
        let inside = (QR_QUIET_ZONE..QR_QUIET_ZONE + modules).contains(&mx)
            && (QR_QUIET_ZONE..QR_QUIET_ZONE + modules).contains(&my);
        if inside {
            let index = ((my - QR_QUIET_ZONE) * modules + (mx - QR_QUIET_ZONE)) as usize;
            if colors[index] == Color::Dark {
                return Luma([0u8]);
            }
        }
        Luma([255u8])
    });

    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(image)
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(AppError::internal)?;
    Ok(buffer.into_inner())
}
