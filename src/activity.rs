use diesel::prelude::*;
use diesel::PgConnection;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::{ActivityEntry, Asset, NewActivityEntry, ShareableLink};
use crate::schema::activity_log;
use crate::utils::time::to_iso;

pub const SUBJECT_ASSET: &str = "asset";
pub const SUBJECT_SHAREABLE_LINK: &str = "shareable_link";

pub const EVENT_CREATED: &str = "created";
pub const EVENT_UPDATED: &str = "updated";
pub const EVENT_DELETED: &str = "deleted";
pub const EVENT_FORCE_DELETED: &str = "force_deleted";
pub const EVENT_DEACTIVATED: &str = "deactivated";

#[derive(Debug, Serialize)]
pub struct ActivityResponse {
    pub id: Uuid,
    pub subject_type: String,
    pub subject_id: Uuid,
    pub causer_id: Option<Uuid>,
    pub event: String,
    pub properties: Value,
    pub created_at: String,
}

impl From<ActivityEntry> for ActivityResponse {
    fn from(entry: ActivityEntry) -> Self {
        Self {
            id: entry.id,
            subject_type: entry.subject_type,
            subject_id: entry.subject_id,
            causer_id: entry.causer_id,
            event: entry.event,
            properties: entry.properties,
            created_at: to_iso(entry.created_at),
        }
    }
}

pub fn record(
    conn: &mut PgConnection,
    subject_type: &str,
    subject_id: Uuid,
    causer_id: Option<Uuid>,
    event: &str,
    properties: Value,
) -> QueryResult<()> {
    let entry = NewActivityEntry {
        id: Uuid::new_v4(),
        subject_type: subject_type.to_string(),
        subject_id,
        causer_id,
        event: event.to_string(),
        properties,
    };

    diesel::insert_into(activity_log::table)
        .values(&entry)
        .execute(conn)?;
    Ok(())
}

/// Snapshot of the logged asset attributes.
pub fn asset_properties(asset: &Asset) -> Value {
    json!({
        "name": asset.name,
        "status": asset.status,
        "description": asset.description,
    })
}

pub fn link_properties(link: &ShareableLink) -> Value {
    json!({
        "expires_at": to_iso(link.expires_at),
        "max_views": link.max_views,
        "is_active": link.is_active,
    })
}

pub fn recent(conn: &mut PgConnection, limit: i64) -> QueryResult<Vec<ActivityEntry>> {
    activity_log::table
        .order(activity_log::created_at.desc())
        .limit(limit)
        .load(conn)
}

pub fn for_subject(
    conn: &mut PgConnection,
    subject_type: &str,
    subject_id: Uuid,
) -> QueryResult<Vec<ActivityEntry>> {
    activity_log::table
        .filter(activity_log::subject_type.eq(subject_type))
        .filter(activity_log::subject_id.eq(subject_id))
        .order(activity_log::created_at.asc())
        .load(conn)
}
