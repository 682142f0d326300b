use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub roles: Vec<String>,
    pub is_enabled: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub roles: Vec<String>,
    pub is_enabled: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = companies)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = companies)]
pub struct NewCompany {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = assets)]
#[diesel(belongs_to(Company))]
pub struct Asset {
    pub id: Uuid,
    pub name: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_type: String,
    pub mime_type: String,
    pub file_size: i64,
    pub description: Option<String>,
    pub metadata: serde_json::Value,
    pub status: String,
    pub category: String,
    pub uploaded_by: Uuid,
    pub company_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub deleted_at: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = assets)]
pub struct NewAsset {
    pub id: Uuid,
    pub name: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_type: String,
    pub mime_type: String,
    pub file_size: i64,
    pub description: Option<String>,
    pub metadata: serde_json::Value,
    pub status: String,
    pub category: String,
    pub uploaded_by: Uuid,
    pub company_id: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = shareable_links)]
#[diesel(belongs_to(Asset))]
pub struct ShareableLink {
    pub id: Uuid,
    pub token: String,
    pub asset_id: Uuid,
    pub created_by: Uuid,
    pub expires_at: NaiveDateTime,
    pub max_views: Option<i32>,
    pub view_count: i32,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = shareable_links)]
pub struct NewShareableLink {
    pub id: Uuid,
    pub token: String,
    pub asset_id: Uuid,
    pub created_by: Uuid,
    pub expires_at: NaiveDateTime,
    pub max_views: Option<i32>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = shareable_link_views)]
#[diesel(belongs_to(ShareableLink))]
pub struct ShareableLinkView {
    pub id: Uuid,
    pub shareable_link_id: Uuid,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = shareable_link_views)]
pub struct NewShareableLinkView {
    pub id: Uuid,
    pub shareable_link_id: Uuid,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = activity_log)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub subject_type: String,
    pub subject_id: Uuid,
    pub causer_id: Option<Uuid>,
    pub event: String,
    pub properties: serde_json::Value,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = activity_log)]
pub struct NewActivityEntry {
    pub id: Uuid,
    pub subject_type: String,
    pub subject_id: Uuid,
    pub causer_id: Option<Uuid>,
    pub event: String,
    pub properties: serde_json::Value,
}
