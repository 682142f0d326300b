use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::auth::{password, AuthenticatedUser};
use crate::error::{AppError, AppResult};
use crate::models::{NewUser, User};
use crate::policy::{normalize_role_names, require_admin, Role};
use crate::schema::users;
use crate::state::AppState;
use crate::utils::json::{patch_field, Patch};
use crate::utils::time::to_iso;

const MAX_FIELD_LENGTH: usize = 255;
const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Default, Deserialize)]
pub struct UserFilters {
    pub search: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
    pub roles: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

#[derive(AsChangeset)]
#[diesel(table_name = users)]
struct UserChangeset {
    name: Option<String>,
    email: Option<String>,
    password_hash: Option<String>,
    roles: Option<Vec<String>>,
    is_enabled: Option<bool>,
    updated_at: NaiveDateTime,
}

impl UserChangeset {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.password_hash.is_none()
            && self.roles.is_none()
            && self.is_enabled.is_none()
    }
}

/// Account as returned to administrators; the password hash never leaves the server.
#[derive(Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub roles: Vec<String>,
    pub is_enabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            roles: user.roles,
            is_enabled: user.is_enabled,
            created_at: to_iso(user.created_at),
            updated_at: to_iso(user.updated_at),
        }
    }
}

fn validate_user_name(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    if trimmed.chars().count() > MAX_FIELD_LENGTH {
        return Err(AppError::bad_request(format!(
            "name must be at most {MAX_FIELD_LENGTH} characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn validate_email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_lowercase();
    let well_formed = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !well_formed || email.chars().any(char::is_whitespace) {
        return Err(AppError::bad_request("email must be a valid address"));
    }
    if email.chars().count() > MAX_FIELD_LENGTH {
        return Err(AppError::bad_request(format!(
            "email must be at most {MAX_FIELD_LENGTH} characters"
        )));
    }
    Ok(email)
}

fn hash_new_password(plain: &str) -> AppResult<String> {
    if plain.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::bad_request(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(password::hash_password(plain)?)
}

fn validate_roles(names: &[String]) -> AppResult<Vec<String>> {
    normalize_role_names(names.iter().map(String::as_str)).map_err(AppError::bad_request)
}

fn email_taken(err: DieselError) -> AppError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            AppError::conflict("email is already taken")
        }
        other => AppError::from(other),
    }
}

pub async fn list_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(filters): Query<UserFilters>,
) -> AppResult<Json<Vec<UserResponse>>> {
    require_admin(&user.identity())?;

    let mut query = users::table.into_boxed();
    if let Some(search) = filters
        .search
        .as_deref()
        .map(str::trim)
        .filter(|search| !search.is_empty())
    {
        let pattern = format!("%{search}%");
        query = query.filter(
            users::name
                .ilike(pattern.clone())
                .or(users::email.ilike(pattern)),
        );
    }

    let mut conn = state.db()?;
    let rows: Vec<User> = query
        .order((users::name.asc(), users::email.asc()))
        .load(&mut conn)?;
    Ok(Json(rows.into_iter().map(UserResponse::from).collect()))
}

pub async fn create_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    require_admin(&user.identity())?;

    let new_user = NewUser {
        id: Uuid::new_v4(),
        name: validate_user_name(&payload.name)?,
        email: validate_email(&payload.email)?,
        roles: validate_roles(&payload.roles)?,
        password_hash: hash_new_password(&payload.password)?,
        is_enabled: payload.is_enabled,
    };

    let mut conn = state.db()?;
    let created: User = diesel::insert_into(users::table)
        .values(&new_user)
        .get_result(&mut conn)
        .map_err(email_taken)?;

    info!(user_id = %created.id, created_by = %user.user_id, roles = ?created.roles, "user created");
    Ok((StatusCode::CREATED, Json(created.into())))
}

pub async fn update_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(user_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<UserResponse>> {
    require_admin(&user.identity())?;
    if !body.is_object() {
        return Err(AppError::bad_request("request body must be a JSON object"));
    }

    fn required<T>(patch: Patch<T>, field: &str) -> AppResult<Option<T>> {
        match patch {
            Patch::Omitted => Ok(None),
            Patch::Null => Err(AppError::bad_request(format!("{field} must not be null"))),
            Patch::Value(value) => Ok(Some(value)),
        }
    }

    let field = |name: &str| patch_field::<String>(&body, name).map_err(AppError::bad_request);
    let changes = UserChangeset {
        name: required(field("name")?, "name")?
            .map(|name| validate_user_name(&name))
            .transpose()?,
        email: required(field("email")?, "email")?
            .map(|email| validate_email(&email))
            .transpose()?,
        password_hash: required(field("password")?, "password")?
            .map(|plain| hash_new_password(&plain))
            .transpose()?,
        roles: required(
            patch_field::<Vec<String>>(&body, "roles").map_err(AppError::bad_request)?,
            "roles",
        )?
        .map(|roles| validate_roles(&roles))
        .transpose()?,
        is_enabled: required(
            patch_field::<bool>(&body, "is_enabled").map_err(AppError::bad_request)?,
            "is_enabled",
        )?,
        updated_at: Utc::now().naive_utc(),
    };

    if changes.is_empty() {
        return Err(AppError::bad_request("no changes provided"));
    }

    let mut conn = state.db()?;
    let updated: User = diesel::update(users::table.find(user_id))
        .set(&changes)
        .get_result(&mut conn)
        .map_err(email_taken)?;

    info!(user_id = %updated.id, updated_by = %user.user_id, "user updated");
    Ok(Json(updated.into()))
}

pub async fn delete_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require_admin(&user.identity())?;
    if user_id == user.user_id {
        return Err(AppError::bad_request("you cannot delete your own account"));
    }

    let mut conn = state.db()?;
    let target: User = users::table.find(user_id).first(&mut conn)?;
    if target.roles.iter().any(|role| role == Role::Admin.as_str()) {
        return Err(AppError::forbidden("admin users cannot be deleted"));
    }

    match diesel::delete(users::table.find(user_id)).execute(&mut conn) {
        Ok(_) => {}
        Err(DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _)) => {
            return Err(AppError::conflict(
                "user still owns assets or shareable links; disable the account instead",
            ));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    info!(user_id = %user_id, deleted_by = %user.user_id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}
