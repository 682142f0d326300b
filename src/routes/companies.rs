use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{Company, NewCompany};
use crate::policy::require_admin;
use crate::schema::companies;
use crate::state::AppState;
use crate::utils::json::{patch_field, Patch};
use crate::utils::time::to_iso;

const MAX_COMPANY_NAME: usize = 255;

#[derive(Deserialize)]
pub struct CreateCompanyRequest {
    pub name: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(AsChangeset)]
#[diesel(table_name = companies)]
struct UpdateCompanyChangeset {
    name: Option<String>,
    is_active: Option<bool>,
    updated_at: chrono::NaiveDateTime,
}

#[derive(Serialize)]
pub struct CompanyResponse {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Company> for CompanyResponse {
    fn from(company: Company) -> Self {
        Self {
            id: company.id,
            name: company.name,
            is_active: company.is_active,
            created_at: to_iso(company.created_at),
            updated_at: to_iso(company.updated_at),
        }
    }
}

fn validate_company_name(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    if trimmed.chars().count() > MAX_COMPANY_NAME {
        return Err(AppError::bad_request(format!(
            "name must be at most {MAX_COMPANY_NAME} characters"
        )));
    }
    Ok(trimmed.to_string())
}

pub async fn list_companies(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> AppResult<Json<Vec<CompanyResponse>>> {
    let mut conn = state.db()?;
    let rows: Vec<Company> = companies::table
        .filter(companies::is_active.eq(true))
        .order(companies::name.asc())
        .load(&mut conn)?;
    Ok(Json(rows.into_iter().map(CompanyResponse::from).collect()))
}

pub async fn create_company(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateCompanyRequest>,
) -> AppResult<(StatusCode, Json<CompanyResponse>)> {
    require_admin(&user.identity())?;
    let name = validate_company_name(&payload.name)?;

    let mut conn = state.db()?;
    let company: Company = diesel::insert_into(companies::table)
        .values(&NewCompany {
            id: Uuid::new_v4(),
            name,
            is_active: payload.is_active,
        })
        .get_result(&mut conn)?;

    info!(company_id = %company.id, "company created");
    Ok((StatusCode::CREATED, Json(company.into())))
}

pub async fn update_company(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(company_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<CompanyResponse>> {
    require_admin(&user.identity())?;

    let name = match patch_field::<String>(&body, "name").map_err(AppError::bad_request)? {
        Patch::Omitted => None,
        Patch::Null => return Err(AppError::bad_request("name must not be null")),
        Patch::Value(name) => Some(validate_company_name(&name)?),
    };
    let is_active = match patch_field::<bool>(&body, "is_active").map_err(AppError::bad_request)? {
        Patch::Omitted => None,
        Patch::Null => return Err(AppError::bad_request("is_active must not be null")),
        Patch::Value(flag) => Some(flag),
    };

    if name.is_none() && is_active.is_none() {
        return Err(AppError::bad_request("no changes provided"));
    }

    let mut conn = state.db()?;
    let company: Company = diesel::update(companies::table.find(company_id))
        .set(&UpdateCompanyChangeset {
            name,
            is_active,
            updated_at: Utc::now().naive_utc(),
        })
        .get_result(&mut conn)?;

    Ok(Json(company.into()))
}

pub async fn delete_company(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(company_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require_admin(&user.identity())?;

    let mut conn = state.db()?;
    let deleted = diesel::delete(companies::table.find(company_id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }

    info!(company_id = %company_id, "company deleted");
    Ok(StatusCode::NO_CONTENT)
}
