//! Role-then-ownership authorization for asset actions.
//!
//! Every asset-scoped handler calls [`authorize`] before it mutates or
//! returns data; a denial is a 403, never an empty result.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::Asset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Uploader,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Uploader => "uploader",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "uploader" => Some(Role::Uploader),
            _ => None,
        }
    }
}

/// Canonical, de-duplicated role names for storage. Unknown names and an
/// empty list are rejected.
pub fn normalize_role_names<'a>(
    names: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<String>, String> {
    let mut roles: Vec<String> = Vec::new();
    for name in names.into_iter().map(str::trim).filter(|name| !name.is_empty()) {
        let role = Role::parse(name).ok_or_else(|| format!("unknown role '{name}'"))?;
        if !roles.iter().any(|existing| existing == role.as_str()) {
            roles.push(role.as_str().to_string());
        }
    }
    if roles.is_empty() {
        return Err("at least one role is required (admin, uploader)".to_string());
    }
    Ok(roles)
}

/// Request-scoped caller identity, built from the verified access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub roles: Vec<Role>,
}

impl Identity {
    pub fn new(user_id: Uuid, roles: Vec<Role>) -> Self {
        Self { user_id, roles }
    }

    /// Unknown role names are dropped rather than rejected.
    pub fn from_role_names(user_id: Uuid, names: &[String]) -> Self {
        let mut roles = Vec::new();
        for role in names.iter().filter_map(|name| Role::parse(name)) {
            if !roles.contains(&role) {
                roles.push(role);
            }
        }
        Self { user_id, roles }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    fn owns(&self, asset: Option<&Asset>) -> bool {
        asset.is_some_and(|asset| asset.uploaded_by == self.user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    ViewAny,
    View,
    Create,
    Update,
    Delete,
    Download,
    Share,
    Restore,
    ForceDelete,
}

impl Action {
    pub const ALL: [Action; 9] = [
        Action::ViewAny,
        Action::View,
        Action::Create,
        Action::Update,
        Action::Delete,
        Action::Download,
        Action::Share,
        Action::Restore,
        Action::ForceDelete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::ViewAny => "viewAny",
            Action::View => "view",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Download => "download",
            Action::Share => "share",
            Action::Restore => "restore",
            Action::ForceDelete => "forceDelete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn can(identity: &Identity, action: Action, asset: Option<&Asset>) -> bool {
    match action {
        Action::ViewAny | Action::Create => {
            identity.is_admin() || identity.has_role(Role::Uploader)
        }
        Action::View | Action::Update | Action::Delete | Action::Download => {
            identity.is_admin() || (identity.has_role(Role::Uploader) && identity.owns(asset))
        }
        Action::Share | Action::Restore | Action::ForceDelete => identity.is_admin(),
    }
}

pub fn authorize(identity: &Identity, action: Action, asset: Option<&Asset>) -> AppResult<()> {
    if can(identity, action, asset) {
        Ok(())
    } else {
        Err(AppError::forbidden(format!(
            "this action is unauthorized: {action}"
        )))
    }
}

pub fn require_admin(identity: &Identity) -> AppResult<()> {
    if identity.is_admin() {
        Ok(())
    } else {
        Err(AppError::forbidden("administrator role required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use chrono::Utc;
    use serde_json::json;

    fn asset_owned_by(owner: Uuid) -> Asset {
        let now = Utc::now().naive_utc();
        Asset {
            id: Uuid::new_v4(),
            name: "logo".into(),
            original_filename: "logo.png".into(),
            file_path: "assets/2024/01/01/x.png".into(),
            file_type: "image".into(),
            mime_type: "image/png".into(),
            file_size: 10,
            description: None,
            metadata: json!({}),
            status: "active".into(),
            category: "media".into(),
            uploaded_by: owner,
            company_id: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    const A: &[Role] = &[Role::Admin];
    const U: &[Role] = &[Role::Uploader];
    const AU: &[Role] = &[Role::Admin, Role::Uploader];
    const NONE: &[Role] = &[];

    // (roles, owns the asset, action, allowed)
    #[rustfmt::skip]
    const MATRIX: &[(&[Role], bool, Action, bool)] = &[
        (NONE, true, Action::ViewAny, false),     (NONE, false, Action::ViewAny, false),
        (NONE, true, Action::View, false),        (NONE, false, Action::View, false),
        (NONE, true, Action::Create, false),      (NONE, false, Action::Create, false),
        (NONE, true, Action::Update, false),      (NONE, false, Action::Update, false),
        (NONE, true, Action::Delete, false),      (NONE, false, Action::Delete, false),
        (NONE, true, Action::Download, false),    (NONE, false, Action::Download, false),
        (NONE, true, Action::Share, false),       (NONE, false, Action::Share, false),
        (NONE, true, Action::Restore, false),     (NONE, false, Action::Restore, false),
        (NONE, true, Action::ForceDelete, false), (NONE, false, Action::ForceDelete, false),

        (U, true, Action::ViewAny, true),         (U, false, Action::ViewAny, true),
        (U, true, Action::View, true),            (U, false, Action::View, false),
        (U, true, Action::Create, true),          (U, false, Action::Create, true),
        (U, true, Action::Update, true),          (U, false, Action::Update, false),
        (U, true, Action::Delete, true),          (U, false, Action::Delete, false),
        (U, true, Action::Download, true),        (U, false, Action::Download, false),
        (U, true, Action::Share, false),          (U, false, Action::Share, false),
        (U, true, Action::Restore, false),        (U, false, Action::Restore, false),
        (U, true, Action::ForceDelete, false),    (U, false, Action::ForceDelete, false),

        (A, true, Action::ViewAny, true),         (A, false, Action::ViewAny, true),
        (A, true, Action::View, true),            (A, false, Action::View, true),
        (A, true, Action::Create, true),          (A, false, Action::Create, true),
        (A, true, Action::Update, true),          (A, false, Action::Update, true),
        (A, true, Action::Delete, true),          (A, false, Action::Delete, true),
        (A, true, Action::Download, true),        (A, false, Action::Download, true),
        (A, true, Action::Share, true),           (A, false, Action::Share, true),
        (A, true, Action::Restore, true),         (A, false, Action::Restore, true),
        (A, true, Action::ForceDelete, true),     (A, false, Action::ForceDelete, true),

        (AU, true, Action::ViewAny, true),        (AU, false, Action::ViewAny, true),
        (AU, true, Action::View, true),           (AU, false, Action::View, true),
        (AU, true, Action::Create, true),         (AU, false, Action::Create, true),
        (AU, true, Action::Update, true),         (AU, false, Action::Update, true),
        (AU, true, Action::Delete, true),         (AU, false, Action::Delete, true),
        (AU, true, Action::Download, true),       (AU, false, Action::Download, true),
        (AU, true, Action::Share, true),          (AU, false, Action::Share, true),
        (AU, true, Action::Restore, true),        (AU, false, Action::Restore, true),
        (AU, true, Action::ForceDelete, true),    (AU, false, Action::ForceDelete, true),
    ];

    #[test]
    fn matrix_matches_role_and_ownership_rules() {
        assert_eq!(MATRIX.len(), 4 * Action::ALL.len() * 2);

        let user_id = Uuid::new_v4();
        let own = asset_owned_by(user_id);
        let foreign = asset_owned_by(Uuid::new_v4());

        for &(roles, owns, action, allowed) in MATRIX {
            let identity = Identity::new(user_id, roles.to_vec());
            let asset = if owns { &own } else { &foreign };
            assert_eq!(
                can(&identity, action, Some(asset)),
                allowed,
                "roles={roles:?} owns={owns} action={action}"
            );
        }
    }

    #[test]
    fn uploader_cannot_touch_foreign_assets() {
        let identity = Identity::new(Uuid::new_v4(), vec![Role::Uploader]);
        let foreign = asset_owned_by(Uuid::new_v4());
        for action in [Action::View, Action::Update, Action::Delete, Action::Download] {
            let err = authorize(&identity, action, Some(&foreign)).unwrap_err();
            assert_eq!(err.status(), StatusCode::FORBIDDEN);
        }
    }

    #[test]
    fn uploader_never_shares_even_own_assets() {
        let identity = Identity::new(Uuid::new_v4(), vec![Role::Uploader]);
        let own = asset_owned_by(identity.user_id);
        assert!(!can(&identity, Action::Share, Some(&own)));
        assert!(!can(&identity, Action::ForceDelete, Some(&own)));
    }

    #[test]
    fn ownership_actions_without_an_asset_need_admin() {
        let uploader = Identity::new(Uuid::new_v4(), vec![Role::Uploader]);
        assert!(!can(&uploader, Action::View, None));
        let admin = Identity::new(Uuid::new_v4(), vec![Role::Admin]);
        assert!(can(&admin, Action::View, None));
    }

    #[test]
    fn unknown_role_names_are_ignored() {
        let identity =
            Identity::from_role_names(Uuid::new_v4(), &["Uploader".into(), "viewer".into()]);
        assert_eq!(identity.roles, vec![Role::Uploader]);
        assert!(require_admin(&identity).is_err());
    }

    #[test]
    fn role_names_normalize_for_storage() {
        assert_eq!(
            normalize_role_names(["Admin", " uploader", "admin"]).unwrap(),
            vec!["admin".to_string(), "uploader".to_string()]
        );
        assert!(normalize_role_names(["viewer"]).is_err());
        assert!(normalize_role_names([" ", ""]).is_err());
    }

    #[test]
    fn repeated_role_names_collapse() {
        let names: Vec<String> = ["admin", "uploader", "ADMIN", "uploader"]
            .into_iter()
            .map(String::from)
            .collect();
        let identity = Identity::from_role_names(Uuid::new_v4(), &names);
        assert_eq!(identity.roles, vec![Role::Admin, Role::Uploader]);
    }
}
