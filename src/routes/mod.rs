use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod assets;
pub mod auth;
pub mod companies;
pub mod dashboard;
pub mod health;
pub mod share;
pub mod users;

fn cors_layer(state: &AppState) -> CorsLayer {
    let allow_origin = match state.config.cors_allowed_origin.as_ref() {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        warn!(origin = %value, "ignoring invalid CORS allowed origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(&state);
    let body_limit = state.config.request_body_limit();

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    let assets_routes = Router::new()
        .route("/", get(assets::list_assets).post(assets::upload_asset))
        .route(
            "/:id",
            get(assets::get_asset)
                .patch(assets::update_asset)
                .delete(assets::delete_asset),
        )
        .route("/:id/force", delete(assets::force_delete_asset))
        .route("/:id/download", get(assets::download_asset))
        .route(
            "/:id/shareable-links",
            get(assets::list_asset_links).post(assets::create_asset_link),
        );

    let links_routes = Router::new().route("/:id/deactivate", post(share::deactivate_link));

    let companies_routes = Router::new()
        .route(
            "/",
            get(companies::list_companies).post(companies::create_company),
        )
        .route(
            "/:id",
            patch(companies::update_company).delete(companies::delete_company),
        );

    let users_routes = Router::new()
        .route("/", get(users::list_users).post(users::create_user))
        .route(
            "/:id",
            patch(users::update_user).delete(users::delete_user),
        );

    let public_share_routes = Router::new()
        .route("/share/:token", get(share::resolve_share))
        .route("/share/:token/qr", get(share::share_qr));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/assets", assets_routes)
        .nest("/api/shareable-links", links_routes)
        .nest("/api/companies", companies_routes)
        .nest("/api/users", users_routes)
        .route("/api/dashboard", get(dashboard::dashboard))
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(public_share_routes)
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
}
