use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{
    auth::{AuthenticatedUser, StaffUser},
    state::AppState,
};

pub mod admin;
pub mod applications;
pub mod auth;
pub mod companies;
pub mod health;
pub mod postings;
pub mod profile;
pub mod queue;
pub mod reports;
pub mod transfer;

pub const DEFAULT_PAGE_SIZE: i64 = 100;
pub const MAX_PAGE_SIZE: i64 = 500;

/// CSV imports arrive as a single request body.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Clamps list pagination to `1..=MAX_PAGE_SIZE` rows from a non-negative
/// offset.
pub(crate) fn page_bounds(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    (
        limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        offset.unwrap_or(0).max(0),
    )
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return None;
                }
                match trimmed.parse::<HeaderValue>() {
                    Ok(origin) => Some(origin),
                    Err(_) => {
                        tracing::warn!(origin = %trimmed, "ignoring invalid CORS allowed origin");
                        None
                    }
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(headers))
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    let profile_routes = Router::new().route(
        "/",
        get(profile::get_profile).patch(profile::update_profile),
    );

    let api_key_routes = Router::new()
        .route(
            "/",
            get(profile::list_api_keys).post(profile::create_key),
        )
        .route("/:key", delete(profile::revoke_api_key));

    let companies_routes = Router::new()
        .route("/", get(companies::list_companies))
        .route("/by-name", get(companies::get_company_by_name))
        .route("/:id", get(companies::get_company));

    let postings_routes = Router::new()
        .route("/", get(postings::list_postings))
        .route("/by-url", get(postings::get_postings_by_url))
        .route("/:id", get(postings::get_posting));

    let applications_routes = Router::new()
        .route(
            "/",
            get(applications::list_applications).post(applications::create_application),
        )
        .route("/by-url", get(applications::get_applications_by_url))
        .route("/mark-applied", post(applications::mark_applied))
        .route(
            "/:id",
            get(applications::get_application)
                .patch(applications::update_application)
                .delete(applications::delete_application),
        );

    let queue_routes = Router::new()
        .route("/", get(queue::list_queue))
        .route("/companies", get(queue::list_queue_companies));

    let reports_routes = Router::new()
        .route("/companies", get(reports::company_counts))
        .route("/companies/:id/completion", get(reports::company_completion))
        .route("/leaderboard/users", get(reports::user_leaderboard))
        .route("/leaderboard/companies", get(reports::company_leaderboard))
        .route("/my-companies", get(reports::my_companies));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/profile", profile_routes)
        .nest("/api/api-keys", api_key_routes)
        .nest("/api/companies", companies_routes)
        .nest("/api/postings", postings_routes)
        .nest("/api/applications", applications_routes)
        .nest("/api/queue", queue_routes)
        .nest("/api/reports", reports_routes)
        .route(
            "/api/export/applications.csv",
            get(transfer::export_my_applications),
        )
        .route(
            "/api/import/applications",
            post(transfer::import_my_applications),
        )
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users).post(admin::create_account))
        .route("/applications", get(admin::list_all_applications))
        .route("/companies", post(companies::create_company))
        .route(
            "/companies/:id",
            delete(companies::delete_company).patch(companies::update_company),
        )
        .route("/postings", post(postings::create_posting))
        .route(
            "/postings/:id",
            delete(postings::delete_posting).patch(postings::update_posting),
        )
        .route("/postings/:id/close", post(postings::close_posting))
        .route("/export/companies.csv", get(transfer::export_companies))
        .route("/export/postings.csv", get(transfer::export_postings))
        .route(
            "/export/applications.csv",
            get(transfer::export_applications),
        )
        .route("/export/users.csv", get(transfer::export_users))
        .route("/import/companies", post(transfer::import_companies))
        .route("/import/postings", post(transfer::import_postings))
        .route(
            "/import/applications",
            post(transfer::import_applications),
        )
        .layer(middleware::from_extractor_with_state::<StaffUser, _>(
            state.clone(),
        ));

    Router::new()
        .merge(protected_routes)
        .nest("/api/admin", admin_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_clamps() {
        assert_eq!(page_bounds(None, None), (DEFAULT_PAGE_SIZE, 0));
        assert_eq!(page_bounds(Some(10_000), Some(-5)), (MAX_PAGE_SIZE, 0));
        assert_eq!(page_bounds(Some(0), Some(20)), (1, 20));
    }
}
