//! sqpatch backend library.
//!
//! This module exposes the application builder for use in tests.

use axum::http::{header, Method};
use axum::{
    routing::{get, patch, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod allocator;
pub mod api;
pub mod channel_store;
pub mod config;
pub mod debounce;
pub mod events;
pub mod logging;
pub mod mixer;
pub mod openapi;
pub mod paths;
pub mod protocol;
pub mod settings;
pub mod shows;
pub mod state;
pub mod storage;
pub mod sync;

use state::AppState;

/// Create the Axum application router with a given state.
///
/// This function is used both by the main server binary and by integration tests.
pub fn create_app(state: AppState) -> Router {
    let api_router = Router::new()
        .route(
            "/state",
            get(api::state::get_state).post(api::state::replace_state),
        )
        .route("/state/reset", post(api::state::reset_state))
        .route("/state/import", post(api::state::import_state))
        .route("/state/export", get(api::state::export_state))
        .route(
            "/config",
            get(api::settings::get_settings).post(api::settings::update_settings),
        )
        .route("/channels", post(api::channels::add_channel))
        .route(
            "/channels/{id}",
            patch(api::channels::update_channel).delete(api::channels::delete_channel),
        )
        .route(
            "/channels/{id}/available",
            get(api::channels::available_ids),
        )
        .route("/channels/{id}/phantom", post(api::channels::set_phantom))
        .route("/channels/{id}/pad", post(api::channels::set_pad))
        .route("/channels/{id}/gain", put(api::channels::set_gain))
        .route(
            "/shows",
            get(api::shows::list_shows).post(api::shows::save_show),
        )
        .route(
            "/shows/{name}",
            get(api::shows::get_show).delete(api::shows::delete_show),
        )
        .route("/shows/{name}/load", post(api::shows::load_show))
        .route("/sync", post(api::sync::start_sync))
        .route("/sync/status", get(api::sync::sync_status))
        .route("/events", get(api::sse::events_stream));

    let preamp_router = Router::new()
        .route("/{bus}/{id}/phantom", post(api::preamp::set_phantom))
        .route("/{bus}/{id}/pad", post(api::preamp::set_pad))
        .route("/{bus}/{id}/gain", post(api::preamp::set_gain));

    Router::new()
        .route("/health", get(health))
        .merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
        )
        .nest("/api", api_router)
        .nest("/preamp", preamp_router)
        .layer(
            CorsLayer::new()
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
                .expose_headers([header::CONTENT_DISPOSITION])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "OK"
}
