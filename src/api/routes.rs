//! REST API routes configuration

use crate::api::handlers::{self, ApiState};
use crate::api::websocket::ws_handler;
use axum::{
    http::{StatusCode, Uri},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};

/// JSON 404 for unknown routes
async fn fallback_handler(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(handlers::ApiError {
            error: format!("Not Found: {}", uri.path()),
        }),
    )
}

/// Create the API router with all routes
pub fn create_router(state: ApiState) -> Router {
    // Configure CORS for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // WebSocket for real-time updates
        .route("/ws", get(ws_handler))
        // Accounts
        .route("/api/accounts", post(handlers::create_account))
        .route("/api/accounts/{address}", get(handlers::get_account))
        .route(
            "/api/accounts/{address}/fund",
            post(handlers::fund_account),
        )
        .route("/api/send", post(handlers::send))
        // Factories
        .route(
            "/api/factories",
            get(handlers::list_factories).post(handlers::deploy_factory),
        )
        .route(
            "/api/factories/{address}/wallets",
            get(handlers::list_factory_wallets).post(handlers::create_factory_wallet),
        )
        .route(
            "/api/factories/{address}/approvers/{approver}",
            get(handlers::wallets_for_approver),
        )
        // Wallets
        .route("/api/wallets", get(handlers::list_wallets))
        .route("/api/wallets/{address}", get(handlers::get_wallet))
        .route(
            "/api/wallets/{address}/transfers",
            get(handlers::list_transfers).post(handlers::create_transfer),
        )
        .route(
            "/api/wallets/{address}/transfers/{id}/approve",
            post(handlers::approve_transfer),
        )
        .route(
            "/api/wallets/{address}/transactions",
            get(handlers::list_transactions).post(handlers::create_transaction),
        )
        .route(
            "/api/wallets/{address}/transactions/{id}",
            get(handlers::get_transaction),
        )
        .route(
            "/api/wallets/{address}/transactions/{id}/approve",
            post(handlers::approve_transaction),
        )
        // Contracts and generic calls
        .route(
            "/api/contracts",
            get(handlers::list_contracts).post(handlers::deploy_contract),
        )
        .route("/api/call", post(handlers::call))
        // Event log
        .route("/api/events", get(handlers::list_events))
        .fallback(fallback_handler)
        // Add state and middleware
        .with_state(state)
        .layer(cors)
}
