use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::Method,
    response::Redirect,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use metier_client::{confirm_redirect, QueryClient, QuerySpec};
use metier_data::{DataService, Filter, IdentityProvider};
use metier_shared::constants::RESOURCE_PROFILES;

use crate::config::ServerConfig;
use crate::error::ServerError;

#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<dyn IdentityProvider>,
    pub data: Arc<dyn DataService>,
    pub queries: QueryClient,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/auth/confirm", get(auth_confirm))
        .route("/profiles/:id", get(profile_lookup))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
}

#[derive(Deserialize)]
struct ConfirmParams {
    code: Option<String>,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Email-confirmation landing: one stateless bootstrap pass, every outcome
/// a redirect.
async fn auth_confirm(
    State(state): State<AppState>,
    Query(params): Query<ConfirmParams>,
) -> Redirect {
    let decision = confirm_redirect(
        state.identity.as_ref(),
        state.data.clone(),
        params.code.as_deref(),
    )
    .await;

    info!(location = %decision.location, "confirmation redirect issued");
    Redirect::to(&decision.location)
}

/// Cached profile lookup (read-through, 30 s TTL).
async fn profile_lookup(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let spec = QuerySpec::new(
        RESOURCE_PROFILES,
        "*",
        Filter::all().eq("id", id.to_string()),
    );
    let rows = state
        .queries
        .fetch(&spec)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?;

    match rows.into_iter().next() {
        Some(row) => Ok(Json(row)),
        None => Err(ServerError::ProfileNotFound(id)),
    }
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");
    axum::serve(listener, router).await?;
    Ok(())
}
