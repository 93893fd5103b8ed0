//! # metier-server
//!
//! Self-hostable edge node for the Métier marketplace.
//!
//! This binary provides:
//! - **Email-confirmation landing** (`GET /auth/confirm`) running one pass of
//!   the session bootstrap and answering with a redirect
//! - **Cached profile lookup** (`GET /profiles/:id`) through the read-through
//!   query cache
//! - **Health/info endpoints** for deployment probes
//!
//! The identity provider and data service are wired as in-memory instances
//! here; a hosted deployment substitutes its real collaborators behind the
//! same trait objects.

mod api;
mod config;
mod error;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use metier_client::QueryClient;
use metier_data::{MemoryDataService, MemoryIdentityProvider};
use metier_shared::constants::{RESOURCE_PROFILES, RESOURCE_PROVIDER_PROFILES};

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,metier_server=debug")),
        )
        .init();

    info!("Starting Métier server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Wire collaborators
    // -----------------------------------------------------------------------
    // The unique keys back the profile-creation race resolution: a concurrent
    // duplicate insert fails and the bootstrap re-reads the surviving row.
    let data = Arc::new(
        MemoryDataService::new()
            .with_unique_key(RESOURCE_PROFILES, "id")
            .with_unique_key(RESOURCE_PROVIDER_PROFILES, "profile_id"),
    );
    let identity = Arc::new(MemoryIdentityProvider::anonymous());
    let queries = QueryClient::new(data.clone());

    let state = AppState {
        identity,
        data,
        queries: queries.clone(),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic query-cache sweep so TTL-stale entries do not pile up.
    let sweeper = queries.start_ttl_sweep(config.cache_sweep);

    // -----------------------------------------------------------------------
    // 5. Run the HTTP server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                sweeper.abort();
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    sweeper.abort();
    Ok(())
}
