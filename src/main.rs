// SPDX-License-Identifier: Apache-2.0

//! IndieWeb Endpoint Service
//!
//! A personal-site endpoint handling IndieAuth login (relying-party
//! side), bearer token issuance for Micropub clients, and inbound
//! Webmentions with optional vouch verification.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `BASE_URL`: Public base URL of this site
//! - `CLIENT_ID`: OAuth client identifier (default: BASE_URL)
//! - `SITE_DOMAIN`: Domain this site serves content for
//! - `AUTH_TIMEOUT_SECS`: Pending login TTL (default: 300)
//! - `REQUIRE_VOUCH`: Reject unvouched webmentions (default: false)
//! - `VOUCH_FILE`: Path of the vouch domain list (default: vouch_domains.txt)
//! - `FETCH_TIMEOUT_SECS`: Outbound call timeout (default: 10)

use axum::serve;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use indieweb_endpoint::{
    auth::AuthFlow,
    config::Config,
    handlers::{router, AppState},
    mention::{ArticleIndex, MemorySink, MentionVerifier},
    remote::{HttpCapabilities, ScanningParser},
    store::KvStore,
    token::TokenService,
    vouch::{VouchEvaluator, VouchList},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Load configuration
    let config = load_config();
    info!(
        bind_addr = %config.bind_addr,
        base_url = %config.base_url,
        site_domain = %config.site_domain,
        auth_timeout_secs = config.auth.timeout_secs,
        require_vouch = config.webmention.require_vouch,
        "Starting IndieWeb endpoint"
    );

    // Live remote capabilities, shared by every flow
    let capabilities = Arc::new(HttpCapabilities::new(&config.fetch)?);

    // Create application state
    let store = KvStore::new();
    let auth = AuthFlow::new(
        store.clone(),
        capabilities.clone(),
        capabilities.clone(),
        &config,
    );
    let tokens = TokenService::new(store.clone(), capabilities.clone());
    let evaluator = VouchEvaluator::new(
        VouchList::new(&config.webmention.vouch_file),
        capabilities.clone(),
    );
    let mentions = MentionVerifier::new(
        capabilities,
        Arc::new(ScanningParser),
        Arc::new(ArticleIndex),
        Arc::new(MemorySink::new()),
        evaluator,
        &config.webmention,
    );

    let state = Arc::new(AppState {
        auth,
        tokens,
        mentions,
        config: config.clone(),
    });

    // Spawn expired-record sweep
    let cleanup_store = store.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            cleanup_store.cleanup().await;
        }
    });

    // Build router
    let app = router(state).layer(TraceLayer::new_for_http());

    // Start server
    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    serve(listener, app).await?;

    Ok(())
}

/// Load configuration from environment variables.
fn load_config() -> Config {
    let base_url =
        std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    Config {
        bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        client_id: std::env::var("CLIENT_ID").unwrap_or_else(|_| base_url.clone()),
        site_domain: std::env::var("SITE_DOMAIN").unwrap_or_else(|_| "localhost".to_string()),
        base_url,
        auth: indieweb_endpoint::config::AuthConfig {
            timeout_secs: std::env::var("AUTH_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
        },
        webmention: indieweb_endpoint::config::WebmentionConfig {
            require_vouch: std::env::var("REQUIRE_VOUCH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            vouch_file: std::env::var("VOUCH_FILE")
                .unwrap_or_else(|_| "vouch_domains.txt".to_string()),
        },
        fetch: indieweb_endpoint::config::FetchConfig {
            timeout_secs: std::env::var("FETCH_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        },
    }
}
