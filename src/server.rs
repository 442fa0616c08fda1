use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Router,
};
use sqlx::SqlitePool;
use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    auth,
    config::{Config, IntegrationKind},
    db,
    error::AppError,
    handlers,
    oauth::{OAuthRegistry, SqliteTokenStore, TokenStore},
    proxy::{ApiProxy, JobAdderProxy, LinkedInProxy},
    signals::setup_signal_handlers,
};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: SqlitePool,
    pub oauth: OAuthRegistry,
    pub proxies: Arc<HashMap<IntegrationKind, Arc<dyn ApiProxy>>>,
}

impl AppState {
    /// Open the database and build one OAuth manager and proxy per
    /// configured integration
    pub async fn build(config: Config) -> Result<Self> {
        let pool = db::connect(&config.database.path).await?;
        let store: Arc<dyn TokenStore> = Arc::new(
            SqliteTokenStore::new(pool.clone(), config.database.encryption_secret.as_deref())
                .await?,
        );
        let oauth = OAuthRegistry::from_config(&config, store)?;

        Ok(Self::from_parts(Arc::new(config), pool, oauth)?)
    }

    /// Assemble state around an existing registry. Proxies are created for
    /// every integration that has both a config section and a manager.
    pub fn from_parts(
        config: Arc<Config>,
        db: SqlitePool,
        oauth: OAuthRegistry,
    ) -> Result<Self, AppError> {
        let timeout = Duration::from_secs(config.server.request_timeout_seconds);
        let mut proxies: HashMap<IntegrationKind, Arc<dyn ApiProxy>> = HashMap::new();

        for integration in &config.integrations {
            let Ok(manager) = oauth.get(integration.kind) else {
                continue;
            };
            let proxy: Arc<dyn ApiProxy> = match integration.kind {
                IntegrationKind::JobAdder => {
                    Arc::new(JobAdderProxy::new(manager, integration, timeout)?)
                }
                IntegrationKind::LinkedIn => {
                    Arc::new(LinkedInProxy::new(manager, integration, timeout)?)
                }
            };
            proxies.insert(integration.kind, proxy);
        }

        Ok(Self {
            config,
            db,
            oauth,
            proxies: Arc::new(proxies),
        })
    }

    pub fn proxy(&self, kind: IntegrationKind) -> Result<Arc<dyn ApiProxy>, AppError> {
        self.proxies
            .get(&kind)
            .cloned()
            .ok_or_else(|| AppError::IntegrationNotConfigured(kind.display_name().to_string()))
    }
}

/// Start the gateway server
///
/// This function:
/// 1. Opens the token database and builds per-integration state
/// 2. Sets up signal handlers for graceful shutdown
/// 3. Binds to the configured address
/// 4. Serves requests until a shutdown signal arrives
pub async fn start_server(config: Config) -> Result<()> {
    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    let state = AppState::build(config).await?;

    info!("Starting recruit-gateway on {}", addr);
    info!(
        "Configuration: integrations = {:?}, trust_user_id_header = {}",
        state.oauth.kinds(),
        state.config.server.trust_user_id_header
    );

    let (shutdown_tx, signal_handle) = setup_signal_handlers();
    let mut shutdown_rx = shutdown_tx.subscribe();

    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Shutdown signal received, draining connections...");
        })
        .await?;

    signal_handle.await?;
    state.db.close().await;
    info!("Server stopped gracefully");

    Ok(())
}

/// Create the Axum router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    // Routes that act on behalf of a dashboard user
    let caller_routes = Router::new()
        .route(
            "/api/oauth/:integration/authorize",
            get(handlers::oauth::authorize),
        )
        .route(
            "/api/oauth/:integration/callback",
            post(handlers::oauth::callback),
        )
        .route("/api/oauth/:integration/status", get(handlers::oauth::status))
        .route(
            "/api/oauth/:integration/tokens",
            delete(handlers::oauth::clear_tokens),
        )
        .route("/api/oauth/:integration/events", get(handlers::oauth::events))
        .route("/api/jobadder-api", post(handlers::proxy::jobadder_api))
        .route("/api/linkedin-api", post(handlers::proxy::linkedin_api))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::caller_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .merge(caller_routes)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
