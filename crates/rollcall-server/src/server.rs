use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use rollcall_auth::{DynIdentityProvider, ProviderClient, ProviderConfig};
use rollcall_postgres::PostgresMembershipStore;
use rollcall_storage::{DynMembershipStore, InMemoryMembershipStore};
use tower_http::trace::TraceLayer;

use crate::config::{AppConfig, StorageBackend, StorageConfig};
use crate::handlers;
use crate::middleware::verify_command_signature;
use crate::reconcile::{Reconciler, ReconciliationScheduler};
use crate::resolver::GroupResolver;
use crate::signature::RequestVerifier;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub resolver: GroupResolver,
    pub reconciler: Arc<Reconciler>,
    pub store: DynMembershipStore,
    pub cron_secret: Option<Arc<str>>,
    /// Verifies chat command signatures when a signing secret is configured.
    pub command_verifier: Option<Arc<RequestVerifier>>,
}

impl AppState {
    /// Wires a resolver and a reconciler over the same store and provider.
    pub fn new(
        config: &AppConfig,
        store: DynMembershipStore,
        provider: DynIdentityProvider,
    ) -> Self {
        Self {
            resolver: GroupResolver::new(store.clone(), provider.clone()),
            reconciler: Arc::new(Reconciler::new(provider, store.clone(), &config.reconcile)),
            store,
            cron_secret: config.server.cron_secret.as_deref().map(Arc::from),
            command_verifier: config
                .server
                .signing_secret
                .as_deref()
                .map(|secret| Arc::new(RequestVerifier::new(secret))),
        }
    }
}

pub fn build_app(state: AppState, body_limit: usize) -> Router {
    if state.command_verifier.is_none() {
        tracing::warn!("No signing secret configured; chat commands are not authenticated");
    }
    let signed = middleware::from_fn_with_state(state.clone(), verify_command_signature);

    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        // Resolution
        .route(
            "/principals/{principal}/groups",
            get(handlers::principal_groups),
        )
        // Reconciliation trigger and chat command
        .route("/reconcile", post(handlers::trigger_reconcile))
        .route(
            "/commands/permissions",
            post(handlers::permissions_command).route_layer(signed),
        )
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri().path(),
                        http.status_code = tracing::field::Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

/// Opens the configured membership store.
pub async fn connect_store(config: &StorageConfig) -> anyhow::Result<DynMembershipStore> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory membership store; contents are lost on restart");
            Ok(Arc::new(InMemoryMembershipStore::new()))
        }
        StorageBackend::Postgres => {
            let store = PostgresMembershipStore::connect(&config.postgres)
                .await
                .context("failed to open PostgreSQL membership store")?;
            Ok(Arc::new(store))
        }
    }
}

/// Builds the HTTP identity provider client.
pub fn provider_from_config(config: &ProviderConfig) -> anyhow::Result<DynIdentityProvider> {
    let client = ProviderClient::new(config).context("invalid provider configuration")?;
    Ok(Arc::new(client))
}

pub struct RollcallServer {
    addr: SocketAddr,
    app: Router,
    scheduler: Option<ReconciliationScheduler>,
}

#[derive(Default)]
pub struct ServerBuilder {
    config: AppConfig,
    store: Option<DynMembershipStore>,
    provider: Option<DynIdentityProvider>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    /// Uses `store` instead of opening the configured backend.
    pub fn with_store(mut self, store: DynMembershipStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Uses `provider` instead of the HTTP client.
    pub fn with_provider(mut self, provider: DynIdentityProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub async fn build(self) -> anyhow::Result<RollcallServer> {
        let store = match self.store {
            Some(store) => store,
            None => connect_store(&self.config.storage).await?,
        };
        let provider = match self.provider {
            Some(provider) => provider,
            None => provider_from_config(&self.config.provider)?,
        };

        let state = AppState::new(&self.config, store, provider);
        let scheduler = if self.config.reconcile.enabled {
            Some(ReconciliationScheduler::new(
                state.reconciler.clone(),
                &self.config.reconcile,
            )?)
        } else {
            tracing::info!("Scheduled reconciliation disabled");
            None
        };

        Ok(RollcallServer {
            addr: self.config.addr(),
            app: build_app(state, self.config.server.body_limit_bytes),
            scheduler,
        })
    }
}

impl RollcallServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("failed to bind {}", self.addr))?;
        tracing::info!("listening on {}", self.addr);

        let scheduler = self.scheduler.map(ReconciliationScheduler::start);
        let served = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        if let Some((shutdown_tx, handle)) = scheduler {
            let _ = shutdown_tx.send(true);
            let _ = handle.await;
        }

        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
