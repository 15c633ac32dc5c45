//! HTTP Server configuration and startup.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use settlement_types::{JobQueue, SettlementRepository};

use super::handlers::{self, AppState};
use super::rate_limit::{RateLimiterState, rate_limit_middleware};
use crate::openapi::ApiDoc;
use crate::service::SettlementService;
use crate::webhook::WebhookVerifier;

/// HTTP Server for the settlement API.
pub struct HttpServer<R: SettlementRepository, Q: JobQueue> {
    state: Arc<AppState<R, Q>>,
    rate_limiter: Arc<RateLimiterState>,
}

impl<R: SettlementRepository, Q: JobQueue> HttpServer<R, Q> {
    /// Creates a new HTTP server with the given service and verifier.
    pub fn new(service: SettlementService<R, Q>, verifier: WebhookVerifier) -> Self {
        Self {
            state: Arc::new(AppState { service, verifier }),
            rate_limiter: Arc::new(RateLimiterState::default()), // 100 req/min default
        }
    }

    /// Creates a new HTTP server with custom rate limiting.
    pub fn with_rate_limit(
        service: SettlementService<R, Q>,
        verifier: WebhookVerifier,
        requests_per_minute: u32,
    ) -> Self {
        Self {
            state: Arc::new(AppState { service, verifier }),
            rate_limiter: Arc::new(RateLimiterState::new(
                requests_per_minute,
                Duration::from_secs(60),
            )),
        }
    }

    /// Builds the Axum router with all routes.
    pub fn router(&self) -> Router {
        // Build HTTP metrics layer (uses globally set MeterProvider)
        let metrics = axum_otel_metrics::HttpMetricsLayerBuilder::new().build();

        Router::new()
            .route("/health", get(handlers::health))
            .route(
                "/payment/webhook/{gateway}",
                post(handlers::gateway_webhook::<R, Q>),
            )
            .route("/api/kyc/callback", post(handlers::kyc_callback::<R, Q>))
            .route("/api/bookings", post(handlers::create_booking::<R, Q>))
            .route("/api/bookings/{id}", get(handlers::get_booking::<R, Q>))
            .route(
                "/api/bookings/{id}/refund",
                post(handlers::request_refund::<R, Q>),
            )
            .route("/api/payments", post(handlers::create_payment::<R, Q>))
            .route("/api/payments/{id}", get(handlers::get_payment::<R, Q>))
            .route(
                "/api/payments/{id}/confirm",
                post(handlers::confirm_payment::<R, Q>),
            )
            .route(
                "/api/payments/{id}/fail",
                post(handlers::fail_payment::<R, Q>),
            )
            .route(
                "/api/payments/{id}/cancel",
                post(handlers::cancel_payment::<R, Q>),
            )
            .route(
                "/api/partners/{id}/wallet",
                get(handlers::get_partner_wallet::<R, Q>),
            )
            .route(
                "/api/wallets/{id}/transactions",
                get(handlers::list_wallet_transactions::<R, Q>),
            )
            .route(
                "/api/admin/jobs/dead-letters",
                get(handlers::list_dead_letters::<R, Q>),
            )
            .route("/api/admin/jobs/stats", get(handlers::queue_stats::<R, Q>))
            .route(
                "/api/admin/audit/{aggregate_id}",
                get(handlers::audit_trail::<R, Q>),
            )
            .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
            .layer(metrics)
            .layer(middleware::from_fn_with_state(
                self.rate_limiter.clone(),
                rate_limit_middleware,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Runs the server on the given address with graceful shutdown.
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
