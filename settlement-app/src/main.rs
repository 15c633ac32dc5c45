//! # Settlement Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the repository and job queue adapters
//! - Create the settlement service and spawn the job runner
//! - Start the HTTP server

mod config;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::global;
use opentelemetry_sdk::{propagation::TraceContextPropagator, trace as sdktrace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use settlement_core::{
    CommissionProcessor, DispatchPolicy, JobDispatcher, JobRunner, SettlementService,
    SettlementSettings, WalletProcessor, WebhookVerifier, inbound::HttpServer,
};
use settlement_repo::collaborators::{
    HttpKycGate, HttpRefundGateway, LogNotifier, StaticKycGate, StaticRefundGateway,
};
use settlement_types::{
    CommissionRate, Gateway, JobQueue, KycGate, Notifier, RefundGateway, SettlementRepository,
};

fn init_tracer() -> (sdktrace::Tracer, sdktrace::SdkTracerProvider) {
    global::set_text_map_propagator(TraceContextPropagator::new());

    // Use gRPC exporter with batch processing (non-blocking)
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()
        .expect("failed to create OTLP span exporter");

    let provider = sdktrace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build();

    global::set_tracer_provider(provider.clone());

    use opentelemetry::trace::TracerProvider as _;
    (provider.tracer("settlement-service"), provider)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize OpenTelemetry tracing
    let (otel_tracer, otel_provider) = init_tracer();
    let telemetry = tracing_opentelemetry::layer().with_tracer(otel_tracer);

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,settlement_app=debug,settlement_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry)
        .init();

    // Load configuration
    let config = config::Config::from_env()?;

    tracing::info!("Starting settlement server on port {}", config.port);

    #[cfg(feature = "postgres")]
    {
        let database_url = config.database_url.clone().ok_or_else(|| {
            anyhow::anyhow!("DATABASE_URL environment variable is required")
        })?;
        let (repo, queue) = settlement_repo::build_postgres(&database_url).await?;
        return serve(Arc::new(repo), Arc::new(queue), config, otel_provider).await;
    }

    #[cfg(not(feature = "postgres"))]
    {
        tracing::warn!("No database feature enabled; state lives in memory only");
        let repo = Arc::new(settlement_repo::InMemoryRepo::new());
        let queue = Arc::new(settlement_repo::InMemoryJobQueue::default());
        return serve(repo, queue, config, otel_provider).await;
    }
}

/// Wires the service, workers, and HTTP server over the chosen adapters.
async fn serve<R, Q>(
    repo: Arc<R>,
    queue: Arc<Q>,
    config: config::Config,
    otel_provider: sdktrace::SdkTracerProvider,
) -> anyhow::Result<()>
where
    R: SettlementRepository,
    Q: JobQueue,
{
    let mut secrets = HashMap::new();
    if let Some(secret) = config.razorpay_webhook_secret.clone() {
        secrets.insert(Gateway::Razorpay, secret);
    }
    if let Some(secret) = config.stripe_webhook_secret.clone() {
        secrets.insert(Gateway::Stripe, secret);
    }
    if secrets.is_empty() {
        tracing::warn!("No webhook secrets configured; all gateway callbacks will be rejected");
    }
    let verifier = WebhookVerifier::new(secrets);

    let commission_rate = CommissionRate::from_basis_points(config.commission_rate_bps)?;

    let kyc_gate: Arc<dyn KycGate> = match &config.kyc_provider_url {
        Some(url) => Arc::new(HttpKycGate::new(url.clone())),
        None => Arc::new(StaticKycGate),
    };
    let refunds: Arc<dyn RefundGateway> = match &config.refund_gateway_url {
        Some(url) => Arc::new(HttpRefundGateway::new(url.clone())),
        None => Arc::new(StaticRefundGateway),
    };
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

    let dispatcher = JobDispatcher::new(
        queue.clone(),
        DispatchPolicy {
            commission_delay: Duration::from_secs(config.commission_delay_secs),
        },
    );
    let settings = SettlementSettings {
        commission_rate,
        kyc_return_url: config.kyc_return_url.clone(),
    };

    let service = SettlementService::new(
        repo.clone(),
        dispatcher,
        kyc_gate,
        notifier.clone(),
        settings,
    );

    // Background job consumer
    let runner = JobRunner::new(
        queue,
        CommissionProcessor::new(repo.clone(), notifier.clone(), commission_rate),
        WalletProcessor::new(repo, refunds, notifier),
        Duration::from_millis(config.worker_poll_interval_ms),
    );
    tokio::spawn(runner.run());

    // Create and run the HTTP server
    let server = HttpServer::with_rate_limit(service, verifier, config.rate_limit_per_minute);
    let addr = format!("0.0.0.0:{}", config.port);

    server.run(&addr).await?;

    // Ensure traces are flushed before exit
    let _ = otel_provider.shutdown();
    Ok(())
}
