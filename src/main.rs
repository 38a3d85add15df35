use axum::{
    routing::{delete, get, post},
    Router,
};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rust_leads_api::config::Config;
use rust_leads_api::db::Database;
use rust_leads_api::db_storage::{LeadRepository, PgLeadRepository, ReportRepository};
use rust_leads_api::enrichment::EnrichmentCascade;
use rust_leads_api::handlers::{self, AppState};

/// Main entry point for the application.
///
/// Initializes tracing, configuration, the database pool, the provider cascade
/// and the HTTP routes (CORS, rate limiting, body limit), then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_leads_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    let storage = Arc::new(PgLeadRepository::new(db.pool.clone()));
    let repository: Arc<dyn LeadRepository> = storage.clone();
    let reports: Arc<dyn ReportRepository> = storage;

    let cascade = EnrichmentCascade::from_config(&config, Arc::clone(&repository))?;
    tracing::info!("✓ Enrichment cascade ready: {:?}", cascade.provider_names());

    // In-flight guard for single-lead enrichment (5 minute TTL covers a slow cascade)
    let processing_leads_cache = Cache::builder()
        .time_to_live(Duration::from_secs(300))
        .max_capacity(10_000)
        .build();

    let app_state = Arc::new(AppState {
        repository,
        reports,
        cascade: Arc::new(cascade),
        config: config.clone(),
        processing_leads_cache,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let protected_routes = Router::new()
        .route("/api/v1/leads", get(handlers::list_leads))
        .route("/api/v1/leads/enrich/batch", post(handlers::enrich_batch))
        .route(
            "/api/v1/leads/:id",
            get(handlers::get_lead)
                .patch(handlers::update_lead)
                .delete(handlers::delete_lead),
        )
        .route("/api/v1/leads/:id/archive", post(handlers::archive_lead))
        .route("/api/v1/leads/:id/restore", post(handlers::restore_lead))
        .route("/api/v1/leads/:id/enrich", post(handlers::enrich_lead))
        .route("/api/v1/leads/:id/outreach", post(handlers::outreach))
        .route(
            "/api/v1/reports",
            get(handlers::list_reports).post(handlers::create_report),
        )
        .route(
            "/api/v1/reports/:id",
            get(handlers::get_report)
                .patch(handlers::update_report)
                .delete(handlers::delete_report),
        )
        .route("/api/v1/reports/:id/leads", post(handlers::add_report_leads))
        .route(
            "/api/v1/reports/:id/leads/:lead_id",
            delete(handlers::remove_report_lead),
        )
        .route(
            "/api/v1/reports/:id/available-leads",
            get(handlers::available_report_leads),
        )
        .layer(
            ServiceBuilder::new()
                // Request size limit: 1MB max payload
                .layer(RequestBodyLimitLayer::new(1024 * 1024))
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
