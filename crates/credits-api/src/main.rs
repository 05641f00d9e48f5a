//! Credits API server
//!
//! HTTP surface of the credit engine: account endpoints, the payment
//! provider webhook, operator endpoints, health, OpenAPI and metrics.

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use credit_engine::CreditEngine;
use credits_api::{middleware, openapi::ApiDoc, routes};
use shared::{db, Config};
use tracing_actix_web::TracingLogger;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    shared::init_tracing();

    tracing::info!("Starting Credits API...");

    middleware::init_metrics().context("Failed to install Prometheus recorder")?;

    let config = Config::from_env().context("Failed to load configuration")?;

    let db_pool = db::create_pool(&config.database)
        .await
        .context("Failed to create database pool")?;

    db::run_migrations(&db_pool)
        .await
        .context("Failed to run database migrations")?;

    let status = db::ledger_status(&db_pool)
        .await
        .context("Credit ledger is not reachable")?;
    tracing::info!(
        schema_version = ?status.schema_version,
        approx_accounts = status.approx_accounts,
        "Credit ledger ready"
    );

    let engine = CreditEngine::from_config(db_pool.clone(), &config)
        .context("Failed to initialize credit engine")?;
    let admin_token = middleware::AdminToken::new(config.server.admin_token.clone());

    let server_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Credits API listening on {}", server_addr);

    let openapi = ApiDoc::openapi();

    HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(middleware::PrometheusMetrics::new())
            .wrap(middleware::cors())
            .app_data(web::Data::new(db_pool.clone()))
            .app_data(web::Data::new(engine.clone()))
            .app_data(web::Data::new(admin_token.clone()))
            .route("/metrics", web::get().to(middleware::metrics_handler))
            .service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi.clone()))
            .configure(routes::configure)
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind to {}", server_addr))?
    .run()
    .await
    .context("Server error")?;

    Ok(())
}
