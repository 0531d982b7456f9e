#![deny(
    clippy::expect_used,
    clippy::panic,
    clippy::print_stdout,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used
)]

use std::sync::Arc;

use emailcongress_api::{
    app::{self, Services},
    config::Config,
    db::setup_database,
    messages::DeliveryQueue,
};

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Load and validate configuration first (fail-fast)
    let config = Config::load().map_err(|e| anyhow::anyhow!("{e}"))?;

    std::env::set_var("RUST_LOG", &config.logging.level);
    tracing_subscriber::fmt::init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "emailcongress-api starting up"
    );

    tracing::info!("Connecting to database...");
    let pool = setup_database(&config.database).await?;

    let (services, rx) = Services::from_config(&config, &pool)?;

    // Pick up messages left queued by a previous process before accepting new ones
    let queue: Arc<dyn DeliveryQueue> = services.queue.clone();
    services.worker.recover(queue.as_ref()).await?;
    tokio::spawn(Arc::clone(&services.worker).run(rx));
    tokio::spawn(Arc::clone(&services.worker).sweep(queue));

    if config.swagger.enabled {
        tracing::info!("Swagger UI enabled at /swagger-ui");
    }
    let app = app::router(
        services.pipeline,
        services.constituents,
        services.messages,
        config.swagger.enabled,
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Starting server at http://{}/api/v1", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
