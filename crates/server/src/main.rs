use anyhow::Context;
use deployment::{AppDeployment, Deployment};
use server::routes;
use services::services::{config::Config, consistency::ConsistencyMonitor};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    utils::logging::init_tracing("info,sqlx=warn");

    let config = Config::from_env()?;
    let addr = format!("{}:{}", config.host, config.port);

    let deployment = AppDeployment::new(config).await?;

    if let Some(interval) = deployment.config().consistency_check_interval {
        let _monitor = ConsistencyMonitor::spawn(deployment.db().clone(), interval).await;
    }

    let app = routes::router(deployment);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // Without a signal handler the server runs until killed.
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
