use clap::Parser; // for cli
use portal_gateway::build_router;
use portal_gateway::config::Args;
use portal_gateway::state::Services;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portal_gateway=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // parse cli arguments
    let args = Args::parse();
    let rate_config = args.rate_limit_config();
    let notification_config = args.notification_config();

    let services = Services::start(rate_config, notification_config)?;
    let app = build_router(services.state());

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Gateway running on http://localhost:{}", args.port);
    tracing::info!(
        "Rate limit: {} requests per {:?}, sweep every {:?}",
        rate_config.max_requests,
        rate_config.window,
        rate_config.sweep_interval
    );
    tracing::info!(
        "Default notification duration: {} ms",
        notification_config.default_duration_ms
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    services.shutdown();
    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
