// src/main.rs
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use pool_balancer::{
    config,
    health::{create_probe, HealthChecker},
    metrics::{start_metrics_server, MetricsRegistry},
    proxy::ServerPool,
    server::{Dispatcher, ServerBuilder},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pool_balancer=info".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Load configuration; any error here stops startup before binding.
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    info!("Loading configuration from: {}", config_path);
    let config = config::load_config(&config_path).await?;

    let pool = Arc::new(ServerPool::from_config(&config.backends));
    let mut dispatcher = Dispatcher::new(pool.clone());

    let metrics = if config.metrics.enabled {
        let registry = MetricsRegistry::new()?;
        let collector = registry.collector();
        collector.observe_pool(&pool);

        let metrics_addr: SocketAddr = ([0, 0, 0, 0], config.metrics.port).into();
        start_metrics_server(metrics_addr, registry, config.metrics.path.clone()).await?;

        dispatcher = dispatcher.with_metrics(collector.clone());
        Some(collector)
    } else {
        None
    };

    let checker = if config.health_check.enabled {
        let probe = create_probe(&config.health_check)?;
        let checker = Arc::new(HealthChecker::new(
            config.health_check.interval(),
            pool.clone(),
            probe,
            metrics,
        ));
        tokio::spawn(checker.clone().start());
        Some(checker)
    } else {
        None
    };

    ServerBuilder::new(config.listen)
        .with_handler(dispatcher)
        .with_shutdown(shutdown_signal())
        .serve()
        .await?;

    if let Some(checker) = checker {
        checker.shutdown();
    }

    Ok(())
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
