//! cortex-server entry point.

mod app;
mod config;

use std::sync::Arc;

use cortex_runtime::Runtime;
use cortex_store::InMemoryStore;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();

    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("cortex={default_level},info"))),
        )
        .init();

    // The in-memory backend is the bundled store; document-database
    // backends implement the same `Store` traits and take over
    // `config.db_uri` / `config.db_name`.
    tracing::info!(db = %config.db_name, "using in-memory store backend");
    let runtime = Arc::new(Runtime::new(
        Arc::new(InMemoryStore::new()),
        config.runtime_config(),
    ));

    runtime.register_builtin_tools()?;
    tracing::info!(tools = runtime.tools.counts().total, "registered built-in tools");

    let addr = format!("{}:{}", config.api_host, config.api_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "cortex-server listening");

    axum::serve(listener, app::router(runtime.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    runtime.shutdown().await;
    tracing::info!("cortex-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
