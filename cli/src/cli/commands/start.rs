use std::sync::Arc;

use adt_bridge_core::bridge::{AdtHttpBackend, BridgeServer, ProxyExecutor};
use adt_bridge_core::config::Config;
use adt_bridge_core::workspace::Workspace;

pub async fn run(mut config: Config, port_override: Option<u16>) -> anyhow::Result<()> {
    // Apply port override if provided
    if let Some(port) = port_override {
        config.server.port = port;
    }

    let host = config.bind_address().to_string();

    tracing::info!("Starting ADT Bridge...");
    tracing::info!("  Port: {}", config.server.port);
    tracing::info!("  Host: {}", host);
    tracing::info!("  Workspace file: {:?}", config.workspace.file);

    if config.destinations.is_empty() {
        tracing::warn!("No destinations configured. Requests will fail until one is added.");
    } else {
        tracing::info!("Loaded {} destination(s)", config.destinations.len());
    }

    let workspace = Arc::new(Workspace::new(config.workspace.file.clone()));
    let backend = Arc::new(AdtHttpBackend::from_config(&config));
    let executor = Arc::new(ProxyExecutor::new(workspace, backend.clone()));

    let server = BridgeServer::new(host.clone(), config.server.port, executor);

    tracing::info!("Bridge server starting on http://{}:{}", host, config.server.port);
    tracing::info!("Press Ctrl+C to stop");

    // Run server (blocks until shutdown)
    server.run().await?;

    let dropped = backend.clear_sessions();
    if dropped > 0 {
        tracing::info!("Closed {} enqueue session(s)", dropped);
    }

    Ok(())
}
