use adt_bridge_core::client::BridgeClient;
use adt_bridge_core::config::{default_config_path, Config};
use adt_bridge_core::workspace::Workspace;

pub async fn run(config: Config) -> anyhow::Result<()> {
    println!("ADT Bridge Status");
    println!("=================");
    println!();
    println!("Configuration:");
    println!("  Config file: {:?}", default_config_path());
    println!("  Workspace file: {:?}", config.workspace.file);
    println!();
    println!("Server settings:");
    println!("  Host: {}", config.bind_address());
    println!("  Port: {}", config.server.port);
    println!("  Destinations: {}", config.destinations.len());
    println!();

    let workspace = Workspace::new(config.workspace.file.clone());
    match workspace.find_adt_project().await {
        Ok(Some(project)) => println!("Active project: {} ({})", project.name, project.destination),
        Ok(None) => println!("Active project: none"),
        Err(e) => println!("Active project: error ({})", e),
    }

    // Check if server is reachable
    println!();
    let url = format!("http://127.0.0.1:{}", config.server.port);
    let client = BridgeClient::new(&url)?;
    match client.health().await {
        Ok(report) => {
            println!("Server: RUNNING ✓ (version {})", report.version);
            println!("  Project: {}", report.project);
        }
        Err(_) => {
            println!("Server: NOT RUNNING");
        }
    }

    Ok(())
}
