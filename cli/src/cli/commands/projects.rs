use adt_bridge_core::config::Config;
use adt_bridge_core::workspace::Workspace;

pub async fn run(config: Config) -> anyhow::Result<()> {
    let workspace = Workspace::new(config.workspace.file.clone());
    let projects = workspace.list_projects().await?;

    if projects.is_empty() {
        println!("No projects found.");
        println!("Workspace file: {:?}", workspace.path());
        return Ok(());
    }

    println!("{:<40} {:<20} {:<8} {:<10}", "PROJECT", "DESTINATION", "KIND", "STATUS");
    println!("{}", "-".repeat(80));

    let active = projects.iter().position(|p| p.is_adt_project());
    for (idx, project) in projects.iter().enumerate() {
        let status = if Some(idx) == active {
            "active"
        } else if project.open {
            "open"
        } else {
            "closed"
        };

        let configured = if config.destinations.contains_key(&project.destination) {
            ""
        } else {
            " (no connection)"
        };

        println!(
            "{:<40} {:<20} {:<8} {:<10}{}",
            project.name, project.destination, project.kind, status, configured
        );
    }

    Ok(())
}
