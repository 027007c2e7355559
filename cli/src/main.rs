use clap::Parser;

mod cli;

use adt_bridge_core::config::load_config;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn log_filter(level: &str) -> anyhow::Result<EnvFilter> {
    Ok(EnvFilter::from_default_env()
        .add_directive(format!("adt_bridge={}", level).parse()?)
        .add_directive(format!("adt_bridge_core={}", level).parse()?)
        .add_directive("tower_http=debug".parse()?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging; the configured level is applied once the config is read
    let logging = tracing_subscriber::fmt()
        .with_env_filter(log_filter("info")?)
        .with_filter_reloading();
    let filter = logging.reload_handle();
    logging.init();

    let cli = Cli::parse();
    let config = load_config(cli.config.clone())?;
    filter.reload(log_filter(&config.logging.level)?)?;

    match cli.command {
        Commands::Start { port } => {
            cli::commands::start::run(config, port).await?;
        }
        Commands::Status => {
            cli::commands::status::run(config).await?;
        }
        Commands::Projects => {
            cli::commands::projects::run(config).await?;
        }
        Commands::Request(args) => {
            cli::commands::request::run(config, args).await?;
        }
        Commands::Check(bridge) => {
            cli::commands::objects::check(config, bridge).await?;
        }
        Commands::Search { query, max, object_type, bridge } => {
            cli::commands::objects::search(config, query, max, object_type, bridge).await?;
        }
        Commands::Source { kind, name, bridge } => {
            cli::commands::objects::source(config, kind, name, bridge).await?;
        }
        Commands::Package { name, bridge } => {
            cli::commands::objects::package(config, name, bridge).await?;
        }
        Commands::WriteSource(args) => {
            cli::commands::objects::write_source(config, args).await?;
        }
        Commands::CreateProgram(args) => {
            cli::commands::objects::create_program(config, args).await?;
        }
        Commands::CreateClass(args) => {
            cli::commands::objects::create_class(config, args).await?;
        }
    }

    Ok(())
}
