use adt_bridge_core::config::Config;
use adt_bridge_core::objects::{NewClass, NewProgram, ObjectKind};

use super::connect;
use crate::cli::{BridgeArgs, CreateArgs, WriteSourceArgs};

pub async fn check(config: Config, bridge: BridgeArgs) -> anyhow::Result<()> {
    let client = connect(&config, &bridge).await?;
    let check = client.check_connection().await;
    println!("{}", serde_json::to_string_pretty(&check)?);

    if check.status != "connected" {
        anyhow::bail!("{}", check.message);
    }
    Ok(())
}

pub async fn search(
    config: Config,
    query: String,
    max: u32,
    object_type: Option<String>,
    bridge: BridgeArgs,
) -> anyhow::Result<()> {
    let client = connect(&config, &bridge).await?;
    let found = client.search(&query, max, object_type.as_deref()).await?;

    if found.results.is_empty() {
        println!("No objects match {}", query);
        return Ok(());
    }

    println!("{:<40} {:<10} {:<20} {}", "Name", "Type", "Package", "Description");
    println!("{}", "-".repeat(90));
    for object in &found.results {
        println!(
            "{:<40} {:<10} {:<20} {}",
            object.name, object.object_type, object.package_name, object.description
        );
    }
    println!();
    println!("{} object(s)", found.count);
    Ok(())
}

pub async fn source(config: Config, kind: ObjectKind, name: String, bridge: BridgeArgs) -> anyhow::Result<()> {
    let client = connect(&config, &bridge).await?;
    print!("{}", client.read_source(kind, &name).await?);
    Ok(())
}

pub async fn package(config: Config, name: String, bridge: BridgeArgs) -> anyhow::Result<()> {
    let client = connect(&config, &bridge).await?;
    let package = client.get_package(&name).await?;
    println!("{}", serde_json::to_string_pretty(&package)?);
    Ok(())
}

pub async fn write_source(config: Config, args: WriteSourceArgs) -> anyhow::Result<()> {
    if !args.kind.has_source() {
        anyhow::bail!("A {} has no source to write", args.kind);
    }

    let client = connect(&config, &args.bridge).await?;
    let source = std::fs::read_to_string(&args.file)?;
    let object_path = args.kind.object_path(&args.name);

    client
        .write_source(&object_path, &source, args.transport.as_deref())
        .await?;
    println!("Source of {} {} written", args.kind, args.name.to_uppercase());

    if args.activate {
        client.activate(&object_path, &args.name).await?;
        println!("Activated {}", args.name.to_uppercase());
    }
    Ok(())
}

pub async fn create_program(config: Config, args: CreateArgs) -> anyhow::Result<()> {
    let client = connect(&config, &args.bridge).await?;
    let source = read_optional(&args)?;

    let created = client
        .create_program(NewProgram {
            description: args.description.clone().unwrap_or_else(|| args.name.clone()),
            name: args.name,
            package: args.package,
            transport: args.transport,
            language: None,
            source,
        })
        .await?;
    println!("{}", serde_json::to_string_pretty(&created)?);
    Ok(())
}

pub async fn create_class(config: Config, args: CreateArgs) -> anyhow::Result<()> {
    let client = connect(&config, &args.bridge).await?;
    let source = read_optional(&args)?;

    let created = client
        .create_class(NewClass {
            name: args.name,
            description: args.description,
            package: args.package,
            transport: args.transport,
            source,
            ..NewClass::default()
        })
        .await?;
    println!("{}", serde_json::to_string_pretty(&created)?);
    Ok(())
}

fn read_optional(args: &CreateArgs) -> anyhow::Result<Option<String>> {
    args.file
        .as_ref()
        .map(std::fs::read_to_string)
        .transpose()
        .map_err(Into::into)
}
