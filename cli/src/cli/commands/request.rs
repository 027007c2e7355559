use adt_bridge_core::config::Config;

use super::connect;
use crate::cli::RequestArgs;

pub async fn run(config: Config, args: RequestArgs) -> anyhow::Result<()> {
    let client = connect(&config, &args.bridge).await?;

    let headers = parse_pairs(&args.headers, ':')?;
    let params = parse_pairs(&args.params, '=')?;

    let body = match (&args.body, &args.body_file) {
        (Some(body), _) => Some(body.clone()),
        (None, Some(path)) => Some(std::fs::read_to_string(path)?),
        (None, None) => None,
    };

    let envelope = client
        .send(&args.method, &args.path, &headers, &params, body.as_deref())
        .await?;

    println!("{}", serde_json::to_string_pretty(&envelope)?);

    if envelope.status >= 400 {
        anyhow::bail!("Backend answered with status {}", envelope.status);
    }
    Ok(())
}

fn parse_pairs(raw: &[String], separator: char) -> anyhow::Result<Vec<(String, String)>> {
    raw.iter()
        .map(|entry| {
            let (name, value) = entry
                .split_once(separator)
                .ok_or_else(|| anyhow::anyhow!("Expected NAME{}VALUE, got {:?}", separator, entry))?;
            Ok((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}
