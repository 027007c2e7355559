pub mod objects;
pub mod projects;
pub mod request;
pub mod start;
pub mod status;

use adt_bridge_core::client::BridgeClient;
use adt_bridge_core::config::Config;

use crate::cli::BridgeArgs;

/// Bridge given by `--url`, or the first one found on the configured port
pub async fn connect(config: &Config, args: &BridgeArgs) -> anyhow::Result<BridgeClient> {
    match &args.url {
        Some(url) => BridgeClient::new(url),
        None => BridgeClient::detect(config.server.port)
            .await
            .ok_or_else(|| anyhow::anyhow!("ADT bridge is not available. Start it with `adt-bridge start`.")),
    }
}
