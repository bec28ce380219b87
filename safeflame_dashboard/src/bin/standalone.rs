use safeflame::dispatch::AlertLog;
use safeflame::{EngineConfig, HazardEngine, Zone};
use safeflame_dashboard::{start_server, AlertBus, KitchenHandle, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("safeflame=info,safeflame_dashboard=info")),
        )
        .init();

    // Bind address, config file and zone file from env
    let bind = std::env::var("SAFEFLAME_BIND").unwrap_or_else(|_| "127.0.0.1:3001".to_string());
    let config = match std::env::var("SAFEFLAME_CONFIG") {
        Ok(path) => EngineConfig::from_json_file(path)?,
        Err(_) => EngineConfig::default(),
    };
    let zones: Vec<Zone> = match std::env::var("SAFEFLAME_ZONES") {
        Ok(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        Err(_) => Vec::new(),
    };

    let engine = HazardEngine::with_zones(config, zones)?;
    let handle = KitchenHandle::new(engine, AlertLog::default(), AlertBus::new(64));

    let server = start_server(handle, ServerConfig { bind_addr: bind }).await?;
    // Park forever
    server.await.ok();
    Ok(())
}
