use std::io::Read;

use mimir::{config::Config, engine::Request, startup, Engine, Error};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mimir=info")))
        .with_writer(std::io::stderr)
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    match run(&config).await {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("{:?}: {}", e.kind(), e);
            std::process::exit(1);
        }
    }
}

async fn run(config: &Config) -> Result<serde_json::Value, Error> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    let request = Request::from_json(serde_json::from_str(&input)?)?;

    let engine = Engine::new(startup::build_state(config).await?);
    engine.init().await?;
    let result = engine.execute(request).await;
    if let Err(e) = engine.shutdown().await {
        tracing::warn!("engine shutdown failed: {}", e);
    }
    result
}
