use antakshari::server::ApiServer;
use antakshari::*;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

async fn stats_sink(config: &Config) -> Arc<dyn StatsSink> {
    if !config.redis.enabled {
        info!("redis disabled, keeping stats in memory");
        return Arc::new(MemoryStatsSink::new());
    }

    match RedisStatsSink::connect(&config.redis.url).await {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            warn!("redis unavailable ({}), keeping stats in memory", e);
            Arc::new(MemoryStatsSink::new())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    Config::init()?;
    let config = Config::get();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("configuration loaded: {:?}", config);

    let dictionary = Arc::new(Dictionary::load_or_fallback(&config.dictionary));
    let sink = stats_sink(config).await;
    let engine = GameEngine::new(config.game.clone(), dictionary, sink);

    let server = ApiServer::new(engine, config.admin.clone());
    server.serve(config.server_addr()?).await?;

    Ok(())
}
