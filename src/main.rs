use tracing_subscriber::EnvFilter;

use opsboard::api::routes;
use opsboard::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("opsboard=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        dev_mode = config.dev_mode,
        "starting opsboard"
    );

    routes::serve(config).await
}
