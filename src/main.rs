use tracing_subscriber::EnvFilter;

use abr_search::cluster;
use abr_search::config::Config;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match Config::from_env().and_then(|config| {
        config.validate()?;
        Ok(config)
    }) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err:#}");
            std::process::exit(1);
        }
    };

    tracing::info!(port = config.port, "starting abr-search");

    if let Err(err) = cluster::run(config) {
        tracing::error!("server failed: {err:#}");
        std::process::exit(1);
    }
}
