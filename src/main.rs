use clap::Parser;
use query_throttle::config::Config;
use query_throttle::config_validator::ConfigValidator;
use query_throttle::filter::build_filter;
use query_throttle::server::Server;
use query_throttle::ThrottlerError;
use std::sync::Arc;
use validator::Validate;

#[derive(Parser, Debug)]
#[command(name = "query-throttle", about = "Request throttling and banning engine")]
struct Args {
    /// Path to a TOML config file (without extension), searched relative to
    /// the working directory. Missing file falls back to defaults.
    #[arg(long, default_value = "config")]
    config: String,

    /// Overrides the configured bind address.
    #[arg(long)]
    bind_address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), ThrottlerError> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if let Some(bind_address) = args.bind_address {
        config.bind_address = bind_address;
    }

    config
        .validate()
        .map_err(|err| ThrottlerError::Config(err.to_string()))?;
    ConfigValidator::validate(&config)?;

    tracing::info!(enabled = config.enabled, "configuration loaded");

    let clock: Arc<dyn query_throttle::clock::Clock> = Arc::new(query_throttle::clock::SystemClock);
    let filter = build_filter(&config, clock);

    let server = Server::new(config.bind_address.clone(), filter);
    server.run().await
}
