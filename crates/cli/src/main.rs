use std::time::Duration;

use {
    clap::Parser,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use confab_gateway::{config::HubConfig, server};

#[derive(Parser)]
#[command(name = "confab", about = "Confab — horizontally scalable chat hub")]
struct Cli {
    /// Address to bind to.
    #[arg(long, env = "WS_HOST", default_value = "0.0.0.0")]
    bind: String,

    /// Port to listen on.
    #[arg(long, env = "WS_PORT", default_value_t = 8001)]
    port: u16,

    /// HMAC secret shared with the auth service that mints tokens.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    secret: String,

    /// Broker URL for cross-node fan-out; omit to run single-node.
    #[arg(long, env = "REDIS_URL")]
    broker_url: Option<String>,

    /// Refuse to start when the broker is unreachable.
    #[arg(long, env = "BROKER_REQUIRED", default_value_t = false)]
    broker_required: bool,

    /// Broker connection attempts before giving up at startup.
    #[arg(long, env = "BROKER_CONNECT_ATTEMPTS", default_value_t = 5)]
    broker_connect_attempts: u32,

    /// Delay between broker connection attempts, in seconds.
    #[arg(long, env = "BROKER_CONNECT_DELAY_SECS", default_value_t = 2)]
    broker_connect_delay_secs: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

/// Initialise tracing from `RUST_LOG`, falling back to `--log-level`.
fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let config = HubConfig {
        host: cli.bind.clone(),
        port: cli.port,
        secret: cli.secret.clone(),
        broker_url: cli.broker_url.clone(),
        broker_required: cli.broker_required,
        broker_connect_attempts: cli.broker_connect_attempts,
        broker_connect_delay: Duration::from_secs(cli.broker_connect_delay_secs),
    };

    info!(bind = %config.host, port = config.port, "starting confab hub");
    server::start_hub(config).await
}
