mod config_commands;
mod db_commands;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use attendo_config::AttendoConfig;

#[derive(Parser)]
#[command(name = "attendo", about = "Attendo — conversation engine for customer support")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to load instead of searching standard locations.
    #[arg(long, global = true, env = "ATTENDO_CONFIG")]
    config: Option<std::path::PathBuf>,

    // Server arguments (used when no subcommand is provided, or with `serve`)
    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the engine server (default when no subcommand is provided).
    Serve,
    /// Configuration inspection and validation.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
    /// Database management (reset, clear, migrate).
    Db {
        #[command(subcommand)]
        action: db_commands::DbAction,
    },
}

/// Initialise tracing from the CLI flags, honouring `RUST_LOG` when set.
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

/// Load the config from an explicit path, or discover one in the standard
/// locations. An explicit path that fails to parse is a hard error; a missing
/// discovered config falls back to defaults.
fn resolve_config(path: Option<&std::path::Path>) -> anyhow::Result<AttendoConfig> {
    match path {
        Some(p) => attendo_config::loader::load_config(p),
        None => Ok(attendo_config::discover_and_load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "attendo starting");

    match cli.command {
        // Default: start the engine when no subcommand is provided
        None | Some(Commands::Serve) => {
            let mut config = resolve_config(cli.config.as_deref())?;

            // CLI args override config values
            if let Some(bind) = cli.bind {
                config.server.bind = bind;
            }
            if let Some(port) = cli.port {
                config.server.port = port;
            }

            attendo_gateway::start_gateway(config).await
        },
        Some(Commands::Config { action }) => {
            config_commands::handle_config(action, cli.config.as_deref()).await
        },
        Some(Commands::Db { action }) => {
            let config = resolve_config(cli.config.as_deref())?;
            db_commands::handle_db(action, &config).await
        },
    }
}
