//! certsync CLI - self-managed certificates for Kubernetes webhooks

use clap::{Parser, Subcommand, ValueEnum};

mod commands;
mod error;
mod exit_codes;

use commands::ConfigArgs;

#[derive(Parser)]
#[command(name = "certsync")]
#[command(author = "certsync Contributors")]
#[command(version)]
#[command(
    about = "Keeps webhook and CRD conversion CA bundles in sync with self-managed service certificates",
    long_about = None
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text", env = "CERTSYNC_LOG_FORMAT")]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controllers
    Run {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Show the certificates of opted-in services
    Status {
        #[command(flatten)]
        config: ConfigArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as YAML
    Config {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

/// Install the tracing subscriber on stderr; `RUST_LOG` overrides the `info` default
fn initialize_logging(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

async fn dispatch(cli: Cli) -> error::Result<()> {
    initialize_logging(cli.log_format);

    match cli.command {
        Commands::Run { config } => commands::run::run(&config).await,
        Commands::Status { config, json } => commands::status::run(&config, json).await,
        Commands::Config { config } => commands::config::run(&config),
    }
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();

    if let Err(err) = dispatch(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
