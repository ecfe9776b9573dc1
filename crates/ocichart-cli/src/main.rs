//! ocichart CLI - serve an OCI registry or Harbor instance as a Helm chart repository

use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod exit_codes;
mod settings;

use error::Result;
use settings::BackendArgs;

#[derive(Parser)]
#[command(name = "ocichart")]
#[command(author = "ocichart Contributors")]
#[command(version)]
#[command(about = "Serve an OCI registry or Harbor instance as a Helm chart repository", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    backend: BackendArgs,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve index.yaml and chart archives over HTTP
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8080", env = "OCICHART_LISTEN")]
        listen: SocketAddr,

        /// Seconds between background catalog passes (overrides refreshInterval)
        #[arg(long)]
        refresh_interval: Option<u64>,
    },

    /// Run one catalog pass and print the repository index
    Index {
        /// Show only the latest version of this chart
        #[arg(long)]
        chart: Option<String>,

        /// Write the index to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Render as JSON instead of YAML
        #[arg(long)]
        json: bool,
    },

    /// Download a chart archive
    Pull {
        /// Chart name, optionally suffixed with :version
        chart: String,

        /// Chart version (default: latest)
        #[arg(long)]
        version: Option<String>,

        /// Output file, or directory with --untar
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Extract the archive
        #[arg(long)]
        untar: bool,
    },
}

fn init_logging(debug: bool, format: LogFormat) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().with_target(true).init(),
        LogFormat::Text => builder.with_target(false).init(),
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve {
            listen,
            refresh_interval,
        } => commands::serve::run(&cli.backend, listen, refresh_interval).await,

        Commands::Index {
            chart,
            output,
            json,
        } => commands::index::run(&cli.backend, chart.as_deref(), output.as_deref(), json).await,

        Commands::Pull {
            chart,
            version,
            output,
            untar,
        } => {
            commands::pull::run(
                &cli.backend,
                &chart,
                version.as_deref(),
                output.as_deref(),
                untar,
            )
            .await
        }
    }
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_logging(cli.debug, cli.log_format);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
