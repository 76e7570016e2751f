//! CORDON CLI
//!
//! Runs the greeting scenario and prints composed context shapes.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod demo;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use cordon_runtime::{DisposableGroup, RuntimeConfig};
use std::path::PathBuf;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cordon")]
#[command(about = "CORDON - typed effect contexts with tag-routed errors", long_about = None)]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "cordon=info")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Greet someone inside a fresh session
    Greet {
        /// Who to greet (empty raises Itch)
        #[arg(short, long, default_value = "")]
        name: String,
        /// Runtime configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the merged demo shape as JSON
    Shape {
        /// Runtime configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            Ok(RuntimeConfig::from_json_file(path)?)
        }
        None => Ok(RuntimeConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Greet { name, config } => {
            let config = load_config(config.as_ref())?;
            let context = demo::context(config)?;
            let outcome = demo::greet(&context, &name)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);

            let greeter = context.service::<demo::Greeter>("greeter")?;
            let report = DisposableGroup::new().add(greeter).dispose().await;
            if !report.is_clean() {
                warn!(failures = report.failures().count(), "teardown incomplete");
            }
            report.into_result()?;
            Ok(())
        }
        Commands::Shape { config } => {
            let config = load_config(config.as_ref())?;
            let shape = demo::shape(&config)?;
            println!("{}", serde_json::to_string_pretty(&shape.summary())?);
            Ok(())
        }
    }
}
