mod commands;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "datavet")]
#[command(version, about = "Template-driven dataset validator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a dataset against a template
    Validate {
        /// Path to the dataset (plain file or archive)
        input: String,

        /// Template id to validate against
        #[arg(short, long)]
        template: String,

        /// Explicit template version (highest wins when omitted)
        #[arg(long)]
        template_version: Option<String>,

        /// Extra template search directories (repeatable)
        #[arg(long)]
        templates_dir: Vec<PathBuf>,

        /// Source format: csv, parquet, geopackage, shapefile
        /// (detected from the staged file when omitted)
        #[arg(short, long)]
        format: Option<String>,

        /// Layer name for GeoPackage inputs (first layer when omitted)
        #[arg(short, long)]
        layer: Option<String>,

        /// Canonical geometry column, overriding inference
        #[arg(long)]
        geometry: Option<String>,

        /// CSV field delimiter
        #[arg(long)]
        delimiter: Option<char>,

        /// Write the JSON report to this path
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Print the JSON report to stdout instead of the text summary
        #[arg(long)]
        json: bool,

        /// Abort chunked loads after this many seconds
        #[arg(long)]
        timeout_sec: Option<u64>,

        /// Run identifier recorded in report provenance
        #[arg(long)]
        run_id: Option<String>,
    },

    /// List discoverable templates
    Templates {
        /// Extra template search directories (repeatable)
        #[arg(long)]
        templates_dir: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(tracing_subscriber::filter::LevelFilter::from_level(
            log_level,
        ))
        .init();

    let outcome = match cli.command {
        Commands::Validate {
            input,
            template,
            template_version,
            templates_dir,
            format,
            layer,
            geometry,
            delimiter,
            report,
            json,
            timeout_sec,
            run_id,
        } => {
            commands::validate::execute(commands::validate::ValidateArgs {
                input,
                template,
                template_version,
                templates_dir,
                format,
                layer,
                geometry,
                delimiter,
                report,
                json,
                timeout_sec,
                run_id,
            })
            .await
        }

        Commands::Templates { templates_dir } => commands::templates::execute(templates_dir),
    };

    match outcome {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            output::print_error(&format!("{err:#}"));
            std::process::exit(1);
        }
    }
}
