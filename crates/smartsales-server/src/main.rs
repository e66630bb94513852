//! SmartSales command line: build the warehouse, load it, cube it, serve it

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

mod config;
mod logging;
mod pipeline;
mod report;

use config::Config;

#[derive(Parser)]
#[command(name = "smartsales")]
#[command(about = "Star-schema sales warehouse and OLAP cubes on DuckDB")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults apply when it does not exist)
    #[arg(short, long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    /// Override the warehouse file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or recreate the star schema
    Init,

    /// Load the cleaned CSV sources into the warehouse
    Load {
        /// Directory holding the prepared CSV files
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Build cubes and write them as CSV
    Cube {
        /// Cube names or comma-separated dimension lists
        /// (default: by_quarter and by_quarter_category)
        cubes: Vec<String>,

        /// Output directory for cube CSVs
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load and cube in one go, creating the schema when it is missing
    Run {
        #[arg(long)]
        data_dir: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Start the read-only reporting API
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = Config::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(db) = cli.db {
        config.warehouse.path = db;
    }

    logging::init(&config.logging)?;

    match cli.command {
        Commands::Init => {
            pipeline::init_warehouse(&config)?;
            println!("Star schema created in {}", config.warehouse.path.display());
        }
        Commands::Load { data_dir } => {
            if let Some(dir) = data_dir {
                config.sources.data_dir = dir;
            }
            let report = pipeline::load(&config)?;
            pipeline::print_report(&report);
        }
        Commands::Cube { cubes, output } => {
            if let Some(dir) = output {
                config.output.cube_dir = dir;
            }
            for path in pipeline::build_cubes(&config, &cubes)? {
                println!("Wrote {}", path.display());
            }
        }
        Commands::Run { data_dir, output } => {
            if let Some(dir) = data_dir {
                config.sources.data_dir = dir;
            }
            if let Some(dir) = output {
                config.output.cube_dir = dir;
            }
            let report = pipeline::run(&config)?;
            pipeline::print_report(&report);
            for path in pipeline::build_cubes(&config, &[])? {
                println!("Wrote {}", path.display());
            }
        }
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            info!(warehouse = %config.warehouse.path.display(), "Serving reports");
            report::serve(
                &config.server.addr(),
                report::ReportState::new(config.warehouse.path.clone()),
            )
            .await?;
        }
    }

    Ok(())
}
