use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cmd::commands::{
    AggregateRequest, aggregate_command, columns_command, earliest_command, init_command,
    list_command,
};
use cmd::{Config, load_config};
use diagnostics::*;
use erddap::{HttpTransport, Server};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "erddap-agg")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file
    #[arg(short, long, global = true, default_value = "erddap-agg.yaml")]
    config: PathBuf,

    /// ERDDAP base URL, overriding the configuration
    #[arg(long, global = true)]
    server: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an example configuration file
    Init,
    /// List the TimeSeries and Point datasets on the server
    List,
    /// Show the local table derived for a dataset
    Columns {
        /// The timeseries identifier in ERDDAP
        series: String,
    },
    /// Show the earliest observation time of a dataset
    Earliest {
        /// The timeseries identifier in ERDDAP
        series: String,
    },
    /// Aggregate one or more months of a dataset
    Aggregate {
        /// The timeseries identifier in ERDDAP
        series: String,
        /// minutely, hourly, daily, weekly or monthly
        period: String,
        /// Extra tabledap constraints, e.g. "temp<=25"
        constraints: Vec<String>,
        /// First month, YYYY-MM (defaults to the dataset's earliest month)
        #[arg(long)]
        start: Option<String>,
        /// Number of consecutive months
        #[arg(long, default_value_t = 1)]
        months: u32,
        /// anchored or grouped
        #[arg(long)]
        join: Option<String>,
        /// Print the aggregates instead of writing them
        #[arg(long)]
        preview: bool,
        /// Folder receiving the Parquet files
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Folder receiving the dataset descriptors
        #[arg(long)]
        dataset_dir: Option<PathBuf>,
    },
}

fn connect(config: &Config) -> Result<Server<HttpTransport>> {
    let transport = HttpTransport::new(config.http_timeout())?;
    Ok(Server::new(config.server.clone(), transport).with_locator(config.locator()?))
}

fn main() -> Result<()> {
    init_diagnostics();

    let cli = Cli::parse();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if let Commands::Init = cli.command {
        return init_command(&cli.config, &mut out);
    }

    let mut config = load_config(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    if let Some(server) = cli.server {
        config.server = server;
    }
    let server_url = config.server.clone();
    debug!("Using ERDDAP server {server_url}");

    let result = match cli.command {
        Commands::Init => Ok(()),
        Commands::List => list_command(&connect(&config)?, &mut out),
        Commands::Columns { series } => columns_command(&connect(&config)?, &series, &mut out),
        Commands::Earliest { series } => earliest_command(&connect(&config)?, &series, &mut out),
        Commands::Aggregate {
            series,
            period,
            constraints,
            start,
            months,
            join,
            preview,
            data_dir,
            dataset_dir,
        } => {
            if let Some(dir) = data_dir {
                config.data_dir = dir;
            }
            if let Some(dir) = dataset_dir {
                config.dataset_dir = dir;
            }
            let request = AggregateRequest {
                series,
                period,
                constraints,
                start,
                months,
                join,
                preview,
            };
            aggregate_command(&connect(&config)?, &config, &request, &mut out)
        }
    };

    if let Err(e) = &result {
        let error = format!("{e:#}");
        error!("Command failed: {error}");
    }
    result
}
