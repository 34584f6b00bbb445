use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use saipe::{Client, Overrides, load_config, pipeline};

/// Download SAIPE poverty and income estimates for one county and save them as CSV.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Reporting year (four digits)
    #[arg(long)]
    year: Option<String>,

    /// State FIPS code, e.g. 48 for Texas
    #[arg(long)]
    state: Option<u16>,

    /// County FIPS code within the state, e.g. 201 for Harris County
    #[arg(long)]
    county: Option<u16>,

    /// Comma-separated API columns to request (must include NAME)
    #[arg(long)]
    columns: Option<String>,

    /// Census API key
    #[arg(long)]
    key: Option<String>,

    /// Dataset endpoint
    #[arg(long)]
    url: Option<String>,

    /// Destination CSV file (overwritten)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Skip re-reading the exported file
    #[arg(long)]
    no_verify_export: bool,

    /// Accept invalid TLS certificates
    #[arg(long)]
    insecure: bool,

    /// Hide the request spinner
    #[arg(long)]
    no_progress: bool,

    /// Do not print the exported table
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            url: self.url.clone(),
            key: self.key.clone(),
            year: self.year.clone(),
            state: self.state,
            county: self.county,
            columns: self.columns.clone(),
            output: self.output.clone(),
            timeout: self.timeout.map(Duration::from_secs),
            verify_tls: self.insecure.then_some(false),
            verify_export: self.no_verify_export.then_some(false),
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let cfg = load_config(args.overrides()).context("loading configuration")?;
    info!(
        year = cfg.query.year(),
        state = cfg.query.region().state,
        county = cfg.query.region().county,
        output = %cfg.export.path.display(),
        "configuration"
    );

    let client = Client::new()
        .and_then(|c| c.with_timeout(cfg.timeout))
        .and_then(|c| c.with_verify(cfg.verify_tls))
        .context("creating HTTP client")?
        .with_progress(!args.no_progress);

    let report = pipeline::run(&client, &cfg.query, &cfg.export)?;

    if !args.quiet {
        print!("{}", report.table.render());
    }
    Ok(())
}

fn main() -> ExitCode {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(env)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let typed = err.chain().find_map(|e| e.downcast_ref::<saipe::Error>());
            match typed {
                Some(e) => {
                    error!(stage = e.stage(), "{err:#}");
                    ExitCode::from(e.exit_code())
                }
                None => {
                    error!("{err:#}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
