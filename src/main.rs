use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use interim_batch::{BatchDriver, Client, DriverOptions, Ledger, Settings, YearOutcome, build_jobs};

#[derive(Parser)]
#[command(name = "interim-batch")]
#[command(about = "Retrieve one year of monthly-mean reanalysis per request from the ECMWF Web API")]
#[command(version)]
struct Cli {
    #[arg(short, long, help = "Settings file (TOML) [default: ./interim-batch.toml if present]")]
    config: Option<PathBuf>,

    #[arg(long, help = "First year to retrieve (inclusive)")]
    start: Option<i32>,

    #[arg(long, help = "Year to stop before (exclusive)")]
    end: Option<i32>,

    #[arg(short, long, help = "Directory the yearly files are written to")]
    output_dir: Option<PathBuf>,

    #[arg(long, help = "Print the request descriptors as JSON and exit")]
    dry_run: bool,

    #[arg(long, help = "Retrieve years already listed in the completion ledger")]
    force: bool,

    #[arg(long, help = "Keep going after a year fails")]
    continue_on_error: bool,

    #[arg(short, long, help = "Enable debug logging")]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every year succeeded.
fn run(cli: Cli) -> Result<bool> {
    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    if let Some(start) = cli.start {
        settings.years.start = start;
    }
    if let Some(end) = cli.end {
        settings.years.end = end;
    }
    if let Some(dir) = cli.output_dir {
        settings.output.dir = dir;
    }

    let years = settings.year_range()?;
    let template = settings.template().context("building request template")?;
    let jobs = build_jobs(&template, years);

    if cli.dry_run {
        for job in &jobs {
            println!("{}", serde_json::to_string(&job.request.to_json())?);
        }
        return Ok(true);
    }

    let creds = settings.credentials()?;
    let client = Client::new(settings.client_options(creds)).context("creating API client")?;
    info!(url = client.base_url(), years = %format!("{}..{}", years.start(), years.end()), "configured");

    let ledger_path = settings.ledger_path();
    let mut ledger = Ledger::open(&ledger_path)
        .with_context(|| format!("opening ledger {}", ledger_path.display()))?;

    let report = BatchDriver::new(&client, settings.retry_policy())
        .with_ledger(&mut ledger)
        .with_options(DriverOptions {
            continue_on_error: cli.continue_on_error,
            force: cli.force,
        })
        .run(jobs)?;

    for outcome in &report.outcomes {
        if let YearOutcome::Failed { year, error } = outcome {
            error!(year, error = %error, "not retrieved");
        }
    }
    println!(
        "{} downloaded, {} skipped, {} failed",
        report.downloaded(),
        report.skipped(),
        report.failed_years().len()
    );
    Ok(report.is_success())
}
