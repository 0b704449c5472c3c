use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use indostat::pipeline::{self, Outcome, Stage, STAGES_PER_DATASET};
use indostat::run::{self, RunContext};
use indostat::{Dataset, Settings};

#[derive(Parser)]
#[command(name = "indostat", about = "Indonesian provincial GDP, GRP and HDI into SQLite")]
struct Cli {
    /// Settings file (default: ./indostat.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Selection {
    /// Restrict to one or more datasets (default: all)
    #[arg(short, long = "dataset", value_enum)]
    datasets: Vec<Dataset>,

    /// Also produce and load the year-per-row HDI view
    #[arg(long)]
    transpose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new run: fetch, extract, transform and load
    Run {
        #[command(flatten)]
        selection: Selection,
    },
    /// Re-run the transform stage of a staged run
    Transform {
        /// Run id, or `latest`
        #[arg(short, long, default_value = "latest")]
        run: String,
        #[command(flatten)]
        selection: Selection,
    },
    /// Re-load the canonical artifacts of a staged run
    Load {
        /// Run id, or `latest`
        #[arg(short, long, default_value = "latest")]
        run: String,
        #[command(flatten)]
        selection: Selection,
    },
    /// List staged runs and their metadata
    Runs,
}

impl Selection {
    fn datasets(&self) -> Vec<Dataset> {
        if self.datasets.is_empty() {
            Dataset::ALL.to_vec()
        } else {
            let mut d = self.datasets.clone();
            d.sort();
            d.dedup();
            d
        }
    }

    fn apply(&self, settings: &mut Settings) {
        if self.transpose {
            settings.hdi.transpose = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;

    let outcomes = match cli.command {
        Commands::Run { selection } => {
            selection.apply(&mut settings);
            let datasets = selection.datasets();
            let ctx = Arc::new(run::begin_run(&settings.staging_dir)?);
            println!("Run {} ({} datasets)", ctx.run_id(), datasets.len());
            let pb = progress(datasets.len() as u64 * STAGES_PER_DATASET);
            pipeline::run(ctx, Arc::new(settings), &datasets, pb).await?
        }
        Commands::Transform { run, selection } => {
            selection.apply(&mut settings);
            let ctx = reopen(&settings, &run)?;
            let datasets = selection.datasets();
            let pb = progress(datasets.len() as u64);
            pipeline::replay(&ctx, &settings, &datasets, Stage::Transform, &pb)
        }
        Commands::Load { run, selection } => {
            selection.apply(&mut settings);
            let ctx = reopen(&settings, &run)?;
            let datasets = selection.datasets();
            let pb = progress(datasets.len() as u64);
            pipeline::replay(&ctx, &settings, &datasets, Stage::Load, &pb)
        }
        Commands::Runs => {
            list_runs(&settings)?;
            return Ok(ExitCode::SUCCESS);
        }
    };

    print_report(&outcomes);
    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    if outcomes.iter().all(Outcome::is_ok) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn reopen(settings: &Settings, run: &str) -> anyhow::Result<RunContext> {
    let run_id = if run == "latest" {
        run::latest_run(&settings.staging_dir)?
    } else {
        run.to_string()
    };
    run::open_run(&settings.staging_dir, &run_id).with_context(|| format!("opening run {}", run_id))
}

fn progress(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

fn list_runs(settings: &Settings) -> anyhow::Result<()> {
    let runs = run::list_runs(&settings.staging_dir)?;
    if runs.is_empty() {
        println!("No staged runs under {}.", settings.staging_dir.display());
        return Ok(());
    }
    for run_id in runs {
        let ctx = run::open_run(&settings.staging_dir, &run_id)?;
        let meta = ctx.load_metadata()?;
        let years = Dataset::ALL
            .iter()
            .map(|d| {
                let year = meta.get(&d.year_key()).map(String::as_str).unwrap_or("-");
                format!("{}={}", d.as_str(), year)
            })
            .collect::<Vec<_>>()
            .join(" ");
        println!("{}  {}", run_id, years);
    }
    Ok(())
}

fn print_report(outcomes: &[Outcome]) {
    println!("{:<4} | {:<6} | {:<6} | {}", "", "Year", "Rows", "Tables");
    println!("{}", "-".repeat(60));
    for o in outcomes {
        match &o.result {
            Ok(report) => {
                let year = report
                    .extracted
                    .as_ref()
                    .map(|e| e.year.clone())
                    .unwrap_or_else(|| "-".into());
                let rows = report
                    .transformed
                    .as_ref()
                    .map(|t| t.rows.to_string())
                    .unwrap_or_else(|| "-".into());
                let tables = report
                    .loaded
                    .as_ref()
                    .map(|l| {
                        l.tables
                            .iter()
                            .map(|(t, n)| format!("{} ({})", t, n))
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .unwrap_or_else(|| "-".into());
                println!("{:<4} | {:<6} | {:<6} | {}", o.dataset, year, rows, tables);
            }
            Err(e) => println!("{:<4} | FAILED ({}): {}", o.dataset, e.kind(), e),
        }
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{}m {}s", secs / 60, secs % 60)
    }
}
