//! Orchestration: one sequential fetch → extract → transform → load chain
//! per dataset, the chains running concurrently over a shared run.

use std::sync::Arc;

use indicatif::ProgressBar;
use tracing::{error, info};

use crate::config::Settings;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::extract::{self, Extracted};
use crate::fetch::Fetcher;
use crate::load::{self, Loaded};
use crate::run::RunContext;
use crate::transform::{self, Transformed};

/// Stages that run after the page has been fetched.
pub const STAGES_PER_DATASET: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Transform,
    Load,
}

/// What one dataset chain produced, stage by stage.
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub extracted: Option<Extracted>,
    pub transformed: Option<Transformed>,
    pub loaded: Option<Loaded>,
}

#[derive(Debug)]
pub struct Outcome {
    pub dataset: Dataset,
    pub result: Result<Report>,
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Fetch and process every dataset in `datasets` concurrently. A failing
/// dataset does not stop the others; each gets its own outcome.
pub async fn run(
    ctx: Arc<RunContext>,
    settings: Arc<Settings>,
    datasets: &[Dataset],
    progress: ProgressBar,
) -> Result<Vec<Outcome>> {
    let fetcher = Fetcher::new(&settings.fetch)?;

    let handles: Vec<_> = datasets
        .iter()
        .map(|&dataset| {
            let task = run_dataset(
                Arc::clone(&ctx),
                Arc::clone(&settings),
                fetcher.clone(),
                dataset,
                progress.clone(),
            );
            (dataset, tokio::spawn(task))
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for (dataset, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(e.into()),
        };
        log_outcome(&ctx, dataset, &result);
        outcomes.push(Outcome { dataset, result });
    }
    progress.finish_and_clear();
    Ok(outcomes)
}

async fn run_dataset(
    ctx: Arc<RunContext>,
    settings: Arc<Settings>,
    fetcher: Fetcher,
    dataset: Dataset,
    progress: ProgressBar,
) -> Result<Report> {
    let html = fetcher.fetch(settings.sources.url(dataset)).await?;
    progress.inc(1);
    tokio::task::spawn_blocking(move || process(&ctx, dataset, &html, &settings, &progress)).await?
}

/// Everything after the fetch, for a page already in memory.
pub fn process(
    ctx: &RunContext,
    dataset: Dataset,
    html: &str,
    settings: &Settings,
    progress: &ProgressBar,
) -> Result<Report> {
    progress.set_message(format!("{} extract", dataset));
    let extracted = extract::extract(ctx, dataset, html)?;
    progress.inc(1);

    progress.set_message(format!("{} transform", dataset));
    let transformed = transform::transform(ctx, dataset, settings)?;
    progress.inc(1);

    progress.set_message(format!("{} load", dataset));
    let loaded = load::load(ctx, dataset, settings)?;
    progress.inc(1);

    Ok(Report {
        extracted: Some(extracted),
        transformed: Some(transformed),
        loaded: Some(loaded),
    })
}

/// Repeat one stage of an existing run from its staged artifacts.
pub fn replay(
    ctx: &RunContext,
    settings: &Settings,
    datasets: &[Dataset],
    stage: Stage,
    progress: &ProgressBar,
) -> Vec<Outcome> {
    let outcomes = datasets
        .iter()
        .map(|&dataset| {
            progress.set_message(format!("{} {:?}", dataset, stage).to_lowercase());
            let result = match stage {
                Stage::Transform => transform::transform(ctx, dataset, settings).map(|t| Report {
                    transformed: Some(t),
                    ..Report::default()
                }),
                Stage::Load => load::load(ctx, dataset, settings).map(|l| Report {
                    loaded: Some(l),
                    ..Report::default()
                }),
            };
            progress.inc(1);
            log_outcome(ctx, dataset, &result);
            Outcome { dataset, result }
        })
        .collect();
    progress.finish_and_clear();
    outcomes
}

fn log_outcome(ctx: &RunContext, dataset: Dataset, result: &Result<Report>) {
    match result {
        Ok(_) => info!(run_id = ctx.run_id(), dataset = dataset.as_str(), "Pipeline finished"),
        Err(e) => error!(
            run_id = ctx.run_id(),
            dataset = dataset.as_str(),
            kind = e.kind(),
            "Pipeline failed: {}",
            e
        ),
    }
}
