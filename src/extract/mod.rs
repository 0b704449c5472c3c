pub mod economy;
pub mod hdi;

use std::path::PathBuf;

use regex::Regex;
use scraper::{ElementRef, Html};

use crate::dataset::Dataset;
use crate::error::{ExtractionError, Result};
use crate::run::RunContext;

/// What an extractor left in staging.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub dataset: Dataset,
    pub year: String,
    pub artifacts: Vec<PathBuf>,
}

/// Locate, clean and stage the dataset's table(s) from a fetched page, and
/// record the discovered reporting year in the run metadata.
pub fn extract(ctx: &RunContext, dataset: Dataset, html: &str) -> Result<Extracted> {
    match dataset {
        Dataset::Gdp | Dataset::Grp => economy::extract(ctx, dataset, html),
        Dataset::Hdi => hdi::extract(ctx, html),
    }
}

/// First four-digit year captured by `pattern` anywhere in the markup.
pub(crate) fn discover_year(
    dataset: Dataset,
    re: &Regex,
    pattern: &'static str,
    html: &str,
) -> Result<String, ExtractionError> {
    re.captures(html)
        .map(|c| c[1].to_string())
        .ok_or(ExtractionError::YearNotFound { dataset, pattern })
}

/// The first `<table>` after `anchor` in document order.
pub(crate) fn table_after<'a>(doc: &'a Html, anchor: ElementRef<'a>) -> Option<ElementRef<'a>> {
    doc.tree
        .root()
        .descendants()
        .skip_while(|n| n.id() != anchor.id())
        .skip(1)
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "table")
}
