//! HDI page: two differently shaped tables under two section anchors.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::info;

use super::{discover_year, table_after, Extracted};
use crate::artifact::{self, HDI_TREND_KEY};
use crate::dataset::Dataset;
use crate::error::{ExtractionError, Result};
use crate::run::{write_atomic, RunContext};
use crate::table::parse_table;

const YEAR_PATTERN: &str = r#"(?i)id="By_Statistics_Indonesia_in_([0-9]{4})""#;
const SNAPSHOT_ANCHOR_PREFIX: &str = "By_Statistics_Indonesia_in_";
const TREND_ANCHOR: &str = "Trends_by_Statistics_Indonesia";

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(YEAR_PATTERN).unwrap());
static TREND_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^HDI\s*([0-9]{4})").unwrap());

pub fn extract(ctx: &RunContext, html: &str) -> Result<Extracted> {
    let dataset = Dataset::Hdi;
    let year = discover_year(dataset, &YEAR_RE, YEAR_PATTERN, html)?;
    // The pattern guarantees four digits.
    let year_num: u16 = year.parse().unwrap_or_default();

    let doc = Html::parse_document(html);
    let snapshot = table_markup(&doc, &format!("{}{}", SNAPSHOT_ANCHOR_PREFIX, year))?;
    let trend = table_markup(&doc, TREND_ANCHOR)?;
    let trend_range = trend_range(&trend)?;

    let snapshot_range = artifact::year_range(year_num.saturating_sub(1), year_num);
    let snapshot_path = ctx.artifact(&artifact::hdi_extract(&snapshot_range));
    let trend_path = ctx.artifact(&artifact::hdi_extract(&trend_range));
    write_atomic(&snapshot_path, snapshot.as_bytes())?;
    write_atomic(&trend_path, trend.as_bytes())?;
    ctx.record(HDI_TREND_KEY, &trend_range)?;
    ctx.record_year(dataset, &year)?;

    info!(
        run_id = ctx.run_id(),
        dataset = dataset.as_str(),
        year = %year,
        trend = %trend_range,
        "Staged {} and {}",
        snapshot_path.display(),
        trend_path.display()
    );
    Ok(Extracted {
        dataset,
        year,
        artifacts: vec![trend_path, snapshot_path],
    })
}

fn table_markup(doc: &Html, anchor_id: &str) -> Result<String, ExtractionError> {
    let dataset = Dataset::Hdi;
    let selector = Selector::parse(&format!("[id=\"{}\"]", anchor_id)).map_err(|_| {
        ExtractionError::AnchorNotFound {
            dataset,
            anchor: anchor_id.to_string(),
        }
    })?;
    let anchor = doc
        .select(&selector)
        .next()
        .ok_or_else(|| ExtractionError::AnchorNotFound {
            dataset,
            anchor: anchor_id.to_string(),
        })?;
    let table = table_after(doc, anchor).ok_or_else(|| ExtractionError::NoTableAfterAnchor {
        dataset,
        anchor: anchor_id.to_string(),
    })?;
    Ok(table.html())
}

/// `first_last` years of the trend table's `HDI YYYY` columns.
fn trend_range(markup: &str) -> Result<String, ExtractionError> {
    let missing = ExtractionError::TrendRangeNotFound {
        dataset: Dataset::Hdi,
    };
    let Some(table) = parse_table(markup) else {
        return Err(missing);
    };
    let years: Vec<u16> = table
        .headers
        .iter()
        .filter_map(|h| TREND_HEADER_RE.captures(h)?[1].parse().ok())
        .collect();
    match (years.iter().min(), years.iter().max()) {
        (Some(&first), Some(&last)) => Ok(artifact::year_range(first, last)),
        _ => Err(missing),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::run::begin_run;

    fn fixture() -> String {
        std::fs::read_to_string("tests/fixtures/hdi.htm").unwrap()
    }

    #[test]
    fn stages_both_tables() {
        let root = tempfile::tempdir().unwrap();
        let ctx = begin_run(root.path()).unwrap();
        let out = extract(&ctx, &fixture()).unwrap();
        assert_eq!(out.year, "2023");

        let trend = std::fs::read_to_string(ctx.artifact("hdi_extract_2010_2021.htm")).unwrap();
        let snapshot = std::fs::read_to_string(ctx.artifact("hdi_extract_2022_2023.htm")).unwrap();
        assert!(trend.contains("HDI 2010"));
        assert!(!trend.contains("Rank"));
        assert!(snapshot.contains("Rank"));

        let meta = ctx.load_metadata().unwrap();
        assert_eq!(meta["hdi_year"], "2023");
        assert_eq!(meta[HDI_TREND_KEY], "2010_2021");
    }

    #[test]
    fn missing_anchor_is_reported() {
        let root = tempfile::tempdir().unwrap();
        let ctx = begin_run(root.path()).unwrap();
        let html = fixture().replace(TREND_ANCHOR, "Something_else");
        let err = extract(&ctx, &html).unwrap_err();
        assert!(matches!(
            err,
            Error::Extraction(ExtractionError::AnchorNotFound { ref anchor, .. }) if anchor == TREND_ANCHOR
        ));
    }

    #[test]
    fn anchor_without_following_table() {
        let html = "<h2><span id=\"By_Statistics_Indonesia_in_2023\">x</span></h2><p>gone</p>";
        let root = tempfile::tempdir().unwrap();
        let ctx = begin_run(root.path()).unwrap();
        let err = extract(&ctx, html).unwrap_err();
        assert!(matches!(
            err,
            Error::Extraction(ExtractionError::NoTableAfterAnchor { .. })
        ));
    }

    #[test]
    fn trend_range_from_headers() {
        let markup = "<table><tr><th>Province</th><th>HDI 2012</th><th>HDI 2010</th><th>HDI 2011</th></tr></table>";
        assert_eq!(trend_range(markup).unwrap(), "2010_2012");
        assert!(trend_range("<table><tr><th>Province</th></tr></table>").is_err());
    }
}
