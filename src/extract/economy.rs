//! GDP and GRP pages: one `wikitable` each, with a reporting-year anchor.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::info;

use super::{discover_year, Extracted};
use crate::artifact;
use crate::dataset::Dataset;
use crate::error::{ExtractionError, Result};
use crate::run::{write_atomic, RunContext};

const GDP_YEAR_PATTERN: &str = r#"(?i)id="([0-9]{4})_data""#;
const GRP_YEAR_PATTERN: &str = r#"(?i)id="([0-9]{4})_Per_Capita""#;
const DATA_TABLE: &str = "table.wikitable";
// Marker phrase of the currency-conversion notice row.
const NOTE_MARKER: &str = "exchange";

static GDP_YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(GDP_YEAR_PATTERN).unwrap());
static GRP_YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(GRP_YEAR_PATTERN).unwrap());
static WIKITABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse(DATA_TABLE).unwrap());
static CAPTION: LazyLock<Selector> = LazyLock::new(|| Selector::parse("caption").unwrap());
static FOOTNOTE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("sup.reference").unwrap());
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static TD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());

fn year_regex(dataset: Dataset) -> (&'static Regex, &'static str) {
    match dataset {
        Dataset::Grp => (&*GRP_YEAR_RE, GRP_YEAR_PATTERN),
        _ => (&*GDP_YEAR_RE, GDP_YEAR_PATTERN),
    }
}

pub fn extract(ctx: &RunContext, dataset: Dataset, html: &str) -> Result<Extracted> {
    let (re, pattern) = year_regex(dataset);
    let year = discover_year(dataset, re, pattern, html)?;

    let table = clean_table(html).ok_or_else(|| ExtractionError::TableNotFound {
        dataset,
        selector: DATA_TABLE.to_string(),
    })?;

    let path = ctx.artifact(&artifact::extract(dataset, &year));
    write_atomic(&path, table.as_bytes())?;
    ctx.record_year(dataset, &year)?;

    info!(
        run_id = ctx.run_id(),
        dataset = dataset.as_str(),
        year = %year,
        "Staged {} ({} bytes)",
        path.display(),
        table.len()
    );
    Ok(Extracted {
        dataset,
        year,
        artifacts: vec![path],
    })
}

/// Markup of the first data table with caption, conversion-notice row and
/// footnote markers removed. Cleaning already-clean markup changes nothing.
pub fn clean_table(html: &str) -> Option<String> {
    let mut doc = Html::parse_document(html);

    let (table_id, noise) = {
        let table = doc.select(&WIKITABLE).next()?;
        let mut noise: Vec<_> = table.select(&CAPTION).map(|e| e.id()).collect();
        if let Some(row) = table.select(&ROW).find(|tr| tr.select(&TD).next().is_some()) {
            let text: String = row.text().collect();
            if text.to_lowercase().contains(NOTE_MARKER) {
                noise.push(row.id());
            }
        }
        noise.extend(table.select(&FOOTNOTE).map(|e| e.id()));
        (table.id(), noise)
    };

    for id in noise {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }

    let table = doc.tree.get(table_id).and_then(ElementRef::wrap)?;
    Some(table.html())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::begin_run;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}", name)).unwrap()
    }

    #[test]
    fn strips_caption_note_row_and_footnotes() {
        let cleaned = clean_table(&fixture("gdp.htm")).unwrap();
        assert!(cleaned.starts_with("<table"));
        assert!(!cleaned.contains("<caption"));
        assert!(!cleaned.to_lowercase().contains("exchange rate"));
        assert!(!cleaned.contains("reference"));
        assert!(cleaned.contains("Jakarta"));
    }

    #[test]
    fn cleaning_is_idempotent() {
        let once = clean_table(&fixture("gdp.htm")).unwrap();
        let twice = clean_table(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn only_first_data_row_is_a_note_candidate() {
        let html = "<table class=\"wikitable\"><tr><th>Rank</th><th>Note</th></tr>\
                    <tr><td>1</td><td>A</td></tr><tr><td>2</td><td>exchange</td></tr></table>";
        let cleaned = clean_table(html).unwrap();
        assert!(cleaned.contains("exchange"));
    }

    #[test]
    fn missing_table_or_year() {
        let root = tempfile::tempdir().unwrap();
        let ctx = begin_run(root.path()).unwrap();

        let err = extract(&ctx, Dataset::Gdp, "<span id=\"2022_data\"></span><p>no table</p>")
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Extraction(ExtractionError::TableNotFound { .. })
        ));

        let err = extract(&ctx, Dataset::Grp, &fixture("gdp.htm")).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Extraction(ExtractionError::YearNotFound { .. })
        ));
    }

    #[test]
    fn stages_artifact_and_records_year() {
        let root = tempfile::tempdir().unwrap();
        let ctx = begin_run(root.path()).unwrap();

        let out = extract(&ctx, Dataset::Gdp, &fixture("gdp.htm")).unwrap();
        assert_eq!(out.year, "2022");
        assert!(ctx.artifact("gdp_extract_2022.htm").is_file());
        assert_eq!(ctx.discovered_year(Dataset::Gdp).unwrap().as_deref(), Some("2022"));

        let out = extract(&ctx, Dataset::Grp, &fixture("grp.htm")).unwrap();
        assert_eq!(out.year, "2022");
        assert!(ctx.artifact("grp_extract_2022.htm").is_file());
    }
}
