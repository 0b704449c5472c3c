pub mod economy;
pub mod hdi;
pub mod splits;

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::config::Settings;
use crate::dataset::Dataset;
use crate::error::{Error, Result, TransformError};
use crate::model::Provincial;
use crate::run::{write_atomic, RunContext};
use crate::table::{parse_table, RawTable};

static FOOTNOTE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[^\]]*\]").unwrap());

// Width of every HDI value string.
pub const FIXED_WIDTH: usize = 6;

/// What a transformer left in staging.
#[derive(Debug, Clone)]
pub struct Transformed {
    pub dataset: Dataset,
    pub rows: usize,
    pub artifacts: Vec<PathBuf>,
}

/// Turn the staged extract(s) of `dataset` into canonical CSV artifacts.
/// Re-running over the same extracts rewrites byte-identical files.
pub fn transform(ctx: &RunContext, dataset: Dataset, settings: &Settings) -> Result<Transformed> {
    match dataset {
        Dataset::Gdp | Dataset::Grp => economy::transform(ctx, dataset),
        Dataset::Hdi => hdi::transform(ctx, &settings.hdi),
    }
}

/// Row-validity predicate: the rank cell is a non-empty base-10 integer.
pub fn is_rank(cell: &str) -> bool {
    !cell.is_empty() && cell.bytes().all(|b| b.is_ascii_digit())
}

/// Sort by province name (byte order) and number rows 1..=N.
pub fn sort_and_number<T: Provincial>(rows: &mut [T]) {
    rows.sort_by(|a, b| a.province().cmp(b.province()));
    for (i, row) in rows.iter_mut().enumerate() {
        row.set_id(i as u32 + 1);
    }
}

/// Render `value` as exactly six characters: shortest round-trip decimal,
/// right-padded with zeros, then cut. This truncates; it never rounds.
/// Small magnitudes stay positional (`0.00001` gives `"0.0000"`), never
/// exponent form.
pub fn fixed_width(value: f64) -> String {
    let mut s = value.to_string();
    if value.is_finite() && !s.contains('.') {
        s.push_str(".0");
    }
    while s.len() < FIXED_WIDTH {
        s.push('0');
    }
    s.chars().take(FIXED_WIDTH).collect()
}

/// Remove bracketed footnote markers such as `[8]` or `[a]`.
pub fn strip_footnotes(text: &str) -> String {
    FOOTNOTE_RE.replace_all(text, "").trim().to_string()
}

/// Parse a numeric cell, tolerating thousands separators and currency marks.
pub fn parse_number(dataset: Dataset, column: &str, raw: &str) -> Result<f64, TransformError> {
    let cleaned: String = strip_footnotes(raw)
        .replace("US$", "")
        .replace("Rp", "")
        .replace(['$', ',', ' ', '\u{a0}'], "")
        .replace('\u{2212}', "-");
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| TransformError::InvalidNumber {
            dataset,
            column: column.to_string(),
            value: raw.to_string(),
        })
}

pub(crate) fn read_staged_table(dataset: Dataset, path: &Path) -> Result<RawTable> {
    let markup = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    parse_table(&markup).ok_or_else(|| TransformError::EmptyTable { dataset }.into())
}

pub(crate) fn required_metadata(ctx: &RunContext, dataset: Dataset, key: &str) -> Result<String> {
    ctx.load_metadata()?.remove(key).ok_or_else(|| {
        TransformError::MissingMetadata {
            dataset,
            key: key.to_string(),
        }
        .into()
    })
}

pub(crate) fn write_csv_artifact(
    dataset: Dataset,
    path: &Path,
    bytes: std::result::Result<Vec<u8>, csv::Error>,
) -> Result<()> {
    let bytes = bytes.map_err(|source| TransformError::Csv {
        dataset,
        path: path.to_path_buf(),
        source,
    })?;
    write_atomic(path, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GrpRow;

    #[test]
    fn rank_predicate_partitions_rows() {
        let rows = [("1", "A"), ("Total", "B"), ("2", "C"), ("", "D"), ("3a", "E")];
        let kept: Vec<_> = rows.iter().filter(|(r, _)| is_rank(r)).map(|(_, p)| *p).collect();
        assert_eq!(kept, vec!["A", "C"]);
    }

    #[test]
    fn ids_follow_sorted_province_order() {
        let mut rows: Vec<GrpRow> = ["Banten", "Aceh", "Bali"]
            .iter()
            .map(|p| GrpRow {
                id: 0,
                province: p.to_string(),
                per_capita_rp: 0.0,
                per_capita_usd: 0.0,
            })
            .collect();
        sort_and_number(&mut rows);
        let got: Vec<_> = rows.iter().map(|r| (r.id, r.province.as_str())).collect();
        assert_eq!(got, vec![(1, "Aceh"), (2, "Bali"), (3, "Banten")]);
    }

    #[test]
    fn sort_is_case_sensitive() {
        let mut rows: Vec<GrpRow> = ["aceh", "Bali"]
            .iter()
            .map(|p| GrpRow {
                id: 0,
                province: p.to_string(),
                per_capita_rp: 0.0,
                per_capita_usd: 0.0,
            })
            .collect();
        sort_and_number(&mut rows);
        assert_eq!(rows[0].province, "Bali");
    }

    #[test]
    fn fixed_width_pads_and_truncates() {
        assert_eq!(fixed_width(12.3), "12.300");
        assert_eq!(fixed_width(1.23456789), "1.2345");
        // truncation, not rounding
        assert_eq!(fixed_width(0.99999), "0.9999");
        assert_eq!(fixed_width(0.0), "0.0000");
        assert_eq!(fixed_width(72.0), "72.000");
        assert_eq!(fixed_width(-0.12), "-0.120");
        assert_eq!(fixed_width(0.6400000000000006), "0.6400");
        assert_eq!(fixed_width(74.39), "74.390");
        assert_eq!(fixed_width(0.00001), "0.0000");
        assert_eq!(fixed_width(-0.00002), "-0.000");
    }

    #[test]
    fn numbers_with_marks() {
        let p = |s| parse_number(Dataset::Gdp, "c", s);
        assert_eq!(p("1,234,567").unwrap(), 1_234_567.0);
        assert_eq!(p("US$ 12.5").unwrap(), 12.5);
        assert_eq!(p("Rp 57,000[3]").unwrap(), 57_000.0);
        assert_eq!(p("\u{2212}1.5").unwrap(), -1.5);
        assert!(matches!(p("n/a"), Err(TransformError::InvalidNumber { .. })));
        assert!(p("").is_err());
    }

    #[test]
    fn footnotes_are_stripped() {
        assert_eq!(strip_footnotes("GDP[8] (in billion Rp)"), "GDP (in billion Rp)");
        assert_eq!(strip_footnotes("South Papua[a]"), "South Papua");
    }
}
