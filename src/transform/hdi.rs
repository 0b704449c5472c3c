//! HDI reconciliation.
//!
//! The page carries two tables that disagree on shape:
//!
//! * a trend table, one row per province and one `HDI <year>` column per
//!   year of the historical series;
//! * a ranked snapshot of the two latest years, with duplicated `Rank` and
//!   `HDI` headers (`HDI` is the latest year, `HDI.1` the one before).
//!
//! They are merged into one province × year table. The column for the year
//! before the snapshot year holds the year-over-year change taken from the
//! snapshot, and the snapshot year holds the snapshot value. Provinces that
//! only exist in the snapshot (administrative splits) inherit every value of
//! their parent province. All values are rendered with [`fixed_width`].

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::{debug, info};

use super::splits::{parent_of, ProvinceSplit};
use super::{
    fixed_width, is_rank, parse_number, read_staged_table, required_metadata, sort_and_number,
    strip_footnotes, write_csv_artifact, Transformed,
};
use crate::artifact::{self, HDI_TREND_KEY};
use crate::config;
use crate::dataset::Dataset;
use crate::error::{Result, TransformError};
use crate::model::{to_csv, HdiRow, HdiTable, SummaryRow, ID_COLUMN, PROVINCE_COLUMN};
use crate::run::RunContext;
use crate::table::RawTable;

const DATASET: Dataset = Dataset::Hdi;
const NATIONAL_ROW: &str = "Indonesia";
// Trend cell for a province that did not yet exist as a separate entity.
const NOT_YET_SEPARATE: &str = "Part of East Kalimantan";
const YEAR_PREFIX: &str = "HDI ";

/// Trend table after cleanup: raw numeric values per province and year.
#[derive(Debug, Clone, PartialEq)]
pub struct Trend {
    pub years: Vec<u16>,
    pub rows: Vec<(String, BTreeMap<u16, f64>)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRow {
    pub province: String,
    pub previous: f64,
    pub current: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub year: u16,
    pub rows: Vec<SnapshotRow>,
}

pub fn parse_trend(table: &RawTable) -> Result<Trend, TransformError> {
    let mut province_col = None;
    let mut year_cols: Vec<(u16, usize)> = Vec::new();
    for (i, header) in table.headers.iter().enumerate() {
        let header = strip_footnotes(header);
        if header == PROVINCE_COLUMN {
            province_col = Some(i);
            continue;
        }
        let year = header
            .strip_prefix(YEAR_PREFIX)
            .unwrap_or(&header)
            .trim()
            .parse::<u16>()
            .map_err(|_| TransformError::UnexpectedColumn {
                dataset: DATASET,
                column: header.clone(),
            })?;
        year_cols.push((year, i));
    }
    let province_col = province_col.ok_or_else(|| TransformError::MissingColumn {
        dataset: DATASET,
        column: PROVINCE_COLUMN.to_string(),
    })?;
    year_cols.sort();
    let Some(&(_, first_year_col)) = year_cols.first() else {
        return Err(TransformError::MissingColumn {
            dataset: DATASET,
            column: format!("{}<year>", YEAR_PREFIX),
        });
    };

    let mut rows = Vec::new();
    for row in &table.rows {
        let province = &row[province_col];
        // Spanned group rows repeat one text across every column.
        if *province == row[first_year_col] {
            debug!("Skipping spanned trend row `{}`", province);
            continue;
        }
        let province = strip_footnotes(province);
        if province == NATIONAL_ROW {
            continue;
        }
        let mut values = BTreeMap::new();
        for &(year, col) in &year_cols {
            let cell = &row[col];
            let value = if cell == NOT_YET_SEPARATE {
                0.0
            } else {
                parse_number(DATASET, &table.headers[col], cell)?
            };
            values.insert(year, value);
        }
        rows.push((province, values));
    }

    if rows.is_empty() {
        return Err(TransformError::EmptyTable { dataset: DATASET });
    }
    Ok(Trend {
        years: year_cols.into_iter().map(|(y, _)| y).collect(),
        rows,
    })
}

pub fn parse_snapshot(table: &RawTable, year: u16) -> Result<Snapshot, TransformError> {
    let mut rank = None;
    let mut province = None;
    let mut current = None;
    let mut previous = None;
    for (i, header) in table.headers.iter().enumerate() {
        match strip_footnotes(header).as_str() {
            "Rank" => rank = Some(i),
            "Rank.1" => {}
            "Province" => province = Some(i),
            "HDI" => current = Some(i),
            "HDI.1" => previous = Some(i),
            other => {
                return Err(TransformError::UnexpectedColumn {
                    dataset: DATASET,
                    column: other.to_string(),
                })
            }
        }
    }
    let require = |col: Option<usize>, name: &str| {
        col.ok_or_else(|| TransformError::MissingColumn {
            dataset: DATASET,
            column: name.to_string(),
        })
    };
    let rank = require(rank, "Rank")?;
    let province = require(province, "Province")?;
    let current = require(current, "HDI")?;
    let previous = require(previous, "HDI.1")?;

    // The sub-header row repeats the year in the rank column.
    let year_label = year.to_string();
    let mut rows = Vec::new();
    for row in &table.rows {
        if !is_rank(&row[rank]) || row[rank] == year_label {
            continue;
        }
        rows.push(SnapshotRow {
            province: strip_footnotes(&row[province]),
            previous: parse_number(DATASET, &year.saturating_sub(1).to_string(), &row[previous])?,
            current: parse_number(DATASET, &year_label, &row[current])?,
        });
    }
    Ok(Snapshot { year, rows })
}

/// Merge trend and snapshot into the canonical table, backfill split
/// provinces and number the rows.
pub fn reconcile(
    trend: &Trend,
    snapshot: &Snapshot,
    splits: &[ProvinceSplit],
) -> Result<HdiTable, TransformError> {
    let year = snapshot.year;
    let previous_year = year.saturating_sub(1);
    let years: Vec<u16> = trend
        .years
        .iter()
        .copied()
        .chain([previous_year, year])
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let by_province: BTreeMap<&str, &SnapshotRow> = snapshot
        .rows
        .iter()
        .map(|r| (r.province.as_str(), r))
        .collect();

    let mut rows = Vec::with_capacity(snapshot.rows.len());
    for (province, history) in &trend.rows {
        let snap = by_province
            .get(province.as_str())
            .ok_or_else(|| TransformError::MissingProvince {
                dataset: DATASET,
                province: province.clone(),
                source_table: "snapshot",
            })?;
        let mut values: BTreeMap<u16, String> = history
            .iter()
            .map(|(y, v)| (*y, fixed_width(*v)))
            .collect();
        values.insert(previous_year, fixed_width(snap.current - snap.previous));
        values.insert(year, fixed_width(snap.current));
        rows.push(HdiRow {
            id: 0,
            province: province.clone(),
            values,
        });
    }

    let known: HashSet<String> = trend.rows.iter().map(|(p, _)| p.clone()).collect();
    for snap in &snapshot.rows {
        if known.contains(&snap.province) || snap.province == NATIONAL_ROW {
            continue;
        }
        let parent = parent_of(splits, &snap.province).ok_or_else(|| {
            TransformError::UnmappedProvince {
                dataset: DATASET,
                province: snap.province.clone(),
            }
        })?;
        let values = rows
            .iter()
            .find(|r| r.province == parent)
            .map(|r| r.values.clone())
            .ok_or_else(|| TransformError::MissingProvince {
                dataset: DATASET,
                province: parent.to_string(),
                source_table: "trend",
            })?;
        debug!("Backfilling {} from {}", snap.province, parent);
        rows.push(HdiRow {
            id: 0,
            province: snap.province.clone(),
            values,
        });
    }

    sort_and_number(&mut rows);
    Ok(HdiTable { years, rows })
}

/// Mean of every year column over all provinces, rounded to four places.
pub fn summarize(table: &HdiTable) -> Vec<SummaryRow> {
    table
        .years
        .iter()
        .map(|year| {
            let values: Vec<f64> = table
                .rows
                .iter()
                .filter_map(|r| r.values.get(year)?.parse::<f64>().ok())
                .collect();
            let mean = if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            };
            SummaryRow {
                year: year.to_string(),
                average: round4(mean),
            }
        })
        .collect()
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round_ties_even() / 10_000.0
}

/// Year-per-row view: `Id, Year, <one column per province>`.
pub fn transpose(table: &HdiTable) -> Result<Vec<u8>, csv::Error> {
    let mut w = csv::Writer::from_writer(Vec::new());
    let mut header = vec![ID_COLUMN.to_string(), "Year".to_string()];
    header.extend(table.rows.iter().map(|r| r.province.clone()));
    w.write_record(&header)?;
    for (i, year) in table.years.iter().enumerate() {
        let mut record = vec![(i + 1).to_string(), year.to_string()];
        record.extend(
            table
                .rows
                .iter()
                .map(|r| r.values.get(year).cloned().unwrap_or_default()),
        );
        w.write_record(&record)?;
    }
    w.into_inner().map_err(|e| e.into_error().into())
}

pub fn transform(ctx: &RunContext, settings: &config::Hdi) -> Result<Transformed> {
    let year_label = required_metadata(ctx, DATASET, &DATASET.year_key())?;
    let trend_range = required_metadata(ctx, DATASET, HDI_TREND_KEY)?;
    let year: u16 = year_label
        .parse()
        .map_err(|_| TransformError::InvalidNumber {
            dataset: DATASET,
            column: DATASET.year_key(),
            value: year_label.clone(),
        })?;
    let snapshot_range = artifact::year_range(year.saturating_sub(1), year);

    let trend = parse_trend(&read_staged_table(
        DATASET,
        &ctx.artifact(&artifact::hdi_extract(&trend_range)),
    )?)?;
    let snapshot = parse_snapshot(
        &read_staged_table(DATASET, &ctx.artifact(&artifact::hdi_extract(&snapshot_range)))?,
        year,
    )?;
    let table = reconcile(&trend, &snapshot, &settings.splits)?;
    let summary = summarize(&table);

    let first_year = table.years.first().copied().unwrap_or(year);
    let range = artifact::year_range(first_year, year);
    let table_path = ctx.artifact(&artifact::hdi_transform(&range));
    let summary_path = ctx.artifact(&artifact::hdi_summary(&range));
    write_csv_artifact(DATASET, &table_path, table.to_csv())?;
    write_csv_artifact(DATASET, &summary_path, to_csv(&summary))?;
    let mut artifacts = vec![table_path, summary_path];

    if settings.transpose {
        let path = ctx.artifact(&artifact::hdi_transpose(&range));
        write_csv_artifact(DATASET, &path, transpose(&table))?;
        artifacts.push(path);
    }
    ctx.record(artifact::HDI_RANGE_KEY, &range)?;

    info!(
        run_id = ctx.run_id(),
        dataset = DATASET.as_str(),
        range = %range,
        "Reconciled {} provinces across {} years",
        table.rows.len(),
        table.years.len()
    );
    Ok(Transformed {
        dataset: DATASET,
        rows: table.rows.len(),
        artifacts,
    })
}
