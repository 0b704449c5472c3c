//! Load stage: read canonical artifacts from staging and replace the target
//! tables wholesale.

use std::path::Path;
use std::time::Duration;

use itertools::Itertools;
use rusqlite::types::Value;
use serde::Deserialize;
use tracing::{info, warn};

use crate::artifact::{self, HDI_RANGE_KEY};
use crate::config::Settings;
use crate::dataset::Dataset;
use crate::db::{self, Column, ColumnType, TableData};
use crate::error::{LoadError, Result};
use crate::model::{
    read_csv, GdpRow, GrpRow, HdiTable, ProvinceRow, RegionRow, SummaryRow, ID_COLUMN,
    PROVINCE_COLUMN,
};
use crate::run::RunContext;
use crate::transform::required_metadata;

pub const PROVINCES_TABLE: &str = "indo_provinces";
pub const REGIONS_TABLE: &str = "indo_regions";
pub const HDI_SUMMARY_TABLE: &str = "indo_hdi_summary";
pub const HDI_TRANSPOSE_TABLE: &str = "indo_hdi_transpose";

/// Tables written for one dataset and their row counts.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded {
    pub dataset: Dataset,
    pub tables: Vec<(String, usize)>,
}

pub fn load(ctx: &RunContext, dataset: Dataset, settings: &Settings) -> Result<Loaded> {
    let tables = match dataset {
        Dataset::Gdp => gdp_tables(ctx)?,
        Dataset::Grp => grp_tables(ctx)?,
        Dataset::Hdi => hdi_tables(ctx, settings.hdi.transpose)?,
    };

    write_with_retry(settings, &tables)?;

    let counts: Vec<(String, usize)> = tables
        .iter()
        .map(|t| (t.name.clone(), t.rows.len()))
        .collect();
    for (table, rows) in &counts {
        info!(
            run_id = ctx.run_id(),
            dataset = dataset.as_str(),
            "Loaded {} rows into {}",
            rows,
            table
        );
    }
    Ok(Loaded {
        dataset,
        tables: counts,
    })
}

fn write_with_retry(settings: &Settings, tables: &[TableData]) -> Result<(), LoadError> {
    let base = Duration::from_millis(settings.load.backoff_ms);
    let mut attempt = 0;
    loop {
        let result = db::connect(&settings.database).and_then(|conn| db::replace_tables(&conn, tables));
        match result {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() && attempt < settings.load.max_retries => {
                let backoff = base * 2u32.pow(attempt);
                warn!(
                    "Load failed (attempt {}/{}): {}; backing off {:.1}s",
                    attempt + 1,
                    settings.load.max_retries,
                    e,
                    backoff.as_secs_f64()
                );
                std::thread::sleep(backoff);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn artifact_rows<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>, LoadError> {
    read_csv(path).map_err(|source| LoadError::Artifact {
        path: path.to_path_buf(),
        source: source.into(),
    })
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn real_or_null(s: &str) -> Value {
    s.parse::<f64>().map(Value::Real).unwrap_or(Value::Null)
}

fn gdp_tables(ctx: &RunContext) -> Result<Vec<TableData>> {
    let dataset = Dataset::Gdp;
    let year = required_metadata(ctx, dataset, &dataset.year_key())?;
    let rows: Vec<GdpRow> = artifact_rows(&ctx.artifact(&artifact::transform(dataset, &year)))?;

    let provinces = province_dimension(&rows);
    let regions = region_dimension(&rows);

    Ok(vec![
        TableData {
            name: dataset.table_name().to_string(),
            columns: vec![
                Column::new(ID_COLUMN, ColumnType::Integer),
                Column::new(PROVINCE_COLUMN, ColumnType::Text),
                Column::new("Region", ColumnType::Text),
                Column::new("GDP Nominal (billion RP)", ColumnType::Real),
                Column::new("GDP Nominal (billion USD)", ColumnType::Real),
            ],
            rows: rows
                .iter()
                .map(|r| {
                    vec![
                        Value::Integer(r.id.into()),
                        text(&r.province),
                        text(&r.region),
                        Value::Real(r.nominal_rp),
                        Value::Real(r.nominal_usd),
                    ]
                })
                .collect(),
        },
        TableData {
            name: PROVINCES_TABLE.to_string(),
            columns: vec![
                Column::new(ID_COLUMN, ColumnType::Integer),
                Column::new(PROVINCE_COLUMN, ColumnType::Text),
                Column::new("Region", ColumnType::Text),
            ],
            rows: provinces
                .iter()
                .map(|p| vec![Value::Integer(p.id.into()), text(&p.province), text(&p.region)])
                .collect(),
        },
        TableData {
            name: REGIONS_TABLE.to_string(),
            columns: vec![
                Column::new(ID_COLUMN, ColumnType::Integer),
                Column::new("Region", ColumnType::Text),
            ],
            rows: regions
                .iter()
                .map(|r| vec![Value::Integer(r.id.into()), text(&r.region)])
                .collect(),
        },
    ])
}

pub fn province_dimension(rows: &[GdpRow]) -> Vec<ProvinceRow> {
    rows.iter()
        .map(|r| ProvinceRow {
            id: r.id,
            province: r.province.clone(),
            region: r.region.clone(),
        })
        .collect()
}

/// Distinct regions in sorted order, numbered from 1.
pub fn region_dimension(rows: &[GdpRow]) -> Vec<RegionRow> {
    rows.iter()
        .map(|r| r.region.as_str())
        .sorted()
        .dedup()
        .enumerate()
        .map(|(i, region)| RegionRow {
            id: i as u32 + 1,
            region: region.to_string(),
        })
        .collect()
}

fn grp_tables(ctx: &RunContext) -> Result<Vec<TableData>> {
    let dataset = Dataset::Grp;
    let year = required_metadata(ctx, dataset, &dataset.year_key())?;
    let rows: Vec<GrpRow> = artifact_rows(&ctx.artifact(&artifact::transform(dataset, &year)))?;
    Ok(vec![TableData {
        name: dataset.table_name().to_string(),
        columns: vec![
            Column::new(ID_COLUMN, ColumnType::Integer),
            Column::new(PROVINCE_COLUMN, ColumnType::Text),
            Column::new("Per capita (thousand RP)", ColumnType::Real),
            Column::new("Per capita Nominal (USD)", ColumnType::Real),
        ],
        rows: rows
            .iter()
            .map(|r| {
                vec![
                    Value::Integer(r.id.into()),
                    text(&r.province),
                    Value::Real(r.per_capita_rp),
                    Value::Real(r.per_capita_usd),
                ]
            })
            .collect(),
    }])
}

fn hdi_tables(ctx: &RunContext, transpose: bool) -> Result<Vec<TableData>> {
    let dataset = Dataset::Hdi;
    let range = required_metadata(ctx, dataset, HDI_RANGE_KEY)?;

    let path = ctx.artifact(&artifact::hdi_transform(&range));
    let table = HdiTable::read_csv(&path).map_err(|source| LoadError::Artifact {
        path: path.clone(),
        source,
    })?;
    let mut columns = vec![
        Column::new(ID_COLUMN, ColumnType::Integer),
        Column::new(PROVINCE_COLUMN, ColumnType::Text),
    ];
    columns.extend(table.years.iter().map(|y| Column::new(y.to_string(), ColumnType::Real)));
    let rows = table
        .rows
        .iter()
        .map(|r| {
            let mut values = vec![Value::Integer(r.id.into()), text(&r.province)];
            values.extend(
                table
                    .years
                    .iter()
                    .map(|y| r.values.get(y).map_or(Value::Null, |v| real_or_null(v))),
            );
            values
        })
        .collect();

    let summary: Vec<SummaryRow> = artifact_rows(&ctx.artifact(&artifact::hdi_summary(&range)))?;
    let mut tables = vec![
        TableData {
            name: dataset.table_name().to_string(),
            columns,
            rows,
        },
        TableData {
            name: HDI_SUMMARY_TABLE.to_string(),
            columns: vec![
                Column::new("Year", ColumnType::Text),
                Column::new("Average", ColumnType::Real),
            ],
            rows: summary
                .iter()
                .map(|s| vec![text(&s.year), Value::Real(s.average)])
                .collect(),
        },
    ];

    if transpose {
        tables.push(transposed_table(&ctx.artifact(&artifact::hdi_transpose(&range)))?);
    }
    Ok(tables)
}

/// `Id, Year, <province...>`; the province set is only known from the header.
fn transposed_table(path: &Path) -> Result<TableData, LoadError> {
    let artifact_err = |source: csv::Error| LoadError::Artifact {
        path: path.to_path_buf(),
        source: source.into(),
    };
    let mut reader = csv::Reader::from_path(path).map_err(artifact_err)?;
    let headers = reader.headers().map_err(artifact_err)?.clone();
    let columns = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let ty = match i {
                0 => ColumnType::Integer,
                1 => ColumnType::Text,
                _ => ColumnType::Real,
            };
            Column::new(h, ty)
        })
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(artifact_err)?;
        let row = record
            .iter()
            .enumerate()
            .map(|(i, cell)| match i {
                0 => cell.parse::<i64>().map(Value::Integer).unwrap_or(Value::Null),
                1 => text(cell),
                _ => real_or_null(cell),
            })
            .collect();
        rows.push(row);
    }
    Ok(TableData {
        name: HDI_TRANSPOSE_TABLE.to_string(),
        columns,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::run::begin_run;
    use crate::{extract, transform};

    fn gdp(province: &str, region: &str) -> GdpRow {
        GdpRow {
            id: 0,
            province: province.into(),
            region: region.into(),
            nominal_rp: 1.0,
            nominal_usd: 1.0,
        }
    }

    fn settings(root: &Path) -> Settings {
        let mut s = Settings::default();
        s.staging_dir = root.join("staging");
        s.database.path = root.join("db.sqlite");
        s.load.backoff_ms = 1;
        s
    }

    #[test]
    fn regions_are_sorted_and_distinct() {
        let rows = vec![
            gdp("Aceh", "Sumatra"),
            gdp("Bali", "Lesser Sunda Islands"),
            gdp("Banten", "Java"),
            gdp("Jakarta", "Java"),
            gdp("Riau", "Sumatra"),
        ];
        let regions = region_dimension(&rows);
        let got: Vec<_> = regions.iter().map(|r| (r.id, r.region.as_str())).collect();
        assert_eq!(
            got,
            vec![(1, "Java"), (2, "Lesser Sunda Islands"), (3, "Sumatra")]
        );
    }

    #[test]
    fn load_without_transform_fails() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        let ctx = begin_run(&s.staging_dir).unwrap();
        ctx.record_year(Dataset::Grp, "2022").unwrap();
        let err = load(&ctx, Dataset::Grp, &s).unwrap_err();
        assert!(matches!(err, Error::Load(LoadError::Artifact { .. })));
    }

    #[test]
    fn gdp_loads_fact_and_dimensions_and_reload_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        let ctx = begin_run(&s.staging_dir).unwrap();
        let html = std::fs::read_to_string("tests/fixtures/gdp.htm").unwrap();
        extract::extract(&ctx, Dataset::Gdp, &html).unwrap();
        transform::transform(&ctx, Dataset::Gdp, &s).unwrap();

        let loaded = load(&ctx, Dataset::Gdp, &s).unwrap();
        let names: Vec<_> = loaded.tables.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(names, vec!["indo_gdp", "indo_provinces", "indo_regions"]);
        load(&ctx, Dataset::Gdp, &s).unwrap();

        let conn = db::connect(&s.database).unwrap();
        assert_eq!(db::count_rows(&conn, "indo_gdp"), 6);
        assert_eq!(db::count_rows(&conn, "indo_provinces"), 6);
        let first: String = conn
            .query_row("SELECT Province FROM indo_gdp WHERE Id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(first, "Aceh");
    }

    #[test]
    fn hdi_loads_wide_table_summary_and_transpose() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path());
        s.hdi.transpose = true;
        let ctx = begin_run(&s.staging_dir).unwrap();
        let html = std::fs::read_to_string("tests/fixtures/hdi.htm").unwrap();
        extract::extract(&ctx, Dataset::Hdi, &html).unwrap();
        let out = transform::transform(&ctx, Dataset::Hdi, &s).unwrap();

        let loaded = load(&ctx, Dataset::Hdi, &s).unwrap();
        assert_eq!(loaded.tables.len(), 3);
        let conn = db::connect(&s.database).unwrap();
        assert_eq!(db::count_rows(&conn, "indo_hdi"), out.rows as i64);
        assert_eq!(db::count_rows(&conn, HDI_SUMMARY_TABLE), 14);
        assert_eq!(db::count_rows(&conn, HDI_TRANSPOSE_TABLE), 14);
        let v: f64 = conn
            .query_row("SELECT \"2023\" FROM indo_hdi WHERE Id = 1", [], |r| r.get(0))
            .unwrap();
        assert!(v > 0.0);
    }

    #[test]
    fn locked_store_is_retried_then_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path());
        let ctx = begin_run(&s.staging_dir).unwrap();
        let html = std::fs::read_to_string("tests/fixtures/grp.htm").unwrap();
        extract::extract(&ctx, Dataset::Grp, &html).unwrap();
        transform::transform(&ctx, Dataset::Grp, &s).unwrap();
        load(&ctx, Dataset::Grp, &s).unwrap();

        let locker = db::connect(&s.database).unwrap();
        locker.execute_batch("BEGIN EXCLUSIVE;").unwrap();
        s.database.busy_timeout_ms = 0;
        s.load.max_retries = 2;
        s.load.backoff_ms = 5;

        let started = std::time::Instant::now();
        let err = load(&ctx, Dataset::Grp, &s).unwrap_err();
        assert!(matches!(err, Error::Load(ref e) if e.is_retryable()));
        // two backoffs: 5ms then 10ms
        assert!(started.elapsed() >= Duration::from_millis(15));

        drop(locker);
        let loaded = load(&ctx, Dataset::Grp, &s).unwrap();
        assert_eq!(loaded.tables[0].0, "indo_grp");
    }
}
