//! GDP and GRP: filter ranked rows, map columns onto the canonical schema,
//! sort by province and number.

use tracing::{debug, info};

use super::{
    is_rank, parse_number, read_staged_table, required_metadata, sort_and_number,
    strip_footnotes, write_csv_artifact, Transformed,
};
use crate::artifact;
use crate::dataset::Dataset;
use crate::error::{Result, TransformError};
use crate::model::{to_csv, GdpRow, GrpRow};
use crate::run::RunContext;
use crate::table::RawTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Rank,
    Province,
    Region,
    /// Nominal value in rupiah.
    Local,
    /// Nominal value in US dollars.
    Usd,
    /// Purchasing-power-parity value, dropped.
    Ppp,
}

/// Positions of the canonical columns in a staged table.
#[derive(Debug)]
struct Columns {
    rank: usize,
    province: usize,
    region: Option<usize>,
    local: usize,
    usd: usize,
    names: Vec<String>,
}

fn classify(dataset: Dataset, header: &str) -> Option<Role> {
    let header = strip_footnotes(header);
    match header.as_str() {
        "Rank" => Some(Role::Rank),
        "Province" => Some(Role::Province),
        "Region" if dataset == Dataset::Gdp => Some(Role::Region),
        _ => {
            let prefix = match dataset {
                Dataset::Grp => "Per capita",
                _ => "GDP",
            };
            let rest = header.strip_prefix(prefix)?.trim_start();
            if rest.starts_with("Nominal") {
                Some(Role::Usd)
            } else if rest.starts_with("PPP") {
                Some(Role::Ppp)
            } else if rest.contains("Rp") {
                Some(Role::Local)
            } else {
                None
            }
        }
    }
}

impl Columns {
    fn resolve(dataset: Dataset, headers: &[String]) -> Result<Self, TransformError> {
        let mut found: Vec<(Role, usize)> = Vec::new();
        for (i, header) in headers.iter().enumerate() {
            let unexpected = || TransformError::UnexpectedColumn {
                dataset,
                column: header.clone(),
            };
            let role = classify(dataset, header).ok_or_else(unexpected)?;
            if found.iter().any(|(r, _)| *r == role) {
                return Err(unexpected());
            }
            found.push((role, i));
        }

        let position = |role: Role| found.iter().find(|(r, _)| *r == role).map(|(_, i)| *i);
        let require = |role: Role, name: &str| {
            position(role).ok_or_else(|| TransformError::MissingColumn {
                dataset,
                column: name.to_string(),
            })
        };

        let region = match dataset {
            Dataset::Gdp => Some(require(Role::Region, "Region")?),
            _ => None,
        };
        Ok(Columns {
            rank: require(Role::Rank, "Rank")?,
            province: require(Role::Province, "Province")?,
            region,
            local: require(Role::Local, "nominal (Rp)")?,
            usd: require(Role::Usd, "Nominal (USD)")?,
            names: headers.to_vec(),
        })
    }

    fn number(&self, dataset: Dataset, row: &[String], col: usize) -> Result<f64, TransformError> {
        parse_number(dataset, &self.names[col], &row[col])
    }
}

fn ranked_rows<'a>(table: &'a RawTable, cols: &'a Columns) -> impl Iterator<Item = &'a Vec<String>> {
    table.rows.iter().filter(move |row| {
        let keep = is_rank(&row[cols.rank]);
        if !keep {
            debug!("Skipping non-data row starting `{}`", row[cols.rank]);
        }
        keep
    })
}

pub fn gdp_rows(table: &RawTable) -> Result<Vec<GdpRow>, TransformError> {
    let dataset = Dataset::Gdp;
    let cols = Columns::resolve(dataset, &table.headers)?;
    let Some(region) = cols.region else {
        return Err(TransformError::MissingColumn {
            dataset,
            column: "Region".into(),
        });
    };
    let mut rows = ranked_rows(table, &cols)
        .map(|row| {
            Ok(GdpRow {
                id: 0,
                province: strip_footnotes(&row[cols.province]),
                region: strip_footnotes(&row[region]),
                nominal_rp: cols.number(dataset, row, cols.local)?,
                nominal_usd: cols.number(dataset, row, cols.usd)?,
            })
        })
        .collect::<Result<Vec<_>, TransformError>>()?;
    sort_and_number(&mut rows);
    Ok(rows)
}

pub fn grp_rows(table: &RawTable) -> Result<Vec<GrpRow>, TransformError> {
    let dataset = Dataset::Grp;
    let cols = Columns::resolve(dataset, &table.headers)?;
    let mut rows = ranked_rows(table, &cols)
        .map(|row| {
            Ok(GrpRow {
                id: 0,
                province: strip_footnotes(&row[cols.province]),
                per_capita_rp: cols.number(dataset, row, cols.local)?,
                per_capita_usd: cols.number(dataset, row, cols.usd)?,
            })
        })
        .collect::<Result<Vec<_>, TransformError>>()?;
    sort_and_number(&mut rows);
    Ok(rows)
}

pub fn transform(ctx: &RunContext, dataset: Dataset) -> Result<Transformed> {
    let year = required_metadata(ctx, dataset, &dataset.year_key())?;
    let table = read_staged_table(dataset, &ctx.artifact(&artifact::extract(dataset, &year)))?;
    let path = ctx.artifact(&artifact::transform(dataset, &year));

    let rows = match dataset {
        Dataset::Grp => {
            let rows = grp_rows(&table)?;
            write_csv_artifact(dataset, &path, to_csv(&rows))?;
            rows.len()
        }
        _ => {
            let rows = gdp_rows(&table)?;
            write_csv_artifact(dataset, &path, to_csv(&rows))?;
            rows.len()
        }
    };

    info!(
        run_id = ctx.run_id(),
        dataset = dataset.as_str(),
        "Wrote {} rows to {}",
        rows,
        path.display()
    );
    Ok(Transformed {
        dataset,
        rows,
        artifacts: vec![path],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract;
    use crate::run::begin_run;

    fn table(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    const GDP_HEADERS: &[&str] = &[
        "Rank",
        "Province",
        "GDP (in billion Rp)",
        "GDP Nominal",
        "GDP PPP",
        "Region",
    ];

    #[test]
    fn keeps_ranked_rows_sorted_with_ids() {
        let t = table(
            GDP_HEADERS,
            &[
                &["1", "Banten", "800,000", "55.1", "160", "Java"],
                &["Total", "Indonesia", "20,000,000", "1,300", "4,000", ""],
                &["2", "Aceh", "200,000", "13.9", "41", "Sumatra"],
                &["", "", "", "", "", ""],
                &["3", "Bali", "250,000", "17.2", "50", "Lesser Sunda Islands"],
            ],
        );
        let rows = gdp_rows(&t).unwrap();
        let got: Vec<_> = rows.iter().map(|r| (r.id, r.province.as_str())).collect();
        assert_eq!(got, vec![(1, "Aceh"), (2, "Bali"), (3, "Banten")]);
        assert_eq!(rows[2].nominal_rp, 800_000.0);
        assert_eq!(rows[2].nominal_usd, 55.1);
        assert_eq!(rows[0].region, "Sumatra");
    }

    #[test]
    fn footnoted_headers_still_match() {
        let t = table(
            &["Rank", "Province", "GDP[8] (in billion Rp)", "GDP Nominal", "GDP PPP", "Region"],
            &[&["1", "Aceh", "1", "2", "3", "Sumatra"]],
        );
        assert_eq!(gdp_rows(&t).unwrap().len(), 1);
    }

    #[test]
    fn unexpected_and_missing_columns() {
        let t = table(&["Rank", "Province", "Population"], &[]);
        assert!(matches!(
            grp_rows(&t),
            Err(TransformError::UnexpectedColumn { ref column, .. }) if column == "Population"
        ));

        let t = table(&["Rank", "Province", "GDP (in billion Rp)", "GDP Nominal"], &[]);
        assert!(matches!(
            gdp_rows(&t),
            Err(TransformError::MissingColumn { ref column, .. }) if column == "Region"
        ));

        // GRP has no region dimension
        let t = table(
            &["Rank", "Province", "Per capita (in thousand Rp)", "Per capita Nominal", "Region"],
            &[],
        );
        assert!(grp_rows(&t).is_err());
    }

    #[test]
    fn bad_number_is_fatal() {
        let t = table(GDP_HEADERS, &[&["1", "Aceh", "lots", "1", "1", "Sumatra"]]);
        assert!(matches!(
            gdp_rows(&t),
            Err(TransformError::InvalidNumber { ref value, .. }) if value == "lots"
        ));
    }

    #[test]
    fn grp_fixture_end_to_end() {
        let root = tempfile::tempdir().unwrap();
        let ctx = begin_run(root.path()).unwrap();
        let html = std::fs::read_to_string("tests/fixtures/grp.htm").unwrap();
        extract::extract(&ctx, Dataset::Grp, &html).unwrap();

        let out = transform(&ctx, Dataset::Grp).unwrap();
        assert_eq!(out.rows, 5);
        let rows: Vec<GrpRow> = crate::model::read_csv(&out.artifacts[0]).unwrap();
        assert_eq!(rows[0].province, "Bali");
        assert_eq!(rows[0].id, 1);
        assert_eq!(rows[0].per_capita_rp, 62_950.0);
        assert!(rows.windows(2).all(|w| w[0].province < w[1].province));
    }

    #[test]
    fn transform_without_extract_is_reported() {
        let root = tempfile::tempdir().unwrap();
        let ctx = begin_run(root.path()).unwrap();
        let err = transform(&ctx, Dataset::Gdp).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Transform(TransformError::MissingMetadata { .. })
        ));
    }

    #[test]
    fn transform_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let ctx = begin_run(root.path()).unwrap();
        let html = std::fs::read_to_string("tests/fixtures/gdp.htm").unwrap();
        extract::extract(&ctx, Dataset::Gdp, &html).unwrap();

        let first = transform(&ctx, Dataset::Gdp).unwrap();
        let a = std::fs::read(&first.artifacts[0]).unwrap();
        let second = transform(&ctx, Dataset::Gdp).unwrap();
        let b = std::fs::read(&second.artifacts[0]).unwrap();
        assert_eq!(a, b);
        assert_eq!(first.rows, 6);
    }
}
