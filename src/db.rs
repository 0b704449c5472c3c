use std::time::Duration;

use rusqlite::types::Value;
use rusqlite::Connection;

use crate::config;
use crate::error::LoadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    fn sql(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Column {
            name: name.into(),
            ty,
        }
    }
}

/// Full contents of one target table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableData {
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

pub fn connect(settings: &config::Database) -> Result<Connection, LoadError> {
    let path = &settings.path;
    let connect_err = |source| LoadError::Connect {
        path: path.clone(),
        source,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        // Let open() report the failure if the directory still isn't there.
        let _ = std::fs::create_dir_all(dir);
    }
    let conn = Connection::open(path).map_err(connect_err)?;
    conn.busy_timeout(Duration::from_millis(settings.busy_timeout_ms))
        .map_err(connect_err)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")
        .map_err(connect_err)?;
    Ok(conn)
}

/// Replace every table in `tables` inside one transaction: drop, recreate
/// with the given columns, insert all rows. Readers see either the old set
/// or the new one.
pub fn replace_tables(conn: &Connection, tables: &[TableData]) -> Result<(), LoadError> {
    let tx_err = |source| LoadError::Replace {
        table: tables
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(","),
        source,
    };
    let tx = conn.unchecked_transaction().map_err(tx_err)?;
    for table in tables {
        replace_table(&tx, table).map_err(|source| LoadError::Replace {
            table: table.name.clone(),
            source,
        })?;
    }
    tx.commit().map_err(tx_err)?;
    Ok(())
}

fn replace_table(conn: &Connection, table: &TableData) -> rusqlite::Result<()> {
    let name = quote(&table.name);
    let columns = table
        .columns
        .iter()
        .map(|c| format!("{} {}", quote(&c.name), c.ty.sql()))
        .collect::<Vec<_>>()
        .join(", ");
    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS {name};
         CREATE TABLE {name} ({columns});"
    ))?;

    let placeholders = (1..=table.columns.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn.prepare(&format!("INSERT INTO {name} VALUES ({placeholders})"))?;
    for row in &table.rows {
        stmt.execute(rusqlite::params_from_iter(row.iter()))?;
    }
    Ok(())
}

/// Double-quoted SQL identifier; the canonical headers contain spaces and
/// parentheses.
fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
pub(crate) fn count_rows(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", quote(table)), [], |r| r.get(0))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn connect_path(path: &Path) -> Result<Connection, LoadError> {
        connect(&config::Database {
            path: path.to_path_buf(),
            ..config::Database::default()
        })
    }

    fn sample(rows: usize) -> TableData {
        TableData {
            name: "indo_test".into(),
            columns: vec![
                Column::new("Id", ColumnType::Integer),
                Column::new("GDP Nominal (billion RP)", ColumnType::Real),
                Column::new("Province", ColumnType::Text),
            ],
            rows: (0..rows)
                .map(|i| {
                    vec![
                        Value::Integer(i as i64 + 1),
                        Value::Real(1.5),
                        Value::Text(format!("P{i}")),
                    ]
                })
                .collect(),
        }
    }

    #[test]
    fn replace_drops_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let conn = connect_path(&dir.path().join("nested/db.sqlite")).unwrap();

        replace_tables(&conn, &[sample(5)]).unwrap();
        assert_eq!(count_rows(&conn, "indo_test"), 5);
        replace_tables(&conn, &[sample(2)]).unwrap();
        assert_eq!(count_rows(&conn, "indo_test"), 2);

        let v: f64 = conn
            .query_row("SELECT \"GDP Nominal (billion RP)\" FROM indo_test WHERE Id = 2", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(v, 1.5);
    }

    #[test]
    fn failed_replace_keeps_old_table() {
        let dir = tempfile::tempdir().unwrap();
        let conn = connect_path(&dir.path().join("db.sqlite")).unwrap();
        replace_tables(&conn, &[sample(3)]).unwrap();

        let mut bad = sample(1);
        bad.rows[0].pop();
        let err = replace_tables(&conn, &[sample(7), bad]).unwrap_err();
        assert!(matches!(err, LoadError::Replace { .. }));
        assert_eq!(count_rows(&conn, "indo_test"), 3);
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote("Per capita (thousand RP)"), "\"Per capita (thousand RP)\"");
        assert_eq!(quote("a\"b"), "\"a\"\"b\"");
    }
}
