//! Run identity and the per-run staging area.
//!
//! A run owns `<staging_root>/<run_id>/`. Every stage reads and writes its
//! artifacts there; `info.json` in the same directory carries the small
//! key-value metadata stages hand to each other (run id, discovered years).

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::dataset::Dataset;
use crate::error::{Error, Result};

pub const METADATA_FILE: &str = "info.json";
pub const RUN_ID_KEY: &str = "run_id";
const RUN_ID_FORMAT: &str = "%Y%m%d_%H%M%S";

pub type Metadata = BTreeMap<String, String>;

#[derive(Debug)]
pub struct RunContext {
    run_id: String,
    staging_path: PathBuf,
    // Serializes read-modify-write of info.json across concurrent pipelines.
    metadata_lock: Mutex<()>,
}

/// Start a new run: allocate a timestamp id and an empty staging directory.
pub fn begin_run(staging_root: &Path) -> Result<RunContext> {
    let run_id = Local::now().format(RUN_ID_FORMAT).to_string();
    begin_run_with_id(staging_root, run_id)
}

pub(crate) fn begin_run_with_id(staging_root: &Path, run_id: String) -> Result<RunContext> {
    fs::create_dir_all(staging_root).map_err(|e| Error::io(staging_root, e))?;
    let staging_path = staging_root.join(&run_id);
    // create_dir, not create_dir_all: a second run in the same second must not
    // share a directory with the first.
    fs::create_dir(&staging_path).map_err(|e| Error::io(&staging_path, e))?;

    let ctx = RunContext {
        run_id,
        staging_path,
        metadata_lock: Mutex::new(()),
    };
    let mut metadata = Metadata::new();
    metadata.insert(RUN_ID_KEY.to_string(), ctx.run_id.clone());
    write_atomic(&ctx.metadata_path(), serialize_metadata(&metadata).as_bytes())?;

    info!(run_id = %ctx.run_id, path = %ctx.staging_path.display(), "Started run");
    Ok(ctx)
}

/// Reopen a run staged earlier, e.g. to repeat its transform or load stages.
pub fn open_run(staging_root: &Path, run_id: &str) -> Result<RunContext> {
    let staging_path = staging_root.join(run_id);
    let ctx = RunContext {
        run_id: run_id.to_string(),
        staging_path,
        metadata_lock: Mutex::new(()),
    };
    // Fails early when the directory or its metadata is missing.
    ctx.load_metadata()?;
    Ok(ctx)
}

/// Run ids sort chronologically, so the latest run is the greatest name.
pub fn latest_run(staging_root: &Path) -> Result<String> {
    list_runs(staging_root)?
        .pop()
        .ok_or_else(|| Error::NoRuns(staging_root.to_path_buf()))
}

/// Every staged run (a directory holding `info.json`), oldest first.
pub fn list_runs(staging_root: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(staging_root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io(staging_root, e)),
    };
    let mut runs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(staging_root, e))?;
        let path = entry.path();
        if path.is_dir() && path.join(METADATA_FILE).is_file() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                runs.push(name.to_string());
            }
        }
    }
    runs.sort();
    Ok(runs)
}

impl RunContext {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn staging_path(&self) -> &Path {
        &self.staging_path
    }

    /// Path of a staged artifact inside this run.
    pub fn artifact(&self, name: &str) -> PathBuf {
        self.staging_path.join(name)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.staging_path.join(METADATA_FILE)
    }

    pub fn load_metadata(&self) -> Result<Metadata> {
        let _guard = self.metadata_lock.lock();
        self.read_metadata()
    }

    /// Merge one entry into the persisted metadata, keeping everything else.
    pub fn record(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.metadata_lock.lock();
        let mut metadata = self.read_metadata()?;
        metadata.insert(key.to_string(), value.to_string());
        write_atomic(&self.metadata_path(), serialize_metadata(&metadata).as_bytes())?;
        debug!(run_id = %self.run_id, key, value, "Recorded run metadata");
        Ok(())
    }

    pub fn record_year(&self, dataset: Dataset, year: &str) -> Result<()> {
        self.record(&dataset.year_key(), year)
    }

    pub fn discovered_year(&self, dataset: Dataset) -> Result<Option<String>> {
        Ok(self.load_metadata()?.remove(&dataset.year_key()))
    }

    fn read_metadata(&self) -> Result<Metadata> {
        let path = self.metadata_path();
        let text = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        serde_json::from_str(&text).map_err(|source| Error::Metadata { path, source })
    }
}

fn serialize_metadata(metadata: &Metadata) -> String {
    // BTreeMap<String, String> always serializes
    serde_json::to_string_pretty(metadata).unwrap_or_default()
}

/// Write `bytes` to `path` via a temp file in the same directory and a
/// rename, so readers never observe a partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| Error::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| Error::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}
