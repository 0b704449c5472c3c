use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::dataset::Dataset;
use crate::error::Result;
use crate::transform::splits::{default_splits, ProvinceSplit};

const DEFAULT_CONFIG_FILE: &str = "indostat.toml";
const ENV_PREFIX: &str = "INDOSTAT";

/// Runtime settings: struct defaults, then `indostat.toml`, then
/// `INDOSTAT_*` environment variables (`__` separates nested keys).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub staging_dir: PathBuf,
    pub sources: Sources,
    pub database: Database,
    pub fetch: Fetch,
    pub load: Load,
    pub hdi: Hdi,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Sources {
    pub gdp_url: String,
    pub grp_url: String,
    pub hdi_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Database {
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Fetch {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Load {
    pub max_retries: u32,
    pub backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Hdi {
    /// Also stage and load the year-per-row view of the HDI table.
    pub transpose: bool,
    /// Provinces created after the trend series ended, with the province
    /// whose history they inherit.
    pub splits: Vec<ProvinceSplit>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            staging_dir: PathBuf::from("data"),
            sources: Sources::default(),
            database: Database::default(),
            fetch: Fetch::default(),
            load: Load::default(),
            hdi: Hdi::default(),
        }
    }
}

impl Default for Sources {
    fn default() -> Self {
        Sources {
            gdp_url: "https://en.wikipedia.org/wiki/List_of_Indonesian_provinces_by_GDP".into(),
            grp_url: "https://en.wikipedia.org/wiki/List_of_Indonesian_provinces_by_GDP_per_capita"
                .into(),
            hdi_url:
                "https://en.wikipedia.org/wiki/List_of_Indonesian_provinces_by_Human_Development_Index"
                    .into(),
        }
    }
}

impl Default for Database {
    fn default() -> Self {
        Database {
            path: PathBuf::from("data/indo_stats.sqlite"),
            busy_timeout_ms: 5_000,
        }
    }
}

impl Default for Fetch {
    fn default() -> Self {
        Fetch {
            timeout_secs: 30,
            max_retries: 3,
            backoff_ms: 2_000,
            user_agent: concat!("indostat/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl Default for Load {
    fn default() -> Self {
        Load {
            max_retries: 3,
            backoff_ms: 500,
        }
    }
}

impl Default for Hdi {
    fn default() -> Self {
        Hdi {
            transpose: false,
            splits: default_splits(),
        }
    }
}

impl Sources {
    pub fn url(&self, dataset: Dataset) -> &str {
        match dataset {
            Dataset::Gdp => &self.gdp_url,
            Dataset::Grp => &self.grp_url,
            Dataset::Hdi => &self.hdi_url,
        }
    }
}

impl Settings {
    /// Load settings. An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_from(path, environment())
    }

    fn load_from(path: Option<&Path>, env: Environment) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let settings = Config::builder()
            .add_source(file)
            .add_source(env)
            .build()?
            .try_deserialize::<Settings>()?;
        Ok(settings)
    }
}

/// `INDOSTAT_DATABASE__PATH` → `database.path`: one `_` after the prefix,
/// `__` between nested keys.
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_dataset() {
        let s = Settings::default();
        for d in Dataset::ALL {
            assert!(s.sources.url(d).starts_with("https://"));
        }
        assert_eq!(s.hdi.splits.len(), 4);
        assert!(!s.hdi.transpose);
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indostat.toml");
        std::fs::write(
            &path,
            "staging_dir = \"/tmp/stage\"\n[database]\npath = \"x.sqlite\"\n[fetch]\nmax_retries = 1\n",
        )
        .unwrap();
        let s = Settings::load(Some(&path)).unwrap();
        assert_eq!(s.staging_dir, PathBuf::from("/tmp/stage"));
        assert_eq!(s.database.path, PathBuf::from("x.sqlite"));
        assert_eq!(s.fetch.max_retries, 1);
        // untouched sections keep their defaults
        assert_eq!(s.fetch.timeout_secs, 30);
        assert_eq!(s.load.max_retries, 3);
    }

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<config::Map<String, String>>();
        environment().source(Some(map))
    }

    #[test]
    fn env_overrides_nested_keys_after_single_underscore_prefix() {
        let s = Settings::load_from(
            None,
            env(&[
                ("INDOSTAT_DATABASE__PATH", "/srv/indo/a.sqlite"),
                ("INDOSTAT_STAGING_DIR", "/srv/indo/stage"),
                ("INDOSTAT_FETCH__MAX_RETRIES", "7"),
            ]),
        )
        .unwrap();
        assert_eq!(s.database.path, PathBuf::from("/srv/indo/a.sqlite"));
        assert_eq!(s.staging_dir, PathBuf::from("/srv/indo/stage"));
        assert_eq!(s.fetch.max_retries, 7);
    }

    #[test]
    fn env_beats_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indostat.toml");
        std::fs::write(&path, "[database]\npath = \"file.sqlite\"\n").unwrap();
        let s = Settings::load_from(
            Some(&path),
            env(&[("INDOSTAT_DATABASE__PATH", "env.sqlite")]),
        )
        .unwrap();
        assert_eq!(s.database.path, PathBuf::from("env.sqlite"));
    }
}
