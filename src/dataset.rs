use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// The three source tables this pipeline knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    Gdp,
    Grp,
    Hdi,
}

impl Dataset {
    pub const ALL: [Dataset; 3] = [Dataset::Gdp, Dataset::Grp, Dataset::Hdi];

    pub fn as_str(self) -> &'static str {
        match self {
            Dataset::Gdp => "gdp",
            Dataset::Grp => "grp",
            Dataset::Hdi => "hdi",
        }
    }

    /// Metadata key under which the extractor records the reporting year.
    pub fn year_key(self) -> String {
        format!("{}_year", self.as_str())
    }

    /// Target table for the dataset's canonical artifact.
    pub fn table_name(self) -> &'static str {
        match self {
            Dataset::Gdp => "indo_gdp",
            Dataset::Grp => "indo_grp",
            Dataset::Hdi => "indo_hdi",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.as_str().to_uppercase())
    }
}
