use std::path::PathBuf;

use thiserror::Error;

use crate::dataset::Dataset;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Network or HTTP failure while fetching a source page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("could not build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Client(_) => false,
        }
    }
}

/// The source markup no longer has the structure the extractor expects.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("{dataset}: no reporting year matching /{pattern}/ in page")]
    YearNotFound { dataset: Dataset, pattern: &'static str },
    #[error("{dataset}: no table matching `{selector}`")]
    TableNotFound { dataset: Dataset, selector: String },
    #[error("{dataset}: anchor #{anchor} not found")]
    AnchorNotFound { dataset: Dataset, anchor: String },
    #[error("{dataset}: no table follows anchor #{anchor}")]
    NoTableAfterAnchor { dataset: Dataset, anchor: String },
    #[error("{dataset}: trend table has no `HDI <year>` headers")]
    TrendRangeNotFound { dataset: Dataset },
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("{dataset}: staged table is empty")]
    EmptyTable { dataset: Dataset },
    #[error("{dataset}: unexpected column `{column}`")]
    UnexpectedColumn { dataset: Dataset, column: String },
    #[error("{dataset}: missing column `{column}`")]
    MissingColumn { dataset: Dataset, column: String },
    #[error("{dataset}: cannot parse `{value}` in column `{column}` as a number")]
    InvalidNumber {
        dataset: Dataset,
        column: String,
        value: String,
    },
    #[error("{dataset}: province `{province}` missing from the {source_table} table")]
    MissingProvince {
        dataset: Dataset,
        province: String,
        source_table: &'static str,
    },
    #[error("{dataset}: province `{province}` has no history and no split parent mapping")]
    UnmappedProvince { dataset: Dataset, province: String },
    #[error("{dataset}: run metadata has no `{key}` entry; has the earlier stage run?")]
    MissingMetadata { dataset: Dataset, key: String },
    #[error("{dataset}: malformed canonical artifact {path}: {source}")]
    Csv {
        dataset: Dataset,
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// A canonical CSV artifact that does not have the shape its writer produces.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("unexpected column `{column}` at position {position}")]
    UnexpectedColumn { column: String, position: usize },
    #[error("record {record}: `{value}` is not a row id")]
    InvalidId { record: u64, value: String },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open database {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("replacing table {table} failed: {source}")]
    Replace {
        table: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("cannot read canonical artifact {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: ArtifactError,
    },
}

impl LoadError {
    /// Busy/locked databases and failed opens are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        let source = match self {
            LoadError::Connect { .. } => return true,
            LoadError::Replace { source, .. } => source,
            LoadError::Artifact { .. } => return false,
        };
        matches!(
            source.sqlite_error_code(),
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
        )
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("run metadata {path} is corrupt: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no staged run found under {0}")]
    NoRuns(PathBuf),
    #[error("invalid configuration: {0}")]
    Config(#[from] config::ConfigError),
    #[error("pipeline task aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Short category label used in the per-dataset report.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Fetch(_) => "fetch",
            Error::Extraction(_) => "extraction",
            Error::Transform(_) => "transform",
            Error::Load(_) => "load",
            Error::Io { .. } | Error::Metadata { .. } | Error::NoRuns(_) => "staging",
            Error::Config(_) => "config",
            Error::Join(_) => "task",
        }
    }
}
