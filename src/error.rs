use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TlogError {
    // Usage
    #[error("starttime ({0}) should be TEMPER format, eg,\n  2021 | 2021.01 | 2021.01.23 | 2021.01.13_12:26:53.867470")]
    BadStartTime(String),

    #[error("no args allowed after \"-\" file")]
    DashNotAlone,

    #[error("cannot match dated logs for {path}: {source}")]
    BadLiveLog {
        path: PathBuf,
        #[source]
        source: globset::Error,
    },

    // Reference tables
    #[error("failed to read table {path}: {source}")]
    Table {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("prefix '{prefix}' is a synonym for unknown prefix '{synonym}'")]
    UnresolvableSynonym { prefix: String, synonym: String },

    #[error("bad prefix {0}")]
    BadPrefix(String),

    #[error("shoulder '{0}' is not of the form naan/shoulder")]
    BadShoulder(String),

    // Run
    #[error("timestamp {0} is not a calendar date")]
    BadTimestamp(String),

    #[error("starttime {start} > reporttime {boundary}")]
    BoundaryBeforeStart { start: String, boundary: String },

    #[error("Starttime not found: {start}\nLatest time found:   {latest}")]
    StartNotFound { start: String, latest: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TlogError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn table(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Table { path: path.into(), source }
    }
}
