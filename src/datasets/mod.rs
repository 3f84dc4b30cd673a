///  The tweet virality dataset
pub mod tweets;

/// Stratified train / validation / test splits
pub mod split;

pub use split::Splits;

/// Dataset Error
#[derive(thiserror::Error, Debug)]
pub enum DatasetError {
    /// The dataset could not be read from or written to disk
    #[error("dataset i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// The dataset source could not be fetched
    #[error("unable to fetch dataset: {0}")]
    Download(#[from] crate::utils::download::DownloadError),

    /// The dataset source is not a valid URL
    #[error("invalid dataset url: {0}")]
    Url(#[from] url::ParseError),

    /// A record is not valid JSON or is missing a required field
    #[error("malformed record on line {line}: {source}")]
    Parse {
        /// 1-based line number of the record
        line: usize,

        /// The underlying JSON error
        source: serde_json::Error,
    },

    /// A record does not contain a configured feature
    #[error("record on line {line} is missing feature {feature}")]
    MissingFeature {
        /// 1-based line number of the record
        line: usize,

        /// The missing feature column
        feature: String,
    },

    /// A configured feature is not an integer or a boolean
    #[error("feature {feature} on line {line} is not an integer: {value}")]
    InvalidFeature {
        /// 1-based line number of the record
        line: usize,

        /// The offending feature column
        feature: String,

        /// The raw JSON value
        value: serde_json::Value,
    },

    /// The dataset source contained no records
    #[error("dataset {0} contains no records")]
    Empty(String),

    /// The blocking reader task did not complete
    #[error("dataset reader task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
