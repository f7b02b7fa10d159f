use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Failed to parse JSON response from {url}: {source}")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown timeseries {id}, try one of these: [{}]", .known.join(", "))]
    UnknownDataset { id: String, known: Vec<String> },

    #[error("Dataset {0} declares no time column")]
    NoTimeColumn(String),

    #[error("Invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("Not a valid date in format YYYY-MM or YYYY-MM-DD: '{0}'")]
    InvalidDate(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
