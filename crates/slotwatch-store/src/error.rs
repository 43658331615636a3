use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache file {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache file {path} is not a JSON list of strings: {source}")]
    Corrupt {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
