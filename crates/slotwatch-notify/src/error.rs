use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("invalid mail address {address:?}: {reason}")]
    Address { address: String, reason: String },
    #[error("cannot build message: {0}")]
    Message(String),
    #[error("SMTP delivery failed: {0}")]
    Smtp(String),
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("delivery task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("{failed} of {total} notifiers failed; first error: {first}")]
    Partial {
        failed: usize,
        total: usize,
        first: Box<NotifyError>,
    },
}
