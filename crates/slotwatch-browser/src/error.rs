use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("no element matches {}", .queries.join(" | "))]
    ElementNotFound { queries: Vec<String> },

    #[error("clicking \"{label}\" produced no observable change")]
    NoObservableChange { label: String },

    #[error("result region `{selector}` did not appear within {}s", .timeout.as_secs())]
    SelectorTimeout { selector: String, timeout: Duration },

    #[error("navigation to {url} did not finish within {}s", .timeout.as_secs())]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("navigation to {url} failed: {details}")]
    Navigate { url: String, details: String },

    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("page script failed: {0}")]
    Script(String),

    #[error("browser connection lost: {0}")]
    Disconnected(String),
}

impl BrowserError {
    /// Faults after which no further step on this page can succeed.
    pub fn is_fatal_to_page(&self) -> bool {
        matches!(self, BrowserError::Disconnected(_))
    }
}
