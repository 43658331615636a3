//! Target configuration: which reservation pages to check and how to reach them.
//!
//! Targets are read once at the start of a run from a JSON file, either a bare
//! array or an object with a `targets` array:
//!
//! ```json
//! [
//!   {
//!     "name": "海老名運動公園 テニスコート",
//!     "url": "https://yoyaku.e-kanagawa.lg.jp/Ebina/Web/Wg_ModeSelect.aspx",
//!     "resultSelector": "#calendar",
//!     "kind": "ekanagawa",
//!     "facilityPath": ["施設の空き状況", ["テニス", "庭球"], "海老名運動公園"]
//!   }
//! ]
//! ```

use std::path::{Path, PathBuf};

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::availability::DEFAULT_KEYWORDS;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read target file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed target file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("target #{index}: {reason}")]
    Invalid { index: usize, reason: String },

    #[error("target file lists no targets")]
    Empty,
}

/// Which site-specific navigation strategy a target uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteKind {
    #[default]
    Generic,
    /// e-kanagawa shared municipal reservation portal.
    #[serde(alias = "siteA")]
    Ekanagawa,
    /// Chigasaki city facility calendar.
    #[serde(alias = "siteB")]
    Chigasaki,
}

impl std::fmt::Display for SiteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SiteKind::Generic => "generic",
            SiteKind::Ekanagawa => "ekanagawa",
            SiteKind::Chigasaki => "chigasaki",
        })
    }
}

/// One navigation step: a label, or alternative labels tried in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepQuery {
    One(String),
    AnyOf(Vec<String>),
}

impl StepQuery {
    /// Alternatives in priority order.
    pub fn alternatives(&self) -> Vec<String> {
        match self {
            StepQuery::One(s) => vec![s.clone()],
            StepQuery::AnyOf(v) => v.clone(),
        }
    }

    /// Human-readable label for logs and errors.
    pub fn label(&self) -> String {
        match self {
            StepQuery::One(s) => s.clone(),
            StepQuery::AnyOf(v) => v.join(" | "),
        }
    }

    fn is_usable(&self) -> bool {
        match self {
            StepQuery::One(s) => !s.trim().is_empty(),
            StepQuery::AnyOf(v) => v.iter().any(|s| !s.trim().is_empty()),
        }
    }
}

impl From<&str> for StepQuery {
    fn from(s: &str) -> Self {
        StepQuery::One(s.to_string())
    }
}

/// A configured facility page to check for availability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub name: String,
    pub url: String,
    /// CSS selector of the region holding the availability calendar.
    pub result_selector: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub kind: SiteKind,
    #[serde(default)]
    pub facility_path: Vec<StepQuery>,
    /// Municipality or operator; first component of a slot key.
    #[serde(default)]
    pub location: Option<String>,
    /// Facility name used in slot keys when it differs from `name`.
    #[serde(default)]
    pub facility: Option<String>,
    #[serde(default)]
    pub weekdays: Vec<Weekday>,
    /// Accepted time ranges (`HH:MM-HH:MM`). Empty accepts any.
    #[serde(default)]
    pub times: Vec<String>,
    /// Accepted court substrings. Empty accepts any.
    #[serde(default)]
    pub courts: Vec<String>,
    #[serde(default)]
    pub max_pages: Option<usize>,
}

impl Target {
    pub fn location(&self) -> &str {
        self.location.as_deref().unwrap_or(&self.name)
    }

    pub fn facility(&self) -> &str {
        self.facility.as_deref().unwrap_or(&self.name)
    }

    /// Configured days of week, defaulting to Sunday.
    pub fn weekdays(&self) -> Vec<Weekday> {
        if self.weekdays.is_empty() {
            vec![Weekday::Sun]
        } else {
            self.weekdays.clone()
        }
    }

    /// Configured keywords, or the default vacancy markers.
    pub fn keywords(&self) -> Vec<String> {
        let configured: Vec<String> = self
            .keywords
            .iter()
            .filter(|k| !k.trim().is_empty())
            .cloned()
            .collect();
        if configured.is_empty() {
            DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect()
        } else {
            configured
        }
    }

    fn validate(&self, index: usize) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::Invalid {
            index,
            reason: reason.to_string(),
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        if self.url.trim().is_empty() {
            return Err(invalid("url is empty"));
        }
        if self.result_selector.trim().is_empty() {
            return Err(invalid("resultSelector is empty"));
        }
        if let Some(pos) = self.facility_path.iter().position(|s| !s.is_usable()) {
            return Err(invalid(&format!("facilityPath step {pos} has no label")));
        }
        if self.max_pages == Some(0) {
            return Err(invalid("maxPages must be at least 1"));
        }
        Ok(())
    }
}

/// Read and validate the target file.
pub fn load_targets(path: &Path) -> Result<Vec<Target>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let targets = parse_targets(&raw).map_err(|e| match e {
        ParseFailure::Json(source) => ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        },
        ParseFailure::Config(e) => e,
    })?;
    info!(count = targets.len(), path = %path.display(), "loaded targets");
    Ok(targets)
}

enum ParseFailure {
    Json(serde_json::Error),
    Config(ConfigError),
}

fn parse_targets(raw: &str) -> Result<Vec<Target>, ParseFailure> {
    let value: serde_json::Value = serde_json::from_str(raw).map_err(ParseFailure::Json)?;
    let list = match value {
        serde_json::Value::Object(mut map) if map.contains_key("targets") => {
            map.remove("targets").unwrap_or_default()
        }
        other => other,
    };
    let targets: Vec<Target> = serde_json::from_value(list).map_err(ParseFailure::Json)?;
    if targets.is_empty() {
        return Err(ParseFailure::Config(ConfigError::Empty));
    }
    for (i, t) in targets.iter().enumerate() {
        t.validate(i).map_err(ParseFailure::Config)?;
    }
    Ok(targets)
}
