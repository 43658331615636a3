pub mod availability;
pub mod normalize;
pub mod scan;
pub mod slot;
pub mod target;

pub use availability::{DEFAULT_KEYWORDS, Detector, OpenSlot, is_open_on_target_days};
pub use normalize::normalize;
pub use scan::ScanResult;
pub use slot::NotifiedKey;
pub use target::{ConfigError, SiteKind, StepQuery, Target, load_targets};
