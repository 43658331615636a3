//! Browser automation for reservation portals without automation hooks.
//!
//! [`Page`] is the seam between the engine and a concrete browser. On top of
//! it sit label-based element resolution ([`resolver`]), click-and-confirm
//! activation ([`ClickEngine`]), result pagination ([`Paginator`]) and the
//! per-site path walkers ([`site`]).
//!
//! The Chrome driver lives behind the `chromium` feature; the scripted
//! [`memory::MemoryPage`] used by tests behind `test-support`.

mod error;

pub mod engine;
pub mod page;
pub mod paginate;
pub mod resolver;
pub mod site;

#[cfg(feature = "chromium")]
pub mod chromium;

#[cfg(any(test, feature = "test-support"))]
pub mod memory;

pub use engine::{ClickEngine, Confirmation};
pub use error::BrowserError;
pub use page::{Activation, ContextId, ElementInfo, ElementRef, Page, TagAllowList};
pub use paginate::{NEXT_PERIOD_LABELS, Paginator};
pub use resolver::{Candidate, TieBreak};
pub use site::{SiteStrategy, strategy_for};
