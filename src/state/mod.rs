//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `PageState`: Pending, Downloaded or Failed for a single content address
//! - `FailureReason`: the taxonomy tag stored with a permanent failure
//! - `DomainState`: per-domain counters, request spacing and lifecycle phase

mod domain_state;
mod page_state;

// Re-export main types
pub use domain_state::{CrawlPhase, DomainState};
pub use page_state::{FailureReason, PageState};
