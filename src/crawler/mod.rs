//! Crawler module for rendered page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - The renderer and tab allocator seams
//! - Per-domain frontier and crawler state machine
//! - Link extraction and scoping
//! - Classification of rendered pages
//! - Batch scheduling and overall crawl coordination

mod classifier;
mod coordinator;
mod domain;
mod fetcher;
mod frontier;
mod parser;
mod renderer;
mod scheduler;

pub use classifier::{classify, head_title, Classification};
pub use coordinator::{open_study, run_crawl, CrawlPlan};
pub use domain::{CrawlOptions, DomainCrawler};
pub use fetcher::{render_page, wait_until_ready, FetchOutcome, RenderTiming, RenderedPage};
pub use frontier::Frontier;
pub use parser::{collect_links, extract_hrefs, resolve_link, static_links, LinkScope};
pub use renderer::{ReadyState, RenderError, RenderResult, Renderer, TabAllocator};
pub use scheduler::{partition, Batch};
