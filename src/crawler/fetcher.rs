//! Page rendering through a `Renderer`
//!
//! This module handles one page load on a renderer handle:
//! - Navigating the tab
//! - Polling the document ready state up to a bounded timeout
//! - Waiting a settle delay for late scripts
//! - Reading back the serialized DOM and the anchor list

use crate::config::CrawlerSettings;
use crate::crawler::renderer::{RenderError, RenderResult, Renderer};
use crate::state::FailureReason;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Result of processing one frontier entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The frontier had nothing to offer
    Empty,

    /// The entry was already downloaded or failed
    Skipped,

    /// The page was rendered, classified as a success and stored
    Downloaded {
        /// Size of the rendered document
        bytes: usize,
        /// Links admitted to the ledger for the first time
        new_links: usize,
    },

    /// The page is permanently failed
    Failed(FailureReason),

    /// The renderer failed; the entry stays pending
    Retryable(RenderError),
}

impl FetchOutcome {
    /// Returns true if the ledger moved forward
    ///
    /// Only a download or a permanent failure counts; retryable errors and
    /// skips do not.
    pub fn is_progress(&self) -> bool {
        matches!(self, Self::Downloaded { .. } | Self::Failed(_))
    }
}

/// Waits used while loading a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTiming {
    pub poll_interval: Duration,
    pub ready_timeout: Duration,
    pub settle_delay: Duration,
}

impl RenderTiming {
    pub fn from_settings(settings: &CrawlerSettings) -> Self {
        Self {
            poll_interval: settings.ready_poll_interval(),
            ready_timeout: settings.ready_timeout(),
            settle_delay: settings.settle_delay(),
        }
    }

    /// No waiting at all; one readiness poll then read
    pub fn immediate() -> Self {
        Self {
            poll_interval: Duration::ZERO,
            ready_timeout: Duration::ZERO,
            settle_delay: Duration::ZERO,
        }
    }
}

/// A rendered document and its live anchor list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub html: String,
    pub links: Vec<String>,
}

/// Polls the ready state until `complete` or until the timeout elapses
///
/// Poll errors are ignored; the page is read anyway once the timeout is
/// reached.
///
/// # Returns
///
/// true if `complete` was observed, false on timeout
pub async fn wait_until_ready(renderer: &mut dyn Renderer, timing: &RenderTiming) -> bool {
    let deadline = Instant::now() + timing.ready_timeout;

    loop {
        match renderer.ready_state().await {
            Ok(state) if state.is_complete() => return true,
            Ok(state) => tracing::trace!("Document state: {}", state),
            Err(e) => tracing::debug!("Ready state poll failed: {}", e),
        }

        if Instant::now() >= deadline {
            return false;
        }

        sleep(timing.poll_interval).await;
    }
}

/// Loads a URL and reads the rendered document
///
/// # Arguments
///
/// * `renderer` - The tab to drive
/// * `url` - Canonical URL to load
/// * `timing` - Poll interval, readiness timeout and settle delay
///
/// # Returns
///
/// * `Ok(RenderedPage)` - The serialized DOM and its anchors
/// * `Err(RenderError)` - Navigation or DOM read failed
pub async fn render_page(
    renderer: &mut dyn Renderer,
    url: &str,
    timing: &RenderTiming,
) -> RenderResult<RenderedPage> {
    renderer.navigate(url).await?;

    if !wait_until_ready(renderer, timing).await {
        tracing::debug!(
            "{} not complete after {:?}, reading anyway",
            url,
            timing.ready_timeout
        );
    }

    if !timing.settle_delay.is_zero() {
        sleep(timing.settle_delay).await;
    }

    let html = renderer.html().await?;

    // The static scan still runs on the HTML, so a missing anchor list only
    // loses script-generated links.
    let links = match renderer.links().await {
        Ok(links) => links,
        Err(e) => {
            tracing::warn!("Could not read anchors of {}: {}", url, e);
            Vec::new()
        }
    };

    Ok(RenderedPage { html, links })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::renderer::ReadyState;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    /// Renderer replaying a fixed sequence of ready states
    struct ScriptedRenderer {
        states: VecDeque<RenderResult<ReadyState>>,
        navigated: Vec<String>,
        polls: usize,
        fail_navigate: bool,
        fail_links: bool,
    }

    impl ScriptedRenderer {
        fn new(states: Vec<RenderResult<ReadyState>>) -> Self {
            Self {
                states: states.into(),
                navigated: Vec::new(),
                polls: 0,
                fail_navigate: false,
                fail_links: false,
            }
        }
    }

    #[async_trait]
    impl Renderer for ScriptedRenderer {
        async fn navigate(&mut self, url: &str) -> RenderResult<()> {
            if self.fail_navigate {
                return Err(RenderError::Transport("connection refused".to_string()));
            }
            self.navigated.push(url.to_string());
            Ok(())
        }

        async fn ready_state(&mut self) -> RenderResult<ReadyState> {
            self.polls += 1;
            self.states
                .pop_front()
                .unwrap_or(Ok(ReadyState::Loading))
        }

        async fn html(&mut self) -> RenderResult<String> {
            Ok("<html><body>rendered</body></html>".to_string())
        }

        async fn links(&mut self) -> RenderResult<Vec<String>> {
            if self.fail_links {
                return Err(RenderError::Protocol("bad value".to_string()));
            }
            Ok(vec!["https://www.example.com/next".to_string()])
        }
    }

    fn fast_timing() -> RenderTiming {
        RenderTiming {
            poll_interval: Duration::from_millis(1),
            ready_timeout: Duration::from_millis(50),
            settle_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_progress_outcomes() {
        assert!(FetchOutcome::Downloaded { bytes: 1, new_links: 0 }.is_progress());
        assert!(FetchOutcome::Failed(FailureReason::NotFound).is_progress());
        assert!(!FetchOutcome::Empty.is_progress());
        assert!(!FetchOutcome::Skipped.is_progress());
        assert!(!FetchOutcome::Retryable(RenderError::Transport("x".into())).is_progress());
    }

    #[tokio::test]
    async fn test_ready_after_polls() {
        let mut renderer = ScriptedRenderer::new(vec![
            Ok(ReadyState::Loading),
            Err(RenderError::Transport("blip".to_string())),
            Ok(ReadyState::Interactive),
            Ok(ReadyState::Complete),
        ]);

        assert!(wait_until_ready(&mut renderer, &fast_timing()).await);
        assert_eq!(renderer.polls, 4);
    }

    #[tokio::test]
    async fn test_timeout_proceeds() {
        let mut renderer = ScriptedRenderer::new(Vec::new());
        assert!(!wait_until_ready(&mut renderer, &fast_timing()).await);
        assert!(renderer.polls >= 1);
    }

    #[tokio::test]
    async fn test_immediate_timing_polls_once() {
        let mut renderer = ScriptedRenderer::new(Vec::new());
        assert!(!wait_until_ready(&mut renderer, &RenderTiming::immediate()).await);
        assert_eq!(renderer.polls, 1);
    }

    #[tokio::test]
    async fn test_render_page_reads_html_and_links() {
        let mut renderer = ScriptedRenderer::new(vec![Ok(ReadyState::Complete)]);
        let page = render_page(&mut renderer, "https://www.example.com/", &fast_timing())
            .await
            .unwrap();

        assert_eq!(renderer.navigated, vec!["https://www.example.com/"]);
        assert!(page.html.contains("rendered"));
        assert_eq!(page.links, vec!["https://www.example.com/next"]);
    }

    #[tokio::test]
    async fn test_navigate_error_propagates() {
        let mut renderer = ScriptedRenderer::new(Vec::new());
        renderer.fail_navigate = true;

        let result = render_page(&mut renderer, "https://www.example.com/", &fast_timing()).await;
        assert!(matches!(result, Err(RenderError::Transport(_))));
    }

    #[tokio::test]
    async fn test_links_error_is_not_fatal() {
        let mut renderer = ScriptedRenderer::new(vec![Ok(ReadyState::Complete)]);
        renderer.fail_links = true;

        let page = render_page(&mut renderer, "https://www.example.com/", &fast_timing())
            .await
            .unwrap();
        assert!(page.links.is_empty());
    }
}
