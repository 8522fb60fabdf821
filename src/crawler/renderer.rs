//! Renderer and tab allocator contracts
//!
//! The crawler never talks to a browser directly. It drives a `Renderer`
//! handle obtained from a `TabAllocator`; the bridge module provides the HTTP
//! implementation and tests provide scripted ones.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Errors raised by a renderer or allocator
///
/// Every variant is transient from the crawler's point of view: the page that
/// triggered it stays pending and is retried on a later pass.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    /// The renderer endpoint could not be reached
    #[error("Renderer unreachable: {0}")]
    Transport(String),

    /// The renderer answered but reported a failure
    #[error("Renderer command '{action}' failed: {message}")]
    Command { action: String, message: String },

    /// The renderer answered with something that could not be understood
    #[error("Unexpected renderer response: {0}")]
    Protocol(String),

    /// No tab could be obtained for a domain
    #[error("Tab allocation failed for {domain}: {message}")]
    Allocation { domain: String, message: String },
}

/// Result type for renderer operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Document loading state as reported by the renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
    /// Any value the renderer returned that is not a known state
    Unknown(String),
}

impl ReadyState {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Parses a `document.readyState` value
    pub fn from_value(value: &str) -> Self {
        match value.trim() {
            "loading" => Self::Loading,
            "interactive" => Self::Interactive,
            "complete" => Self::Complete,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loading => f.write_str("loading"),
            Self::Interactive => f.write_str("interactive"),
            Self::Complete => f.write_str("complete"),
            Self::Unknown(value) => write!(f, "unknown({})", value),
        }
    }
}

/// An isolated browser tab the crawler can drive
#[async_trait]
pub trait Renderer: Send {
    /// Starts loading `url` in the tab
    async fn navigate(&mut self, url: &str) -> RenderResult<()>;

    /// Current document loading state
    async fn ready_state(&mut self) -> RenderResult<ReadyState>;

    /// Serialized DOM of the current document
    async fn html(&mut self) -> RenderResult<String>;

    /// Absolute `href` of every anchor in the current document
    async fn links(&mut self) -> RenderResult<Vec<String>>;
}

/// Hands out one renderer per domain and takes them back
#[async_trait]
pub trait TabAllocator: Send + Sync {
    /// Obtains a renderer dedicated to `domain`
    async fn allocate(&self, domain: &str) -> RenderResult<Box<dyn Renderer>>;

    /// Returns a renderer; its tab may be closed
    async fn release(&self, domain: &str, renderer: Box<dyn Renderer>);
}
