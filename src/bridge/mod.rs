//! Browser bridge adapter
//!
//! Implements `TabAllocator` and `Renderer` over the bridge's HTTP command
//! API. Protocol payloads stay in this module; the crawler only sees the
//! traits.

mod agent;
mod client;

pub use agent::{agent_from_session, detect_agent_id, AGENT_ID_ENV};
pub use client::{BridgeClient, BridgeRenderer, BridgeTabAllocator};
