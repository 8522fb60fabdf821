//! Agent identity detection
//!
//! Several agents may share one browser through the bridge. The identity only
//! labels the tabs an agent opens; it is taken, in order, from the command
//! line, the `AGENT_ID` environment variable, then the name of the tmux
//! session the crawler runs in.

use std::process::Command;

/// Environment variable holding the agent identity
pub const AGENT_ID_ENV: &str = "AGENT_ID";

/// tmux session prefixes, longest first
const SESSION_PREFIXES: &[&str] = &["ma-agent-", "agent-"];

/// Resolves the agent identity
///
/// # Arguments
///
/// * `flag` - Value of `--agent-id`, if given
///
/// # Returns
///
/// The first non-empty identity found, or None
pub fn detect_agent_id(flag: Option<&str>) -> Option<String> {
    let from_env = std::env::var(AGENT_ID_ENV).ok();
    resolve_agent_id(flag, from_env.as_deref(), tmux_session_name)
}

fn resolve_agent_id<F>(flag: Option<&str>, env: Option<&str>, session: F) -> Option<String>
where
    F: FnOnce() -> Option<String>,
{
    non_empty(flag)
        .or_else(|| non_empty(env))
        .or_else(|| session().as_deref().and_then(agent_from_session))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Extracts the identity from a session name such as `ma-agent-7`
pub fn agent_from_session(session: &str) -> Option<String> {
    let session = session.trim();
    SESSION_PREFIXES
        .iter()
        .find_map(|prefix| session.strip_prefix(prefix))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Name of the enclosing tmux session, if any
fn tmux_session_name() -> Option<String> {
    std::env::var_os("TMUX")?;

    let output = Command::new("tmux")
        .args(["display-message", "-p", "#S"])
        .output()
        .ok()?;

    if !output.status.success() {
        tracing::debug!("tmux display-message exited with {}", output.status);
        return None;
    }

    String::from_utf8(output.stdout).ok()
}
