/// Page state definitions for tracking crawl progress
///
/// A page moves from `Pending` to exactly one terminal state and never back.
use std::fmt;
use std::str::FromStr;

/// Represents the current state of a page in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageState {
    /// Registered with a zero-size placeholder, waiting to be rendered
    Pending,

    /// Rendered HTML is stored in the ledger
    Downloaded,

    /// A failure record exists; the page is never fetched again
    Failed,
}

impl PageState {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Returns true if a transition from `self` to `next` is allowed
    ///
    /// Only `Pending -> Downloaded` and `Pending -> Failed` are valid.
    pub fn can_transition_to(&self, next: PageState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Downloaded) | (Self::Pending, Self::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloaded => "downloaded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reason tag recorded with a permanent failure
///
/// The tag strings are the ones written into `FAILED/<hash>` records.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FailureReason {
    NotFound,
    Forbidden,
    RateLimited,
    ServerError,
    BadGateway,
    Unavailable,
    /// The rendered document was too short to be a real page
    EmptyResponse,
    /// Binary or non-HTML asset, never rendered
    SkippedBinary,
    /// Generic tag used by older ledgers
    DownloadError,
    /// Any tag this crate does not know, preserved verbatim
    Other(String),
}

impl FailureReason {
    pub fn as_str(&self) -> &str {
        match self {
            Self::NotFound => "404_not_found",
            Self::Forbidden => "403_forbidden",
            Self::RateLimited => "429_rate_limited",
            Self::ServerError => "500_server_error",
            Self::BadGateway => "502_bad_gateway",
            Self::Unavailable => "503_unavailable",
            Self::EmptyResponse => "empty_response",
            Self::SkippedBinary => "skipped_binary",
            Self::DownloadError => "download_error",
            Self::Other(tag) => tag,
        }
    }

    /// Returns true for failures inferred from an HTTP-status-like page
    pub fn is_http_status(&self) -> bool {
        matches!(
            self,
            Self::NotFound
                | Self::Forbidden
                | Self::RateLimited
                | Self::ServerError
                | Self::BadGateway
                | Self::Unavailable
        )
    }
}

impl FailureReason {
    /// Parses a stored tag; unknown tags are kept as `Other`
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim() {
            "404_not_found" => Self::NotFound,
            "403_forbidden" => Self::Forbidden,
            "429_rate_limited" => Self::RateLimited,
            "500_server_error" => Self::ServerError,
            "502_bad_gateway" => Self::BadGateway,
            "503_unavailable" => Self::Unavailable,
            "empty_response" => Self::EmptyResponse,
            "skipped_binary" => Self::SkippedBinary,
            "download_error" => Self::DownloadError,
            other => Self::Other(other.to_string()),
        }
    }
}

impl FromStr for FailureReason {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_tag(s))
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_terminal() {
        assert!(!PageState::Pending.is_terminal());
        assert!(PageState::Downloaded.is_terminal());
        assert!(PageState::Failed.is_terminal());
    }

    #[test]
    fn test_transitions_are_monotone() {
        assert!(PageState::Pending.can_transition_to(PageState::Downloaded));
        assert!(PageState::Pending.can_transition_to(PageState::Failed));
        assert!(!PageState::Downloaded.can_transition_to(PageState::Pending));
        assert!(!PageState::Failed.can_transition_to(PageState::Pending));
        assert!(!PageState::Failed.can_transition_to(PageState::Downloaded));
        assert!(!PageState::Downloaded.can_transition_to(PageState::Failed));
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", PageState::Pending), "pending");
        assert_eq!(format!("{}", PageState::Downloaded), "downloaded");
    }

    #[test]
    fn test_reason_tags() {
        assert_eq!(FailureReason::NotFound.as_str(), "404_not_found");
        assert_eq!(FailureReason::RateLimited.as_str(), "429_rate_limited");
        assert_eq!(FailureReason::EmptyResponse.as_str(), "empty_response");
        assert_eq!(FailureReason::SkippedBinary.as_str(), "skipped_binary");
    }

    #[test]
    fn test_reason_parse_known_tags() {
        for reason in [
            FailureReason::NotFound,
            FailureReason::Forbidden,
            FailureReason::RateLimited,
            FailureReason::ServerError,
            FailureReason::BadGateway,
            FailureReason::Unavailable,
            FailureReason::EmptyResponse,
            FailureReason::SkippedBinary,
            FailureReason::DownloadError,
        ] {
            let parsed: FailureReason = reason.as_str().parse().unwrap();
            assert_eq!(parsed, reason);
        }
    }

    #[test]
    fn test_reason_parse_unknown_tag_preserved() {
        let parsed: FailureReason = "timeout_custom".parse().unwrap();
        assert_eq!(parsed, FailureReason::Other("timeout_custom".to_string()));
        assert_eq!(parsed.as_str(), "timeout_custom");
    }

    #[test]
    fn test_is_http_status() {
        assert!(FailureReason::Unavailable.is_http_status());
        assert!(!FailureReason::EmptyResponse.is_http_status());
        assert!(!FailureReason::SkippedBinary.is_http_status());
    }
}
