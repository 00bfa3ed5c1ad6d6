use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum HarvestError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Unexpected page content: {0}")]
    Parse(String),

    #[error("Page error: {0}")]
    PageError(String),

    #[error("DOM query exhausted after {attempts} attempts: {last_error}")]
    QueryExhausted { attempts: usize, last_error: String },

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Navigation to {url} failed: {reason}")]
    NavigationFailed { url: String, reason: String },

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("Browser session crashed: {0}")]
    SessionCrashed(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl HarvestError {
    /// Errors a fresh DOM query or wait has a chance of not hitting again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HarvestError::ElementNotFound(_)
                | HarvestError::Parse(_)
                | HarvestError::PageError(_)
                | HarvestError::Timeout(_)
        )
    }

    /// The browser behind the session is unusable and must be replaced.
    pub fn is_session_failure(&self) -> bool {
        matches!(
            self,
            HarvestError::BrowserLaunchFailed(_)
                | HarvestError::SessionCrashed(_)
                | HarvestError::NavigationFailed { .. }
        )
    }
}

impl From<std::io::Error> for HarvestError {
    fn from(err: std::io::Error) -> Self {
        HarvestError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for HarvestError {
    fn from(err: serde_json::Error) -> Self {
        HarvestError::Serialization(err.to_string())
    }
}

impl From<std::num::ParseIntError> for HarvestError {
    fn from(err: std::num::ParseIntError) -> Self {
        HarvestError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(HarvestError::ElementNotFound(".userReview".into()).is_retryable());
        assert!(HarvestError::Timeout(Duration::from_secs(40)).is_retryable());
        assert!(!HarvestError::Validation("skip".into()).is_retryable());
        assert!(!HarvestError::QueryExhausted { attempts: 5, last_error: "x".into() }.is_retryable());
    }

    #[test]
    fn test_session_failure_classification() {
        assert!(HarvestError::SessionCrashed("handler ended".into()).is_session_failure());
        assert!(HarvestError::NavigationFailed { url: "u".into(), reason: "r".into() }
            .is_session_failure());
        assert!(!HarvestError::Parse("year".into()).is_session_failure());
    }

    #[test]
    fn test_query_exhausted_message() {
        let err = HarvestError::QueryExhausted { attempts: 5, last_error: "no .pagesFromTo".into() };
        assert_eq!(err.to_string(), "DOM query exhausted after 5 attempts: no .pagesFromTo");
    }
}
