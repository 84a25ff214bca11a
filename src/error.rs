use thiserror::Error;

/// Failures of the fetch-and-extract pipeline.
///
/// Only `Auth` is fatal to a run; the others are recoverable at the
/// granularity of one listing page or one profile.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("login failed: {0}")]
    Auth(String),

    #[error("timed out fetching {url}")]
    Timeout { url: String },

    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("could not extract a profile from {url}: {reason}")]
    Extraction { url: String, reason: String },
}

impl ScrapeError {
    /// Classify a transport error for `url`.
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ScrapeError::Timeout {
                url: url.to_string(),
            }
        } else {
            ScrapeError::Fetch {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ScrapeError::Timeout { .. })
    }
}

/// Non-fatal diagnostics raised while processing one listing page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anomaly {
    /// The listing page contained no profile links.
    NoProfilesFound,
    /// None of the page's records carried an affinity value.
    NoAffinities,
}
