use thiserror::Error;

pub type Result<T> = core::result::Result<T, ScrapeError>;

/// Failures raised while driving the portal or loading reference data.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("result table did not appear: {0}")]
    Timeout(String),

    #[error("unexpected row shape: {0}")]
    Parse(String),

    #[error("could not load reference data: {0}")]
    DataLoad(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScrapeError {
    /// True when the failure only affects one (HS code, year) unit and the
    /// caller should move on to the next one.
    pub fn is_unit_local(&self) -> bool {
        matches!(
            self,
            ScrapeError::Navigation(_) | ScrapeError::Timeout(_) | ScrapeError::Http(_)
        )
    }
}

impl From<tokio::time::error::Elapsed> for ScrapeError {
    fn from(value: tokio::time::error::Elapsed) -> Self {
        ScrapeError::Timeout(value.to_string())
    }
}
