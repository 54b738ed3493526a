use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Authentication failed: {0}")]
    AuthenticationFailure(String),

    #[error("Malformed review block {index} for course '{course}': {reason}")]
    MalformedReviewBlock {
        course: String,
        index: usize,
        reason: String,
    },

    #[error("Couldn't fetch page {page} after {attempts} attempt(s): {reason}")]
    NetworkFailure {
        page: usize,
        attempts: u32,
        reason: String,
    },

    #[error("Malformed CSV row at line {line}: {reason}")]
    MalformedRow { line: u64, reason: String },

    #[error("The element you are trying to scrape for is missing: {0}")]
    MissingElement(String),
    #[error("Couldn't parse selector: {0}")]
    InvalidSelector(String),

    #[error("Environment variable {0} is not set")]
    MissingEnv(String),

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Csv Error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Tokio Join Error, couldn't await a task! {0}")]
    RuntimeJoin(#[from] tokio::task::JoinError),

    #[error("Reqwest Error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

impl Error {
    /// Errors that only invalidate a single review, row or page.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            Error::MalformedReviewBlock { .. }
                | Error::NetworkFailure { .. }
                | Error::MalformedRow { .. }
                | Error::MissingElement(_)
        )
    }
}
