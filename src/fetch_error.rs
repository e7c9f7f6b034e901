use chrono::NaiveDate;

use crate::table::TableError;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Start date {start} is after end date {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
    #[error("Weather API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Weather API server error ({status})")]
    ServerError { status: u16 },
    #[error("Failed to decode weather response: {0}")]
    Decode(String),
    #[error("Failed to parse date/time: {0}")]
    DateTimeError(String),
    #[error("No observations returned for {start} to {end}")]
    EmptyResponse { start: NaiveDate, end: NaiveDate },
    #[error("Failed to write weather file: {0}")]
    Write(#[from] TableError),
}

impl FetchError {
    /// Transport failures, throttling, server errors and empty pages are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Request(_) => true,
            FetchError::ServerError { .. } => true,
            FetchError::Status { status, .. } => *status == 429,
            FetchError::EmptyResponse { .. } => true,
            _ => false,
        }
    }
}
