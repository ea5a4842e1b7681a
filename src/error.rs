// Error taxonomy for the race engine
//
// Library code returns `RallyError`; binaries wrap it in `anyhow` at the edges.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RallyError {
    /// No track reference data, so a race cannot start
    #[error("no tracks available: seed track reference data before racing")]
    EmptyTrackSet,

    #[error("track {0} does not exist")]
    UnknownTrack(i64),

    /// Team (or its wallet) is missing
    #[error("team {0} does not exist or has no wallet")]
    UnknownTeam(i64),

    /// Malformed registration or configuration input
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("storage failure: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("seed file error: {0}")]
    Seed(#[from] csv::Error),
}

impl RallyError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        RallyError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// True for errors caused by caller input rather than storage
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RallyError::Validation { .. }
                | RallyError::UnknownTeam(_)
                | RallyError::UnknownTrack(_)
                | RallyError::EmptyTrackSet
        )
    }
}

pub type Result<T> = std::result::Result<T, RallyError>;
