use joke_market_allocation::AllocationError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{BatchId, JokeId, ParticipantId, RoundId, TeamId};

/// Every way an engine operation can be rejected. A rejected operation never
/// leaves partial state behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),
    #[error("round {0} is not active")]
    RoundNotActive(RoundId),
    #[error("round {0} has already been started and can no longer be configured or started")]
    RoundNotConfigured(RoundId),
    #[error("round {0} is still active, end it first")]
    AnotherRoundActive(RoundId),
    #[error("batch {0} has already been rated")]
    BatchAlreadyRated(BatchId),
    #[error("joke {0} is already bought")]
    AlreadyBought(JokeId),
    #[error("joke {0} has already been returned")]
    AlreadyReturned(JokeId),
    #[error("joke {0} has not been bought yet")]
    NotBoughtYet(JokeId),
    #[error("the name {0:?} is already taken")]
    NameTaken(String),
    #[error("no budget left")]
    InsufficientBudget,
    #[error("participant {0} is an instructor and cannot be changed or removed")]
    InstructorProtected(ParticipantId),
    #[error("only {0} may do this")]
    Forbidden(&'static str),
    #[error("participant {0} not found")]
    ParticipantNotFound(ParticipantId),
    #[error("team {0} not found")]
    TeamNotFound(TeamId),
    #[error("round {0} not found")]
    RoundNotFound(RoundId),
    #[error("batch {0} not found")]
    BatchNotFound(BatchId),
    #[error("joke {0} is not on the market")]
    JokeNotFound(JokeId),
    #[error("your session is no longer known, please join again")]
    SessionLost,
}

impl From<AllocationError> for EngineError {
    fn from(value: AllocationError) -> Self {
        Self::Validation(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    Authorization,
    NotFound,
    SessionLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Validation,
    RoundNotActive,
    RoundNotConfigured,
    AnotherRoundActive,
    BatchAlreadyRated,
    AlreadyBought,
    AlreadyReturned,
    NotBoughtYet,
    NameTaken,
    InsufficientBudget,
    InstructorProtected,
    Forbidden,
    NotFound,
    SessionLost,
}

impl ErrorCode {
    #[must_use]
    pub const fn kind(self) -> ErrorKind {
        match self {
            Self::Validation => ErrorKind::Validation,
            Self::RoundNotActive
            | Self::RoundNotConfigured
            | Self::AnotherRoundActive
            | Self::BatchAlreadyRated
            | Self::AlreadyBought
            | Self::AlreadyReturned
            | Self::NotBoughtYet
            | Self::NameTaken
            | Self::InsufficientBudget
            | Self::InstructorProtected => ErrorKind::Conflict,
            Self::Forbidden => ErrorKind::Authorization,
            Self::NotFound => ErrorKind::NotFound,
            Self::SessionLost => ErrorKind::SessionLost,
        }
    }
}

impl EngineError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::Validation,
            Self::RoundNotActive(_) => ErrorCode::RoundNotActive,
            Self::RoundNotConfigured(_) => ErrorCode::RoundNotConfigured,
            Self::AnotherRoundActive(_) => ErrorCode::AnotherRoundActive,
            Self::BatchAlreadyRated(_) => ErrorCode::BatchAlreadyRated,
            Self::AlreadyBought(_) => ErrorCode::AlreadyBought,
            Self::AlreadyReturned(_) => ErrorCode::AlreadyReturned,
            Self::NotBoughtYet(_) => ErrorCode::NotBoughtYet,
            Self::NameTaken(_) => ErrorCode::NameTaken,
            Self::InsufficientBudget => ErrorCode::InsufficientBudget,
            Self::InstructorProtected(_) => ErrorCode::InstructorProtected,
            Self::Forbidden(_) => ErrorCode::Forbidden,
            Self::ParticipantNotFound(_)
            | Self::TeamNotFound(_)
            | Self::RoundNotFound(_)
            | Self::BatchNotFound(_)
            | Self::JokeNotFound(_) => ErrorCode::NotFound,
            Self::SessionLost => ErrorCode::SessionLost,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.code().kind()
    }
}

/// Wire form of a rejection: a machine readable code plus a message that can
/// be shown to the acting user as is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code:?}: {message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub message: String,
}

impl From<&EngineError> for ApiError {
    fn from(value: &EngineError) -> Self {
        Self {
            kind: value.kind(),
            code: value.code(),
            message: value.to_string(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(value: EngineError) -> Self {
        Self::from(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_kinds() {
        assert_eq!(
            EngineError::BatchAlreadyRated(BatchId(1)).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(EngineError::Forbidden("instructors").kind(), ErrorKind::Authorization);
        assert_eq!(EngineError::JokeNotFound(JokeId(3)).code(), ErrorCode::NotFound);
        assert_eq!(EngineError::SessionLost.kind(), ErrorKind::SessionLost);
    }

    #[test]
    fn wire_form_is_screaming_code_plus_message() {
        let api = ApiError::from(EngineError::AlreadyBought(JokeId(7)));
        let json = serde_json::to_value(&api).unwrap();
        assert_eq!(json["code"], "ALREADY_BOUGHT");
        assert_eq!(json["kind"], "conflict");
        assert_eq!(json["message"], "joke 7 is already bought");
    }
}
