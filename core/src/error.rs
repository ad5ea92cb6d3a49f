use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amount::Amount;

/// Discriminator carried by `NOT_FOUND` errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Resource {
    User,
    Game,
    Contract,
    Session,
    Lobby,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Resource::User => "User",
            Resource::Game => "Game",
            Resource::Contract => "Contract",
            Resource::Session => "Session",
            Resource::Lobby => "Lobby",
        };
        write!(f, "{}", s)
    }
}

/// The closed error taxonomy of the hub. Every operation documents the
/// subset of kinds it may produce; nothing outside this enum crosses
/// the API boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Error {
    #[error("Missing credential")]
    Unauthorized,

    #[error("Invalid bearer token")]
    InvalidToken,

    #[error("Invalid request signature")]
    InvalidSignature,

    #[error("Forbidden")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(Resource),

    #[error("Insufficient funds, required: {required}, available: {available}")]
    InsufficientFunds { required: Amount, available: Amount },

    #[error("Session already settled")]
    AlreadySettled,

    #[error("Player already in a lobby")]
    AlreadyInLobby,

    #[error("Display name taken: {0}")]
    DisplayNameTaken(String),

    #[error("Duplicated execution")]
    DuplicateExecution,

    #[error("Concurrent update conflict")]
    ConcurrencyConflict,

    #[error("Lobby is full")]
    LobbyFull,

    #[error("Lobby is not ready")]
    LobbyNotReady,

    #[error("Session expired")]
    SessionExpired,

    #[error("Game not active")]
    GameNotActive,

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        details: HashMap<String, String>,
    },

    #[error("Error in storage interaction: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Error::Validation {
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn validation_field<S: Into<String>>(field: &str, message: S) -> Self {
        let message = message.into();
        Error::Validation {
            message: message.clone(),
            details: HashMap::from([(field.to_string(), message)]),
        }
    }

    /// Stable wire code.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Unauthorized => "UNAUTHORIZED",
            Error::InvalidToken => "INVALID_TOKEN",
            Error::InvalidSignature => "INVALID_SIGNATURE",
            Error::Forbidden => "FORBIDDEN",
            Error::NotFound(_) => "NOT_FOUND",
            Error::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Error::AlreadySettled => "ALREADY_SETTLED",
            Error::AlreadyInLobby => "ALREADY_IN_LOBBY",
            Error::DisplayNameTaken(_) => "DISPLAY_NAME_TAKEN",
            Error::DuplicateExecution => "DUPLICATE_EXECUTION",
            Error::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            Error::LobbyFull => "LOBBY_FULL",
            Error::LobbyNotReady => "LOBBY_NOT_READY",
            Error::SessionExpired => "SESSION_EXPIRED",
            Error::GameNotActive => "GAME_NOT_ACTIVE",
            Error::InvalidState(_) => "INVALID_STATE",
            Error::Validation { .. } => "VALIDATION_ERROR",
            Error::Storage(_) | Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP-equivalent status for the wire envelope.
    pub fn status(&self) -> u16 {
        match self {
            Error::Unauthorized | Error::InvalidToken | Error::InvalidSignature => 401,
            Error::Forbidden => 403,
            Error::NotFound(_) => 404,
            Error::InsufficientFunds { .. } => 402,
            Error::AlreadySettled
            | Error::AlreadyInLobby
            | Error::DisplayNameTaken(_)
            | Error::DuplicateExecution
            | Error::ConcurrencyConflict => 409,
            Error::LobbyFull
            | Error::LobbyNotReady
            | Error::SessionExpired
            | Error::GameNotActive
            | Error::InvalidState(_) => 422,
            Error::Validation { .. } => 400,
            Error::Storage(_) | Error::Internal(_) => 500,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::validation(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
