use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::catalog::ContractId;
use crate::types::session::SessionId;
use crate::types::user::UserId;

pub type LobbyId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LobbyStatus {
    Waiting,
    Starting,
    InGame,
    Closed,
}

impl LobbyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LobbyStatus::Waiting => "WAITING",
            LobbyStatus::Starting => "STARTING",
            LobbyStatus::InGame => "IN_GAME",
            LobbyStatus::Closed => "CLOSED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "WAITING" => Ok(LobbyStatus::Waiting),
            "STARTING" => Ok(LobbyStatus::Starting),
            "IN_GAME" => Ok(LobbyStatus::InGame),
            "CLOSED" => Ok(LobbyStatus::Closed),
            _ => Err(Error::Storage(format!("Unknown lobby status: {}", s))),
        }
    }

    /// A user may sit in at most one open lobby at a time.
    pub fn is_open(&self) -> bool {
        !matches!(self, LobbyStatus::Closed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyPlayer {
    pub user_id: UserId,
    pub display_name: String,
    pub joined_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lobby {
    pub id: LobbyId,
    pub contract_id: ContractId,
    pub status: LobbyStatus,
    pub created_at: u64,
    pub session_id: Option<SessionId>,
    pub players: Vec<LobbyPlayer>,
}

impl Lobby {
    pub fn contains(&self, user_id: &str) -> bool {
        self.players.iter().any(|p| p.user_id == user_id)
    }

    pub fn position_of(&self, user_id: &str) -> Option<u16> {
        self.players
            .iter()
            .position(|p| p.user_id == user_id)
            .map(|i| i as u16)
    }
}

/// A typed event delivered to lobby subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum LobbyEvent {
    PlayerJoined { player: LobbyPlayer },
    PlayerLeft { player_id: UserId },
    LobbyStarting { countdown: u32 },
    GameStarted { session_id: SessionId },
    LobbyClosed { reason: String },
}

/// A frame on a lobby broadcast channel. Heartbeats keep long-lived
/// connections healthy and never signal a state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "camelCase")]
pub enum LobbyFrame {
    #[serde(rename_all = "camelCase")]
    Event {
        lobby_id: LobbyId,
        event: LobbyEvent,
        timestamp: u64,
    },
    #[serde(rename_all = "camelCase")]
    Heartbeat { lobby_id: LobbyId, timestamp: u64 },
}
