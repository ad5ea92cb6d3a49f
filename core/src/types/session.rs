use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::error::{Error, Result};
use crate::types::catalog::ContractId;
use crate::types::user::UserId;

pub type SessionId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Pending,
    Active,
    Settled,
    Cancelled,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "PENDING",
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Settled => "SETTLED",
            SessionStatus::Cancelled => "CANCELLED",
            SessionStatus::Expired => "EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(SessionStatus::Pending),
            "ACTIVE" => Ok(SessionStatus::Active),
            "SETTLED" => Ok(SessionStatus::Settled),
            "CANCELLED" => Ok(SessionStatus::Cancelled),
            "EXPIRED" => Ok(SessionStatus::Expired),
            _ => Err(Error::Storage(format!("Unknown session status: {}", s))),
        }
    }

    /// Terminal sessions are frozen; no further mutation is allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Settled | SessionStatus::Cancelled | SessionStatus::Expired
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPlayer {
    pub user_id: UserId,
    /// Recorded at lock time, never re-derived from the contract.
    pub amount_locked: Amount,
    pub is_winner: bool,
    pub win_amount: Amount,
}

impl SessionPlayer {
    pub fn new(user_id: &str, amount_locked: Amount) -> Self {
        Self {
            user_id: user_id.to_string(),
            amount_locked,
            is_winner: false,
            win_amount: Amount::zero(),
        }
    }
}

/// An escrow session from lock through settle, cancel or expiry.
/// Status is mutable; everything else is append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSession {
    pub id: SessionId,
    pub contract_id: ContractId,
    pub status: SessionStatus,
    pub total_pot: Amount,
    pub created_at: u64,
    pub expires_at: u64,
    pub settled_at: Option<u64>,
    pub players: Vec<SessionPlayer>,
}

impl GameSession {
    pub fn player(&self, user_id: &str) -> Option<&SessionPlayer> {
        self.players.iter().find(|p| p.user_id == user_id)
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }

    /// Guard for the Settle/Cancel/Expire transitions. Exactly one
    /// terminal transition can commit; later calls surface the
    /// distinguishing conflict error.
    pub fn ensure_open(&self) -> Result<()> {
        match self.status {
            SessionStatus::Pending | SessionStatus::Active => Ok(()),
            SessionStatus::Settled => Err(Error::AlreadySettled),
            SessionStatus::Cancelled | SessionStatus::Expired => Err(Error::InvalidState(
                format!("Session is {}", self.status.as_str()),
            )),
        }
    }
}
