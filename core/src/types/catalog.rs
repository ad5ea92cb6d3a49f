use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::error::{Error, Result};

pub type GameId = String;
pub type ContractId = String;

/// A registered game backend. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: GameId,
    pub name: String,
    /// One-way digest of the game's shared secret; the raw secret is
    /// never persisted.
    pub client_secret_digest: String,
    pub callback_url: Option<String>,
    pub is_active: bool,
    pub created_at: u64,
}

/// The economic rule template governing a class of matches.
/// Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub id: ContractId,
    pub game_id: GameId,
    pub name: String,
    pub entry_fee: Amount,
    /// Platform fee in basis points, at most 10000.
    pub platform_fee_bps: u32,
    pub min_players: u16,
    pub max_players: u16,
    pub ttl_seconds: u64,
    pub is_active: bool,
    pub created_at: u64,
}

impl Contract {
    pub fn validate(&self) -> Result<()> {
        if self.min_players < 1 {
            return Err(Error::validation_field("minPlayers", "Must be at least 1"));
        }
        if self.max_players < self.min_players {
            return Err(Error::validation_field(
                "maxPlayers",
                "Must be at least minPlayers",
            ));
        }
        if self.ttl_seconds == 0 {
            return Err(Error::validation_field("ttlSeconds", "Must be positive"));
        }
        if self.platform_fee_bps > 10_000 {
            return Err(Error::validation_field(
                "platformFeeBps",
                "Must be at most 10000",
            ));
        }
        Ok(())
    }
}
