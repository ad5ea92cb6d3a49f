use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::error::{Error, Result};
use crate::types::session::SessionId;
use crate::types::user::UserId;

pub type EntryId = String;

/// The kind of a balance-changing event. LOCK and UNLOCK shift funds
/// between available and locked without touching the total; the rest
/// change the total balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    Lock,
    Unlock,
    Win,
    Lose,
    Fee,
    Deposit,
    Withdraw,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Lock => "LOCK",
            EntryKind::Unlock => "UNLOCK",
            EntryKind::Win => "WIN",
            EntryKind::Lose => "LOSE",
            EntryKind::Fee => "FEE",
            EntryKind::Deposit => "DEPOSIT",
            EntryKind::Withdraw => "WITHDRAW",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "LOCK" => Ok(EntryKind::Lock),
            "UNLOCK" => Ok(EntryKind::Unlock),
            "WIN" => Ok(EntryKind::Win),
            "LOSE" => Ok(EntryKind::Lose),
            "FEE" => Ok(EntryKind::Fee),
            "DEPOSIT" => Ok(EntryKind::Deposit),
            "WITHDRAW" => Ok(EntryKind::Withdraw),
            _ => Err(Error::Storage(format!("Unknown ledger entry kind: {}", s))),
        }
    }
}

/// An immutable row of the append-only ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: EntryId,
    pub user_id: UserId,
    pub kind: EntryKind,
    pub amount: Amount,
    pub balance_after: Amount,
    pub session_id: Option<SessionId>,
    pub description: Option<String>,
    pub created_at: u64,
}

/// A ledger row before the store assigns its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub user_id: UserId,
    pub kind: EntryKind,
    pub amount: Amount,
    pub balance_after: Amount,
    pub session_id: Option<SessionId>,
    pub description: Option<String>,
    pub created_at: u64,
}

impl NewLedgerEntry {
    pub fn new(
        user_id: &str,
        kind: EntryKind,
        amount: Amount,
        balance_after: Amount,
        created_at: u64,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            kind,
            amount,
            balance_after,
            session_id: None,
            description: None,
            created_at,
        }
    }

    pub fn with_session(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }
}
