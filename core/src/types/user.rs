use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::error::{Error, Result};

pub type UserId = String;

/// Reserved account that accrues collected platform fees.
pub const PLATFORM_ACCOUNT_ID: &str = "platform";

const DISPLAY_NAME_PATTERN: &str = "^[A-Za-z0-9_-]{3,20}$";

pub fn validate_display_name(name: &str) -> Result<()> {
    let re = Regex::new(DISPLAY_NAME_PATTERN).expect("Display name pattern");
    if re.is_match(name) {
        Ok(())
    } else {
        Err(Error::validation_field(
            "displayName",
            "Display name must be 3-20 characters of [A-Za-z0-9_-]",
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub external_auth_id: String,
    pub display_name: String,
    pub balance: Amount,
    pub locked_balance: Amount,
    pub created_at: u64,
}

impl User {
    pub fn new<S: Into<String>>(
        id: S,
        external_auth_id: S,
        display_name: S,
        created_at: u64,
    ) -> Self {
        Self {
            id: id.into(),
            external_auth_id: external_auth_id.into(),
            display_name: display_name.into(),
            balance: Amount::zero(),
            locked_balance: Amount::zero(),
            created_at,
        }
    }

    /// `balance - lockedBalance`; the amount the user may spend.
    pub fn available_balance(&self) -> Amount {
        self.balance.saturating_sub(&self.locked_balance)
    }

    pub fn snapshot(&self) -> BalanceSnapshot {
        BalanceSnapshot {
            balance: self.balance.clone(),
            locked: self.locked_balance.clone(),
        }
    }
}

/// The (total, locked) pair used by conditional balance updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
    pub balance: Amount,
    pub locked: Amount,
}
