//! The contract engine and its surroundings: Execute/Settle/Cancel/
//! Expire orchestration, fee and prize arithmetic, the lobby state
//! machine, and the per-lobby event fan-out.

mod broadcast;
mod contract;
mod lobby;
mod prize;

pub use broadcast::LobbyBroadcaster;
pub use contract::ContractEngine;
pub use lobby::{LobbyManager, STARTING_COUNTDOWN_SECS};
pub use prize::{even_split, platform_fee};
