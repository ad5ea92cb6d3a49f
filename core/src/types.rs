mod catalog;
mod ledger;
mod lobby;
mod params;
mod session;
mod user;

pub use catalog::{Contract, ContractId, Game, GameId};

pub use ledger::{EntryId, EntryKind, LedgerEntry, NewLedgerEntry};

pub use lobby::{Lobby, LobbyEvent, LobbyFrame, LobbyId, LobbyPlayer, LobbyStatus};

pub use session::{GameSession, SessionId, SessionPlayer, SessionStatus};

pub use user::{
    validate_display_name, BalanceSnapshot, User, UserId, PLATFORM_ACCOUNT_ID,
};

pub use params::{
    BalanceResponse, CancelParams, CancelResponse, DepositParams, ExecuteParams,
    ExecuteResponse, HistoryPage, JoinLobbyParams, JoinLobbyResponse, LeaveLobbyResponse,
    LobbyDetail, LobbySummary, PlayerResult, SetDisplayNameParams, SettleParams,
    SettleResponse, WinnerPayout,
};
