//! Store capabilities consumed by the contract engine and the lobby
//! state machine. Each owning store is one trait; the contract engine
//! additionally requires a serializable transaction entry point.

use async_trait::async_trait;

use crate::amount::Amount;
use crate::error::Result;
use crate::types::{
    BalanceSnapshot, Contract, Game, GameSession, LedgerEntry, Lobby, NewLedgerEntry, User,
};

/// Append-only ledger of balance-changing events.
#[async_trait]
pub trait LedgerStoreT: Send + Sync {
    /// Insert a single immutable row.
    async fn append(&self, entry: NewLedgerEntry) -> Result<LedgerEntry>;

    /// Insert a batch, all-or-nothing.
    async fn append_many(&self, entries: Vec<NewLedgerEntry>) -> Result<Vec<LedgerEntry>>;

    /// Per-user history, newest first, with the total row count.
    async fn history(
        &self,
        user_id: &str,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<LedgerEntry>, u64)>;

    /// All rows of one session, oldest first.
    async fn by_session(&self, session_id: &str) -> Result<Vec<LedgerEntry>>;
}

/// Per-user balance state.
#[async_trait]
pub trait UserStoreT: Send + Sync {
    async fn create_user(&self, user: &User) -> Result<()>;

    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>>;

    async fn find_by_ids(&self, user_ids: &[String]) -> Result<Vec<User>>;

    async fn find_by_external_auth_id(&self, external_auth_id: &str) -> Result<Option<User>>;

    async fn update_display_name(&self, user_id: &str, display_name: &str) -> Result<User>;

    /// Conditional balance update; fails with `ConcurrencyConflict`
    /// when the current row no longer matches `expected`. The only
    /// sanctioned balance mutation outside `with_txn`.
    async fn compare_and_update(
        &self,
        user_id: &str,
        expected: &BalanceSnapshot,
        new: &BalanceSnapshot,
    ) -> Result<User>;
}

/// Immutable-after-creation game and contract records.
#[async_trait]
pub trait CatalogStoreT: Send + Sync {
    async fn create_game(&self, game: &Game) -> Result<()>;

    async fn find_game(&self, game_id: &str) -> Result<Option<Game>>;

    async fn create_contract(&self, contract: &Contract) -> Result<()>;

    async fn find_contract(&self, contract_id: &str) -> Result<Option<Contract>>;

    async fn list_contracts(&self) -> Result<Vec<Contract>>;
}

#[async_trait]
pub trait SessionStoreT: Send + Sync {
    async fn find_session(&self, session_id: &str) -> Result<Option<GameSession>>;

    /// Non-terminal sessions with `expires_at` strictly before `now`.
    async fn find_expired_sessions(&self, now: u64) -> Result<Vec<GameSession>>;
}

#[async_trait]
pub trait LobbyStoreT: Send + Sync {
    async fn find_lobby(&self, lobby_id: &str) -> Result<Option<Lobby>>;

    async fn list_lobbies(&self, contract_id: Option<&str>) -> Result<Vec<Lobby>>;

    async fn find_open_lobby_for_user(&self, user_id: &str) -> Result<Option<Lobby>>;
}

/// Operations available inside a serializable transaction. The closure
/// passed to [`HubStorageT::with_txn`] is synchronous, so no network
/// I/O can happen while the transaction is open.
pub trait TxnT {
    fn find_user(&mut self, user_id: &str) -> Result<Option<User>>;

    fn find_user_by_external_auth_id(&mut self, external_auth_id: &str) -> Result<Option<User>>;

    /// Unconditional balance write, participating in the transaction.
    /// Enforces `locked <= balance`.
    fn update_balance(&mut self, user_id: &str, balance: &Amount, locked: &Amount) -> Result<()>;

    fn append_entry(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry>;

    fn find_contract(&mut self, contract_id: &str) -> Result<Option<Contract>>;

    fn insert_session(&mut self, session: &GameSession) -> Result<()>;

    fn find_session(&mut self, session_id: &str) -> Result<Option<GameSession>>;

    fn update_session(&mut self, session: &GameSession) -> Result<()>;

    /// Whether the user participates in any non-terminal session of
    /// the contract.
    fn has_open_session(&mut self, contract_id: &str, user_id: &str) -> Result<bool>;

    fn insert_lobby(&mut self, lobby: &Lobby) -> Result<()>;

    fn update_lobby(&mut self, lobby: &Lobby) -> Result<()>;

    fn find_lobby(&mut self, lobby_id: &str) -> Result<Option<Lobby>>;

    fn find_waiting_lobby(&mut self, contract_id: &str) -> Result<Option<Lobby>>;

    fn find_open_lobby_for_user(&mut self, user_id: &str) -> Result<Option<Lobby>>;

    fn find_lobby_by_session(&mut self, session_id: &str) -> Result<Option<Lobby>>;
}

/// The full storage capability handed to the contract engine.
#[async_trait]
pub trait HubStorageT:
    LedgerStoreT + UserStoreT + CatalogStoreT + SessionStoreT + LobbyStoreT + Send + Sync + 'static
{
    /// Run `f` inside one serializable transaction. Commits when `f`
    /// returns `Ok`, rolls back otherwise.
    async fn with_txn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn TxnT) -> Result<T> + Send + 'static;
}
