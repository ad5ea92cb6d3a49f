//! SQLite-backed implementation of the hub stores.
//!
//! One connection guarded by a mutex backs every store; the contract
//! engine's serializable sections run as real SQL transactions taken
//! under that lock, so Execute/Settle/Cancel serialize against each
//! other and against every other mutation.

pub mod db;

use std::sync::Arc;

use async_trait::async_trait;
use pluto_core::amount::Amount;
use pluto_core::clock::current_timestamp;
use pluto_core::error::{Error, Result};
use pluto_core::storage::{
    CatalogStoreT, HubStorageT, LedgerStoreT, LobbyStoreT, SessionStoreT, TxnT, UserStoreT,
};
use pluto_core::types::{
    validate_display_name, BalanceSnapshot, Contract, Game, GameSession, LedgerEntry, Lobby,
    NewLedgerEntry, User, PLATFORM_ACCOUNT_ID,
};
use rusqlite::{Connection, TransactionBehavior};
use tokio::sync::Mutex;

pub struct HubStorage {
    conn: Arc<Mutex<Connection>>,
}

impl HubStorage {
    pub fn try_new(db_file_path: &str) -> Result<Self> {
        let conn =
            Connection::open(db_file_path).map_err(|e| Error::Storage(e.to_string()))?;
        Self::init(conn)
    }

    pub fn try_new_mem() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::Storage(e.to_string()))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        db::prepare_all_tables(&conn)?;
        if db::read_user(&conn, PLATFORM_ACCOUNT_ID)?.is_none() {
            let platform = User::new(
                PLATFORM_ACCOUNT_ID,
                PLATFORM_ACCOUNT_ID,
                PLATFORM_ACCOUNT_ID,
                current_timestamp(),
            );
            db::create_user(&conn, &platform)?;
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

struct SqliteTxn<'a> {
    txn: rusqlite::Transaction<'a>,
}

impl TxnT for SqliteTxn<'_> {
    fn find_user(&mut self, user_id: &str) -> Result<Option<User>> {
        db::read_user(&self.txn, user_id)
    }

    fn find_user_by_external_auth_id(&mut self, external_auth_id: &str) -> Result<Option<User>> {
        db::read_user_by_external_auth_id(&self.txn, external_auth_id)
    }

    fn update_balance(&mut self, user_id: &str, balance: &Amount, locked: &Amount) -> Result<()> {
        db::update_user_balance(&self.txn, user_id, balance, locked)
    }

    fn append_entry(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry> {
        db::insert_ledger_entry(&self.txn, &entry)
    }

    fn find_contract(&mut self, contract_id: &str) -> Result<Option<Contract>> {
        db::read_contract(&self.txn, contract_id)
    }

    fn insert_session(&mut self, session: &GameSession) -> Result<()> {
        db::insert_session(&self.txn, session)
    }

    fn find_session(&mut self, session_id: &str) -> Result<Option<GameSession>> {
        db::read_session(&self.txn, session_id)
    }

    fn update_session(&mut self, session: &GameSession) -> Result<()> {
        db::update_session(&self.txn, session)
    }

    fn has_open_session(&mut self, contract_id: &str, user_id: &str) -> Result<bool> {
        db::has_open_session(&self.txn, contract_id, user_id)
    }

    fn insert_lobby(&mut self, lobby: &Lobby) -> Result<()> {
        db::insert_lobby(&self.txn, lobby)
    }

    fn update_lobby(&mut self, lobby: &Lobby) -> Result<()> {
        db::update_lobby(&self.txn, lobby)
    }

    fn find_lobby(&mut self, lobby_id: &str) -> Result<Option<Lobby>> {
        db::read_lobby(&self.txn, lobby_id)
    }

    fn find_waiting_lobby(&mut self, contract_id: &str) -> Result<Option<Lobby>> {
        db::find_waiting_lobby(&self.txn, contract_id)
    }

    fn find_open_lobby_for_user(&mut self, user_id: &str) -> Result<Option<Lobby>> {
        db::find_open_lobby_for_user(&self.txn, user_id)
    }

    fn find_lobby_by_session(&mut self, session_id: &str) -> Result<Option<Lobby>> {
        db::find_lobby_by_session(&self.txn, session_id)
    }
}

#[async_trait]
impl LedgerStoreT for HubStorage {
    async fn append(&self, entry: NewLedgerEntry) -> Result<LedgerEntry> {
        let conn = self.conn.lock().await;
        db::insert_ledger_entry(&conn, &entry)
    }

    async fn append_many(&self, entries: Vec<NewLedgerEntry>) -> Result<Vec<LedgerEntry>> {
        let mut conn = self.conn.lock().await;
        let txn = conn
            .transaction()
            .map_err(|e| Error::Storage(e.to_string()))?;
        let mut appended = Vec::with_capacity(entries.len());
        for entry in &entries {
            appended.push(db::insert_ledger_entry(&txn, entry)?);
        }
        txn.commit().map_err(|e| Error::Storage(e.to_string()))?;
        Ok(appended)
    }

    async fn history(
        &self,
        user_id: &str,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<LedgerEntry>, u64)> {
        let conn = self.conn.lock().await;
        db::ledger_history(&conn, user_id, limit, offset)
    }

    async fn by_session(&self, session_id: &str) -> Result<Vec<LedgerEntry>> {
        let conn = self.conn.lock().await;
        db::ledger_by_session(&conn, session_id)
    }
}

#[async_trait]
impl UserStoreT for HubStorage {
    async fn create_user(&self, user: &User) -> Result<()> {
        validate_display_name(&user.display_name)?;
        let conn = self.conn.lock().await;
        db::create_user(&conn, user)
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().await;
        db::read_user(&conn, user_id)
    }

    async fn find_by_ids(&self, user_ids: &[String]) -> Result<Vec<User>> {
        let conn = self.conn.lock().await;
        db::read_users_by_ids(&conn, user_ids)
    }

    async fn find_by_external_auth_id(&self, external_auth_id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().await;
        db::read_user_by_external_auth_id(&conn, external_auth_id)
    }

    async fn update_display_name(&self, user_id: &str, display_name: &str) -> Result<User> {
        validate_display_name(display_name)?;
        let conn = self.conn.lock().await;
        db::update_user_display_name(&conn, user_id, display_name)
    }

    async fn compare_and_update(
        &self,
        user_id: &str,
        expected: &BalanceSnapshot,
        new: &BalanceSnapshot,
    ) -> Result<User> {
        let conn = self.conn.lock().await;
        db::compare_and_update_user(&conn, user_id, expected, new)
    }
}

#[async_trait]
impl CatalogStoreT for HubStorage {
    async fn create_game(&self, game: &Game) -> Result<()> {
        let conn = self.conn.lock().await;
        db::create_game(&conn, game)
    }

    async fn find_game(&self, game_id: &str) -> Result<Option<Game>> {
        let conn = self.conn.lock().await;
        db::read_game(&conn, game_id)
    }

    async fn create_contract(&self, contract: &Contract) -> Result<()> {
        contract.validate()?;
        let conn = self.conn.lock().await;
        db::create_contract(&conn, contract)
    }

    async fn find_contract(&self, contract_id: &str) -> Result<Option<Contract>> {
        let conn = self.conn.lock().await;
        db::read_contract(&conn, contract_id)
    }

    async fn list_contracts(&self) -> Result<Vec<Contract>> {
        let conn = self.conn.lock().await;
        db::list_contracts(&conn)
    }
}

#[async_trait]
impl SessionStoreT for HubStorage {
    async fn find_session(&self, session_id: &str) -> Result<Option<GameSession>> {
        let conn = self.conn.lock().await;
        db::read_session(&conn, session_id)
    }

    async fn find_expired_sessions(&self, now: u64) -> Result<Vec<GameSession>> {
        let conn = self.conn.lock().await;
        db::find_expired_sessions(&conn, now)
    }
}

#[async_trait]
impl LobbyStoreT for HubStorage {
    async fn find_lobby(&self, lobby_id: &str) -> Result<Option<Lobby>> {
        let conn = self.conn.lock().await;
        db::read_lobby(&conn, lobby_id)
    }

    async fn list_lobbies(&self, contract_id: Option<&str>) -> Result<Vec<Lobby>> {
        let conn = self.conn.lock().await;
        db::list_lobbies(&conn, contract_id)
    }

    async fn find_open_lobby_for_user(&self, user_id: &str) -> Result<Option<Lobby>> {
        let conn = self.conn.lock().await;
        db::find_open_lobby_for_user(&conn, user_id)
    }
}

#[async_trait]
impl HubStorageT for HubStorage {
    async fn with_txn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn TxnT) -> Result<T> + Send + 'static,
    {
        let mut conn = self.conn.lock().await;
        let txn = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::Storage(e.to_string()))?;
        let mut sqlite_txn = SqliteTxn { txn };
        match f(&mut sqlite_txn) {
            Ok(value) => {
                sqlite_txn
                    .txn
                    .commit()
                    .map_err(|e| Error::Storage(e.to_string()))?;
                Ok(value)
            }
            // Dropping the transaction rolls it back.
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pluto_core::types::{EntryKind, LobbyPlayer, LobbyStatus, SessionPlayer, SessionStatus};

    fn user(id: &str, name: &str, balance: u64) -> User {
        let mut u = User::new(id.to_string(), format!("auth|{}", id), name.to_string(), 1);
        u.balance = Amount::from(balance);
        u
    }

    fn contract_fixture() -> Contract {
        Contract {
            id: "c1".into(),
            game_id: "g1".into(),
            name: "duel".into(),
            entry_fee: Amount::from(100),
            platform_fee_bps: 500,
            min_players: 2,
            max_players: 2,
            ttl_seconds: 300,
            is_active: true,
            created_at: 1,
        }
    }

    async fn setup() -> HubStorage {
        let storage = HubStorage::try_new_mem().unwrap();
        let game = Game {
            id: "g1".into(),
            name: "coin-flip".into(),
            client_secret_digest: "digest".into(),
            callback_url: None,
            is_active: true,
            created_at: 1,
        };
        storage.create_game(&game).await.unwrap();
        storage.create_contract(&contract_fixture()).await.unwrap();
        storage
    }

    #[tokio::test]
    async fn test_user_crud() {
        let storage = setup().await;
        storage.create_user(&user("u1", "alice", 1000)).await.unwrap();

        let found = storage.find_by_id("u1").await.unwrap().unwrap();
        assert_eq!(found.display_name, "alice");
        assert_eq!(found.balance, Amount::from(1000));

        let by_auth = storage
            .find_by_external_auth_id("auth|u1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_auth.id, "u1");

        // Case-insensitive uniqueness.
        let err = storage.create_user(&user("u2", "ALICE", 0)).await;
        assert_eq!(err, Err(Error::DisplayNameTaken("ALICE".into())));

        let renamed = storage.update_display_name("u1", "alice2").await.unwrap();
        assert_eq!(renamed.display_name, "alice2");
    }

    #[tokio::test]
    async fn test_platform_account_exists() {
        let storage = setup().await;
        let platform = storage.find_by_id(PLATFORM_ACCOUNT_ID).await.unwrap();
        assert!(platform.is_some());
    }

    #[tokio::test]
    async fn test_compare_and_update() {
        let storage = setup().await;
        storage.create_user(&user("u1", "alice", 1000)).await.unwrap();

        let expected = BalanceSnapshot {
            balance: Amount::from(1000),
            locked: Amount::zero(),
        };
        let new = BalanceSnapshot {
            balance: Amount::from(900),
            locked: Amount::zero(),
        };
        let updated = storage
            .compare_and_update("u1", &expected, &new)
            .await
            .unwrap();
        assert_eq!(updated.balance, Amount::from(900));

        // The snapshot is stale now.
        let err = storage.compare_and_update("u1", &expected, &new).await;
        assert_eq!(err, Err(Error::ConcurrencyConflict));

        let err = storage.compare_and_update("missing", &expected, &new).await;
        assert_eq!(err, Err(Error::NotFound(pluto_core::error::Resource::User)));
    }

    #[tokio::test]
    async fn test_balance_invariant_enforced() {
        let storage = setup().await;
        storage.create_user(&user("u1", "alice", 100)).await.unwrap();

        let result = storage
            .with_txn(|txn| {
                txn.update_balance("u1", &Amount::from(100), &Amount::from(101))
            })
            .await;
        assert!(matches!(result, Err(Error::Internal(_))));
    }

    #[tokio::test]
    async fn test_ledger_history_ordering_and_pagination() {
        let storage = setup().await;
        storage.create_user(&user("u1", "alice", 0)).await.unwrap();

        for i in 1..=5u64 {
            storage
                .append(NewLedgerEntry::new(
                    "u1",
                    EntryKind::Deposit,
                    Amount::from(i),
                    Amount::from(i),
                    // Same created_at for the last two rows, to cover the
                    // entry-id tiebreak.
                    if i >= 4 { 100 } else { i },
                ))
                .await
                .unwrap();
        }

        let (page, total) = storage.history("u1", 3, 0).await.unwrap();
        assert_eq!(total, 5);
        let amounts: Vec<_> = page.iter().map(|e| e.amount.clone()).collect();
        assert_eq!(
            amounts,
            vec![Amount::from(5), Amount::from(4), Amount::from(3)]
        );

        let (page, _) = storage.history("u1", 3, 3).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].amount, Amount::from(2));
    }

    #[tokio::test]
    async fn test_ledger_by_session_ascending() {
        let storage = setup().await;
        storage.create_user(&user("u1", "alice", 0)).await.unwrap();

        let entries = vec![
            NewLedgerEntry::new("u1", EntryKind::Lock, Amount::from(10), Amount::from(10), 5)
                .with_session("s1"),
            NewLedgerEntry::new("u1", EntryKind::Unlock, Amount::from(10), Amount::from(10), 6)
                .with_session("s1"),
            NewLedgerEntry::new("u1", EntryKind::Deposit, Amount::from(7), Amount::from(17), 7),
        ];
        storage.append_many(entries).await.unwrap();

        let rows = storage.by_session("s1").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].kind, EntryKind::Lock);
        assert_eq!(rows[1].kind, EntryKind::Unlock);
    }

    #[tokio::test]
    async fn test_append_many_all_or_nothing() {
        let storage = setup().await;
        storage.create_user(&user("u1", "alice", 0)).await.unwrap();

        let entries = vec![
            NewLedgerEntry::new("u1", EntryKind::Deposit, Amount::from(10), Amount::from(10), 1),
            // Zero amounts are rejected by the store.
            NewLedgerEntry::new("u1", EntryKind::Deposit, Amount::zero(), Amount::from(10), 2),
        ];
        assert!(storage.append_many(entries).await.is_err());

        let (rows, total) = storage.history("u1", 10, 0).await.unwrap();
        assert_eq!(total, 0);
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_with_txn_rolls_back_on_error() {
        let storage = setup().await;
        storage.create_user(&user("u1", "alice", 1000)).await.unwrap();

        let result: Result<()> = storage
            .with_txn(|txn| {
                txn.update_balance("u1", &Amount::from(1), &Amount::zero())?;
                Err(Error::validation("boom"))
            })
            .await;
        assert!(result.is_err());

        let u = storage.find_by_id("u1").await.unwrap().unwrap();
        assert_eq!(u.balance, Amount::from(1000));
    }

    #[tokio::test]
    async fn test_session_round_trip_and_expiry_query() {
        let storage = setup().await;
        storage.create_user(&user("u1", "alice", 1000)).await.unwrap();
        storage.create_user(&user("u2", "bob", 1000)).await.unwrap();

        let session = GameSession {
            id: "s1".into(),
            contract_id: "c1".into(),
            status: SessionStatus::Pending,
            total_pot: Amount::from(200),
            created_at: 10,
            expires_at: 100,
            settled_at: None,
            players: vec![
                SessionPlayer::new("u1", Amount::from(100)),
                SessionPlayer::new("u2", Amount::from(100)),
            ],
        };
        storage
            .with_txn({
                let session = session.clone();
                move |txn| txn.insert_session(&session)
            })
            .await
            .unwrap();

        let found = storage.find_session("s1").await.unwrap().unwrap();
        assert_eq!(found, session);

        assert!(storage.find_expired_sessions(100).await.unwrap().is_empty());
        let expired = storage.find_expired_sessions(101).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, "s1");

        // Terminal sessions are not swept.
        let mut settled = session.clone();
        settled.status = SessionStatus::Settled;
        settled.settled_at = Some(50);
        storage
            .with_txn(move |txn| txn.update_session(&settled))
            .await
            .unwrap();
        assert!(storage.find_expired_sessions(101).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lobby_round_trip() {
        let storage = setup().await;

        let lobby = Lobby {
            id: "l1".into(),
            contract_id: "c1".into(),
            status: LobbyStatus::Waiting,
            created_at: 10,
            session_id: None,
            players: vec![LobbyPlayer {
                user_id: "u1".into(),
                display_name: "alice".into(),
                joined_at: 10,
            }],
        };
        storage
            .with_txn({
                let lobby = lobby.clone();
                move |txn| txn.insert_lobby(&lobby)
            })
            .await
            .unwrap();

        let found = storage.find_lobby("l1").await.unwrap().unwrap();
        assert_eq!(found, lobby);

        let open = storage.find_open_lobby_for_user("u1").await.unwrap();
        assert_eq!(open.unwrap().id, "l1");
        assert!(storage
            .find_open_lobby_for_user("u2")
            .await
            .unwrap()
            .is_none());

        let listed = storage.list_lobbies(Some("c1")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(storage.list_lobbies(Some("c2")).await.unwrap().is_empty());
    }
}
