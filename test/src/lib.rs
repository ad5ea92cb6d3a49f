//! Fixtures and builders shared by the engine and hub tests.
//!
//! The storage fixtures keep the ledger-balance invariant intact:
//! funding a test user goes through a DEPOSIT ledger row, exactly like
//! the real deposit flow.

use std::sync::Arc;

use pluto_codec::HmacTokenCodec;
use pluto_core::amount::Amount;
use pluto_core::clock::current_timestamp;
use pluto_core::storage::{CatalogStoreT, LedgerStoreT, UserStoreT};
use pluto_core::types::{BalanceSnapshot, Contract, EntryKind, Game, NewLedgerEntry, User};
use pluto_local_db::HubStorage;

pub const TEST_GAME_ID: &str = "game-1";
pub const TEST_GAME_SECRET: &str = "game-1-shared-secret";
pub const TEST_TOKEN_SECRET: &[u8] = b"test-token-secret";

pub fn token_codec() -> Arc<HmacTokenCodec> {
    Arc::new(HmacTokenCodec::new(TEST_TOKEN_SECRET))
}

/// In-memory storage with one registered game.
pub async fn setup_storage() -> Arc<HubStorage> {
    let storage = HubStorage::try_new_mem().expect("Open in-memory storage");
    let game = Game {
        id: TEST_GAME_ID.into(),
        name: "test-game".into(),
        client_secret_digest: pluto_codec::digest_secret(TEST_GAME_SECRET),
        callback_url: None,
        is_active: true,
        created_at: current_timestamp(),
    };
    storage.create_game(&game).await.expect("Create test game");
    Arc::new(storage)
}

/// Create a user funded through a deposit, so the ledger and the
/// balance row agree.
pub async fn add_user(storage: &HubStorage, id: &str, display_name: &str, balance: u64) -> User {
    let now = current_timestamp();
    let external_auth_id = format!("auth|{}", id);
    let user = User::new(id, external_auth_id.as_str(), display_name, now);
    storage.create_user(&user).await.expect("Create test user");

    if balance > 0 {
        let funded = Amount::from(balance);
        storage
            .compare_and_update(
                id,
                &user.snapshot(),
                &BalanceSnapshot {
                    balance: funded.clone(),
                    locked: Amount::zero(),
                },
            )
            .await
            .expect("Fund test user");
        storage
            .append(
                NewLedgerEntry::new(id, EntryKind::Deposit, funded.clone(), funded, now)
                    .with_description("Test deposit"),
            )
            .await
            .expect("Record test deposit");
    }

    storage
        .find_by_id(id)
        .await
        .expect("Reload test user")
        .expect("Test user exists")
}

pub struct TestContractBuilder {
    contract: Contract,
}

impl Default for TestContractBuilder {
    fn default() -> Self {
        Self {
            contract: Contract {
                id: "contract-1".into(),
                game_id: TEST_GAME_ID.into(),
                name: "test-contract".into(),
                entry_fee: Amount::from(100),
                platform_fee_bps: 500,
                min_players: 2,
                max_players: 2,
                ttl_seconds: 300,
                is_active: true,
                created_at: current_timestamp(),
            },
        }
    }
}

impl TestContractBuilder {
    pub fn id(mut self, id: &str) -> Self {
        self.contract.id = id.to_string();
        self
    }

    pub fn entry_fee(mut self, entry_fee: u64) -> Self {
        self.contract.entry_fee = Amount::from(entry_fee);
        self
    }

    pub fn platform_fee_bps(mut self, bps: u32) -> Self {
        self.contract.platform_fee_bps = bps;
        self
    }

    pub fn players(mut self, min: u16, max: u16) -> Self {
        self.contract.min_players = min;
        self.contract.max_players = max;
        self
    }

    pub fn ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.contract.ttl_seconds = ttl_seconds;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.contract.is_active = false;
        self
    }

    pub async fn create(self, storage: &HubStorage) -> Contract {
        storage
            .create_contract(&self.contract)
            .await
            .expect("Create test contract");
        self.contract
    }
}
