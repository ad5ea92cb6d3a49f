//! Catalog bootstrap: games and their contracts are loaded from JSON
//! spec files given on the command line. The client secret is digested
//! at load time and never persisted.

use pluto_codec::digest_secret;
use pluto_core::amount::Amount;
use pluto_core::clock::current_timestamp;
use pluto_core::error::Result;
use pluto_core::storage::CatalogStoreT;
use pluto_core::types::{Contract, Game};
use pluto_local_db::HubStorage;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSpec {
    pub id: Option<String>,
    pub name: String,
    pub client_secret: String,
    pub callback_url: Option<String>,
    pub contracts: Vec<ContractSpec>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractSpec {
    pub id: Option<String>,
    pub name: String,
    pub entry_fee: Amount,
    pub platform_fee_bps: u32,
    pub min_players: u16,
    pub max_players: u16,
    pub ttl_seconds: u64,
}

pub async fn load_catalog(storage: &HubStorage, paths: &[String]) -> Result<()> {
    for path in paths {
        let raw = tokio::fs::read(path).await?;
        let spec: GameSpec = serde_json::from_slice(&raw)?;
        register_game(storage, spec).await?;
    }
    Ok(())
}

pub async fn register_game(storage: &HubStorage, spec: GameSpec) -> Result<Game> {
    let now = current_timestamp();
    let game = Game {
        id: spec.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        name: spec.name,
        client_secret_digest: digest_secret(&spec.client_secret),
        callback_url: spec.callback_url,
        is_active: true,
        created_at: now,
    };
    storage.create_game(&game).await?;
    info!("Registered game {} ({})", game.name, game.id);

    for contract_spec in spec.contracts {
        let contract = Contract {
            id: contract_spec
                .id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            game_id: game.id.clone(),
            name: contract_spec.name,
            entry_fee: contract_spec.entry_fee,
            platform_fee_bps: contract_spec.platform_fee_bps,
            min_players: contract_spec.min_players,
            max_players: contract_spec.max_players,
            ttl_seconds: contract_spec.ttl_seconds,
            is_active: true,
            created_at: now,
        };
        storage.create_contract(&contract).await?;
        info!(
            "Registered contract {} ({}) with entry fee {}",
            contract.name, contract.id, contract.entry_fee
        );
    }
    Ok(game)
}
