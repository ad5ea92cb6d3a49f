use std::sync::Arc;

use pluto_codec::{GameMac, HmacTokenCodec};
use pluto_core::auth::{AuthProviderT, GameMacT};
use pluto_core::clock::current_timestamp;
use pluto_core::error::{Error, Result};
use pluto_core::storage::{CatalogStoreT, UserStoreT};
use pluto_core::types::{
    CancelParams, CancelResponse, ExecuteParams, ExecuteResponse, Game, SettleParams,
    SettleResponse, User, UserId,
};
use pluto_engine::{ContractEngine, LobbyBroadcaster, LobbyManager};
use pluto_env::HubConfig;
use pluto_local_db::HubStorage;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::LocalAuthProvider;

/// Hub runtime context
pub struct ApplicationContext {
    pub config: HubConfig,
    pub storage: Arc<HubStorage>,
    pub engine: Arc<ContractEngine<HubStorage>>,
    pub lobby_manager: Arc<LobbyManager<HubStorage>>,
    pub broadcaster: Arc<LobbyBroadcaster>,
    auth_provider: Arc<dyn AuthProviderT>,
    game_mac: Arc<dyn GameMacT>,
}

impl ApplicationContext {
    pub fn try_new(config: HubConfig) -> Result<Self> {
        info!("Initialize application context");

        let storage = Arc::new(match &config.db_path {
            Some(path) => HubStorage::try_new(path)?,
            None => HubStorage::try_new_mem()?,
        });
        let codec = Arc::new(HmacTokenCodec::new(config.token_secret.as_bytes()));
        let broadcaster = Arc::new(LobbyBroadcaster::new());
        let engine = Arc::new(ContractEngine::new(storage.clone(), codec));
        let lobby_manager = Arc::new(LobbyManager::new(storage.clone(), broadcaster.clone()));

        if config.environment != "local" {
            warn!(
                "No identity provider integration for environment {:?}; \
                 using the development provider",
                config.environment
            );
        }
        let auth_provider: Arc<dyn AuthProviderT> = Arc::new(LocalAuthProvider);
        let game_mac: Arc<dyn GameMacT> = Arc::new(GameMac);

        Ok(Self {
            config,
            storage,
            engine,
            lobby_manager,
            broadcaster,
            auth_provider,
            game_mac,
        })
    }

    /// Resolve a bearer token to a hub user; users are created on
    /// their first successful authentication.
    pub async fn authenticate_player(&self, token: &str) -> Result<User> {
        if token.trim().is_empty() {
            return Err(Error::Unauthorized);
        }
        let subject = self.auth_provider.verify_bearer(token).await?;
        if let Some(user) = self
            .storage
            .find_by_external_auth_id(&subject.external_id)
            .await?
        {
            return Ok(user);
        }

        let id = Uuid::new_v4().to_string();
        let display_name = format!("player_{}", &id[..8]);
        let user = User::new(
            id.as_str(),
            subject.external_id.as_str(),
            display_name.as_str(),
            current_timestamp(),
        );
        self.storage.create_user(&user).await?;
        info!("Created user {} for subject {}", user.id, subject.external_id);
        Ok(user)
    }

    /// Verify the game MAC over the literal request body bytes.
    pub async fn authenticate_game(
        &self,
        game_id: &str,
        body: &[u8],
        signature: &str,
    ) -> Result<Game> {
        if game_id.trim().is_empty() || signature.trim().is_empty() {
            return Err(Error::Unauthorized);
        }
        let game = self
            .storage
            .find_game(game_id)
            .await?
            .ok_or(Error::InvalidSignature)?;
        if !game.is_active {
            return Err(Error::GameNotActive);
        }
        self.game_mac
            .verify(&game.client_secret_digest, body, signature)?;
        Ok(game)
    }

    pub async fn execute(&self, params: ExecuteParams) -> Result<ExecuteResponse> {
        let contract_id = params.contract_id.clone();
        let resp = self.engine.execute(params).await?;
        let player_ids: Vec<UserId> = resp.players.iter().map(|p| p.user_id.clone()).collect();
        if let Err(e) = self
            .lobby_manager
            .on_session_started(&contract_id, &resp.session_id, &player_ids)
            .await
        {
            warn!("Failed to move lobby in game: {}", e);
        }
        Ok(resp)
    }

    pub async fn settle(&self, params: SettleParams) -> Result<SettleResponse> {
        let resp = self.engine.settle(params).await?;
        if let Err(e) = self
            .lobby_manager
            .on_session_terminal(&resp.session_id, "Session settled")
            .await
        {
            warn!("Failed to close lobby of {}: {}", resp.session_id, e);
        }
        Ok(resp)
    }

    pub async fn cancel(&self, params: CancelParams) -> Result<CancelResponse> {
        let resp = self.engine.cancel(params).await?;
        if let Err(e) = self
            .lobby_manager
            .on_session_terminal(&resp.session_id, "Session cancelled")
            .await
        {
            warn!("Failed to close lobby of {}: {}", resp.session_id, e);
        }
        Ok(resp)
    }
}
