//! The lobby state machine: per-contract waiting rooms that gate entry
//! into contract execution. Joining is an advisory funds precheck
//! only; the authoritative lock happens at Execute.

use std::sync::Arc;

use pluto_core::clock::current_timestamp;
use pluto_core::error::{Error, Resource, Result};
use pluto_core::storage::{HubStorageT, TxnT};
use pluto_core::types::{
    JoinLobbyResponse, LeaveLobbyResponse, Lobby, LobbyDetail, LobbyEvent, LobbyPlayer,
    LobbyStatus, LobbySummary, User, UserId,
};
use tracing::info;
use uuid::Uuid;

use crate::broadcast::LobbyBroadcaster;

pub const STARTING_COUNTDOWN_SECS: u32 = 5;

pub struct LobbyManager<S> {
    storage: Arc<S>,
    broadcaster: Arc<LobbyBroadcaster>,
}

impl<S: HubStorageT> LobbyManager<S> {
    pub fn new(storage: Arc<S>, broadcaster: Arc<LobbyBroadcaster>) -> Self {
        Self {
            storage,
            broadcaster,
        }
    }

    pub fn broadcaster(&self) -> Arc<LobbyBroadcaster> {
        self.broadcaster.clone()
    }

    /// Admit the user into the contract's waiting lobby, creating one
    /// when none is open. When the lobby fills up it transitions to
    /// STARTING and the countdown is announced; the game backend
    /// reacts to that broadcast by calling Execute.
    pub async fn join(&self, user: &User, contract_id: &str) -> Result<JoinLobbyResponse> {
        let now = current_timestamp();
        let new_lobby_id = Uuid::new_v4().to_string();
        let user = user.clone();
        let contract_id = contract_id.to_string();

        let (lobby, max_players, position, events) = self
            .storage
            .with_txn(move |txn| {
                if txn.find_open_lobby_for_user(&user.id)?.is_some() {
                    return Err(Error::AlreadyInLobby);
                }
                let contract = txn
                    .find_contract(&contract_id)?
                    .ok_or(Error::NotFound(Resource::Contract))?;
                if !contract.is_active {
                    return Err(Error::GameNotActive);
                }

                // Advisory precheck; no funds are locked here.
                let available = user.available_balance();
                if available < contract.entry_fee {
                    return Err(Error::InsufficientFunds {
                        required: contract.entry_fee.clone(),
                        available,
                    });
                }

                let (mut lobby, created) = match txn.find_waiting_lobby(&contract.id)? {
                    Some(lobby) => (lobby, false),
                    None => (
                        Lobby {
                            id: new_lobby_id,
                            contract_id: contract.id.clone(),
                            status: LobbyStatus::Waiting,
                            created_at: now,
                            session_id: None,
                            players: Vec::new(),
                        },
                        true,
                    ),
                };
                if lobby.players.len() >= contract.max_players as usize {
                    return Err(Error::LobbyFull);
                }

                let player = LobbyPlayer {
                    user_id: user.id.clone(),
                    display_name: user.display_name.clone(),
                    joined_at: now,
                };
                lobby.players.push(player.clone());
                let position = (lobby.players.len() - 1) as u16;

                let mut events = vec![LobbyEvent::PlayerJoined { player }];
                if lobby.players.len() == contract.max_players as usize {
                    lobby.status = LobbyStatus::Starting;
                    events.push(LobbyEvent::LobbyStarting {
                        countdown: STARTING_COUNTDOWN_SECS,
                    });
                }

                if created {
                    txn.insert_lobby(&lobby)?;
                } else {
                    txn.update_lobby(&lobby)?;
                }
                Ok((lobby, contract.max_players, position, events))
            })
            .await?;

        for event in events {
            self.broadcaster.broadcast(&lobby.id, event).await;
        }

        info!(
            "Lobby {} now {} ({} players)",
            lobby.id,
            lobby.status.as_str(),
            lobby.players.len()
        );

        Ok(JoinLobbyResponse {
            lobby_id: lobby.id,
            position,
            player_count: lobby.players.len() as u16,
            max_players,
            status: lobby.status,
            is_ready: lobby.status == LobbyStatus::Starting,
        })
    }

    pub async fn leave(&self, user_id: &str) -> Result<LeaveLobbyResponse> {
        let user_id = user_id.to_string();
        let (lobby, events) = self
            .storage
            .with_txn(move |txn| {
                let mut lobby = txn
                    .find_open_lobby_for_user(&user_id)?
                    .ok_or(Error::NotFound(Resource::Lobby))?;
                if lobby.status == LobbyStatus::InGame {
                    return Err(Error::InvalidState("Lobby is IN_GAME".into()));
                }

                lobby.players.retain(|p| p.user_id != user_id);
                let mut events = vec![LobbyEvent::PlayerLeft {
                    player_id: user_id.clone(),
                }];
                if lobby.players.is_empty() {
                    lobby.status = LobbyStatus::Closed;
                    events.push(LobbyEvent::LobbyClosed {
                        reason: "Lobby is empty".into(),
                    });
                } else if lobby.status == LobbyStatus::Starting {
                    // The countdown is abandoned; capacity is no
                    // longer met.
                    lobby.status = LobbyStatus::Waiting;
                }

                txn.update_lobby(&lobby)?;
                Ok((lobby, events))
            })
            .await?;

        for event in events {
            self.broadcaster.broadcast(&lobby.id, event).await;
        }
        if lobby.status == LobbyStatus::Closed {
            self.broadcaster.remove(&lobby.id).await;
        }

        Ok(LeaveLobbyResponse {
            success: true,
            lobby_id: lobby.id,
        })
    }

    /// Called after Execute commits. When an open lobby of the same
    /// contract holds every session player, it moves to IN_GAME and
    /// the session start is announced.
    pub async fn on_session_started(
        &self,
        contract_id: &str,
        session_id: &str,
        player_ids: &[UserId],
    ) -> Result<()> {
        if player_ids.is_empty() {
            return Ok(());
        }
        let contract_id = contract_id.to_string();
        let session_id = session_id.to_string();
        let player_ids = player_ids.to_vec();

        let lobby = self
            .storage
            .with_txn(move |txn| {
                let Some(mut lobby) = txn.find_open_lobby_for_user(&player_ids[0])? else {
                    return Ok(None);
                };
                if lobby.contract_id != contract_id
                    || lobby.status == LobbyStatus::InGame
                    || !player_ids.iter().all(|id| lobby.contains(id))
                {
                    return Ok(None);
                }
                lobby.status = LobbyStatus::InGame;
                lobby.session_id = Some(session_id);
                txn.update_lobby(&lobby)?;
                Ok(Some(lobby))
            })
            .await?;

        if let Some(lobby) = lobby {
            if let Some(session_id) = lobby.session_id.clone() {
                self.broadcaster
                    .broadcast(&lobby.id, LobbyEvent::GameStarted { session_id })
                    .await;
            }
        }
        Ok(())
    }

    /// Called when a session reaches a terminal state; the lobby that
    /// spawned it is closed.
    pub async fn on_session_terminal(&self, session_id: &str, reason: &str) -> Result<()> {
        let session_id = session_id.to_string();
        let lobby = self
            .storage
            .with_txn(move |txn| {
                let Some(mut lobby) = txn.find_lobby_by_session(&session_id)? else {
                    return Ok(None);
                };
                if !lobby.status.is_open() {
                    return Ok(None);
                }
                lobby.status = LobbyStatus::Closed;
                txn.update_lobby(&lobby)?;
                Ok(Some(lobby))
            })
            .await?;

        if let Some(lobby) = lobby {
            self.broadcaster
                .broadcast(
                    &lobby.id,
                    LobbyEvent::LobbyClosed {
                        reason: reason.to_string(),
                    },
                )
                .await;
            self.broadcaster.remove(&lobby.id).await;
        }
        Ok(())
    }

    /// Summaries of the open lobbies, optionally restricted to one
    /// contract.
    pub async fn list(&self, contract_id: Option<&str>) -> Result<Vec<LobbySummary>> {
        let lobbies = self.storage.list_lobbies(contract_id).await?;
        let mut summaries = Vec::with_capacity(lobbies.len());
        for lobby in lobbies {
            if !lobby.status.is_open() {
                continue;
            }
            let contract = self
                .storage
                .find_contract(&lobby.contract_id)
                .await?
                .ok_or(Error::NotFound(Resource::Contract))?;
            summaries.push(LobbySummary {
                lobby_id: lobby.id,
                contract_id: lobby.contract_id,
                status: lobby.status,
                player_count: lobby.players.len() as u16,
                max_players: contract.max_players,
                created_at: lobby.created_at,
            });
        }
        Ok(summaries)
    }

    pub async fn status(&self, lobby_id: &str) -> Result<LobbyDetail> {
        let lobby = self
            .storage
            .find_lobby(lobby_id)
            .await?
            .ok_or(Error::NotFound(Resource::Lobby))?;
        let contract = self
            .storage
            .find_contract(&lobby.contract_id)
            .await?
            .ok_or(Error::NotFound(Resource::Contract))?;
        Ok(LobbyDetail {
            lobby_id: lobby.id,
            contract_id: lobby.contract_id,
            status: lobby.status,
            players: lobby.players,
            max_players: contract.max_players,
            created_at: lobby.created_at,
        })
    }
}
