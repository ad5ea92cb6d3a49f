//! Lobby state machine and fan-out flows over real storage.

use std::sync::Arc;

use pluto_core::amount::Amount;
use pluto_core::error::{Error, Resource};
use pluto_core::storage::{LobbyStoreT, UserStoreT};
use pluto_core::types::{
    ExecuteParams, LobbyEvent, LobbyFrame, LobbyStatus, PlayerResult, SettleParams, User,
};
use pluto_engine::{ContractEngine, LobbyBroadcaster, LobbyManager, STARTING_COUNTDOWN_SECS};
use pluto_local_db::HubStorage;
use pluto_test::{add_user, setup_storage, token_codec, TestContractBuilder};

async fn fixture() -> (Arc<HubStorage>, LobbyManager<HubStorage>, User, User) {
    let storage = setup_storage().await;
    let alice = add_user(&storage, "user-a", "alice", 1000).await;
    let bob = add_user(&storage, "user-b", "bob", 1000).await;
    TestContractBuilder::default().create(&storage).await;
    let manager = LobbyManager::new(storage.clone(), Arc::new(LobbyBroadcaster::new()));
    (storage, manager, alice, bob)
}

fn expect_event(frame: LobbyFrame) -> LobbyEvent {
    match frame {
        LobbyFrame::Event { event, .. } => event,
        LobbyFrame::Heartbeat { .. } => panic!("Expected event, got heartbeat"),
    }
}

#[tokio::test]
async fn test_join_creates_waiting_lobby() {
    let (storage, manager, alice, _bob) = fixture().await;

    let resp = manager.join(&alice, "contract-1").await.unwrap();
    assert_eq!(resp.position, 0);
    assert_eq!(resp.player_count, 1);
    assert_eq!(resp.max_players, 2);
    assert_eq!(resp.status, LobbyStatus::Waiting);
    assert!(!resp.is_ready);

    let lobby = storage.find_lobby(&resp.lobby_id).await.unwrap().unwrap();
    assert!(lobby.contains("user-a"));

    // Funds stay untouched; join only prechecks.
    let user = storage.find_by_id("user-a").await.unwrap().unwrap();
    assert_eq!(user.locked_balance, Amount::zero());
}

#[tokio::test]
async fn test_join_broadcasts_and_fills_to_starting() {
    let (_storage, manager, alice, bob) = fixture().await;

    let resp = manager.join(&alice, "contract-1").await.unwrap();
    let mut rx = manager.broadcaster().subscribe(&resp.lobby_id).await;

    let full = manager.join(&bob, "contract-1").await.unwrap();
    assert_eq!(full.lobby_id, resp.lobby_id);
    assert_eq!(full.status, LobbyStatus::Starting);
    assert!(full.is_ready);

    match expect_event(rx.recv().await.unwrap()) {
        LobbyEvent::PlayerJoined { player } => assert_eq!(player.user_id, "user-b"),
        other => panic!("Unexpected event: {:?}", other),
    }
    match expect_event(rx.recv().await.unwrap()) {
        LobbyEvent::LobbyStarting { countdown } => {
            assert_eq!(countdown, STARTING_COUNTDOWN_SECS)
        }
        other => panic!("Unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_join_guards() {
    let (_storage, manager, alice, _bob) = fixture().await;

    manager.join(&alice, "contract-1").await.unwrap();
    let err = manager.join(&alice, "contract-1").await;
    assert_eq!(err, Err(Error::AlreadyInLobby));

    let err = manager.join(&alice, "missing").await;
    // The one-lobby check comes first.
    assert_eq!(err, Err(Error::AlreadyInLobby));
}

#[tokio::test]
async fn test_join_unknown_contract() {
    let (_storage, manager, alice, _bob) = fixture().await;
    let err = manager.join(&alice, "missing").await;
    assert_eq!(err, Err(Error::NotFound(Resource::Contract)));
}

#[tokio::test]
async fn test_join_rejects_insufficient_funds() {
    let (storage, manager, _alice, _bob) = fixture().await;
    let poor = add_user(&storage, "user-c", "carol", 10).await;

    let err = manager.join(&poor, "contract-1").await;
    assert_eq!(
        err,
        Err(Error::InsufficientFunds {
            required: Amount::from(100),
            available: Amount::from(10),
        })
    );
}

#[tokio::test]
async fn test_leave_reverts_starting_and_closes_empty() {
    let (storage, manager, alice, bob) = fixture().await;

    let resp = manager.join(&alice, "contract-1").await.unwrap();
    manager.join(&bob, "contract-1").await.unwrap();
    let mut rx = manager.broadcaster().subscribe(&resp.lobby_id).await;

    let left = manager.leave("user-b").await.unwrap();
    assert!(left.success);
    let lobby = storage.find_lobby(&resp.lobby_id).await.unwrap().unwrap();
    assert_eq!(lobby.status, LobbyStatus::Waiting);
    assert_eq!(lobby.players.len(), 1);

    manager.leave("user-a").await.unwrap();
    let lobby = storage.find_lobby(&resp.lobby_id).await.unwrap().unwrap();
    assert_eq!(lobby.status, LobbyStatus::Closed);
    assert!(lobby.players.is_empty());

    match expect_event(rx.recv().await.unwrap()) {
        LobbyEvent::PlayerLeft { player_id } => assert_eq!(player_id, "user-b"),
        other => panic!("Unexpected event: {:?}", other),
    }
    match expect_event(rx.recv().await.unwrap()) {
        LobbyEvent::PlayerLeft { player_id } => assert_eq!(player_id, "user-a"),
        other => panic!("Unexpected event: {:?}", other),
    }
    match expect_event(rx.recv().await.unwrap()) {
        LobbyEvent::LobbyClosed { .. } => {}
        other => panic!("Unexpected event: {:?}", other),
    }

    let err = manager.leave("user-a").await;
    assert_eq!(err, Err(Error::NotFound(Resource::Lobby)));
}

#[tokio::test]
async fn test_one_open_lobby_per_user() {
    let (storage, manager, alice, _bob) = fixture().await;
    TestContractBuilder::default()
        .id("contract-2")
        .create(&storage)
        .await;

    manager.join(&alice, "contract-1").await.unwrap();
    let err = manager.join(&alice, "contract-2").await;
    assert_eq!(err, Err(Error::AlreadyInLobby));
}

#[tokio::test]
async fn test_list_and_status() {
    let (_storage, manager, alice, _bob) = fixture().await;
    let resp = manager.join(&alice, "contract-1").await.unwrap();

    let lobbies = manager.list(None).await.unwrap();
    assert_eq!(lobbies.len(), 1);
    assert_eq!(lobbies[0].lobby_id, resp.lobby_id);
    assert_eq!(lobbies[0].player_count, 1);
    assert_eq!(lobbies[0].max_players, 2);

    assert!(manager.list(Some("other")).await.unwrap().is_empty());

    let detail = manager.status(&resp.lobby_id).await.unwrap();
    assert_eq!(detail.players.len(), 1);
    assert_eq!(detail.players[0].display_name, "alice");

    let err = manager.status("missing").await;
    assert_eq!(err, Err(Error::NotFound(Resource::Lobby)));
}

#[tokio::test]
async fn test_full_cycle_with_engine() {
    let (storage, manager, alice, bob) = fixture().await;
    let engine = ContractEngine::new(storage.clone(), token_codec());

    let resp = manager.join(&alice, "contract-1").await.unwrap();
    manager.join(&bob, "contract-1").await.unwrap();
    let mut rx = manager.broadcaster().subscribe(&resp.lobby_id).await;

    // The game backend reacts to lobby_starting with Execute.
    let exec = engine
        .execute(ExecuteParams {
            contract_id: "contract-1".into(),
            player_ids: vec!["auth|user-a".into(), "auth|user-b".into()],
        })
        .await
        .unwrap();
    manager
        .on_session_started(
            "contract-1",
            &exec.session_id,
            &["user-a".into(), "user-b".into()],
        )
        .await
        .unwrap();

    let lobby = storage.find_lobby(&resp.lobby_id).await.unwrap().unwrap();
    assert_eq!(lobby.status, LobbyStatus::InGame);
    assert_eq!(lobby.session_id.as_deref(), Some(exec.session_id.as_str()));
    match expect_event(rx.recv().await.unwrap()) {
        LobbyEvent::GameStarted { session_id } => assert_eq!(session_id, exec.session_id),
        other => panic!("Unexpected event: {:?}", other),
    }

    // Leaving mid-game is rejected.
    let err = manager.leave("user-a").await;
    assert!(matches!(err, Err(Error::InvalidState(_))));

    engine
        .settle(SettleParams {
            session_token: exec.session_token,
            results: vec![
                PlayerResult {
                    player_id: "user-a".into(),
                    is_winner: true,
                    win_amount: None,
                },
                PlayerResult {
                    player_id: "user-b".into(),
                    is_winner: false,
                    win_amount: None,
                },
            ],
        })
        .await
        .unwrap();
    manager
        .on_session_terminal(&exec.session_id, "Session settled")
        .await
        .unwrap();

    let lobby = storage.find_lobby(&resp.lobby_id).await.unwrap().unwrap();
    assert_eq!(lobby.status, LobbyStatus::Closed);
    match expect_event(rx.recv().await.unwrap()) {
        LobbyEvent::LobbyClosed { reason } => assert_eq!(reason, "Session settled"),
        other => panic!("Unexpected event: {:?}", other),
    }

    // Both players are free to queue again.
    let again = manager.join(&alice, "contract-1").await.unwrap();
    assert_ne!(again.lobby_id, resp.lobby_id);
}
