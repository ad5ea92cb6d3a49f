//! Per-lobby event fan-out.
//!
//! One broadcast channel per lobby, created on first use, in a map
//! guarded by a mutex. Sends never block; a send with no receivers is
//! a no-op, and subscribers that fall behind the channel capacity are
//! evicted by the stream bridge on the server side. There is no
//! replay; late subscribers recover through the status snapshot.

use std::collections::HashMap;

use pluto_core::clock::current_timestamp;
use pluto_core::types::{LobbyEvent, LobbyFrame, LobbyId};
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

const CHANNEL_CAPACITY: usize = 32;

#[derive(Default)]
pub struct LobbyBroadcaster {
    channels: Mutex<HashMap<LobbyId, broadcast::Sender<LobbyFrame>>>,
}

impl LobbyBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber on the lobby's channel, creating the
    /// channel when it is the first one.
    pub async fn subscribe(&self, lobby_id: &str) -> broadcast::Receiver<LobbyFrame> {
        let mut channels = self.channels.lock().await;
        channels
            .entry(lobby_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub async fn broadcast(&self, lobby_id: &str, event: LobbyEvent) {
        let channels = self.channels.lock().await;
        if let Some(tx) = channels.get(lobby_id) {
            let r = tx.send(LobbyFrame::Event {
                lobby_id: lobby_id.to_string(),
                event,
                timestamp: current_timestamp(),
            });
            if let Err(e) = r {
                // Usually it means no receivers
                debug!("Failed to broadcast lobby event: {:?}", e);
            }
        }
    }

    /// Ping every open channel so long-lived connections stay healthy.
    /// Heartbeats are a distinct frame and never a state change.
    pub async fn heartbeat_all(&self) {
        let channels = self.channels.lock().await;
        let timestamp = current_timestamp();
        for (lobby_id, tx) in channels.iter() {
            let r = tx.send(LobbyFrame::Heartbeat {
                lobby_id: lobby_id.clone(),
                timestamp,
            });
            if let Err(e) = r {
                debug!("Failed to send heartbeat: {:?}", e);
            }
        }
    }

    /// Drop a closed lobby's channel; remaining receivers observe the
    /// channel closing.
    pub async fn remove(&self, lobby_id: &str) {
        let mut channels = self.channels.lock().await;
        channels.remove(lobby_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_in_order() {
        let broadcaster = LobbyBroadcaster::new();
        let mut rx = broadcaster.subscribe("l1").await;

        broadcaster
            .broadcast("l1", LobbyEvent::LobbyStarting { countdown: 5 })
            .await;
        broadcaster
            .broadcast(
                "l1",
                LobbyEvent::GameStarted {
                    session_id: "s1".into(),
                },
            )
            .await;

        let first = rx.recv().await.unwrap();
        assert!(matches!(
            first,
            LobbyFrame::Event {
                event: LobbyEvent::LobbyStarting { countdown: 5 },
                ..
            }
        ));
        let second = rx.recv().await.unwrap();
        assert!(matches!(
            second,
            LobbyFrame::Event {
                event: LobbyEvent::GameStarted { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_noop() {
        let broadcaster = LobbyBroadcaster::new();
        broadcaster
            .broadcast("nobody", LobbyEvent::LobbyStarting { countdown: 5 })
            .await;
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let broadcaster = LobbyBroadcaster::new();
        let mut rx1 = broadcaster.subscribe("l1").await;
        let mut rx2 = broadcaster.subscribe("l2").await;

        broadcaster
            .broadcast("l1", LobbyEvent::LobbyStarting { countdown: 5 })
            .await;

        assert!(rx1.recv().await.is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_heartbeat_is_distinguishable() {
        let broadcaster = LobbyBroadcaster::new();
        let mut rx = broadcaster.subscribe("l1").await;

        broadcaster.heartbeat_all().await;
        let frame = rx.recv().await.unwrap();
        assert!(matches!(frame, LobbyFrame::Heartbeat { .. }));
    }

    #[tokio::test]
    async fn test_remove_closes_channel() {
        let broadcaster = LobbyBroadcaster::new();
        let mut rx = broadcaster.subscribe("l1").await;
        broadcaster.remove("l1").await;
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }
}
