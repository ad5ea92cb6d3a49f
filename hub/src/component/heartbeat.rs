//! Heartbeat keeper: pings every open lobby channel on a fixed
//! cadence so long-lived subscriber connections stay healthy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pluto_engine::LobbyBroadcaster;
use tokio::select;
use tracing::info;

use crate::component::common::{CloseReason, Component, ConsumerPorts, Ports};
use crate::frame::EventFrame;

pub struct HeartbeatKeeperContext {
    broadcaster: Arc<LobbyBroadcaster>,
    interval: Duration,
}

pub struct HeartbeatKeeper {}

impl HeartbeatKeeper {
    pub fn init(
        broadcaster: Arc<LobbyBroadcaster>,
        interval: Duration,
    ) -> (Self, HeartbeatKeeperContext) {
        (
            Self {},
            HeartbeatKeeperContext {
                broadcaster,
                interval,
            },
        )
    }
}

#[async_trait]
impl Component<ConsumerPorts, HeartbeatKeeperContext> for HeartbeatKeeper {
    fn name(&self) -> &str {
        "HeartbeatKeeper"
    }

    async fn run(mut ports: ConsumerPorts, ctx: HeartbeatKeeperContext) {
        let mut ticker = tokio::time::interval(ctx.interval);
        // Skip the immediate first tick.
        ticker.tick().await;
        loop {
            select! {
                frame = ports.recv() => {
                    match frame {
                        Some(EventFrame::Shutdown) | None => {
                            info!("Shutdown heartbeat keeper");
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    ctx.broadcaster.heartbeat_all().await;
                }
            }
        }
        ports.close(CloseReason::Complete);
    }
}
