//! The expiry sweeper: polls for overdue open sessions and cancels
//! them with EXPIRED terminal status. The sweeper is advisory; Settle
//! re-checks expiry on its own.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pluto_engine::{ContractEngine, LobbyManager};
use pluto_local_db::HubStorage;
use tokio::select;
use tracing::{info, warn};

use crate::component::common::{CloseReason, Component, ConsumerPorts, Ports};
use crate::frame::EventFrame;

pub struct SweeperContext {
    engine: Arc<ContractEngine<HubStorage>>,
    lobby_manager: Arc<LobbyManager<HubStorage>>,
    interval: Duration,
}

pub struct Sweeper {}

impl Sweeper {
    pub fn init(
        engine: Arc<ContractEngine<HubStorage>>,
        lobby_manager: Arc<LobbyManager<HubStorage>>,
        interval: Duration,
    ) -> (Self, SweeperContext) {
        (
            Self {},
            SweeperContext {
                engine,
                lobby_manager,
                interval,
            },
        )
    }
}

#[async_trait]
impl Component<ConsumerPorts, SweeperContext> for Sweeper {
    fn name(&self) -> &str {
        "Sweeper"
    }

    async fn run(mut ports: ConsumerPorts, ctx: SweeperContext) {
        let mut ticker = tokio::time::interval(ctx.interval);
        loop {
            select! {
                frame = ports.recv() => {
                    match frame {
                        Some(EventFrame::Shutdown) | None => {
                            info!("Shutdown sweeper");
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    match ctx.engine.sweep_expired().await {
                        Ok(expired) => {
                            for session_id in expired {
                                if let Err(e) = ctx
                                    .lobby_manager
                                    .on_session_terminal(&session_id, "Session expired")
                                    .await
                                {
                                    warn!("Failed to close lobby of {}: {}", session_id, e);
                                }
                            }
                        }
                        Err(e) => warn!("Sweep failed: {}", e),
                    }
                }
            }
        }
        ports.close(CloseReason::Complete);
    }
}
