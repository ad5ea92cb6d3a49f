mod common;
mod heartbeat;
mod sweeper;

pub use common::{CloseReason, Component, ConsumerPorts, Ports, PortsHandle};
pub use heartbeat::{HeartbeatKeeper, HeartbeatKeeperContext};
pub use sweeper::{Sweeper, SweeperContext};
