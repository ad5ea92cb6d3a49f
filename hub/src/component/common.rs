use async_trait::async_trait;
use pluto_core::error::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::frame::EventFrame;

/// A data represent the reason of closing.
#[derive(Debug, Clone)]
pub enum CloseReason {
    Complete,
    Fault(Error),
}

/// The channels held by the owner of a running component.
pub struct PortsHandle {
    input_tx: mpsc::Sender<EventFrame>,
    close_rx: Option<oneshot::Receiver<CloseReason>>,
}

impl PortsHandle {
    pub async fn send(&self, frame: EventFrame) {
        if let Err(e) = self.input_tx.send(frame).await {
            warn!("Failed to send frame to component: {:?}", e);
        }
    }

    pub async fn wait(&mut self) {
        if let Some(rx) = self.close_rx.take() {
            match rx.await {
                Ok(CloseReason::Complete) => (),
                Ok(CloseReason::Fault(e)) => {
                    error!("Component closed with error: {}", e);
                }
                Err(_) => warn!("Component dropped without a close reason"),
            }
        } else {
            panic!("Somewhere else is waiting already");
        }
    }
}

pub trait Ports: Send {
    fn create() -> (Self, PortsHandle)
    where
        Self: Sized;

    fn close(self, reason: CloseReason);
}

/// Input-only ports; enough for components that are driven by a timer
/// and only receive Shutdown.
pub struct ConsumerPorts {
    rx: mpsc::Receiver<EventFrame>,
    close: oneshot::Sender<CloseReason>,
}

impl ConsumerPorts {
    pub async fn recv(&mut self) -> Option<EventFrame> {
        self.rx.recv().await
    }
}

impl Ports for ConsumerPorts {
    fn create() -> (Self, PortsHandle)
    where
        Self: Sized,
    {
        let (input_tx, input_rx) = mpsc::channel(10);
        let (close_tx, close_rx) = oneshot::channel();
        (
            Self {
                rx: input_rx,
                close: close_tx,
            },
            PortsHandle {
                input_tx,
                close_rx: Some(close_rx),
            },
        )
    }

    fn close(self, reason: CloseReason) {
        if let Err(e) = self.close.send(reason) {
            warn!("Failed to send close reason due to error: {:?}", e);
        };
    }
}

#[async_trait]
pub trait Component<P, C>
where
    P: Ports + 'static,
    C: Send + 'static,
{
    fn name(&self) -> &str;

    fn start(&self, context: C) -> PortsHandle {
        info!("Starting component: {}", self.name());
        let (ports, handle) = P::create();
        tokio::spawn(async move {
            Self::run(ports, context).await;
        });
        handle
    }

    async fn run(ports: P, context: C);
}
