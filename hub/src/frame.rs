/// Frames delivered to background components.
#[derive(Debug, Clone)]
pub enum EventFrame {
    Shutdown,
}
