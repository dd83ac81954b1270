use tokio::sync::oneshot;

/// Control-message names carried over a vertex's event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventName {
    Start,
    Pause,
    Poke,
    BackPoke,
    Exit,
}

/// A single message on the event channel. `ack` is present only for
/// synchronous sends; `read_event` replies on it immediately on receipt.
pub struct EventMessage {
    pub name: EventName,
    pub activity: bool,
    pub ack: Option<oneshot::Sender<bool>>,
}
