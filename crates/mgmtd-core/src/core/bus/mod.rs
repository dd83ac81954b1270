//! Per-vertex typed event channel with ACK/NACK and an activity bit.
//!
//! Each vertex owns one [`EventChannel`]. Senders call [`EventSender::send`]:
//! a `sync` send enqueues a message carrying a reply channel and waits for
//! the receiver's ACK; a non-sync send just enqueues and returns. The
//! channel's buffer is capacity 1, the closest stable-Rust approximation of
//! the unbuffered rendezvous channel the design calls for — see
//! `DESIGN.md` for why an exact zero-capacity channel isn't used.

mod event;

pub use event::{EventName, EventMessage};

use crate::core::error::{EngineError, Result};
use tokio::sync::{mpsc, oneshot};

/// Sending half of a vertex's event channel.
#[derive(Clone)]
pub struct EventSender {
    vertex: String,
    tx: mpsc::Sender<EventMessage>,
}

/// Receiving half of a vertex's event channel.
pub struct EventReceiver {
    vertex: String,
    rx: mpsc::Receiver<EventMessage>,
}

/// Create a new bound event channel for a vertex.
pub fn channel(vertex: impl Into<String>) -> (EventSender, EventReceiver) {
    let vertex = vertex.into();
    let (tx, rx) = mpsc::channel(1);
    (
        EventSender {
            vertex: vertex.clone(),
            tx,
        },
        EventReceiver { vertex, rx },
    )
}

/// Outcome of [`EventReceiver::read_event`]: whether the vertex task should
/// exit, and whether there is a poke-like event to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOutcome {
    pub exit: bool,
    pub act: bool,
}

impl EventSender {
    /// Send an event. If `sync` is true, blocks until the receiver ACKs.
    /// If the channel is gone, returns `ChannelClosed`, which callers must
    /// treat as a benign race rather than a failure.
    pub async fn send(&self, name: EventName, sync: bool, activity: bool) -> Result<()> {
        if sync {
            let (ack_tx, ack_rx) = oneshot::channel();
            let msg = EventMessage {
                name,
                activity,
                ack: Some(ack_tx),
            };
            self.tx.send(msg).await.map_err(|_| EngineError::ChannelClosed {
                vertex: self.vertex.clone(),
            })?;
            let acked = ack_rx.await.unwrap_or(false);
            if !acked {
                return Err(EngineError::ChannelClosed {
                    vertex: self.vertex.clone(),
                });
            }
            Ok(())
        } else {
            let msg = EventMessage {
                name,
                activity,
                ack: None,
            };
            self.tx
                .try_send(msg)
                .map_err(|_| EngineError::ChannelClosed {
                    vertex: self.vertex.clone(),
                })
        }
    }
}

impl EventReceiver {
    /// ACKs the message immediately, then dispatches by name. `pause`
    /// blocks this call on the same channel until `start` or `exit`
    /// arrives; any other event while paused is a programming error.
    pub async fn read_event(&mut self) -> Result<ReadOutcome> {
        loop {
            let msg = self.rx.recv().await.ok_or_else(|| EngineError::ChannelClosed {
                vertex: self.vertex.clone(),
            })?;
            if let Some(ack) = msg.ack {
                let _ = ack.send(true);
            }
            match msg.name {
                EventName::Start | EventName::Poke | EventName::BackPoke => {
                    return Ok(ReadOutcome {
                        exit: false,
                        act: true,
                    });
                }
                EventName::Exit => {
                    return Ok(ReadOutcome {
                        exit: true,
                        act: false,
                    });
                }
                EventName::Pause => {
                    // Block here until a continue (Start) or Exit arrives.
                    loop {
                        let next = self.rx.recv().await.ok_or_else(|| EngineError::ChannelClosed {
                            vertex: self.vertex.clone(),
                        })?;
                        if let Some(ack) = next.ack {
                            let _ = ack.send(true);
                        }
                        match next.name {
                            EventName::Start => break,
                            EventName::Exit => {
                                return Ok(ReadOutcome {
                                    exit: true,
                                    act: false,
                                });
                            }
                            // A prerequisite finishing its own cycle can
                            // legitimately Poke/BackPoke a paused
                            // dependent (§8 scenario 6); it's rejected
                            // here rather than queued — the vertex will
                            // re-evaluate its ordering from scratch on
                            // its next real event once resumed.
                            EventName::Poke | EventName::BackPoke => {
                                tracing::trace!(
                                    vertex = %self.vertex,
                                    event = ?next.name,
                                    "dropping event received while paused"
                                );
                            }
                            EventName::Pause => {
                                return Err(EngineError::Protocol {
                                    vertex: self.vertex.clone(),
                                    reason: "received Pause while already paused".to_string(),
                                });
                            }
                        }
                    }
                }
            }
        }
    }
}
