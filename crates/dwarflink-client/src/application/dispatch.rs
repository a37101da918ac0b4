//! Inbound message routing.
//!
//! The connection manager emits one flat stream of decoded frames; the
//! dispatcher fans that stream out to per-subsystem channels so the camera,
//! motor, and focus consumers each see only their own traffic.  Routing is
//! pure: no I/O, no locking beyond the channel sends, and unbounded channels
//! so frames for one subsystem are delivered in arrival order without
//! backpressure coupling between subsystems.

use std::collections::HashMap;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use dwarflink_core::protocol::modules::ModuleId;

/// A decoded frame routed to one subsystem channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMessage {
    pub cmd: u32,
    pub payload: Vec<u8>,
}

/// A frame whose module id matched no known subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMessage {
    pub module: u32,
    pub cmd: u32,
    pub payload: Vec<u8>,
}

/// Routes decoded inbound frames to per-subsystem subscribers.
#[derive(Default)]
pub struct MessageDispatcher {
    subscribers: HashMap<ModuleId, UnboundedSender<ModuleMessage>>,
    unrecognized: Option<UnboundedSender<UnknownMessage>>,
}

impl MessageDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to one subsystem's traffic.  A second registration for the
    /// same module replaces the first; the old receiver stops getting
    /// messages.
    pub fn register(&mut self, module: ModuleId) -> UnboundedReceiver<ModuleMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.insert(module, tx);
        rx
    }

    /// Subscribes to frames whose module id matches no known subsystem.
    pub fn register_unrecognized(&mut self) -> UnboundedReceiver<UnknownMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.unrecognized = Some(tx);
        rx
    }

    /// Routes one decoded frame.
    ///
    /// A known module with no live subscriber is logged and dropped.  An
    /// unknown module goes to the unrecognized channel when one is
    /// registered, and is otherwise logged.
    pub fn dispatch(&self, module: u32, cmd: u32, payload: Vec<u8>) {
        match ModuleId::from_u32(module) {
            Some(id) => match self.subscribers.get(&id) {
                Some(tx) => {
                    if tx.send(ModuleMessage { cmd, payload }).is_err() {
                        debug!(?id, cmd, "subscriber gone, dropping message");
                    }
                }
                None => debug!(?id, cmd, "no subscriber for module, dropping message"),
            },
            None => match &self.unrecognized {
                Some(tx) => {
                    if tx
                        .send(UnknownMessage {
                            module,
                            cmd,
                            payload,
                        })
                        .is_err()
                    {
                        debug!(module, cmd, "unrecognized subscriber gone");
                    }
                }
                None => warn!(module, cmd, "frame for unrecognized module dropped"),
            },
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
