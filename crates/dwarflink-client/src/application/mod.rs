//! Application layer: inbound message routing and outbound command encoding.

pub mod camera;
pub mod dispatch;
pub mod focus;
pub mod motor;

pub use camera::CameraController;
pub use dispatch::{MessageDispatcher, ModuleMessage, UnknownMessage};
pub use focus::FocusController;
pub use motor::MotorController;

use thiserror::Error;

use crate::infrastructure::ConnectionError;

/// Errors reported by the command controllers.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// No active device session; the command was not sent.
    #[error("not connected to a device")]
    NotConnected,

    /// The target does not support this operation; the command was not sent.
    #[error("operation not supported by this target")]
    Unsupported,

    /// The session failed while sending.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<ConnectionError> for ControllerError {
    fn from(e: ConnectionError) -> Self {
        match e {
            ConnectionError::NotConnected => ControllerError::NotConnected,
            other => ControllerError::Transport(other.to_string()),
        }
    }
}
