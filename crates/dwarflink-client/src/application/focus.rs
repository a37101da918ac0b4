//! Focus command controller.
//!
//! Both operations are stateless single-shot commands: auto focus runs the
//! device's own routine over the full frame, manual stepping nudges the
//! focuser one increment near or far.

use std::sync::Arc;

use tracing::debug;

use dwarflink_core::protocol::commands::{AutoFocusReq, FocusDirection, ManualFocusStepReq};
use dwarflink_core::protocol::modules::{ModuleId, CMD_FOCUS_AUTO, CMD_FOCUS_MANUAL_STEP};

use super::ControllerError;
use crate::infrastructure::ConnectionManager;

/// Encodes focus intents into wire commands.
pub struct FocusController {
    connection: Arc<ConnectionManager>,
}

impl FocusController {
    pub fn new(connection: Arc<ConnectionManager>) -> Self {
        Self { connection }
    }

    /// Runs the device's global auto-focus routine.
    pub async fn auto_focus(&self) -> Result<(), ControllerError> {
        if !self.connection.is_connected().await {
            return Err(ControllerError::NotConnected);
        }

        // Mode 0 with a zero center is the full-frame routine.
        let req = AutoFocusReq {
            mode: 0,
            center_x: 0,
            center_y: 0,
        };
        debug!("auto focus");
        self.connection
            .send(ModuleId::Focus as u32, CMD_FOCUS_AUTO, &req.encode())
            .await?;
        Ok(())
    }

    /// Steps the focuser one increment in the given direction.
    pub async fn manual_step(&self, direction: FocusDirection) -> Result<(), ControllerError> {
        if !self.connection.is_connected().await {
            return Err(ControllerError::NotConnected);
        }

        let req = ManualFocusStepReq { direction };
        debug!(?direction, "manual focus step");
        self.connection
            .send(ModuleId::Focus as u32, CMD_FOCUS_MANUAL_STEP, &req.encode())
            .await?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
