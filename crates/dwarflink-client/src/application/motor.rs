//! Motor command controller.
//!
//! Stateless: every call encodes one fire-and-forget command.  Inputs are
//! clamped to the ranges the device firmware accepts rather than rejected,
//! matching how the device's own app drives the motors from a slider.

use std::sync::Arc;

use tracing::debug;

use dwarflink_core::protocol::commands::{MotorRunReq, MotorStopReq};
use dwarflink_core::protocol::modules::{MotorAxis, ModuleId, CMD_MOTOR_RUN, CMD_MOTOR_STOP};

use super::ControllerError;
use crate::infrastructure::ConnectionManager;

/// Valid motor speed range in device units.
const SPEED_RANGE: (f64, f64) = (0.1, 30.0);
/// Valid acceleration-ramp range.
const RAMP_RANGE: (i32, i32) = (0, 1000);
/// Valid microstepping resolution-level range.
const RESOLUTION_RANGE: (i32, i32) = (0, 8);

/// Encodes motor run/stop intents into wire commands.
pub struct MotorController {
    connection: Arc<ConnectionManager>,
}

impl MotorController {
    pub fn new(connection: Arc<ConnectionManager>) -> Self {
        Self { connection }
    }

    /// Starts the given axis moving.  Speed, ramp, and resolution are
    /// clamped to the firmware's accepted ranges.
    pub async fn run(
        &self,
        axis: MotorAxis,
        direction_positive: bool,
        speed: f64,
        speed_ramping: i32,
        resolution_level: i32,
    ) -> Result<(), ControllerError> {
        if !self.connection.is_connected().await {
            return Err(ControllerError::NotConnected);
        }

        let req = MotorRunReq {
            axis,
            direction_positive,
            speed: speed.clamp(SPEED_RANGE.0, SPEED_RANGE.1),
            speed_ramping: speed_ramping.clamp(RAMP_RANGE.0, RAMP_RANGE.1),
            resolution_level: resolution_level.clamp(RESOLUTION_RANGE.0, RESOLUTION_RANGE.1),
        };
        debug!(?axis, speed = req.speed, "motor run");
        self.connection
            .send(ModuleId::Motor as u32, CMD_MOTOR_RUN, &req.encode())
            .await?;
        Ok(())
    }

    /// Stops the given axis.
    pub async fn stop(&self, axis: MotorAxis) -> Result<(), ControllerError> {
        if !self.connection.is_connected().await {
            return Err(ControllerError::NotConnected);
        }

        let req = MotorStopReq { axis };
        debug!(?axis, "motor stop");
        self.connection
            .send(ModuleId::Motor as u32, CMD_MOTOR_STOP, &req.encode())
            .await?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
