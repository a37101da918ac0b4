//! Camera command controller.
//!
//! One controller per camera target (tele or wide).  Each controller owns
//! the target's [`CamParams`] snapshot: a setter clamps its input, overlays
//! the one field it changes, and re-sends the *full* snapshot.  The device
//! applies a set-all-params payload as the complete new state, so sending a
//! single-field delta would silently reset everything else — the overlay and
//! full re-send are a wire-contract requirement, not a convenience.
//!
//! Percentage-style fields (brightness, contrast, hue, saturation) are
//! exposed on a 0–100 scale and rescaled to the device's 0–255 range.
//! Sharpness stays on its native 0–100 scale.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use dwarflink_core::protocol::commands::{CmdResponse, OpenCameraReq};
use dwarflink_core::protocol::modules::CameraKind;
use dwarflink_core::CamParams;

use super::ControllerError;
use crate::infrastructure::ConnectionManager;

/// Rescales a 0–100 percentage to the device's 0–255 range with rounding.
fn percent_to_device(value: i32) -> i32 {
    (value.clamp(0, 100) * 255 + 50) / 100
}

/// Decodes an inbound camera acknowledgement payload and applies the
/// device's success rule (codes 0 and 374).
pub fn open_ack_is_success(payload: &[u8]) -> bool {
    match CmdResponse::decode(payload) {
        Ok(res) => res.is_success(),
        Err(e) => {
            warn!("malformed camera ack: {e}");
            false
        }
    }
}

/// Encodes intents for one camera target into wire commands.
pub struct CameraController {
    connection: Arc<ConnectionManager>,
    kind: CameraKind,
    params: Mutex<CamParams>,
}

impl CameraController {
    pub fn new(connection: Arc<ConnectionManager>, kind: CameraKind) -> Self {
        Self {
            connection,
            kind,
            params: Mutex::new(CamParams::default()),
        }
    }

    pub fn kind(&self) -> CameraKind {
        self.kind
    }

    /// Current parameter snapshot (for display or persistence).
    pub async fn params(&self) -> CamParams {
        self.params.lock().await.clone()
    }

    // ── Lifecycle commands ────────────────────────────────────────────────────

    /// Opens the camera stream.
    pub async fn open(
        &self,
        binning: bool,
        rtsp_encode_type: i32,
    ) -> Result<(), ControllerError> {
        let req = OpenCameraReq {
            binning,
            rtsp_encode_type,
        };
        self.send(self.kind.cmd_open(), &req.encode()).await
    }

    /// Closes the camera stream.
    pub async fn close(&self) -> Result<(), ControllerError> {
        self.send(self.kind.cmd_close(), &[]).await
    }

    /// Captures a single photo.
    pub async fn take_photo(&self) -> Result<(), ControllerError> {
        self.send(self.kind.cmd_photo(), &[]).await
    }

    /// Starts video recording.  Only the tele camera records.
    pub async fn start_record(&self) -> Result<(), ControllerError> {
        let cmd = self
            .kind
            .cmd_start_record()
            .ok_or(ControllerError::Unsupported)?;
        self.send(cmd, &[]).await
    }

    /// Stops video recording.  Only the tele camera records.
    pub async fn stop_record(&self) -> Result<(), ControllerError> {
        let cmd = self
            .kind
            .cmd_stop_record()
            .ok_or(ControllerError::Unsupported)?;
        self.send(cmd, &[]).await
    }

    // ── Parameter setters ─────────────────────────────────────────────────────

    /// Sets exposure mode (0 = auto, 1 = manual).
    pub async fn set_exposure_mode(&self, mode: i32) -> Result<(), ControllerError> {
        self.apply(|p| p.exp_mode = Some(mode.clamp(0, 1))).await
    }

    /// Sets the exposure table index (manual mode).
    pub async fn set_exposure_index(&self, index: i32) -> Result<(), ControllerError> {
        self.apply(|p| p.exp_index = Some(index)).await
    }

    /// Sets gain mode (0 = auto, 1 = manual).
    pub async fn set_gain_mode(&self, mode: i32) -> Result<(), ControllerError> {
        self.apply(|p| p.gain_mode = Some(mode.clamp(0, 1))).await
    }

    /// Sets the gain table index (manual mode).
    pub async fn set_gain_index(&self, index: i32) -> Result<(), ControllerError> {
        self.apply(|p| p.gain_index = Some(index)).await
    }

    /// Sets the IR-cut filter position (0 = in, 1 = out).
    pub async fn set_ircut(&self, position: i32) -> Result<(), ControllerError> {
        self.apply(|p| p.ircut = Some(position.clamp(0, 1))).await
    }

    /// Sets white-balance mode (0 = auto, 1 = manual).
    pub async fn set_white_balance_mode(&self, mode: i32) -> Result<(), ControllerError> {
        self.apply(|p| p.wb_mode = Some(mode.clamp(0, 1))).await
    }

    /// Sets the white-balance table selection (manual mode).
    pub async fn set_white_balance_index(
        &self,
        index_type: i32,
        index: i32,
    ) -> Result<(), ControllerError> {
        self.apply(|p| {
            p.wb_index_type = Some(index_type);
            p.wb_index = Some(index);
        })
        .await
    }

    /// Sets brightness on a 0–100 scale.
    pub async fn set_brightness(&self, percent: i32) -> Result<(), ControllerError> {
        self.apply(|p| p.brightness = Some(percent_to_device(percent)))
            .await
    }

    /// Sets contrast on a 0–100 scale.
    pub async fn set_contrast(&self, percent: i32) -> Result<(), ControllerError> {
        self.apply(|p| p.contrast = Some(percent_to_device(percent)))
            .await
    }

    /// Sets hue on a 0–100 scale.
    pub async fn set_hue(&self, percent: i32) -> Result<(), ControllerError> {
        self.apply(|p| p.hue = Some(percent_to_device(percent))).await
    }

    /// Sets saturation on a 0–100 scale.
    pub async fn set_saturation(&self, percent: i32) -> Result<(), ControllerError> {
        self.apply(|p| p.saturation = Some(percent_to_device(percent)))
            .await
    }

    /// Sets sharpness on its native 0–100 scale.
    pub async fn set_sharpness(&self, value: i32) -> Result<(), ControllerError> {
        self.apply(|p| p.sharpness = Some(value.clamp(0, 100))).await
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    /// Overlays one mutation onto the snapshot and sends the whole snapshot.
    ///
    /// The connection check precedes the mutation, so a call while
    /// disconnected leaves local state untouched.
    async fn apply<F>(&self, mutate: F) -> Result<(), ControllerError>
    where
        F: FnOnce(&mut CamParams),
    {
        if !self.connection.is_connected().await {
            return Err(ControllerError::NotConnected);
        }

        let mut params = self.params.lock().await;
        mutate(&mut params);
        let payload = params.encode();
        debug!(kind = ?self.kind, payload_len = payload.len(), "sending parameter snapshot");
        self.connection
            .send(
                self.kind.module_id(),
                self.kind.cmd_set_all_params(),
                &payload,
            )
            .await?;
        Ok(())
    }

    async fn send(&self, cmd: u32, payload: &[u8]) -> Result<(), ControllerError> {
        if !self.connection.is_connected().await {
            return Err(ControllerError::NotConnected);
        }
        self.connection
            .send(self.kind.module_id(), cmd, payload)
            .await?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
