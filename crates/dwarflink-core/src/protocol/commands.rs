//! Per-command payload encoders and decoders.
//!
//! Payloads are hand-rolled big-endian structs, one encode/decode pair per
//! request shape.  Close/photo/record commands carry empty payloads and need
//! no types here.

use crate::protocol::envelope::FrameError;
use crate::protocol::modules::MotorAxis;

// ── Camera ────────────────────────────────────────────────────────────────────

/// Payload for the open-camera command.
///
/// Layout: `[binning:1][rtsp_encode_type:4]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenCameraReq {
    /// Pixel binning on/off.
    pub binning: bool,
    /// Encoder selection for the device-side RTSP stream.
    pub rtsp_encode_type: i32,
}

impl OpenCameraReq {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(5);
        buf.push(self.binning as u8);
        buf.extend_from_slice(&self.rtsp_encode_type.to_be_bytes());
        buf
    }

    pub fn decode(p: &[u8]) -> Result<Self, FrameError> {
        require_len(p, 5, "OpenCameraReq")?;
        Ok(Self {
            binning: p[0] != 0,
            rtsp_encode_type: read_i32(p, 1),
        })
    }
}

// ── Motor ─────────────────────────────────────────────────────────────────────

/// Payload for the motor-run command.
///
/// Layout: `[axis:4][direction:1][speed:8][speed_ramping:4][resolution_level:4]`.
/// `speed` is an IEEE-754 f64; the other integers are i32.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorRunReq {
    pub axis: MotorAxis,
    /// `true` drives right/up, `false` left/down.
    pub direction_positive: bool,
    pub speed: f64,
    pub speed_ramping: i32,
    pub resolution_level: i32,
}

impl MotorRunReq {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(21);
        buf.extend_from_slice(&(self.axis as i32).to_be_bytes());
        buf.push(self.direction_positive as u8);
        buf.extend_from_slice(&self.speed.to_be_bytes());
        buf.extend_from_slice(&self.speed_ramping.to_be_bytes());
        buf.extend_from_slice(&self.resolution_level.to_be_bytes());
        buf
    }

    pub fn decode(p: &[u8]) -> Result<Self, FrameError> {
        require_len(p, 21, "MotorRunReq")?;
        let axis = decode_axis(read_i32(p, 0))?;
        let direction_positive = p[4] != 0;
        let speed = f64::from_be_bytes(p[5..13].try_into().expect("length checked"));
        Ok(Self {
            axis,
            direction_positive,
            speed,
            speed_ramping: read_i32(p, 13),
            resolution_level: read_i32(p, 17),
        })
    }
}

/// Payload for the motor-stop command.  Layout: `[axis:4]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorStopReq {
    pub axis: MotorAxis,
}

impl MotorStopReq {
    pub fn encode(&self) -> Vec<u8> {
        (self.axis as i32).to_be_bytes().to_vec()
    }

    pub fn decode(p: &[u8]) -> Result<Self, FrameError> {
        require_len(p, 4, "MotorStopReq")?;
        Ok(Self {
            axis: decode_axis(read_i32(p, 0))?,
        })
    }
}

fn decode_axis(raw: i32) -> Result<MotorAxis, FrameError> {
    match raw {
        0 => Ok(MotorAxis::Azimuth),
        1 => Ok(MotorAxis::Altitude),
        other => Err(FrameError::MalformedPayload(format!(
            "unknown motor axis: {other}"
        ))),
    }
}

// ── Focus ─────────────────────────────────────────────────────────────────────

/// Direction of a single manual focus step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusDirection {
    /// Step towards near focus (wire value 1).
    Near,
    /// Step towards far focus (wire value 0).
    Far,
}

/// Payload for a normal auto-focus pass.
///
/// Layout: `[mode:4][center_x:4][center_y:4]`.  Mode 0 with a zero center
/// focuses on the full frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoFocusReq {
    pub mode: i32,
    pub center_x: i32,
    pub center_y: i32,
}

impl AutoFocusReq {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(12);
        buf.extend_from_slice(&self.mode.to_be_bytes());
        buf.extend_from_slice(&self.center_x.to_be_bytes());
        buf.extend_from_slice(&self.center_y.to_be_bytes());
        buf
    }

    pub fn decode(p: &[u8]) -> Result<Self, FrameError> {
        require_len(p, 12, "AutoFocusReq")?;
        Ok(Self {
            mode: read_i32(p, 0),
            center_x: read_i32(p, 4),
            center_y: read_i32(p, 8),
        })
    }
}

/// Payload for a single manual focus step.  Layout: `[direction:1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManualFocusStepReq {
    pub direction: FocusDirection,
}

impl ManualFocusStepReq {
    pub fn encode(&self) -> Vec<u8> {
        let dir = match self.direction {
            FocusDirection::Near => 1u8,
            FocusDirection::Far => 0u8,
        };
        vec![dir]
    }

    pub fn decode(p: &[u8]) -> Result<Self, FrameError> {
        require_len(p, 1, "ManualFocusStepReq")?;
        let direction = if p[0] != 0 {
            FocusDirection::Near
        } else {
            FocusDirection::Far
        };
        Ok(Self { direction })
    }
}

// ── Command response ──────────────────────────────────────────────────────────

/// Inbound acknowledgement payload for most commands.  Layout: `[code:4]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmdResponse {
    pub code: i32,
}

impl CmdResponse {
    pub fn encode(&self) -> Vec<u8> {
        self.code.to_be_bytes().to_vec()
    }

    pub fn decode(p: &[u8]) -> Result<Self, FrameError> {
        require_len(p, 4, "CmdResponse")?;
        Ok(Self {
            code: read_i32(p, 0),
        })
    }

    /// Whether the device accepted the command.
    ///
    /// Some firmware builds answer camera-open with code 374 instead of 0;
    /// the meaning is undocumented but the camera works, so 374 is kept as a
    /// literal alternate success code.
    pub fn is_success(&self) -> bool {
        self.code == 0 || self.code == 374
    }
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, context: &str) -> Result<(), FrameError> {
    if buf.len() < needed {
        Err(FrameError::MalformedPayload(format!(
            "{context}: need {needed} bytes, got {}",
            buf.len()
        )))
    } else {
        Ok(())
    }
}

fn read_i32(buf: &[u8], offset: usize) -> i32 {
    i32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

// ── Tests ─────────────────────────────────────────────────────────────────────
