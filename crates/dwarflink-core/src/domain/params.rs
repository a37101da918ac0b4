//! Cumulative camera parameter set.
//!
//! The device API is "set all params" style: there is no per-field update
//! command.  Each camera therefore keeps one [`CamParams`] record for the
//! life of the controller; every setter overlays its field and the *whole*
//! snapshot is re-sent.  Setting brightness must never erase a previously
//! set contrast — do not replace the struct per call, and do not optimise
//! the snapshot into per-field deltas (that would break wire compatibility).
//!
//! # Snapshot wire layout
//!
//! `[bitmask:2]` followed by each present field as a big-endian i32, in bit
//! order (bit 0 first).  Absent fields are omitted from the byte stream.

use serde::{Deserialize, Serialize};

use crate::protocol::envelope::FrameError;

/// Number of settable fields / meaningful bitmask bits.
const FIELD_COUNT: usize = 13;

/// Per-camera accumulator of settable fields.
///
/// `None` means "never set by this client"; the device keeps its own value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CamParams {
    /// Exposure mode: 0 auto, 1 manual.
    pub exp_mode: Option<i32>,
    /// Index into the device exposure table.
    pub exp_index: Option<i32>,
    /// Gain mode: 0 auto, 1 manual.
    pub gain_mode: Option<i32>,
    /// Index into the device gain table.
    pub gain_index: Option<i32>,
    /// Infra-red cut filter: 0 off, 1 on.
    pub ircut: Option<i32>,
    /// White balance mode: 0 auto, 1 manual.
    pub wb_mode: Option<i32>,
    /// White balance index interpretation: 0 color temperature.
    pub wb_index_type: Option<i32>,
    /// Index into the white balance table.
    pub wb_index: Option<i32>,
    /// Brightness, device range 0–255.
    pub brightness: Option<i32>,
    /// Contrast, device range 0–255.
    pub contrast: Option<i32>,
    /// Hue, device range 0–255.
    pub hue: Option<i32>,
    /// Saturation, device range 0–255.
    pub saturation: Option<i32>,
    /// Sharpness, device range 0–100.
    pub sharpness: Option<i32>,
}

impl CamParams {
    /// Fields in bitmask order.  Keep in sync with the struct layout above.
    fn fields(&self) -> [Option<i32>; FIELD_COUNT] {
        [
            self.exp_mode,
            self.exp_index,
            self.gain_mode,
            self.gain_index,
            self.ircut,
            self.wb_mode,
            self.wb_index_type,
            self.wb_index,
            self.brightness,
            self.contrast,
            self.hue,
            self.saturation,
            self.sharpness,
        ]
    }

    /// Encodes the full snapshot: bitmask plus every present field.
    pub fn encode(&self) -> Vec<u8> {
        let fields = self.fields();

        let mut mask: u16 = 0;
        for (bit, field) in fields.iter().enumerate() {
            if field.is_some() {
                mask |= 1 << bit;
            }
        }

        let mut buf = Vec::with_capacity(2 + FIELD_COUNT * 4);
        buf.extend_from_slice(&mask.to_be_bytes());
        for field in fields.into_iter().flatten() {
            buf.extend_from_slice(&field.to_be_bytes());
        }
        buf
    }

    /// Decodes a snapshot produced by [`encode`](Self::encode).
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::MalformedPayload`] when the byte count does not
    /// match the bitmask.
    pub fn decode(p: &[u8]) -> Result<Self, FrameError> {
        if p.len() < 2 {
            return Err(FrameError::MalformedPayload(
                "CamParams: missing bitmask".to_string(),
            ));
        }
        let mask = u16::from_be_bytes([p[0], p[1]]);
        let present = (0..FIELD_COUNT).filter(|bit| mask & (1 << bit) != 0).count();
        if p.len() != 2 + present * 4 {
            return Err(FrameError::MalformedPayload(format!(
                "CamParams: bitmask declares {present} fields, got {} value bytes",
                p.len() - 2
            )));
        }

        let mut values = [None; FIELD_COUNT];
        let mut off = 2;
        for (bit, slot) in values.iter_mut().enumerate() {
            if mask & (1 << bit) != 0 {
                *slot = Some(i32::from_be_bytes([
                    p[off],
                    p[off + 1],
                    p[off + 2],
                    p[off + 3],
                ]));
                off += 4;
            }
        }

        Ok(Self {
            exp_mode: values[0],
            exp_index: values[1],
            gain_mode: values[2],
            gain_index: values[3],
            ircut: values[4],
            wb_mode: values[5],
            wb_index_type: values[6],
            wb_index: values[7],
            brightness: values[8],
            contrast: values[9],
            hue: values[10],
            saturation: values[11],
            sharpness: values[12],
        })
    }

    /// True when no field has ever been set.
    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(Option::is_none)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
