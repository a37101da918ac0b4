//! Subsystem (module) identifiers and the per-target command id tables.
//!
//! These numeric values are the wire contract with the device firmware and
//! must match it exactly.  Note that the two physical cameras use *different*
//! command ids for the same logical operation — the lookup is keyed by
//! [`CameraKind`], not shared.

/// Module id used by keepalive frames (paired with [`KEEPALIVE_CMD`]).
pub const KEEPALIVE_MODULE: u32 = 0;

/// Command id used by keepalive frames.
pub const KEEPALIVE_CMD: u32 = 0;

/// Subsystem identifier carried in every frame.
///
/// Anything outside this set is routed to the dispatcher's unrecognized
/// channel; new firmware modules must not break existing clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ModuleId {
    /// Primary (telephoto) camera.
    CameraTele = 1,
    /// Secondary (wide-angle) camera.
    CameraWide = 2,
    /// Celestial tracking / astro functions.
    Astro = 3,
    /// System status and settings.
    System = 4,
    /// Ring light / illumination control.
    RgbPower = 5,
    /// Azimuth/altitude motors.
    Motor = 6,
    /// Target tracking.
    Track = 7,
    /// Focuser.
    Focus = 8,
    /// Asynchronous notifications.
    Notify = 9,
    /// Panorama capture.
    Panorama = 10,
}

impl ModuleId {
    /// Maps a raw wire value to a known module, or `None` for the
    /// unrecognized bucket.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(ModuleId::CameraTele),
            2 => Some(ModuleId::CameraWide),
            3 => Some(ModuleId::Astro),
            4 => Some(ModuleId::System),
            5 => Some(ModuleId::RgbPower),
            6 => Some(ModuleId::Motor),
            7 => Some(ModuleId::Track),
            8 => Some(ModuleId::Focus),
            9 => Some(ModuleId::Notify),
            10 => Some(ModuleId::Panorama),
            _ => None,
        }
    }
}

/// Which physical camera a command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraKind {
    /// Telephoto camera — the only target that supports video recording.
    Tele,
    /// Wide-angle camera.
    Wide,
}

impl CameraKind {
    /// Module id for this camera's frames.
    pub fn module_id(self) -> u32 {
        match self {
            CameraKind::Tele => ModuleId::CameraTele as u32,
            CameraKind::Wide => ModuleId::CameraWide as u32,
        }
    }

    /// Command id: open the camera pipeline.
    pub fn cmd_open(self) -> u32 {
        match self {
            CameraKind::Tele => 10000,
            CameraKind::Wide => 12000,
        }
    }

    /// Command id: close the camera pipeline.
    pub fn cmd_close(self) -> u32 {
        match self {
            CameraKind::Tele => 10001,
            CameraKind::Wide => 12001,
        }
    }

    /// Command id: capture a single photo.
    pub fn cmd_photo(self) -> u32 {
        match self {
            CameraKind::Tele => 10002,
            CameraKind::Wide => 12022,
        }
    }

    /// Command id: start video recording.  Tele only.
    pub fn cmd_start_record(self) -> Option<u32> {
        match self {
            CameraKind::Tele => Some(10005),
            CameraKind::Wide => None,
        }
    }

    /// Command id: stop video recording.  Tele only.
    pub fn cmd_stop_record(self) -> Option<u32> {
        match self {
            CameraKind::Tele => Some(10006),
            CameraKind::Wide => None,
        }
    }

    /// Command id: push the full parameter snapshot.
    pub fn cmd_set_all_params(self) -> u32 {
        match self {
            CameraKind::Tele => 10035,
            CameraKind::Wide => 12028,
        }
    }
}

/// Motor axis selector for run/stop commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum MotorAxis {
    Azimuth = 0,
    Altitude = 1,
}

/// Command id: run a motor.
pub const CMD_MOTOR_RUN: u32 = 14000;

/// Command id: stop a motor.
pub const CMD_MOTOR_STOP: u32 = 14002;

/// Command id: start a normal auto-focus pass.
pub const CMD_FOCUS_AUTO: u32 = 15000;

/// Command id: single manual focus step.
pub const CMD_FOCUS_MANUAL_STEP: u32 = 15001;
