//! # dwarflink-core
//!
//! Shared library for DwarfLink containing the wire protocol codec, the
//! subsystem/command identifier tables, and the camera parameter model.
//!
//! This crate is used by the client application and by anything else that
//! needs to speak the device protocol (test harnesses, simulators).  It has
//! zero dependencies on OS APIs, UI frameworks, or network sockets.
//!
//! # Architecture overview
//!
//! DwarfLink is a control client for a WiFi-attached smart telescope.  The
//! device exposes a persistent binary-framed command channel plus a small
//! HTTP surface used only during discovery.  This crate defines:
//!
//! - **`protocol`** – How bytes travel over the control channel.  Every
//!   command and telemetry message is wrapped in a versioned frame envelope
//!   (22-byte header + session id + payload) and decoded back into
//!   `(module, cmd, payload)` triples on arrival.
//!
//! - **`domain`** – Pure state with no I/O.  The most important piece is
//!   [`CamParams`]: the cumulative per-camera parameter overlay that is sent
//!   to the device as a full snapshot on every mutation.

pub mod domain;
pub mod protocol;

pub use domain::params::CamParams;
pub use protocol::commands::CmdResponse;
pub use protocol::envelope::{decode_frame, encode_frame, Frame, FrameError};
pub use protocol::modules::{CameraKind, ModuleId, MotorAxis};
