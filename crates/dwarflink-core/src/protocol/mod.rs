//! Protocol module containing the frame envelope codec, identifier tables,
//! and per-command payload encoders.

pub mod commands;
pub mod envelope;
pub mod modules;

pub use commands::CmdResponse;
pub use envelope::{decode_frame, encode_frame, Frame, FrameError};
pub use modules::*;
