//! dwarflink-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/` and
//! the binary entry point in `main.rs` share the same module tree.
//!
//! The client owns the four pieces of the device communication layer:
//!
//! 1. The **connection manager** holds one WebSocket session to the device,
//!    frames outgoing commands, decodes inbound frames, and keeps the
//!    transport alive with periodic no-op frames.
//! 2. The **dispatcher** fans decoded inbound messages out to per-subsystem
//!    channels (camera, motor, focus, notifications, …).
//! 3. The **discovery engine** sweeps a subnet with bounded-concurrency TCP
//!    probes to find candidate devices before any connection exists.
//! 4. The **controllers** translate high-level intents ("set brightness",
//!    "run the azimuth motor") into wire commands, keeping per-camera
//!    parameter state so every mutation re-sends a full snapshot.

/// Application layer: dispatcher and command controllers.
pub mod application;

/// Infrastructure layer: network sessions, discovery, and config storage.
pub mod infrastructure;
