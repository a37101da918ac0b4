//! Infrastructure layer: device session, LAN discovery, and config storage.

pub mod connection;
pub mod discovery;
pub mod storage;

pub use connection::{ConnectionConfig, ConnectionError, ConnectionEvent, ConnectionManager, ConnectionState};
pub use discovery::{DiscoveredDevice, DiscoveryConfig, DiscoveryEngine, DiscoveryEvent};
