//! Pure domain state with no I/O dependencies.

pub mod params;

pub use params::CamParams;
