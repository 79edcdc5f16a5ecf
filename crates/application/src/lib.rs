//! Lodestone DNS Application Layer
//!
//! Ports through which the resolution core reaches the outside world.
pub mod ports;
