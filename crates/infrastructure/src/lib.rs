//! Lodestone DNS Infrastructure Layer
//!
//! The resolution-and-cache core: wire codec, name store, cache updater,
//! query tracking, response validation, answer building and the tokio
//! driver.
pub mod dns;
pub mod logging;

pub use logging::init_logging;
