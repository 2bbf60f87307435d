//! Process bootstrap for contract servers: layered configuration, logging
//! and shutdown signals.

pub mod config;
pub mod home_dir;
pub mod logging;
pub mod signals;

pub use config::*;
pub use logging::*;
pub use signals::*;
