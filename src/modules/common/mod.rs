pub mod cancel;
pub mod config;
pub mod error;
pub mod logging;
pub mod progress;
pub mod utils;
