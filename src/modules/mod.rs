pub mod backup;
pub mod cleaner;
pub mod common;
pub mod detector;
pub mod probe;
