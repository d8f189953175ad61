pub mod commands;
pub mod modules;

pub use modules::backup::BackupEngine;
pub use modules::cleaner::Cleaner;
pub use modules::common::cancel::CancelFlag;
pub use modules::common::config::AppConfig;
pub use modules::common::error::CleanerError;
pub use modules::common::progress::{ProgressInfo, ProgressReporter, ProgressState};
pub use modules::common::utils;
pub use modules::detector::DetectionEngine;
