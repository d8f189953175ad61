use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::error::CleanerError;

/// 协作式取消标记，在各阶段、各条目之间轮询
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    canceled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// 已取消时返回 `CleanerError::Canceled`，便于在内部流程中用 `?` 提前返回
    pub fn check(&self) -> Result<(), CleanerError> {
        if self.is_canceled() {
            Err(CleanerError::Canceled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_same_signal() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(flag.check().is_ok());

        other.cancel();
        assert!(flag.is_canceled());
        assert!(matches!(flag.check(), Err(CleanerError::Canceled)));
    }
}
