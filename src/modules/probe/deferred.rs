//! 重启后删除
//!
//! 无法立即删除的路径交给操作系统在下次启动时删除。系统按扁平列表执行，
//! 不保证顺序，所以登记时必须先文件后目录。

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use walkdir::WalkDir;

pub trait RebootScheduler: Send + Sync {
    /// 登记单个路径，成功返回 true
    fn schedule(&self, path: &Path) -> bool;
}

/// 使用系统机制（Windows 上为 MoveFileExW + MOVEFILE_DELAY_UNTIL_REBOOT）
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRebootScheduler;

impl RebootScheduler for SystemRebootScheduler {
    #[cfg(windows)]
    fn schedule(&self, path: &Path) -> bool {
        use std::os::windows::ffi::OsStrExt;
        use windows::core::PCWSTR;
        use windows::Win32::Storage::FileSystem::{MoveFileExW, MOVEFILE_DELAY_UNTIL_REBOOT};

        let wide: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        match unsafe { MoveFileExW(PCWSTR(wide.as_ptr()), PCWSTR::null(), MOVEFILE_DELAY_UNTIL_REBOOT) } {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("登记重启删除失败 {}: {}", path.display(), e);
                false
            }
        }
    }

    #[cfg(not(windows))]
    fn schedule(&self, path: &Path) -> bool {
        tracing::warn!("当前平台不支持重启后删除: {}", path.display());
        false
    }
}

/// 只记录登记请求，不真正交给系统
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    scheduled: Mutex<Vec<PathBuf>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheduled(&self) -> Vec<PathBuf> {
        self.scheduled
            .lock()
            .map(|list| list.clone())
            .unwrap_or_default()
    }
}

impl RebootScheduler for RecordingScheduler {
    fn schedule(&self, path: &Path) -> bool {
        match self.scheduled.lock() {
            Ok(mut list) => {
                list.push(path.to_path_buf());
                true
            }
            Err(_) => false,
        }
    }
}

/// 自底向上列出路径：子项在前，所在目录在后
pub fn bottom_up_paths(root: &Path) -> Vec<PathBuf> {
    if !root.is_dir() {
        return vec![root.to_path_buf()];
    }

    WalkDir::new(root)
        .contents_first(true)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .collect()
}

/// 按自底向上顺序登记整棵树，返回登记成功和失败的路径
pub fn schedule_tree(scheduler: &dyn RebootScheduler, root: &Path) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut scheduled = Vec::new();
    let mut failed = Vec::new();

    for path in bottom_up_paths(root) {
        if scheduler.schedule(&path) {
            scheduled.push(path);
        } else {
            failed.push(path);
        }
    }

    (scheduled, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn bottom_up_lists_files_before_their_directories() {
        let root = std::env::temp_dir().join(format!("ps-cleaner-deferred-{}", uuid::Uuid::new_v4()));
        assert!(fs::create_dir_all(root.join("sub")).is_ok());
        assert!(fs::write(root.join("sub").join("a.dat"), b"a").is_ok());
        assert!(fs::write(root.join("b.dat"), b"b").is_ok());

        let order = bottom_up_paths(&root);
        let position = |p: &Path| order.iter().position(|x| x == p).unwrap_or(usize::MAX);

        assert_eq!(order.len(), 4);
        assert!(position(&root.join("sub").join("a.dat")) < position(&root.join("sub")));
        assert!(position(&root.join("sub")) < position(&root));
        assert!(position(&root.join("b.dat")) < position(&root));
        assert_eq!(order.last(), Some(&root));

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn schedule_tree_records_every_path() {
        let root = std::env::temp_dir().join(format!("ps-cleaner-deferred-{}", uuid::Uuid::new_v4()));
        assert!(fs::create_dir_all(&root).is_ok());
        assert!(fs::write(root.join("locked.dat"), b"x").is_ok());

        let scheduler = RecordingScheduler::new();
        let (ok, failed) = schedule_tree(&scheduler, &root);

        assert_eq!(ok.len(), 2);
        assert!(failed.is_empty());
        assert_eq!(scheduler.scheduled(), vec![root.join("locked.dat"), root.clone()]);

        let _ = fs::remove_dir_all(&root);
    }
}
