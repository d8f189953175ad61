use serde::{Deserialize, Serialize};

/// 所有变更类操作的统一返回值
///
/// 部分失败仍然 `success = true`，失败明细写在 `message` 里。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub canceled: bool,
    pub error: Option<String>,
    pub message: String,
    pub backup_id: Option<String>,
}

impl OperationResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            message: error.clone(),
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn canceled() -> Self {
        Self {
            success: false,
            canceled: true,
            message: "操作已取消".to_string(),
            ..Default::default()
        }
    }

    pub fn with_backup_id(mut self, backup_id: Option<String>) -> Self {
        self.backup_id = backup_id;
        self
    }
}

impl std::fmt::Display for OperationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.canceled {
            "已取消"
        } else if self.success {
            "成功"
        } else {
            "失败"
        };
        write!(f, "[{}] {}", status, self.message)?;
        if let Some(id) = &self.backup_id {
            write!(f, " (备份: {})", id)?;
        }
        Ok(())
    }
}

/// 清理选项，每个开关对应一个阶段
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupOptions {
    pub stop_processes: bool,
    pub create_backup: bool,
    pub temp_files: bool,
    pub registry: bool,
    pub config_files: bool,
    pub cache_files: bool,
    /// 无法删除的路径登记为重启后删除
    pub schedule_on_reboot: bool,
    /// 只演练，不做任何破坏性操作
    pub simulate: bool,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            stop_processes: true,
            create_backup: true,
            temp_files: true,
            registry: true,
            config_files: true,
            cache_files: true,
            schedule_on_reboot: true,
            simulate: false,
        }
    }
}

/// 卸载选项：先运行卸载程序，再按清理选项处理残留
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UninstallOptions {
    pub run_uninstaller: bool,
    /// 卸载后删除安装目录
    pub remove_install_dir: bool,
    pub cleanup: CleanupOptions,
}

impl Default for UninstallOptions {
    fn default() -> Self {
        Self {
            run_uninstaller: true,
            remove_install_dir: true,
            cleanup: CleanupOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_flags() {
        assert!(OperationResult::ok("done").success);
        let failed = OperationResult::failed("boom");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        let canceled = OperationResult::canceled();
        assert!(canceled.canceled && !canceled.success);
    }

    #[test]
    fn display_mentions_backup() {
        let result = OperationResult::ok("清理完成").with_backup_id(Some("Cleanup_1".to_string()));
        assert_eq!(result.to_string(), "[成功] 清理完成 (备份: Cleanup_1)");
    }
}
