//! 运行配置
//!
//! 备份根目录、重试策略、产品特征（注册表键、目录模式、进程名）和系统已知目录
//! 都在这里集中构造，再显式传给各个引擎。

use std::path::{Path, PathBuf};
use std::time::Duration;

/// 备份根目录名（位于“文档”目录下）
pub const BACKUP_DIR_NAME: &str = "PhotoshopBackups";

/// 备份根目录覆盖用的环境变量
pub const BACKUP_DIR_ENV: &str = "PS_CLEANER_BACKUP_DIR";

const DEFAULT_DELETE_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(200);
const DEFAULT_UNINSTALL_TIMEOUT: Duration = Duration::from_secs(600);

/// 目标产品的特征描述
#[derive(Debug, Clone)]
pub struct ProductProfile {
    /// 用于匹配 DisplayName 的关键词（小写）
    pub name_needle: String,
    /// 主程序文件名
    pub executable: String,
    /// 安装目录 / 用户数据目录的 glob 模式
    pub install_dir_pattern: String,
    /// 厂商注册表键，每个子键对应一个版本
    pub vendor_keys: Vec<String>,
    /// 卸载信息所在的注册表键
    pub uninstall_roots: Vec<String>,
    /// 临时目录下的残留模式
    pub temp_patterns: Vec<String>,
    /// Roaming AppData 下的配置目录（相对路径 + 模式）
    pub config_patterns: Vec<(String, String)>,
    /// Local AppData 下的缓存目录（相对路径 + 模式）
    pub cache_patterns: Vec<(String, String)>,
    /// 需要在清理前结束的进程
    pub process_names: Vec<String>,
}

impl ProductProfile {
    pub fn photoshop() -> Self {
        Self {
            name_needle: "photoshop".to_string(),
            executable: "Photoshop.exe".to_string(),
            install_dir_pattern: "Adobe Photoshop*".to_string(),
            vendor_keys: vec![
                r"HKLM\SOFTWARE\Adobe\Photoshop".to_string(),
                r"HKLM\SOFTWARE\WOW6432Node\Adobe\Photoshop".to_string(),
                r"HKCU\Software\Adobe\Photoshop".to_string(),
            ],
            uninstall_roots: vec![
                r"HKLM\SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall".to_string(),
                r"HKLM\SOFTWARE\WOW6432Node\Microsoft\Windows\CurrentVersion\Uninstall"
                    .to_string(),
                r"HKCU\SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall".to_string(),
            ],
            temp_patterns: vec!["Photoshop Temp*".to_string(), "Adobe Photoshop*".to_string()],
            config_patterns: vec![("Adobe".to_string(), "Adobe Photoshop*".to_string())],
            cache_patterns: vec![
                ("Adobe".to_string(), "Adobe Photoshop*".to_string()),
                ("Adobe".to_string(), "Photoshop*".to_string()),
            ],
            process_names: vec![
                "Photoshop.exe".to_string(),
                "sniffer.exe".to_string(),
                "PhotoshopPrefsManager.exe".to_string(),
            ],
        }
    }
}

impl Default for ProductProfile {
    fn default() -> Self {
        Self::photoshop()
    }
}

/// 系统已知目录
#[derive(Debug, Clone, Default)]
pub struct KnownFolders {
    pub temp: PathBuf,
    pub roaming_app_data: Option<PathBuf>,
    pub local_app_data: Option<PathBuf>,
    pub program_files: Vec<PathBuf>,
}

impl KnownFolders {
    /// 从当前环境解析
    pub fn detect() -> Self {
        let mut program_files = Vec::new();
        for var in ["ProgramFiles", "ProgramFiles(x86)", "ProgramW6432"] {
            if let Ok(value) = std::env::var(var) {
                let path = PathBuf::from(value);
                if !program_files.contains(&path) {
                    program_files.push(path);
                }
            }
        }

        Self {
            temp: std::env::temp_dir(),
            roaming_app_data: dirs::data_dir(),
            local_app_data: dirs::data_local_dir(),
            program_files,
        }
    }

    /// 以某个根目录模拟整套已知目录（测试与沙箱运行时使用）
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            temp: root.join("Temp"),
            roaming_app_data: Some(root.join("AppData").join("Roaming")),
            local_app_data: Some(root.join("AppData").join("Local")),
            program_files: vec![root.join("Program Files")],
        }
    }
}

/// 应用配置
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 备份根目录，每次操作在其下创建一个子目录
    pub backup_root: PathBuf,
    /// 删除注册表前的临时导出目录
    pub scratch_root: PathBuf,
    /// 删除失败时的最大尝试次数
    pub delete_attempts: u32,
    /// 两次尝试之间的基础等待时间
    pub retry_delay: Duration,
    /// 卸载程序最长等待时间
    pub uninstall_timeout: Duration,
    pub profile: ProductProfile,
    pub folders: KnownFolders,
}

impl AppConfig {
    /// 读取默认配置，`backup_root` 可由调用方或环境变量覆盖
    pub fn load(backup_root: Option<PathBuf>) -> Self {
        let backup_root = backup_root
            .or_else(|| std::env::var_os(BACKUP_DIR_ENV).map(PathBuf::from))
            .unwrap_or_else(default_backup_root);

        Self {
            backup_root,
            scratch_root: std::env::temp_dir().join("ps-cleaner").join("registry-scratch"),
            delete_attempts: DEFAULT_DELETE_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            uninstall_timeout: DEFAULT_UNINSTALL_TIMEOUT,
            profile: ProductProfile::photoshop(),
            folders: KnownFolders::detect(),
        }
    }

    /// 所有路径都落在 `root` 下的配置，重试不等待
    pub fn sandboxed(root: &Path) -> Self {
        Self {
            backup_root: root.join(BACKUP_DIR_NAME),
            scratch_root: root.join("scratch"),
            delete_attempts: DEFAULT_DELETE_ATTEMPTS,
            retry_delay: Duration::ZERO,
            uninstall_timeout: Duration::from_secs(5),
            profile: ProductProfile::photoshop(),
            folders: KnownFolders::rooted_at(root),
        }
    }
}

/// 默认备份根目录：{文档}/PhotoshopBackups
pub fn default_backup_root() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(BACKUP_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_backup_root_wins() {
        let config = AppConfig::load(Some(PathBuf::from("D:/backups")));
        assert_eq!(config.backup_root, PathBuf::from("D:/backups"));
        assert_eq!(config.delete_attempts, 3);
    }

    #[test]
    fn default_backup_root_ends_with_product_folder() {
        assert!(default_backup_root().ends_with(BACKUP_DIR_NAME));
    }

    #[test]
    fn sandboxed_config_keeps_everything_under_root() {
        let root = PathBuf::from("/tmp/sandbox");
        let config = AppConfig::sandboxed(&root);
        assert!(config.backup_root.starts_with(&root));
        assert!(config.scratch_root.starts_with(&root));
        assert!(config.folders.temp.starts_with(&root));
        assert!(config.folders.program_files.iter().all(|p| p.starts_with(&root)));
    }
}
