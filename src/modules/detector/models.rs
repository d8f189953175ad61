use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// 检测方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// 已安装程序列表（Uninstall 键）
    InstalledPrograms,
    /// 厂商注册表键
    Registry,
    /// 文件系统中找到主程序
    FileSystem,
    /// 调用方手动指定
    Manual,
}

impl DetectionMethod {
    /// 合并时的优先级，数值越小越可信
    pub fn priority(self) -> u8 {
        match self {
            DetectionMethod::InstalledPrograms => 0,
            DetectionMethod::Registry => 1,
            DetectionMethod::FileSystem => 2,
            DetectionMethod::Manual => 3,
        }
    }
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionMethod::InstalledPrograms => write!(f, "已安装程序"),
            DetectionMethod::Registry => write!(f, "注册表"),
            DetectionMethod::FileSystem => write!(f, "文件系统"),
            DetectionMethod::Manual => write!(f, "手动"),
        }
    }
}

/// 完整度等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompletenessTier {
    Complete,
    Partial,
    Residual,
    #[default]
    Unknown,
}

impl CompletenessTier {
    /// 由置信度分数决定等级：≥80 完整，≥40 部分，其余为残留
    pub fn from_score(score: u8) -> Self {
        if score >= 80 {
            CompletenessTier::Complete
        } else if score >= 40 {
            CompletenessTier::Partial
        } else {
            CompletenessTier::Residual
        }
    }
}

impl std::fmt::Display for CompletenessTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletenessTier::Complete => write!(f, "完整安装"),
            CompletenessTier::Partial => write!(f, "部分安装"),
            CompletenessTier::Residual => write!(f, "残留"),
            CompletenessTier::Unknown => write!(f, "未知"),
        }
    }
}

/// 检测到的安装候选项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationCandidate {
    pub display_name: String,
    pub version: Option<String>,
    pub install_path: Option<PathBuf>,
    pub uninstall_command: Option<String>,
    pub install_date: Option<String>,
    pub estimated_size: u64,
    pub additional_paths: Vec<PathBuf>,
    pub registry_keys: Vec<String>,
    pub method: DetectionMethod,
    /// 置信度 0-100
    pub score: u8,
    pub tier: CompletenessTier,
    /// 卸载命令引用的可执行文件确实存在
    #[serde(default)]
    pub uninstaller_verified: bool,
    /// 探针给出的起始分
    #[serde(default)]
    pub base_score: u8,
    /// 被合并进来的候选项数量
    #[serde(default)]
    pub corroborations: u32,
}

impl InstallationCandidate {
    pub fn new(display_name: String, method: DetectionMethod) -> Self {
        Self {
            display_name,
            version: None,
            install_path: None,
            uninstall_command: None,
            install_date: None,
            estimated_size: 0,
            additional_paths: Vec::new(),
            registry_keys: Vec::new(),
            method,
            score: 0,
            tier: CompletenessTier::Unknown,
            uninstaller_verified: false,
            base_score: 0,
            corroborations: 0,
        }
    }

    pub fn with_version(mut self, version: String) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_install_path(mut self, path: PathBuf) -> Self {
        self.install_path = Some(path);
        self
    }

    pub fn with_base_score(mut self, base_score: u8) -> Self {
        self.base_score = base_score.min(100);
        self
    }

    /// 非空的版本号
    pub fn version_str(&self) -> Option<&str> {
        self.version.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    /// 非空的卸载命令
    pub fn uninstall_str(&self) -> Option<&str> {
        self.uninstall_command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    pub fn has_install_path(&self) -> bool {
        self.install_path
            .as_ref()
            .map(|p| !p.as_os_str().is_empty())
            .unwrap_or(false)
    }
}

/// 一次检测的结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionReport {
    /// 按分数从高到低排序
    pub candidates: Vec<InstallationCandidate>,
    pub canceled: bool,
    /// 失败的检测方式及原因
    pub method_errors: Vec<String>,
}
