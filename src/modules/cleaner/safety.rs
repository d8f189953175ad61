use std::path::Path;

use crate::modules::common::config::KnownFolders;
use crate::modules::common::error::CleanerError;
use crate::modules::common::utils;
use crate::modules::probe::registry::RegistryPath;

/// 关键系统路径黑名单（含子路径）
const CRITICAL_PATHS: &[&str] = &[
    r"C:\Windows",
    r"C:\Windows\System32",
    r"C:\Windows\SysWOW64",
    r"C:\Windows\WinSxS",
    r"C:\Windows\INF",
    r"C:\Windows\DriverStore",
    r"C:\Windows\System32\DriverStore",
    r"C:\Program Files\Common Files\Microsoft Shared",
];

/// 关键注册表路径黑名单（含子键）
const CRITICAL_REGISTRY_PATHS: &[&str] = &[
    r"HKLM\SYSTEM",
    r"HKLM\SOFTWARE\Microsoft\Windows NT\CurrentVersion",
    r"HKLM\SOFTWARE\Microsoft\Windows\CurrentVersion\Run",
    r"HKLM\SOFTWARE\Microsoft\Windows\CurrentVersion\RunOnce",
    r"HKLM\SOFTWARE\WOW6432Node\Microsoft\Windows\CurrentVersion\Run",
    r"HKLM\BOOT",
    r"HKLM\SAM",
    r"HKLM\SECURITY",
];

/// 只保护键本身、不保护子键的注册表路径
const PROTECTED_REGISTRY_KEYS: &[&str] = &[
    r"HKLM\SOFTWARE",
    r"HKLM\SOFTWARE\WOW6432Node",
    r"HKCU\Software",
    r"HKLM\SOFTWARE\Adobe",
    r"HKCU\Software\Adobe",
    r"HKLM\SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall",
    r"HKLM\SOFTWARE\WOW6432Node\Microsoft\Windows\CurrentVersion\Uninstall",
    r"HKCU\Software\Microsoft\Windows\CurrentVersion\Uninstall",
];

/// 删除文件或目录前检查
pub fn check_path(path: &Path, folders: &KnownFolders) -> Result<(), CleanerError> {
    let key = utils::path_key(&path.to_string_lossy());

    if key.is_empty() || path.parent().is_none() {
        return Err(CleanerError::CriticalSystemItem(format!(
            "不能删除根目录: {}",
            path.display()
        )));
    }

    if is_critical_path(&key) {
        return Err(CleanerError::CriticalSystemItem(format!(
            "不能删除关键系统目录: {}",
            path.display()
        )));
    }

    // 已知目录本身（临时目录、AppData、Program Files 等）不能整体删除
    let known_roots = std::iter::once(&folders.temp)
        .chain(folders.roaming_app_data.iter())
        .chain(folders.local_app_data.iter())
        .chain(folders.program_files.iter());
    for root in known_roots {
        let root_key = utils::path_key(&root.to_string_lossy());
        if key == root_key || key == format!("{}\\adobe", root_key) {
            return Err(CleanerError::CriticalSystemItem(format!(
                "不能删除系统目录: {}",
                path.display()
            )));
        }
    }

    Ok(())
}

/// 删除注册表键前检查
pub fn check_registry_key(path: &str) -> Result<(), CleanerError> {
    let parsed = RegistryPath::parse(path)
        .ok_or_else(|| CleanerError::Registry(format!("无效的注册表路径: {}", path)))?;

    if parsed.is_root() {
        return Err(CleanerError::CriticalSystemItem(format!(
            "不能删除注册表根: {}",
            path
        )));
    }

    let key = parsed.key();
    if is_critical_registry(&key) {
        return Err(CleanerError::CriticalSystemItem(format!(
            "不能删除关键系统注册表项: {}",
            path
        )));
    }

    if PROTECTED_REGISTRY_KEYS
        .iter()
        .any(|protected| protected.to_lowercase() == key)
    {
        return Err(CleanerError::CriticalSystemItem(format!(
            "不能删除共享注册表项: {}",
            path
        )));
    }

    Ok(())
}

/// 检查是否为关键系统路径
fn is_critical_path(key: &str) -> bool {
    CRITICAL_PATHS.iter().any(|critical| {
        let critical = critical.to_lowercase();
        key == critical || key.starts_with(&format!("{}\\", critical))
    })
}

/// 检查是否为关键注册表路径
fn is_critical_registry(key: &str) -> bool {
    CRITICAL_REGISTRY_PATHS.iter().any(|critical| {
        let critical = critical.to_lowercase();
        key == critical || key.starts_with(&format!("{}\\", critical))
    })
}
