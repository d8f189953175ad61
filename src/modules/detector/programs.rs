use std::path::PathBuf;

use super::models::{DetectionMethod, InstallationCandidate};
use crate::modules::common::config::ProductProfile;
use crate::modules::common::error::CleanerError;
use crate::modules::common::utils;
use crate::modules::probe::filesystem::FileSystemProbe;
use crate::modules::probe::registry::RegistryProbe;

/// 从“已安装程序”列表（Uninstall 键）中查找目标产品
pub fn scan_installed_programs(
    registry: &dyn RegistryProbe,
    fs: &dyn FileSystemProbe,
    profile: &ProductProfile,
) -> Result<Vec<InstallationCandidate>, CleanerError> {
    let mut candidates = Vec::new();
    let mut readable_roots = 0;

    for root in &profile.uninstall_roots {
        if !registry.key_exists(root) {
            tracing::debug!("无法打开注册表路径 {}", root);
            continue;
        }
        readable_roots += 1;

        for name in registry.list_subkeys(root) {
            let key_path = format!("{}\\{}", root, name);
            if let Some(candidate) = parse_uninstall_entry(registry, fs, &key_path, profile) {
                tracing::debug!("卸载列表命中: {} ({})", candidate.display_name, key_path);
                candidates.push(candidate);
            }
        }
    }

    if readable_roots == 0 {
        return Err(CleanerError::NotFound("无法读取任何卸载信息键".to_string()));
    }

    Ok(candidates)
}

/// 解析单个卸载项；DisplayName 不含产品关键词时返回 None
fn parse_uninstall_entry(
    registry: &dyn RegistryProbe,
    fs: &dyn FileSystemProbe,
    key_path: &str,
    profile: &ProductProfile,
) -> Option<InstallationCandidate> {
    let read = |name: &str| {
        registry
            .get_value(key_path, name)
            .and_then(|v| v.as_string())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    // 必须有 DisplayName
    let name = read("DisplayName")?;
    if !name.to_lowercase().contains(&profile.name_needle) {
        return None;
    }

    let mut candidate = InstallationCandidate::new(name, DetectionMethod::InstalledPrograms);
    candidate.version = read("DisplayVersion");
    candidate.install_path = read("InstallLocation")
        .map(|p| PathBuf::from(p.trim_matches('"')));
    candidate.uninstall_command = read("UninstallString");
    candidate.install_date = read("InstallDate")
        .as_deref()
        .and_then(utils::normalize_install_date);

    // EstimatedSize 单位为 KB
    if let Some(size) = registry
        .get_value(key_path, "EstimatedSize")
        .and_then(|v| v.as_u64())
    {
        candidate.estimated_size = size * 1024;
    }

    candidate.registry_keys.push(key_path.to_string());

    candidate.uninstaller_verified = candidate
        .uninstall_str()
        .and_then(utils::extract_executable)
        .map(|exe| exe.is_absolute() && fs.exists(&exe))
        .unwrap_or(false);

    Some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::probe::filesystem::LocalFileSystem;
    use crate::modules::probe::registry::{MemoryRegistry, RegistryValue};

    const UNINSTALL: &str = r"HKLM\SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall";

    fn string(value: &str) -> RegistryValue {
        RegistryValue::String(value.to_string())
    }

    #[test]
    fn matching_entries_become_candidates() {
        let registry = MemoryRegistry::new();
        let key = format!(r"{}\PHSP_25_0", UNINSTALL);
        registry.set_value(&key, "DisplayName", string("Adobe Photoshop 2024"));
        registry.set_value(&key, "DisplayVersion", string("25.0"));
        registry.set_value(&key, "InstallLocation", string(r"C:\Program Files\Adobe\Adobe Photoshop 2024"));
        registry.set_value(&key, "UninstallString", string(r#""C:\Nowhere\Uninstaller.exe" --uninstall"#));
        registry.set_value(&key, "InstallDate", string("20240115"));
        registry.set_value(&key, "EstimatedSize", RegistryValue::Dword(2048));

        let other = format!(r"{}\Notepad++", UNINSTALL);
        registry.set_value(&other, "DisplayName", string("Notepad++"));

        let found = scan_installed_programs(&registry, &LocalFileSystem::default(), &ProductProfile::photoshop())
            .unwrap_or_default();

        assert_eq!(found.len(), 1);
        let candidate = &found[0];
        assert_eq!(candidate.version.as_deref(), Some("25.0"));
        assert_eq!(candidate.install_date.as_deref(), Some("2024-01-15"));
        assert_eq!(candidate.estimated_size, 2048 * 1024);
        assert_eq!(candidate.registry_keys, vec![key]);
        assert!(!candidate.uninstaller_verified);
    }

    #[test]
    fn verified_uninstaller_is_detected() {
        let root = std::env::temp_dir().join(format!("ps-cleaner-programs-{}", uuid::Uuid::new_v4()));
        assert!(std::fs::create_dir_all(&root).is_ok());
        let exe = root.join("Uninstaller.exe");
        assert!(std::fs::write(&exe, b"MZ").is_ok());

        let registry = MemoryRegistry::new();
        let key = format!(r"{}\PHSP_25_0", UNINSTALL);
        registry.set_value(&key, "DisplayName", string("Adobe Photoshop 2024"));
        registry.set_value(&key, "UninstallString", string(&format!("\"{}\" --uninstall=1", exe.display())));

        let found = scan_installed_programs(&registry, &LocalFileSystem::default(), &ProductProfile::photoshop())
            .unwrap_or_default();

        assert_eq!(found.len(), 1);
        assert!(found[0].uninstaller_verified);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn missing_uninstall_roots_is_an_error() {
        let registry = MemoryRegistry::new();
        let result = scan_installed_programs(&registry, &LocalFileSystem::default(), &ProductProfile::photoshop());
        assert!(result.is_err());
    }
}
