use std::path::PathBuf;

use super::models::{DetectionMethod, InstallationCandidate};
use crate::modules::common::config::ProductProfile;
use crate::modules::common::error::CleanerError;
use crate::modules::common::utils;
use crate::modules::probe::registry::RegistryProbe;

/// 扫描厂商注册表键，每个版本子键对应一个候选项
pub fn scan_vendor_keys(
    registry: &dyn RegistryProbe,
    profile: &ProductProfile,
) -> Result<Vec<InstallationCandidate>, CleanerError> {
    let mut candidates = Vec::new();

    for vendor_key in &profile.vendor_keys {
        if !registry.key_exists(vendor_key) {
            continue;
        }

        for name in registry.list_subkeys(vendor_key) {
            // 只关心形如 250.0 的版本子键
            let Some(version) = vendor_key_version(&name) else {
                continue;
            };

            let key_path = format!("{}\\{}", vendor_key, name);
            let mut candidate = InstallationCandidate::new(
                format!("Adobe Photoshop {}", version),
                DetectionMethod::Registry,
            )
            .with_version(version);

            candidate.install_path = registry
                .get_value(&key_path, "ApplicationPath")
                .and_then(|v| v.as_string())
                .map(|s| s.trim().trim_matches('"').to_string())
                .filter(|s| !s.is_empty())
                .map(PathBuf::from);

            candidate.registry_keys.push(key_path);
            candidates.push(candidate);
        }
    }

    Ok(candidates)
}

/// 厂商键里的内部版本号（如 `250.0`）换算为对外版本号（`25.0`）
pub fn vendor_key_version(name: &str) -> Option<String> {
    let parts = utils::parse_version(name)?;
    let major = parts[0];

    if major >= 100 && major % 10 == 0 {
        let rest: Vec<String> = parts[1..].iter().map(u32::to_string).collect();
        Some(format!("{}.{}", major / 10, rest.join(".")))
    } else {
        Some(name.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::probe::registry::{MemoryRegistry, RegistryValue};

    #[test]
    fn internal_versions_are_mapped() {
        assert_eq!(vendor_key_version("250.0").as_deref(), Some("25.0"));
        assert_eq!(vendor_key_version("180.0").as_deref(), Some("18.0"));
        assert_eq!(vendor_key_version("25.1").as_deref(), Some("25.1"));
        assert_eq!(vendor_key_version("Settings"), None);
    }

    #[test]
    fn version_subkeys_become_candidates() {
        let registry = MemoryRegistry::new();
        registry.set_value(
            r"HKLM\SOFTWARE\Adobe\Photoshop\250.0",
            "ApplicationPath",
            RegistryValue::String(r"C:\Program Files\Adobe\Adobe Photoshop 2024\".to_string()),
        );
        registry.create_key(r"HKCU\Software\Adobe\Photoshop\250.0");
        registry.create_key(r"HKCU\Software\Adobe\Photoshop\Plugins");

        let found = scan_vendor_keys(&registry, &ProductProfile::photoshop()).unwrap_or_default();

        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|c| c.version.as_deref() == Some("25.0")));
        assert_eq!(
            found[0].install_path,
            Some(PathBuf::from(r"C:\Program Files\Adobe\Adobe Photoshop 2024\"))
        );
        assert_eq!(found[1].install_path, None);
    }
}
