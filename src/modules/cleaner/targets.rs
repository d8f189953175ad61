//! 各清理类别对应的具体目标

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::safety;
use crate::modules::common::config::{KnownFolders, ProductProfile};
use crate::modules::common::utils;
use crate::modules::detector::models::InstallationCandidate;
use crate::modules::probe::filesystem::FileSystemProbe;
use crate::modules::probe::registry::RegistryProbe;

/// 临时目录下的残留
pub fn temp_targets(fs: &dyn FileSystemProbe, profile: &ProductProfile, folders: &KnownFolders) -> Vec<PathBuf> {
    let found = profile
        .temp_patterns
        .iter()
        .flat_map(|pattern| matching(fs, &folders.temp, pattern))
        .collect();
    filter_safe(found, folders)
}

/// Roaming AppData 下的配置目录
pub fn config_targets(fs: &dyn FileSystemProbe, profile: &ProductProfile, folders: &KnownFolders) -> Vec<PathBuf> {
    let found = match &folders.roaming_app_data {
        Some(base) => patterned(fs, base, &profile.config_patterns),
        None => Vec::new(),
    };
    filter_safe(found, folders)
}

/// Local AppData 下的缓存目录
pub fn cache_targets(fs: &dyn FileSystemProbe, profile: &ProductProfile, folders: &KnownFolders) -> Vec<PathBuf> {
    let found = match &folders.local_app_data {
        Some(base) => patterned(fs, base, &profile.cache_patterns),
        None => Vec::new(),
    };
    filter_safe(found, folders)
}

/// 需要删除的注册表键：候选项自身的键加上现存的厂商键
pub fn registry_targets(
    registry: &dyn RegistryProbe,
    candidate: &InstallationCandidate,
    profile: &ProductProfile,
) -> Vec<String> {
    let mut seen = HashSet::new();

    candidate
        .registry_keys
        .iter()
        .chain(profile.vendor_keys.iter())
        .filter(|key| registry.key_exists(key))
        .filter(|key| match safety::check_registry_key(key) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("跳过注册表项 {}: {}", key, e);
                false
            }
        })
        .filter(|key| seen.insert(key.to_lowercase()))
        .cloned()
        .collect()
}

fn patterned(fs: &dyn FileSystemProbe, base: &Path, patterns: &[(String, String)]) -> Vec<PathBuf> {
    patterns
        .iter()
        .flat_map(|(relative, pattern)| matching(fs, &base.join(relative), pattern))
        .collect()
}

fn matching(fs: &dyn FileSystemProbe, dir: &Path, pattern: &str) -> Vec<PathBuf> {
    if !fs.exists(dir) {
        return Vec::new();
    }
    fs.find(dir, pattern, false).collect()
}

/// 去重并剔除安全检查不通过的路径
fn filter_safe(paths: Vec<PathBuf>, folders: &KnownFolders) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|path| seen.insert(utils::path_key(&path.to_string_lossy())))
        .filter(|path| match safety::check_path(path, folders) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("跳过 {}: {}", path.display(), e);
                false
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::detector::models::DetectionMethod;
    use crate::modules::probe::filesystem::LocalFileSystem;
    use crate::modules::probe::registry::{MemoryRegistry, RegistryValue};
    use std::fs;

    #[test]
    fn category_targets_follow_the_profile() {
        let root = std::env::temp_dir().join(format!("ps-cleaner-targets-{}", uuid::Uuid::new_v4()));
        let folders = KnownFolders::rooted_at(&root);
        let profile = ProductProfile::photoshop();
        let roaming = folders.roaming_app_data.clone().unwrap_or_default();
        let local = folders.local_app_data.clone().unwrap_or_default();

        for dir in [
            folders.temp.join("Photoshop Temp1234"),
            folders.temp.join("unrelated"),
            roaming.join("Adobe").join("Adobe Photoshop 2024"),
            roaming.join("Adobe").join("Lightroom"),
            local.join("Adobe").join("Photoshop").join("Cache"),
        ] {
            assert!(fs::create_dir_all(&dir).is_ok());
        }

        let probe = LocalFileSystem::default();
        let temp = temp_targets(&probe, &profile, &folders);
        let config = config_targets(&probe, &profile, &folders);
        let cache = cache_targets(&probe, &profile, &folders);

        assert_eq!(temp, vec![folders.temp.join("Photoshop Temp1234")]);
        assert_eq!(config, vec![roaming.join("Adobe").join("Adobe Photoshop 2024")]);
        assert_eq!(cache, vec![local.join("Adobe").join("Photoshop")]);

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn registry_targets_are_existing_and_safe() {
        let registry = MemoryRegistry::new();
        registry.set_value(r"HKCU\Software\Adobe\Photoshop\250.0", "Theme", RegistryValue::Dword(1));

        let mut candidate = InstallationCandidate::new("PS".to_string(), DetectionMethod::Registry);
        candidate.registry_keys = vec![
            r"HKCU\Software\Adobe\Photoshop\250.0".to_string(),
            r"HKLM\SYSTEM\CurrentControlSet".to_string(),
            r"HKCU\Software\Adobe\Photoshop\999.0".to_string(),
        ];
        registry.create_key(r"HKLM\SYSTEM\CurrentControlSet");

        let targets = registry_targets(&registry, &candidate, &ProductProfile::photoshop());
        assert_eq!(
            targets,
            vec![
                r"HKCU\Software\Adobe\Photoshop\250.0".to_string(),
                r"HKCU\Software\Adobe\Photoshop".to_string(),
            ]
        );
    }
}
