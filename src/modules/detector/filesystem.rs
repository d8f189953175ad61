use std::path::{Path, PathBuf};

use regex::Regex;

use super::models::{DetectionMethod, InstallationCandidate};
use super::scoring::FILESYSTEM_BASE_SCORE;
use crate::modules::common::config::{KnownFolders, ProductProfile};
use crate::modules::common::error::CleanerError;
use crate::modules::probe::filesystem::FileSystemProbe;

/// 在 Program Files 下查找含有主程序的安装目录
pub fn scan_install_dirs(
    fs: &dyn FileSystemProbe,
    profile: &ProductProfile,
    folders: &KnownFolders,
) -> Result<Vec<InstallationCandidate>, CleanerError> {
    let mut candidates = Vec::new();

    for root in &folders.program_files {
        // 安装目录通常在 Program Files\Adobe 下，也兼容直接放在 Program Files 下
        for parent in [root.join("Adobe"), root.clone()] {
            if !fs.exists(&parent) {
                continue;
            }

            tracing::debug!("扫描目录: {}", parent.display());
            for dir in fs.find(&parent, &profile.install_dir_pattern, false) {
                if let Some(candidate) = inspect_install_dir(fs, profile, folders, &dir) {
                    candidates.push(candidate);
                }
            }
        }
    }

    Ok(candidates)
}

/// 检查单个目录；没有主程序时返回 None
pub fn inspect_install_dir(
    fs: &dyn FileSystemProbe,
    profile: &ProductProfile,
    folders: &KnownFolders,
    dir: &Path,
) -> Option<InstallationCandidate> {
    if !fs.exists(&dir.join(&profile.executable)) {
        return None;
    }

    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| dir.to_string_lossy().to_string());

    let mut candidate = InstallationCandidate::new(name.clone(), DetectionMethod::FileSystem)
        .with_base_score(FILESYSTEM_BASE_SCORE)
        .with_install_path(dir.to_path_buf());

    candidate.version = version_from_dir_name(&name);
    candidate.estimated_size = fs.size(dir);
    candidate.additional_paths = user_data_dirs(fs, profile, folders);

    Some(candidate)
}

/// 用户数据目录（Roaming / Local 的 Adobe 子目录下匹配同一模式的目录）
fn user_data_dirs(fs: &dyn FileSystemProbe, profile: &ProductProfile, folders: &KnownFolders) -> Vec<PathBuf> {
    [&folders.roaming_app_data, &folders.local_app_data]
        .into_iter()
        .flatten()
        .map(|base| base.join("Adobe"))
        .filter(|adobe| fs.exists(adobe))
        .flat_map(|adobe| fs.find(&adobe, &profile.install_dir_pattern, false))
        .filter(|path| path.is_dir())
        .collect()
}

/// 从目录名中提取版本：优先点分版本号，其次年份
pub fn version_from_dir_name(name: &str) -> Option<String> {
    let dotted = Regex::new(r"\d+(?:\.\d+)+").ok()?;
    if let Some(found) = dotted.find(name) {
        return Some(found.as_str().to_string());
    }

    let year = Regex::new(r"\b(20\d{2})\b").ok()?;
    year.captures(name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::probe::filesystem::LocalFileSystem;
    use std::fs;

    #[test]
    fn version_from_dir_name_prefers_dotted_versions() {
        assert_eq!(version_from_dir_name("Adobe Photoshop 2024").as_deref(), Some("2024"));
        assert_eq!(version_from_dir_name("Adobe Photoshop CC 19.1").as_deref(), Some("19.1"));
        assert_eq!(version_from_dir_name("Adobe Photoshop"), None);
    }

    #[test]
    fn finds_install_dirs_with_executable_only() {
        let root = std::env::temp_dir().join(format!("ps-cleaner-detect-fs-{}", uuid::Uuid::new_v4()));
        let folders = KnownFolders::rooted_at(&root);
        let adobe = root.join("Program Files").join("Adobe");
        assert!(fs::create_dir_all(adobe.join("Adobe Photoshop 2024")).is_ok());
        assert!(fs::write(adobe.join("Adobe Photoshop 2024").join("Photoshop.exe"), vec![0u8; 10]).is_ok());
        assert!(fs::create_dir_all(adobe.join("Adobe Photoshop 2020")).is_ok());

        let roaming = folders.roaming_app_data.clone().unwrap_or_default();
        assert!(fs::create_dir_all(roaming.join("Adobe").join("Adobe Photoshop 2024")).is_ok());

        let found = scan_install_dirs(&LocalFileSystem::default(), &ProductProfile::photoshop(), &folders)
            .unwrap_or_default();

        assert_eq!(found.len(), 1);
        let candidate = &found[0];
        assert_eq!(candidate.display_name, "Adobe Photoshop 2024");
        assert_eq!(candidate.base_score, FILESYSTEM_BASE_SCORE);
        assert_eq!(candidate.estimated_size, 10);
        assert_eq!(candidate.version.as_deref(), Some("2024"));
        assert_eq!(candidate.additional_paths.len(), 1);

        let _ = fs::remove_dir_all(&root);
    }
}
