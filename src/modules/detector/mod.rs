pub mod filesystem;
pub mod models;
pub mod programs;
pub mod registry;
pub mod scoring;

use std::path::Path;
use std::sync::Arc;

use crate::modules::common::cancel::CancelFlag;
use crate::modules::common::config::{AppConfig, KnownFolders, ProductProfile};
use crate::modules::common::error::CleanerError;
use crate::modules::common::progress::{ProgressReporter, ProgressState};
use crate::modules::probe::filesystem::FileSystemProbe;
use crate::modules::probe::registry::RegistryProbe;
use models::{DetectionMethod, DetectionReport, InstallationCandidate};

const TITLE: &str = "检测 Photoshop 安装";

/// 按顺序执行的检测方式及其进度区间
const METHODS: [(DetectionMethod, i32, i32); 3] = [
    (DetectionMethod::InstalledPrograms, 0, 30),
    (DetectionMethod::Registry, 30, 60),
    (DetectionMethod::FileSystem, 60, 90),
];

/// 安装检测引擎
pub struct DetectionEngine {
    registry: Arc<dyn RegistryProbe>,
    fs: Arc<dyn FileSystemProbe>,
    profile: ProductProfile,
    folders: KnownFolders,
}

impl DetectionEngine {
    pub fn new(
        registry: Arc<dyn RegistryProbe>,
        fs: Arc<dyn FileSystemProbe>,
        config: &AppConfig,
    ) -> Self {
        Self {
            registry,
            fs,
            profile: config.profile.clone(),
            folders: config.folders.clone(),
        }
    }

    /// 依次运行三种检测方式，合并、评分后按分数从高到低返回
    ///
    /// 单个检测方式失败只记录日志；只有取消会提前结束。
    pub async fn detect(&self, cancel: &CancelFlag, progress: &ProgressReporter) -> DetectionReport {
        tracing::info!("开始检测 {} 安装", self.profile.name_needle);
        let mut report = DetectionReport::default();
        let mut raw = Vec::new();

        for (method, start, end) in METHODS {
            if cancel.is_canceled() {
                return self.canceled(report, progress);
            }

            progress.running(start, TITLE, &format!("正在通过{}检测...", method));
            match self.run_method(method).await {
                Ok(found) => {
                    tracing::info!("{}检测发现 {} 个候选项", method, found.len());
                    raw.extend(found);
                }
                Err(e) => {
                    tracing::warn!("{}检测失败: {}", method, e);
                    report.method_errors.push(format!("{}: {}", method, e));
                }
            }
            progress.running(end, TITLE, &format!("{}检测完成", method));
        }

        if cancel.is_canceled() {
            return self.canceled(report, progress);
        }

        progress.running(90, TITLE, "正在合并并评分...");
        let mut candidates = scoring::merge_candidates(raw);
        for candidate in candidates.iter_mut() {
            scoring::finalize(candidate);
        }
        candidates.sort_by(|a, b| b.score.cmp(&a.score));

        tracing::info!("检测完成，共 {} 个安装", candidates.len());
        progress.report(
            100,
            TITLE,
            &format!("发现 {} 个安装", candidates.len()),
            ProgressState::Completed,
        );

        report.candidates = candidates;
        report
    }

    /// 为调用方手动指定的目录构造候选项并评分
    pub fn inspect_path(&self, path: &Path) -> InstallationCandidate {
        let mut candidate =
            filesystem::inspect_install_dir(self.fs.as_ref(), &self.profile, &self.folders, path)
                .unwrap_or_else(|| {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_else(|| path.to_string_lossy().to_string());
                    let mut candidate = InstallationCandidate::new(name, DetectionMethod::Manual);
                    if self.fs.exists(path) {
                        candidate.install_path = Some(path.to_path_buf());
                        candidate.estimated_size = self.fs.size(path);
                    }
                    candidate
                });

        candidate.method = DetectionMethod::Manual;
        scoring::finalize(&mut candidate);
        candidate
    }

    fn canceled(&self, mut report: DetectionReport, progress: &ProgressReporter) -> DetectionReport {
        tracing::info!("检测已取消");
        progress.report(0, TITLE, "检测已取消", ProgressState::Canceled);
        report.canceled = true;
        report
    }

    /// 在阻塞线程中运行一种检测方式，任务崩溃也按失败处理
    async fn run_method(&self, method: DetectionMethod) -> Result<Vec<InstallationCandidate>, CleanerError> {
        let registry_probe = self.registry.clone();
        let fs_probe = self.fs.clone();
        let profile = self.profile.clone();
        let folders = self.folders.clone();

        let handle = tokio::task::spawn_blocking(move || match method {
            DetectionMethod::InstalledPrograms => {
                programs::scan_installed_programs(registry_probe.as_ref(), fs_probe.as_ref(), &profile)
            }
            DetectionMethod::Registry => registry::scan_vendor_keys(registry_probe.as_ref(), &profile),
            DetectionMethod::FileSystem => {
                filesystem::scan_install_dirs(fs_probe.as_ref(), &profile, &folders)
            }
            DetectionMethod::Manual => Ok(Vec::new()),
        });

        handle
            .await
            .map_err(|e| CleanerError::Other(format!("检测任务异常终止: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::common::progress::ProgressInfo;
    use crate::modules::probe::filesystem::LocalFileSystem;
    use crate::modules::probe::registry::{MemoryRegistry, RegistryValue};
    use models::CompletenessTier;
    use std::fs;
    use std::path::PathBuf;

    fn sandbox() -> PathBuf {
        std::env::temp_dir().join(format!("ps-cleaner-detector-{}", uuid::Uuid::new_v4()))
    }

    fn string(value: &str) -> RegistryValue {
        RegistryValue::String(value.to_string())
    }

    #[tokio::test]
    async fn sources_are_merged_into_one_installation() {
        let root = sandbox();
        let config = AppConfig::sandboxed(&root);
        let install_dir = root.join("Program Files").join("Adobe").join("Adobe Photoshop 2024");
        assert!(fs::create_dir_all(&install_dir).is_ok());
        assert!(fs::write(install_dir.join("Photoshop.exe"), b"MZ").is_ok());
        let install = install_dir.to_string_lossy().to_string();

        let registry = Arc::new(MemoryRegistry::new());
        let uninstall_key = r"HKLM\SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall\PHSP_25_0";
        registry.set_value(uninstall_key, "DisplayName", string("Adobe Photoshop 2024"));
        registry.set_value(uninstall_key, "DisplayVersion", string("25.0"));
        registry.set_value(uninstall_key, "InstallLocation", string(&install));
        registry.set_value(uninstall_key, "UninstallString", string("uninstall.exe"));
        registry.set_value(r"HKLM\SOFTWARE\Adobe\Photoshop\250.0", "ApplicationPath", string(&install));

        let engine = DetectionEngine::new(registry, Arc::new(LocalFileSystem::default()), &config);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let report = engine.detect(&CancelFlag::new(), &ProgressReporter::new(tx)).await;

        assert!(!report.canceled);
        assert_eq!(report.candidates.len(), 1);
        let candidate = &report.candidates[0];
        assert_eq!(candidate.method, DetectionMethod::InstalledPrograms);
        assert_eq!(candidate.corroborations, 2);
        assert_eq!(candidate.registry_keys.len(), 2);
        assert_eq!(candidate.score, 100);
        assert_eq!(candidate.tier, CompletenessTier::Complete);

        let mut updates: Vec<ProgressInfo> = Vec::new();
        while let Ok(info) = rx.try_recv() {
            updates.push(info);
        }
        assert!(updates.windows(2).all(|w| w[0].percent <= w[1].percent));
        assert_eq!(updates.last().map(|u| u.state), Some(ProgressState::Completed));

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn failed_method_contributes_nothing() {
        let root = sandbox();
        let config = AppConfig::sandboxed(&root);
        let registry = Arc::new(MemoryRegistry::new());
        registry.create_key(r"HKCU\Software\Adobe\Photoshop\250.0");

        let engine = DetectionEngine::new(registry, Arc::new(LocalFileSystem::default()), &config);
        let report = engine.detect(&CancelFlag::new(), &ProgressReporter::silent()).await;

        // 没有任何卸载信息键，已安装程序检测失败
        assert_eq!(report.method_errors.len(), 1);
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].method, DetectionMethod::Registry);
        assert_eq!(report.candidates[0].tier, CompletenessTier::Residual);
    }

    #[tokio::test]
    async fn canceled_detection_returns_early() {
        let root = sandbox();
        let config = AppConfig::sandboxed(&root);
        let engine = DetectionEngine::new(
            Arc::new(MemoryRegistry::new()),
            Arc::new(LocalFileSystem::default()),
            &config,
        );

        let cancel = CancelFlag::new();
        cancel.cancel();
        let report = engine.detect(&cancel, &ProgressReporter::silent()).await;

        assert!(report.canceled);
        assert!(report.candidates.is_empty());
    }

    #[test]
    fn manual_path_is_scored() {
        let root = sandbox();
        let config = AppConfig::sandboxed(&root);
        let dir = root.join("Custom").join("PS");
        assert!(fs::create_dir_all(&dir).is_ok());

        let engine = DetectionEngine::new(
            Arc::new(MemoryRegistry::new()),
            Arc::new(LocalFileSystem::default()),
            &config,
        );
        let candidate = engine.inspect_path(&dir);

        assert_eq!(candidate.method, DetectionMethod::Manual);
        assert_eq!(candidate.install_path, Some(dir.clone()));
        assert_eq!(candidate.score, 30);
        assert_eq!(candidate.tier, CompletenessTier::Residual);

        let _ = fs::remove_dir_all(&root);
    }
}
