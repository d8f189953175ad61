pub mod models;

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::Local;

use crate::modules::cleaner::models::OperationResult;
use crate::modules::common::cancel::CancelFlag;
use crate::modules::common::error::CleanerError;
use crate::modules::common::progress::{ProgressReporter, ProgressState};
use crate::modules::common::utils;
use crate::modules::detector::models::InstallationCandidate;
use crate::modules::probe::filesystem::FileSystemProbe;
use crate::modules::probe::registry::RegistryProbe;
use models::{BackupEntry, BackupManifest, BackupScope, EntryKind, OperationKind};

pub const MANIFEST_FILE: &str = "backup_info.json";
const FILES_DIR: &str = "Files";
const DIRECTORIES_DIR: &str = "Directories";
const REGISTRY_DIR: &str = "Registry";
const METADATA_DIR: &str = "Metadata";

const BACKUP_TITLE: &str = "创建备份";
const RESTORE_TITLE: &str = "还原备份";

/// 目录复制的结果
struct TreeCopy {
    bytes: u64,
    failures: usize,
    canceled: bool,
}

/// 备份引擎
///
/// 每次快照在 `root` 下占用一个独立目录：
/// `{id}/Files`、`{id}/Directories`、`{id}/Registry`、`{id}/Metadata/backup_info.json`。
pub struct BackupEngine {
    root: PathBuf,
    fs: Arc<dyn FileSystemProbe>,
    registry: Arc<dyn RegistryProbe>,
}

impl BackupEngine {
    pub fn new(root: PathBuf, fs: Arc<dyn FileSystemProbe>, registry: Arc<dyn RegistryProbe>) -> Self {
        Self { root, fs, registry }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 为候选项创建快照
    ///
    /// 无法创建快照目录时返回错误；单项复制或导出失败只记录在清单备注里。
    /// 取消时停止复制，但清单仍会写入并注明取消。
    pub async fn create_snapshot(
        &self,
        candidate: &InstallationCandidate,
        kind: OperationKind,
        scope: &BackupScope,
        cancel: &CancelFlag,
        progress: &ProgressReporter,
    ) -> Result<BackupManifest, CleanerError> {
        let snapshot_dir = self.allocate_snapshot_dir(kind)?;
        let id = snapshot_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        tracing::info!("创建备份 {} -> {}", candidate.display_name, snapshot_dir.display());

        let mut manifest = BackupManifest {
            id,
            created_at: Local::now(),
            operation_kind: kind,
            installation_name: candidate.display_name.clone(),
            installation_version: candidate.version.clone(),
            installation_path: candidate.install_path.clone(),
            backup_path: snapshot_dir.clone(),
            entries: Vec::new(),
            item_count: 0,
            total_size: 0,
            notes: String::new(),
        };

        let paths = snapshot_paths(candidate, scope);
        let keys = snapshot_keys(candidate, scope);
        let total = paths.len() + keys.len();
        let mut done = 0;
        let mut canceled = false;

        for path in &paths {
            if cancel.is_canceled() {
                canceled = true;
                break;
            }
            progress.band(0, 100, done, total, BACKUP_TITLE, &format!("备份 {}", path.display()));
            done += 1;

            if !self.fs.exists(path) {
                tracing::debug!("路径不存在，跳过备份: {}", path.display());
                continue;
            }

            if path.is_dir() {
                let stored = snapshot_dir
                    .join(DIRECTORIES_DIR)
                    .join(utils::content_addressed_name(path));
                let copy = self.copy_tree(path, &stored, cancel);
                if copy.failures > 0 {
                    manifest.add_note(&format!("{} 中有 {} 个文件未能备份", path.display(), copy.failures));
                }
                manifest.entries.push(BackupEntry::new(
                    path.to_string_lossy().to_string(),
                    stored,
                    EntryKind::Directory,
                    copy.bytes,
                ));
                if copy.canceled {
                    canceled = true;
                    break;
                }
            } else {
                let stored = snapshot_dir
                    .join(FILES_DIR)
                    .join(utils::content_addressed_name(path));
                match self.fs.copy(path, &stored, true, cancel) {
                    Ok(bytes) => manifest.entries.push(BackupEntry::new(
                        path.to_string_lossy().to_string(),
                        stored,
                        EntryKind::File,
                        bytes,
                    )),
                    Err(CleanerError::Canceled) => {
                        canceled = true;
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("备份文件失败 {}: {}", path.display(), e);
                        manifest.add_note(&format!("备份失败 {}: {}", path.display(), e));
                    }
                }
            }
        }

        if !canceled {
            for key in &keys {
                if cancel.is_canceled() {
                    canceled = true;
                    break;
                }
                progress.band(0, 100, done, total, BACKUP_TITLE, &format!("导出 {}", key));
                done += 1;

                if !self.registry.key_exists(key) {
                    tracing::debug!("注册表键不存在，跳过备份: {}", key);
                    continue;
                }

                let stored = snapshot_dir.join(REGISTRY_DIR).join(utils::registry_export_name(key));
                if self.registry.export_key(key, &stored) {
                    let size = self.fs.size(&stored);
                    manifest.entries.push(BackupEntry::new(
                        key.clone(),
                        stored,
                        EntryKind::RegistryKey,
                        size,
                    ));
                } else {
                    tracing::warn!("导出注册表失败，跳过: {}", key);
                    manifest.add_note(&format!("导出失败 {}", key));
                }
            }
        }

        if canceled {
            tracing::info!("备份已取消，已完成 {} 项", manifest.entries.len());
            manifest.add_note("备份被取消，清单只包含已完成的项目");
        }

        manifest.recount();
        self.write_manifest(&manifest)?;

        tracing::info!(
            "备份完成: {} 项, {}",
            manifest.item_count,
            utils::format_size(manifest.total_size)
        );
        if !canceled {
            progress.report(100, BACKUP_TITLE, "备份完成", ProgressState::Completed);
        }

        Ok(manifest)
    }

    /// 演练快照：按与 `create_snapshot` 相同的顺序和进度遍历目标，但不复制、不导出、不写清单
    ///
    /// 返回实际会被备份的项目数。
    pub fn preview_snapshot(
        &self,
        candidate: &InstallationCandidate,
        scope: &BackupScope,
        cancel: &CancelFlag,
        progress: &ProgressReporter,
    ) -> usize {
        let paths = snapshot_paths(candidate, scope);
        let keys = snapshot_keys(candidate, scope);
        let total = paths.len() + keys.len();
        let mut done = 0;
        let mut captured = 0;

        for path in &paths {
            if cancel.is_canceled() {
                return captured;
            }
            progress.band(0, 100, done, total, BACKUP_TITLE, &format!("备份 {}", path.display()));
            done += 1;

            if self.fs.exists(path) {
                tracing::info!("[演练] 将备份: {}", path.display());
                captured += 1;
            }
        }

        for key in &keys {
            if cancel.is_canceled() {
                return captured;
            }
            progress.band(0, 100, done, total, BACKUP_TITLE, &format!("导出 {}", key));
            done += 1;

            if self.registry.key_exists(key) {
                tracing::info!("[演练] 将导出: {}", key);
                captured += 1;
            }
        }

        progress.report(100, BACKUP_TITLE, "备份完成", ProgressState::Completed);
        captured
    }

    /// 列出所有可读的快照，最新的在前；清单缺失或损坏的目录被跳过
    pub fn list_snapshots(&self) -> Vec<BackupManifest> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("无法读取备份目录 {}: {}", self.root.display(), e);
                return Vec::new();
            }
        };

        let mut manifests: Vec<BackupManifest> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| {
                let id = e.file_name().to_string_lossy().to_string();
                match self.load_snapshot(&id) {
                    Ok(manifest) => Some(manifest),
                    Err(err) => {
                        tracing::error!("跳过无法读取的备份 {}: {}", id, err);
                        None
                    }
                }
            })
            .collect();

        manifests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        manifests
    }

    /// 读取单个快照的清单
    pub fn load_snapshot(&self, id: &str) -> Result<BackupManifest, CleanerError> {
        let path = self.snapshot_dir(id)?.join(METADATA_DIR).join(MANIFEST_FILE);
        let content = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CleanerError::NotFound(format!("备份清单不存在: {}", path.display()))
            } else {
                CleanerError::FileSystem(e)
            }
        })?;
        let manifest: BackupManifest = serde_json::from_str(&content)?;
        Ok(manifest)
    }

    /// 按清单还原快照
    ///
    /// 单项失败不会中断；可重复执行，目标已存在时直接覆盖。
    pub async fn restore_snapshot(
        &self,
        id: &str,
        cancel: &CancelFlag,
        progress: &ProgressReporter,
    ) -> OperationResult {
        let mut manifest = match self.load_snapshot(id) {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::error!("无法加载备份 {}: {}", id, e);
                progress.report(0, RESTORE_TITLE, &e.to_string(), ProgressState::Failed);
                return OperationResult::failed(format!("无法加载备份 {}: {}", id, e));
            }
        };
        let snapshot_dir = match self.snapshot_dir(id) {
            Ok(dir) => dir,
            Err(e) => return OperationResult::failed(e.to_string()),
        };

        tracing::info!("开始还原备份 {} ({} 项)", id, manifest.entries.len());
        let total = manifest.entries.len();
        let mut failures = Vec::new();
        let mut canceled = false;

        for index in 0..total {
            if cancel.is_canceled() {
                canceled = true;
                break;
            }

            let original = manifest.entries[index].original_path.clone();
            progress.band(0, 100, index, total, RESTORE_TITLE, &format!("还原 {}", original));

            let outcome = self.restore_entry(&manifest, &manifest.entries[index], &snapshot_dir, cancel);
            let entry = &mut manifest.entries[index];
            match outcome {
                Ok(()) => {
                    entry.restored = true;
                    entry.restore_error = None;
                }
                Err(CleanerError::Canceled) => {
                    canceled = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!("还原失败 {}: {}", original, e);
                    entry.restored = false;
                    entry.restore_error = Some(e.to_string());
                    failures.push(format!("{}: {}", original, e));
                }
            }
        }

        if let Err(e) = self.write_manifest_at(&snapshot_dir, &manifest) {
            tracing::warn!("更新备份清单失败 {}: {}", id, e);
        }

        if canceled {
            progress.report(0, RESTORE_TITLE, "还原已取消", ProgressState::Canceled);
            return OperationResult::canceled().with_backup_id(Some(id.to_string()));
        }

        let restored = manifest.entries.iter().filter(|e| e.restored).count();
        let result = if failures.is_empty() {
            progress.report(100, RESTORE_TITLE, "还原完成", ProgressState::Completed);
            OperationResult::ok(format!("已还原 {} 项", restored))
        } else {
            progress.report(100, RESTORE_TITLE, "部分项目还原失败", ProgressState::Warning);
            OperationResult::ok(format!(
                "已还原 {} 项，{} 项失败:\n{}",
                restored,
                failures.len(),
                failures.join("\n")
            ))
        };

        tracing::info!("还原结束: {}", result.message);
        result.with_backup_id(Some(id.to_string()))
    }

    /// 删除整个快照目录
    pub fn delete_snapshot(&self, id: &str) -> OperationResult {
        let dir = match self.snapshot_dir(id) {
            Ok(dir) => dir,
            Err(e) => return OperationResult::failed(e.to_string()),
        };

        if !self.fs.exists(&dir) {
            return OperationResult::failed(format!("备份不存在: {}", id));
        }

        if self.fs.delete_directory(&dir, true) {
            tracing::info!("已删除备份 {}", id);
            OperationResult::ok(format!("已删除备份 {}", id))
        } else {
            OperationResult::failed(format!("删除备份失败: {}", id))
        }
    }

    fn restore_entry(
        &self,
        manifest: &BackupManifest,
        entry: &BackupEntry,
        snapshot_dir: &Path,
        cancel: &CancelFlag,
    ) -> Result<(), CleanerError> {
        let stored = resolve_stored_path(&manifest.backup_path, snapshot_dir, &entry.stored_path)
            .ok_or_else(|| {
                CleanerError::PermissionDenied(format!(
                    "备份副本位于快照目录之外: {}",
                    entry.stored_path.display()
                ))
            })?;

        if !self.fs.exists(&stored) {
            return Err(CleanerError::NotFound(format!("备份副本缺失: {}", stored.display())));
        }

        match entry.kind {
            EntryKind::File => {
                self.fs.copy(&stored, Path::new(&entry.original_path), true, cancel)?;
            }
            EntryKind::Directory => {
                let copy = self.copy_tree(&stored, Path::new(&entry.original_path), cancel);
                if copy.canceled {
                    return Err(CleanerError::Canceled);
                }
                if copy.failures > 0 {
                    return Err(CleanerError::Other(format!("{} 个文件未能还原", copy.failures)));
                }
            }
            EntryKind::RegistryKey => {
                if !self.registry.import_file(&stored) {
                    return Err(CleanerError::Registry(format!("导入失败: {}", stored.display())));
                }
            }
        }

        Ok(())
    }

    /// 逐个文件复制目录树，单个文件失败只计数
    fn copy_tree(&self, src: &Path, dst: &Path, cancel: &CancelFlag) -> TreeCopy {
        let mut result = TreeCopy {
            bytes: 0,
            failures: 0,
            canceled: false,
        };

        if let Err(e) = fs::create_dir_all(dst) {
            tracing::warn!("创建目录失败 {}: {}", dst.display(), e);
            result.failures += 1;
            return result;
        }

        for path in self.fs.find(src, "*", true) {
            let Ok(relative) = path.strip_prefix(src) else {
                continue;
            };
            let target = dst.join(relative);

            if path.is_dir() {
                if let Err(e) = fs::create_dir_all(&target) {
                    tracing::warn!("创建目录失败 {}: {}", target.display(), e);
                    result.failures += 1;
                }
                continue;
            }

            match self.fs.copy(&path, &target, true, cancel) {
                Ok(bytes) => result.bytes += bytes,
                Err(CleanerError::Canceled) => {
                    result.canceled = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!("复制失败 {}: {}", path.display(), e);
                    result.failures += 1;
                }
            }
        }

        result
    }

    /// 分配快照目录，同一秒内重复创建时追加 `_N`
    fn allocate_snapshot_dir(&self, kind: OperationKind) -> Result<PathBuf, CleanerError> {
        let base = format!("{}_{}", kind, Local::now().format("%Y%m%d_%H%M%S"));
        let mut id = base.clone();
        let mut suffix = 1;
        while self.root.join(&id).exists() {
            id = format!("{}_{}", base, suffix);
            suffix += 1;
        }

        let dir = self.root.join(&id);
        for sub in [FILES_DIR, DIRECTORIES_DIR, REGISTRY_DIR, METADATA_DIR] {
            fs::create_dir_all(dir.join(sub)).map_err(|e| {
                CleanerError::Precondition(format!("无法创建备份目录 {}: {}", dir.display(), e))
            })?;
        }

        Ok(dir)
    }

    fn snapshot_dir(&self, id: &str) -> Result<PathBuf, CleanerError> {
        let valid = !id.is_empty()
            && Path::new(id)
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
            && Path::new(id).components().count() == 1;
        if !valid {
            return Err(CleanerError::Precondition(format!("无效的备份 ID: {}", id)));
        }
        Ok(self.root.join(id))
    }

    fn write_manifest(&self, manifest: &BackupManifest) -> Result<(), CleanerError> {
        self.write_manifest_at(&manifest.backup_path, manifest)
    }

    fn write_manifest_at(&self, snapshot_dir: &Path, manifest: &BackupManifest) -> Result<(), CleanerError> {
        let path = snapshot_dir.join(METADATA_DIR).join(MANIFEST_FILE);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(manifest)?;
        fs::write(&path, json)?;
        tracing::debug!("已写入备份清单: {}", path.display());
        Ok(())
    }
}

/// 需要备份的文件和目录（去重，保持顺序）
fn snapshot_paths(candidate: &InstallationCandidate, scope: &BackupScope) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let install_dir = candidate
        .install_path
        .clone()
        .filter(|_| scope.include_install_dir && candidate.has_install_path());

    install_dir
        .into_iter()
        .chain(candidate.additional_paths.iter().cloned())
        .chain(scope.extra_paths.iter().cloned())
        .filter(|p| seen.insert(utils::path_key(&p.to_string_lossy())))
        .collect()
}

/// 需要导出的注册表键（去重，保持顺序）
fn snapshot_keys(candidate: &InstallationCandidate, scope: &BackupScope) -> Vec<String> {
    let mut seen = HashSet::new();
    candidate
        .registry_keys
        .iter()
        .chain(scope.extra_registry_keys.iter())
        .filter(|k| seen.insert(k.to_lowercase()))
        .cloned()
        .collect()
}

/// 把清单里记录的副本路径换算到快照目录下；越界时返回 None
fn resolve_stored_path(recorded_root: &Path, snapshot_dir: &Path, stored: &Path) -> Option<PathBuf> {
    let relative = stored.strip_prefix(recorded_root).ok()?;
    if relative.as_os_str().is_empty()
        || !relative.components().all(|c| matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(snapshot_dir.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::detector::models::DetectionMethod;
    use crate::modules::probe::filesystem::LocalFileSystem;
    use crate::modules::probe::registry::{MemoryRegistry, RegistryValue};

    struct Sandbox {
        root: PathBuf,
    }

    impl Sandbox {
        fn new() -> Self {
            let root = std::env::temp_dir().join(format!("ps-cleaner-backup-{}", uuid::Uuid::new_v4()));
            assert!(fs::create_dir_all(&root).is_ok());
            Self { root }
        }

        fn file(&self, relative: &str, content: &str) -> PathBuf {
            let path = self.root.join(relative);
            if let Some(parent) = path.parent() {
                assert!(fs::create_dir_all(parent).is_ok());
            }
            assert!(fs::write(&path, content).is_ok());
            path
        }
    }

    impl Drop for Sandbox {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.root);
        }
    }

    fn engine(sandbox: &Sandbox, registry: Arc<MemoryRegistry>) -> BackupEngine {
        BackupEngine::new(
            sandbox.root.join("backups"),
            Arc::new(LocalFileSystem::default()),
            registry,
        )
    }

    fn candidate() -> InstallationCandidate {
        InstallationCandidate::new("Adobe Photoshop 2024".to_string(), DetectionMethod::InstalledPrograms)
            .with_version("25.0".to_string())
    }

    #[tokio::test]
    async fn snapshot_skips_missing_files_and_failed_exports() {
        let sandbox = Sandbox::new();
        let registry = Arc::new(MemoryRegistry::new());
        registry.set_value(r"HKCU\Software\Adobe\Photoshop\250.0", "Theme", RegistryValue::Dword(2));
        registry.set_value(r"HKCU\Software\Adobe\CameraRaw", "Path", RegistryValue::String("x".into()));
        registry.deny_export(r"HKCU\Software\Adobe\CameraRaw");

        let mut ps = candidate();
        ps.additional_paths = vec![
            sandbox.file("data/prefs.psp", "prefs"),
            sandbox.file("data/actions.atn", "actions"),
            sandbox.root.join("data/missing.txt"),
        ];
        ps.registry_keys = vec![
            r"HKCU\Software\Adobe\Photoshop\250.0".to_string(),
            r"HKCU\Software\Adobe\CameraRaw".to_string(),
        ];

        let engine = engine(&sandbox, registry);
        let manifest = engine
            .create_snapshot(&ps, OperationKind::Cleanup, &BackupScope::default(), &CancelFlag::new(), &ProgressReporter::silent())
            .await
            .unwrap_or_else(|e| panic!("snapshot should succeed: {}", e));

        assert_eq!(manifest.item_count, 3);
        let files = manifest.entries.iter().filter(|e| e.kind == EntryKind::File).count();
        let keys = manifest.entries.iter().filter(|e| e.kind == EntryKind::RegistryKey).count();
        assert_eq!((files, keys), (2, 1));
        assert!(manifest.id.starts_with("Cleanup_"));
        assert!(manifest.entries.iter().all(|e| e.stored_path.starts_with(&manifest.backup_path)));
        assert!(manifest.notes.contains("CameraRaw"));
        assert!(manifest.backup_path.join(METADATA_DIR).join(MANIFEST_FILE).is_file());
    }

    #[tokio::test]
    async fn preview_reports_the_same_progress_without_writing() {
        let sandbox = Sandbox::new();
        let registry = Arc::new(MemoryRegistry::new());
        registry.set_value(r"HKCU\Software\Adobe\Photoshop\250.0", "Theme", RegistryValue::Dword(2));

        let mut ps = candidate();
        ps.additional_paths = vec![
            sandbox.file("data/prefs.psp", "prefs"),
            sandbox.root.join("data/missing.txt"),
        ];
        ps.registry_keys = vec![r"HKCU\Software\Adobe\Photoshop\250.0".to_string()];
        let engine = engine(&sandbox, registry);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let captured = engine.preview_snapshot(&ps, &BackupScope::default(), &CancelFlag::new(), &ProgressReporter::new(tx));
        let mut previewed = Vec::new();
        while let Ok(info) = rx.try_recv() {
            previewed.push((info.percent, info.status, info.state));
        }

        assert_eq!(captured, 2);
        assert!(!engine.root().exists());

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let manifest = engine
            .create_snapshot(&ps, OperationKind::Cleanup, &BackupScope::default(), &CancelFlag::new(), &ProgressReporter::new(tx))
            .await
            .unwrap_or_else(|e| panic!("snapshot should succeed: {}", e));
        let mut written = Vec::new();
        while let Ok(info) = rx.try_recv() {
            written.push((info.percent, info.status, info.state));
        }

        assert_eq!(manifest.item_count, captured);
        assert_eq!(previewed, written);
    }

    #[tokio::test]
    async fn new_snapshot_is_listed_immediately() {
        let sandbox = Sandbox::new();
        let engine = engine(&sandbox, Arc::new(MemoryRegistry::new()));
        let mut ps = candidate();
        ps.additional_paths = vec![sandbox.file("data/a.txt", "a")];

        let first = engine
            .create_snapshot(&ps, OperationKind::Uninstall, &BackupScope::default(), &CancelFlag::new(), &ProgressReporter::silent())
            .await
            .unwrap_or_else(|e| panic!("snapshot should succeed: {}", e));
        let second = engine
            .create_snapshot(&ps, OperationKind::Uninstall, &BackupScope::default(), &CancelFlag::new(), &ProgressReporter::silent())
            .await
            .unwrap_or_else(|e| panic!("snapshot should succeed: {}", e));

        assert_ne!(first.id, second.id);
        let listed: Vec<String> = engine.list_snapshots().into_iter().map(|m| m.id).collect();
        assert_eq!(listed.len(), 2);
        assert!(listed.contains(&first.id) && listed.contains(&second.id));
    }

    #[tokio::test]
    async fn corrupt_manifests_are_skipped() {
        let sandbox = Sandbox::new();
        let engine = engine(&sandbox, Arc::new(MemoryRegistry::new()));
        sandbox.file("backups/Cleanup_20200101_000000/Metadata/backup_info.json", "{ not json");
        assert!(fs::create_dir_all(sandbox.root.join("backups/empty")).is_ok());

        let mut ps = candidate();
        ps.additional_paths = vec![sandbox.file("data/a.txt", "a")];
        let manifest = engine
            .create_snapshot(&ps, OperationKind::Cleanup, &BackupScope::default(), &CancelFlag::new(), &ProgressReporter::silent())
            .await
            .unwrap_or_else(|e| panic!("snapshot should succeed: {}", e));

        let listed = engine.list_snapshots();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, manifest.id);
    }

    #[tokio::test]
    async fn restore_is_idempotent_and_overwrites() {
        let sandbox = Sandbox::new();
        let registry = Arc::new(MemoryRegistry::new());
        let key = r"HKCU\Software\Adobe\Photoshop\250.0";
        registry.set_value(key, "Theme", RegistryValue::Dword(2));

        let prefs = sandbox.file("data/prefs.psp", "original");
        let presets_dir = sandbox.root.join("data/Presets");
        sandbox.file("data/Presets/Brushes/soft.abr", "brush");

        let mut ps = candidate();
        ps.additional_paths = vec![prefs.clone(), presets_dir.clone()];
        ps.registry_keys = vec![key.to_string()];

        let engine = engine(&sandbox, registry.clone());
        let manifest = engine
            .create_snapshot(&ps, OperationKind::Cleanup, &BackupScope::default(), &CancelFlag::new(), &ProgressReporter::silent())
            .await
            .unwrap_or_else(|e| panic!("snapshot should succeed: {}", e));
        assert_eq!(manifest.item_count, 3);

        // 模拟清理
        assert!(fs::write(&prefs, "changed").is_ok());
        assert!(fs::remove_dir_all(&presets_dir).is_ok());
        assert!(registry.delete_key(key));

        for _ in 0..2 {
            let result = engine
                .restore_snapshot(&manifest.id, &CancelFlag::new(), &ProgressReporter::silent())
                .await;
            assert!(result.success, "{}", result.message);
            assert_eq!(result.message, "已还原 3 项");
        }

        assert_eq!(fs::read_to_string(&prefs).unwrap_or_default(), "original");
        assert!(presets_dir.join("Brushes").join("soft.abr").is_file());
        assert_eq!(registry.get_value(key, "Theme"), Some(RegistryValue::Dword(2)));

        let reloaded = engine.load_snapshot(&manifest.id).unwrap_or_else(|e| panic!("{}", e));
        assert!(reloaded.entries.iter().all(|e| e.restored && e.restore_error.is_none()));
    }

    #[tokio::test]
    async fn entries_outside_the_snapshot_are_refused() {
        let sandbox = Sandbox::new();
        let engine = engine(&sandbox, Arc::new(MemoryRegistry::new()));
        let mut ps = candidate();
        ps.additional_paths = vec![sandbox.file("data/a.txt", "a")];

        let mut manifest = engine
            .create_snapshot(&ps, OperationKind::Cleanup, &BackupScope::default(), &CancelFlag::new(), &ProgressReporter::silent())
            .await
            .unwrap_or_else(|e| panic!("snapshot should succeed: {}", e));
        manifest.entries[0].stored_path = manifest.backup_path.join("..").join("..").join("evil.txt");
        assert!(engine.write_manifest(&manifest).is_ok());

        let result = engine
            .restore_snapshot(&manifest.id, &CancelFlag::new(), &ProgressReporter::silent())
            .await;
        assert!(result.success);
        assert!(result.message.contains("1 项失败"));

        let reloaded = engine.load_snapshot(&manifest.id).unwrap_or_else(|e| panic!("{}", e));
        assert!(!reloaded.entries[0].restored);
        assert!(reloaded.entries[0].restore_error.is_some());
    }

    #[tokio::test]
    async fn canceled_snapshot_still_writes_manifest() {
        let sandbox = Sandbox::new();
        let engine = engine(&sandbox, Arc::new(MemoryRegistry::new()));
        let mut ps = candidate();
        ps.additional_paths = vec![sandbox.file("data/a.txt", "a")];

        let cancel = CancelFlag::new();
        cancel.cancel();
        let manifest = engine
            .create_snapshot(&ps, OperationKind::Cleanup, &BackupScope::default(), &cancel, &ProgressReporter::silent())
            .await
            .unwrap_or_else(|e| panic!("snapshot should succeed: {}", e));

        assert_eq!(manifest.item_count, 0);
        assert!(manifest.notes.contains("取消"));
        assert!(engine.load_snapshot(&manifest.id).is_ok());
    }

    #[test]
    fn delete_and_invalid_ids() {
        let sandbox = Sandbox::new();
        let engine = engine(&sandbox, Arc::new(MemoryRegistry::new()));
        sandbox.file("backups/Cleanup_1/Metadata/backup_info.json", "{}");

        assert!(!engine.delete_snapshot("../data").success);
        assert!(!engine.delete_snapshot("Cleanup_404").success);
        assert!(engine.delete_snapshot("Cleanup_1").success);
        assert!(!sandbox.root.join("backups/Cleanup_1").exists());
    }
}
