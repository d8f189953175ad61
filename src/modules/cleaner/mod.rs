pub mod models;
pub mod process;
pub mod safety;
pub mod targets;
pub mod uninstall;

use std::path::PathBuf;
use std::sync::Arc;

use crate::modules::backup::models::{BackupScope, OperationKind};
use crate::modules::backup::BackupEngine;
use crate::modules::common::cancel::CancelFlag;
use crate::modules::common::config::AppConfig;
use crate::modules::common::error::CleanerError;
use crate::modules::common::progress::{ProgressReporter, ProgressState};
use crate::modules::common::utils;
use crate::modules::detector::models::InstallationCandidate;
use crate::modules::probe::deferred::{self, RebootScheduler};
use crate::modules::probe::filesystem::FileSystemProbe;
use crate::modules::probe::registry::RegistryProbe;
use models::{CleanupOptions, OperationResult, UninstallOptions};
use process::ProcessStopper;

/// 清理 / 卸载流程的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    StopProcesses,
    Backup,
    RunUninstaller,
    TempFiles,
    Registry,
    Config,
    Cache,
    InstallDir,
    Finalize,
}

impl Stage {
    /// 阶段开始时的进度
    pub fn percent(self) -> i32 {
        match self {
            Stage::Init => 0,
            Stage::StopProcesses => 5,
            Stage::Backup => 10,
            Stage::RunUninstaller => 25,
            Stage::TempFiles => 30,
            Stage::Registry => 50,
            Stage::Config => 65,
            Stage::Cache => 80,
            Stage::InstallDir => 90,
            Stage::Finalize => 100,
        }
    }

    /// 阶段内逐项进度的上限
    fn band_end(self) -> i32 {
        match self {
            Stage::Init => 5,
            Stage::StopProcesses => 10,
            Stage::Backup => 25,
            Stage::RunUninstaller => 30,
            Stage::TempFiles => 50,
            Stage::Registry => 65,
            Stage::Config => 80,
            Stage::Cache => 90,
            Stage::InstallDir => 100,
            Stage::Finalize => 100,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Init => write!(f, "准备"),
            Stage::StopProcesses => write!(f, "结束进程"),
            Stage::Backup => write!(f, "创建备份"),
            Stage::RunUninstaller => write!(f, "运行卸载程序"),
            Stage::TempFiles => write!(f, "清理临时文件"),
            Stage::Registry => write!(f, "清理注册表"),
            Stage::Config => write!(f, "清理配置文件"),
            Stage::Cache => write!(f, "清理缓存"),
            Stage::InstallDir => write!(f, "删除安装目录"),
            Stage::Finalize => write!(f, "完成"),
        }
    }
}

/// 一次运行要处理的目标，在准备阶段一次性解析
#[derive(Debug, Default)]
struct Plan {
    temp: Vec<PathBuf>,
    registry: Vec<String>,
    config: Vec<PathBuf>,
    cache: Vec<PathBuf>,
    install_dir: Vec<PathBuf>,
}

/// 运行过程中累积的结果
#[derive(Debug, Default)]
struct Tally {
    removed: usize,
    deferred: usize,
    failures: Vec<String>,
    notes: Vec<String>,
    backup_id: Option<String>,
}

/// 清理与卸载的编排器
///
/// 各阶段严格顺序执行；演练模式走同一条路径，只在破坏性调用处跳过。
pub struct Cleaner {
    config: AppConfig,
    fs: Arc<dyn FileSystemProbe>,
    registry: Arc<dyn RegistryProbe>,
    backup: BackupEngine,
    stopper: Arc<dyn ProcessStopper>,
    scheduler: Arc<dyn RebootScheduler>,
}

impl Cleaner {
    pub fn new(
        config: AppConfig,
        fs: Arc<dyn FileSystemProbe>,
        registry: Arc<dyn RegistryProbe>,
        stopper: Arc<dyn ProcessStopper>,
        scheduler: Arc<dyn RebootScheduler>,
    ) -> Self {
        let backup = BackupEngine::new(config.backup_root.clone(), fs.clone(), registry.clone());
        Self {
            config,
            fs,
            registry,
            backup,
            stopper,
            scheduler,
        }
    }

    pub fn backup_engine(&self) -> &BackupEngine {
        &self.backup
    }

    /// 有卸载命令，或安装目录仍然存在
    pub fn can_uninstall(&self, candidate: &InstallationCandidate) -> bool {
        candidate.uninstall_str().is_some()
            || candidate
                .install_path
                .as_ref()
                .filter(|_| candidate.has_install_path())
                .map(|p| self.fs.exists(p))
                .unwrap_or(false)
    }

    /// 清理残留（不运行卸载程序）
    pub async fn cleanup(
        &self,
        candidate: &InstallationCandidate,
        options: &CleanupOptions,
        cancel: &CancelFlag,
        progress: &ProgressReporter,
    ) -> OperationResult {
        let title = format!("清理 {}", candidate.display_name);
        let outcome = self
            .run(candidate, OperationKind::Cleanup, options, None, &title, cancel, progress)
            .await;
        self.conclude(outcome, &title, progress)
    }

    /// 运行卸载程序，再按选项清理残留和安装目录
    pub async fn uninstall(
        &self,
        candidate: &InstallationCandidate,
        options: &UninstallOptions,
        cancel: &CancelFlag,
        progress: &ProgressReporter,
    ) -> OperationResult {
        let title = format!("卸载 {}", candidate.display_name);
        let outcome = self
            .run(
                candidate,
                OperationKind::Uninstall,
                &options.cleanup,
                Some(options),
                &title,
                cancel,
                progress,
            )
            .await;
        self.conclude(outcome, &title, progress)
    }

    /// 最外层：把错误统一转换为操作结果
    fn conclude(
        &self,
        outcome: Result<OperationResult, CleanerError>,
        title: &str,
        progress: &ProgressReporter,
    ) -> OperationResult {
        match outcome {
            Ok(result) => result,
            Err(CleanerError::Canceled) => {
                tracing::info!("{} 已取消", title);
                progress.report(0, title, "操作已取消", ProgressState::Canceled);
                OperationResult::canceled()
            }
            Err(e) => {
                tracing::error!("{} 失败: {}", title, e);
                progress.report(0, title, &e.to_string(), ProgressState::Failed);
                OperationResult::failed(e.to_string())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run(
        &self,
        candidate: &InstallationCandidate,
        kind: OperationKind,
        options: &CleanupOptions,
        uninstall: Option<&UninstallOptions>,
        title: &str,
        cancel: &CancelFlag,
        progress: &ProgressReporter,
    ) -> Result<OperationResult, CleanerError> {
        let simulate = options.simulate;
        let mut tally = Tally::default();

        // 准备
        self.enter(Stage::Init, title, cancel, progress)?;
        tracing::info!(
            "开始{}: {} (演练: {})",
            if uninstall.is_some() { "卸载" } else { "清理" },
            candidate.display_name,
            simulate
        );
        if uninstall.is_some() && !self.can_uninstall(candidate) {
            return Err(CleanerError::Precondition(format!(
                "{} 既没有卸载命令，安装目录也不存在",
                candidate.display_name
            )));
        }
        let plan = self.plan(candidate, options, uninstall);

        if options.stop_processes {
            self.enter(Stage::StopProcesses, title, cancel, progress)?;
            if simulate {
                tracing::info!("[演练] 跳过结束进程: {:?}", self.config.profile.process_names);
            } else {
                let outcome = self.stopper.stop(&self.config.profile.process_names);
                if outcome.success {
                    tally.notes.push(outcome.message);
                } else {
                    tally.failures.push(format!("结束进程: {}", outcome.message));
                }
            }
        }

        if options.create_backup {
            self.enter(Stage::Backup, title, cancel, progress)?;
            let scope = BackupScope {
                include_install_dir: !plan.install_dir.is_empty(),
                extra_paths: plan
                    .temp
                    .iter()
                    .chain(plan.config.iter())
                    .chain(plan.cache.iter())
                    .cloned()
                    .collect(),
                extra_registry_keys: plan.registry.clone(),
            };

            let sub_progress = progress.scoped(Stage::Backup.percent(), Stage::Backup.band_end());
            if simulate {
                let captured = self.backup.preview_snapshot(candidate, &scope, cancel, &sub_progress);
                cancel.check()?;
                tracing::info!("[演练] 跳过备份: {} 项", captured);
            } else {
                let manifest = self
                    .backup
                    .create_snapshot(candidate, kind, &scope, cancel, &sub_progress)
                    .await?;
                cancel.check()?;
                tally.backup_id = Some(manifest.id);
            }
        }

        if let Some(uninstall_options) = uninstall {
            if uninstall_options.run_uninstaller {
                self.enter(Stage::RunUninstaller, title, cancel, progress)?;
                match candidate.uninstall_str() {
                    Some(command) if simulate => {
                        tracing::info!("[演练] 跳过运行卸载程序: {}", command);
                    }
                    Some(command) => {
                        match uninstall::run_uninstaller(command, self.config.uninstall_timeout, cancel).await {
                            Ok(()) => tally.notes.push("卸载程序已完成".to_string()),
                            Err(CleanerError::Canceled) => return Err(CleanerError::Canceled),
                            Err(e) => tally.failures.push(format!("卸载程序: {}", e)),
                        }
                    }
                    None => tally.notes.push("没有卸载命令，跳过卸载程序".to_string()),
                }
            }
        }

        if options.temp_files {
            self.delete_paths(Stage::TempFiles, &plan.temp, options, &mut tally, title, cancel, progress)?;
        }
        if options.registry {
            self.delete_keys(&plan.registry, simulate, &mut tally, title, cancel, progress)?;
        }
        if options.config_files {
            self.delete_paths(Stage::Config, &plan.config, options, &mut tally, title, cancel, progress)?;
        }
        if options.cache_files {
            self.delete_paths(Stage::Cache, &plan.cache, options, &mut tally, title, cancel, progress)?;
        }
        if uninstall.map(|u| u.remove_install_dir).unwrap_or(false) {
            self.delete_paths(Stage::InstallDir, &plan.install_dir, options, &mut tally, title, cancel, progress)?;
        }

        Ok(self.finalize(tally, simulate, title, progress))
    }

    /// 解析本次运行的所有目标
    fn plan(
        &self,
        candidate: &InstallationCandidate,
        options: &CleanupOptions,
        uninstall: Option<&UninstallOptions>,
    ) -> Plan {
        let fs = self.fs.as_ref();
        let profile = &self.config.profile;
        let folders = &self.config.folders;
        let mut plan = Plan::default();

        if options.temp_files {
            plan.temp = targets::temp_targets(fs, profile, folders);
        }
        if options.registry {
            plan.registry = targets::registry_targets(self.registry.as_ref(), candidate, profile);
        }
        if options.config_files {
            plan.config = targets::config_targets(fs, profile, folders);
        }
        if options.cache_files {
            plan.cache = targets::cache_targets(fs, profile, folders);
        }
        if uninstall.map(|u| u.remove_install_dir).unwrap_or(false) {
            plan.install_dir = candidate
                .install_path
                .iter()
                .filter(|p| candidate.has_install_path() && fs.exists(p))
                .filter(|p| match safety::check_path(p, folders) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!("不删除安装目录 {}: {}", p.display(), e);
                        false
                    }
                })
                .cloned()
                .collect();
        }

        tracing::info!(
            "清理目标: 临时 {}, 注册表 {}, 配置 {}, 缓存 {}, 安装目录 {}",
            plan.temp.len(),
            plan.registry.len(),
            plan.config.len(),
            plan.cache.len(),
            plan.install_dir.len()
        );
        plan
    }

    /// 进入新阶段：先检查取消，再上报进度
    fn enter(
        &self,
        stage: Stage,
        title: &str,
        cancel: &CancelFlag,
        progress: &ProgressReporter,
    ) -> Result<(), CleanerError> {
        cancel.check()?;
        tracing::debug!("阶段: {}", stage);
        progress.running(stage.percent(), title, &stage.to_string());
        Ok(())
    }

    /// 删除一组文件或目录；删不掉的登记为重启后删除
    #[allow(clippy::too_many_arguments)]
    fn delete_paths(
        &self,
        stage: Stage,
        paths: &[PathBuf],
        options: &CleanupOptions,
        tally: &mut Tally,
        title: &str,
        cancel: &CancelFlag,
        progress: &ProgressReporter,
    ) -> Result<(), CleanerError> {
        self.enter(stage, title, cancel, progress)?;

        for (index, path) in paths.iter().enumerate() {
            cancel.check()?;
            progress.band(
                stage.percent(),
                stage.band_end(),
                index,
                paths.len(),
                title,
                &format!("删除 {}", path.display()),
            );

            if options.simulate {
                tracing::info!("[演练] 将删除: {}", path.display());
                tally.removed += 1;
                continue;
            }

            let deleted = if path.is_dir() {
                self.fs.delete_directory(path, true)
            } else {
                self.fs.delete_file(path)
            };

            if deleted {
                tally.removed += 1;
                continue;
            }

            if !options.schedule_on_reboot {
                tally.failures.push(format!("{}: 无法删除 {}", stage, path.display()));
                continue;
            }

            let (scheduled, failed) = deferred::schedule_tree(self.scheduler.as_ref(), path);
            tracing::info!("已登记重启后删除 {} 项: {}", scheduled.len(), path.display());
            tally.deferred += scheduled.len();
            if !failed.is_empty() {
                tally.failures.push(format!(
                    "{}: 无法删除且无法登记重启删除 {} ({} 项)",
                    stage,
                    path.display(),
                    failed.len()
                ));
            }
        }

        Ok(())
    }

    /// 删除注册表键，删除前逐个导出到临时目录
    fn delete_keys(
        &self,
        keys: &[String],
        simulate: bool,
        tally: &mut Tally,
        title: &str,
        cancel: &CancelFlag,
        progress: &ProgressReporter,
    ) -> Result<(), CleanerError> {
        let stage = Stage::Registry;
        self.enter(stage, title, cancel, progress)?;
        let scratch = self.config.scratch_root.join(uuid::Uuid::new_v4().to_string());

        for (index, key) in keys.iter().enumerate() {
            cancel.check()?;
            progress.band(
                stage.percent(),
                stage.band_end(),
                index,
                keys.len(),
                title,
                &format!("删除注册表 {}", key),
            );

            if simulate {
                tracing::info!("[演练] 将导出并删除注册表: {}", key);
                tally.removed += 1;
                continue;
            }

            if let Err(e) = std::fs::create_dir_all(&scratch) {
                tracing::error!("无法创建导出目录 {}: {}", scratch.display(), e);
                // 剩余的键都无法导出，也就都不删除
                tally.failures.extend(
                    keys[index..]
                        .iter()
                        .map(|k| format!("{}: 无法创建导出目录 ({})，未删除 {}", stage, e, k)),
                );
                return Ok(());
            }

            let export_file = scratch.join(utils::registry_export_name(key));
            if !self.registry.export_key(key, &export_file) {
                tracing::warn!("导出失败，不删除: {}", key);
                tally.failures.push(format!("{}: 导出失败，未删除 {}", stage, key));
                continue;
            }

            if self.registry.delete_key(key) {
                tracing::info!("已删除注册表项: {}", key);
                tally.removed += 1;
            } else {
                tally.failures.push(format!("{}: 无法删除 {}", stage, key));
            }
        }

        Ok(())
    }

    fn finalize(&self, tally: Tally, simulate: bool, title: &str, progress: &ProgressReporter) -> OperationResult {
        let mut lines = vec![if simulate {
            format!("[演练] 将删除 {} 项", tally.removed)
        } else {
            format!("已删除 {} 项", tally.removed)
        }];
        if tally.deferred > 0 {
            lines.push(format!("{} 项将在重启后删除", tally.deferred));
        }
        lines.extend(tally.notes);

        let state = if tally.failures.is_empty() {
            ProgressState::Completed
        } else {
            lines.push(format!("{} 项失败:", tally.failures.len()));
            lines.extend(tally.failures.iter().map(|f| format!("  - {}", f)));
            ProgressState::Warning
        };

        let message = lines.join("\n");
        tracing::info!("{} 结束:\n{}", title, message);
        progress.report(Stage::Finalize.percent(), title, &Stage::Finalize.to_string(), state);

        OperationResult::ok(message).with_backup_id(tally.backup_id)
    }
}
