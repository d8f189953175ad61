pub mod backups;
pub mod clean;
pub mod detect;
pub mod restore;
pub mod uninstall;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Subcommand};
use tokio::task::JoinHandle;

use crate::modules::backup::BackupEngine;
use crate::modules::cleaner::models::OperationResult;
use crate::modules::cleaner::process::TaskkillStopper;
use crate::modules::cleaner::Cleaner;
use crate::modules::common::cancel::CancelFlag;
use crate::modules::common::config::AppConfig;
use crate::modules::common::progress::{ProgressInfo, ProgressReporter, ProgressState};
use crate::modules::detector::models::InstallationCandidate;
use crate::modules::detector::DetectionEngine;
use crate::modules::probe;
use crate::modules::probe::deferred::SystemRebootScheduler;
use crate::modules::probe::filesystem::{FileSystemProbe, LocalFileSystem};
use crate::modules::probe::registry::RegistryProbe;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 检测 Photoshop 安装及残留
    Detect(detect::DetectCommand),

    /// 查看或删除备份
    Backups(backups::BackupsCommand),

    /// 从备份还原
    Restore(restore::RestoreCommand),

    /// 清理残留（先备份）
    Clean(clean::CleanCommand),

    /// 运行卸载程序并清理
    Uninstall(uninstall::UninstallCommand),
}

pub async fn execute(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Detect(cmd) => detect::execute(cmd, ctx).await,
        Command::Backups(cmd) => backups::execute(cmd, ctx).await,
        Command::Restore(cmd) => restore::execute(cmd, ctx).await,
        Command::Clean(cmd) => clean::execute(cmd, ctx).await,
        Command::Uninstall(cmd) => uninstall::execute(cmd, ctx).await,
    }
}

/// 各命令共享的运行环境
pub struct Context {
    pub config: AppConfig,
    pub registry: Arc<dyn RegistryProbe>,
    pub fs: Arc<dyn FileSystemProbe>,
    pub cancel: CancelFlag,
}

impl Context {
    pub fn new(config: AppConfig, cancel: CancelFlag) -> Self {
        let fs = Arc::new(LocalFileSystem::new(config.delete_attempts, config.retry_delay));
        Self {
            registry: probe::system_registry(),
            fs,
            config,
            cancel,
        }
    }

    pub fn detector(&self) -> DetectionEngine {
        DetectionEngine::new(self.registry.clone(), self.fs.clone(), &self.config)
    }

    pub fn cleaner(&self) -> Cleaner {
        Cleaner::new(
            self.config.clone(),
            self.fs.clone(),
            self.registry.clone(),
            Arc::new(TaskkillStopper),
            Arc::new(SystemRebootScheduler),
        )
    }

    pub fn backup_engine(&self) -> BackupEngine {
        BackupEngine::new(self.config.backup_root.clone(), self.fs.clone(), self.registry.clone())
    }
}

/// 选择操作目标
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// 使用 detect 列表中的第几项 (从 1 开始)
    #[arg(long, default_value_t = 1)]
    pub index: usize,

    /// 直接指定安装目录，跳过检测
    #[arg(long)]
    pub path: Option<PathBuf>,
}

/// 按参数确定目标候选项
pub async fn resolve_target(ctx: &Context, target: &TargetArgs) -> Result<InstallationCandidate> {
    let engine = ctx.detector();

    if let Some(path) = &target.path {
        return Ok(engine.inspect_path(path));
    }

    let report = engine.detect(&ctx.cancel, &ProgressReporter::silent()).await;
    if report.canceled {
        anyhow::bail!("检测已取消");
    }

    let count = report.candidates.len();
    report
        .candidates
        .into_iter()
        .nth(target.index.saturating_sub(1))
        .ok_or_else(|| {
            if count == 0 {
                anyhow::anyhow!("未检测到 Photoshop 安装")
            } else {
                anyhow::anyhow!("序号 {} 超出范围 (共 {} 项)", target.index, count)
            }
        })
}

/// 在后台打印进度，返回上报器和打印任务
///
/// 上报器全部释放后打印任务才会结束。
pub fn progress_printer() -> (ProgressReporter, JoinHandle<()>) {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ProgressInfo>();
    let handle = tokio::spawn(async move {
        while let Some(info) = rx.recv().await {
            match info.state {
                ProgressState::Running => println!("[{:>3}%] {}", info.percent, info.status),
                _ => println!("[{:>3}%] {} ({})", info.percent, info.status, info.state),
            }
        }
    });
    (ProgressReporter::new(tx), handle)
}

/// 打印操作结果，失败时返回错误以便设置退出码
pub fn finish(result: &OperationResult) -> Result<()> {
    println!("\n{}", result);

    if result.success || result.canceled {
        Ok(())
    } else {
        anyhow::bail!(result.error.clone().unwrap_or_else(|| result.message.clone()))
    }
}

/// 截断字符串，按字符计数以正确处理中文
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() > max_len {
        let chars: String = s.chars().take(max_len.saturating_sub(2)).collect();
        format!("{}..", chars)
    } else {
        s.to_string()
    }
}
