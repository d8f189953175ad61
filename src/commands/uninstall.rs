//! uninstall 命令 - 运行卸载程序、删除安装目录并清理残留

use anyhow::Result;
use clap::Parser;

use super::{finish, progress_printer, resolve_target, Context, TargetArgs};
use crate::modules::cleaner::models::{CleanupOptions, UninstallOptions};

#[derive(Parser, Debug)]
pub struct UninstallCommand {
    #[command(flatten)]
    pub target: TargetArgs,

    /// 只演练，不修改任何文件
    #[arg(long)]
    pub simulate: bool,

    /// 卸载后同时清理临时文件、配置、缓存和注册表
    #[arg(long)]
    pub residuals: bool,

    /// 保留安装目录
    #[arg(long)]
    pub keep_install_dir: bool,

    /// 不运行产品自带的卸载程序
    #[arg(long)]
    pub no_uninstaller: bool,

    /// 不创建备份
    #[arg(long)]
    pub no_backup: bool,

    /// 不结束相关进程
    #[arg(long)]
    pub no_stop: bool,
}

impl UninstallCommand {
    pub fn options(&self) -> UninstallOptions {
        UninstallOptions {
            run_uninstaller: !self.no_uninstaller,
            remove_install_dir: !self.keep_install_dir,
            cleanup: CleanupOptions {
                stop_processes: !self.no_stop,
                create_backup: !self.no_backup,
                temp_files: self.residuals,
                registry: self.residuals,
                config_files: self.residuals,
                cache_files: self.residuals,
                schedule_on_reboot: true,
                simulate: self.simulate,
            },
        }
    }
}

pub async fn execute(cmd: UninstallCommand, ctx: &Context) -> Result<()> {
    let candidate = resolve_target(ctx, &cmd.target).await?;
    println!("目标: {} [{} 分, {}]", candidate.display_name, candidate.score, candidate.tier);

    let cleaner = ctx.cleaner();
    if !cleaner.can_uninstall(&candidate) {
        anyhow::bail!("{} 没有卸载命令或安装目录，无法卸载", candidate.display_name);
    }

    let (progress, printer) = progress_printer();
    let result = cleaner
        .uninstall(&candidate, &cmd.options(), &ctx.cancel, &progress)
        .await;
    drop(progress);
    let _ = printer.await;

    finish(&result)
}
