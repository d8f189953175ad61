//! clean 命令 - 备份后清理残留文件与注册表

use anyhow::Result;
use clap::Parser;

use super::{finish, progress_printer, resolve_target, Context, TargetArgs};
use crate::modules::cleaner::models::CleanupOptions;

#[derive(Parser, Debug)]
pub struct CleanCommand {
    #[command(flatten)]
    pub target: TargetArgs,

    /// 只演练，不修改任何文件
    #[arg(long)]
    pub simulate: bool,

    /// 不创建备份
    #[arg(long)]
    pub no_backup: bool,

    /// 不结束相关进程
    #[arg(long)]
    pub no_stop: bool,

    /// 跳过临时文件
    #[arg(long)]
    pub no_temp: bool,

    /// 跳过注册表
    #[arg(long)]
    pub no_registry: bool,

    /// 跳过配置文件
    #[arg(long)]
    pub no_config: bool,

    /// 跳过缓存
    #[arg(long)]
    pub no_cache: bool,

    /// 删除失败时不登记重启删除
    #[arg(long)]
    pub no_reboot_delete: bool,
}

impl CleanCommand {
    pub fn options(&self) -> CleanupOptions {
        CleanupOptions {
            stop_processes: !self.no_stop,
            create_backup: !self.no_backup,
            temp_files: !self.no_temp,
            registry: !self.no_registry,
            config_files: !self.no_config,
            cache_files: !self.no_cache,
            schedule_on_reboot: !self.no_reboot_delete,
            simulate: self.simulate,
        }
    }
}

pub async fn execute(cmd: CleanCommand, ctx: &Context) -> Result<()> {
    let candidate = resolve_target(ctx, &cmd.target).await?;
    println!("目标: {} [{} 分, {}]", candidate.display_name, candidate.score, candidate.tier);
    if cmd.simulate {
        println!("演练模式: 不会修改任何文件");
    }

    let cleaner = ctx.cleaner();
    let (progress, printer) = progress_printer();
    let result = cleaner
        .cleanup(&candidate, &cmd.options(), &ctx.cancel, &progress)
        .await;
    drop(progress);
    let _ = printer.await;

    finish(&result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        clean: CleanCommand,
    }

    #[test]
    fn flags_switch_off_stages() {
        let harness = Harness::parse_from(["clean", "--no-registry", "--simulate", "--index", "2"]);
        let options = harness.clean.options();
        assert!(!options.registry);
        assert!(options.simulate);
        assert!(options.temp_files && options.create_backup);
        assert_eq!(harness.clean.target.index, 2);
    }
}
