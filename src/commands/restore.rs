//! restore 命令 - 按备份 ID 还原

use anyhow::Result;
use clap::Parser;

use super::{finish, progress_printer, Context};

#[derive(Parser, Debug)]
pub struct RestoreCommand {
    /// 备份 ID（见 backups 命令）
    pub id: String,
}

pub async fn execute(cmd: RestoreCommand, ctx: &Context) -> Result<()> {
    let engine = ctx.backup_engine();

    let (progress, printer) = progress_printer();
    let result = engine.restore_snapshot(&cmd.id, &ctx.cancel, &progress).await;
    drop(progress);
    let _ = printer.await;

    finish(&result)
}
