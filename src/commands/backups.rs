//! backups 命令 - 列出或删除备份快照

use anyhow::Result;
use clap::Parser;

use super::{finish, truncate_string, Context};
use crate::modules::backup::models::BackupManifest;
use crate::modules::common::utils;

#[derive(Parser, Debug)]
pub struct BackupsCommand {
    /// 删除指定 ID 的备份
    #[arg(long)]
    pub delete: Option<String>,

    /// 输出格式 (table/json)
    #[arg(long, default_value = "table")]
    pub format: String,
}

pub async fn execute(cmd: BackupsCommand, ctx: &Context) -> Result<()> {
    let engine = ctx.backup_engine();

    if let Some(id) = cmd.delete {
        return finish(&engine.delete_snapshot(&id));
    }

    let snapshots = engine.list_snapshots();

    match cmd.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&snapshots)?),
        _ => {
            println!("备份目录: {}", engine.root().display());
            print_table(&snapshots);
        }
    }

    Ok(())
}

fn print_table(snapshots: &[BackupManifest]) {
    println!("\n{}", "=".repeat(100));
    println!(
        "{:<28} {:<20} {:<10} {:<24} {:>6} {:>10}",
        "ID", "创建时间", "类型", "安装", "项数", "大小"
    );
    println!("{}", "=".repeat(100));

    for manifest in snapshots {
        println!(
            "{:<28} {:<20} {:<10} {:<24} {:>6} {:>10}",
            manifest.id,
            manifest.created_at.format("%Y-%m-%d %H:%M:%S"),
            manifest.operation_kind.to_string(),
            truncate_string(&manifest.installation_name, 23),
            manifest.item_count,
            utils::format_size(manifest.total_size)
        );

        if let Some(note) = manifest.notes.lines().next() {
            println!("     备注: {}", note);
        }
    }

    println!("{}", "=".repeat(100));
    println!("总计: {} 个备份\n", snapshots.len());
}
