use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::Parser;

use ps_cleaner_lib::commands::{self, Context};
use ps_cleaner_lib::modules::common::logging;
use ps_cleaner_lib::{AppConfig, CancelFlag};

#[derive(Parser, Debug)]
#[command(name = "ps-cleaner")]
#[command(about = "Photoshop 残留检测、清理与卸载工具", long_about = None)]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// 详细输出模式
    #[arg(short, long, global = true)]
    verbose: bool,

    /// 备份根目录
    #[arg(long, global = true, env = "PS_CLEANER_BACKUP_DIR")]
    backup_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init_logging(cli.verbose);

    // Ctrl+C 只设置取消标记，由各阶段自行收尾
    let cancel = CancelFlag::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("正在取消...");
            signal.cancel();
        }
    });

    let ctx = Context::new(AppConfig::load(cli.backup_root), cancel);
    tracing::debug!("备份目录: {}", ctx.config.backup_root.display());

    if let Err(e) = commands::execute(cli.command, &ctx).await {
        if cli.verbose {
            tracing::error!("错误: {}", e);
        } else {
            eprintln!("错误: {}", e);
        }
        process::exit(1);
    }

    Ok(())
}
