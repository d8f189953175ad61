//! detect 命令 - 检测安装并按置信度排序

use anyhow::Result;
use clap::Parser;

use super::{progress_printer, truncate_string, Context};
use crate::modules::common::utils;
use crate::modules::detector::models::InstallationCandidate;

#[derive(Parser, Debug)]
pub struct DetectCommand {
    /// 输出格式 (table/json)
    #[arg(long, default_value = "table")]
    pub format: String,
}

pub async fn execute(cmd: DetectCommand, ctx: &Context) -> Result<()> {
    let engine = ctx.detector();

    let report = if cmd.format == "json" {
        engine
            .detect(&ctx.cancel, &crate::modules::common::progress::ProgressReporter::silent())
            .await
    } else {
        let (progress, printer) = progress_printer();
        let report = engine.detect(&ctx.cancel, &progress).await;
        drop(progress);
        let _ = printer.await;
        report
    };

    if report.canceled {
        println!("检测已取消");
        return Ok(());
    }

    match cmd.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => {
            print_table(&report.candidates);
            for error in &report.method_errors {
                println!("  警告: {}", error);
            }
        }
    }

    Ok(())
}

fn print_table(candidates: &[InstallationCandidate]) {
    println!("\n{}", "=".repeat(110));
    println!(
        "{:<4} {:<36} {:<12} {:<10} {:>5} {:<10} {:<30}",
        "#", "名称", "版本", "等级", "分数", "来源", "安装位置"
    );
    println!("{}", "=".repeat(110));

    for (index, c) in candidates.iter().enumerate() {
        let location = c
            .install_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        println!(
            "{:<4} {:<36} {:<12} {:<10} {:>5} {:<10} {:<30}",
            index + 1,
            truncate_string(&c.display_name, 35),
            truncate_string(c.version_str().unwrap_or("-"), 11),
            c.tier.to_string(),
            c.score,
            c.method.to_string(),
            truncate_string(&location, 30)
        );

        if c.estimated_size > 0 {
            println!("     大小: {}", utils::format_size(c.estimated_size));
        }
    }

    println!("{}", "=".repeat(110));
    println!("总计: {} 个安装\n", candidates.len());
}
