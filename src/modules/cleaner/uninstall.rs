//! 运行产品自带的卸载程序

use std::process::Stdio;
use std::time::{Duration, Instant};

use crate::modules::common::cancel::CancelFlag;
use crate::modules::common::error::CleanerError;
use crate::modules::common::utils;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// 处理常见的卸载命令格式：MSI 卸载追加静默参数
pub fn build_command_line(uninstall_string: &str) -> String {
    let trimmed = uninstall_string.trim();
    if !utils::is_msi_command(trimmed) {
        return trimmed.to_string();
    }

    let lower = trimmed.to_lowercase();
    let mut command = trimmed.to_string();
    if !lower.contains("/quiet") && !lower.contains("/qn") {
        command.push_str(" /quiet");
    }
    if !lower.contains("/norestart") {
        command.push_str(" /norestart");
    }
    command
}

/// 通过 `cmd /C` 运行卸载命令并等待结束
///
/// 超时或取消时结束子进程；非零退出码返回 `CleanerError::Tool`。
pub async fn run_uninstaller(
    uninstall_string: &str,
    timeout: Duration,
    cancel: &CancelFlag,
) -> Result<(), CleanerError> {
    let command_line = build_command_line(uninstall_string);
    tracing::info!("执行卸载命令: {}", command_line);

    let mut child = tokio::process::Command::new("cmd")
        .args(["/C", command_line.as_str()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| CleanerError::Tool(format!("无法启动卸载程序: {}", e)))?;

    if let Some(pid) = child.id() {
        tracing::debug!("卸载进程 PID: {}", pid);
    }

    let deadline = Instant::now() + timeout;
    loop {
        tokio::select! {
            status = child.wait() => {
                let status = status?;
                return if status.success() {
                    tracing::info!("卸载程序已结束");
                    Ok(())
                } else {
                    Err(CleanerError::Tool(format!("卸载程序退出码 {:?}", status.code())))
                };
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {
                if cancel.is_canceled() {
                    let _ = child.kill().await;
                    return Err(CleanerError::Canceled);
                }
                if Instant::now() >= deadline {
                    let _ = child.kill().await;
                    return Err(CleanerError::Timeout(format!(
                        "卸载程序在 {} 秒内未结束",
                        timeout.as_secs()
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msi_commands_get_silent_flags() {
        assert_eq!(
            build_command_line("MsiExec.exe /X{1234}"),
            "MsiExec.exe /X{1234} /quiet /norestart"
        );
        assert_eq!(
            build_command_line("msiexec /x {1234} /qn /norestart"),
            "msiexec /x {1234} /qn /norestart"
        );
        assert_eq!(
            build_command_line(r#""C:\PS\Uninstaller.exe" --uninstall=1"#),
            r#""C:\PS\Uninstaller.exe" --uninstall=1"#
        );
    }

    #[cfg(not(windows))]
    #[tokio::test]
    async fn missing_shell_is_a_tool_failure() {
        let result = run_uninstaller("uninstall.exe", Duration::from_secs(1), &CancelFlag::new()).await;
        assert!(matches!(result, Err(CleanerError::Tool(_))));
    }
}
