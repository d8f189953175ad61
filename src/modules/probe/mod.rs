pub mod deferred;
pub mod filesystem;
pub mod regfile;
pub mod registry;
#[cfg(windows)]
pub mod windows_registry;

use std::process::Command;
use std::sync::Arc;

use crate::modules::common::error::CleanerError;
use registry::RegistryProbe;

/// 当前平台的注册表实现
pub fn system_registry() -> Arc<dyn RegistryProbe> {
    #[cfg(windows)]
    {
        Arc::new(windows_registry::WindowsRegistry::new())
    }

    #[cfg(not(windows))]
    {
        tracing::warn!("非 Windows 平台，使用空的内存注册表");
        Arc::new(registry::MemoryRegistry::new())
    }
}

/// 运行外部命令行工具，非零退出码或无法启动都视为失败，错误中附带 stderr
pub fn run_tool(program: &str, args: &[&str]) -> Result<String, CleanerError> {
    tracing::debug!("执行: {} {}", program, args.join(" "));

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| CleanerError::Tool(format!("无法启动 {}: {}", program, e)))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(CleanerError::Tool(format!(
            "{} 退出码 {:?}: {}",
            program,
            output.status.code(),
            stderr
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_is_an_ordinary_failure() {
        let result = run_tool("ps-cleaner-no-such-tool", &["--help"]);
        assert!(matches!(result, Err(CleanerError::Tool(_))));
    }
}
