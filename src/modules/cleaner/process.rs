use std::sync::Mutex;

use crate::modules::probe;

/// 结束进程的结果，只用于汇报
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopOutcome {
    pub success: bool,
    pub message: String,
}

/// 清理前结束目标进程
pub trait ProcessStopper: Send + Sync {
    fn stop(&self, process_names: &[String]) -> StopOutcome;
}

/// 调用 `taskkill /F /IM <name>`
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskkillStopper;

impl ProcessStopper for TaskkillStopper {
    fn stop(&self, process_names: &[String]) -> StopOutcome {
        let mut stopped = Vec::new();

        for name in process_names {
            match probe::run_tool("taskkill", &["/F", "/IM", name.as_str()]) {
                Ok(_) => {
                    tracing::info!("已结束进程: {}", name);
                    stopped.push(name.as_str());
                }
                Err(e) => {
                    // 进程未运行时 taskkill 同样返回非零
                    tracing::debug!("未结束进程 {}: {}", name, e);
                }
            }
        }

        let message = if stopped.is_empty() {
            "没有需要结束的进程".to_string()
        } else {
            format!("已结束进程: {}", stopped.join(", "))
        };

        StopOutcome {
            success: true,
            message,
        }
    }
}

/// 只记录调用，测试用
#[derive(Debug, Default)]
pub struct RecordingStopper {
    calls: Mutex<Vec<Vec<String>>>,
}

impl RecordingStopper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl ProcessStopper for RecordingStopper {
    fn stop(&self, process_names: &[String]) -> StopOutcome {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(process_names.to_vec());
        }
        StopOutcome {
            success: true,
            message: format!("已结束 {} 个进程", process_names.len()),
        }
    }
}
