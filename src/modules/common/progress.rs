use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// 进度状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressState {
    Running,
    Completed,
    Failed,
    Canceled,
    Warning,
}

impl std::fmt::Display for ProgressState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressState::Running => write!(f, "进行中"),
            ProgressState::Completed => write!(f, "完成"),
            ProgressState::Failed => write!(f, "失败"),
            ProgressState::Canceled => write!(f, "已取消"),
            ProgressState::Warning => write!(f, "警告"),
        }
    }
}

/// 进度事件，仅用于展示，不影响流程
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressInfo {
    pub percent: u8,
    pub title: String,
    pub status: String,
    pub state: ProgressState,
}

impl ProgressInfo {
    pub fn new(percent: i32, title: &str, status: &str, state: ProgressState) -> Self {
        Self {
            percent: percent.clamp(0, 100) as u8,
            title: title.to_string(),
            status: status.to_string(),
            state,
        }
    }
}

/// 进度上报通道；未连接接收端时所有上报都是空操作
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    sender: Option<UnboundedSender<ProgressInfo>>,
    /// 子操作映射到上层进度的区间
    range: Option<(i32, i32)>,
}

impl ProgressReporter {
    pub fn new(sender: UnboundedSender<ProgressInfo>) -> Self {
        Self {
            sender: Some(sender),
            range: None,
        }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    /// 把 0-100 的子进度映射到 [start, end]，子操作的“完成”不会结束上层操作
    pub fn scoped(&self, start: i32, end: i32) -> Self {
        let (start, end) = match self.range {
            Some((outer_start, outer_end)) => (
                Self::map(outer_start, outer_end, start),
                Self::map(outer_start, outer_end, end),
            ),
            None => (start, end),
        };
        Self {
            sender: self.sender.clone(),
            range: Some((start, end)),
        }
    }

    fn map(start: i32, end: i32, percent: i32) -> i32 {
        start + (end - start) * percent.clamp(0, 100) / 100
    }

    pub fn report(&self, percent: i32, title: &str, status: &str, state: ProgressState) {
        let (percent, state) = match self.range {
            Some((start, end)) => {
                let state = if state == ProgressState::Completed {
                    ProgressState::Running
                } else {
                    state
                };
                (Self::map(start, end, percent), state)
            }
            None => (percent, state),
        };
        let info = ProgressInfo::new(percent, title, status, state);
        tracing::debug!("[{}%] {} - {} ({})", info.percent, info.title, info.status, info.state);

        if let Some(sender) = &self.sender {
            // 接收端已关闭时忽略
            let _ = sender.send(info);
        }
    }

    pub fn running(&self, percent: i32, title: &str, status: &str) {
        self.report(percent, title, status, ProgressState::Running);
    }

    /// 在 [start, end] 区间内按 done/total 插值上报
    pub fn band(&self, start: i32, end: i32, done: usize, total: usize, title: &str, status: &str) {
        let span = (end - start).max(0) as usize;
        let offset = if total == 0 { span } else { span * done.min(total) / total };
        self.running(start + offset as i32, title, status);
    }
}
