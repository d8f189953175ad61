use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// 触发备份的操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Cleanup,
    Uninstall,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Cleanup => write!(f, "Cleanup"),
            OperationKind::Uninstall => write!(f, "Uninstall"),
        }
    }
}

/// 备份项类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Directory,
    RegistryKey,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::File => write!(f, "文件"),
            EntryKind::Directory => write!(f, "目录"),
            EntryKind::RegistryKey => write!(f, "注册表"),
        }
    }
}

/// 单个备份项
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BackupEntry {
    /// 原始路径（文件系统路径或注册表键）
    pub original_path: String,
    /// 备份副本位置，始终位于所属快照目录之下
    pub stored_path: PathBuf,
    pub kind: EntryKind,
    pub size: u64,
    pub captured_at: DateTime<Local>,
    #[serde(default)]
    pub restored: bool,
    #[serde(default)]
    pub restore_error: Option<String>,
}

impl BackupEntry {
    pub fn new(original_path: String, stored_path: PathBuf, kind: EntryKind, size: u64) -> Self {
        Self {
            original_path,
            stored_path,
            kind,
            size,
            captured_at: Local::now(),
            restored: false,
            restore_error: None,
        }
    }
}

/// 备份清单，写入 `Metadata/backup_info.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BackupManifest {
    pub id: String,
    pub created_at: DateTime<Local>,
    pub operation_kind: OperationKind,
    pub installation_name: String,
    #[serde(default)]
    pub installation_version: Option<String>,
    #[serde(default)]
    pub installation_path: Option<PathBuf>,
    /// 本次快照的目录
    pub backup_path: PathBuf,
    pub entries: Vec<BackupEntry>,
    pub item_count: usize,
    pub total_size: u64,
    #[serde(default)]
    pub notes: String,
}

impl BackupManifest {
    /// 根据条目重新计算汇总字段
    pub fn recount(&mut self) {
        self.item_count = self.entries.len();
        self.total_size = self.entries.iter().map(|e| e.size).sum();
    }

    pub fn add_note(&mut self, note: &str) {
        if !self.notes.is_empty() {
            self.notes.push('\n');
        }
        self.notes.push_str(note);
    }
}

/// 快照范围
#[derive(Debug, Clone, Default)]
pub struct BackupScope {
    /// 是否备份安装目录（卸载时通常需要，清理时可省略）
    pub include_install_dir: bool,
    /// 除候选项自身路径外额外需要备份的文件或目录
    pub extra_paths: Vec<PathBuf>,
    /// 除候选项自身注册表键外额外需要导出的键
    pub extra_registry_keys: Vec<String>,
}

impl BackupScope {
    pub fn with_install_dir(mut self) -> Self {
        self.include_install_dir = true;
        self
    }

    pub fn with_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.extra_paths.extend(paths);
        self
    }

    pub fn with_registry_keys(mut self, keys: Vec<String>) -> Self {
        self.extra_registry_keys.extend(keys);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_uses_pascal_case_fields() {
        let mut manifest = BackupManifest {
            id: "Cleanup_20240115_103000".to_string(),
            created_at: Local::now(),
            operation_kind: OperationKind::Cleanup,
            installation_name: "Adobe Photoshop 2024".to_string(),
            installation_version: Some("25.0".to_string()),
            installation_path: None,
            backup_path: PathBuf::from("backups/Cleanup_20240115_103000"),
            entries: vec![BackupEntry::new(
                "C:/a.txt".to_string(),
                PathBuf::from("backups/Cleanup_20240115_103000/Files/a.txt"),
                EntryKind::File,
                12,
            )],
            item_count: 0,
            total_size: 0,
            notes: String::new(),
        };
        manifest.recount();

        let json = serde_json::to_string(&manifest).unwrap_or_default();
        for field in ["\"Id\"", "\"OperationKind\":\"Cleanup\"", "\"ItemCount\":1", "\"TotalSize\":12", "\"StoredPath\"", "\"RestoreError\""] {
            assert!(json.contains(field), "missing {} in {}", field, json);
        }
    }

    #[test]
    fn notes_are_appended_line_by_line() {
        let mut manifest: BackupManifest = serde_json::from_str(
            r#"{"Id":"x","CreatedAt":"2024-01-15T10:30:00+08:00","OperationKind":"Uninstall",
                "InstallationName":"PS","BackupPath":"b","Entries":[],"ItemCount":0,"TotalSize":0}"#,
        )
        .unwrap_or_else(|e| panic!("manifest should parse: {}", e));

        manifest.add_note("first");
        manifest.add_note("second");
        assert_eq!(manifest.notes, "first\nsecond");
        assert_eq!(manifest.operation_kind, OperationKind::Uninstall);
    }
}
