use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::regfile::{self, RegSection};
use crate::modules::common::error::CleanerError;

/// 注册表探针
///
/// 路径统一使用 `HKLM\...`、`HKCU\...` 等根别名（也接受 `HKEY_*` 长格式），
/// 无法识别的根视为查找失败。
pub trait RegistryProbe: Send + Sync {
    fn key_exists(&self, path: &str) -> bool;

    fn get_value(&self, path: &str, name: &str) -> Option<RegistryValue>;

    /// 列出直接子键名
    fn list_subkeys(&self, path: &str) -> Vec<String>;

    /// 把整棵子树导出为 `.reg` 文件
    fn export_key(&self, path: &str, file_out: &Path) -> bool;

    /// 导入之前导出的 `.reg` 文件
    fn import_file(&self, file_in: &Path) -> bool;

    /// 删除整棵子树，键不存在视为成功
    fn delete_key(&self, path: &str) -> bool;
}

/// 注册表值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryValue {
    String(String),
    Dword(u32),
    Qword(u64),
}

impl RegistryValue {
    pub fn as_string(&self) -> Option<String> {
        match self {
            RegistryValue::String(s) => Some(s.clone()),
            RegistryValue::Dword(v) => Some(v.to_string()),
            RegistryValue::Qword(v) => Some(v.to_string()),
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            RegistryValue::String(s) => s.trim().parse().ok(),
            RegistryValue::Dword(v) => Some(*v as u64),
            RegistryValue::Qword(v) => Some(*v),
        }
    }
}

/// 注册表根
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryRoot {
    LocalMachine,
    CurrentUser,
    ClassesRoot,
    Users,
    CurrentConfig,
}

impl RegistryRoot {
    pub fn short_name(self) -> &'static str {
        match self {
            RegistryRoot::LocalMachine => "HKLM",
            RegistryRoot::CurrentUser => "HKCU",
            RegistryRoot::ClassesRoot => "HKCR",
            RegistryRoot::Users => "HKU",
            RegistryRoot::CurrentConfig => "HKCC",
        }
    }

    pub fn long_name(self) -> &'static str {
        match self {
            RegistryRoot::LocalMachine => "HKEY_LOCAL_MACHINE",
            RegistryRoot::CurrentUser => "HKEY_CURRENT_USER",
            RegistryRoot::ClassesRoot => "HKEY_CLASSES_ROOT",
            RegistryRoot::Users => "HKEY_USERS",
            RegistryRoot::CurrentConfig => "HKEY_CURRENT_CONFIG",
        }
    }

    fn from_alias(alias: &str) -> Option<Self> {
        match alias.to_uppercase().as_str() {
            "HKLM" | "HKEY_LOCAL_MACHINE" => Some(RegistryRoot::LocalMachine),
            "HKCU" | "HKEY_CURRENT_USER" => Some(RegistryRoot::CurrentUser),
            "HKCR" | "HKEY_CLASSES_ROOT" => Some(RegistryRoot::ClassesRoot),
            "HKU" | "HKEY_USERS" => Some(RegistryRoot::Users),
            "HKCC" | "HKEY_CURRENT_CONFIG" => Some(RegistryRoot::CurrentConfig),
            _ => None,
        }
    }
}

/// 解析后的注册表路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryPath {
    pub root: RegistryRoot,
    pub subkey: String,
}

impl RegistryPath {
    pub fn parse(path: &str) -> Option<Self> {
        let normalized = path.trim().replace('/', "\\");
        let normalized = normalized.trim_matches('\\');
        let (alias, rest) = match normalized.split_once('\\') {
            Some((alias, rest)) => (alias, rest),
            None => (normalized, ""),
        };

        let root = RegistryRoot::from_alias(alias)?;
        let subkey = rest
            .split('\\')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\\");

        Some(Self { root, subkey })
    }

    pub fn is_root(&self) -> bool {
        self.subkey.is_empty()
    }

    /// `HKLM\...` 形式
    pub fn short_form(&self) -> String {
        if self.subkey.is_empty() {
            self.root.short_name().to_string()
        } else {
            format!("{}\\{}", self.root.short_name(), self.subkey)
        }
    }

    /// `HKEY_LOCAL_MACHINE\...` 形式，`.reg` 文件和 reg.exe 使用
    pub fn long_form(&self) -> String {
        if self.subkey.is_empty() {
            self.root.long_name().to_string()
        } else {
            format!("{}\\{}", self.root.long_name(), self.subkey)
        }
    }

    pub fn join(&self, child: &str) -> Self {
        let subkey = if self.subkey.is_empty() {
            child.to_string()
        } else {
            format!("{}\\{}", self.subkey, child)
        };
        Self {
            root: self.root,
            subkey,
        }
    }

    /// 大小写无关的比较键
    pub fn key(&self) -> String {
        self.short_form().to_lowercase()
    }
}

/// 规范化注册表路径为 `HKLM\...` 形式；无法识别时返回 `None`
pub fn normalize_registry_path(path: &str) -> Option<String> {
    RegistryPath::parse(path).map(|p| p.short_form())
}

#[derive(Debug, Clone)]
struct MemoryKey {
    path: RegistryPath,
    values: BTreeMap<String, (String, RegistryValue)>,
}

#[derive(Debug, Default)]
struct MemoryState {
    keys: BTreeMap<String, MemoryKey>,
    deny_export: HashSet<String>,
    protected: HashSet<String>,
}

/// 内存中的注册表
///
/// 非 Windows 平台上作为后备实现，测试中用来替代真实注册表。
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    state: Mutex<MemoryState>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建键（含所有上级键）
    pub fn create_key(&self, path: &str) -> bool {
        let Some(parsed) = RegistryPath::parse(path) else {
            return false;
        };
        let mut state = self.lock();
        Self::ensure_key(&mut state, &parsed);
        true
    }

    pub fn set_value(&self, path: &str, name: &str, value: RegistryValue) -> bool {
        let Some(parsed) = RegistryPath::parse(path) else {
            return false;
        };
        let mut state = self.lock();
        Self::ensure_key(&mut state, &parsed);
        if let Some(key) = state.keys.get_mut(&parsed.key()) {
            key.values
                .insert(name.to_lowercase(), (name.to_string(), value));
        }
        true
    }

    /// 让指定键的导出失败
    pub fn deny_export(&self, path: &str) {
        if let Some(parsed) = RegistryPath::parse(path) {
            self.lock().deny_export.insert(parsed.key());
        }
    }

    /// 让指定键及其上级键无法删除（两级删除都失败）
    pub fn protect(&self, path: &str) {
        if let Some(parsed) = RegistryPath::parse(path) {
            self.lock().protected.insert(parsed.key());
        }
    }

    pub fn key_count(&self) -> usize {
        self.lock().keys.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_key(state: &mut MemoryState, path: &RegistryPath) {
        let mut current = RegistryPath {
            root: path.root,
            subkey: String::new(),
        };
        for part in path.subkey.split('\\').filter(|p| !p.is_empty()) {
            current = current.join(part);
            state
                .keys
                .entry(current.key())
                .or_insert_with(|| MemoryKey {
                    path: current.clone(),
                    values: BTreeMap::new(),
                });
        }
    }

    fn subtree_keys(state: &MemoryState, path: &RegistryPath) -> Vec<String> {
        let base = path.key();
        let prefix = format!("{}\\", base);
        state
            .keys
            .keys()
            .filter(|k| **k == base || k.starts_with(&prefix))
            .cloned()
            .collect()
    }
}

impl RegistryProbe for MemoryRegistry {
    fn key_exists(&self, path: &str) -> bool {
        match RegistryPath::parse(path) {
            Some(parsed) if parsed.is_root() => true,
            Some(parsed) => self.lock().keys.contains_key(&parsed.key()),
            None => false,
        }
    }

    fn get_value(&self, path: &str, name: &str) -> Option<RegistryValue> {
        let parsed = RegistryPath::parse(path)?;
        let state = self.lock();
        state
            .keys
            .get(&parsed.key())
            .and_then(|key| key.values.get(&name.to_lowercase()))
            .map(|(_, value)| value.clone())
    }

    fn list_subkeys(&self, path: &str) -> Vec<String> {
        let Some(parsed) = RegistryPath::parse(path) else {
            return Vec::new();
        };
        let depth = parsed.subkey.split('\\').filter(|p| !p.is_empty()).count();
        let state = self.lock();

        Self::subtree_keys(&state, &parsed)
            .into_iter()
            .filter_map(|k| state.keys.get(&k))
            .filter(|key| key.path.root == parsed.root)
            .filter(|key| key.path.subkey.split('\\').count() == depth + 1)
            .filter_map(|key| key.path.subkey.rsplit('\\').next().map(str::to_string))
            .collect()
    }

    fn export_key(&self, path: &str, file_out: &Path) -> bool {
        let Some(parsed) = RegistryPath::parse(path) else {
            return false;
        };

        let sections = {
            let state = self.lock();
            if state.deny_export.contains(&parsed.key()) {
                tracing::warn!("导出被拒绝: {}", parsed.short_form());
                return false;
            }
            if !state.keys.contains_key(&parsed.key()) {
                return false;
            }

            Self::subtree_keys(&state, &parsed)
                .into_iter()
                .filter_map(|k| state.keys.get(&k))
                .map(|key| RegSection {
                    path: key.path.long_form(),
                    values: key.values.values().cloned().collect(),
                })
                .collect::<Vec<_>>()
        };

        if let Some(parent) = file_out.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return false;
            }
        }

        match std::fs::write(file_out, regfile::render(&sections)) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("写入导出文件失败 {}: {}", file_out.display(), e);
                false
            }
        }
    }

    fn import_file(&self, file_in: &Path) -> bool {
        let sections = match std::fs::read(file_in)
            .map_err(CleanerError::from)
            .and_then(|bytes| regfile::decode(&bytes))
            .and_then(|text| regfile::parse(&text))
        {
            Ok(sections) => sections,
            Err(e) => {
                tracing::warn!("导入注册表文件失败 {}: {}", file_in.display(), e);
                return false;
            }
        };

        for section in sections {
            let Some(parsed) = RegistryPath::parse(&section.path) else {
                tracing::warn!("导入时遇到无法识别的键: {}", section.path);
                return false;
            };
            let mut state = self.lock();
            Self::ensure_key(&mut state, &parsed);
            if let Some(key) = state.keys.get_mut(&parsed.key()) {
                for (name, value) in section.values {
                    key.values.insert(name.to_lowercase(), (name, value));
                }
            }
        }

        true
    }

    fn delete_key(&self, path: &str) -> bool {
        let Some(parsed) = RegistryPath::parse(path) else {
            return false;
        };
        if parsed.is_root() {
            tracing::error!("拒绝删除注册表根: {}", path);
            return false;
        }

        let mut state = self.lock();
        let subtree = Self::subtree_keys(&state, &parsed);
        // 子树中任何一个键受保护，整棵树都删不掉
        if subtree.iter().any(|k| state.protected.contains(k)) || state.protected.contains(&parsed.key()) {
            tracing::warn!("注册表键受保护，无法删除: {}", parsed.short_form());
            return false;
        }

        for key in subtree {
            state.keys.remove(&key);
        }
        true
    }
}
