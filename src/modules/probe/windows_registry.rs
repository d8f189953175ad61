use std::path::Path;

use winreg::enums::*;
use winreg::RegKey;

use super::registry::{RegistryPath, RegistryProbe, RegistryRoot, RegistryValue};
use super::run_tool;

/// 真实的 Windows 注册表
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsRegistry;

impl WindowsRegistry {
    pub fn new() -> Self {
        Self
    }

    fn open(path: &RegistryPath) -> Option<RegKey> {
        RegKey::predef(to_hkey(path.root))
            .open_subkey_with_flags(&path.subkey, KEY_READ)
            .ok()
    }
}

fn to_hkey(root: RegistryRoot) -> winreg::HKEY {
    match root {
        RegistryRoot::LocalMachine => HKEY_LOCAL_MACHINE,
        RegistryRoot::CurrentUser => HKEY_CURRENT_USER,
        RegistryRoot::ClassesRoot => HKEY_CLASSES_ROOT,
        RegistryRoot::Users => HKEY_USERS,
        RegistryRoot::CurrentConfig => HKEY_CURRENT_CONFIG,
    }
}

impl RegistryProbe for WindowsRegistry {
    fn key_exists(&self, path: &str) -> bool {
        RegistryPath::parse(path)
            .and_then(|parsed| Self::open(&parsed))
            .is_some()
    }

    fn get_value(&self, path: &str, name: &str) -> Option<RegistryValue> {
        let key = RegistryPath::parse(path).and_then(|parsed| Self::open(&parsed))?;

        if let Ok(value) = key.get_value::<String, _>(name) {
            return Some(RegistryValue::String(value));
        }
        if let Ok(value) = key.get_value::<u32, _>(name) {
            return Some(RegistryValue::Dword(value));
        }
        if let Ok(value) = key.get_value::<u64, _>(name) {
            return Some(RegistryValue::Qword(value));
        }
        None
    }

    fn list_subkeys(&self, path: &str) -> Vec<String> {
        match RegistryPath::parse(path).and_then(|parsed| Self::open(&parsed)) {
            Some(key) => key.enum_keys().filter_map(|k| k.ok()).collect(),
            None => Vec::new(),
        }
    }

    fn export_key(&self, path: &str, file_out: &Path) -> bool {
        let Some(parsed) = RegistryPath::parse(path) else {
            return false;
        };

        if let Some(parent) = file_out.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return false;
            }
        }

        let target = file_out.to_string_lossy().to_string();
        match run_tool("reg", &["export", &parsed.long_form(), &target, "/y"]) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("导出注册表失败 {}: {}", parsed.short_form(), e);
                false
            }
        }
    }

    fn import_file(&self, file_in: &Path) -> bool {
        let source = file_in.to_string_lossy().to_string();
        match run_tool("reg", &["import", &source]) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("导入注册表失败 {}: {}", file_in.display(), e);
                false
            }
        }
    }

    fn delete_key(&self, path: &str) -> bool {
        let Some(parsed) = RegistryPath::parse(path) else {
            return false;
        };
        if parsed.is_root() {
            tracing::error!("拒绝删除注册表根: {}", path);
            return false;
        }

        if Self::open(&parsed).is_none() {
            return true;
        }

        // 第一级：进程内删除
        match RegKey::predef(to_hkey(parsed.root)).delete_subkey_all(&parsed.subkey) {
            Ok(()) => {
                tracing::info!("已删除注册表项: {}", parsed.short_form());
                return true;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return true,
            Err(e) => {
                tracing::warn!("删除注册表失败，改用 reg.exe {}: {}", parsed.short_form(), e);
            }
        }

        // 第二级：命令行工具
        match run_tool("reg", &["delete", &parsed.long_form(), "/f"]) {
            Ok(_) => {
                tracing::info!("已通过 reg.exe 删除注册表项: {}", parsed.short_form());
                true
            }
            Err(e) => {
                tracing::error!("删除注册表失败 {}: {}", parsed.short_form(), e);
                false
            }
        }
    }
}
