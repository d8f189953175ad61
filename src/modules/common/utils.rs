use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

/// 规范化路径（统一反斜杠、合并连续分隔符、去掉末尾分隔符）
pub fn normalize_path(path: &str) -> String {
    let replaced = path.trim().replace('/', "\\");

    let mut normalized = String::with_capacity(replaced.len());
    let mut previous_was_separator = false;
    for (index, ch) in replaced.chars().enumerate() {
        if ch == '\\' {
            // 保留 UNC 路径开头的双反斜杠
            if previous_was_separator && index > 1 {
                continue;
            }
            previous_was_separator = true;
        } else {
            previous_was_separator = false;
        }
        normalized.push(ch);
    }

    while normalized.len() > 3 && normalized.ends_with('\\') {
        normalized.pop();
    }

    normalized
}

/// 用于比较的路径键（不区分大小写）
pub fn path_key(path: &str) -> String {
    normalize_path(path).to_lowercase()
}

/// 格式化文件大小
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// 归一化安装日期为 YYYY-MM-DD
pub fn normalize_install_date(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let formats = ["%Y%m%d", "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
    for format in formats {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    None
}

/// 解析版本号：2 到 4 段以点分隔的非负整数
pub fn parse_version(raw: &str) -> Option<Vec<u32>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parts = trimmed
        .split('.')
        .map(|part| part.parse::<u32>().ok())
        .collect::<Option<Vec<u32>>>()?;

    if (2..=4).contains(&parts.len()) {
        Some(parts)
    } else {
        None
    }
}

/// 从卸载命令中提取可执行文件路径
///
/// 支持 `"C:\path\uninstall.exe" --args` 和 `C:\path\uninstall.exe /S` 两种写法。
pub fn extract_executable(command: &str) -> Option<PathBuf> {
    let trimmed = command.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(rest) = trimmed.strip_prefix('"') {
        let end = rest.find('"')?;
        let candidate = rest[..end].trim();
        if candidate.is_empty() {
            return None;
        }
        return Some(PathBuf::from(candidate));
    }

    // 未加引号时，取到 .exe 为止，兼容带空格的路径
    let lower = trimmed.to_lowercase();
    if let Some(position) = lower.find(".exe") {
        return Some(PathBuf::from(&trimmed[..position + 4]));
    }

    trimmed.split_whitespace().next().map(PathBuf::from)
}

/// 判断卸载命令是否为 MSI 卸载
pub fn is_msi_command(command: &str) -> bool {
    command.trim().to_lowercase().starts_with("msiexec")
}

/// 为备份文件生成基于原路径的存储名，避免同名文件互相覆盖
pub fn content_addressed_name(original: &Path) -> String {
    let mut hasher = DefaultHasher::new();
    path_key(&original.to_string_lossy()).hash(&mut hasher);
    let digest = hasher.finish();

    let stem = original
        .file_stem()
        .map(|s| sanitize_file_name(&s.to_string_lossy()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "item".to_string());

    match original.extension() {
        Some(ext) => format!("{}_{:016x}.{}", stem, digest, ext.to_string_lossy()),
        None => format!("{}_{:016x}", stem, digest),
    }
}

/// 注册表键导出文件名：键名最后一段 + 路径哈希
pub fn registry_export_name(key: &str) -> String {
    content_addressed_name(Path::new(&format!("{}.reg", key.replace('\\', "/"))))
}

/// 替换文件名中的非法字符
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|ch| match ch {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_path_collapses_separators() {
        assert_eq!(normalize_path("C:/Apps//PS/"), r"C:\Apps\PS");
        assert_eq!(normalize_path(r"C:\"), r"C:\");
        assert_eq!(normalize_path(r"\\server\share\dir"), r"\\server\share\dir");
    }

    #[test]
    fn path_key_ignores_case_and_trailing_separator() {
        assert_eq!(path_key(r"C:\Apps\PS\"), path_key("c:/apps/ps"));
    }

    #[test]
    fn normalize_install_date_supports_registry_format() {
        assert_eq!(
            normalize_install_date("20240115"),
            Some("2024-01-15".to_string())
        );
        assert_eq!(normalize_install_date("not-a-date"), None);
        assert_eq!(normalize_install_date(""), None);
    }

    #[test]
    fn parse_version_requires_two_to_four_numeric_parts() {
        assert_eq!(parse_version("25.0"), Some(vec![25, 0]));
        assert_eq!(parse_version("25.0.0.37"), Some(vec![25, 0, 0, 37]));
        assert_eq!(parse_version("25"), None);
        assert_eq!(parse_version("1.2.3.4.5"), None);
        assert_eq!(parse_version("25.x"), None);
        assert_eq!(parse_version(""), None);
    }

    #[test]
    fn extract_executable_handles_quoted_and_bare_commands() {
        assert_eq!(
            extract_executable(r#""C:\Program Files\Common Files\Adobe\Uninstaller.exe" --uninstall=1"#),
            Some(PathBuf::from(r"C:\Program Files\Common Files\Adobe\Uninstaller.exe"))
        );
        assert_eq!(
            extract_executable(r"C:\Program Files\Adobe\uninst.exe /S"),
            Some(PathBuf::from(r"C:\Program Files\Adobe\uninst.exe"))
        );
        assert_eq!(
            extract_executable("MsiExec.exe /X{1234}"),
            Some(PathBuf::from("MsiExec.exe"))
        );
        assert_eq!(extract_executable("   "), None);
    }

    #[test]
    fn content_addressed_name_differs_for_same_file_name() {
        let a = content_addressed_name(&Path::new("a").join("prefs.psp"));
        let b = content_addressed_name(&Path::new("b").join("prefs.psp"));
        assert_ne!(a, b);
        assert!(a.starts_with("prefs_"));
        assert!(a.ends_with(".psp"));
    }

    #[test]
    fn registry_export_name_uses_last_key_segment() {
        let name = registry_export_name(r"HKCU\Software\Adobe\Photoshop\250.0");
        assert!(name.starts_with("250.0_"), "{}", name);
        assert!(name.ends_with(".reg"));
        assert_ne!(name, registry_export_name(r"HKLM\SOFTWARE\Adobe\Photoshop\250.0"));
    }
}
