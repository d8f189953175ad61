//! `.reg` 文本格式的读写
//!
//! 只覆盖本工具会产生的值类型：字符串、DWORD、QWORD。`reg.exe export` 生成的
//! UTF-16 文件也能读取，其它值类型在解析时跳过。

use super::registry::RegistryValue;
use crate::modules::common::error::CleanerError;

pub const REG_HEADER: &str = "Windows Registry Editor Version 5.00";

/// 一个注册表键及其值
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegSection {
    /// 长格式路径，如 `HKEY_CURRENT_USER\Software\Adobe`
    pub path: String,
    pub values: Vec<(String, RegistryValue)>,
}

/// 生成 `.reg` 文本
pub fn render(sections: &[RegSection]) -> String {
    let mut content = String::new();
    content.push_str(REG_HEADER);
    content.push_str("\r\n\r\n");

    for section in sections {
        content.push_str(&format!("[{}]\r\n", section.path));
        for (name, value) in &section.values {
            let key = if name.is_empty() {
                "@".to_string()
            } else {
                format!("\"{}\"", escape(name))
            };
            content.push_str(&format!("{}={}\r\n", key, format_value(value)));
        }
        content.push_str("\r\n");
    }

    content
}

fn format_value(value: &RegistryValue) -> String {
    match value {
        RegistryValue::String(s) => format!("\"{}\"", escape(s)),
        RegistryValue::Dword(v) => format!("dword:{:08x}", v),
        RegistryValue::Qword(v) => {
            let hex: Vec<String> = v.to_le_bytes().iter().map(|b| format!("{:02x}", b)).collect();
            format!("hex(b):{}", hex.join(","))
        }
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// 把文件字节解码为文本（支持 UTF-16 LE BOM）
pub fn decode(bytes: &[u8]) -> Result<String, CleanerError> {
    if bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] == 0xFE {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16(&units)
            .map_err(|e| CleanerError::Serde(format!("无效的 UTF-16 注册表文件: {}", e)));
    }

    let text = std::str::from_utf8(bytes)
        .map_err(|e| CleanerError::Serde(format!("无效的注册表文件编码: {}", e)))?;
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

/// 解析 `.reg` 文本
pub fn parse(text: &str) -> Result<Vec<RegSection>, CleanerError> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    match lines.next() {
        Some(header) if header == REG_HEADER || header == "REGEDIT4" => {}
        _ => return Err(CleanerError::Serde("缺少注册表文件头".to_string())),
    }

    let mut sections: Vec<RegSection> = Vec::new();

    for line in lines {
        if line.starts_with(';') {
            continue;
        }

        if let Some(inner) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            if inner.starts_with('-') {
                // 删除键的指令不在支持范围内
                tracing::debug!("忽略删除指令: {}", inner);
                continue;
            }
            sections.push(RegSection {
                path: inner.to_string(),
                values: Vec::new(),
            });
            continue;
        }

        let Some(section) = sections.last_mut() else {
            return Err(CleanerError::Serde(format!("值出现在键之前: {}", line)));
        };

        let (name, rest) = if let Some(rest) = line.strip_prefix('@') {
            (String::new(), rest)
        } else if line.starts_with('"') {
            match parse_quoted(line) {
                Some(parsed) => parsed,
                None => return Err(CleanerError::Serde(format!("无法解析的值名: {}", line))),
            }
        } else {
            tracing::debug!("跳过无法识别的行: {}", line);
            continue;
        };

        let Some(raw_value) = rest.trim_start().strip_prefix('=') else {
            return Err(CleanerError::Serde(format!("缺少等号: {}", line)));
        };

        match parse_value(raw_value.trim()) {
            Some(value) => section.values.push((name, value)),
            None => tracing::debug!("跳过不支持的值类型: {}", line),
        }
    }

    Ok(sections)
}

fn parse_value(raw: &str) -> Option<RegistryValue> {
    if raw.starts_with('"') {
        let (value, rest) = parse_quoted(raw)?;
        if !rest.trim().is_empty() {
            return None;
        }
        return Some(RegistryValue::String(value));
    }

    if let Some(hex) = raw.strip_prefix("dword:") {
        return u32::from_str_radix(hex.trim(), 16).ok().map(RegistryValue::Dword);
    }

    if let Some(hex) = raw.strip_prefix("hex(b):") {
        let bytes = hex
            .split(',')
            .map(|b| u8::from_str_radix(b.trim(), 16).ok())
            .collect::<Option<Vec<u8>>>()?;
        let array: [u8; 8] = bytes.try_into().ok()?;
        return Some(RegistryValue::Qword(u64::from_le_bytes(array)));
    }

    None
}

/// 解析以引号开头的字符串，返回反转义后的内容和剩余部分
fn parse_quoted(input: &str) -> Option<(String, &str)> {
    let body = input.strip_prefix('"')?;
    let mut result = String::new();
    let mut escaped = false;

    for (index, ch) in body.char_indices() {
        if escaped {
            result.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == '"' {
            return Some((result, &body[index + 1..]));
        } else {
            result.push(ch);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_then_parse_preserves_values() {
        let sections = vec![RegSection {
            path: r"HKEY_CURRENT_USER\Software\Adobe\Photoshop\250.0".to_string(),
            values: vec![
                (String::new(), RegistryValue::String("default".to_string())),
                (
                    "ApplicationPath".to_string(),
                    RegistryValue::String(r#"C:\Program Files\Adobe\Adobe Photoshop 2024\"#.to_string()),
                ),
                ("Quoted \"Name\"".to_string(), RegistryValue::Dword(0x1f)),
                ("Big".to_string(), RegistryValue::Qword(0x0102_0304_0506_0708)),
            ],
        }];

        let text = render(&sections);
        assert!(text.starts_with(REG_HEADER));
        assert!(text.contains("dword:0000001f"));

        let parsed = parse(&text).unwrap_or_default();
        assert_eq!(parsed, sections);
    }

    #[test]
    fn parse_rejects_missing_header() {
        assert!(parse("[HKEY_CURRENT_USER\\Software]").is_err());
    }

    #[test]
    fn parse_skips_unsupported_types_and_delete_sections() {
        let text = "Windows Registry Editor Version 5.00\r\n\r\n\
            [-HKEY_CURRENT_USER\\Software\\Gone]\r\n\
            [HKEY_CURRENT_USER\\Software\\Kept]\r\n\
            \"Bin\"=hex:01,02\r\n\
            \"Str\"=\"v\"\r\n";

        let parsed = parse(text).unwrap_or_default();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].values, vec![("Str".to_string(), RegistryValue::String("v".to_string()))]);
    }

    #[test]
    fn decode_handles_utf16_bom() {
        let text = "Windows Registry Editor Version 5.00";
        let mut bytes = vec![0xFF, 0xFE];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode(&bytes).ok().as_deref(), Some(text));
    }
}
