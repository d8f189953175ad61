use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use walkdir::WalkDir;

use crate::modules::common::cancel::CancelFlag;
use crate::modules::common::error::CleanerError;

const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// 文件系统探针
///
/// 除 `copy` 外，所有预期内的失败都转换为 `false` / 空结果，不向上抛出。
pub trait FileSystemProbe: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    /// 惰性查找 `root` 下文件名匹配 glob 模式的条目，无法读取的子树直接跳过
    fn find(&self, root: &Path, pattern: &str, recursive: bool) -> Box<dyn Iterator<Item = PathBuf>>;

    /// 递归统计文件总大小，枚举出错时返回 0
    fn size(&self, path: &Path) -> u64;

    /// 流式复制单个文件，返回复制的字节数
    fn copy(
        &self,
        src: &Path,
        dst: &Path,
        overwrite: bool,
        cancel: &CancelFlag,
    ) -> Result<u64, CleanerError>;

    fn delete_file(&self, path: &Path) -> bool;

    fn delete_directory(&self, path: &Path, recursive: bool) -> bool;
}

/// 本地磁盘实现，删除失败时按次数重试
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    max_attempts: u32,
    retry_delay: Duration,
}

impl LocalFileSystem {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    fn delete_with_retry<F>(&self, path: &Path, remove: F) -> bool
    where
        F: Fn(&Path) -> std::io::Result<()>,
    {
        // 目标已不存在，视为成功
        if fs::symlink_metadata(path).is_err() {
            return true;
        }

        for attempt in 1..=self.max_attempts {
            match remove(path) {
                Ok(()) => {
                    tracing::debug!("已删除: {}", path.display());
                    return true;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return true,
                Err(e) => {
                    tracing::warn!(
                        "删除失败 (第 {}/{} 次) {}: {}",
                        attempt,
                        self.max_attempts,
                        path.display(),
                        e
                    );

                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        strip_protective_attributes(path);
                    }

                    if attempt < self.max_attempts {
                        // 等待占用句柄释放，每次等待更久
                        std::thread::sleep(self.retry_delay * attempt);
                    }
                }
            }
        }

        tracing::error!("多次尝试后仍无法删除: {}", path.display());
        false
    }
}

impl Default for LocalFileSystem {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200))
    }
}

impl FileSystemProbe for LocalFileSystem {
    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn find(&self, root: &Path, pattern: &str, recursive: bool) -> Box<dyn Iterator<Item = PathBuf>> {
        let pattern = match glob::Pattern::new(pattern) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("无效的匹配模式 {}: {}", pattern, e);
                return Box::new(std::iter::empty());
            }
        };

        let options = glob::MatchOptions {
            case_sensitive: false,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };

        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(if recursive { usize::MAX } else { 1 })
            .follow_links(false);

        Box::new(
            walker
                .into_iter()
                .filter_map(|entry| match entry {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        tracing::debug!("跳过无法访问的目录: {}", e);
                        None
                    }
                })
                .filter(move |entry| {
                    pattern.matches_with(&entry.file_name().to_string_lossy(), options)
                })
                .map(|entry| entry.into_path()),
        )
    }

    fn size(&self, path: &Path) -> u64 {
        match fs::metadata(path) {
            Ok(meta) if meta.is_file() => return meta.len(),
            Ok(_) => {}
            Err(_) => return 0,
        }

        let mut total = 0u64;
        for entry in WalkDir::new(path).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("统计大小失败 {}: {}", path.display(), e);
                    return 0;
                }
            };

            if entry.file_type().is_file() {
                match entry.metadata() {
                    Ok(meta) => total += meta.len(),
                    Err(_) => return 0,
                }
            }
        }

        total
    }

    fn copy(
        &self,
        src: &Path,
        dst: &Path,
        overwrite: bool,
        cancel: &CancelFlag,
    ) -> Result<u64, CleanerError> {
        cancel.check()?;

        if !overwrite && dst.exists() {
            return Err(CleanerError::Other(format!("目标已存在: {}", dst.display())));
        }

        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }

        // 先写入临时文件，完成后再改名，取消时目标位置不会留下半个文件
        let partial = partial_path(dst);
        match stream_copy(src, &partial, cancel) {
            Ok(bytes) => {
                if dst.exists() {
                    strip_protective_attributes(dst);
                }
                if let Err(e) = fs::rename(&partial, dst) {
                    let _ = fs::remove_file(&partial);
                    return Err(e.into());
                }
                Ok(bytes)
            }
            Err(e) => {
                let _ = fs::remove_file(&partial);
                Err(e)
            }
        }
    }

    fn delete_file(&self, path: &Path) -> bool {
        self.delete_with_retry(path, |p| fs::remove_file(p))
    }

    fn delete_directory(&self, path: &Path, recursive: bool) -> bool {
        if recursive {
            self.delete_with_retry(path, |p| fs::remove_dir_all(p))
        } else {
            self.delete_with_retry(path, |p| fs::remove_dir(p))
        }
    }
}

fn partial_path(dst: &Path) -> PathBuf {
    let mut name = dst
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    dst.with_file_name(name)
}

fn stream_copy(src: &Path, dst: &Path, cancel: &CancelFlag) -> Result<u64, CleanerError> {
    let mut reader = fs::File::open(src)?;
    let mut writer = fs::File::create(dst)?;
    let mut buffer = vec![0u8; COPY_CHUNK_SIZE];
    let mut copied = 0u64;

    loop {
        cancel.check()?;

        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        writer.write_all(&buffer[..read])?;
        copied += read as u64;
    }

    writer.flush()?;
    Ok(copied)
}

/// 去掉只读/系统属性，目录会递归处理
fn strip_protective_attributes(path: &Path) {
    for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
        clear_attributes(entry.path());
    }
}

#[cfg(windows)]
fn clear_attributes(path: &Path) {
    use std::os::windows::ffi::OsStrExt;
    use windows::core::PCWSTR;
    use windows::Win32::Storage::FileSystem::{SetFileAttributesW, FILE_ATTRIBUTE_NORMAL};

    let wide: Vec<u16> = path
        .as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();

    if let Err(e) = unsafe { SetFileAttributesW(PCWSTR(wide.as_ptr()), FILE_ATTRIBUTE_NORMAL) } {
        tracing::debug!("重置属性失败 {}: {}", path.display(), e);
    }
}

#[cfg(not(windows))]
fn clear_attributes(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Ok(metadata) = fs::metadata(path) {
        let mut perms = metadata.permissions();
        perms.set_mode(perms.mode() | 0o200);
        let _ = fs::set_permissions(path, perms);
    }
}
