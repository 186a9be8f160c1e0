//! # File System Operations Module / 文件系统操作模块
//!
//! This module provides utilities for file system operations: clearing and
//! recreating directories, mirroring the source tree into the staging
//! directory, copying directory contents and building `file://` URIs.
//!
//! 此模块提供文件系统操作的实用功能：清空并重建目录、将源码树镜像到暂存目录、
//! 复制目录内容以及构造 `file://` URI。

use anyhow::{Context, Result};
use fs_extra::dir::{CopyOptions, copy};
use std::cell::Cell;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
#[cfg(not(unix))]
use tracing::warn;
use walkdir::WalkDir;

/// Removes a directory tree if it exists.
pub fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)
            .with_context(|| format!("Failed to remove directory: {}", dir.display()))?;
    }
    Ok(())
}

/// Removes `dir` with all its contents and creates it again, empty.
///
/// # Arguments
/// * `dir` - Directory to rebuild
pub fn recreate_dir(dir: &Path) -> Result<()> {
    remove_dir_if_exists(dir)?;
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))
}

/// Number of entries copied by [`mirror_tree`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MirrorStats {
    pub files: usize,
    pub dirs: usize,
    pub links: usize,
    pub excluded: usize,
}

/// Mirrors `src` into `dst`, skipping excluded paths.
///
/// `dst` is emptied first, so files removed from `src` also disappear from the
/// mirror. Exclusions are anchored at `src`: `target` skips only the top-level
/// `target` directory, `project/target` only that nested one. `dst` itself is
/// never copied into itself, even if it lies inside `src`. Symbolic links are
/// recreated as links (dangling ones included) and never followed; where the
/// platform cannot create them, their target is copied instead.
///
/// 将 `src` 镜像到 `dst`，跳过排除的路径。`dst` 会先被清空，因此从 `src` 删除的文件
/// 也会从镜像中消失。排除规则以 `src` 为锚点。符号链接按链接原样重建，不会被跟随。
pub fn mirror_tree(src: &Path, dst: &Path, exclude: &[String]) -> Result<MirrorStats> {
    let exclude: Vec<PathBuf> = exclude
        .iter()
        .map(|entry| split_relative(entry).into_iter().collect())
        .collect();
    recreate_dir(dst)?;
    let dst_root = fs::canonicalize(dst)
        .with_context(|| format!("Failed to resolve path: {}", dst.display()))?;

    let excluded = Cell::new(0usize);
    let walker = WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
            let skip = exclude.iter().any(|pattern| rel == pattern.as_path())
                || (entry.file_type().is_dir()
                    && fs::canonicalize(entry.path()).is_ok_and(|path| path == dst_root));
            if skip {
                excluded.set(excluded.get() + 1);
            }
            !skip
        });

    let mut stats = MirrorStats::default();
    for entry in walker {
        let entry =
            entry.with_context(|| format!("Failed to read directory: {}", src.display()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("{} is not below {}", entry.path().display(), src.display()))?;
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create directory: {}", target.display()))?;
            stats.dirs += 1;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
            stats.links += 1;
        } else {
            fs::copy(entry.path(), &target).with_context(|| {
                format!(
                    "Failed to copy {} to {}",
                    entry.path().display(),
                    target.display()
                )
            })?;
            stats.files += 1;
        }
    }
    stats.excluded = excluded.get();
    debug!(?stats, src = %src.display(), dst = %dst.display(), "mirrored source tree");
    Ok(stats)
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> Result<()> {
    let points_to = fs::read_link(link)
        .with_context(|| format!("Failed to read link: {}", link.display()))?;
    std::os::unix::fs::symlink(&points_to, target)
        .with_context(|| format!("Failed to create link: {}", target.display()))
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> Result<()> {
    match fs::canonicalize(link) {
        Ok(real) if real.is_dir() => copy_dir_contents(&real, target),
        Ok(real) => {
            fs::copy(&real, target).with_context(|| {
                format!("Failed to copy {} to {}", real.display(), target.display())
            })?;
            Ok(())
        }
        Err(e) => {
            warn!(link = %link.display(), error = %e, "skipping dangling link");
            Ok(())
        }
    }
}

/// Splits `a/b/c` (or `/a/b/c`) into its normal components.
fn split_relative(path: &str) -> Vec<String> {
    Path::new(path.trim_start_matches('/'))
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

/// Copies everything inside `from` into `to`, overwriting existing entries.
///
/// # Arguments
/// * `from` - Source directory path
/// * `to` - Destination directory path, created if missing
pub fn copy_dir_contents(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to)
        .with_context(|| format!("Failed to create directory: {}", to.display()))?;
    let mut options = CopyOptions::new();
    options.overwrite = true;
    options.content_only = true;
    copy(from, to, &options).with_context(|| {
        format!("Failed to copy {} to {}", from.display(), to.display())
    })?;
    Ok(())
}

/// `true` if both paths resolve to the same existing location.
pub fn same_location(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Builds a `file://` URI for an absolute path, percent-encoding every byte
/// outside the unreserved set.
pub fn file_uri(path: &Path) -> String {
    let absolute: PathBuf = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let text = absolute.to_string_lossy().replace('\\', "/");
    let mut uri = String::from("file://");
    if !text.starts_with('/') {
        uri.push('/');
    }
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' | b':' => {
                uri.push(byte as char)
            }
            _ => uri.push_str(&format!("%{byte:02X}")),
        }
    }
    uri
}
