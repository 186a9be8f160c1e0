//! # HTML Reporting Module / HTML 报告模块
//!
//! Post-processing of the per-cell HTML report (title rewriting, return-code
//! reading) and generation of the index page that links every report found
//! under the results root.
//!
//! 单元 HTML 报告的后处理（重写标题、读取返回码），以及生成链接结果根目录下
//! 所有报告的索引页。

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use maud::html;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::error::CiError;
use crate::infra::fs::file_uri;

/// Directory of the HTML report inside a cell's results directory.
pub const HTML_REPORT_DIR: &str = "test-reports-html";
/// Directory of the machine-readable report inside a cell's results directory.
pub const XML_REPORT_DIR: &str = "test-reports";
/// Report page inside [`HTML_REPORT_DIR`].
pub const REPORT_INDEX: &str = "index.html";
/// Exit code of the test run inside [`HTML_REPORT_DIR`].
pub const RETURN_CODE_FILE: &str = "return-code.txt";
/// Format of every timestamp written into reports.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Replaces every occurrence of `placeholder` in the report at `path` with
/// `title`, leaving all other bytes untouched.
///
/// Returns `false` (and leaves the file alone) if the placeholder is absent,
/// which makes a second application with the same inputs a no-op.
///
/// 将 `path` 处报告中所有的 `placeholder` 替换为 `title`，其余字节保持不变。
/// 若找不到占位符则返回 `false` 且不修改文件，因此相同输入的重复调用不会产生变化。
pub fn rewrite_report_title(path: &Path, placeholder: &str, title: &str) -> Result<bool> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read report: {}", path.display()))?;
    if placeholder.is_empty() || !content.contains(placeholder) {
        debug!(path = %path.display(), "report title placeholder not found");
        return Ok(false);
    }
    fs::write(path, content.replace(placeholder, title))
        .with_context(|| format!("Failed to write report: {}", path.display()))?;
    Ok(true)
}

/// Reads the decimal return code the test run left in `path`.
pub fn read_return_code(path: &Path) -> Result<i32> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read return code: {}", path.display()))?;
    let code = content
        .trim()
        .parse::<i32>()
        .map_err(|_| CiError::InvalidReturnCode {
            path: path.display().to_string(),
            content: content.clone(),
        })?;
    Ok(code)
}

/// One line of the index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Name of the cell's results directory.
    pub name: String,
    /// `file://` URI of the cell's report page.
    pub uri: String,
    /// Last modification time of the report page.
    pub modified: String,
}

/// Finds `<root>/*/test-reports-html/index.html`, in directory-scan order.
///
/// The order is whatever the file system returns; it is deliberately not sorted.
pub fn discover_reports(results_root: &Path) -> Result<Vec<IndexEntry>> {
    let mut entries = Vec::new();
    if !results_root.is_dir() {
        return Ok(entries);
    }
    let dir = fs::read_dir(results_root)
        .with_context(|| format!("Failed to read directory: {}", results_root.display()))?;
    for cell_dir in dir {
        let cell_dir = cell_dir?;
        let report: PathBuf = cell_dir.path().join(HTML_REPORT_DIR).join(REPORT_INDEX);
        if !report.is_file() {
            continue;
        }
        let modified: DateTime<Local> = fs::metadata(&report)
            .and_then(|meta| meta.modified())
            .with_context(|| format!("Failed to stat report: {}", report.display()))?
            .into();
        entries.push(IndexEntry {
            name: cell_dir.file_name().to_string_lossy().into_owned(),
            uri: file_uri(&report),
            modified: modified.format(TIMESTAMP_FORMAT).to_string(),
        });
    }
    debug!(count = entries.len(), root = %results_root.display(), "discovered reports");
    Ok(entries)
}

/// Renders the index page: a bare list with escaped names and URIs.
pub fn render_index(entries: &[IndexEntry]) -> String {
    html! {
        ul {
            @for entry in entries {
                li {
                    a href=(entry.uri) { (entry.name) }
                    " (" (entry.modified) ")"
                }
            }
        }
    }
    .into_string()
}

/// Scans the results root and writes `<root>/index.html`. Returns the path of
/// the written page.
///
/// 扫描结果根目录并写入 `<root>/index.html`，返回写入页面的路径。
pub fn write_index(results_root: &Path) -> Result<PathBuf> {
    let entries = discover_reports(results_root)?;
    fs::create_dir_all(results_root)
        .with_context(|| format!("Failed to create directory: {}", results_root.display()))?;
    let index_path = results_root.join(REPORT_INDEX);
    fs::write(&index_path, render_index(&entries))
        .with_context(|| format!("Failed to write index: {}", index_path.display()))?;
    Ok(index_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_escapes_names_and_uris() {
        let entries = vec![IndexEntry {
            name: "isa<x>".to_string(),
            uri: "file:///tmp/a\"b".to_string(),
            modified: "2025-01-02 03:04:05".to_string(),
        }];
        let page = render_index(&entries);
        assert!(page.starts_with("<ul><li>"));
        assert!(page.contains("isa&lt;x&gt;"));
        assert!(page.contains("href=\"file:///tmp/a&quot;b\""));
        assert!(page.contains(" (2025-01-02 03:04:05)"));
    }
}
