//! # Data Models Module / 数据模型模块
//!
//! This module defines the core data structures used throughout the CI matrix:
//! matrix-cell requests and resolved configurations, remote execution targets,
//! per-run contexts and per-cell results.
//!
//! 此模块定义了整个 CI 矩阵中使用的核心数据结构：
//! 矩阵单元请求与已解析的配置、远程执行目标、单次运行上下文以及单元结果。

use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::path::PathBuf;

/// Which operating system a matrix cell runs on.
/// 矩阵单元运行在哪个操作系统上。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OsChoice {
    /// Run on the controller itself; the resolved config carries no OS.
    /// 在控制端本机运行；解析后的配置不包含 OS。
    #[default]
    Local,
    /// Draw the OS from the catalog and run on that OS's remote host.
    /// 从目录中随机抽取 OS，并在该 OS 对应的远程主机上运行。
    Any,
    /// Run on the remote host of this exact OS.
    /// 在指定 OS 的远程主机上运行。
    Fixed(String),
}

impl OsChoice {
    /// `true` if cells resolved from this choice run on a remote host.
    pub fn is_remote(&self) -> bool {
        !matches!(self, OsChoice::Local)
    }
}

/// A partially specified matrix cell. Every `None` axis is drawn at random
/// during resolution.
///
/// 部分指定的矩阵单元。每个为 `None` 的维度在解析时随机抽取。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigRequest {
    pub isabelle: Option<String>,
    pub java: Option<u32>,
    pub os: OsChoice,
}

/// A fully resolved matrix cell. Equality and hashing are by value, which is
/// what the matrix runner uses to skip duplicate cells.
///
/// 完全解析的矩阵单元。相等性和哈希均按值比较，矩阵运行器据此跳过重复的单元。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestConfig {
    pub isabelle: String,
    pub java: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
}

impl TestConfig {
    /// Human-readable description, e.g. `Isabelle2025, Java 17, OS linux`.
    pub fn description(&self) -> String {
        let mut text = format!("Isabelle{}, Java {}", self.isabelle, self.java);
        if let Some(os) = &self.os {
            let _ = write!(text, ", OS {os}");
        }
        text
    }

    /// Name of the per-cell results directory, e.g. `isa2021-1-java11-linux`.
    ///
    /// Characters outside `[A-Za-z0-9.-]` are written as `_XX` byte escapes.
    /// In the Isabelle segment a `-` that starts `-java` is escaped too, so the
    /// first `-java` always ends the version; the OS segment escapes every `-`.
    /// Two distinct configs therefore never share a directory, local or remote.
    pub fn dirname(&self) -> String {
        let mut name = format!(
            "isa{}-java{}",
            escape_segment(&self.isabelle, |rest| rest.starts_with("-java")),
            self.java
        );
        if let Some(os) = &self.os {
            name.push('-');
            name.push_str(&escape_segment(os, |_| true));
        }
        name
    }
}

impl fmt::Display for TestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

/// `escape_dash` sees the rest of the value starting at each `-`.
fn escape_segment(value: &str, escape_dash: impl Fn(&str) -> bool) -> String {
    let mut out = String::with_capacity(value.len());
    for (i, c) in value.char_indices() {
        let keep = c.is_ascii_alphanumeric() || c == '.' || (c == '-' && !escape_dash(&value[i..]));
        if keep {
            out.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                let _ = write!(out, "_{byte:02X}");
            }
        }
    }
    out
}

/// The SSH endpoint a remote matrix cell runs on.
/// 远程矩阵单元运行所在的 SSH 端点。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTarget {
    pub hostname: String,
    pub port: u16,
    pub user: Option<String>,
}

impl ExecutionTarget {
    /// `host` for the default SSH port, `host:port` otherwise.
    pub fn hostport(&self) -> String {
        if self.port == 22 {
            self.hostname.clone()
        } else {
            format!("{}:{}", self.hostname, self.port)
        }
    }
}

/// The outcome of one matrix cell.
/// 单个矩阵单元的结果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    /// `true` iff the report's return code was 0.
    /// 当且仅当报告的返回码为 0 时为 `true`。
    pub success: bool,
    /// Local directory holding `test-reports-html/` and `test-reports/`.
    /// 保存 `test-reports-html/` 和 `test-reports/` 的本地目录。
    pub results_dir: PathBuf,
}

/// Mutable state of a single driver invocation.
///
/// A context only exists once its backend session is open, and it is owned by
/// exactly one driver invocation. The working directory is filled in once the
/// backend has prepared it and is what teardown removes.
///
/// 单次驱动调用的可变状态。上下文仅在后端会话建立后存在，并且只属于一次驱动调用。
#[derive(Debug)]
pub struct RunContext<B> {
    pub config: TestConfig,
    pub backend: B,
    pub workdir: Option<String>,
}

impl<B> RunContext<B> {
    pub fn new(config: TestConfig, backend: B) -> Self {
        Self {
            config,
            backend,
            workdir: None,
        }
    }
}
