//! # Infrastructure Module / 基础设施模块
//!
//! This module provides infrastructure services for the CI matrix: process
//! spawning with streamed output, file system helpers, and the local and
//! remote execution backends.
//!
//! 此模块为 CI 矩阵提供基础设施服务：带输出流的进程派生、文件系统辅助函数，
//! 以及本地和远程执行后端。

pub mod backend;
pub mod command;
pub mod fs;

// Re-export i18n functions for easier access
pub use rust_i18n::t;
