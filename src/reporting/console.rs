//! # Console Reporting Module / 控制台报告模块
//!
//! Prints the per-cell pass/fail summary and the details of failed cells,
//! using color coding and internationalized messages.
//!
//! 打印每个单元的通过/失败摘要以及失败单元的详细信息，使用颜色编码和国际化消息。

use colored::*;

use crate::core::error::CiError;
use crate::core::models::{TestConfig, TestResult};
use crate::infra::t;

/// Prints one line per recorded cell.
///
/// # Output Format / 输出格式
/// ```text
/// --- Test Summary ---
///   ✅ Isabelle2025, Java 17
///   ❌ Isabelle2021-1, Java 11
/// ```
pub fn print_summary(results: &[(TestConfig, TestResult)]) {
    println!("\n{}", t!("summary.banner").bold());

    if results.is_empty() {
        println!("  {}", t!("summary.no_results").dimmed());
        return;
    }

    for (config, result) in results {
        let line = if result.success {
            format!("✅ {}", config.description()).green()
        } else {
            format!("❌ {}", config.description()).red()
        };
        println!("  {}", line);
    }
}

/// Prints why a cell could not complete, including the captured output of
/// the command that failed.
///
/// 打印单元无法完成的原因，包括失败命令所捕获的输出。
pub fn print_cell_failure(config: &TestConfig, error: &anyhow::Error) {
    println!("{}", "-".repeat(80).cyan());
    println!(
        "{}",
        t!("run.cell_aborted", desc = config.description()).red().bold()
    );
    println!("  {:#}", error);

    let output = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<CiError>())
        .and_then(CiError::captured_output);
    if let Some(output) = output.filter(|output| !output.trim().is_empty()) {
        println!("\n--- {} ---\n", t!("run.command_output").yellow());
        println!("{}", output.trim_end());
    }
    println!("{}", "-".repeat(80).cyan());
}
