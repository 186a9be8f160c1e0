//! # Matrix Runner / 矩阵运行器
//!
//! Draws matrix cells, runs every distinct one through the single-run driver
//! in sequence, then writes the index page, the JSON summary and the console
//! summary.
//!
//! 抽取矩阵单元，按顺序将每个不同的单元交给单次运行驱动执行，
//! 然后写入索引页、JSON 摘要并打印控制台摘要。

use anyhow::Result;
use colored::*;
use rand::Rng;
use std::path::PathBuf;
use tracing::debug;

use crate::core::config::{AxisCatalog, RunSettings};
use crate::core::driver::run_single;
use crate::core::models::{ConfigRequest, TestConfig, TestResult};
use crate::core::resolver::resolve;
use crate::infra::backend::BackendProvider;
use crate::infra::t;
use crate::reporting::{print_cell_failure, print_summary, write_index, write_summary};

/// Everything a matrix run recorded.
#[derive(Debug, Clone)]
pub struct MatrixReport {
    /// One entry per distinct cell, in the order the cells ran.
    pub results: Vec<(TestConfig, TestResult)>,
    /// The index page listing every report under the results root.
    pub index: PathBuf,
    /// The JSON summary of this run.
    pub summary: PathBuf,
}

impl MatrixReport {
    /// `true` iff every recorded cell succeeded. A run that recorded no cell
    /// is successful.
    pub fn success(&self) -> bool {
        self.results.iter().all(|(_, result)| result.success)
    }

    pub fn result_for(&self, config: &TestConfig) -> Option<&TestResult> {
        self.results
            .iter()
            .find(|(recorded, _)| recorded == config)
            .map(|(_, result)| result)
    }
}

/// Runs up to `num_tests` cells drawn from `request`.
///
/// A draw identical to a cell that already ran in this invocation is skipped
/// and not drawn again. A cell whose driver fails is reported and recorded as
/// failed; the remaining cells still run. Only configuration errors (e.g. an
/// empty catalog) abort the whole matrix.
///
/// 最多运行 `num_tests` 个从 `request` 抽取的单元。与本次调用中已运行单元相同的抽取
/// 会被跳过且不会重新抽取。驱动失败的单元会被报告并记录为失败，其余单元继续运行。
pub async fn run_all<P, R>(
    request: &ConfigRequest,
    num_tests: usize,
    catalog: &AxisCatalog,
    settings: &RunSettings,
    provider: &mut P,
    rng: &mut R,
) -> Result<MatrixReport>
where
    P: BackendProvider,
    R: Rng + ?Sized,
{
    let mut results: Vec<(TestConfig, TestResult)> = Vec::new();

    for test_no in 1..=num_tests {
        let config = resolve(request, catalog, rng)?;
        if results.iter().any(|(recorded, _)| *recorded == config) {
            println!("{}", t!("matrix.skipping_duplicate", n = test_no).yellow());
            continue;
        }
        println!(
            "{}",
            t!("matrix.test_header", n = test_no, desc = config.description()).bold()
        );

        let result = match run_single(&config, settings, provider).await {
            Ok(result) => result,
            Err(e) => {
                print_cell_failure(&config, &e);
                TestResult {
                    success: false,
                    results_dir: settings.results_root.join(config.dirname()),
                }
            }
        };
        results.push((config, result));
    }

    let index = write_index(&settings.results_root)?;
    let summary = write_summary(&settings.results_root, &results)?;
    debug!(index = %index.display(), summary = %summary.display(), "matrix reports written");

    print_summary(&results);
    println!("{}", t!("matrix.index_written", path = index.display()).dimmed());

    Ok(MatrixReport {
        results,
        index,
        summary,
    })
}
