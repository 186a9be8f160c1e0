//! # Reporting Module / 报告模块
//!
//! This module post-processes the reports extracted from the build container,
//! writes the index page and the JSON summary of a matrix run, and prints
//! colorful console summaries with internationalization support.
//!
//! 此模块对从构建容器中提取的报告进行后处理，写入矩阵运行的索引页和 JSON 摘要，
//! 并打印支持国际化的彩色控制台摘要。

pub mod console;
pub mod html;
pub mod summary;

// Re-export common reporting functions
pub use console::{print_cell_failure, print_summary};
pub use html::{read_return_code, rewrite_report_title, write_index};
pub use summary::write_summary;
