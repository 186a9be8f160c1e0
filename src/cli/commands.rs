//! # CLI Commands / CLI 命令
//!
//! - `run` - Run matrix cells / 运行矩阵单元
//! - `init` - Write a configuration file / 写入配置文件

pub mod init;
pub mod run;
