//! # Run Command Module / 运行命令模块
//!
//! This module implements the `run` command, which draws matrix cells from the
//! command-line request and runs them locally or on the configured remote hosts.
//!
//! 此模块实现了 `run` 命令，根据命令行请求抽取矩阵单元，
//! 并在本地或已配置的远程主机上运行它们。

use anyhow::{Context, Result, bail};
use colored::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::env;
use std::path::{Path, PathBuf};

use crate::{
    core::{
        config::{DEFAULT_CONFIG_FILE, MatrixConfig},
        matrix::run_all,
        models::{ConfigRequest, OsChoice},
    },
    infra::{
        backend::{LocalProvider, SshProvider},
        t,
    },
};

/// Arguments of the `run` subcommand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArgs {
    pub isabelle: Option<String>,
    pub java: Option<u32>,
    /// Run on the host of this OS.
    pub os: Option<String>,
    /// Run on a remote host; the OS is drawn unless `os` is given.
    pub remote: bool,
    pub num_tests: usize,
    /// Explicit `--show-results` / `--no-show-results`.
    pub show_results: Option<bool>,
}

impl RunArgs {
    /// The cell request: `--os` implies a remote run, `--remote` alone draws the OS.
    pub fn request(&self) -> ConfigRequest {
        let os = match (&self.os, self.remote) {
            (Some(os), _) => OsChoice::Fixed(os.clone()),
            (None, true) => OsChoice::Any,
            (None, false) => OsChoice::Local,
        };
        ConfigRequest {
            isabelle: self.isabelle.clone(),
            java: self.java,
            os,
        }
    }

    /// Reports are opened when asked for, and by default for a single test.
    pub fn show_results(&self) -> bool {
        self.show_results.unwrap_or(self.num_tests <= 1)
    }
}

/// Executes the run command.
///
/// # Arguments
/// * `args` - The parsed `run` arguments
/// * `config` - Path to the configuration file, if given on the command line
/// * `explicit_language` - Whether `--lang` was given; otherwise the
///   configuration's `language` applies
///
/// # Returns
/// An error if the matrix could not run or any cell failed.
pub async fn execute(args: RunArgs, config: Option<PathBuf>, explicit_language: bool) -> Result<()> {
    let (matrix_config, base_dir) = load_config(config.as_deref())?;
    if !explicit_language {
        if let Some(language) = &matrix_config.language {
            crate::init(Some(language));
        }
    }

    let settings = matrix_config.settings(&base_dir, args.show_results())?;
    let request = args.request();
    println!(
        "{}",
        t!("run.results_root", path = settings.results_root.display()).cyan()
    );

    let mut rng = StdRng::from_entropy();
    let report = if request.os.is_remote() {
        if let OsChoice::Fixed(os) = &request.os {
            matrix_config.host_for(os)?;
        }
        let mut provider = SshProvider::new(&matrix_config);
        run_all(
            &request,
            args.num_tests,
            &matrix_config.axes,
            &settings,
            &mut provider,
            &mut rng,
        )
        .await?
    } else {
        let mut provider = LocalProvider::new(settings.ci_dir.clone());
        run_all(
            &request,
            args.num_tests,
            &matrix_config.axes,
            &settings,
            &mut provider,
            &mut rng,
        )
        .await?
    };

    if report.success() {
        println!("\n{}", t!("run.all_passed").green().bold());
        Ok(())
    } else {
        let failed = report.results.iter().filter(|(_, r)| !r.success).count();
        bail!(t!("run.matrix_failed", failed = failed, total = report.results.len()).to_string())
    }
}

/// Loads the configuration. An explicitly named file must exist; without one,
/// `CiMatrix.toml` in the current directory is used if present and the
/// built-in defaults otherwise.
///
/// 加载配置。显式指定的文件必须存在；未指定时，若当前目录存在 `CiMatrix.toml`
/// 则使用它，否则使用内置默认值。
pub fn load_config(path: Option<&Path>) -> Result<(MatrixConfig, PathBuf)> {
    match path {
        Some(path) => {
            if !path.exists() {
                bail!(
                    "{}\n{}",
                    t!("config.not_found", path = path.display()),
                    t!("config.init_hint")
                );
            }
            MatrixConfig::load(path)
        }
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                return MatrixConfig::load(default_path);
            }
            println!("{}", t!("config.using_defaults").dimmed());
            let cwd = env::current_dir().context("Failed to get current directory")?;
            Ok((MatrixConfig::default(), cwd))
        }
    }
}
