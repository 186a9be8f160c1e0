//! # Init Command Module / 初始化命令模块
//!
//! This module implements the `init` command, which writes a `CiMatrix.toml`
//! with every setting spelled out, optionally asking for the most common
//! ones through an interactive wizard.
//!
//! 此模块实现了 `init` 命令，写入列出全部设置的 `CiMatrix.toml`，
//! 并可通过交互式向导询问最常用的设置。

use anyhow::{Context, Result};
use colored::*;
use dialoguer::{Confirm, Input, Select, theme::ColorfulTheme};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::config::{DEFAULT_CONFIG_FILE, MatrixConfig};
use crate::infra::t;

const HEADER: &str = "\
# CI matrix configuration / CI 矩阵配置
#
# Relative paths are resolved against the directory of this file.
# 相对路径基于此文件所在目录解析。
#
# `ci-matrix run` builds one image per matrix cell from the Dockerfile in
# `ci_dir` and copies the reports into `results_dir/<cell>/`.

";

const LANGUAGES: [&str; 2] = ["en", "zh-CN"];

/// Executes the init command.
///
/// # Arguments
/// * `output` - Path of the new configuration file (`CiMatrix.toml` if `None`)
/// * `non_interactive` - Write the defaults without asking
/// * `force` - Overwrite an existing file without asking
pub fn execute(output: Option<PathBuf>, non_interactive: bool, force: bool) -> Result<()> {
    let output = output.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let theme = ColorfulTheme::default();

    if output.exists() && !force {
        if non_interactive {
            println!("{}", t!("init.file_exists", path = output.display()).red());
            println!("{}", t!("init.use_force").yellow());
            return Ok(());
        }
        let overwrite = Confirm::with_theme(&theme)
            .with_prompt(t!("init.overwrite_prompt", path = output.display()))
            .default(false)
            .interact()
            .context(t!("init.confirmation_failed").to_string())?;
        if !overwrite {
            println!("{}", t!("init.aborted"));
            return Ok(());
        }
    }

    let config = if non_interactive {
        MatrixConfig::default()
    } else {
        println!("\n{}", t!("init.wizard_welcome").cyan().bold());
        run_wizard(&theme)?
    };

    write_config(&output, &config)
}

fn run_wizard(theme: &ColorfulTheme) -> Result<MatrixConfig> {
    let mut config = MatrixConfig::default();

    let language = Select::with_theme(theme)
        .with_prompt(t!("init.language_prompt"))
        .items(&LANGUAGES)
        .default(0)
        .interact()
        .context(t!("init.confirmation_failed").to_string())?;
    config.language = Some(LANGUAGES[language].to_string());

    let source_dir: String = Input::with_theme(theme)
        .with_prompt(t!("init.source_dir_prompt"))
        .default(config.source_dir.display().to_string())
        .interact_text()?;
    config.source_dir = PathBuf::from(source_dir);

    let results_dir: String = Input::with_theme(theme)
        .with_prompt(t!("init.results_dir_prompt"))
        .default(config.results_dir.display().to_string())
        .interact_text()?;
    config.results_dir = PathBuf::from(results_dir);

    config.install_dir_name = Input::with_theme(theme)
        .with_prompt(t!("init.install_dir_prompt"))
        .default(config.install_dir_name.clone())
        .interact_text()?;

    let viewer: String = Input::with_theme(theme)
        .with_prompt(t!("init.viewer_prompt"))
        .default(config.viewer.clone().unwrap_or_default())
        .allow_empty(true)
        .interact_text()?;
    config.viewer = Some(viewer.trim().to_string()).filter(|viewer| !viewer.is_empty());

    Ok(config)
}

/// Serializes `config` below the comment header and writes it to `path`.
pub fn write_config(path: &Path, config: &MatrixConfig) -> Result<()> {
    let body = toml::to_string_pretty(config).context(t!("init.serialize_failed").to_string())?;

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            t!("init.create_parent_dir_failed", path = parent.display()).to_string()
        })?;
    }
    fs::write(path, format!("{HEADER}{body}"))
        .with_context(|| t!("init.write_failed", path = path.display()).to_string())?;

    println!(
        "\n{} {}",
        "✔".green(),
        t!("init.success", path = path.display()).bold()
    );
    println!("{}", t!("init.next_steps"));
    Ok(())
}
