//! # Single-Run Driver / 单次运行驱动
//!
//! Runs one matrix cell from start to finish: stage the sources, build the
//! image, extract the reports through a disposable container, then
//! post-process the HTML report and read the return code.
//!
//! Every step is a hard sequence point: the first failing step aborts the
//! cell with the backend's error. The workspace and the backend session are
//! released on every path.
//!
//! 从头到尾运行一个矩阵单元：暂存源码、构建镜像、通过一次性容器提取报告，
//! 然后对 HTML 报告进行后处理并读取返回码。每一步都是硬性顺序点：
//! 第一个失败的步骤会以后端的错误中止该单元。工作区和后端会话在任何路径上都会被释放。

use anyhow::{Context, Result, bail};
use chrono::Local;
use colored::*;
use std::path::Path;
use std::process::Stdio;
use tracing::{debug, warn};

use crate::core::config::RunSettings;
use crate::core::models::{RunContext, TestConfig, TestResult};
use crate::infra::backend::{BackendProvider, ExecutionBackend, join_remote};
use crate::infra::command::RunOptions;
use crate::infra::fs::{mirror_tree, recreate_dir};
use crate::infra::t;
use crate::reporting::html::{
    HTML_REPORT_DIR, REPORT_INDEX, RETURN_CODE_FILE, TIMESTAMP_FORMAT, XML_REPORT_DIR,
    read_return_code, rewrite_report_title,
};

/// File `docker build --iidfile` writes the image id to.
pub const IMAGE_ID_FILE: &str = ".image";

/// Runs a single matrix cell on the backend the provider opens for it.
///
/// # Arguments
/// * `config` - The fully resolved cell
/// * `settings` - Paths and names shared by every cell of the run
/// * `provider` - Opens the backend the cell runs on
///
/// # Returns
/// The cell's [`TestResult`]; `success` is `true` iff the report's return
/// code is 0. Any failing step is returned as an error.
pub async fn run_single<P: BackendProvider>(
    config: &TestConfig,
    settings: &RunSettings,
    provider: &mut P,
) -> Result<TestResult> {
    println!(
        "{}",
        t!("driver.testing_config", desc = config.description()).cyan().bold()
    );

    let mut backend = provider.open(config)?;
    backend.connect().await?;
    let mut ctx = RunContext::new(config.clone(), backend);

    let outcome = run_steps(&mut ctx, settings).await;
    release(&mut ctx).await;
    let result = outcome?;

    if settings.show_results {
        if let Some(viewer) = &settings.viewer {
            let report = result.results_dir.join(HTML_REPORT_DIR).join(REPORT_INDEX);
            if let Err(e) = launch_viewer(viewer, &report) {
                println!("{}", t!("driver.viewer_failed", error = format!("{e:#}")).yellow());
            }
        }
    }
    Ok(result)
}

async fn run_steps<B: ExecutionBackend>(
    ctx: &mut RunContext<B>,
    settings: &RunSettings,
) -> Result<TestResult> {
    let config = ctx.config.clone();

    // 1. Stage the sources.
    println!("{}", t!("driver.staging").blue());
    let stats = mirror_tree(
        &settings.source_dir,
        &settings.staging_dir,
        &settings.staging_exclusions(),
    )?;
    debug!(files = stats.files, dirs = stats.dirs, excluded = stats.excluded, "staged source tree");

    let workdir = ctx.backend.prepare_workspace().await?;
    ctx.workdir = Some(workdir.clone());
    ctx.backend
        .push_dir(
            &settings.staging_dir,
            &join_remote(&workdir, &settings.staging_dir_name()),
        )
        .await?;
    ctx.backend
        .upload_file(&settings.dockerfile, &join_remote(&workdir, "Dockerfile"))
        .await?;

    if let Some(image) = &settings.base_image {
        cache_base_image(&mut ctx.backend, image, &workdir).await?;
    }

    // 2. Build the image.
    println!("{}", t!("driver.building_image", backend = ctx.backend.label()).blue());
    ctx.backend
        .run_command(&build_command(&config), &workdir, RunOptions::checked())
        .await?;
    let image_id = ctx
        .backend
        .read_to_string(&join_remote(&workdir, IMAGE_ID_FILE))
        .await?
        .trim()
        .to_string();
    if image_id.is_empty() {
        bail!("`docker build` left an empty {IMAGE_ID_FILE} file");
    }
    debug!(%image_id, "image built");

    // 3. Remove a stale container; it usually does not exist.
    let container = settings.container_name.as_str();
    ctx.backend
        .run_command(
            &argv(&["docker", "rm", container]),
            &workdir,
            RunOptions::checked().unchecked().quiet(),
        )
        .await?;

    // 4. Create the disposable container.
    println!("{}", t!("driver.creating_container", name = container).blue());
    ctx.backend
        .run_command(
            &argv(&["docker", "create", "--name", container, &image_id]),
            &workdir,
            RunOptions::checked(),
        )
        .await?;

    // 5. Extract the reports into a cleared results directory.
    println!("{}", t!("driver.copying_reports").blue());
    let results_dir = settings.results_root.join(config.dirname());
    recreate_dir(&results_dir)?;
    let scratch = ctx.backend.scratch_dir(&workdir).await?;
    ctx.backend.make_fresh_dir(&scratch).await?;
    let destination = ctx.backend.command_path(&scratch)?;
    for artifact in [HTML_REPORT_DIR, XML_REPORT_DIR] {
        ctx.backend
            .run_command(
                &copy_command(settings, artifact, &destination),
                &workdir,
                RunOptions::checked(),
            )
            .await?;
    }

    // 6. The container must not leak.
    println!("{}", t!("driver.removing_container", name = container).blue());
    ctx.backend
        .run_command(
            &argv(&["docker", "rm", container]),
            &workdir,
            RunOptions::checked(),
        )
        .await?;

    ctx.backend.pull_dir(&scratch, &results_dir).await?;

    // 7. Title.
    let html_dir = results_dir.join(HTML_REPORT_DIR);
    let title = format!(
        "{} @ {}",
        config.description(),
        Local::now().format(TIMESTAMP_FORMAT)
    );
    if !rewrite_report_title(&html_dir.join(REPORT_INDEX), &settings.placeholder_title, &title)? {
        warn!(placeholder = %settings.placeholder_title, "report title placeholder not found");
    }

    // 8. Return code.
    let code = read_return_code(&html_dir.join(RETURN_CODE_FILE))?;
    let success = code == 0;
    let message = t!("driver.return_code", code = code, desc = config.description());
    if success {
        println!("{}", message.green());
    } else {
        println!("{}", message.red());
    }

    Ok(TestResult {
        success,
        results_dir,
    })
}

/// Removes the workspace and closes the session. Failures are only logged.
async fn release<B: ExecutionBackend>(ctx: &mut RunContext<B>) {
    if let Some(workdir) = ctx.workdir.take() {
        if let Err(e) = ctx.backend.cleanup_workspace(&workdir).await {
            warn!(%workdir, error = %format!("{e:#}"), "failed to clean up the working directory");
        }
    }
    if let Err(e) = ctx.backend.disconnect().await {
        warn!(backend = %ctx.backend.label(), error = %format!("{e:#}"), "failed to close the session");
    }
}

/// The `docker build` invocation of a cell.
pub fn build_command(config: &TestConfig) -> Vec<String> {
    let mut command = argv(&["docker", "build", "--pull=false", "--iidfile", IMAGE_ID_FILE, "."]);
    for (key, value) in [
        ("ISABELLE_VERSION", config.isabelle.clone()),
        ("JAVA_VERSION", config.java.to_string()),
    ] {
        command.push("--build-arg".to_string());
        command.push(format!("{key}={value}"));
    }
    command
}

/// The `docker cp` invocation that copies one report directory out of the
/// container. `destination` must already be in the backend's native form.
pub fn copy_command(settings: &RunSettings, artifact: &str, destination: &str) -> Vec<String> {
    argv(&[
        "docker",
        "cp",
        &settings.container_artifact(artifact),
        destination,
    ])
}

/// Returns `(image, cached)` for a base image: an untagged name gets
/// `:latest`, and the cached name appends `-cached` to the tag.
///
/// 返回基础镜像的 `(image, cached)`：无标签的名称会补上 `:latest`，
/// 缓存名称在标签后追加 `-cached`。
pub fn cached_image_names(image: &str) -> (String, String) {
    let name = image.rsplit('/').next().unwrap_or(image);
    let image = if name.contains(':') {
        image.to_string()
    } else {
        format!("{image}:latest")
    };
    let cached = format!("{image}-cached");
    (image, cached)
}

/// Pins the base image as `<image>-cached` so later builds do not pull
/// updates. Does nothing if the cached tag already exists.
async fn cache_base_image<B: ExecutionBackend>(
    backend: &mut B,
    image: &str,
    workdir: &str,
) -> Result<()> {
    let (image, cached) = cached_image_names(image);
    let inspect = backend
        .run_command(
            &argv(&["docker", "image", "inspect", &cached]),
            workdir,
            RunOptions::checked().unchecked().quiet(),
        )
        .await?;
    if inspect.success() {
        debug!(%cached, "base image already cached");
        return Ok(());
    }

    println!("{}", t!("driver.caching_image", image = &image, cached = &cached).blue());
    for command in [
        argv(&["docker", "pull", &image]),
        argv(&["docker", "tag", &image, &cached]),
        argv(&["docker", "rmi", "--no-prune", &image]),
    ] {
        backend
            .run_command(&command, workdir, RunOptions::checked())
            .await?;
    }
    Ok(())
}

/// Starts the viewer on `report` and returns without waiting for it.
fn launch_viewer(viewer: &str, report: &Path) -> Result<()> {
    let expanded = shellexpand::full(viewer)
        .with_context(|| format!("Failed to expand command: {viewer}"))?
        .to_string();
    let parts = shlex::split(&expanded)
        .ok_or_else(|| anyhow::anyhow!("Failed to parse command: {}", expanded))?;
    let Some((program, args)) = parts.split_first() else {
        bail!("Empty viewer command.");
    };

    debug!(%program, report = %report.display(), "launching viewer");
    tokio::process::Command::new(program)
        .args(args)
        .arg(report)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("Failed to start viewer `{program}`"))?;
    Ok(())
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_command_binds_both_versions() {
        let config = TestConfig {
            isabelle: "2021-1".to_string(),
            java: 11,
            os: None,
        };
        assert_eq!(
            build_command(&config).join(" "),
            "docker build --pull=false --iidfile .image . \
             --build-arg ISABELLE_VERSION=2021-1 --build-arg JAVA_VERSION=11"
        );
    }

    #[test]
    fn cached_names_default_to_latest() {
        assert_eq!(
            cached_image_names("archlinux"),
            ("archlinux:latest".to_string(), "archlinux:latest-cached".to_string())
        );
        assert_eq!(
            cached_image_names("registry:5000/arch"),
            (
                "registry:5000/arch:latest".to_string(),
                "registry:5000/arch:latest-cached".to_string()
            )
        );
        assert_eq!(cached_image_names("debian:12").1, "debian:12-cached");
    }
}
