//! # Execution Backend Unit Tests / 执行后端单元测试
//!
//! Tests the local backend against the real file system, the mapping of
//! matrix cells onto SSH hosts and the command lines the SSH backend builds.
//! No test needs a reachable host.
//!
//! 使用真实文件系统测试本地后端，测试矩阵单元到 SSH 主机的映射以及 SSH 后端
//! 构造的命令行。所有测试都不需要可访问的主机。

use ci_matrix::core::config::{HostEntry, MatrixConfig, PlatformKind};
use ci_matrix::core::driver::copy_command;
use ci_matrix::core::error::CiError;
use ci_matrix::core::models::TestConfig;
use ci_matrix::infra::backend::ssh::{
    pack_local_argv, pack_remote_argv, split_remote_dir, unpack_local_argv, unpack_remote_argv,
};
use ci_matrix::infra::backend::{
    BackendProvider, ExecutionBackend, LocalBackend, LocalProvider, RESULTS_SCRATCH_DIR,
    SshBackend, SshProvider, join_remote,
};
use ci_matrix::infra::command::RunOptions;
use std::fs;
use tempfile::tempdir;

fn cell(os: Option<&str>) -> TestConfig {
    TestConfig {
        isabelle: "2025".to_string(),
        java: 21,
        os: os.map(String::from),
    }
}

#[cfg(test)]
mod local_backend_tests {
    use super::*;

    #[tokio::test]
    async fn test_workspace_is_the_build_context() {
        let dir = tempdir().unwrap();
        let ci_dir = dir.path().join("ci");
        let mut provider = LocalProvider::new(&ci_dir);
        let mut backend = provider.open(&cell(None)).unwrap();

        let workdir = backend.prepare_workspace().await.unwrap();

        assert_eq!(workdir, ci_dir.to_string_lossy());
        assert!(ci_dir.is_dir());
        assert_eq!(backend.label(), "localhost");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_checked_and_unchecked_commands() {
        let dir = tempdir().unwrap();
        let mut backend = LocalBackend::new(dir.path());
        let cwd = dir.path().to_string_lossy().into_owned();
        let argv: Vec<String> = ["sh", "-c", "echo failing; exit 3"]
            .into_iter()
            .map(String::from)
            .collect();

        let outcome = backend
            .run_command(&argv, &cwd, RunOptions::checked().unchecked().quiet())
            .await
            .unwrap();
        assert_eq!(outcome.status.code(), Some(3));

        let err = backend
            .run_command(&argv, &cwd, RunOptions::checked().quiet())
            .await
            .unwrap_err();
        match err.downcast_ref::<CiError>() {
            Some(CiError::CommandFailed { output, .. }) => assert_eq!(output, "failing\n"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_push_and_pull_directories() {
        let dir = tempdir().unwrap();
        let staging = dir.path().join("staging");
        fs::create_dir_all(staging.join("src")).unwrap();
        fs::write(staging.join("src/Main.scala"), "object Main").unwrap();

        let workdir = dir.path().join("work");
        let mut backend = LocalBackend::new(&workdir);
        let workdir = backend.prepare_workspace().await.unwrap();
        let remote = join_remote(&workdir, "all-files");

        fs::create_dir_all(dir.path().join("work/all-files")).unwrap();
        fs::write(dir.path().join("work/all-files/stale.txt"), "old").unwrap();
        backend.push_dir(&staging, &remote).await.unwrap();
        assert!(dir.path().join("work/all-files/src/Main.scala").is_file());
        assert!(!dir.path().join("work/all-files/stale.txt").exists());

        let pulled = dir.path().join("pulled");
        backend.pull_dir(&remote, &pulled).await.unwrap();
        assert_eq!(
            fs::read_to_string(pulled.join("src/Main.scala")).unwrap(),
            "object Main"
        );
    }

    #[tokio::test]
    async fn test_file_transfers() {
        let dir = tempdir().unwrap();
        let mut backend = LocalBackend::new(dir.path());
        let dockerfile = dir.path().join("Dockerfile");
        fs::write(&dockerfile, "FROM scratch\n").unwrap();

        // Uploading a file onto itself is a no-op.
        backend
            .upload_file(&dockerfile, &dockerfile.to_string_lossy())
            .await
            .unwrap();
        let copy = dir.path().join("nested/Dockerfile");
        backend
            .upload_file(&dockerfile, &copy.to_string_lossy())
            .await
            .unwrap();
        assert_eq!(
            backend.read_to_string(&copy.to_string_lossy()).await.unwrap(),
            "FROM scratch\n"
        );

        let fresh = dir.path().join("nested");
        backend.make_fresh_dir(&fresh.to_string_lossy()).await.unwrap();
        assert_eq!(fs::read_dir(&fresh).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_scratch_dir_lives_outside_the_build_context() {
        let dir = tempdir().unwrap();
        let ci_dir = dir.path().join("ci");
        let mut backend = LocalBackend::new(&ci_dir);
        let workdir = backend.prepare_workspace().await.unwrap();

        let scratch = backend.scratch_dir(&workdir).await.unwrap();
        assert_eq!(backend.scratch_dir(&workdir).await.unwrap(), scratch);
        assert!(!scratch.starts_with(&*ci_dir.to_string_lossy()));
        assert_eq!(backend.command_path(&scratch).unwrap(), scratch);
        assert!(std::path::Path::new(&scratch).is_dir());

        backend.cleanup_workspace(&workdir).await.unwrap();
        assert!(!std::path::Path::new(&scratch).exists());
        assert!(ci_dir.is_dir());
    }
}

#[cfg(test)]
mod ssh_provider_tests {
    use super::*;

    #[test]
    fn test_cells_map_onto_configured_hosts() {
        let mut provider = SshProvider::new(&MatrixConfig::default());

        let linux = provider.open(&cell(Some("linux"))).unwrap();
        assert_eq!(linux.label(), "localhost");

        let windows = provider.open(&cell(Some("windows"))).unwrap();
        assert_eq!(windows.label(), "localhost:2222");
        assert_eq!(windows.target().user.as_deref(), Some("ci"));
    }

    #[test]
    fn test_unknown_os_is_a_configuration_error() {
        let mut provider = SshProvider::new(&MatrixConfig::default());
        let err = provider.open(&cell(Some("plan9"))).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CiError>(),
            Some(CiError::UnknownHost { os }) if os == "plan9"
        ));
    }

    #[test]
    fn test_join_remote() {
        assert_eq!(join_remote("/tmp/run", "all-files"), "/tmp/run/all-files");
        assert_eq!(join_remote("/tmp/run/", "all-files"), "/tmp/run/all-files");
        assert_eq!(join_remote(r"c:\work", "results"), r"c:\work\results");
    }
}

#[cfg(test)]
mod ssh_command_tests {
    use super::*;

    fn posix_host() -> HostEntry {
        HostEntry {
            hostname: "build.example.org".to_string(),
            port: 2200,
            user: Some("builder".to_string()),
            platform: PlatformKind::Posix,
            temp_dir: "/tmp".to_string(),
            posix_shell: None,
        }
    }

    fn windows_backend() -> SshBackend {
        let config = MatrixConfig::default();
        SshBackend::new(config.host_for("windows").unwrap(), "scala-isabelle-test", false)
    }

    #[test]
    fn test_posix_remote_command() {
        let backend = SshBackend::new(&posix_host(), "demo-test", false);
        let argv: Vec<String> = ["docker", "build", "."].into_iter().map(String::from).collect();

        let ssh = backend.remote_argv(&argv, "/tmp/demo-test-7", false).unwrap();

        assert_eq!(
            ssh,
            vec![
                "ssh",
                "-o",
                "BatchMode=yes",
                "-o",
                "User=builder",
                "-p",
                "2200",
                "-T",
                "build.example.org",
                "cd -- /tmp/demo-test-7 && docker build .",
            ]
        );
    }

    #[test]
    fn test_posix_scp_and_workspace() {
        let backend = SshBackend::new(&posix_host(), "demo-test", false);
        assert_eq!(backend.workspace_path(42), "/tmp/demo-test-42");
        let to = backend.scp_remote("/tmp/demo-test-42/Dockerfile").unwrap();
        assert_eq!(to, "build.example.org:/tmp/demo-test-42/Dockerfile");
        assert_eq!(
            backend.scp_argv("Dockerfile".to_string(), to),
            vec![
                "scp",
                "-o",
                "BatchMode=yes",
                "-o",
                "User=builder",
                "-q",
                "-P",
                "2200",
                "Dockerfile",
                "build.example.org:/tmp/demo-test-42/Dockerfile",
            ]
        );
    }

    #[test]
    fn test_no_user_option_without_user() {
        let host = HostEntry {
            user: None,
            port: 22,
            ..posix_host()
        };
        let backend = SshBackend::new(&host, "demo-test", false);
        let argv = backend.ssh_argv(&[]);
        assert_eq!(argv, vec!["ssh", "-o", "BatchMode=yes", "-p", "22", "build.example.org"]);
        assert!(backend.control_path().is_none());
    }

    #[test]
    fn test_windows_scp_uses_native_paths() {
        let backend = windows_backend();
        assert_eq!(
            backend.scp_remote("/c/Windows/Temp/run-1/all-files.tgz").unwrap(),
            r"localhost:c:\Windows\Temp\run-1\all-files.tgz"
        );
        assert!(backend.scp_remote("relative/path").is_err());
    }

    #[test]
    fn test_windows_report_copy_targets_a_native_directory() {
        let backend = windows_backend();
        let settings = MatrixConfig::default()
            .settings(tempdir().unwrap().path(), false)
            .unwrap();
        let workdir = backend.workspace_path(42);
        assert_eq!(workdir, "/c/Windows/Temp/scala-isabelle-test-42");

        let scratch = join_remote(&workdir, RESULTS_SCRATCH_DIR);
        let destination = backend.command_path(&scratch).unwrap();
        let copy = copy_command(&settings, "test-reports-html", &destination);
        let ssh = backend.remote_argv(&copy, &workdir, false).unwrap();

        assert_eq!(
            ssh.last().unwrap(),
            r"c: && cd c:\Windows\Temp\scala-isabelle-test-42 && docker cp temp_container:/home/user/scala-isabelle/target/test-reports-html c:\Windows\Temp\scala-isabelle-test-42\results"
        );
        assert!(!ssh.last().unwrap().contains("/c/Windows"));
        assert_eq!(&ssh[ssh.len() - 3..ssh.len() - 1], ["-T", "localhost"]);
        assert!(ssh.contains(&"User=ci".to_string()));
        assert!(ssh.contains(&"2222".to_string()));
    }

    #[test]
    fn test_windows_helpers_run_through_the_posix_shell() {
        let backend = windows_backend();
        let unpack = unpack_remote_argv("/c/Windows/Temp/run-1/all-files.tgz");
        let ssh = backend
            .remote_argv(&unpack, "/c/Windows/Temp/run-1/all-files", true)
            .unwrap();
        assert_eq!(
            ssh.last().unwrap(),
            r#"c:\tools\msys64\usr\bin\bash --login -c "cd -- /c/Windows/Temp/run-1/all-files && tar -x -z -f /c/Windows/Temp/run-1/all-files.tgz""#
        );
    }

    #[test]
    fn test_tarball_commands() {
        assert_eq!(
            pack_local_argv("/tmp/a.tgz", "/repo/ci/all-files"),
            vec!["tar", "-c", "-z", "-f", "/tmp/a.tgz", "-C", "/repo/ci/all-files", "."]
        );
        assert_eq!(
            unpack_remote_argv("/tmp/run/all-files.tgz"),
            vec!["tar", "-x", "-z", "-f", "/tmp/run/all-files.tgz"]
        );
        assert_eq!(
            pack_remote_argv("results.tgz", "results"),
            vec!["tar", "-c", "-z", "-f", "results.tgz", "results"]
        );
        assert_eq!(
            unpack_local_argv("/tmp/b.tgz"),
            vec!["tar", "-x", "-z", "--strip-components=1", "-f", "/tmp/b.tgz"]
        );
    }

    #[test]
    fn test_split_remote_dir() {
        assert_eq!(split_remote_dir("/tmp/run/results/").unwrap(), ("/tmp/run", "results"));
        assert!(split_remote_dir("/results").is_err());
        assert!(split_remote_dir("results").is_err());
    }

    #[tokio::test]
    async fn test_cleanup_of_an_unreachable_host_is_not_an_error() {
        let host = HostEntry {
            hostname: "127.0.0.1".to_string(),
            port: 1,
            user: None,
            ..posix_host()
        };
        let mut backend = SshBackend::new(&host, "demo-test", false);
        backend
            .cleanup_workspace("/tmp/demo-test-1")
            .await
            .unwrap();

        let mut kept = SshBackend::new(&host, "demo-test", true);
        kept.cleanup_workspace("/tmp/demo-test-1").await.unwrap();
    }
}
