//! # File System Unit Tests / 文件系统单元测试
//!
//! Tests mirroring the source tree into the staging directory and the other
//! file system helpers.
//!
//! 测试将源码树镜像到暂存目录以及其他文件系统辅助函数。

use ci_matrix::infra::fs::{copy_dir_contents, file_uri, mirror_tree, recreate_dir};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, path.display().to_string()).unwrap();
}

fn exclusions() -> Vec<String> {
    ["/.git", "target", "project/target", "ci"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[test]
fn test_mirror_applies_anchored_exclusions() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("src");
    touch(&src.join("build.sbt"));
    touch(&src.join(".git/HEAD"));
    touch(&src.join("target/a.class"));
    touch(&src.join("project/target/b.bin"));
    touch(&src.join("project/plugins.sbt"));
    touch(&src.join("core/target/kept.txt"));
    let dst = dir.path().join("dst");

    let stats = mirror_tree(&src, &dst, &exclusions()).unwrap();

    assert!(dst.join("build.sbt").is_file());
    assert!(dst.join("project/plugins.sbt").is_file());
    // Only the anchored `target` is excluded.
    assert!(dst.join("core/target/kept.txt").is_file());
    assert!(!dst.join(".git").exists());
    assert!(!dst.join("target").exists());
    assert!(!dst.join("project/target").exists());
    assert_eq!(stats.files, 3);
    assert_eq!(stats.excluded, 3);
}

#[test]
fn test_mirror_drops_files_removed_from_source() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("src");
    touch(&src.join("keep.txt"));
    touch(&src.join("gone.txt"));
    let dst = dir.path().join("dst");

    mirror_tree(&src, &dst, &[]).unwrap();
    fs::remove_file(src.join("gone.txt")).unwrap();
    mirror_tree(&src, &dst, &[]).unwrap();

    assert!(dst.join("keep.txt").is_file());
    assert!(!dst.join("gone.txt").exists());
}

#[test]
fn test_mirror_skips_destination_inside_source() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("repo");
    touch(&src.join("Main.scala"));
    let dst = src.join("staging");

    mirror_tree(&src, &dst, &[]).unwrap();

    assert!(dst.join("Main.scala").is_file());
    assert!(!dst.join("staging").exists());
}

#[test]
fn test_recreate_dir_empties_directory() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("results");
    touch(&target.join("old/report.html"));

    recreate_dir(&target).unwrap();

    assert!(target.is_dir());
    assert_eq!(fs::read_dir(&target).unwrap().count(), 0);
}

#[test]
fn test_copy_dir_contents_merges_into_destination() {
    let dir = tempdir().unwrap();
    let from = dir.path().join("from");
    touch(&from.join("test-reports-html/index.html"));
    touch(&from.join("test-reports/TEST-a.xml"));
    let to = dir.path().join("to");

    copy_dir_contents(&from, &to).unwrap();

    assert!(to.join("test-reports-html/index.html").is_file());
    assert!(to.join("test-reports/TEST-a.xml").is_file());
    assert!(!to.join("from").exists());
}

#[cfg(unix)]
#[test]
fn test_file_uri_escapes_reserved_bytes() {
    assert_eq!(
        file_uri(Path::new("/tmp/a b/#1/index.html")),
        "file:///tmp/a%20b/%231/index.html"
    );
}

#[cfg(unix)]
#[test]
fn test_mirror_recreates_linked_directories_as_links() {
    use std::os::unix::fs::symlink;

    let dir = tempdir().unwrap();
    let src = dir.path().join("src");
    touch(&src.join("shared/Lib.scala"));
    symlink("shared", src.join("linkdir")).unwrap();
    symlink("shared/Lib.scala", src.join("link.scala")).unwrap();
    let dst = dir.path().join("dst");

    let stats = mirror_tree(&src, &dst, &[]).unwrap();

    assert_eq!(stats.links, 2);
    assert_eq!(stats.files, 1);
    assert!(fs::symlink_metadata(dst.join("linkdir")).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_link(dst.join("linkdir")).unwrap(), Path::new("shared"));
    // Relative links still resolve inside the mirror.
    assert!(dst.join("linkdir/Lib.scala").is_file());
    assert!(dst.join("link.scala").is_file());
}

#[cfg(unix)]
#[test]
fn test_mirror_keeps_dangling_links() {
    use std::os::unix::fs::symlink;

    let dir = tempdir().unwrap();
    let src = dir.path().join("src");
    touch(&src.join("build.sbt"));
    symlink("does-not-exist", src.join("dangling")).unwrap();
    let dst = dir.path().join("dst");

    let stats = mirror_tree(&src, &dst, &[]).unwrap();

    assert_eq!(stats.links, 1);
    assert!(dst.join("build.sbt").is_file());
    assert_eq!(
        fs::read_link(dst.join("dangling")).unwrap(),
        Path::new("does-not-exist")
    );
}

#[cfg(unix)]
#[test]
fn test_mirror_does_not_follow_links_into_excluded_trees() {
    use std::os::unix::fs::symlink;

    let dir = tempdir().unwrap();
    let src = dir.path().join("src");
    touch(&src.join("target/huge.bin"));
    symlink("target", src.join("out")).unwrap();
    let dst = dir.path().join("dst");

    let stats = mirror_tree(&src, &dst, &exclusions()).unwrap();

    assert!(!dst.join("target").exists());
    assert_eq!(stats.files, 0);
    assert!(fs::symlink_metadata(dst.join("out")).unwrap().file_type().is_symlink());
}
