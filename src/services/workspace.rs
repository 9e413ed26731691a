//! Filesystem and git helpers for task workspaces.
//!
//! Workspaces are plain directories (see [`WorkspacePaths`]). These helpers
//! lay them out, snapshot the source repository into them, and move
//! `status.json` and patches in and out.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;
use walkdir::WalkDir;

use crate::domain::models::sandbox::BASELINE_TAG;
use crate::domain::models::{StatusFile, TaskConfig, WorkspacePaths};

/// Top-level directories never copied into a snapshot.
const SKIPPED_DIRS: &[&str] = &[".git", ".phylum"];

/// Copy `src` into `dest`, skipping VCS metadata and phylum state.
///
/// Blocking; call from `spawn_blocking` inside async code.
pub fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest).with_context(|| format!("creating {}", dest.display()))?;

    let walker = WalkDir::new(src).min_depth(1).follow_links(false).into_iter();
    for entry in walker.filter_entry(|e| {
        !(e.depth() == 1
            && e.file_type().is_dir()
            && SKIPPED_DIRS.iter().any(|skip| e.file_name() == *skip))
    }) {
        let entry = entry.with_context(|| format!("walking {}", src.display()))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("{} is outside {}", entry.path().display(), src.display()))?;
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&target)
                .with_context(|| format!("creating {}", target.display()))?;
        } else if file_type.is_symlink() {
            let link = std::fs::read_link(entry.path())
                .with_context(|| format!("reading link {}", entry.path().display()))?;
            std::os::unix::fs::symlink(&link, &target)
                .with_context(|| format!("linking {}", target.display()))?;
        } else {
            std::fs::copy(entry.path(), &target)
                .with_context(|| format!("copying {}", entry.path().display()))?;
        }
    }
    Ok(())
}

/// Copy a single repo-relative path (file or directory) between roots.
/// Missing sources are ignored.
fn copy_relative(from_root: &Path, to_root: &Path, relative: &str) -> Result<()> {
    let source = from_root.join(relative);
    let target = to_root.join(relative);
    if !source.exists() {
        return Ok(());
    }
    if source.is_dir() {
        copy_tree(&source, &target)
    } else {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        std::fs::copy(&source, &target)
            .with_context(|| format!("copying {}", source.display()))?;
        Ok(())
    }
}

fn remove_path(path: &Path) -> Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path)
            .with_context(|| format!("removing {}", path.display())),
        Ok(_) => std::fs::remove_file(path).with_context(|| format!("removing {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("inspecting {}", path.display())),
    }
}

/// Snapshot protected paths from `repo` into `pristine`.
pub fn snapshot_protected(repo: &Path, pristine: &Path, paths: &[String]) -> Result<()> {
    std::fs::create_dir_all(pristine)
        .with_context(|| format!("creating {}", pristine.display()))?;
    for relative in paths {
        copy_relative(repo, pristine, relative)?;
    }
    Ok(())
}

/// Overwrite protected paths in `target` with their pristine copies.
///
/// A path absent from the snapshot is removed from `target`, so an agent
/// cannot smuggle in a protected file that did not exist originally.
pub fn restore_protected(pristine: &Path, target: &Path, paths: &[String]) -> Result<()> {
    for relative in paths {
        remove_path(&target.join(relative))?;
        copy_relative(pristine, target, relative)?;
    }
    Ok(())
}

/// Run git in `dir` and return stdout.
///
/// Repository discovery stops at `dir` so a workspace nested inside another
/// checkout never touches the outer repository.
pub async fn git(dir: &Path, args: &[&str]) -> Result<String> {
    let ceiling = dir.parent().map(Path::to_path_buf).unwrap_or_default();
    let output = Command::new("git")
        .current_dir(dir)
        .args([
            "-c",
            "user.name=phylum",
            "-c",
            "user.email=phylum@localhost",
            "-c",
            "commit.gpgsign=false",
            "-c",
            "tag.gpgsign=false",
        ])
        .args(args)
        .env("GIT_CEILING_DIRECTORIES", ceiling)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .with_context(|| format!("failed to run git {}", args.join(" ")))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Err(anyhow!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        ))
    }
}

/// Initialise `repo` as a fresh repository with a tagged baseline commit.
pub async fn init_baseline(repo: &Path) -> Result<()> {
    git(repo, &["init", "-q"]).await?;
    git(repo, &["add", "-A"]).await?;
    git(repo, &["commit", "-q", "--allow-empty", "--no-verify", "-m", "phylum baseline"]).await?;
    git(repo, &["tag", "-f", BASELINE_TAG]).await?;
    debug!(repo = %repo.display(), "Baseline commit tagged");
    Ok(())
}

/// Diff every change made since the baseline, including untracked files.
pub async fn diff_since_baseline(repo: &Path) -> Result<String> {
    git(repo, &["add", "-A"]).await?;
    git(repo, &["diff", "--cached", "--binary", BASELINE_TAG]).await
}

/// Apply a patch file to `repo`. The target need not be a git repository.
pub async fn apply_patch(repo: &Path, patch_file: &Path) -> Result<()> {
    let patch = patch_file
        .canonicalize()
        .with_context(|| format!("resolving {}", patch_file.display()))?;
    let patch = patch.to_string_lossy();
    git(repo, &["apply", "--binary", "--whitespace=nowarn", patch.as_ref()]).await?;
    Ok(())
}

/// Whether `patch_file` is already applied to `repo`, i.e. it reverses cleanly.
pub async fn patch_applied(repo: &Path, patch_file: &Path) -> bool {
    let Ok(patch) = patch_file.canonicalize() else {
        return false;
    };
    let patch = patch.to_string_lossy();
    git(repo, &["apply", "--binary", "--reverse", "--check", patch.as_ref()])
        .await
        .is_ok()
}

/// Lay out a fresh workspace for a task.
///
/// Any previous contents of the workspace root are discarded. `task.json` is
/// only written when `config` is present.
pub async fn prepare(
    workspace: &WorkspacePaths,
    source_repo: &Path,
    config: Option<&TaskConfig>,
    protected_paths: &[String],
) -> Result<()> {
    let root = workspace.root.clone();
    let source = source_repo.to_path_buf();
    let protected = protected_paths.to_vec();
    let paths = workspace.clone();

    tokio::task::spawn_blocking(move || -> Result<()> {
        remove_path(&root)?;
        for dir in [paths.repo(), paths.results(), paths.transcript_dir()] {
            std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        copy_tree(&source, &paths.repo())?;
        snapshot_protected(&source, &paths.pristine(), &protected)
    })
    .await
    .context("workspace preparation task panicked")??;

    init_baseline(&workspace.repo()).await?;

    if let Some(config) = config {
        let json = serde_json::to_vec_pretty(config).context("serializing task.json")?;
        tokio::fs::write(workspace.task_config(), json)
            .await
            .context("writing task.json")?;
    }

    write_status(workspace, &StatusFile::pending()).await
}

/// Atomically replace `status.json`.
pub async fn write_status(workspace: &WorkspacePaths, status: &StatusFile) -> Result<()> {
    let path = workspace.status_file();
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_vec_pretty(status).context("serializing status.json")?;
    tokio::fs::write(&tmp, json)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    tokio::fs::rename(&tmp, &path)
        .await
        .with_context(|| format!("renaming {}", tmp.display()))?;
    Ok(())
}

/// Read `status.json`. Missing or unreadable files yield `None`.
pub async fn read_status(workspace: &WorkspacePaths) -> Option<StatusFile> {
    let bytes = tokio::fs::read(workspace.status_file()).await.ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Read a text artifact, treating a missing file as empty.
pub async fn read_optional(path: PathBuf) -> Result<String> {
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::AgentTaskStatus;
    use tempfile::TempDir;

    fn seed_repo(dir: &Path) {
        std::fs::create_dir_all(dir.join("src")).unwrap();
        std::fs::create_dir_all(dir.join("tests")).unwrap();
        std::fs::create_dir_all(dir.join(".git")).unwrap();
        std::fs::create_dir_all(dir.join(".phylum/workspaces")).unwrap();
        std::fs::write(dir.join("src/lib.rs"), "pub fn f() {}\n").unwrap();
        std::fs::write(dir.join("tests/check.sh"), "exit 0\n").unwrap();
        std::fs::write(dir.join(".git/HEAD"), "ref\n").unwrap();
    }

    #[test]
    fn test_copy_tree_skips_state_dirs() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        seed_repo(src.path());

        copy_tree(src.path(), dest.path()).unwrap();

        assert!(dest.path().join("src/lib.rs").is_file());
        assert!(dest.path().join("tests/check.sh").is_file());
        assert!(!dest.path().join(".git").exists());
        assert!(!dest.path().join(".phylum").exists());
    }

    #[test]
    fn test_restore_protected_discards_tampering() {
        let repo = TempDir::new().unwrap();
        let pristine = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        seed_repo(repo.path());
        let protected = vec!["tests".to_string(), "missing.txt".to_string()];

        snapshot_protected(repo.path(), pristine.path(), &protected).unwrap();
        copy_tree(repo.path(), target.path()).unwrap();
        std::fs::write(target.path().join("tests/check.sh"), "echo hacked\n").unwrap();
        std::fs::write(target.path().join("tests/extra.sh"), "exit 0\n").unwrap();
        std::fs::write(target.path().join("missing.txt"), "planted\n").unwrap();

        restore_protected(pristine.path(), target.path(), &protected).unwrap();

        assert_eq!(
            std::fs::read_to_string(target.path().join("tests/check.sh")).unwrap(),
            "exit 0\n"
        );
        assert!(!target.path().join("tests/extra.sh").exists());
        assert!(!target.path().join("missing.txt").exists());
    }

    #[tokio::test]
    async fn test_status_roundtrip() {
        let dir = TempDir::new().unwrap();
        let ws = WorkspacePaths::new(dir.path());
        assert!(read_status(&ws).await.is_none());

        write_status(&ws, &StatusFile::new(AgentTaskStatus::Running, "agent started"))
            .await
            .unwrap();
        let status = read_status(&ws).await.unwrap();
        assert_eq!(status.status, AgentTaskStatus::Running);
        assert!(!ws.results().join("status.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_diff_since_baseline_includes_new_files() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("repo");
        std::fs::create_dir_all(&repo).unwrap();
        std::fs::write(repo.join("a.txt"), "one\n").unwrap();

        init_baseline(&repo).await.unwrap();
        std::fs::write(repo.join("b.txt"), "two\n").unwrap();

        let patch = diff_since_baseline(&repo).await.unwrap();
        assert!(patch.contains("b.txt"));
        assert!(!patch.contains("a.txt"));

        let target = dir.path().join("target");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("a.txt"), "one\n").unwrap();
        let patch_file = dir.path().join("patch.diff");
        std::fs::write(&patch_file, patch).unwrap();
        apply_patch(&target, &patch_file).await.unwrap();
        assert_eq!(std::fs::read_to_string(target.join("b.txt")).unwrap(), "two\n");
    }
}
