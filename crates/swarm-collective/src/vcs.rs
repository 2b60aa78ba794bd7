//! Read-only version control queries used as work evidence.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use swarm_config::{VcsKind, WorkProofConfig};
use tokio::process::Command;
use tracing::debug;

use crate::types::{CollectiveError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffStats {
    pub insertions: u64,
    pub deletions: u64,
    pub files_changed: u64,
}

/// Version control collaborator.
///
/// Every method fails with [`CollectiveError::ExternalUnavailable`] when the
/// backend cannot answer; callers degrade instead of failing.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Commit ids created after `since`, newest first.
    async fn commits_since(&self, since: DateTime<Utc>) -> Result<Vec<String>>;

    /// Line statistics for `files` between `base_ref` and the working tree.
    async fn diff_stats(&self, files: &[String], base_ref: &str) -> Result<DiffStats>;

    /// Whether `commit` still resolves to a commit object.
    async fn commit_exists(&self, commit: &str) -> Result<bool>;
}

/// `git` on the command line.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo: PathBuf,
    timeout: Duration,
}

impl GitCli {
    pub fn new(repo: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            repo: repo.into(),
            timeout,
        }
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    async fn run(&self, args: &[&str]) -> Result<Output> {
        let mut command = Command::new("git");
        command
            .args(args)
            .current_dir(&self.repo)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Running git {:?} in {}", args, self.repo.display());
        match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(CollectiveError::ExternalUnavailable(format!(
                "failed to run git: {}",
                e
            ))),
            Err(_) => Err(CollectiveError::ExternalUnavailable(format!(
                "git timed out after {:?}",
                self.timeout
            ))),
        }
    }

    async fn run_checked(&self, args: &[&str]) -> Result<String> {
        let output = self.run(args).await?;
        if !output.status.success() {
            return Err(CollectiveError::ExternalUnavailable(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn commits_since(&self, since: DateTime<Utc>) -> Result<Vec<String>> {
        let since = format!("--since={}", since.to_rfc3339_opts(SecondsFormat::Secs, true));
        let stdout = self.run_checked(&["log", &since, "--format=%H"]).await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn diff_stats(&self, files: &[String], base_ref: &str) -> Result<DiffStats> {
        if files.is_empty() {
            return Ok(DiffStats::default());
        }
        let mut args = vec!["diff", "--numstat", base_ref, "--"];
        args.extend(files.iter().map(String::as_str));
        let stdout = self.run_checked(&args).await?;
        Ok(parse_numstat(&stdout))
    }

    async fn commit_exists(&self, commit: &str) -> Result<bool> {
        // anything else could be read by git as an option
        if !is_object_id(commit) {
            debug!("Not a commit id: {:?}", commit);
            return Ok(false);
        }
        let output = self.run(&["cat-file", "-t", commit]).await?;
        Ok(output.status.success() && String::from_utf8_lossy(&output.stdout).trim() == "commit")
    }
}

/// Abbreviated or full hex object id.
fn is_object_id(id: &str) -> bool {
    (4..=64).contains(&id.len()) && id.chars().all(|c| c.is_ascii_hexdigit())
}

/// No version control available; every query reports unavailability.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVcs;

#[async_trait]
impl VersionControl for NoVcs {
    async fn commits_since(&self, _since: DateTime<Utc>) -> Result<Vec<String>> {
        Err(unconfigured())
    }

    async fn diff_stats(&self, _files: &[String], _base_ref: &str) -> Result<DiffStats> {
        Err(unconfigured())
    }

    async fn commit_exists(&self, _commit: &str) -> Result<bool> {
        Err(unconfigured())
    }
}

fn unconfigured() -> CollectiveError {
    CollectiveError::ExternalUnavailable("no version control configured".to_string())
}

/// Build the collaborator named by the configuration.
pub fn from_config(config: &WorkProofConfig) -> Arc<dyn VersionControl> {
    match config.vcs {
        VcsKind::Git => Arc::new(GitCli::new(
            config.repo_path.clone(),
            Duration::from_secs(config.vcs_timeout_secs),
        )),
        VcsKind::None => Arc::new(NoVcs),
    }
}

/// Sum `git diff --numstat` output. Binary files (`-`) count as changed with
/// no line totals.
pub fn parse_numstat(output: &str) -> DiffStats {
    let mut stats = DiffStats::default();
    for line in output.lines() {
        let mut parts = line.split_whitespace();
        let (Some(insertions), Some(deletions), Some(_path)) = (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        stats.insertions += insertions.parse::<u64>().unwrap_or(0);
        stats.deletions += deletions.parse::<u64>().unwrap_or(0);
        stats.files_changed += 1;
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_numstat() {
        let stats = parse_numstat("3\t1\tsrc/lib.rs\n-\t-\tassets/logo.png\n\n10\t0\tREADME.md\n");
        assert_eq!(
            stats,
            DiffStats {
                insertions: 13,
                deletions: 1,
                files_changed: 3,
            }
        );
    }

    #[tokio::test]
    async fn test_no_vcs_is_unavailable() {
        let err = NoVcs.commits_since(Utc::now()).await.unwrap_err();
        assert_eq!(err.kind(), crate::types::ErrorKind::ExternalUnavailable);
    }

    #[tokio::test]
    async fn test_git_outside_repository_degrades() {
        let dir = tempdir().expect("tempdir");
        let git = GitCli::new(dir.path(), Duration::from_secs(5));
        // Either git is missing or the directory is not a repository.
        assert!(git.commits_since(Utc::now()).await.is_err());
        assert!(!git.commit_exists("deadbeef").await.unwrap_or(false));
    }

    #[tokio::test]
    async fn test_option_like_commit_ids_never_reach_git() {
        let dir = tempdir().expect("tempdir");
        // git cannot even start here, so only a short-circuit returns Ok
        let git = GitCli::new(dir.path().join("missing"), Duration::from_secs(5));
        for id in ["--help", "-p", "HEAD", "abc", "deadbeef --all", ""] {
            assert!(!git.commit_exists(id).await.unwrap(), "{}", id);
        }
        assert!(git.commit_exists("deadbeef").await.is_err());
    }
}
