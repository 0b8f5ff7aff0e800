//! "Check for updates" against a git remote using git2-rs.
//!
//! The application's own checkout lives in a local working copy. Checking for
//! updates opens (or clones) that copy, fetches `origin`, compares the local
//! HEAD with the remote default branch and fast-forwards when they differ.
//!
//! ## Default branch resolution
//! `origin/main` is preferred; `origin/master` is the fallback. Anything else
//! is reported as an error rather than guessed.

use git2::{build::CheckoutBuilder, Commit, ErrorClass, ErrorCode, Oid, Repository};
use shared::events::Dialog;
use shared::version::{CommitSummary, UpdateOutcome};
use std::path::PathBuf;
use tracing::{info, warn};

const DEFAULT_BRANCHES: [&str; 2] = ["main", "master"];

/// Why a single update check failed. Every variant is terminal for that check.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("{0}")]
    Clone(String),
    #[error("{0}")]
    Fetch(String),
    #[error("no 'main' or 'master' branch on remote")]
    NoDefaultBranch,
    #[error("HEAD is detached; check out a branch before updating")]
    DetachedHead,
    #[error("{0}")]
    Pull(String),
    #[error("{0}")]
    Git(String),
    #[error("{0}")]
    Unexpected(String),
}

impl From<git2::Error> for UpdateError {
    fn from(e: git2::Error) -> Self {
        UpdateError::Git(e.message().to_string())
    }
}

impl UpdateError {
    /// Line appended to the chat transcript
    pub fn log_line(&self) -> String {
        match self {
            UpdateError::Clone(e) => format!("Git clone error: {}", e),
            UpdateError::Fetch(e) => format!("Git fetch error: {}", e),
            UpdateError::NoDefaultBranch => {
                "Error: Could not find 'main' or 'master' branch on remote.".to_string()
            }
            UpdateError::DetachedHead | UpdateError::Pull(_) => {
                format!("Git pull error: {}", self)
            }
            UpdateError::Git(e) => format!("A Git command failed: {}", e),
            UpdateError::Unexpected(e) => {
                format!("An unexpected error occurred during update: {}", e)
            }
        }
    }

    /// Modal error dialog
    pub fn dialog(&self) -> Dialog {
        let body = match self {
            UpdateError::Clone(e) => format!("Failed to clone repository: {}", e),
            UpdateError::Fetch(e) => format!("Failed to fetch updates: {}", e),
            UpdateError::NoDefaultBranch => {
                "Could not determine the default branch (main/master) on the remote repository."
                    .to_string()
            }
            UpdateError::DetachedHead | UpdateError::Pull(_) => {
                format!("Failed to pull updates: {}", self)
            }
            UpdateError::Git(e) => format!("An error occurred during Git operation: {}", e),
            UpdateError::Unexpected(e) => format!("An unexpected error occurred: {}", e),
        };
        Dialog::critical("Update Error", body)
    }
}

pub struct UpdateChecker {
    repo_url: String,
    local_path: PathBuf,
}

impl UpdateChecker {
    pub fn new(repo_url: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_url: repo_url.into(),
            local_path: local_path.into(),
        }
    }

    /// Run one update check. `progress` receives each transcript line as it happens.
    pub fn check(&self, mut progress: impl FnMut(String)) -> Result<UpdateOutcome, UpdateError> {
        let repo = self.open_or_clone(&mut progress)?;

        progress("Fetching latest changes from remote (origin)...".to_string());
        fetch_origin(&repo)?;

        let local = repo.head()?.peel_to_commit()?;
        let (branch, remote) = resolve_default_branch(&repo)?;

        progress(format!("Local commit: {}", local.id()));
        progress(format!("Remote commit: {}", remote.id()));

        if local.id() == remote.id() {
            info!(commit = %local.id(), "checkout is up to date");
            return Ok(UpdateOutcome::UpToDate {
                commit: summarize(&local),
            });
        }

        progress("Update available. Pulling changes...".to_string());
        match fast_forward(&repo, remote.id())? {
            Pulled::AlreadyContains => {
                info!(local = %local.id(), remote = %remote.id(), "local checkout is ahead of remote");
                Ok(UpdateOutcome::UpToDate {
                    commit: summarize(&local),
                })
            }
            Pulled::FastForwarded => {
                progress("Update downloaded successfully.".to_string());
                info!(from = %local.id(), to = %remote.id(), branch, "fast-forwarded checkout");
                Ok(UpdateOutcome::Updated {
                    from: summarize(&local),
                    to: summarize(&remote),
                    branch: branch.to_string(),
                })
            }
        }
    }

    fn open_or_clone(&self, progress: &mut impl FnMut(String)) -> Result<Repository, UpdateError> {
        let path = &self.local_path;
        if path.exists() {
            progress(format!(
                "Local repository found at {}. Opening...",
                path.display()
            ));
            match Repository::open(path) {
                Ok(repo) => return Ok(repo),
                Err(e) if is_not_a_repository(&e) => {
                    warn!(path = %path.display(), error = %e.message(), "invalid repository, re-cloning");
                    progress(format!(
                        "Invalid Git repository at {}. Removing and re-cloning.",
                        path.display()
                    ));
                    if path.is_dir() {
                        std::fs::remove_dir_all(path)
                            .map_err(|e| UpdateError::Unexpected(e.to_string()))?;
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        progress(format!(
            "Cloning repository from {} into {}...",
            self.repo_url,
            path.display()
        ));
        let repo = Repository::clone(&self.repo_url, path)
            .map_err(|e| UpdateError::Clone(e.message().to_string()))?;
        progress("Repository cloned successfully.".to_string());
        Ok(repo)
    }
}

fn is_not_a_repository(e: &git2::Error) -> bool {
    e.code() == ErrorCode::NotFound || e.class() == ErrorClass::Repository
}

fn fetch_origin(repo: &Repository) -> Result<(), UpdateError> {
    let mut origin = repo
        .find_remote("origin")
        .map_err(|e| UpdateError::Fetch(e.message().to_string()))?;
    origin
        .fetch(&[] as &[&str], None, None)
        .map_err(|e| UpdateError::Fetch(e.message().to_string()))
}

fn resolve_default_branch(repo: &Repository) -> Result<(&'static str, Commit<'_>), UpdateError> {
    for branch in DEFAULT_BRANCHES {
        let name = format!("refs/remotes/origin/{}", branch);
        if let Ok(reference) = repo.find_reference(&name) {
            return Ok((branch, reference.peel_to_commit()?));
        }
    }
    Err(UpdateError::NoDefaultBranch)
}

enum Pulled {
    /// Remote commit is already an ancestor of HEAD
    AlreadyContains,
    FastForwarded,
}

fn fast_forward(repo: &Repository, target: Oid) -> Result<Pulled, UpdateError> {
    if repo.head_detached()? {
        return Err(UpdateError::DetachedHead);
    }

    let annotated = repo.find_annotated_commit(target)?;
    let (analysis, _) = repo.merge_analysis(&[&annotated])?;

    if analysis.is_up_to_date() {
        return Ok(Pulled::AlreadyContains);
    }
    if !analysis.is_fast_forward() {
        return Err(UpdateError::Pull(
            "local changes have diverged from the remote; cannot fast-forward".to_string(),
        ));
    }

    let head = repo.head()?;
    let Some(refname) = head.name().map(str::to_string) else {
        return Err(UpdateError::Pull("current branch name is not valid UTF-8".to_string()));
    };
    let mut reference = repo.find_reference(&refname)?;
    reference
        .set_target(target, "update: fast-forward")
        .map_err(|e| UpdateError::Pull(e.message().to_string()))?;
    repo.set_head(&refname)?;
    repo.checkout_head(Some(CheckoutBuilder::default().force()))
        .map_err(|e| UpdateError::Pull(e.message().to_string()))?;
    Ok(Pulled::FastForwarded)
}

fn summarize(commit: &Commit) -> CommitSummary {
    CommitSummary::new(
        commit.id().to_string(),
        commit.summary().unwrap_or(""),
        commit.time().seconds(),
    )
}
