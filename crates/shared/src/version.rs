//! Commit and update-check result types.
//!
//! These are what the update checker hands back to the window; the window
//! never touches git objects directly.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A commit as shown in the transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    /// Full 40-character hex id
    pub sha: String,
    /// First line of the commit message
    pub summary: String,
    /// Commit time
    pub timestamp: DateTime<Utc>,
}

impl CommitSummary {
    pub fn new(sha: impl Into<String>, summary: impl Into<String>, unix_seconds: i64) -> Self {
        Self {
            sha: sha.into(),
            summary: summary.into(),
            timestamp: Utc
                .timestamp_opt(unix_seconds, 0)
                .single()
                .unwrap_or_default(),
        }
    }

    /// First seven characters of the id
    pub fn short_sha(&self) -> &str {
        let end = self.sha.len().min(7);
        &self.sha[..end]
    }
}

/// Successful result of "Check for updates"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOutcome {
    /// Local HEAD already matches the remote default branch
    UpToDate { commit: CommitSummary },
    /// Remote changes were pulled; the app should restart
    Updated {
        from: CommitSummary,
        to: CommitSummary,
        branch: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_sha() {
        let c = CommitSummary::new("0123456789abcdef0123456789abcdef01234567", "init", 0);
        assert_eq!(c.short_sha(), "0123456");
    }

    #[test]
    fn test_short_sha_of_short_id() {
        let c = CommitSummary::new("abc", "init", 0);
        assert_eq!(c.short_sha(), "abc");
    }

    #[test]
    fn test_commit_time_from_unix_seconds() {
        let c = CommitSummary::new("abc", "init", 86_400);
        assert_eq!(c.timestamp.to_rfc3339(), "1970-01-02T00:00:00+00:00");
    }
}
