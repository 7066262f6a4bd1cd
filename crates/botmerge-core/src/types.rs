//! Common types shared across providers and the processing pipelines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Merge strategy/method selected per repository policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMethod {
    /// Create a merge commit
    Merge,
    /// Squash all commits into one
    Squash,
    /// Rebase commits onto the base branch
    Rebase,
}

impl std::fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Merge => write!(f, "merge"),
            Self::Squash => write!(f, "squash"),
            Self::Rebase => write!(f, "rebase"),
        }
    }
}

impl std::str::FromStr for MergeMethod {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merge" => Ok(Self::Merge),
            "squash" => Ok(Self::Squash),
            "rebase" => Ok(Self::Rebase),
            other => Err(crate::Error::Config(format!(
                "unknown merge method '{other}' (expected merge, squash, or rebase)"
            ))),
        }
    }
}

/// Pull request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    /// Open and eligible for merging
    Open,
    /// Closed without merging
    Closed,
    /// Already merged
    Merged,
}

impl std::fmt::Display for PrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Merged => write!(f, "merged"),
        }
    }
}

/// A repository as reported by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    /// Provider name ("github", "gitlab", "bitbucket")
    pub provider: String,
    /// Repository owner (user, organization, or namespace)
    pub owner: String,
    /// Repository name
    pub name: String,
    /// `owner/name`
    pub full_name: String,
    /// Default branch name
    pub default_branch: String,
}

impl Repository {
    /// Splits an `owner/name` string into its parts.
    pub fn split_full_name(full_name: &str) -> crate::Result<(&str, &str)> {
        full_name
            .split_once('/')
            .filter(|(owner, name)| !owner.is_empty() && !name.is_empty())
            .ok_or_else(|| {
                crate::Error::Config(format!(
                    "invalid repository name '{full_name}' (expected owner/name)"
                ))
            })
    }
}

/// An immutable pull request snapshot, fetched fresh on every discovery run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    /// Author login
    pub author: String,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Head branch name
    pub head_ref: String,
    /// Head commit SHA
    pub head_sha: String,
    /// Base branch name
    pub base_ref: String,
    pub state: PrState,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub locked: bool,
    /// Tri-state mergeability: `None` while the provider is still computing it
    #[serde(default)]
    pub mergeable: Option<bool>,
    /// Number of approving reviews
    #[serde(default)]
    pub approvals: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub html_url: String,
}

impl PullRequest {
    /// Age of the pull request relative to `now`, measured from creation.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}

/// Filter for listing pull requests.
#[derive(Debug, Clone, Default)]
pub struct PrFilter {
    /// Provider-native state filter; `None` lists all states
    pub state: Option<String>,
    /// Only return PRs updated at or after this instant
    pub since: Option<DateTime<Utc>>,
}

impl PrFilter {
    /// Filter for open pull requests only.
    pub fn open() -> Self {
        Self {
            state: Some("open".to_string()),
            since: None,
        }
    }
}

/// Aggregate commit status for a pull request head.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrStatus {
    /// Provider-reported aggregate state (e.g. "success", "pending", "failure")
    pub state: String,
    /// True when the aggregate state counts as successful
    pub all_success: bool,
}

/// One CI check attached to a pull request head.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Check {
    pub name: String,
    /// The check finished running (regardless of outcome)
    pub completed: bool,
    /// The check finished with a failing conclusion
    pub failed: bool,
}

/// Commit title and body generated for a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMessage {
    pub title: String,
    pub body: String,
}

/// Provider rate-limit snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimit {
    pub limit: u64,
    pub remaining: u64,
    #[serde(default)]
    pub reset_at: Option<DateTime<Utc>>,
}

/// The readiness verdict for one pull request at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedPr {
    pub pull_request: PullRequest,
    /// Satisfies every configured condition for automatic merging
    pub ready: bool,
    /// Excluded by policy (author, label, age) before readiness evaluation
    pub skipped: bool,
    pub reason: String,
    /// Aggregate status snapshot, when one was fetched
    #[serde(default)]
    pub status: Option<PrStatus>,
    /// Individual checks, when they were fetched
    #[serde(default)]
    pub checks: Vec<Check>,
    /// Transient per-PR failure (status/check fetch), recorded instead of
    /// dropping the PR from the result set
    #[serde(default)]
    pub error: Option<String>,
}

impl ProcessedPr {
    /// A PR that passed every filter and readiness condition.
    pub fn ready(pull_request: PullRequest, status: Option<PrStatus>, checks: Vec<Check>) -> Self {
        Self {
            pull_request,
            ready: true,
            skipped: false,
            reason: "ready to merge".to_string(),
            status,
            checks,
            error: None,
        }
    }

    /// A PR excluded by policy before readiness evaluation.
    pub fn skipped(pull_request: PullRequest, reason: impl Into<String>) -> Self {
        Self {
            pull_request,
            ready: false,
            skipped: true,
            reason: reason.into(),
            status: None,
            checks: Vec::new(),
            error: None,
        }
    }

    /// A PR that failed a readiness condition.
    pub fn not_ready(
        pull_request: PullRequest,
        reason: impl Into<String>,
        status: Option<PrStatus>,
        checks: Vec<Check>,
    ) -> Self {
        Self {
            pull_request,
            ready: false,
            skipped: false,
            reason: reason.into(),
            status,
            checks,
            error: None,
        }
    }

    /// A PR whose status lookup failed; the error is recorded and the batch
    /// continues.
    pub fn errored(pull_request: PullRequest, error: impl std::fmt::Display) -> Self {
        Self {
            pull_request,
            ready: false,
            skipped: false,
            reason: "status lookup failed".to_string(),
            status: None,
            checks: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Discovery outcome for one (provider, repository) pair.
///
/// A non-`None` `error` means discovery failed for the whole repository and
/// `pull_requests` is empty; downstream stages skip the repository without
/// aborting the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResult {
    pub provider: String,
    /// `owner/name`
    pub repository: String,
    #[serde(default)]
    pub pull_requests: Vec<ProcessedPr>,
    /// Repository-level discovery failure
    #[serde(default)]
    pub error: Option<String>,
}

impl ProcessResult {
    /// A repository whose discovery failed outright.
    pub fn failed(
        provider: impl Into<String>,
        repository: impl Into<String>,
        error: impl std::fmt::Display,
    ) -> Self {
        Self {
            provider: provider.into(),
            repository: repository.into(),
            pull_requests: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Outcome of one merge submission.
///
/// `skipped` and `success` are mutually exclusive; `error` is only set when
/// neither holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeResult {
    pub provider: String,
    /// `owner/name`
    pub repository: String,
    pub number: u64,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub merge_method: Option<MergeMethod>,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub commit_sha: Option<String>,
    pub success: bool,
    pub skipped: bool,
    pub reason: String,
    #[serde(default)]
    pub error: Option<String>,
}
