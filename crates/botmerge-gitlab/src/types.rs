//! GitLab API response types.
//!
//! Raw JSON shapes from the GitLab REST API v4, mapped onto the unified core
//! types. GitLab calls pull requests "merge requests" and repositories
//! "projects"; the mapping normalizes the vocabulary.

use botmerge_core::types::{Check, PrState, PullRequest, Repository};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// GitLab user representation.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabUser {
    pub username: String,
}

/// GitLab project representation.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabProject {
    pub path: String,
    pub path_with_namespace: String,
    pub default_branch: Option<String>,
}

impl GitLabProject {
    pub fn into_repository(self) -> Repository {
        let owner = self
            .path_with_namespace
            .rsplit_once('/')
            .map(|(ns, _)| ns.to_string())
            .unwrap_or_default();
        Repository {
            provider: "gitlab".to_string(),
            owner,
            name: self.path,
            full_name: self.path_with_namespace,
            default_branch: self.default_branch.unwrap_or_else(|| "main".to_string()),
        }
    }
}

/// GitLab merge request representation.
///
/// `merge_status` is only reliable on the single-MR endpoint; the client
/// re-fetches each listed MR individually.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabMergeRequest {
    pub iid: u64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub state: String,
    pub web_url: String,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub discussion_locked: Option<bool>,
    #[serde(default)]
    pub merge_status: Option<String>,
    #[serde(default)]
    pub author: Option<GitLabUser>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub source_branch: String,
    pub target_branch: String,
    #[serde(default)]
    pub sha: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GitLabMergeRequest {
    pub fn into_pull_request(self, approvals: u32) -> PullRequest {
        let state = match self.state.as_str() {
            "opened" => PrState::Open,
            "merged" => PrState::Merged,
            _ => PrState::Closed,
        };
        // "can_be_merged" / "cannot_be_merged" are definitive; everything
        // else ("checking", "unchecked") stays unknown.
        let mergeable = match self.merge_status.as_deref() {
            Some("can_be_merged") => Some(true),
            Some("cannot_be_merged") => Some(false),
            _ => None,
        };
        PullRequest {
            number: self.iid,
            title: self.title,
            body: self.description,
            author: self.author.map(|u| u.username).unwrap_or_default(),
            labels: self.labels,
            head_ref: self.source_branch,
            head_sha: self.sha.unwrap_or_default(),
            base_ref: self.target_branch,
            state,
            draft: self.draft,
            locked: self.discussion_locked.unwrap_or(false),
            mergeable,
            approvals,
            created_at: self.created_at,
            updated_at: self.updated_at,
            html_url: self.web_url,
        }
    }
}

/// Approval state of a merge request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitLabApprovals {
    #[serde(default)]
    pub approved_by: Vec<GitLabApprover>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitLabApprover {
    pub user: GitLabUser,
}

/// One commit status entry.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabCommitStatus {
    pub name: String,
    pub status: String,
}

impl GitLabCommitStatus {
    pub fn into_check(self) -> Check {
        let completed = matches!(
            self.status.as_str(),
            "success" | "failed" | "canceled" | "skipped"
        );
        let failed = matches!(self.status.as_str(), "failed" | "canceled");
        Check {
            name: self.name,
            completed,
            failed,
        }
    }
}

/// Aggregates commit statuses into a single state string.
///
/// Failure dominates, then anything still running, then success; an empty
/// list counts as success (no CI configured is not a blocker).
pub fn aggregate_status(statuses: &[GitLabCommitStatus]) -> (String, bool) {
    if statuses.is_empty() {
        return ("success".to_string(), true);
    }
    if statuses
        .iter()
        .any(|s| matches!(s.status.as_str(), "failed" | "canceled"))
    {
        return ("failed".to_string(), false);
    }
    if statuses.iter().any(|s| {
        matches!(
            s.status.as_str(),
            "pending" | "running" | "created" | "waiting_for_resource" | "manual"
        )
    }) {
        return ("running".to_string(), false);
    }
    ("success".to_string(), true)
}

/// Response of the merge endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabMergeResponse {
    pub state: String,
    #[serde(default)]
    pub merge_commit_sha: Option<String>,
    #[serde(default)]
    pub squash_commit_sha: Option<String>,
}
