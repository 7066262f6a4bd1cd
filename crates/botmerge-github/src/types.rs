//! GitHub API response types.
//!
//! These types represent the raw JSON responses from the GitHub API.
//! They are deserialized and then mapped to the unified core types.

use botmerge_core::types::{Check, PrState, PullRequest, Repository};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// GitHub user representation.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubUser {
    pub login: String,
}

/// GitHub label representation.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubLabel {
    pub name: String,
}

/// GitHub repository representation.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRepo {
    pub name: String,
    pub full_name: String,
    pub owner: GitHubUser,
    pub default_branch: String,
}

impl GitHubRepo {
    pub fn into_repository(self) -> Repository {
        Repository {
            provider: "github".to_string(),
            owner: self.owner.login,
            name: self.name,
            full_name: self.full_name,
            default_branch: self.default_branch,
        }
    }
}

/// One end of a pull request (head or base).
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubBranchRef {
    #[serde(rename = "ref")]
    pub branch: String,
    pub sha: String,
}

/// GitHub pull request representation.
///
/// `mergeable` is only populated on the single-PR endpoint, which is why the
/// client re-fetches each listed PR individually.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubPullRequest {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    pub html_url: String,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub mergeable: Option<bool>,
    #[serde(default)]
    pub user: Option<GitHubUser>,
    #[serde(default)]
    pub labels: Vec<GitHubLabel>,
    pub head: GitHubBranchRef,
    pub base: GitHubBranchRef,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GitHubPullRequest {
    pub fn into_pull_request(self, approvals: u32) -> PullRequest {
        let state = match self.state.as_str() {
            "open" => PrState::Open,
            _ if self.merged_at.is_some() => PrState::Merged,
            _ => PrState::Closed,
        };
        PullRequest {
            number: self.number,
            title: self.title,
            body: self.body,
            author: self.user.map(|u| u.login).unwrap_or_default(),
            labels: self.labels.into_iter().map(|l| l.name).collect(),
            head_ref: self.head.branch,
            head_sha: self.head.sha,
            base_ref: self.base.branch,
            state,
            draft: self.draft,
            locked: self.locked,
            mergeable: self.mergeable,
            approvals,
            created_at: self.created_at,
            updated_at: self.updated_at,
            html_url: self.html_url,
        }
    }
}

/// One review on a pull request.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubReview {
    #[serde(default)]
    pub user: Option<GitHubUser>,
    pub state: String,
}

/// Counts users whose latest submitted review is an approval.
pub fn approvals_from_reviews(reviews: &[GitHubReview]) -> u32 {
    let mut latest: std::collections::HashMap<&str, &str> = std::collections::HashMap::new();
    for review in reviews {
        let Some(user) = &review.user else { continue };
        // Reviews arrive oldest first; COMMENTED reviews don't change a
        // previously recorded verdict.
        if review.state != "COMMENTED" {
            latest.insert(user.login.as_str(), review.state.as_str());
        }
    }
    latest.values().filter(|s| **s == "APPROVED").count() as u32
}

/// Combined commit status for a ref.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubCombinedStatus {
    pub state: String,
    #[serde(default)]
    pub statuses: Vec<GitHubStatusEntry>,
}

/// One entry in a combined status.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubStatusEntry {
    pub context: String,
    pub state: String,
}

/// Check-runs listing for a ref.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubCheckRuns {
    #[serde(default)]
    pub check_runs: Vec<GitHubCheckRun>,
}

/// One check run.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubCheckRun {
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub conclusion: Option<String>,
}

impl GitHubCheckRun {
    pub fn into_check(self) -> Check {
        let failed = matches!(
            self.conclusion.as_deref(),
            Some("failure" | "timed_out" | "cancelled" | "action_required")
        );
        Check {
            name: self.name,
            completed: self.status == "completed",
            failed,
        }
    }
}

/// Response of the merge endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubMergeResponse {
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Rate-limit snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRateLimit {
    pub resources: GitHubRateLimitResources,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRateLimitResources {
    pub core: GitHubRateLimitWindow,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRateLimitWindow {
    pub limit: u64,
    pub remaining: u64,
    pub reset: i64,
}
