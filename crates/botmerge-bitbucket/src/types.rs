//! Bitbucket Cloud API response types.
//!
//! Raw JSON shapes from the 2.0 API, mapped onto the unified core types.
//! List endpoints wrap their results in a paged envelope with a `values`
//! array.

use botmerge_core::types::{Check, PrState, PullRequest, Repository};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Paged list envelope used by every Bitbucket list endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: serde::Deserialize<'de>"))]
pub struct Paged<T> {
    #[serde(default)]
    pub values: Vec<T>,
}

/// Bitbucket user representation.
#[derive(Debug, Clone, Deserialize)]
pub struct BitbucketUser {
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl BitbucketUser {
    pub fn login(&self) -> String {
        self.nickname
            .clone()
            .or_else(|| self.display_name.clone())
            .unwrap_or_default()
    }
}

/// Bitbucket repository representation.
#[derive(Debug, Clone, Deserialize)]
pub struct BitbucketRepo {
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub mainbranch: Option<BitbucketBranchName>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BitbucketBranchName {
    pub name: String,
}

impl BitbucketRepo {
    pub fn into_repository(self) -> Repository {
        let owner = self
            .full_name
            .split_once('/')
            .map(|(owner, _)| owner.to_string())
            .unwrap_or_default();
        Repository {
            provider: "bitbucket".to_string(),
            owner,
            name: self.name,
            full_name: self.full_name,
            default_branch: self
                .mainbranch
                .map(|b| b.name)
                .unwrap_or_else(|| "main".to_string()),
        }
    }
}

/// One end of a pull request (source or destination).
#[derive(Debug, Clone, Deserialize)]
pub struct BitbucketEndpoint {
    pub branch: BitbucketBranchName,
    #[serde(default)]
    pub commit: Option<BitbucketCommit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BitbucketCommit {
    pub hash: String,
}

/// A participant on a pull request (only present on the single-PR endpoint).
#[derive(Debug, Clone, Deserialize)]
pub struct BitbucketParticipant {
    #[serde(default)]
    pub approved: bool,
}

/// Bitbucket pull request representation.
#[derive(Debug, Clone, Deserialize)]
pub struct BitbucketPullRequest {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub summary: Option<BitbucketRendered>,
    pub state: String,
    #[serde(default)]
    pub draft: bool,
    pub author: BitbucketUser,
    pub source: BitbucketEndpoint,
    pub destination: BitbucketEndpoint,
    #[serde(default)]
    pub participants: Vec<BitbucketParticipant>,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
    pub links: BitbucketLinks,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BitbucketRendered {
    #[serde(default)]
    pub raw: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BitbucketLinks {
    #[serde(default)]
    pub html: Option<BitbucketLink>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BitbucketLink {
    pub href: String,
}

impl BitbucketPullRequest {
    pub fn into_pull_request(self) -> PullRequest {
        let state = match self.state.as_str() {
            "OPEN" => PrState::Open,
            "MERGED" => PrState::Merged,
            _ => PrState::Closed,
        };
        let approvals = self.participants.iter().filter(|p| p.approved).count() as u32;
        PullRequest {
            number: self.id,
            title: self.title,
            body: self.summary.and_then(|s| s.raw),
            author: self.author.login(),
            // Bitbucket Cloud has no PR labels
            labels: Vec::new(),
            head_ref: self.source.branch.name,
            head_sha: self
                .source
                .commit
                .map(|c| c.hash)
                .unwrap_or_default(),
            base_ref: self.destination.branch.name,
            state,
            draft: self.draft,
            locked: false,
            // Bitbucket does not expose mergeability on the PR resource
            mergeable: None,
            approvals,
            created_at: self.created_on,
            updated_at: self.updated_on,
            html_url: self
                .links
                .html
                .map(|l| l.href)
                .unwrap_or_default(),
        }
    }
}

/// One commit build status.
#[derive(Debug, Clone, Deserialize)]
pub struct BitbucketBuildStatus {
    pub key: String,
    pub state: String,
}

impl BitbucketBuildStatus {
    pub fn into_check(self) -> Check {
        let completed = matches!(self.state.as_str(), "SUCCESSFUL" | "FAILED" | "STOPPED");
        let failed = matches!(self.state.as_str(), "FAILED" | "STOPPED");
        Check {
            name: self.key,
            completed,
            failed,
        }
    }
}

/// Aggregates build statuses into a single state string.
///
/// An empty list counts as success (no CI configured is not a blocker).
pub fn aggregate_status(statuses: &[BitbucketBuildStatus]) -> (String, bool) {
    if statuses.is_empty() {
        return ("SUCCESSFUL".to_string(), true);
    }
    if statuses
        .iter()
        .any(|s| matches!(s.state.as_str(), "FAILED" | "STOPPED"))
    {
        return ("FAILED".to_string(), false);
    }
    if statuses.iter().any(|s| s.state == "INPROGRESS") {
        return ("INPROGRESS".to_string(), false);
    }
    ("SUCCESSFUL".to_string(), true)
}
