//! Provider trait for git hosting services.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::{
    Check, CommitMessage, MergeMethod, PrFilter, PrStatus, PullRequest, RateLimit, Repository,
};

/// Trait for git hosting providers (GitHub, GitLab, Bitbucket).
///
/// Every implementation carries the same contract: each network-bound method
/// acquires a token from the provider's rate limiter before issuing the
/// request and wraps the request in the retry primitive, retrying only
/// transient conditions (never auth failures, never non-429 4xx). All methods
/// take a cancellation token and abort promptly when it fires, including
/// mid-backoff and mid-rate-limit-wait.
#[async_trait]
pub trait Provider: Send + Sync {
    /// The provider name (e.g. "github", "gitlab", "bitbucket")
    fn name(&self) -> &str;

    /// Verify the configured credentials against the remote API.
    async fn authenticate(&self, cancel: &CancellationToken) -> Result<()>;

    /// List repositories accessible to the authenticated identity.
    async fn list_repositories(&self, cancel: &CancellationToken) -> Result<Vec<Repository>>;

    /// Fetch a single repository.
    async fn get_repository(
        &self,
        cancel: &CancellationToken,
        owner: &str,
        name: &str,
    ) -> Result<Repository>;

    /// List pull requests for a repository, filtered provider-side where the
    /// API supports it.
    async fn list_pull_requests(
        &self,
        cancel: &CancellationToken,
        repo: &Repository,
        filter: &PrFilter,
    ) -> Result<Vec<PullRequest>>;

    /// Fetch the aggregate commit status for a pull request head.
    async fn get_pr_status(
        &self,
        cancel: &CancellationToken,
        repo: &Repository,
        pr: &PullRequest,
    ) -> Result<PrStatus>;

    /// Fetch the individual CI checks for a pull request head.
    async fn get_checks(
        &self,
        cancel: &CancellationToken,
        repo: &Repository,
        pr: &PullRequest,
    ) -> Result<Vec<Check>>;

    /// Merge a pull request.
    ///
    /// Returns the merge commit SHA when the API reports one.
    async fn merge_pull_request(
        &self,
        cancel: &CancellationToken,
        repo: &Repository,
        pr: &PullRequest,
        method: MergeMethod,
        message: &CommitMessage,
    ) -> Result<Option<String>>;

    /// Delete a branch (used to clean up PR head branches after merging).
    async fn delete_branch(
        &self,
        cancel: &CancellationToken,
        repo: &Repository,
        branch: &str,
    ) -> Result<()>;

    /// Fetch the provider's rate-limit snapshot.
    async fn get_rate_limit(&self, cancel: &CancellationToken) -> Result<RateLimit>;
}
