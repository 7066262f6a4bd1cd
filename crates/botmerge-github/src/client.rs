//! GitHub API client implementation.

use std::sync::Arc;

use async_trait::async_trait;
use botmerge_core::error::is_rate_limit_message;
use botmerge_core::types::{
    Check, CommitMessage, MergeMethod, PrFilter, PrStatus, PullRequest, RateLimit, Repository,
};
use botmerge_core::{retry, Error, Provider, RateLimiter, Result, RetryConfig};
use chrono::TimeZone;
use reqwest::Method;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::types::{
    approvals_from_reviews, GitHubCheckRuns, GitHubCombinedStatus, GitHubMergeResponse,
    GitHubPullRequest, GitHubRateLimit, GitHubRepo, GitHubReview, GitHubUser,
};
use crate::DEFAULT_GITHUB_URL;

/// GitHub API client.
///
/// Every request acquires a token from the provider's rate limiter and runs
/// inside the retry primitive, per the provider contract.
pub struct GitHubClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    retry: RetryConfig,
}

impl GitHubClient {
    /// Create a new GitHub client.
    pub fn new(token: impl Into<String>, limiter: Arc<RateLimiter>, retry: RetryConfig) -> Self {
        Self::with_base_url(DEFAULT_GITHUB_URL, token, limiter, retry)
    }

    /// Create a new GitHub client with a custom base URL (GitHub Enterprise).
    pub fn with_base_url(
        base_url: impl Into<String>,
        token: impl Into<String>,
        limiter: Arc<RateLimiter>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client: reqwest::Client::builder()
                .user_agent("botmerge-tools")
                .build()
                .expect("Failed to create HTTP client"),
            limiter,
            retry,
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Build a request with the common GitHub headers.
    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    /// Issue a request with rate limiting and retry, returning the raw
    /// response on a success status.
    async fn execute(
        &self,
        cancel: &CancellationToken,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response> {
        retry(cancel, &self.retry, Error::is_retryable, || {
            let method = method.clone();
            let body = body.clone();
            async move {
                self.limiter.wait(cancel).await?;
                debug!(method = %method, url, "GitHub request");

                let mut request = self.request(method, url);
                if let Some(body) = body {
                    request = request.json(&body);
                }
                let response = request
                    .send()
                    .await
                    .map_err(|e| Error::Http(e.to_string()))?;
                check_status(response).await
            }
        })
        .await
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        url: &str,
    ) -> Result<T> {
        let response = self.execute(cancel, Method::GET, url, None).await?;
        response.json().await.map_err(|e| Error::Http(e.to_string()))
    }

    /// Fetch one pull request with its computed `mergeable` field and its
    /// approval count. The list endpoint omits both, so discovery re-fetches
    /// each listed PR.
    async fn fetch_pull_request(
        &self,
        cancel: &CancellationToken,
        repo: &Repository,
        number: u64,
    ) -> Result<PullRequest> {
        let detail: GitHubPullRequest = self
            .get(
                cancel,
                &self.url(&format!("/repos/{}/pulls/{}", repo.full_name, number)),
            )
            .await?;
        let reviews: Vec<GitHubReview> = self
            .get(
                cancel,
                &self.url(&format!(
                    "/repos/{}/pulls/{}/reviews?per_page=100",
                    repo.full_name, number
                )),
            )
            .await?;
        Ok(detail.into_pull_request(approvals_from_reviews(&reviews)))
    }
}

/// Map a non-success response to the error taxonomy.
///
/// 401 and non-rate-limit 403 become auth errors (never retried); everything
/// else keeps its status code for the retry predicate.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    match status.as_u16() {
        401 => Err(Error::Auth(format!("GitHub rejected the token: {message}"))),
        403 if !is_rate_limit_message(&message) => {
            Err(Error::Auth(format!("GitHub denied access: {message}")))
        }
        code => Err(Error::Api {
            status: code,
            message,
        }),
    }
}

#[async_trait]
impl Provider for GitHubClient {
    fn name(&self) -> &str {
        "github"
    }

    async fn authenticate(&self, cancel: &CancellationToken) -> Result<()> {
        let user: GitHubUser = self.get(cancel, &self.url("/user")).await?;
        debug!(login = %user.login, "GitHub authentication succeeded");
        Ok(())
    }

    async fn list_repositories(&self, cancel: &CancellationToken) -> Result<Vec<Repository>> {
        let repos: Vec<GitHubRepo> = self
            .get(cancel, &self.url("/user/repos?per_page=100"))
            .await?;
        Ok(repos.into_iter().map(GitHubRepo::into_repository).collect())
    }

    async fn get_repository(
        &self,
        cancel: &CancellationToken,
        owner: &str,
        name: &str,
    ) -> Result<Repository> {
        let repo: GitHubRepo = self
            .get(cancel, &self.url(&format!("/repos/{owner}/{name}")))
            .await?;
        Ok(repo.into_repository())
    }

    async fn list_pull_requests(
        &self,
        cancel: &CancellationToken,
        repo: &Repository,
        filter: &PrFilter,
    ) -> Result<Vec<PullRequest>> {
        let state = filter.state.as_deref().unwrap_or("all");
        let listed: Vec<GitHubPullRequest> = self
            .get(
                cancel,
                &self.url(&format!(
                    "/repos/{}/pulls?state={state}&sort=updated&direction=desc&per_page=100",
                    repo.full_name
                )),
            )
            .await?;

        // The pulls listing has no `since` parameter; cut off locally using
        // the update-sorted order.
        let mut prs = Vec::with_capacity(listed.len());
        for summary in listed {
            if let Some(since) = filter.since {
                if summary.updated_at < since {
                    break;
                }
            }
            prs.push(
                self.fetch_pull_request(cancel, repo, summary.number)
                    .await?,
            );
        }
        Ok(prs)
    }

    async fn get_pr_status(
        &self,
        cancel: &CancellationToken,
        repo: &Repository,
        pr: &PullRequest,
    ) -> Result<PrStatus> {
        let combined: GitHubCombinedStatus = self
            .get(
                cancel,
                &self.url(&format!(
                    "/repos/{}/commits/{}/status",
                    repo.full_name, pr.head_sha
                )),
            )
            .await?;
        // A repo with no commit statuses reports "pending" with an empty
        // list; that must not block PRs whose CI runs as check runs.
        let all_success = combined.state == "success" || combined.statuses.is_empty();
        Ok(PrStatus {
            state: combined.state,
            all_success,
        })
    }

    async fn get_checks(
        &self,
        cancel: &CancellationToken,
        repo: &Repository,
        pr: &PullRequest,
    ) -> Result<Vec<Check>> {
        let runs: GitHubCheckRuns = self
            .get(
                cancel,
                &self.url(&format!(
                    "/repos/{}/commits/{}/check-runs?per_page=100",
                    repo.full_name, pr.head_sha
                )),
            )
            .await?;
        Ok(runs
            .check_runs
            .into_iter()
            .map(crate::types::GitHubCheckRun::into_check)
            .collect())
    }

    async fn merge_pull_request(
        &self,
        cancel: &CancellationToken,
        repo: &Repository,
        pr: &PullRequest,
        method: MergeMethod,
        message: &CommitMessage,
    ) -> Result<Option<String>> {
        let body = serde_json::json!({
            "merge_method": method.to_string(),
            "commit_title": message.title,
            "commit_message": message.body,
            // Guards against the head moving between evaluation and merge.
            "sha": pr.head_sha,
        });
        let response = self
            .execute(
                cancel,
                Method::PUT,
                &self.url(&format!("/repos/{}/pulls/{}/merge", repo.full_name, pr.number)),
                Some(body),
            )
            .await?;
        let merged: GitHubMergeResponse = response
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        if !merged.merged {
            return Err(Error::Api {
                status: 409,
                message: merged
                    .message
                    .unwrap_or_else(|| "pull request was not merged".to_string()),
            });
        }
        Ok(merged.sha)
    }

    async fn delete_branch(
        &self,
        cancel: &CancellationToken,
        repo: &Repository,
        branch: &str,
    ) -> Result<()> {
        self.execute(
            cancel,
            Method::DELETE,
            &self.url(&format!(
                "/repos/{}/git/refs/heads/{branch}",
                repo.full_name
            )),
            None,
        )
        .await?;
        Ok(())
    }

    async fn get_rate_limit(&self, cancel: &CancellationToken) -> Result<RateLimit> {
        let limits: GitHubRateLimit = self.get(cancel, &self.url("/rate_limit")).await?;
        let core = limits.resources.core;
        Ok(RateLimit {
            limit: core.limit,
            remaining: core.remaining,
            reset_at: chrono::Utc.timestamp_opt(core.reset, 0).single(),
        })
    }
}
