//! Bitbucket Cloud API client implementation.

use std::sync::Arc;

use async_trait::async_trait;
use botmerge_core::types::{
    Check, CommitMessage, MergeMethod, PrFilter, PrStatus, PullRequest, RateLimit, Repository,
};
use botmerge_core::{retry, Error, Provider, RateLimiter, Result, RetryConfig};
use reqwest::Method;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::types::{
    aggregate_status, BitbucketBuildStatus, BitbucketPullRequest, BitbucketRepo, BitbucketUser,
    Paged,
};
use crate::DEFAULT_BITBUCKET_URL;

/// Bitbucket Cloud API client, authenticating with username + app password.
///
/// Every request acquires a token from the provider's rate limiter and runs
/// inside the retry primitive, per the provider contract.
pub struct BitbucketClient {
    base_url: String,
    username: String,
    app_password: String,
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    retry: RetryConfig,
}

impl BitbucketClient {
    /// Create a new Bitbucket Cloud client.
    pub fn new(
        username: impl Into<String>,
        app_password: impl Into<String>,
        limiter: Arc<RateLimiter>,
        retry: RetryConfig,
    ) -> Self {
        Self::with_base_url(DEFAULT_BITBUCKET_URL, username, app_password, limiter, retry)
    }

    /// Create a new Bitbucket client with a custom base URL.
    pub fn with_base_url(
        base_url: impl Into<String>,
        username: impl Into<String>,
        app_password: impl Into<String>,
        limiter: Arc<RateLimiter>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            app_password: app_password.into(),
            client: reqwest::Client::builder()
                .user_agent("botmerge-tools")
                .build()
                .expect("Failed to create HTTP client"),
            limiter,
            retry,
        }
    }

    /// Get the API URL for a given endpoint.
    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/2.0{}", self.base_url, endpoint)
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
                debug!(method = %method, url, "Bitbucket request");

                let mut request = self
                    .client
                    .request(method, url)
                    .basic_auth(&self.username, Some(&self.app_password));
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

    /// Fetch one pull request in full. The list payload omits participants,
    /// so discovery re-fetches each listed PR for its approval count.
    async fn fetch_pull_request(
        &self,
        cancel: &CancellationToken,
        repo: &Repository,
        id: u64,
    ) -> Result<PullRequest> {
        let detail: BitbucketPullRequest = self
            .get(
                cancel,
                &self.api_url(&format!(
                    "/repositories/{}/pullrequests/{id}",
                    repo.full_name
                )),
            )
            .await?;
        Ok(detail.into_pull_request())
    }

    async fn build_statuses(
        &self,
        cancel: &CancellationToken,
        repo: &Repository,
        sha: &str,
    ) -> Result<Vec<BitbucketBuildStatus>> {
        let paged: Paged<BitbucketBuildStatus> = self
            .get(
                cancel,
                &self.api_url(&format!(
                    "/repositories/{}/commit/{sha}/statuses",
                    repo.full_name
                )),
            )
            .await?;
        Ok(paged.values)
    }
}

/// Map a non-success response to the error taxonomy.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    match status.as_u16() {
        401 => Err(Error::Auth(format!(
            "Bitbucket rejected the credentials: {message}"
        ))),
        403 => Err(Error::Auth(format!("Bitbucket denied access: {message}"))),
        code => Err(Error::Api {
            status: code,
            message,
        }),
    }
}

#[async_trait]
impl Provider for BitbucketClient {
    fn name(&self) -> &str {
        "bitbucket"
    }

    async fn authenticate(&self, cancel: &CancellationToken) -> Result<()> {
        let user: BitbucketUser = self.get(cancel, &self.api_url("/user")).await?;
        debug!(user = %user.login(), "Bitbucket authentication succeeded");
        Ok(())
    }

    async fn list_repositories(&self, cancel: &CancellationToken) -> Result<Vec<Repository>> {
        let paged: Paged<BitbucketRepo> = self
            .get(
                cancel,
                &self.api_url("/repositories?role=member&pagelen=100"),
            )
            .await?;
        Ok(paged
            .values
            .into_iter()
            .map(BitbucketRepo::into_repository)
            .collect())
    }

    async fn get_repository(
        &self,
        cancel: &CancellationToken,
        owner: &str,
        name: &str,
    ) -> Result<Repository> {
        let repo: BitbucketRepo = self
            .get(cancel, &self.api_url(&format!("/repositories/{owner}/{name}")))
            .await?;
        Ok(repo.into_repository())
    }

    async fn list_pull_requests(
        &self,
        cancel: &CancellationToken,
        repo: &Repository,
        filter: &PrFilter,
    ) -> Result<Vec<PullRequest>> {
        let state = match filter.state.as_deref() {
            Some("open") => "OPEN",
            Some(other) => other,
            None => "OPEN",
        };
        let mut url = self.api_url(&format!(
            "/repositories/{}/pullrequests?state={state}&pagelen=50",
            repo.full_name
        ));
        if let Some(since) = filter.since {
            // Bitbucket supports server-side filtering through its query
            // language.
            let query = format!("updated_on>={}", since.to_rfc3339());
            url.push_str(&format!("&q={}", urlencoding::encode(&query)));
        }

        let paged: Paged<BitbucketPullRequest> = self.get(cancel, &url).await?;
        let mut prs = Vec::with_capacity(paged.values.len());
        for summary in paged.values {
            prs.push(self.fetch_pull_request(cancel, repo, summary.id).await?);
        }
        Ok(prs)
    }

    async fn get_pr_status(
        &self,
        cancel: &CancellationToken,
        repo: &Repository,
        pr: &PullRequest,
    ) -> Result<PrStatus> {
        let statuses = self.build_statuses(cancel, repo, &pr.head_sha).await?;
        let (state, all_success) = aggregate_status(&statuses);
        Ok(PrStatus { state, all_success })
    }

    async fn get_checks(
        &self,
        cancel: &CancellationToken,
        repo: &Repository,
        pr: &PullRequest,
    ) -> Result<Vec<Check>> {
        let statuses = self.build_statuses(cancel, repo, &pr.head_sha).await?;
        Ok(statuses
            .into_iter()
            .map(BitbucketBuildStatus::into_check)
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
        let strategy = match method {
            MergeMethod::Merge => "merge_commit",
            MergeMethod::Squash => "squash",
            MergeMethod::Rebase => "fast_forward",
        };
        let commit_message = if message.body.is_empty() {
            message.title.clone()
        } else {
            format!("{}\n\n{}", message.title, message.body)
        };
        let body = serde_json::json!({
            "merge_strategy": strategy,
            "message": commit_message,
        });

        let response = self
            .execute(
                cancel,
                Method::POST,
                &self.api_url(&format!(
                    "/repositories/{}/pullrequests/{}/merge",
                    repo.full_name, pr.number
                )),
                Some(body),
            )
            .await?;
        let merged: BitbucketPullRequest = response
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        if merged.state != "MERGED" {
            return Err(Error::Api {
                status: 409,
                message: format!("pull request state is '{}' after merge", merged.state),
            });
        }
        // The merge response does not carry the merge commit.
        Ok(None)
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
            &self.api_url(&format!(
                "/repositories/{}/refs/branches/{branch}",
                repo.full_name
            )),
            None,
        )
        .await?;
        Ok(())
    }

    async fn get_rate_limit(&self, _cancel: &CancellationToken) -> Result<RateLimit> {
        // Bitbucket Cloud exposes no rate-limit endpoint or headers; report
        // an empty snapshot.
        Ok(RateLimit {
            limit: 0,
            remaining: 0,
            reset_at: None,
        })
    }
}
