//! GitLab API client implementation.

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
    aggregate_status, GitLabApprovals, GitLabCommitStatus, GitLabMergeRequest,
    GitLabMergeResponse, GitLabProject, GitLabUser,
};
use crate::DEFAULT_GITLAB_URL;

/// GitLab API client.
///
/// Every request acquires a token from the provider's rate limiter and runs
/// inside the retry primitive, per the provider contract.
pub struct GitLabClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    retry: RetryConfig,
}

impl GitLabClient {
    /// Create a new GitLab client against gitlab.com.
    pub fn new(token: impl Into<String>, limiter: Arc<RateLimiter>, retry: RetryConfig) -> Self {
        Self::with_base_url(DEFAULT_GITLAB_URL, token, limiter, retry)
    }

    /// Create a new GitLab client with a custom instance URL.
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

    /// Get the API URL for a given endpoint.
    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/api/v4{}", self.base_url, endpoint)
    }

    /// Get the project-scoped API URL for a repository.
    fn project_url(&self, repo: &Repository, endpoint: &str) -> String {
        self.api_url(&format!(
            "/projects/{}{}",
            urlencoding::encode(&repo.full_name),
            endpoint
        ))
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
                debug!(method = %method, url, "GitLab request");

                let mut request = self
                    .client
                    .request(method, url)
                    .header("PRIVATE-TOKEN", &self.token);
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

    /// Fetch one merge request with its computed merge status and approval
    /// count. The listing omits a reliable `merge_status`, so discovery
    /// re-fetches each listed MR.
    async fn fetch_merge_request(
        &self,
        cancel: &CancellationToken,
        repo: &Repository,
        iid: u64,
    ) -> Result<PullRequest> {
        let detail: GitLabMergeRequest = self
            .get(
                cancel,
                &self.project_url(repo, &format!("/merge_requests/{iid}")),
            )
            .await?;
        // The approvals endpoint is gated on some instances; treat a failure
        // as zero approvals rather than failing discovery.
        let approvals: GitLabApprovals = match self
            .get(
                cancel,
                &self.project_url(repo, &format!("/merge_requests/{iid}/approvals")),
            )
            .await
        {
            Ok(approvals) => approvals,
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                debug!(mr_iid = iid, error = %err, "approvals lookup failed");
                GitLabApprovals::default()
            }
        };
        Ok(detail.into_pull_request(approvals.approved_by.len() as u32))
    }

    async fn commit_statuses(
        &self,
        cancel: &CancellationToken,
        repo: &Repository,
        sha: &str,
    ) -> Result<Vec<GitLabCommitStatus>> {
        self.get(
            cancel,
            &self.project_url(repo, &format!("/repository/commits/{sha}/statuses")),
        )
        .await
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
        401 => Err(Error::Auth(format!("GitLab rejected the token: {message}"))),
        403 => Err(Error::Auth(format!("GitLab denied access: {message}"))),
        code => Err(Error::Api {
            status: code,
            message,
        }),
    }
}

#[async_trait]
impl Provider for GitLabClient {
    fn name(&self) -> &str {
        "gitlab"
    }

    async fn authenticate(&self, cancel: &CancellationToken) -> Result<()> {
        let user: GitLabUser = self.get(cancel, &self.api_url("/user")).await?;
        debug!(username = %user.username, "GitLab authentication succeeded");
        Ok(())
    }

    async fn list_repositories(&self, cancel: &CancellationToken) -> Result<Vec<Repository>> {
        let projects: Vec<GitLabProject> = self
            .get(
                cancel,
                &self.api_url("/projects?membership=true&per_page=100"),
            )
            .await?;
        Ok(projects
            .into_iter()
            .map(GitLabProject::into_repository)
            .collect())
    }

    async fn get_repository(
        &self,
        cancel: &CancellationToken,
        owner: &str,
        name: &str,
    ) -> Result<Repository> {
        let path = format!("{owner}/{name}");
        let project: GitLabProject = self
            .get(
                cancel,
                &self.api_url(&format!("/projects/{}", urlencoding::encode(&path))),
            )
            .await?;
        Ok(project.into_repository())
    }

    async fn list_pull_requests(
        &self,
        cancel: &CancellationToken,
        repo: &Repository,
        filter: &PrFilter,
    ) -> Result<Vec<PullRequest>> {
        // GitLab uses "opened" where the unified filter says "open", and
        // supports updated_after server-side.
        let state = match filter.state.as_deref() {
            Some("open") => "opened",
            Some(other) => other,
            None => "all",
        };
        let mut url = self.project_url(
            repo,
            &format!("/merge_requests?state={state}&per_page=100"),
        );
        if let Some(since) = filter.since {
            url.push_str(&format!("&updated_after={}", since.to_rfc3339()));
        }

        let listed: Vec<GitLabMergeRequest> = self.get(cancel, &url).await?;
        let mut prs = Vec::with_capacity(listed.len());
        for summary in listed {
            prs.push(self.fetch_merge_request(cancel, repo, summary.iid).await?);
        }
        Ok(prs)
    }

    async fn get_pr_status(
        &self,
        cancel: &CancellationToken,
        repo: &Repository,
        pr: &PullRequest,
    ) -> Result<PrStatus> {
        let statuses = self.commit_statuses(cancel, repo, &pr.head_sha).await?;
        let (state, all_success) = aggregate_status(&statuses);
        Ok(PrStatus { state, all_success })
    }

    async fn get_checks(
        &self,
        cancel: &CancellationToken,
        repo: &Repository,
        pr: &PullRequest,
    ) -> Result<Vec<Check>> {
        let statuses = self.commit_statuses(cancel, repo, &pr.head_sha).await?;
        Ok(statuses
            .into_iter()
            .map(GitLabCommitStatus::into_check)
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
        let commit_message = if message.body.is_empty() {
            message.title.clone()
        } else {
            format!("{}\n\n{}", message.title, message.body)
        };
        let body = match method {
            MergeMethod::Squash => serde_json::json!({
                "squash": true,
                "squash_commit_message": commit_message,
                "sha": pr.head_sha,
            }),
            MergeMethod::Merge => serde_json::json!({
                "merge_commit_message": commit_message,
                "sha": pr.head_sha,
            }),
            MergeMethod::Rebase => serde_json::json!({
                "merge_method": "rebase",
                "sha": pr.head_sha,
            }),
        };

        let response = self
            .execute(
                cancel,
                Method::PUT,
                &self.project_url(repo, &format!("/merge_requests/{}/merge", pr.number)),
                Some(body),
            )
            .await?;
        let merged: GitLabMergeResponse = response
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        if merged.state != "merged" {
            return Err(Error::Api {
                status: 409,
                message: format!("merge request state is '{}' after merge", merged.state),
            });
        }
        Ok(merged.squash_commit_sha.or(merged.merge_commit_sha))
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
            &self.project_url(
                repo,
                &format!("/repository/branches/{}", urlencoding::encode(branch)),
            ),
            None,
        )
        .await?;
        Ok(())
    }

    async fn get_rate_limit(&self, cancel: &CancellationToken) -> Result<RateLimit> {
        // GitLab has no dedicated rate-limit endpoint; read the throttle
        // headers off a cheap authenticated request instead.
        let response = self
            .execute(cancel, Method::GET, &self.api_url("/user"), None)
            .await?;
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
        };
        Ok(RateLimit {
            limit: header("ratelimit-limit").unwrap_or(0),
            remaining: header("ratelimit-remaining").unwrap_or(0),
            reset_at: header("ratelimit-reset")
                .and_then(|reset| chrono::DateTime::from_timestamp(reset as i64, 0)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use botmerge_core::RateLimiterConfig;
    use httpmock::prelude::*;
    use std::time::Duration;

    fn test_client(server: &MockServer) -> GitLabClient {
        let limiter = Arc::new(RateLimiter::new(
            "gitlab-test",
            RateLimiterConfig {
                requests_per_second: 1_000.0,
                burst: 1_000,
                timeout: Duration::from_secs(5),
            },
        ));
        let retry = RetryConfig {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            backoff_factor: 2.0,
            max_backoff: Duration::from_millis(5),
            jitter: false,
        };
        GitLabClient::with_base_url(server.base_url(), "glpat-test", limiter, retry)
    }

    fn test_repo() -> Repository {
        Repository {
            provider: "gitlab".to_string(),
            owner: "group".to_string(),
            name: "widgets".to_string(),
            full_name: "group/widgets".to_string(),
            default_branch: "main".to_string(),
        }
    }

    #[tokio::test]
    async fn project_paths_are_url_encoded() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v4/projects/group%2Fwidgets")
                .header("PRIVATE-TOKEN", "glpat-test");
            then.status(200).json_body(serde_json::json!({
                "path": "widgets",
                "path_with_namespace": "group/widgets",
                "default_branch": "main"
            }));
        });

        let client = test_client(&server);
        let repo = client
            .get_repository(&CancellationToken::new(), "group", "widgets")
            .await
            .unwrap();
        assert_eq!(repo.full_name, "group/widgets");
        assert_eq!(repo.owner, "group");
        mock.assert();
    }

    #[tokio::test]
    async fn statuses_feed_both_aggregate_and_checks() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/v4/projects/group%2Fwidgets/repository/commits/abc/statuses");
            then.status(200).json_body(serde_json::json!([
                {"name": "build", "status": "success"},
                {"name": "test", "status": "failed"}
            ]));
        });

        let client = test_client(&server);
        let pr = sample_pr();
        let status = client
            .get_pr_status(&CancellationToken::new(), &test_repo(), &pr)
            .await
            .unwrap();
        assert_eq!(status.state, "failed");
        assert!(!status.all_success);

        let checks = client
            .get_checks(&CancellationToken::new(), &test_repo(), &pr)
            .await
            .unwrap();
        assert_eq!(checks.len(), 2);
        assert!(checks.iter().any(|c| c.name == "test" && c.failed));
    }

    #[tokio::test]
    async fn merge_squash_sends_squash_flag() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(PUT)
                .path("/api/v4/projects/group%2Fwidgets/merge_requests/3/merge")
                .json_body_includes(r#"{"squash": true}"#);
            then.status(200).json_body(serde_json::json!({
                "state": "merged",
                "squash_commit_sha": "cafebabe"
            }));
        });

        let client = test_client(&server);
        let sha = client
            .merge_pull_request(
                &CancellationToken::new(),
                &test_repo(),
                &sample_pr(),
                MergeMethod::Squash,
                &CommitMessage {
                    title: "Bump deps (#3)".to_string(),
                    body: String::new(),
                },
            )
            .await
            .unwrap();
        assert_eq!(sha.as_deref(), Some("cafebabe"));
        mock.assert();
    }

    fn sample_pr() -> PullRequest {
        PullRequest {
            number: 3,
            title: "Bump deps".to_string(),
            body: None,
            author: "renovate-bot".to_string(),
            labels: vec![],
            head_ref: "renovate/all".to_string(),
            head_sha: "abc".to_string(),
            base_ref: "main".to_string(),
            state: botmerge_core::types::PrState::Open,
            draft: false,
            locked: false,
            mergeable: Some(true),
            approvals: 0,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            html_url: "https://example.invalid/mr/3".to_string(),
        }
    }
}
