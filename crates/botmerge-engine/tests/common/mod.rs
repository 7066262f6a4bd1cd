//! Mock provider and fixtures for engine tests.
//!
//! These are test utilities - not all may be used in every test binary.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use botmerge_core::config::{Config, RepoPolicy};
use botmerge_core::types::{
    Check, CommitMessage, MergeMethod, PrFilter, PrState, PrStatus, PullRequest, RateLimit,
    Repository,
};
use botmerge_core::{Error, Provider, Result};

/// Call record for `merge_pull_request`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeCall {
    pub repository: String,
    pub number: u64,
    pub method: MergeMethod,
    pub title: String,
}

/// Call record for `delete_branch`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteBranchCall {
    pub repository: String,
    pub branch: String,
}

/// Simple mock provider for engine tests.
///
/// This manually implements `Provider` with response maps, call tracking,
/// and error injection, all behind interior mutability so tests can keep
/// configuring it after wrapping it in an `Arc`.
pub struct MockProvider {
    name: String,
    repos: Mutex<HashMap<String, Repository>>,
    prs: Mutex<HashMap<String, Vec<PullRequest>>>,
    statuses: Mutex<HashMap<(String, u64), PrStatus>>,
    checks: Mutex<HashMap<(String, u64), Vec<Check>>>,
    // Error injection
    error_on_repo: Mutex<HashMap<String, String>>,
    error_on_status: Mutex<HashMap<(String, u64), String>>,
    error_on_merge: Mutex<HashMap<(String, u64), String>>,
    // Call tracking
    list_calls: Mutex<Vec<String>>,
    merge_calls: Mutex<Vec<MergeCall>>,
    delete_branch_calls: Mutex<Vec<DeleteBranchCall>>,
}

impl MockProvider {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            repos: Mutex::new(HashMap::new()),
            prs: Mutex::new(HashMap::new()),
            statuses: Mutex::new(HashMap::new()),
            checks: Mutex::new(HashMap::new()),
            error_on_repo: Mutex::new(HashMap::new()),
            error_on_status: Mutex::new(HashMap::new()),
            error_on_merge: Mutex::new(HashMap::new()),
            list_calls: Mutex::new(Vec::new()),
            merge_calls: Mutex::new(Vec::new()),
            delete_branch_calls: Mutex::new(Vec::new()),
        })
    }

    /// Register a repository.
    pub fn add_repo(&self, full_name: &str) {
        let (owner, name) = full_name.split_once('/').expect("owner/name");
        self.repos.lock().unwrap().insert(
            full_name.to_string(),
            Repository {
                provider: self.name.clone(),
                owner: owner.to_string(),
                name: name.to_string(),
                full_name: full_name.to_string(),
                default_branch: "main".to_string(),
            },
        );
    }

    /// Register a pull request with a passing status and no checks.
    pub fn add_pr(&self, full_name: &str, pr: PullRequest) {
        let key = (full_name.to_string(), pr.number);
        self.statuses.lock().unwrap().entry(key.clone()).or_insert(PrStatus {
            state: "success".to_string(),
            all_success: true,
        });
        self.checks.lock().unwrap().entry(key).or_default();
        self.prs
            .lock()
            .unwrap()
            .entry(full_name.to_string())
            .or_default()
            .push(pr);
    }

    /// Override the aggregate status for a PR.
    pub fn set_status(&self, full_name: &str, number: u64, status: PrStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert((full_name.to_string(), number), status);
    }

    /// Override the checks for a PR.
    pub fn set_checks(&self, full_name: &str, number: u64, checks: Vec<Check>) {
        self.checks
            .lock()
            .unwrap()
            .insert((full_name.to_string(), number), checks);
    }

    // === Error injection ===

    /// Make `get_repository` fail for a repository.
    pub fn fail_repo(&self, full_name: &str, message: &str) {
        self.error_on_repo
            .lock()
            .unwrap()
            .insert(full_name.to_string(), message.to_string());
    }

    /// Make `get_pr_status` fail for a PR.
    pub fn fail_status(&self, full_name: &str, number: u64, message: &str) {
        self.error_on_status
            .lock()
            .unwrap()
            .insert((full_name.to_string(), number), message.to_string());
    }

    /// Make `merge_pull_request` fail for a PR.
    pub fn fail_merge(&self, full_name: &str, number: u64, message: &str) {
        self.error_on_merge
            .lock()
            .unwrap()
            .insert((full_name.to_string(), number), message.to_string());
    }

    // === Call tracking ===

    pub fn merge_calls(&self) -> Vec<MergeCall> {
        self.merge_calls.lock().unwrap().clone()
    }

    pub fn delete_branch_calls(&self) -> Vec<DeleteBranchCall> {
        self.delete_branch_calls.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> Vec<String> {
        self.list_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn authenticate(&self, _cancel: &CancellationToken) -> Result<()> {
        Ok(())
    }

    async fn list_repositories(&self, _cancel: &CancellationToken) -> Result<Vec<Repository>> {
        Ok(self.repos.lock().unwrap().values().cloned().collect())
    }

    async fn get_repository(
        &self,
        _cancel: &CancellationToken,
        owner: &str,
        name: &str,
    ) -> Result<Repository> {
        let full_name = format!("{owner}/{name}");
        if let Some(message) = self.error_on_repo.lock().unwrap().get(&full_name) {
            return Err(Error::Api {
                status: 500,
                message: message.clone(),
            });
        }
        self.repos
            .lock()
            .unwrap()
            .get(&full_name)
            .cloned()
            .ok_or_else(|| Error::Api {
                status: 404,
                message: format!("repository {full_name} not found"),
            })
    }

    async fn list_pull_requests(
        &self,
        _cancel: &CancellationToken,
        repo: &Repository,
        filter: &PrFilter,
    ) -> Result<Vec<PullRequest>> {
        self.list_calls.lock().unwrap().push(repo.full_name.clone());
        let prs = self
            .prs
            .lock()
            .unwrap()
            .get(&repo.full_name)
            .cloned()
            .unwrap_or_default();
        Ok(prs
            .into_iter()
            .filter(|pr| match filter.state.as_deref() {
                Some("open") => pr.state == PrState::Open,
                _ => true,
            })
            .filter(|pr| filter.since.is_none_or(|since| pr.updated_at >= since))
            .collect())
    }

    async fn get_pr_status(
        &self,
        _cancel: &CancellationToken,
        repo: &Repository,
        pr: &PullRequest,
    ) -> Result<PrStatus> {
        let key = (repo.full_name.clone(), pr.number);
        if let Some(message) = self.error_on_status.lock().unwrap().get(&key) {
            return Err(Error::Api {
                status: 502,
                message: message.clone(),
            });
        }
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or(PrStatus {
                state: "success".to_string(),
                all_success: true,
            }))
    }

    async fn get_checks(
        &self,
        _cancel: &CancellationToken,
        repo: &Repository,
        pr: &PullRequest,
    ) -> Result<Vec<Check>> {
        Ok(self
            .checks
            .lock()
            .unwrap()
            .get(&(repo.full_name.clone(), pr.number))
            .cloned()
            .unwrap_or_default())
    }

    async fn merge_pull_request(
        &self,
        _cancel: &CancellationToken,
        repo: &Repository,
        pr: &PullRequest,
        method: MergeMethod,
        message: &CommitMessage,
    ) -> Result<Option<String>> {
        self.merge_calls.lock().unwrap().push(MergeCall {
            repository: repo.full_name.clone(),
            number: pr.number,
            method,
            title: message.title.clone(),
        });
        if let Some(message) = self
            .error_on_merge
            .lock()
            .unwrap()
            .get(&(repo.full_name.clone(), pr.number))
        {
            return Err(Error::Api {
                status: 405,
                message: message.clone(),
            });
        }
        Ok(Some(format!("sha-{}", pr.number)))
    }

    async fn delete_branch(
        &self,
        _cancel: &CancellationToken,
        repo: &Repository,
        branch: &str,
    ) -> Result<()> {
        self.delete_branch_calls.lock().unwrap().push(DeleteBranchCall {
            repository: repo.full_name.clone(),
            branch: branch.to_string(),
        });
        Ok(())
    }

    async fn get_rate_limit(&self, _cancel: &CancellationToken) -> Result<RateLimit> {
        Ok(RateLimit {
            limit: 5_000,
            remaining: 5_000,
            reset_at: None,
        })
    }
}

// === Fixtures ===

/// An open, unlabelled, mergeable pull request.
pub fn open_pr(number: u64, author: &str) -> PullRequest {
    PullRequest {
        number,
        title: format!("Bump dependency #{number}"),
        body: Some("automated dependency update".to_string()),
        author: author.to_string(),
        labels: vec![],
        head_ref: format!("update/{number}"),
        head_sha: format!("sha{number}"),
        base_ref: "main".to_string(),
        state: PrState::Open,
        draft: false,
        locked: false,
        mergeable: Some(true),
        approvals: 1,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        html_url: format!("https://example.invalid/pr/{number}"),
    }
}

/// A policy entry with squash strategy and checks required.
pub fn policy(provider: &str, full_name: &str, merge_strategy: &str) -> RepoPolicy {
    RepoPolicy {
        full_name: full_name.to_string(),
        provider: provider.to_string(),
        merge_strategy: merge_strategy.to_string(),
        skip_labels: vec![],
        require_checks: true,
        min_approvals: 1,
        auto_merge: true,
    }
}

/// A config with the given policies and a small concurrency ceiling.
pub fn config_with(policies: Vec<RepoPolicy>) -> Arc<Config> {
    let mut config = Config::default();
    config.repositories = policies;
    config.behavior.concurrency = 4;
    Arc::new(config)
}
