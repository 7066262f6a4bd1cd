//! Pull request discovery and readiness evaluation.
//!
//! For every configured repository in scope the processor fetches the open
//! pull requests, applies the policy filters (author, skip labels, age) and
//! the readiness rules (open, non-draft, non-locked, mergeable, checks), and
//! emits one [`ProcessResult`] per repository. Failures are isolated:
//! a repository whose discovery fails gets a repo-level error, a PR whose
//! status lookup fails gets a per-PR error, and the rest of the batch
//! continues.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use botmerge_core::config::{Config, RepoPolicy};
use botmerge_core::types::{
    Check, PrFilter, PrStatus, ProcessResult, ProcessedPr, PullRequest,
};
use botmerge_core::{Error, ParallelExecutor, Provider, Result};

/// Call-site options for one discovery run.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Restrict the run to these providers; empty means all configured
    pub providers: Vec<String>,
    /// Restrict the run to repositories whose full name contains this string
    pub repo_filter: Option<String>,
    /// Override the configured maximum PR age
    pub max_age: Option<Duration>,
    /// Override the per-repository check requirement
    pub require_checks: Option<bool>,
    /// Additional skip labels for this run, merged with the configured sets
    pub skip_labels: Vec<String>,
    /// Include closed/merged PRs in discovery (they still evaluate as not
    /// ready)
    pub include_closed: bool,
}

/// Discovers pull requests across the configured repositories and evaluates
/// their readiness.
pub struct Processor {
    config: Arc<Config>,
    providers: HashMap<String, Arc<dyn Provider>>,
    executor: ParallelExecutor,
}

impl Processor {
    pub fn new(config: Arc<Config>, providers: HashMap<String, Arc<dyn Provider>>) -> Self {
        let executor = ParallelExecutor::new(config.behavior.concurrency);
        Self {
            config,
            providers,
            executor,
        }
    }

    /// Evaluates every repository in scope and returns exactly one
    /// [`ProcessResult`] per (provider, repository) pair.
    ///
    /// Fails only when the requested scope resolves to zero repositories,
    /// when an explicitly requested provider has no handle, or on
    /// cancellation. Result order is not significant; correlate by
    /// (provider, repository).
    pub async fn process_all(
        &self,
        cancel: &CancellationToken,
        options: &ProcessOptions,
    ) -> Result<Vec<ProcessResult>> {
        let scope = self.resolve_scope(options)?;
        if scope.is_empty() {
            return Err(Error::NoRepositoriesInScope);
        }
        debug!(repositories = scope.len(), "resolved discovery scope");

        let results: Arc<Mutex<Vec<ProcessResult>>> =
            Arc::new(Mutex::new(Vec::with_capacity(scope.len())));
        let mut tasks = Vec::new();

        for policy in scope {
            let Some(provider) = self.providers.get(&policy.provider).cloned() else {
                results.lock().expect("result lock poisoned").push(ProcessResult::failed(
                    policy.provider.clone(),
                    policy.full_name.clone(),
                    Error::ProviderNotFound(policy.provider.clone()),
                ));
                continue;
            };

            let run = RepoRun {
                provider,
                policy,
                config: self.config.clone(),
                options: options.clone(),
            };
            let results = results.clone();
            tasks.push(move |token: CancellationToken| async move {
                let result = run.process(&token).await?;
                results
                    .lock()
                    .expect("result lock poisoned")
                    .push(result);
                Ok(())
            });
        }

        self.executor.execute(cancel, tasks).await?;

        let results = std::mem::take(
            &mut *results.lock().expect("result lock poisoned"),
        );
        log_summary(&results);
        Ok(results)
    }

    /// Resolves the (provider, repository) pairs in scope for a run.
    fn resolve_scope(&self, options: &ProcessOptions) -> Result<Vec<RepoPolicy>> {
        for name in &options.providers {
            if !self.providers.contains_key(name) {
                return Err(Error::ProviderNotFound(name.clone()));
            }
        }
        Ok(self
            .config
            .repositories
            .iter()
            .filter(|r| options.providers.is_empty() || options.providers.contains(&r.provider))
            .filter(|r| {
                options
                    .repo_filter
                    .as_deref()
                    .is_none_or(|f| r.full_name.contains(f))
            })
            .cloned()
            .collect())
    }
}

/// One repository's discovery task.
struct RepoRun {
    provider: Arc<dyn Provider>,
    policy: RepoPolicy,
    config: Arc<Config>,
    options: ProcessOptions,
}

impl RepoRun {
    /// Processes one repository.
    ///
    /// Returns `Err` only on cancellation; every other failure is recorded
    /// inside the returned [`ProcessResult`].
    async fn process(&self, cancel: &CancellationToken) -> Result<ProcessResult> {
        let provider_name = self.policy.provider.clone();
        let full_name = self.policy.full_name.clone();

        let (owner, name) = match botmerge_core::types::Repository::split_full_name(&full_name) {
            Ok(parts) => parts,
            Err(err) => return Ok(ProcessResult::failed(provider_name, full_name, err)),
        };

        let repo_lookup = self.provider.get_repository(cancel, owner, name).await;
        let repo = match repo_lookup {
            Ok(repo) => repo,
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                debug!(repository = %full_name, error = %err, "repository lookup failed");
                return Ok(ProcessResult::failed(provider_name, full_name, err));
            }
        };

        let now = Utc::now();
        let max_age = self.max_age();
        let filter = PrFilter {
            state: if self.options.include_closed {
                None
            } else {
                Some("open".to_string())
            },
            since: max_age.map(|age| now - age),
        };

        let listing = self.provider.list_pull_requests(cancel, &repo, &filter).await;
        let prs = match listing {
            Ok(prs) => prs,
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                debug!(repository = %full_name, error = %err, "pull request listing failed");
                return Ok(ProcessResult::failed(provider_name, full_name, err));
            }
        };

        let skip_labels = self.skip_labels();
        let require_checks = self
            .options
            .require_checks
            .unwrap_or(self.policy.require_checks);

        let mut processed = Vec::with_capacity(prs.len());
        for pr in prs {
            processed.push(self.evaluate(cancel, &repo, pr, &skip_labels, require_checks, max_age, now).await?);
        }

        debug!(
            repository = %full_name,
            total = processed.len(),
            ready = processed.iter().filter(|p| p.ready).count(),
            "repository processed"
        );
        Ok(ProcessResult {
            provider: provider_name,
            repository: full_name,
            pull_requests: processed,
            error: None,
        })
    }

    /// Evaluates one pull request.
    ///
    /// Returns `Err` only on cancellation; per-PR failures are recorded on
    /// the verdict so the PR is never dropped from the result set.
    async fn evaluate(
        &self,
        cancel: &CancellationToken,
        repo: &botmerge_core::types::Repository,
        pr: PullRequest,
        skip_labels: &[String],
        require_checks: bool,
        max_age: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<ProcessedPr> {
        // Policy filters short-circuit before any further network calls.
        if let Some(reason) = skip_reason(
            &pr,
            &self.config.allowed_actors,
            skip_labels,
            max_age,
            now,
        ) {
            return Ok(ProcessedPr::skipped(pr, reason));
        }

        let status_lookup = self.provider.get_pr_status(cancel, repo, &pr).await;
        let status = match status_lookup {
            Ok(status) => status,
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => return Ok(ProcessedPr::errored(pr, err)),
        };
        let checks_lookup = self.provider.get_checks(cancel, repo, &pr).await;
        let checks = match checks_lookup {
            Ok(checks) => checks,
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => return Ok(ProcessedPr::errored(pr, err)),
        };

        Ok(match readiness_reason(&pr, &status, &checks, require_checks) {
            None => ProcessedPr::ready(pr, Some(status), checks),
            Some(reason) => ProcessedPr::not_ready(pr, reason, Some(status), checks),
        })
    }

    /// Effective maximum age for this run.
    fn max_age(&self) -> Option<Duration> {
        self.options.max_age.or_else(|| {
            (self.config.max_age_days > 0)
                .then(|| Duration::days(self.config.max_age_days as i64))
        })
    }

    /// Global, per-repository, and call-site skip labels, merged.
    fn skip_labels(&self) -> Vec<String> {
        let mut labels = self.config.skip_labels.clone();
        labels.extend(self.policy.skip_labels.iter().cloned());
        labels.extend(self.options.skip_labels.iter().cloned());
        labels.sort_unstable();
        labels.dedup();
        labels
    }
}

/// Applies the policy filters in order: author, skip label, age.
///
/// Returns the first matching skip reason, or `None` when the PR survives
/// all three.
pub fn skip_reason(
    pr: &PullRequest,
    allowed_actors: &[String],
    skip_labels: &[String],
    max_age: Option<Duration>,
    now: DateTime<Utc>,
) -> Option<String> {
    if !allowed_actors.is_empty() && !allowed_actors.iter().any(|a| a == &pr.author) {
        return Some(format!("author '{}' not in allowed actors", pr.author));
    }
    if let Some(label) = pr.labels.iter().find(|l| skip_labels.contains(l)) {
        return Some(format!("skip label '{label}' present"));
    }
    if let Some(max_age) = max_age {
        if pr.age(now) > max_age {
            return Some(format!(
                "pull request exceeds maximum age ({} days)",
                max_age.num_days()
            ));
        }
    }
    None
}

/// Evaluates the readiness conditions in their fixed order.
///
/// Returns the first violated condition, or `None` when the PR is ready to
/// merge. When checks are required, the aggregate status is consulted first
/// and then each individual check in listing order — the first bad check
/// supplies the reason.
pub fn readiness_reason(
    pr: &PullRequest,
    status: &PrStatus,
    checks: &[Check],
    require_checks: bool,
) -> Option<String> {
    if pr.state != botmerge_core::types::PrState::Open {
        return Some("pull request is not open".to_string());
    }
    if pr.draft {
        return Some("pull request is a draft".to_string());
    }
    if pr.locked {
        return Some("pull request is locked".to_string());
    }
    if pr.mergeable == Some(false) {
        return Some("pull request is not mergeable".to_string());
    }
    if require_checks {
        if !status.all_success {
            return Some(format!("aggregate status is '{}'", status.state));
        }
        for check in checks {
            if check.failed {
                return Some(format!("check '{}' failed", check.name));
            }
            if !check.completed {
                return Some(format!("check '{}' has not completed", check.name));
            }
        }
    }
    None
}

/// Emits the structured summary counts for one discovery run.
fn log_summary(results: &[ProcessResult]) {
    let mut total = 0usize;
    let mut ready = 0usize;
    let mut skipped = 0usize;
    let mut errors = results.iter().filter(|r| r.error.is_some()).count();
    for result in results {
        for pr in &result.pull_requests {
            total += 1;
            if pr.ready {
                ready += 1;
            }
            if pr.skipped {
                skipped += 1;
            }
            if pr.error.is_some() {
                errors += 1;
            }
        }
    }
    info!(
        repositories = results.len(),
        total, ready, skipped, errors, "pull request processing complete"
    );
}
