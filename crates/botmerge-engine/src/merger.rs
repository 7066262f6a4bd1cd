//! Merge execution over processor output.
//!
//! The merger walks every [`ProcessedPr`] in a set of [`ProcessResult`]s,
//! turns policy skips into skipped results without touching the provider,
//! and dispatches the remaining merge submissions through the bounded
//! parallel executor. Merge failures are isolated per PR — a failed merge
//! never aborts the rest of the batch — and every submitted PR produces
//! exactly one [`MergeResult`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use botmerge_core::config::Config;
use botmerge_core::types::{
    CommitMessage, MergeMethod, MergeResult, ProcessResult, ProcessedPr, PullRequest, Repository,
};
use botmerge_core::{Error, ParallelExecutor, Provider, Result};

/// Call-site options for one merge run.
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Report what would be merged without calling any provider
    pub dry_run: bool,
    /// Merge PRs even when they were skipped or evaluated as not ready
    pub force: bool,
    /// Delete the head branch after a successful merge
    pub delete_branches: bool,
    /// Override the generated commit title (and clear the body)
    pub custom_message: Option<String>,
    /// Enforce the per-repository minimum approval count
    pub require_approval: bool,
}

/// Executes merges for the ready PRs in a set of process results.
pub struct Merger {
    config: Arc<Config>,
    providers: HashMap<String, Arc<dyn Provider>>,
    executor: ParallelExecutor,
}

impl Merger {
    pub fn new(config: Arc<Config>, providers: HashMap<String, Arc<dyn Provider>>) -> Self {
        let executor = ParallelExecutor::new(config.behavior.concurrency);
        Self {
            config,
            providers,
            executor,
        }
    }

    /// Merges every eligible PR in `results`.
    ///
    /// Result order is not significant; correlate by (provider, repository,
    /// PR number). Fails only on cancellation.
    pub async fn merge_all(
        &self,
        cancel: &CancellationToken,
        results: &[ProcessResult],
        options: &MergeOptions,
    ) -> Result<Vec<MergeResult>> {
        let outcomes: Arc<Mutex<Vec<MergeResult>>> = Arc::new(Mutex::new(Vec::new()));
        let mut tasks = Vec::new();

        for result in results {
            if let Some(error) = &result.error {
                debug!(
                    repository = %result.repository,
                    error = %error,
                    "skipping repository with discovery error"
                );
                continue;
            }

            for pr in &result.pull_requests {
                // Policy skips and not-ready verdicts are settled without a
                // provider call.
                if pr.skipped && !options.force {
                    outcomes
                        .lock()
                        .expect("outcome lock poisoned")
                        .push(base_result(result, pr, |r| {
                            r.skipped = true;
                            r.reason = pr.reason.clone();
                        }));
                    continue;
                }
                if !pr.ready && !options.force {
                    outcomes
                        .lock()
                        .expect("outcome lock poisoned")
                        .push(base_result(result, pr, |r| {
                            r.skipped = true;
                            r.reason = pr.reason.clone();
                        }));
                    continue;
                }

                let submission = Submission {
                    provider_name: result.provider.clone(),
                    repository: result.repository.clone(),
                    pr: pr.clone(),
                    provider: self.providers.get(&result.provider).cloned(),
                    config: self.config.clone(),
                    options: options.clone(),
                };
                let outcomes = outcomes.clone();
                tasks.push(move |token: CancellationToken| async move {
                    let outcome = submission.merge(&token).await?;
                    outcomes
                        .lock()
                        .expect("outcome lock poisoned")
                        .push(outcome);
                    Ok(())
                });
            }
        }

        self.executor.execute(cancel, tasks).await?;

        let outcomes = std::mem::take(
            &mut *outcomes.lock().expect("outcome lock poisoned"),
        );
        log_summary(&outcomes, options.dry_run);
        Ok(outcomes)
    }
}

/// One PR submitted for merging.
struct Submission {
    provider_name: String,
    repository: String,
    pr: ProcessedPr,
    provider: Option<Arc<dyn Provider>>,
    config: Arc<Config>,
    options: MergeOptions,
}

impl Submission {
    /// Merges one PR.
    ///
    /// Returns `Err` only on cancellation; every other failure is recorded
    /// inside the returned [`MergeResult`].
    async fn merge(&self, cancel: &CancellationToken) -> Result<MergeResult> {
        let pr = &self.pr.pull_request;

        let Some(policy) = self
            .config
            .policy_for(&self.provider_name, &self.repository)
        else {
            return Ok(self.result(|r| {
                r.reason = "no policy entry".to_string();
                r.error = Some("repository configuration not found".to_string());
            }));
        };

        let Some(provider) = &self.provider else {
            return Ok(self.result(|r| {
                r.reason = "no provider handle".to_string();
                r.error = Some(Error::ProviderNotFound(self.provider_name.clone()).to_string());
            }));
        };

        if self.options.require_approval && pr.approvals < policy.min_approvals {
            return Ok(self.result(|r| {
                r.skipped = true;
                r.reason = format!(
                    "insufficient approvals ({} of {})",
                    pr.approvals, policy.min_approvals
                );
            }));
        }

        let method = policy
            .merge_strategy
            .parse()
            .unwrap_or(MergeMethod::Squash);
        let message = commit_message(method, pr, self.options.custom_message.as_deref());

        if self.options.dry_run {
            return Ok(self.result(|r| {
                r.success = true;
                r.merge_method = Some(method);
                r.reason = "dry run - would merge".to_string();
            }));
        }

        let repo = repository_stub(&self.provider_name, &self.repository, &pr.base_ref);
        match provider
            .merge_pull_request(cancel, &repo, pr, method, &message)
            .await
        {
            Ok(sha) => {
                if self.options.delete_branches {
                    self.delete_head_branch(cancel, provider.as_ref(), &repo).await?;
                }
                Ok(self.result(|r| {
                    r.success = true;
                    r.merge_method = Some(method);
                    r.merged_at = Some(Utc::now());
                    r.commit_sha = sha;
                    r.reason = "merged".to_string();
                }))
            }
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => {
                debug!(
                    repository = %self.repository,
                    number = pr.number,
                    error = %err,
                    "merge failed"
                );
                Ok(self.result(|r| {
                    r.merge_method = Some(method);
                    r.reason = "merge failed".to_string();
                    r.error = Some(err.to_string());
                }))
            }
        }
    }

    /// Deletes the head branch after a successful merge.
    ///
    /// The merge already landed, so a deletion failure only logs a warning
    /// and never fails the result.
    async fn delete_head_branch(
        &self,
        cancel: &CancellationToken,
        provider: &dyn Provider,
        repo: &Repository,
    ) -> Result<()> {
        let pr = &self.pr.pull_request;
        match provider.delete_branch(cancel, repo, &pr.head_ref).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => {
                warn!(
                    repository = %self.repository,
                    branch = %pr.head_ref,
                    error = %err,
                    "failed to delete head branch after merge"
                );
                Ok(())
            }
        }
    }

    fn result(&self, fill: impl FnOnce(&mut MergeResult)) -> MergeResult {
        let mut result = MergeResult {
            provider: self.provider_name.clone(),
            repository: self.repository.clone(),
            number: self.pr.pull_request.number,
            title: self.pr.pull_request.title.clone(),
            author: self.pr.pull_request.author.clone(),
            merge_method: None,
            merged_at: None,
            commit_sha: None,
            success: false,
            skipped: false,
            reason: String::new(),
            error: None,
        };
        fill(&mut result);
        result
    }
}

/// Builds a skipped/settled result directly from processor output.
fn base_result(
    result: &ProcessResult,
    pr: &ProcessedPr,
    fill: impl FnOnce(&mut MergeResult),
) -> MergeResult {
    let mut merge_result = MergeResult {
        provider: result.provider.clone(),
        repository: result.repository.clone(),
        number: pr.pull_request.number,
        title: pr.pull_request.title.clone(),
        author: pr.pull_request.author.clone(),
        merge_method: None,
        merged_at: None,
        commit_sha: None,
        success: false,
        skipped: false,
        reason: String::new(),
        error: None,
    };
    fill(&mut merge_result);
    merge_result
}

/// Generates the commit title and body for a merge method.
///
/// - squash: `"<title> (#<number>)"` with the PR body
/// - merge: `"Merge pull request #<number> from <head>"` with the PR title
/// - rebase: the PR title with an empty body
///
/// A custom message replaces the title and clears the body.
pub fn commit_message(
    method: MergeMethod,
    pr: &PullRequest,
    custom_message: Option<&str>,
) -> CommitMessage {
    if let Some(title) = custom_message {
        return CommitMessage {
            title: title.to_string(),
            body: String::new(),
        };
    }
    match method {
        MergeMethod::Squash => CommitMessage {
            title: format!("{} (#{})", pr.title, pr.number),
            body: pr.body.clone().unwrap_or_default(),
        },
        MergeMethod::Merge => CommitMessage {
            title: format!("Merge pull request #{} from {}", pr.number, pr.head_ref),
            body: pr.title.clone(),
        },
        MergeMethod::Rebase => CommitMessage {
            title: pr.title.clone(),
            body: String::new(),
        },
    }
}

/// Rebuilds the provider-facing repository value from processor output.
fn repository_stub(provider: &str, full_name: &str, default_branch: &str) -> Repository {
    let (owner, name) = full_name.split_once('/').unwrap_or((full_name, ""));
    Repository {
        provider: provider.to_string(),
        owner: owner.to_string(),
        name: name.to_string(),
        full_name: full_name.to_string(),
        default_branch: default_branch.to_string(),
    }
}

/// Emits the structured summary counts for one merge run.
fn log_summary(outcomes: &[MergeResult], dry_run: bool) {
    let merged = outcomes.iter().filter(|o| o.success).count();
    let skipped = outcomes.iter().filter(|o| o.skipped).count();
    let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
    info!(
        total = outcomes.len(),
        merged, skipped, failed, dry_run, "merge execution complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use botmerge_core::types::PrState;

    fn pr() -> PullRequest {
        PullRequest {
            number: 12,
            title: "Bump tokio".to_string(),
            body: Some("updates tokio to 1.43".to_string()),
            author: "dependabot[bot]".to_string(),
            labels: vec![],
            head_ref: "dependabot/tokio".to_string(),
            head_sha: "abc".to_string(),
            base_ref: "main".to_string(),
            state: PrState::Open,
            draft: false,
            locked: false,
            mergeable: Some(true),
            approvals: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            html_url: String::new(),
        }
    }

    #[test]
    fn squash_message_appends_the_number() {
        let message = commit_message(MergeMethod::Squash, &pr(), None);
        assert_eq!(message.title, "Bump tokio (#12)");
        assert_eq!(message.body, "updates tokio to 1.43");
    }

    #[test]
    fn merge_message_references_the_head_branch() {
        let message = commit_message(MergeMethod::Merge, &pr(), None);
        assert_eq!(message.title, "Merge pull request #12 from dependabot/tokio");
        assert_eq!(message.body, "Bump tokio");
    }

    #[test]
    fn rebase_message_keeps_the_title_and_no_body() {
        let message = commit_message(MergeMethod::Rebase, &pr(), None);
        assert_eq!(message.title, "Bump tokio");
        assert!(message.body.is_empty());
    }

    #[test]
    fn custom_message_overrides_title_and_clears_body() {
        let message = commit_message(
            MergeMethod::Squash,
            &pr(),
            Some("chore: automated dependency merge"),
        );
        assert_eq!(message.title, "chore: automated dependency merge");
        assert!(message.body.is_empty());
    }

    #[test]
    fn repository_stub_splits_the_full_name() {
        let repo = repository_stub("github", "octo/widgets", "main");
        assert_eq!(repo.owner, "octo");
        assert_eq!(repo.name, "widgets");
        assert_eq!(repo.default_branch, "main");
    }
}
