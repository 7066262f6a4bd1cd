//! Integration tests for the discovery/readiness pipeline.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::{config_with, open_pr, policy, MockProvider};
use tokio_util::sync::CancellationToken;

use botmerge_core::types::{Check, PrStatus};
use botmerge_core::{Error, Provider};
use botmerge_engine::{ProcessOptions, Processor};

fn providers(
    entries: Vec<(&str, Arc<MockProvider>)>,
) -> HashMap<String, Arc<dyn Provider>> {
    entries
        .into_iter()
        .map(|(name, p)| (name.to_string(), p as Arc<dyn Provider>))
        .collect()
}

#[tokio::test]
async fn one_result_per_configured_repository() {
    let github = MockProvider::new("github");
    github.add_repo("octo/widgets");
    github.add_repo("octo/gadgets");
    github.add_pr("octo/widgets", open_pr(1, "dependabot[bot]"));

    let gitlab = MockProvider::new("gitlab");
    gitlab.add_repo("group/tools");

    let config = config_with(vec![
        policy("github", "octo/widgets", "squash"),
        policy("github", "octo/gadgets", "squash"),
        policy("gitlab", "group/tools", "merge"),
    ]);
    let processor = Processor::new(
        config,
        providers(vec![("github", github), ("gitlab", gitlab)]),
    );

    let results = processor
        .process_all(&CancellationToken::new(), &ProcessOptions::default())
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    let mut pairs: Vec<(String, String)> = results
        .iter()
        .map(|r| (r.provider.clone(), r.repository.clone()))
        .collect();
    pairs.sort();
    pairs.dedup();
    assert_eq!(pairs.len(), 3, "no duplicate (provider, repository) pairs");
}

#[tokio::test]
async fn allowed_actors_scenario() {
    let github = MockProvider::new("github");
    github.add_repo("owner/repo1");
    github.add_pr("owner/repo1", open_pr(1, "dependabot[bot]"));
    github.add_pr("owner/repo1", open_pr(2, "random-user"));

    let mut config = botmerge_core::config::Config::default();
    config.repositories = vec![policy("github", "owner/repo1", "squash")];
    config.allowed_actors = vec!["dependabot[bot]".to_string()];
    let processor = Processor::new(Arc::new(config), providers(vec![("github", github)]));

    let results = processor
        .process_all(&CancellationToken::new(), &ProcessOptions::default())
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    let prs = &results[0].pull_requests;
    assert_eq!(prs.len(), 2);

    let first = prs.iter().find(|p| p.pull_request.number == 1).unwrap();
    assert!(first.ready);
    assert!(!first.skipped);
    assert_eq!(first.reason, "ready to merge");

    let second = prs.iter().find(|p| p.pull_request.number == 2).unwrap();
    assert!(second.skipped);
    assert!(!second.ready, "a skipped PR is never ready");
    assert!(second.reason.contains("not in allowed actors"));
}

#[tokio::test]
async fn repository_error_is_isolated() {
    let github = MockProvider::new("github");
    github.add_repo("octo/widgets");
    github.add_pr("octo/widgets", open_pr(1, "dependabot[bot]"));
    github.fail_repo("octo/broken", "internal error");

    let config = config_with(vec![
        policy("github", "octo/widgets", "squash"),
        policy("github", "octo/broken", "squash"),
    ]);
    let processor = Processor::new(config, providers(vec![("github", github)]));

    let results = processor
        .process_all(&CancellationToken::new(), &ProcessOptions::default())
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    let broken = results
        .iter()
        .find(|r| r.repository == "octo/broken")
        .unwrap();
    assert!(broken.error.is_some());
    assert!(broken.pull_requests.is_empty());

    let healthy = results
        .iter()
        .find(|r| r.repository == "octo/widgets")
        .unwrap();
    assert!(healthy.error.is_none());
    assert_eq!(healthy.pull_requests.len(), 1);
}

#[tokio::test]
async fn pr_level_error_is_recorded_not_dropped() {
    let github = MockProvider::new("github");
    github.add_repo("octo/widgets");
    github.add_pr("octo/widgets", open_pr(1, "dependabot[bot]"));
    github.add_pr("octo/widgets", open_pr(2, "dependabot[bot]"));
    github.fail_status("octo/widgets", 1, "bad gateway");

    let config = config_with(vec![policy("github", "octo/widgets", "squash")]);
    let processor = Processor::new(config, providers(vec![("github", github)]));

    let results = processor
        .process_all(&CancellationToken::new(), &ProcessOptions::default())
        .await
        .unwrap();

    let prs = &results[0].pull_requests;
    assert_eq!(prs.len(), 2, "the failing PR stays in the result set");

    let failed = prs.iter().find(|p| p.pull_request.number == 1).unwrap();
    assert!(!failed.ready);
    assert!(failed.error.as_deref().unwrap().contains("bad gateway"));

    let ok = prs.iter().find(|p| p.pull_request.number == 2).unwrap();
    assert!(ok.ready);
}

#[tokio::test]
async fn empty_scope_is_an_error() {
    let github = MockProvider::new("github");
    let config = config_with(vec![policy("github", "octo/widgets", "squash")]);
    let processor = Processor::new(config, providers(vec![("github", github)]));

    let options = ProcessOptions {
        repo_filter: Some("no-such-repo".to_string()),
        ..Default::default()
    };
    let err = processor
        .process_all(&CancellationToken::new(), &options)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoRepositoriesInScope));
}

#[tokio::test]
async fn unknown_requested_provider_is_an_error() {
    let github = MockProvider::new("github");
    let config = config_with(vec![policy("github", "octo/widgets", "squash")]);
    let processor = Processor::new(config, providers(vec![("github", github)]));

    let options = ProcessOptions {
        providers: vec!["gitea".to_string()],
        ..Default::default()
    };
    let err = processor
        .process_all(&CancellationToken::new(), &options)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ProviderNotFound(name) if name == "gitea"));
}

#[tokio::test]
async fn failing_required_check_blocks_readiness_with_its_name() {
    let github = MockProvider::new("github");
    github.add_repo("octo/widgets");
    github.add_pr("octo/widgets", open_pr(7, "dependabot[bot]"));
    github.set_checks(
        "octo/widgets",
        7,
        vec![
            Check {
                name: "build".to_string(),
                completed: true,
                failed: false,
            },
            Check {
                name: "integration-tests".to_string(),
                completed: true,
                failed: true,
            },
        ],
    );

    let config = config_with(vec![policy("github", "octo/widgets", "squash")]);
    let processor = Processor::new(config, providers(vec![("github", github)]));

    let results = processor
        .process_all(&CancellationToken::new(), &ProcessOptions::default())
        .await
        .unwrap();

    let pr = &results[0].pull_requests[0];
    assert!(!pr.ready);
    assert!(pr.reason.contains("integration-tests"));
}

#[tokio::test]
async fn draft_and_failed_status_block_readiness() {
    let github = MockProvider::new("github");
    github.add_repo("octo/widgets");

    let mut draft = open_pr(1, "dependabot[bot]");
    draft.draft = true;
    github.add_pr("octo/widgets", draft);

    github.add_pr("octo/widgets", open_pr(2, "dependabot[bot]"));
    github.set_status(
        "octo/widgets",
        2,
        PrStatus {
            state: "failure".to_string(),
            all_success: false,
        },
    );

    let config = config_with(vec![policy("github", "octo/widgets", "squash")]);
    let processor = Processor::new(config, providers(vec![("github", github)]));

    let results = processor
        .process_all(&CancellationToken::new(), &ProcessOptions::default())
        .await
        .unwrap();

    let prs = &results[0].pull_requests;
    let first = prs.iter().find(|p| p.pull_request.number == 1).unwrap();
    assert_eq!(first.reason, "pull request is a draft");

    let second = prs.iter().find(|p| p.pull_request.number == 2).unwrap();
    assert!(second.reason.contains("aggregate status"));
}

#[tokio::test]
async fn processing_is_idempotent_for_identical_responses() {
    let github = MockProvider::new("github");
    github.add_repo("octo/widgets");
    github.add_pr("octo/widgets", open_pr(1, "dependabot[bot]"));
    github.add_pr("octo/widgets", open_pr(2, "stranger"));

    let mut config = botmerge_core::config::Config::default();
    config.repositories = vec![policy("github", "octo/widgets", "squash")];
    config.allowed_actors = vec!["dependabot[bot]".to_string()];
    let processor = Processor::new(Arc::new(config), providers(vec![("github", github)]));

    let cancel = CancellationToken::new();
    let first = processor
        .process_all(&cancel, &ProcessOptions::default())
        .await
        .unwrap();
    let second = processor
        .process_all(&cancel, &ProcessOptions::default())
        .await
        .unwrap();

    let verdicts = |results: &[botmerge_core::types::ProcessResult]| {
        let mut v: Vec<(u64, bool, bool, String)> = results
            .iter()
            .flat_map(|r| r.pull_requests.iter())
            .map(|p| (p.pull_request.number, p.ready, p.skipped, p.reason.clone()))
            .collect();
        v.sort();
        v
    };
    assert_eq!(verdicts(&first), verdicts(&second));
}

#[tokio::test]
async fn cancellation_aborts_the_run() {
    let github = MockProvider::new("github");
    github.add_repo("octo/widgets");
    let config = config_with(vec![policy("github", "octo/widgets", "squash")]);
    let processor = Processor::new(config, providers(vec![("github", github)]));

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = processor
        .process_all(&cancel, &ProcessOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
}
