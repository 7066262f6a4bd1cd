//! Provider construction from configuration and stored credentials.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use botmerge_core::config::Config;
use botmerge_core::{Provider, RateLimiterManager};
use botmerge_storage::CredentialStore;
use tracing::{debug, warn};

use botmerge_bitbucket::BitbucketClient;
use botmerge_github::GitHubClient;
use botmerge_gitlab::GitLabClient;

/// Builds an authenticated provider handle for every provider referenced by
/// the configuration.
///
/// Tokens come from `{PROVIDER}_TOKEN` environment variables first, then the
/// credential store under `{provider}/token`. Providers without a resolvable
/// credential are skipped with a warning; the engine then reports them as
/// not configured on a per-repository basis.
pub fn build_providers(
    config: &Config,
    store: &dyn CredentialStore,
) -> HashMap<String, Arc<dyn Provider>> {
    let limiters = RateLimiterManager::new(config.behavior.rate_limit.to_limiter_config());
    let retry = config.behavior.retry.to_retry_config();

    let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
    for name in config.configured_providers() {
        let Some(token) = resolve_token(name, store) else {
            warn!(provider = name, "no credential found, provider disabled");
            continue;
        };
        let limiter = limiters.get(name);

        match name {
            "github" => {
                let base_url = config
                    .github
                    .as_ref()
                    .and_then(|c| c.base_url.clone())
                    .unwrap_or_else(|| botmerge_github::DEFAULT_GITHUB_URL.to_string());
                providers.insert(
                    name.to_string(),
                    Arc::new(GitHubClient::with_base_url(
                        base_url,
                        token,
                        limiter,
                        retry.clone(),
                    )),
                );
            }
            "gitlab" => {
                let url = config
                    .gitlab
                    .as_ref()
                    .map(|c| c.url.clone())
                    .unwrap_or_else(|| botmerge_gitlab::DEFAULT_GITLAB_URL.to_string());
                providers.insert(
                    name.to_string(),
                    Arc::new(GitLabClient::with_base_url(
                        url,
                        token,
                        limiter,
                        retry.clone(),
                    )),
                );
            }
            "bitbucket" => {
                let Some(settings) = config.bitbucket.as_ref() else {
                    warn!("bitbucket repositories configured without a [bitbucket] section");
                    continue;
                };
                providers.insert(
                    name.to_string(),
                    Arc::new(BitbucketClient::with_base_url(
                        settings.base_url.clone(),
                        settings.username.clone(),
                        token,
                        limiter,
                        retry.clone(),
                    )),
                );
            }
            other => {
                warn!(provider = other, "unknown provider in configuration");
            }
        }
    }

    debug!(count = providers.len(), "providers constructed");
    providers
}

/// Resolves a provider token from the environment or the credential store.
fn resolve_token(provider: &str, store: &dyn CredentialStore) -> Option<String> {
    let env_var = format!("{}_TOKEN", provider.to_uppercase());
    if let Ok(token) = env::var(&env_var) {
        if !token.is_empty() {
            debug!(provider, source = %env_var, "token resolved from environment");
            return Some(token);
        }
    }
    match store.get(&format!("{provider}/token")) {
        Ok(Some(token)) => {
            debug!(provider, source = "keychain", "token resolved");
            Some(token)
        }
        Ok(None) => None,
        Err(err) => {
            warn!(provider, error = %err, "credential store lookup failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use botmerge_core::config::RepoPolicy;
    use botmerge_storage::MemoryStore;

    fn config_for(provider: &str) -> Config {
        let mut config = Config::default();
        config.repositories.push(RepoPolicy {
            full_name: "octo/widgets".to_string(),
            provider: provider.to_string(),
            merge_strategy: "squash".to_string(),
            skip_labels: vec![],
            require_checks: true,
            min_approvals: 1,
            auto_merge: false,
        });
        config
    }

    #[test]
    fn providers_without_credentials_are_skipped() {
        let store = MemoryStore::new();
        let providers = build_providers(&config_for("gitlab"), &store);
        assert!(providers.is_empty());
    }

    #[test]
    fn stored_credential_enables_a_provider() {
        let store = MemoryStore::new();
        store.store("gitlab/token", "glpat-test").unwrap();
        let providers = build_providers(&config_for("gitlab"), &store);
        assert!(providers.contains_key("gitlab"));
    }

    #[test]
    fn unknown_provider_names_are_ignored() {
        let store = MemoryStore::new();
        store.store("gitea/token", "t").unwrap();
        let providers = build_providers(&config_for("gitea"), &store);
        assert!(providers.is_empty());
    }
}
