//! GitLab provider implementation for botmerge-tools.
//!
//! This crate implements the [`botmerge_core::Provider`] contract against the
//! GitLab REST API v4, translating merge requests into the unified pull
//! request model.

mod client;
mod types;

pub use client::GitLabClient;

/// Default GitLab instance URL.
pub const DEFAULT_GITLAB_URL: &str = "https://gitlab.com";
