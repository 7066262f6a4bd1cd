//! GitHub provider implementation for botmerge-tools.
//!
//! This crate implements the [`botmerge_core::Provider`] contract against the
//! GitHub REST API: pull request discovery, combined status and check-run
//! lookups, and merging.

mod client;
mod types;

pub use client::GitHubClient;

/// Default GitHub API URL.
pub const DEFAULT_GITHUB_URL: &str = "https://api.github.com";
