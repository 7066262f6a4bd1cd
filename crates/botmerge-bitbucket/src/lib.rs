//! Bitbucket Cloud provider implementation for botmerge-tools.
//!
//! This crate implements the [`botmerge_core::Provider`] contract against the
//! Bitbucket Cloud 2.0 API. Bitbucket's paged envelopes and vocabulary
//! (OPEN/MERGED/DECLINED states, build statuses instead of checks) are
//! normalized onto the unified core types.

mod client;
mod types;

pub use client::BitbucketClient;

/// Default Bitbucket Cloud API URL.
pub const DEFAULT_BITBUCKET_URL: &str = "https://api.bitbucket.org";
