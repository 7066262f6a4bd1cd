//! Core types, provider contract, and concurrency primitives for
//! botmerge-tools.
//!
//! This crate provides the foundational abstractions used across all
//! botmerge components: the shared value objects and error taxonomy, the
//! [`Provider`] capability trait every hosting backend implements, the
//! configuration model, and the three resilience primitives the pipelines
//! are built on — bounded parallel execution, token-bucket rate limiting,
//! and exponential-backoff retry.

pub mod config;
pub mod error;
pub mod parallel;
pub mod provider;
pub mod ratelimit;
pub mod retry;
pub mod types;

pub use error::{Error, Result};
pub use parallel::ParallelExecutor;
pub use provider::Provider;
pub use ratelimit::{RateLimiter, RateLimiterConfig, RateLimiterManager, RateLimiterState};
pub use retry::{retry, RetryConfig};
