//! Text-generation providers for Cardwise.
//!
//! All providers implement the `cardwise_core::Provider` trait. The factory
//! builds the configured backend and wraps it in the shared retry and
//! rate-limit guard.

pub mod factory;
pub mod openai_compat;
pub mod rate_limit;
pub mod retry;

pub use factory::{build_from_config, guard};
pub use openai_compat::OpenAiCompatProvider;
pub use rate_limit::RateLimiter;
pub use retry::{GuardedProvider, RetryPolicy};
