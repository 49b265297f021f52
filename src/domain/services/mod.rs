mod backoff;
mod target_resolver;

pub use backoff::{BackoffPolicy, RetryDecision};
pub use target_resolver::TargetResolver;
