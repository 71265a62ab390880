//! # bulwark-resilience
//!
//! Classification, rate governance, circuit breaking and retry scheduling
//! for outbound calls, tied together by [`ResilientInvoker`].
//!
//! ```no_run
//! use bulwark_core::{Dependency, OperationKind, RawResult};
//! use bulwark_resilience::{Operation, ResilienceContext, ResilientInvoker};
//!
//! # async fn run() -> Result<(), bulwark_resilience::InvokeError> {
//! let invoker = ResilientInvoker::default();
//! let mut ctx = ResilienceContext::default();
//!
//! let op = Operation::new(Dependency::GithubApi, OperationKind::Read, || async {
//!     RawResult::http(200, "[]")
//! });
//! let success = invoker.call(&mut ctx, op).await?;
//! assert_eq!(success.attempts, 1);
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod circuit_breaker;
pub mod classifier;
pub mod governor;
pub mod invoker;
pub mod report;

pub use backoff::{Backoff, BackoffScheduler, RetryContext};
pub use circuit_breaker::{CircuitBreaker, CircuitState, CircuitStatus};
pub use classifier::{
    classify, conflicting_files, ErrorClassifier, CONFLICT_MARKERS, CONFLICT_TOKEN,
    GIT_TRANSIENT_MARKERS, PATTERN_VERSION, PROTECTION_MARKERS,
};
pub use governor::RateGovernor;
pub use invoker::{
    ClassifiedFailure, InvokeError, Operation, ResilienceContext, ResilientInvoker, Success,
};
pub use report::{render_conflict, render_failure, render_preflight};
