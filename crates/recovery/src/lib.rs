//! Error recovery for the order orchestration engine.
//!
//! Transient failures route through [`RetryExecutor`]: a named [`RetryPolicy`]
//! drives bounded retries with backoff, an optional circuit breaker sheds load
//! once a component keeps failing, and a [`FallbackStrategy`] produces a
//! degraded-but-useful answer when retries are exhausted. Business-level
//! failures that need undoing route through [`CompensationCoordinator`], which
//! walks a named template of compensating actions and rolls back on partial
//! failure.
//!
//! Every terminal outcome is a tagged [`RecoveryResult`] and is forwarded to
//! the audit sink exactly once. Callers never see a panic or an error for an
//! operation that merely failed; only an unknown compensation template is an
//! error.

pub mod breaker;
pub mod compensation;
pub mod error;
pub mod executor;
pub mod fallback;
pub mod policy;
pub mod result;

pub use breaker::{BreakerStatus, CircuitBreakers, CircuitState};
pub use compensation::{
    ActionPriority, CompensationCoordinator, CompensationKind, CompensationRegistry,
    CompensationTemplate, InMemoryStepRunner, StepRunner,
};
pub use error::{OperationError, RecoveryError, Result};
pub use executor::RetryExecutor;
pub use fallback::{BuiltinFallbacks, FallbackHandler, FallbackStrategy};
pub use policy::{BackoffStrategy, CircuitBreakerConfig, PolicyName, PolicyRegistry, RetryPolicy};
pub use result::{RecoveryAction, RecoveryResult};
