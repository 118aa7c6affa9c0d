//! Execution engine for Marionette.
//!
//! Turns decision payloads into gated, policy-checked, humanized action
//! dispatches against a partially observable application, with per-intent
//! retry, abort-on-change, and structured trace logging.

pub mod cancel;
pub mod error;
pub mod executor;
pub mod gate;
pub mod intent;
pub mod orchestrator;
pub mod policy;
pub mod timing;
pub mod trace;

pub use cancel::{CancelToken, InstantSleeper, SlicedSleeper, Sleeper};
pub use error::EngineError;
pub use executor::{DryRunExecutor, Executor, LoggingExecutor, ScriptedExecutor};
pub use gate::PanicMatcher;
pub use intent::{
    ActionIntent, ActionResult, DecisionAction, DecisionPayload, GateSpec, Precondition,
};
pub use orchestrator::Orchestrator;
pub use policy::{ActionPolicy, ApprovalPolicy, PolicyEnforcer, RateLimiter};
pub use trace::{ActionLogger, ContextLogger, ExecutionSummary, ExecutionTrace};
