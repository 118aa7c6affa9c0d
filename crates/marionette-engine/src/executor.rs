//! Executor capability boundary.
//!
//! The engine never synthesizes OS input itself; it hands a fully gated and
//! aimed intent to whatever executor is wired in. Input injection lives
//! behind this trait so the whole engine runs identically against a dry-run
//! stub, a scripted test double, or a live backend.

use serde_json::Value;
use tracing::{debug, info};

use marionette_core::FailureReason;

use crate::intent::{resolve_target_point, ActionIntent, ActionResult};

/// Performs one action against the external application.
pub trait Executor: Send {
    fn execute(&mut self, intent: &ActionIntent) -> ActionResult;
}

/// Always succeeds without touching anything; results carry
/// `details.dry_run = true`.
#[derive(Debug, Default)]
pub struct DryRunExecutor;

impl Executor for DryRunExecutor {
    fn execute(&mut self, intent: &ActionIntent) -> ActionResult {
        debug!(intent_id = %intent.intent_id, action = %intent.action_type, "dry-run dispatch");
        ActionResult::success(&intent.intent_id).with_detail("dry_run", Value::Bool(true))
    }
}

/// Live stand-in until an input backend is wired: logs the input it would
/// synthesize and reports success.
///
/// Intents with neither a coordinate point nor a symbolic element reference
/// fail up front, since a real backend could not aim them either.
#[derive(Debug, Default)]
pub struct LoggingExecutor;

impl Executor for LoggingExecutor {
    fn execute(&mut self, intent: &ActionIntent) -> ActionResult {
        let point = resolve_target_point(&intent.target);
        if point.is_none() && !intent.target.contains_key("ui_element_id") {
            return ActionResult::failure(&intent.intent_id, FailureReason::PrecheckFailed)
                .with_detail("missing_target", Value::Bool(true));
        }
        info!(
            intent_id = %intent.intent_id,
            action = %intent.action_type,
            point = ?point,
            "would synthesize input"
        );
        ActionResult::success(&intent.intent_id)
    }
}

/// Test double that replays a scripted sequence of outcomes and counts calls.
///
/// Once the script is exhausted every further call succeeds.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    outcomes: std::collections::VecDeque<ActionResult>,
    calls: Vec<ActionIntent>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes to return in order. The `intent_id` of each queued
    /// result is rewritten to the intent actually dispatched.
    pub fn with_outcomes(outcomes: Vec<ActionResult>) -> Self {
        Self {
            outcomes: outcomes.into(),
            calls: Vec::new(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    /// Every intent dispatched so far, in order.
    pub fn calls(&self) -> &[ActionIntent] {
        &self.calls
    }

    /// Intent ids dispatched so far, for concise assertions.
    pub fn dispatched_ids(&self) -> Vec<String> {
        self.calls.iter().map(|i| i.intent_id.clone()).collect()
    }
}

impl Executor for ScriptedExecutor {
    fn execute(&mut self, intent: &ActionIntent) -> ActionResult {
        self.calls.push(intent.clone());
        match self.outcomes.pop_front() {
            Some(mut result) => {
                result.intent_id = intent.intent_id.clone();
                result
            }
            None => ActionResult::success(&intent.intent_id),
        }
    }
}
