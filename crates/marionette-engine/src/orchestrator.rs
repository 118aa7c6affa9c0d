//! The execution control loop.
//!
//! Sequences a batch of intents through side-steps, gating, humanized
//! delays, policy enforcement, dispatch with retry, and post-verification,
//! logging every step and stopping early when the environment shifts, a
//! panic keyword appears, or the operator cancels.
//!
//! Single-threaded by design: intents drive one shared external application,
//! so they execute strictly in sequence and results are logged in schedule
//! order.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use marionette_core::{
    ActionType, FailureReason, HumanizationProfile, MarionetteError, Snapshot, SnapshotSource,
};

use crate::cancel::{CancelToken, Sleeper, SlicedSleeper};
use crate::error::EngineError;
use crate::executor::Executor;
use crate::gate::{
    element_occluded, hover_contains, pre_action_gate, post_action_verify,
    requires_confidence_gate, ui_change_evidence, unexpected_ui, PanicMatcher,
};
use crate::intent::{resolve_target_point, validate_intent, ActionIntent, ActionResult};
use crate::policy::{ActionPolicy, ApprovalPolicy, PolicyEnforcer};
use crate::timing::{self, IdleAction};
use crate::trace::{ActionLogger, ContextLogger, ExecutionSummary, ExecutionTrace};

/// Drives one batch of intents against the wired-in executor.
pub struct Orchestrator<E: Executor, S: SnapshotSource> {
    profile: HumanizationProfile,
    source: S,
    executor: E,
    enforcer: PolicyEnforcer,
    panic_matcher: PanicMatcher,
    rng: ChaCha8Rng,
    sleeper: Box<dyn Sleeper>,
    cancel: CancelToken,
    action_logger: Option<ActionLogger>,
    context_logger: Option<ContextLogger>,
    summary_path: Option<PathBuf>,
    diagnostics_dir: Option<PathBuf>,

    step_index: u32,
    consecutive_failures: u32,
    burst_count: u32,
    burst_limit: u32,
    last_bounds: Option<marionette_core::Rect>,
    last_dispatch: Option<Instant>,
}

impl<E: Executor, S: SnapshotSource> Orchestrator<E, S> {
    pub fn new(profile: HumanizationProfile, source: S, executor: E) -> Self {
        let panic_matcher = PanicMatcher::new(&profile.interrupt.panic_keywords);
        Self {
            profile,
            source,
            executor,
            enforcer: PolicyEnforcer::default(),
            panic_matcher,
            rng: timing::seeded_rng(rand::random()),
            sleeper: Box::new(SlicedSleeper),
            cancel: CancelToken::new(),
            action_logger: None,
            context_logger: None,
            summary_path: None,
            diagnostics_dir: None,
            step_index: 0,
            consecutive_failures: 0,
            burst_count: 0,
            burst_limit: 0,
            last_bounds: None,
            last_dispatch: None,
        }
    }

    /// Replace the generator with one seeded explicitly, making every
    /// sampled delay and the batch reordering reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = timing::seeded_rng(seed);
        self
    }

    pub fn with_policies(mut self, approval: ApprovalPolicy, action: ActionPolicy) -> Self {
        self.enforcer = PolicyEnforcer::new(approval, action);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_action_log(mut self, logger: ActionLogger) -> Self {
        self.action_logger = Some(logger);
        self
    }

    pub fn with_context_log(mut self, logger: ContextLogger) -> Self {
        self.context_logger = Some(logger);
        self
    }

    pub fn with_summary_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.summary_path = Some(path.into());
        self
    }

    pub fn with_diagnostics_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.diagnostics_dir = Some(dir.into());
        self
    }

    /// Token the controlling side can raise to stop the loop before the next
    /// intent's gating step.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    // =========================================================================
    // Batch loop
    // =========================================================================

    /// Execute a batch of intents and return the summary.
    ///
    /// Intents are validated upfront; a batch with any invalid intent never
    /// starts. The summary covers exactly the intents that were processed,
    /// whether the batch completed, aborted, or was cancelled.
    pub fn run(
        &mut self,
        intents: Vec<ActionIntent>,
        decision_id: &str,
    ) -> Result<ExecutionSummary, EngineError> {
        for (idx, intent) in intents.iter().enumerate() {
            let errors = validate_intent(intent);
            if !errors.is_empty() {
                return Err(EngineError::InvalidIntent(format!(
                    "intent[{}]: {}",
                    idx,
                    errors.join(", ")
                )));
            }
        }

        let mut intents = intents;
        if intents.len() > 1 && timing::roll(&mut self.rng, self.profile.gates.reorder_chance) {
            intents.shuffle(&mut self.rng);
            debug!(decision_id, "batch order shuffled");
        }
        if self.burst_limit == 0 {
            self.burst_limit = timing::sample_burst_actions(&mut self.rng, &self.profile.session);
        }

        info!(decision_id, count = intents.len(), "batch started");
        let total = intents.len();
        let mut results: Vec<ActionResult> = Vec::with_capacity(total);
        for (idx, intent) in intents.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(decision_id, "cancellation observed, stopping batch");
                break;
            }

            let mut trace = ExecutionTrace::new(&intent.intent_id, decision_id);
            let (result, stop) = self.run_intent(intent, &mut trace);
            self.log_records(intent, &result, &trace);
            self.track_failures(&result);
            results.push(result);

            if stop {
                info!(decision_id, "batch aborted after {} of {} intents", idx + 1, total);
                break;
            }
            if idx + 1 < total {
                self.spacing_delay();
            }
            self.step_index += 1;
        }

        let summary = ExecutionSummary::from_results(&results);
        info!(
            decision_id,
            count = summary.count,
            succeeded = summary.succeeded(),
            "batch finished"
        );
        if let Some(path) = self.summary_path.clone() {
            summary
                .write(&path)
                .map_err(|e| EngineError::Trace(e.to_string()))?;
        }
        Ok(summary)
    }

    // =========================================================================
    // Per-intent state machine
    // =========================================================================

    /// Returns the intent's result and whether the batch must stop after it.
    fn run_intent(
        &mut self,
        intent: &ActionIntent,
        trace: &mut ExecutionTrace,
    ) -> (ActionResult, bool) {
        let before = self.source.current();

        self.apply_side_steps(before.as_ref(), trace);

        if let Some(snap) = before.as_ref() {
            if unexpected_ui(snap) {
                let pause = timing::sample_bounded(&mut self.rng, &self.profile.interrupt.delay_ms);
                trace.record_timing("interrupt_pause_ms", pause);
                self.sleep_ms(pause);
            }
            if self.panic_matcher.chat_panic(snap) {
                warn!(intent_id = %intent.intent_id, "panic keyword in chat, aborting batch");
                return (
                    ActionResult::failure(&intent.intent_id, FailureReason::PanicChat),
                    true,
                );
            }
        }

        let mut aim = resolve_target_point(&intent.target);
        if let Some((x, y)) = aim {
            let (dx, dy) = timing::sample_attention_drift_offset(
                &mut self.rng,
                &self.profile.session,
                self.step_index,
            );
            aim = Some((x + dx, y + dy));
            trace.record_motion("attention_drift_dx", dx);
            trace.record_motion("attention_drift_dy", dy);
        }

        // Gating failures are environment mismatches, never retried.
        let violations = pre_action_gate(intent, before.as_ref());
        if !violations.is_empty() {
            debug!(intent_id = %intent.intent_id, ?violations, "precheck failed");
            let result = ActionResult::failure(&intent.intent_id, FailureReason::PrecheckFailed)
                .with_detail("violations", json!(violations));
            return (result, false);
        }

        let reaction =
            timing::sample_reaction_delay_ms(&mut self.rng, &self.profile.timing, intent.action_type);
        trace.record_timing("reaction_ms", reaction);
        self.sleep_ms(reaction);

        // Low confidence inserts a hesitation and forces the hover re-check
        // for clicks.
        let mut hover_forced = false;
        if requires_confidence_gate(intent, self.profile.gates.confidence_threshold) {
            let pause = timing::sample_bounded(&mut self.rng, &self.profile.timing.think_pause_ms);
            trace.record_timing("confidence_pause_ms", pause);
            self.sleep_ms(pause);
            if intent.action_type == ActionType::Click {
                hover_forced = true;
            }
        }

        if intent.action_type == ActionType::Click
            && (hover_forced || timing::roll(&mut self.rng, self.profile.gates.hover_check_chance))
        {
            trace.record_side_step("hover_check");
            let fresh = self.source.current();
            let (hover_empty, stale) = match fresh.as_ref() {
                Some(s) => (s.ui.hover_text.is_empty(), s.stale),
                None => (true, true),
            };
            if hover_empty && !stale {
                let reason = if hover_forced {
                    FailureReason::LowConfidenceHoverMissing
                } else {
                    FailureReason::HoverCheckMissing
                };
                return (ActionResult::failure(&intent.intent_id, reason), false);
            }
        }

        if let Some(element_id) = intent.target.get("ui_element_id").and_then(Value::as_str) {
            let occluded_now = before
                .as_ref()
                .map(|s| element_occluded(s, element_id))
                .unwrap_or(false);
            if occluded_now {
                let wait =
                    timing::sample_bounded(&mut self.rng, &self.profile.gates.occlusion_wait_ms);
                trace.record_timing("occlusion_wait_ms", wait);
                self.sleep_ms(wait);
                let fresh = self.source.current();
                let still_occluded = fresh
                    .as_ref()
                    .map(|s| element_occluded(s, element_id) && !s.stale)
                    .unwrap_or(false);
                if still_occluded {
                    return (
                        ActionResult::failure(&intent.intent_id, FailureReason::Occluded),
                        false,
                    );
                }
            }
        }

        // Re-aim pointer targets when the window moved since the last step.
        if matches!(intent.action_type, ActionType::Click | ActionType::Move) {
            if let (Some(prev), Some(snap)) = (self.last_bounds, before.as_ref()) {
                let (px, py) = prev.center();
                let (cx, cy) = snap.client.bounds.center();
                let dx = (cx - px) as f64;
                let dy = (cy - py) as f64;
                if dx.hypot(dy) > self.profile.spacing.window_shift_threshold_px {
                    if let Some((x, y)) = aim {
                        aim = Some((x + dx, y + dy));
                        trace.record_motion("window_shift_dx", dx);
                        trace.record_motion("window_shift_dy", dy);
                        debug!(intent_id = %intent.intent_id, dx, dy, "re-aimed after window shift");
                    }
                }
            }
        }
        if let Some(snap) = before.as_ref() {
            self.last_bounds = Some(snap.client.bounds);
        }

        if intent.is_irreversible()
            && timing::roll(&mut self.rng, self.profile.gates.double_check_chance)
        {
            let pause = timing::sample_bounded(&mut self.rng, &self.profile.timing.think_pause_ms);
            trace.record_timing("double_check_pause_ms", pause);
            trace.record_side_step("double_check");
            self.sleep_ms(pause);
            if let Some(fresh) = self.source.current() {
                let label = intent.label.as_deref().unwrap_or_default();
                if !fresh.ui.hover_text.is_empty() && !hover_contains(&fresh, label) {
                    return (
                        ActionResult::failure(
                            &intent.intent_id,
                            FailureReason::DoubleCheckHoverMismatch,
                        ),
                        false,
                    );
                }
            }
        }

        let now_ms = chrono::Utc::now().timestamp_millis();
        if let Some(reason) = self.enforcer.enforce(intent, now_ms) {
            debug!(intent_id = %intent.intent_id, %reason, "blocked by policy");
            return (ActionResult::failure(&intent.intent_id, reason), false);
        }

        let result = self.dispatch(intent, aim, trace);
        self.last_dispatch = Some(Instant::now());

        let after = self.source.current();
        let evidence = ui_change_evidence(before.as_ref(), after.as_ref());
        if !evidence.is_empty() {
            let result = result.with_detail("ui_change", json!(evidence));
            return (result, true);
        }

        (result, false)
    }

    /// Dispatch with bounded retry. An attempt fails when the executor
    /// reports failure or a configured postcondition does not hold; between
    /// attempts the target gets a small nudge and a capped linear backoff.
    fn dispatch(
        &mut self,
        intent: &ActionIntent,
        aim: Option<(f64, f64)>,
        trace: &mut ExecutionTrace,
    ) -> ActionResult {
        let max_attempts = self.profile.retry.max_attempts.max(1);
        let mut aimed = match aim {
            Some((x, y)) => intent.aimed_at(x, y),
            None => intent.clone(),
        };
        let mut last_reason = FailureReason::PostCheckFailed;
        for attempt in 1..=max_attempts {
            if intent.action_type == ActionType::Click {
                let settle = timing::sample_bounded(&mut self.rng, &self.profile.timing.settle_ms);
                trace.record_timing("settle_ms", settle);
                self.sleep_ms(settle);
            }

            let mut result = self.executor.execute(&aimed);
            let verdict = if !result.success {
                Err(result.failure_reason.unwrap_or(FailureReason::PostCheckFailed))
            } else if intent.gates.has_postconditions() {
                let after = self.source.current();
                post_action_verify(intent, after.as_ref())
            } else {
                Ok(())
            };

            match verdict {
                Ok(()) => {
                    result
                        .details
                        .insert("attempts".to_string(), json!(attempt));
                    return result;
                }
                Err(reason) => {
                    last_reason = reason;
                    debug!(
                        intent_id = %intent.intent_id,
                        attempt,
                        %reason,
                        "dispatch attempt failed"
                    );
                    if attempt < max_attempts {
                        if let Some((x, y)) = resolve_target_point(&aimed.target) {
                            let (nx, ny) =
                                timing::sample_reaim_nudge(&mut self.rng, &self.profile.retry);
                            aimed = aimed.aimed_at(x + nx, y + ny);
                        }
                        let backoff = timing::backoff_ms(attempt, &self.profile.retry);
                        trace.record_timing(&format!("backoff_{}_ms", attempt), backoff as f64);
                        self.sleep_ms(backoff as f64);
                    }
                }
            }
        }
        ActionResult::failure(&intent.intent_id, last_reason)
            .with_detail("attempts", json!(max_attempts))
    }

    // =========================================================================
    // Side-steps
    // =========================================================================

    /// Pre-dispatch housekeeping and cosmetic filler, each step recorded on
    /// the trace. None of these block the intent.
    fn apply_side_steps(&mut self, snapshot: Option<&Snapshot>, trace: &mut ExecutionTrace) {
        let Some(snapshot) = snapshot else { return };
        let bounds = snapshot.client.bounds;
        let (cx, cy) = bounds.center();

        if !snapshot.client.focused {
            let recovery = ActionIntent::at_point("focus_recovery", ActionType::Click, cx, cy);
            let result = self.executor.execute(&recovery);
            trace.record_side_step("focus_recovery");
            debug!(success = result.success, "focus recovery click dispatched");
        }

        let idle_for = self
            .last_dispatch
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO);
        if self.profile.idle.idle_recovery_after_ms > 0
            && idle_for >= Duration::from_millis(self.profile.idle.idle_recovery_after_ms)
        {
            info!("idle threshold exceeded, running recovery sequence");
            self.executor
                .execute(&ActionIntent::at_point("focus_recovery", ActionType::Click, cx, cy));
            self.executor
                .execute(&ActionIntent::at_point("viewport_scan", ActionType::Camera, cx, cy));
            self.executor
                .execute(&ActionIntent::at_point("tab_toggle", ActionType::Click, cx, cy));
            trace.record_side_step("idle_recovery");
            self.last_dispatch = Some(Instant::now());
        }

        if timing::roll(&mut self.rng, self.profile.idle.edge_pause_chance) {
            let pause = timing::sample_bounded(&mut self.rng, &self.profile.idle.edge_pause_ms);
            trace.record_timing("edge_pause_ms", pause);
            trace.record_side_step("edge_pause");
            self.sleep_ms(pause);
        }

        if timing::roll(&mut self.rng, self.profile.idle.offscreen_travel_chance) {
            let ((lx, ly), (rx, ry)) = timing::edge_pause_points(&mut self.rng, bounds, 8);
            self.executor
                .execute(&ActionIntent::at_point("offscreen_travel", ActionType::Move, lx, ly));
            self.executor
                .execute(&ActionIntent::at_point("offscreen_return", ActionType::Move, rx, ry));
            trace.record_side_step("offscreen_travel");
        }

        if timing::roll(&mut self.rng, self.profile.idle.idle_action_chance) {
            let action = timing::choose_idle_action(&mut self.rng, &self.profile.idle);
            let filler = match action {
                IdleAction::Hover => {
                    ActionIntent::at_point("idle_hover", ActionType::Move, cx, cy)
                }
                IdleAction::CameraGlance => {
                    ActionIntent::at_point("idle_camera_glance", ActionType::Camera, cx, cy)
                }
                IdleAction::InventoryCheck => ActionIntent::at_point(
                    "idle_inventory_check",
                    ActionType::Click,
                    bounds.x + bounds.width * 3 / 4,
                    cy,
                ),
            };
            self.executor.execute(&filler);
            trace.record_side_step(action.as_str());
        }

        if timing::roll(&mut self.rng, self.profile.idle.viewport_scan_chance) {
            self.executor
                .execute(&ActionIntent::at_point("viewport_scan", ActionType::Camera, cx, cy));
            trace.record_side_step("viewport_scan");
        }

        if timing::roll(&mut self.rng, self.profile.idle.tab_toggle_chance) {
            self.executor.execute(&ActionIntent::at_point(
                "tab_toggle",
                ActionType::Click,
                bounds.x + bounds.width - 20,
                bounds.y + bounds.height - 20,
            ));
            trace.record_side_step("tab_toggle");
        }
    }

    // =========================================================================
    // Bookkeeping
    // =========================================================================

    fn log_records(&self, intent: &ActionIntent, result: &ActionResult, trace: &ExecutionTrace) {
        if let Some(logger) = &self.action_logger {
            if let Err(e) = logger.log(intent, result) {
                warn!("action log write failed: {}", e);
            }
        }
        if let Some(logger) = &self.context_logger {
            if let Err(e) = logger.log(trace) {
                warn!("context log write failed: {}", e);
            }
        }
    }

    /// Two consecutive non-success results trigger a best-effort snapshot
    /// dump; capture failures are swallowed.
    fn track_failures(&mut self, result: &ActionResult) {
        if result.success {
            self.consecutive_failures = 0;
            return;
        }
        self.consecutive_failures += 1;
        if self.consecutive_failures >= 2 {
            self.capture_diagnostics();
            self.consecutive_failures = 0;
        }
    }

    fn capture_diagnostics(&mut self) {
        let Some(dir) = self.diagnostics_dir.clone() else {
            return;
        };
        let Some(snapshot) = self.source.current() else {
            return;
        };
        let path = dir.join(format!("stuck_{}.json", uuid::Uuid::new_v4()));
        let outcome = (|| -> Result<(), MarionetteError> {
            std::fs::create_dir_all(&dir)?;
            std::fs::write(&path, serde_json::to_string_pretty(&snapshot)?)?;
            Ok(())
        })();
        match outcome {
            Ok(()) => info!(path = %path.display(), "stuck diagnostics captured"),
            Err(e) => warn!("diagnostic capture failed: {}", e),
        }
    }

    /// Pause between intents: cue-adjusted base, jitter, fatigue drift, and
    /// a burst rest once the sampled burst length is reached.
    fn spacing_delay(&mut self) {
        let snapshot = self.source.current();
        let mut total = timing::spacing_from_cues(&self.profile.spacing, snapshot.as_ref());
        total += timing::sample_bounded(&mut self.rng, &self.profile.spacing.jitter_ms);
        total += timing::fatigue_drift_ms(&self.profile.session, self.step_index);

        self.burst_count += 1;
        if self.burst_count >= self.burst_limit {
            let rest = timing::sample_burst_rest_ms(&mut self.rng, &self.profile.session);
            debug!(rest_ms = rest, "burst complete, resting");
            total += rest;
            self.burst_count = 0;
            self.burst_limit = timing::sample_burst_actions(&mut self.rng, &self.profile.session);
        }
        self.sleep_ms(total);
    }

    fn sleep_ms(&mut self, ms: f64) {
        if ms <= 0.0 {
            return;
        }
        self.sleeper
            .sleep(Duration::from_millis(ms.round() as u64), &self.cancel);
    }
}
