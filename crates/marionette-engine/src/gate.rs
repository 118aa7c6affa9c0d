//! Pre/post-action gating and abort detection.
//!
//! Every function here is a pure read of an intent plus zero or more
//! snapshots; the orchestrator owns all side effects.

use regex::RegexSet;

use marionette_core::{FailureReason, Snapshot};

use crate::intent::{ActionIntent, Precondition};

/// Interfaces that may be open without counting as an interruption.
const EXPECTED_INTERFACES: [&str; 3] = ["none", "inventory", "skills"];

// =============================================================================
// Pre-action gate
// =============================================================================

/// Evaluate the intent's preconditions against a snapshot.
///
/// Returns the names of every violated precondition; an intent with any
/// violation must not execute. A missing snapshot violates everything the
/// intent wanted checked.
pub fn pre_action_gate(intent: &ActionIntent, snapshot: Option<&Snapshot>) -> Vec<String> {
    let Some(snapshot) = snapshot else {
        if intent.gates.preconditions.is_empty() {
            return Vec::new();
        }
        return vec!["snapshot_missing".to_string()];
    };

    let mut violations = Vec::new();
    for precondition in &intent.gates.preconditions {
        let satisfied = match precondition {
            Precondition::RequireFocus => snapshot.client.focused,
            Precondition::RequireHoverText(text) => hover_contains(snapshot, text),
            Precondition::RequireOpenInterface(name) => snapshot.ui.open_interface == *name,
            Precondition::RequireCue(cue) => cue_present(snapshot, cue),
        };
        if !satisfied {
            violations.push(precondition.name());
        }
    }
    violations
}

/// Case-insensitive substring match against the hover readout.
pub fn hover_contains(snapshot: &Snapshot, text: &str) -> bool {
    snapshot
        .ui
        .hover_text
        .to_lowercase()
        .contains(&text.to_lowercase())
}

fn cue_present(snapshot: &Snapshot, cue: &str) -> bool {
    let Some(value) = snapshot.cue(cue) else {
        return false;
    };
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Null => false,
        serde_json::Value::String(s) => {
            let lowered = s.to_lowercase();
            !lowered.is_empty() && lowered != "none" && lowered != "unknown"
        }
        _ => true,
    }
}

// =============================================================================
// Post-action verification
// =============================================================================

/// Check the intent's postconditions against the after-snapshot.
pub fn post_action_verify(
    intent: &ActionIntent,
    after: Option<&Snapshot>,
) -> Result<(), FailureReason> {
    let Some(after) = after else {
        return Err(FailureReason::NoPostSnapshot);
    };
    if let Some(expected) = intent.gates.expect_open_interface.as_deref() {
        if after.ui.open_interface != expected {
            return Err(FailureReason::ExpectedInterfaceMissing);
        }
    }
    if let Some(expected) = intent.gates.expect_cursor_state.as_deref() {
        if after.ui.cursor_state != expected {
            return Err(FailureReason::ExpectedCursorStateMissing);
        }
    }
    Ok(())
}

// =============================================================================
// Abort-on-change
// =============================================================================

/// Evidence of the environment shifting between two snapshots.
///
/// A non-empty list invalidates the remaining planned intents.
pub fn ui_change_evidence(before: Option<&Snapshot>, after: Option<&Snapshot>) -> Vec<String> {
    let (Some(before), Some(after)) = (before, after) else {
        return Vec::new();
    };
    let mut evidence = Vec::new();
    if before.ui.open_interface != after.ui.open_interface {
        evidence.push("open_interface_changed".to_string());
    }
    if before.cue("modal_state") != after.cue("modal_state") {
        evidence.push("modal_state_changed".to_string());
    }
    evidence
}

pub fn should_abort(before: Option<&Snapshot>, after: Option<&Snapshot>) -> bool {
    !ui_change_evidence(before, after).is_empty()
}

// =============================================================================
// Occlusion
// =============================================================================

/// True iff the given element reports an occluded or blocked state.
pub fn element_occluded(snapshot: &Snapshot, element_id: &str) -> bool {
    snapshot
        .element(element_id)
        .map(|element| {
            let state = element.state.to_lowercase();
            state.contains("occluded") || state.contains("blocked")
        })
        .unwrap_or(false)
}

// =============================================================================
// Interrupts
// =============================================================================

/// True when an interface outside the expected set, or a modal, is open.
pub fn unexpected_ui(snapshot: &Snapshot) -> bool {
    if !EXPECTED_INTERFACES.contains(&snapshot.ui.open_interface.as_str()) {
        return true;
    }
    let modal = snapshot
        .cue("modal_state")
        .and_then(|v| v.as_str())
        .unwrap_or("none")
        .to_lowercase();
    !matches!(modal.as_str(), "none" | "" | "unknown")
}

/// Matcher over chat lines for keywords that demand an immediate stop.
#[derive(Debug)]
pub struct PanicMatcher {
    patterns: RegexSet,
}

impl PanicMatcher {
    /// Build a case-insensitive matcher from the profile's keyword list.
    /// Keywords are matched as substrings of a chat line.
    pub fn new(keywords: &[String]) -> Self {
        let patterns: Vec<String> = keywords
            .iter()
            .map(|kw| format!("(?i){}", regex::escape(kw)))
            .collect();
        // An empty or malformed set matches nothing.
        let patterns = RegexSet::new(&patterns).unwrap_or_else(|_| RegexSet::empty());
        Self { patterns }
    }

    pub fn matches(&self, line: &str) -> bool {
        !self.patterns.is_empty() && self.patterns.is_match(line)
    }

    /// True when any chat line in the snapshot trips a panic keyword.
    pub fn chat_panic(&self, snapshot: &Snapshot) -> bool {
        snapshot.chat.iter().any(|line| self.matches(line))
    }
}

/// Whether low confidence forces the confidence gate for this intent.
pub fn requires_confidence_gate(intent: &ActionIntent, threshold: f64) -> bool {
    intent.confidence < threshold
}
