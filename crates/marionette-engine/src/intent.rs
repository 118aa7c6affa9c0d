//! Action intent model and decision payload mapping.
//!
//! Intents are immutable once built; everything the engine derives while
//! executing one is accumulated on a separate [`crate::trace::ExecutionTrace`]
//! rather than written back onto the intent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use marionette_core::{ActionType, FailureReason};

use crate::error::EngineError;

/// Action labels that are treated as irreversible and double-checked before
/// dispatch.
pub const IRREVERSIBLE_LABELS: [&str; 3] = ["drop", "alch", "trade"];

// =============================================================================
// Gating
// =============================================================================

/// One typed precondition checked against a snapshot before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precondition {
    /// The client window must report keyboard focus.
    RequireFocus,
    /// The given text must appear (case-insensitive) in the hover readout.
    RequireHoverText(String),
    /// The named interface must be the one currently open.
    RequireOpenInterface(String),
    /// The named cue must be present with a meaningful value.
    RequireCue(String),
}

impl Precondition {
    /// Short name used in violation lists and logs.
    pub fn name(&self) -> String {
        match self {
            Precondition::RequireFocus => "require_focus".to_string(),
            Precondition::RequireHoverText(_) => "require_hover_text".to_string(),
            Precondition::RequireOpenInterface(_) => "require_open_interface".to_string(),
            Precondition::RequireCue(cue) => format!("require_cue:{}", cue),
        }
    }
}

/// Pre- and postconditions attached to one intent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateSpec {
    #[serde(default)]
    pub preconditions: Vec<Precondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_open_interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_cursor_state: Option<String>,
}

impl GateSpec {
    /// True when post-action verification has anything to check. Dispatch is
    /// only retried for intents that can be verified.
    pub fn has_postconditions(&self) -> bool {
        self.expect_open_interface.is_some() || self.expect_cursor_state.is_some()
    }
}

/// The `gating` map as it appears in a decision payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawGating {
    #[serde(default)]
    pub require_focus: Option<bool>,
    #[serde(default)]
    pub require_hover_text: Option<String>,
    #[serde(default)]
    pub require_open_interface: Option<String>,
    #[serde(default)]
    pub expect_open_interface: Option<String>,
    #[serde(default)]
    pub expect_cursor_state: Option<String>,
}

impl GateSpec {
    /// Build typed gates from a raw gating map plus the intent's cue list.
    pub fn from_raw(raw: &RawGating, required_cues: &[String]) -> Self {
        let mut preconditions = Vec::new();
        if raw.require_focus == Some(true) {
            preconditions.push(Precondition::RequireFocus);
        }
        if let Some(text) = raw.require_hover_text.as_deref() {
            if !text.is_empty() {
                preconditions.push(Precondition::RequireHoverText(text.to_string()));
            }
        }
        if let Some(name) = raw.require_open_interface.as_deref() {
            if !name.is_empty() {
                preconditions.push(Precondition::RequireOpenInterface(name.to_string()));
            }
        }
        for cue in required_cues {
            preconditions.push(Precondition::RequireCue(cue.clone()));
        }
        Self {
            preconditions,
            expect_open_interface: raw.expect_open_interface.clone(),
            expect_cursor_state: raw.expect_cursor_state.clone(),
        }
    }
}

// =============================================================================
// Intent and result
// =============================================================================

/// One proposed action, immutable after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionIntent {
    pub intent_id: String,
    pub action_type: ActionType,
    /// Coordinates or a symbolic reference; never empty for a valid intent.
    pub target: Map<String, Value>,
    pub confidence: f64,
    /// Semantic label of the action, used for irreversibility checks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub gates: GateSpec,
    /// Free-form producer-side metadata, carried through untouched.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub payload: Map<String, Value>,
}

impl ActionIntent {
    /// Intent with full confidence, no gates, and no payload. Used for
    /// synthesized cosmetic steps and in tests.
    pub fn new(intent_id: &str, action_type: ActionType, target: Map<String, Value>) -> Self {
        Self {
            intent_id: intent_id.to_string(),
            action_type,
            target,
            confidence: 1.0,
            label: None,
            gates: GateSpec::default(),
            payload: Map::new(),
        }
    }

    /// Click intent aimed at a point, gated on nothing. Dispatched to restore
    /// focus or as cosmetic filler.
    pub fn at_point(intent_id: &str, action_type: ActionType, x: i64, y: i64) -> Self {
        let mut target = Map::new();
        target.insert("x".to_string(), Value::from(x));
        target.insert("y".to_string(), Value::from(y));
        Self::new(intent_id, action_type, target)
    }

    pub fn is_irreversible(&self) -> bool {
        self.label
            .as_deref()
            .map(|label| IRREVERSIBLE_LABELS.contains(&label))
            .unwrap_or(false)
    }

    /// Copy of this intent re-aimed at the given point.
    pub fn aimed_at(&self, x: f64, y: f64) -> Self {
        let mut aimed = self.clone();
        aimed.target.insert("x".to_string(), Value::from(x));
        aimed.target.insert("y".to_string(), Value::from(y));
        aimed
    }
}

/// Outcome of one intent, created once per attempt; the final result is the
/// last attempt's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub intent_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
}

impl ActionResult {
    pub fn success(intent_id: &str) -> Self {
        Self {
            intent_id: intent_id.to_string(),
            success: true,
            failure_reason: None,
            details: Map::new(),
        }
    }

    pub fn failure(intent_id: &str, reason: FailureReason) -> Self {
        Self {
            intent_id: intent_id.to_string(),
            success: false,
            failure_reason: Some(reason),
            details: Map::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }
}

// =============================================================================
// Decision payload mapping
// =============================================================================

/// One element of a decision payload's `actions` array, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct DecisionAction {
    #[serde(default = "default_action_id")]
    pub action_id: String,
    #[serde(default)]
    pub action_type: String,
    #[serde(default)]
    pub target: Map<String, Value>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub required_cues: Vec<String>,
    #[serde(default)]
    pub gating: RawGating,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

fn default_action_id() -> String {
    "action".to_string()
}

fn default_confidence() -> f64 {
    1.0
}

/// Decision payload produced by the external decision engine.
#[derive(Debug, Clone, Deserialize)]
pub struct DecisionPayload {
    pub decision_id: String,
    #[serde(default)]
    pub actions: Vec<DecisionAction>,
}

impl DecisionPayload {
    pub fn parse(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Map each action 1:1 to an [`ActionIntent`], rejecting the whole
    /// payload on any invalid element.
    pub fn build_intents(&self) -> Result<Vec<ActionIntent>, EngineError> {
        let mut intents = Vec::with_capacity(self.actions.len());
        let mut errors: Vec<String> = Vec::new();
        for (idx, action) in self.actions.iter().enumerate() {
            let action_type = match action.action_type.parse::<ActionType>() {
                Ok(t) => t,
                Err(e) => {
                    errors.push(format!("intent[{}]: {}", idx, e));
                    continue;
                }
            };
            if action.target.is_empty() {
                errors.push(format!("intent[{}]: target must be a non-empty object", idx));
            }
            if !(0.0..=1.0).contains(&action.confidence) {
                errors.push(format!(
                    "intent[{}]: confidence must be between 0 and 1",
                    idx
                ));
            }
            let label = action
                .payload
                .get("label")
                .or_else(|| action.target.get("label"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            intents.push(ActionIntent {
                intent_id: action.action_id.clone(),
                action_type,
                target: action.target.clone(),
                confidence: action.confidence,
                label,
                gates: GateSpec::from_raw(&action.gating, &action.required_cues),
                payload: action.payload.clone(),
            });
        }
        if !errors.is_empty() {
            return Err(EngineError::InvalidIntent(errors.join("; ")));
        }
        Ok(intents)
    }
}

/// Validation a built intent must still satisfy before a batch runs.
pub fn validate_intent(intent: &ActionIntent) -> Vec<String> {
    let mut errors = Vec::new();
    if intent.target.is_empty() {
        errors.push("target must be a non-empty object".to_string());
    }
    if !(0.0..=1.0).contains(&intent.confidence) {
        errors.push("confidence must be between 0 and 1".to_string());
    }
    errors
}

/// Resolve a target map to a screen point, when it carries one.
///
/// Symbolic references (`ui_element_id`, names) resolve to `None`; those are
/// aimed by the executor, not the engine.
pub fn resolve_target_point(target: &Map<String, Value>) -> Option<(f64, f64)> {
    if let (Some(x), Some(y)) = (
        target.get("x").and_then(Value::as_f64),
        target.get("y").and_then(Value::as_f64),
    ) {
        return Some((x, y));
    }
    if let Some(Value::Array(position)) = target.get("position") {
        if position.len() == 2 {
            if let (Some(x), Some(y)) = (position[0].as_f64(), position[1].as_f64()) {
                return Some((x, y));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload_json(actions: Value) -> String {
        json!({"decision_id": "dec-1", "actions": actions}).to_string()
    }

    // ---- gate spec ----

    #[test]
    fn test_gate_spec_from_raw_full() {
        let raw = RawGating {
            require_focus: Some(true),
            require_hover_text: Some("Bank booth".to_string()),
            require_open_interface: Some("bank".to_string()),
            expect_open_interface: Some("bank".to_string()),
            expect_cursor_state: None,
        };
        let gates = GateSpec::from_raw(&raw, &["loot_visible".to_string()]);
        assert_eq!(gates.preconditions.len(), 4);
        assert_eq!(gates.preconditions[0], Precondition::RequireFocus);
        assert_eq!(
            gates.preconditions[3],
            Precondition::RequireCue("loot_visible".to_string())
        );
        assert!(gates.has_postconditions());
    }

    #[test]
    fn test_gate_spec_focus_only_when_explicitly_true() {
        let raw = RawGating {
            require_focus: Some(false),
            ..RawGating::default()
        };
        assert!(GateSpec::from_raw(&raw, &[]).preconditions.is_empty());
        let raw = RawGating::default();
        assert!(GateSpec::from_raw(&raw, &[]).preconditions.is_empty());
    }

    #[test]
    fn test_gate_spec_skips_empty_strings() {
        let raw = RawGating {
            require_hover_text: Some(String::new()),
            require_open_interface: Some(String::new()),
            ..RawGating::default()
        };
        assert!(GateSpec::from_raw(&raw, &[]).preconditions.is_empty());
    }

    #[test]
    fn test_precondition_names() {
        assert_eq!(Precondition::RequireFocus.name(), "require_focus");
        assert_eq!(
            Precondition::RequireCue("busy".to_string()).name(),
            "require_cue:busy"
        );
    }

    // ---- decision payload ----

    #[test]
    fn test_build_intents_full_round() {
        let json = payload_json(json!([{
            "action_id": "a1",
            "action_type": "click",
            "target": {"x": 120, "y": 340},
            "confidence": 0.85,
            "required_cues": ["bank_open"],
            "gating": {"require_focus": true, "expect_open_interface": "bank"},
            "payload": {"label": "drop"}
        }]));
        let payload = DecisionPayload::parse(&json).unwrap();
        assert_eq!(payload.decision_id, "dec-1");
        let intents = payload.build_intents().unwrap();
        assert_eq!(intents.len(), 1);
        let intent = &intents[0];
        assert_eq!(intent.intent_id, "a1");
        assert_eq!(intent.action_type, ActionType::Click);
        assert!((intent.confidence - 0.85).abs() < f64::EPSILON);
        assert_eq!(intent.label.as_deref(), Some("drop"));
        assert!(intent.is_irreversible());
        assert_eq!(intent.gates.preconditions.len(), 2);
        assert_eq!(
            intent.gates.expect_open_interface.as_deref(),
            Some("bank")
        );
    }

    #[test]
    fn test_build_intents_defaults() {
        let json = payload_json(json!([{
            "action_type": "move",
            "target": {"x": 1, "y": 2}
        }]));
        let intents = DecisionPayload::parse(&json).unwrap().build_intents().unwrap();
        let intent = &intents[0];
        assert_eq!(intent.intent_id, "action");
        assert!((intent.confidence - 1.0).abs() < f64::EPSILON);
        assert!(intent.gates.preconditions.is_empty());
        assert!(intent.payload.is_empty());
        assert!(intent.label.is_none());
    }

    #[test]
    fn test_build_intents_rejects_unsupported_type() {
        let json = payload_json(json!([{
            "action_type": "fly",
            "target": {"x": 1, "y": 2}
        }]));
        let err = DecisionPayload::parse(&json).unwrap().build_intents().unwrap_err();
        assert!(err.to_string().contains("intent[0]"));
        assert!(err.to_string().contains("fly"));
    }

    #[test]
    fn test_build_intents_rejects_empty_target() {
        let json = payload_json(json!([{"action_type": "click", "target": {}}]));
        let err = DecisionPayload::parse(&json).unwrap().build_intents().unwrap_err();
        assert!(err.to_string().contains("non-empty"));
    }

    #[test]
    fn test_build_intents_rejects_out_of_range_confidence() {
        let json = payload_json(json!([{
            "action_type": "click",
            "target": {"x": 1, "y": 2},
            "confidence": 1.5
        }]));
        let err = DecisionPayload::parse(&json).unwrap().build_intents().unwrap_err();
        assert!(err.to_string().contains("confidence"));
    }

    #[test]
    fn test_build_intents_collects_all_errors() {
        let json = payload_json(json!([
            {"action_type": "fly", "target": {"x": 1}},
            {"action_type": "click", "target": {}}
        ]));
        let err = DecisionPayload::parse(&json).unwrap().build_intents().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("intent[0]"));
        assert!(msg.contains("intent[1]"));
    }

    #[test]
    fn test_label_from_target_when_payload_missing() {
        let json = payload_json(json!([{
            "action_type": "click",
            "target": {"x": 1, "y": 2, "label": "alch"}
        }]));
        let intents = DecisionPayload::parse(&json).unwrap().build_intents().unwrap();
        assert_eq!(intents[0].label.as_deref(), Some("alch"));
        assert!(intents[0].is_irreversible());
    }

    // ---- validation ----

    #[test]
    fn test_validate_intent_clean() {
        let intent = ActionIntent::at_point("a", ActionType::Click, 10, 10);
        assert!(validate_intent(&intent).is_empty());
    }

    #[test]
    fn test_validate_intent_flags_problems() {
        let mut intent = ActionIntent::new("a", ActionType::Click, Map::new());
        intent.confidence = 2.0;
        let errors = validate_intent(&intent);
        assert_eq!(errors.len(), 2);
    }

    // ---- target resolution ----

    #[test]
    fn test_resolve_target_point_xy() {
        let intent = ActionIntent::at_point("a", ActionType::Click, 10, 20);
        assert_eq!(resolve_target_point(&intent.target), Some((10.0, 20.0)));
    }

    #[test]
    fn test_resolve_target_point_position_array() {
        let mut target = Map::new();
        target.insert("position".to_string(), json!([5, 7]));
        assert_eq!(resolve_target_point(&target), Some((5.0, 7.0)));
    }

    #[test]
    fn test_resolve_target_point_symbolic() {
        let mut target = Map::new();
        target.insert("ui_element_id".to_string(), Value::from("bank_booth"));
        assert_eq!(resolve_target_point(&target), None);
    }

    #[test]
    fn test_aimed_at_overrides_coordinates() {
        let intent = ActionIntent::at_point("a", ActionType::Click, 10, 20);
        let aimed = intent.aimed_at(14.5, 21.0);
        assert_eq!(resolve_target_point(&aimed.target), Some((14.5, 21.0)));
        // Original intent is untouched.
        assert_eq!(resolve_target_point(&intent.target), Some((10.0, 20.0)));
    }

    // ---- results ----

    #[test]
    fn test_result_constructors() {
        let ok = ActionResult::success("a");
        assert!(ok.success);
        assert!(ok.failure_reason.is_none());

        let failed = ActionResult::failure("a", FailureReason::PrecheckFailed)
            .with_detail("violations", json!(["require_focus"]));
        assert!(!failed.success);
        assert_eq!(failed.failure_reason, Some(FailureReason::PrecheckFailed));
        assert_eq!(failed.details["violations"], json!(["require_focus"]));
    }

    #[test]
    fn test_result_serialization_omits_empty_fields() {
        let ok = ActionResult::success("a");
        let value = serde_json::to_value(&ok).unwrap();
        assert!(value.get("failure_reason").is_none());
        assert!(value.get("details").is_none());

        let failed = ActionResult::failure("a", FailureReason::RateLimited);
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(value["failure_reason"], "rate_limited");
    }
}
