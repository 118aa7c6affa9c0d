//! Core types and value objects shared across the engine.
//!
//! Defines the action vocabulary, the closed failure-reason taxonomy, and
//! the timestamp newtype used in logs and summaries.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Enums
// =============================================================================

/// Simulated input action types the engine can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Move,
    Click,
    Drag,
    Type,
    Scroll,
    Camera,
}

impl ActionType {
    /// All supported action types, in declaration order.
    pub const ALL: [ActionType; 6] = [
        ActionType::Move,
        ActionType::Click,
        ActionType::Drag,
        ActionType::Type,
        ActionType::Scroll,
        ActionType::Camera,
    ];
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionType::Move => write!(f, "move"),
            ActionType::Click => write!(f, "click"),
            ActionType::Drag => write!(f, "drag"),
            ActionType::Type => write!(f, "type"),
            ActionType::Scroll => write!(f, "scroll"),
            ActionType::Camera => write!(f, "camera"),
        }
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "move" => Ok(ActionType::Move),
            "click" => Ok(ActionType::Click),
            "drag" => Ok(ActionType::Drag),
            "type" => Ok(ActionType::Type),
            "scroll" => Ok(ActionType::Scroll),
            "camera" => Ok(ActionType::Camera),
            _ => Err(format!("Unknown action type: {}", s)),
        }
    }
}

/// Closed taxonomy of reasons an intent can fail.
///
/// Every non-success `ActionResult` carries exactly one of these; nothing in
/// the engine surfaces free-form failure strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// One or more preconditions were violated before dispatch.
    PrecheckFailed,
    /// Hover text re-check found nothing under the cursor.
    HoverCheckMissing,
    /// Forced hover re-check (low-confidence intent) found nothing.
    LowConfidenceHoverMissing,
    /// Target UI element is reported occluded or blocked.
    Occluded,
    /// Irreversible-action double-check saw mismatched hover text.
    DoubleCheckHoverMismatch,
    /// Approval policy requires sign-off for this action type.
    ApprovalRequired,
    /// Static action policy does not allow this action type.
    PolicyBlock,
    /// Rate limiter rejected the dispatch.
    RateLimited,
    /// Panic keyword observed in chat; batch aborts.
    PanicChat,
    /// Post-verification had no snapshot to check against.
    NoPostSnapshot,
    /// Expected interface was not open after the action.
    ExpectedInterfaceMissing,
    /// Expected cursor state was not observed after the action.
    ExpectedCursorStateMissing,
    /// Generic retry exhaustion.
    PostCheckFailed,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::PrecheckFailed => "precheck_failed",
            FailureReason::HoverCheckMissing => "hover_check_missing",
            FailureReason::LowConfidenceHoverMissing => "low_confidence_hover_missing",
            FailureReason::Occluded => "occluded",
            FailureReason::DoubleCheckHoverMismatch => "double_check_hover_mismatch",
            FailureReason::ApprovalRequired => "approval_required",
            FailureReason::PolicyBlock => "policy_block",
            FailureReason::RateLimited => "rate_limited",
            FailureReason::PanicChat => "panic_chat",
            FailureReason::NoPostSnapshot => "no_post_snapshot",
            FailureReason::ExpectedInterfaceMissing => "expected_interface_missing",
            FailureReason::ExpectedCursorStateMissing => "expected_cursor_state_missing",
            FailureReason::PostCheckFailed => "post_check_failed",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for FailureReason {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "precheck_failed" => Ok(FailureReason::PrecheckFailed),
            "hover_check_missing" => Ok(FailureReason::HoverCheckMissing),
            "low_confidence_hover_missing" => Ok(FailureReason::LowConfidenceHoverMissing),
            "occluded" => Ok(FailureReason::Occluded),
            "double_check_hover_mismatch" => Ok(FailureReason::DoubleCheckHoverMismatch),
            "approval_required" => Ok(FailureReason::ApprovalRequired),
            "policy_block" => Ok(FailureReason::PolicyBlock),
            "rate_limited" => Ok(FailureReason::RateLimited),
            "panic_chat" => Ok(FailureReason::PanicChat),
            "no_post_snapshot" => Ok(FailureReason::NoPostSnapshot),
            "expected_interface_missing" => Ok(FailureReason::ExpectedInterfaceMissing),
            "expected_cursor_state_missing" => Ok(FailureReason::ExpectedCursorStateMissing),
            "post_check_failed" => Ok(FailureReason::PostCheckFailed),
            _ => Err(format!("Unknown failure reason: {}", s)),
        }
    }
}

// =============================================================================
// Timestamp
// =============================================================================

/// Unix timestamp in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        Timestamp(chrono::Utc::now().timestamp())
    }

    /// RFC 3339 rendering for log records.
    pub fn to_rfc3339(&self) -> String {
        chrono::DateTime::from_timestamp(self.0, 0)
            .unwrap_or_default()
            .to_rfc3339()
    }
}

// =============================================================================
// Tests
// =============================================================================
