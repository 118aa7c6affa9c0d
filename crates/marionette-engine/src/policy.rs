//! Approval policy, static action policy, and rate limiting.
//!
//! Both policies load from plain JSON files and are immutable for the
//! duration of a run. The rate limiter is the only mutable policy state; it
//! lives inside the single-threaded loop.

use std::path::Path;

use serde::{Deserialize, Serialize};

use marionette_core::{ActionType, FailureReason, MarionetteError};

use crate::intent::ActionIntent;

// =============================================================================
// Approval policy
// =============================================================================

/// Which action types need an operator's explicit approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalPolicy {
    pub require_approval: bool,
    pub unsafe_actions: Vec<ActionType>,
    /// Overrides `unsafe_actions` for listed types.
    pub auto_approve_actions: Vec<ActionType>,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            require_approval: true,
            unsafe_actions: vec![ActionType::Drag, ActionType::Type, ActionType::Camera],
            auto_approve_actions: Vec::new(),
        }
    }
}

impl ApprovalPolicy {
    pub fn load(path: &Path) -> Result<Self, MarionetteError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| MarionetteError::Policy(e.to_string()))
    }
}

/// Whether this intent must wait for an approval that the engine cannot
/// grant itself.
pub fn requires_approval(intent: &ActionIntent, policy: &ApprovalPolicy) -> bool {
    if !policy.require_approval {
        return false;
    }
    if policy.auto_approve_actions.contains(&intent.action_type) {
        return false;
    }
    policy.unsafe_actions.contains(&intent.action_type)
}

// =============================================================================
// Static action policy
// =============================================================================

/// Static allow-list plus rate configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionPolicy {
    pub allowed_actions: Vec<ActionType>,
    pub cooldown_ms: u64,
    /// 0 disables rate limiting.
    pub rate_limit_per_min: u32,
}

impl Default for ActionPolicy {
    fn default() -> Self {
        Self {
            allowed_actions: ActionType::ALL.to_vec(),
            cooldown_ms: 0,
            rate_limit_per_min: 0,
        }
    }
}

impl ActionPolicy {
    pub fn load(path: &Path) -> Result<Self, MarionetteError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| MarionetteError::Policy(e.to_string()))
    }
}

pub fn blocked_by_policy(intent: &ActionIntent, policy: &ActionPolicy) -> bool {
    !policy.allowed_actions.contains(&intent.action_type)
}

// =============================================================================
// Rate limiter
// =============================================================================

/// Trailing 60-second window dispatch counter.
#[derive(Debug)]
pub struct RateLimiter {
    limit_per_min: u32,
    timestamps_ms: Vec<i64>,
}

impl RateLimiter {
    pub fn new(limit_per_min: u32) -> Self {
        Self {
            limit_per_min,
            timestamps_ms: Vec::new(),
        }
    }

    /// Record a dispatch at `now_ms` if the trailing window has room.
    /// Returns false, without recording, once the window is full.
    pub fn allow(&mut self, now_ms: i64) -> bool {
        if self.limit_per_min == 0 {
            return true;
        }
        let window_start = now_ms - 60_000;
        self.timestamps_ms.retain(|&ts| ts >= window_start);
        if self.timestamps_ms.len() >= self.limit_per_min as usize {
            return false;
        }
        self.timestamps_ms.push(now_ms);
        true
    }
}

// =============================================================================
// Combined enforcement
// =============================================================================

/// Evaluates approval, static policy, and rate limit in priority order
/// immediately before dispatch.
#[derive(Debug)]
pub struct PolicyEnforcer {
    approval: ApprovalPolicy,
    action: ActionPolicy,
    rate_limiter: RateLimiter,
}

impl PolicyEnforcer {
    pub fn new(approval: ApprovalPolicy, action: ActionPolicy) -> Self {
        let rate_limiter = RateLimiter::new(action.rate_limit_per_min);
        Self {
            approval,
            action,
            rate_limiter,
        }
    }

    /// Returns the blocking reason, if any. The first check that blocks
    /// wins; the rate limiter only records a dispatch when the other two
    /// checks passed.
    pub fn enforce(&mut self, intent: &ActionIntent, now_ms: i64) -> Option<FailureReason> {
        if requires_approval(intent, &self.approval) {
            return Some(FailureReason::ApprovalRequired);
        }
        if blocked_by_policy(intent, &self.action) {
            return Some(FailureReason::PolicyBlock);
        }
        if !self.rate_limiter.allow(now_ms) {
            return Some(FailureReason::RateLimited);
        }
        None
    }
}

impl Default for PolicyEnforcer {
    fn default() -> Self {
        Self::new(
            ApprovalPolicy {
                require_approval: false,
                ..ApprovalPolicy::default()
            },
            ActionPolicy::default(),
        )
    }
}
