//! Stochastic timing, rhythm, and motion sampling.
//!
//! Every function here is a pure draw from the caller's generator against a
//! [`HumanizationProfile`]; no global randomness and no I/O. Callers inject a
//! seedable generator so whole runs replay deterministically.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use marionette_core::config::{
    IdleConfig, RetryConfig, SampleSpec, SessionConfig, SpacingConfig, TimingConfig,
};
use marionette_core::{ActionType, Rect, Snapshot};

/// Construct the engine's generator from an explicit seed.
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Draw from `N(mean, stdev)` via Box-Muller and clamp into `[min, max]`.
///
/// A non-positive stdev collapses to the clamped mean without consuming
/// randomness.
pub fn sample_bounded<R: Rng>(rng: &mut R, spec: &SampleSpec) -> f64 {
    if spec.stdev <= 0.0 {
        return spec.mean.clamp(spec.min, spec.max);
    }
    let u1 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    let u2 = rng.gen::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
    (spec.mean + spec.stdev * z).clamp(spec.min, spec.max)
}

/// Single probability roll against a configured chance.
pub fn roll<R: Rng>(rng: &mut R, chance: f64) -> bool {
    if chance <= 0.0 {
        return false;
    }
    if chance >= 1.0 {
        return true;
    }
    rng.gen::<f64>() < chance
}

/// Reaction delay before starting an action, scaled by action kind.
///
/// Pointer actions come slightly faster than the base distribution, typing
/// and camera work slightly slower.
pub fn sample_reaction_delay_ms<R: Rng>(
    rng: &mut R,
    timing: &TimingConfig,
    action_type: ActionType,
) -> f64 {
    let base = sample_bounded(rng, &timing.reaction_ms);
    match action_type {
        ActionType::Click | ActionType::Drag => base * 0.9,
        ActionType::Type | ActionType::Camera => base * 1.2,
        _ => base,
    }
}

/// Deterministic slowdown accumulated over a session, in milliseconds added
/// to spacing. Zero for the first step and for a zero drift rate.
pub fn fatigue_drift_ms(session: &SessionConfig, step_index: u32) -> f64 {
    if session.fatigue_drift_rate <= 0.0 || session.rest_ms.mean <= 0.0 {
        return 0.0;
    }
    session.rest_ms.mean * session.fatigue_drift_rate * f64::from(step_index)
}

/// Rest taken between bursts.
pub fn sample_burst_rest_ms<R: Rng>(rng: &mut R, session: &SessionConfig) -> f64 {
    sample_bounded(rng, &session.rest_ms)
}

/// Number of actions to run before the next rest, at least 1.
pub fn sample_burst_actions<R: Rng>(rng: &mut R, session: &SessionConfig) -> u32 {
    let value = sample_bounded(rng, &session.actions_per_burst).round();
    value.max(1.0) as u32
}

// =============================================================================
// Idle behavior
// =============================================================================

/// Cosmetic filler performed between real intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdleAction {
    Hover,
    CameraGlance,
    InventoryCheck,
}

impl IdleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdleAction::Hover => "hover",
            IdleAction::CameraGlance => "camera_glance",
            IdleAction::InventoryCheck => "inventory_check",
        }
    }
}

/// Weighted choice among the idle actions. Weights are normalized by their
/// sum; if every weight is non-positive the choice defaults to hover.
pub fn choose_idle_action<R: Rng>(rng: &mut R, idle: &IdleConfig) -> IdleAction {
    let weights = [
        (IdleAction::Hover, idle.hover_weight),
        (IdleAction::CameraGlance, idle.camera_glance_weight),
        (IdleAction::InventoryCheck, idle.inventory_check_weight),
    ];
    let total: f64 = weights.iter().map(|(_, w)| w.max(0.0)).sum();
    if total <= 0.0 {
        return IdleAction::Hover;
    }
    let pick = rng.gen::<f64>() * total;
    let mut acc = 0.0;
    for (action, weight) in weights {
        acc += weight.max(0.0);
        if pick <= acc {
            return action;
        }
    }
    IdleAction::InventoryCheck
}

// =============================================================================
// Motion offsets
// =============================================================================

/// Random target offset whose magnitude grows with session length.
pub fn sample_attention_drift_offset<R: Rng>(
    rng: &mut R,
    session: &SessionConfig,
    step_index: u32,
) -> (f64, f64) {
    if session.attention_drift_rate <= 0.0 {
        return (0.0, 0.0);
    }
    let magnitude = session.attention_drift_rate * f64::from(step_index.max(1));
    let dx = rng.gen_range(-magnitude..=magnitude);
    let dy = rng.gen_range(-magnitude..=magnitude);
    (dx, dy)
}

/// Small random nudge applied to a coordinate target between retry attempts.
pub fn sample_reaim_nudge<R: Rng>(rng: &mut R, retry: &RetryConfig) -> (f64, f64) {
    if retry.reaim_px <= 0.0 {
        return (0.0, 0.0);
    }
    let dx = rng.gen_range(-retry.reaim_px..=retry.reaim_px);
    let dy = rng.gen_range(-retry.reaim_px..=retry.reaim_px);
    (dx, dy)
}

/// Travel points for a brief pointer excursion off the client area: a point
/// `margin` pixels beyond a random edge, and the center to return to.
pub fn edge_pause_points<R: Rng>(rng: &mut R, bounds: Rect, margin: i64) -> ((i64, i64), (i64, i64)) {
    let along_x = rng.gen_range(bounds.x..=bounds.x + bounds.width.max(1));
    let along_y = rng.gen_range(bounds.y..=bounds.y + bounds.height.max(1));
    let leave = match rng.gen_range(0..4u8) {
        0 => (along_x, bounds.y - margin),
        1 => (along_x, bounds.y + bounds.height + margin),
        2 => (bounds.x - margin, along_y),
        _ => (bounds.x + bounds.width + margin, along_y),
    };
    (leave, bounds.center())
}

// =============================================================================
// Backoff and spacing
// =============================================================================

/// Linear backoff for retry attempt `attempt` (1-based), capped at the
/// configured maximum.
pub fn backoff_ms(attempt: u32, retry: &RetryConfig) -> u64 {
    retry
        .backoff_max_ms
        .min(retry.backoff_base_ms.saturating_mul(u64::from(attempt)))
}

/// Base spacing between intents, stretched while the environment signals an
/// active or cooling animation.
pub fn spacing_from_cues(spacing: &SpacingConfig, snapshot: Option<&Snapshot>) -> f64 {
    let animation = snapshot
        .and_then(|s| s.cue("animation_state"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();
    if animation == "active" || animation == "cooldown" {
        spacing.base_ms * 1.5
    } else {
        spacing.base_ms
    }
}
