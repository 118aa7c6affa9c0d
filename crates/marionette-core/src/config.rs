//! Humanization profile configuration.
//!
//! Loaded from a TOML file; every stochastic sampler in the engine is driven
//! by the distributions declared here. All sections are serde-defaulted so a
//! partial profile file still yields a complete configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{MarionetteError, Result};

// =============================================================================
// Sample spec
// =============================================================================

/// Parameters of one bounded-Gaussian distribution.
///
/// Samplers draw from `N(mean, stdev)` and clamp into `[min, max]`; a
/// non-positive stdev collapses to the clamped mean.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleSpec {
    pub mean: f64,
    pub stdev: f64,
    pub min: f64,
    pub max: f64,
}

impl Default for SampleSpec {
    fn default() -> Self {
        Self { mean: 0.0, stdev: 0.0, min: 0.0, max: 0.0 }
    }
}

impl SampleSpec {
    pub const fn new(mean: f64, stdev: f64, min: f64, max: f64) -> Self {
        Self { mean, stdev, min, max }
    }
}

// =============================================================================
// Profile sections
// =============================================================================

/// Reaction and pause distributions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Delay between deciding on an action and starting it.
    pub reaction_ms: SampleSpec,
    /// Settle pause before committing a click.
    pub settle_ms: SampleSpec,
    /// Hesitation inserted by the confidence gate and double-checks.
    pub think_pause_ms: SampleSpec,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            reaction_ms: SampleSpec::new(200.0, 60.0, 80.0, 500.0),
            settle_ms: SampleSpec::new(60.0, 20.0, 20.0, 140.0),
            think_pause_ms: SampleSpec::new(150.0, 50.0, 60.0, 400.0),
        }
    }
}

/// Session rhythm: bursts, rests, and slow drift over a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Fraction of the rest mean added per completed step.
    pub fatigue_drift_rate: f64,
    /// Pixels of target drift accumulated per step.
    pub attention_drift_rate: f64,
    /// Rest taken between bursts of actions.
    pub rest_ms: SampleSpec,
    /// Number of consecutive actions before a rest.
    pub actions_per_burst: SampleSpec,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fatigue_drift_rate: 0.02,
            attention_drift_rate: 0.5,
            rest_ms: SampleSpec::new(900.0, 250.0, 300.0, 2000.0),
            actions_per_burst: SampleSpec::new(6.0, 2.0, 2.0, 12.0),
        }
    }
}

/// Idle behavior and cosmetic side-step chances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    /// Chance of an idle action before an intent.
    pub idle_action_chance: f64,
    pub hover_weight: f64,
    pub camera_glance_weight: f64,
    pub inventory_check_weight: f64,
    /// Pause taken at a screen edge.
    pub edge_pause_ms: SampleSpec,
    pub edge_pause_chance: f64,
    pub offscreen_travel_chance: f64,
    pub viewport_scan_chance: f64,
    pub tab_toggle_chance: f64,
    /// Idle duration after which the recovery sequence runs.
    pub idle_recovery_after_ms: u64,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            idle_action_chance: 0.2,
            hover_weight: 0.4,
            camera_glance_weight: 0.2,
            inventory_check_weight: 0.4,
            edge_pause_ms: SampleSpec::new(700.0, 200.0, 400.0, 1200.0),
            edge_pause_chance: 0.05,
            offscreen_travel_chance: 0.03,
            viewport_scan_chance: 0.05,
            tab_toggle_chance: 0.04,
            idle_recovery_after_ms: 45_000,
        }
    }
}

/// Gate strictness and re-check probabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatesConfig {
    /// Intents below this confidence trigger the confidence gate.
    pub confidence_threshold: f64,
    /// Chance of re-checking hover text before a click.
    pub hover_check_chance: f64,
    /// Chance of double-checking an irreversible action label.
    pub double_check_chance: f64,
    /// Chance of shuffling a batch before execution.
    pub reorder_chance: f64,
    /// Wait before re-checking an occluded element.
    pub occlusion_wait_ms: SampleSpec,
}

impl Default for GatesConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            hover_check_chance: 0.6,
            double_check_chance: 0.7,
            reorder_chance: 0.2,
            occlusion_wait_ms: SampleSpec::new(350.0, 100.0, 150.0, 800.0),
        }
    }
}

/// Dispatch retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Maximum re-aim nudge applied between attempts, in pixels.
    pub reaim_px: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff_base_ms: 120,
            backoff_max_ms: 800,
            reaim_px: 3.0,
        }
    }
}

/// Interrupt behavior on unexpected UI and panic chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterruptConfig {
    /// Pause taken when an unexpected interface or modal is open.
    pub delay_ms: SampleSpec,
    /// Chat keywords that abort the batch.
    pub panic_keywords: Vec<String>,
}

impl Default for InterruptConfig {
    fn default() -> Self {
        Self {
            delay_ms: SampleSpec::new(180.0, 60.0, 80.0, 420.0),
            panic_keywords: vec![
                "trade".to_string(),
                "duel".to_string(),
                "stake".to_string(),
                "accept".to_string(),
            ],
        }
    }
}

/// Inter-intent spacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpacingConfig {
    /// Base spacing between intents before cue adjustment.
    pub base_ms: f64,
    /// Jitter added on top of the adjusted base.
    pub jitter_ms: SampleSpec,
    /// Window-center shift beyond which click/move targets are re-aimed.
    pub window_shift_threshold_px: f64,
}

impl Default for SpacingConfig {
    fn default() -> Self {
        Self {
            base_ms: 200.0,
            jitter_ms: SampleSpec::new(30.0, 10.0, 5.0, 80.0),
            window_shift_threshold_px: 4.0,
        }
    }
}

// =============================================================================
// Top-level profile
// =============================================================================

/// Statistical profile shaping every delay and motion the engine produces.
///
/// Loaded read-only once per run; the engine never mutates it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HumanizationProfile {
    pub timing: TimingConfig,
    pub session: SessionConfig,
    pub idle: IdleConfig,
    pub gates: GatesConfig,
    pub retry: RetryConfig,
    pub interrupt: InterruptConfig,
    pub spacing: SpacingConfig,
}

impl HumanizationProfile {
    /// Load a profile from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let profile: HumanizationProfile = toml::from_str(&content)?;
        info!("Humanization profile loaded from {}", path.display());
        Ok(profile)
    }

    /// Load a profile, falling back to defaults when the file is missing or
    /// unparsable.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(profile) => profile,
            Err(e) => {
                warn!(
                    "Failed to load profile from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the profile to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| MarionetteError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Humanization profile saved to {}", path.display());
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
