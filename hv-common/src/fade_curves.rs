//! Fade curves for segment envelopes
//!
//! Every scheduled segment gets a fade-in at its head, and a fade-out at its
//! tail when a successor crossfades into it. The curve decides how the gain
//! moves across the fade window.
//!
//! Linear is the default: a linear fade-out summed with a linear fade-in of the
//! same length gives unity gain across the overlap, so two segments carrying
//! the same level join without a step.

use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI};

/// Gain curve used across a fade window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FadeCurve {
    /// v(t) = t
    #[default]
    Linear,

    /// v(t) = 0.5 × (1 - cos(π × t))
    ///
    /// Zero slope at both ends. Still sums to unity with its own fade-out.
    SCurve,

    /// v(t) = sin(t × π/2)
    ///
    /// Constant power for uncorrelated material; correlated material bulges
    /// by up to 3 dB in the middle of the overlap.
    EqualPower,
}

impl FadeCurve {
    /// Gain at normalized position `position` (0.0 = fade start, 1.0 = fade end)
    pub fn fade_in(&self, position: f32) -> f32 {
        let t = position.clamp(0.0, 1.0);

        match self {
            FadeCurve::Linear => t,
            FadeCurve::SCurve => 0.5 * (1.0 - (PI * t).cos()),
            FadeCurve::EqualPower => (t * FRAC_PI_2).sin(),
        }
    }

    /// Gain at normalized position `position`, falling from 1.0 to 0.0
    pub fn fade_out(&self, position: f32) -> f32 {
        let t = position.clamp(0.0, 1.0);

        match self {
            FadeCurve::Linear => 1.0 - t,
            FadeCurve::SCurve => 0.5 * (1.0 + (PI * t).cos()),
            FadeCurve::EqualPower => (t * FRAC_PI_2).cos(),
        }
    }

    /// Steepest gain change per unit of normalized position
    ///
    /// Multiply by `1 / fade_frames` to get the largest per-frame gain step
    /// the envelope can produce.
    pub fn max_slope(&self) -> f32 {
        match self {
            FadeCurve::Linear => 1.0,
            FadeCurve::SCurve => FRAC_PI_2,
            FadeCurve::EqualPower => FRAC_PI_2,
        }
    }

    /// Parse curve from a config string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "linear" => Some(FadeCurve::Linear),
            "cosine" | "scurve" | "s-curve" | "s_curve" => Some(FadeCurve::SCurve),
            "equal_power" | "equalpower" => Some(FadeCurve::EqualPower),
            _ => None,
        }
    }
}
