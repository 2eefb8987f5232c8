//! Output level metering
//!
//! RMS over each rendered block, smoothed so the renderer sees a level that
//! decays instead of flickering between blocks.

/// Smoothing factor applied to the previous level
const SMOOTHING: f32 = 0.8;

/// Block RMS level meter
#[derive(Debug, Clone, Default)]
pub struct LevelMeter {
    level: f32,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one rendered block; returns the updated level (0.0-1.0)
    pub fn process(&mut self, block: &[f32]) -> f32 {
        if block.is_empty() {
            return self.level;
        }

        let sum_squares: f32 = block.iter().map(|s| s * s).sum();
        let rms = (sum_squares / block.len() as f32).sqrt().min(1.0);

        self.level = SMOOTHING * self.level + (1.0 - SMOOTHING) * rms;
        self.level
    }

    pub fn level(&self) -> f32 {
        self.level
    }
}
