//! Exponential smoothing of the fused stress level.

/// Default blend factor for new observations.
pub const DEFAULT_ALPHA: f64 = 0.3;

/// Exponential moving average seeded by its first observation.
#[derive(Debug, Clone)]
pub struct ExponentialSmoother {
    alpha: f64,
    state: Option<f64>,
}

impl ExponentialSmoother {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            state: None,
        }
    }

    /// Blend `raw` into the state and return the new smoothed value.
    pub fn update(&mut self, raw: f64) -> f64 {
        let next = match self.state {
            None => raw,
            Some(previous) => self.alpha * raw + (1.0 - self.alpha) * previous,
        };
        self.state = Some(next);
        next
    }

    pub fn current(&self) -> Option<f64> {
        self.state
    }
}

impl Default for ExponentialSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}
