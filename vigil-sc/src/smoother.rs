//! Exponential smoothing of the raw emotion vector for display

use crate::emotion::{EmotionVector, EMOTION_SLOTS};

/// One EMA step: `display * (1 - alpha) + raw * alpha`.
///
/// Non-finite raw components are treated as zero.
pub fn smooth(display: &EmotionVector, raw: &EmotionVector, alpha: f32) -> EmotionVector {
    let mut out = [0.0f32; EMOTION_SLOTS];
    for (i, value) in out.iter_mut().enumerate() {
        let r = if raw.0[i].is_finite() { raw.0[i] } else { 0.0 };
        *value = display.0[i] * (1.0 - alpha) + r * alpha;
    }
    EmotionVector(out)
}

/// Display-side smoothing state.
///
/// Ticked on the display cadence; never touches the raw vector.
#[derive(Debug, Clone)]
pub struct EmotionSmoother {
    display: EmotionVector,
    alpha: f32,
}

impl EmotionSmoother {
    /// `alpha` is clamped into (0, 1]
    pub fn new(alpha: f32) -> Self {
        let alpha = if alpha.is_finite() {
            alpha.clamp(f32::EPSILON, 1.0)
        } else {
            1.0
        };
        Self {
            display: EmotionVector::default(),
            alpha,
        }
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Advance one tick toward `raw` and return the new display vector
    pub fn tick(&mut self, raw: &EmotionVector) -> EmotionVector {
        self.display = smooth(&self.display, raw, self.alpha);
        self.display
    }

    pub fn display(&self) -> EmotionVector {
        self.display
    }

    /// Display values as bar percentages in [0, 100]
    pub fn percentages(&self) -> [f32; EMOTION_SLOTS] {
        self.display.to_percentages()
    }

    pub fn reset(&mut self) {
        self.display = EmotionVector::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_tick() {
        let mut smoother = EmotionSmoother::new(0.02);
        let out = smoother.tick(&EmotionVector::splat(1.0));
        for v in out.values() {
            assert!((v - 0.02).abs() < 1e-6);
        }
    }

    #[test]
    fn test_fifty_ticks_toward_one() {
        let mut smoother = EmotionSmoother::new(0.02);
        let raw = EmotionVector::splat(1.0);
        for _ in 0..50 {
            smoother.tick(&raw);
        }
        // 1 - 0.98^50
        let expected = 1.0 - 0.98f32.powi(50);
        for v in smoother.display().values() {
            assert!((v - expected).abs() < 1e-4);
            assert!((v - 0.636).abs() < 1e-3);
        }
    }

    #[test]
    fn test_constant_raw_is_fixed_point() {
        let mut smoother = EmotionSmoother::new(0.02);
        let raw = EmotionVector::new([0.3, 0.1, 0.15, 0.2, 0.25]);
        for _ in 0..5000 {
            smoother.tick(&raw);
        }
        let display = smoother.display();
        for (d, r) in display.values().iter().zip(raw.values()) {
            assert!((d - r).abs() < 1e-4);
        }
    }

    #[test]
    fn test_alpha_one_tracks_raw() {
        let mut smoother = EmotionSmoother::new(1.0);
        let raw = EmotionVector::new([0.5, 0.0, 1.0, 0.25, 0.75]);
        assert_eq!(smoother.tick(&raw), raw);
    }

    #[test]
    fn test_non_finite_raw_treated_as_zero() {
        let mut smoother = EmotionSmoother::new(0.5);
        smoother.tick(&EmotionVector::splat(1.0));
        let out = smoother.tick(&EmotionVector::new([f32::NAN, f32::INFINITY, 1.0, 1.0, 1.0]));
        assert!((out.0[0] - 0.25).abs() < 1e-6);
        assert!((out.0[1] - 0.25).abs() < 1e-6);
        assert!((out.0[2] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_percentages_clamped() {
        let mut smoother = EmotionSmoother::new(1.0);
        smoother.tick(&EmotionVector::new([0.5, 1.0, 0.0, 0.123, 0.999]));
        let bars = smoother.percentages();
        assert!((bars[0] - 50.0).abs() < 1e-4);
        assert!((bars[1] - 100.0).abs() < 1e-4);
        assert_eq!(bars[2], 0.0);
        assert!(bars.iter().all(|b| (0.0..=100.0).contains(b)));
    }

    #[test]
    fn test_reset() {
        let mut smoother = EmotionSmoother::new(0.5);
        smoother.tick(&EmotionVector::splat(1.0));
        smoother.reset();
        assert_eq!(smoother.display(), EmotionVector::default());
    }

    #[test]
    fn test_invalid_alpha_clamped() {
        assert_eq!(EmotionSmoother::new(2.0).alpha(), 1.0);
        assert_eq!(EmotionSmoother::new(f32::NAN).alpha(), 1.0);
        assert!(EmotionSmoother::new(0.0).alpha() > 0.0);
    }
}
