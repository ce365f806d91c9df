//! Learning-rate schedules: warmup followed by inverse-square-root decay.

use crate::backend::LearningRate;
use serde::{Deserialize, Serialize};

/// Learning-rate multiplier for a given optimizer step.
///
/// Step 0 is treated as step 1 so the curve never raises zero to a negative
/// power. The multiplier grows linearly while the ramp term is the smaller
/// one and decays as `step^-0.5` afterwards; the two branches meet just
/// before `warmup`. A `warmup` of zero skips the ramp entirely.
pub fn rate(step: u64, d_model: f64, factor: f64, warmup: u64) -> f64 {
    let step = step.max(1) as f64;
    let warmup = warmup as f64;
    factor * (d_model.powf(-0.5) * f64::min(step.powf(-0.5), step * 2.0 * warmup.powf(-1.5)))
}

/// A curve mapping a step count to a learning-rate multiplier.
pub trait LrMultiplier {
    fn multiplier(&self, step: u64) -> f64;
}

/// Linear warmup then inverse-square-root decay, scaled by model width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WarmupInverseSqrt {
    pub d_model: f64,
    pub factor: f64,
    pub warmup: u64,
}

impl WarmupInverseSqrt {
    pub fn new(d_model: f64, factor: f64, warmup: u64) -> Self {
        Self {
            d_model,
            factor,
            warmup,
        }
    }

    /// Step at which the linear ramp meets the decay branch.
    ///
    /// The ramp has slope `2 * warmup^-1.5`, so the curve peaks at
    /// `warmup * 2^(-2/3)`, slightly before `warmup` itself.
    pub fn peak_step(&self) -> f64 {
        self.warmup as f64 * 2f64.powf(-2.0 / 3.0)
    }
}

impl LrMultiplier for WarmupInverseSqrt {
    fn multiplier(&self, step: u64) -> f64 {
        rate(step, self.d_model, self.factor, self.warmup)
    }
}

/// The step counter a schedule is driven by. Only ever moves forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleState {
    step: u64,
}

impl ScheduleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    /// Increment the counter and return the new value.
    pub fn advance(&mut self) -> u64 {
        self.step += 1;
        self.step
    }
}

/// Binds a multiplier curve to an optimizer's base learning rate.
///
/// Each trial gets its own `LambdaLr`, so the counter starts from zero whenever
/// a new optimizer does.
#[derive(Debug, Clone)]
pub struct LambdaLr<S: LrMultiplier = WarmupInverseSqrt> {
    base_lr: f64,
    curve: S,
    state: ScheduleState,
}

impl<S: LrMultiplier> LambdaLr<S> {
    /// Create the schedule and set the optimizer to the step-0 learning rate.
    pub fn new<O: LearningRate + ?Sized>(base_lr: f64, curve: S, optimizer: &mut O) -> Self {
        let schedule = Self {
            base_lr,
            curve,
            state: ScheduleState::new(),
        };
        optimizer.set_lr(schedule.current_lr());
        schedule
    }

    /// Advance one optimizer step and apply the new learning rate.
    pub fn step<O: LearningRate + ?Sized>(&mut self, optimizer: &mut O) -> f64 {
        self.state.advance();
        let lr = self.current_lr();
        optimizer.set_lr(lr);
        lr
    }

    pub fn current_lr(&self) -> f64 {
        self.base_lr * self.curve.multiplier(self.state.step())
    }

    pub fn base_lr(&self) -> f64 {
        self.base_lr
    }

    pub fn state(&self) -> ScheduleState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingOptimizer {
        lr: f64,
    }

    impl LearningRate for RecordingOptimizer {
        fn lr(&self) -> f64 {
            self.lr
        }

        fn set_lr(&mut self, lr: f64) {
            self.lr = lr;
        }
    }

    #[test]
    fn test_step_zero_matches_step_one() {
        assert_eq!(rate(0, 512.0, 1.0, 4000), rate(1, 512.0, 1.0, 4000));
    }

    #[test]
    fn test_first_step_value() {
        let (f, d, w) = (2.0f64, 64.0f64, 100u64);
        let expected = f * d.powf(-0.5) * f64::min(1.0, 2.0 / (w as f64).powf(1.5));
        assert!((rate(1, d, f, w) - expected).abs() < 1e-15);
    }

    #[test]
    fn test_warmup_then_decay() {
        let curve = WarmupInverseSqrt::new(128.0, 1.0, 50);
        let peak = curve.peak_step();
        for step in 1..peak.floor() as u64 {
            assert!(curve.multiplier(step) < curve.multiplier(step + 1));
        }
        for step in peak.ceil() as u64..500 {
            assert!(curve.multiplier(step) >= curve.multiplier(step + 1));
        }
    }

    #[test]
    fn test_non_increasing_after_warmup() {
        let curve = WarmupInverseSqrt::new(512.0, 2.0, 4000);
        for step in 4000..4100 {
            assert!(curve.multiplier(step) >= curve.multiplier(step + 1));
        }
    }

    #[test]
    fn test_zero_warmup_is_pure_decay() {
        assert!((rate(4, 1.0, 1.0, 0) - 0.5).abs() < 1e-15);
    }

    #[test]
    fn test_lambda_lr_sets_initial_rate() {
        let mut opt = RecordingOptimizer { lr: 123.0 };
        let curve = WarmupInverseSqrt::new(16.0, 1.0, 10);
        let schedule = LambdaLr::new(0.5, curve, &mut opt);
        assert_eq!(schedule.state().step(), 0);
        assert!((opt.lr() - 0.5 * rate(1, 16.0, 1.0, 10)).abs() < 1e-15);
    }

    #[test]
    fn test_lambda_lr_first_step_sees_one() {
        let mut opt = RecordingOptimizer { lr: 0.0 };
        let curve = WarmupInverseSqrt::new(16.0, 1.0, 10);
        let mut schedule = LambdaLr::new(1.0, curve, &mut opt);

        let lr = schedule.step(&mut opt);
        assert_eq!(schedule.state().step(), 1);
        assert_eq!(lr, rate(1, 16.0, 1.0, 10));

        let lr = schedule.step(&mut opt);
        assert_eq!(schedule.state().step(), 2);
        assert_eq!(lr, rate(2, 16.0, 1.0, 10));
        assert_eq!(opt.lr(), lr);
    }
}
