use clap::ValueEnum;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::{PI, TAU};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PatternKind {
    Constant,
    Random,
    SineWave,
    Spike,
    GradualIncrease,
    GradualDecrease,
    /// day/night cycle, one simulated hour per step
    Diurnal,
    /// weekday plateau with weekend dips
    Weekly,
    /// random bursts over a jittery baseline
    Bursty,
}

/// Synthetic load source, stepped once per driver tick. Produces amounts
/// only; distribution stays with the engine.
pub struct LoadPattern {
    rng: StdRng,
    kind: PatternKind,
    base_load: f64,
    /// swing as a fraction of the base level
    amplitude: f64,
    /// cycles per step for the periodic curves, ramp rate for the gradual ones
    frequency: f64,
    max_load: f64,
    step: u64,
    peak_hour: u32,
    low_hour: u32,
    weekend_factor: f64,
    burst_probability: f64,
    burst_multiplier: f64,
}

impl LoadPattern {
    pub fn new(kind: PatternKind, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            kind,
            base_load: 10.0,
            amplitude: 0.5,
            frequency: 0.05,
            max_load: 250.0,
            step: 0,
            peak_hour: 14,
            low_hour: 3,
            weekend_factor: 0.5,
            burst_probability: 0.1,
            burst_multiplier: 5.0,
        }
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    pub fn base_load(&self) -> f64 {
        self.base_load
    }

    pub fn set_base_load(&mut self, base_load: f64) {
        self.base_load = base_load.max(0.0);
    }

    pub fn set_amplitude(&mut self, amplitude: f64) {
        self.amplitude = amplitude.max(0.0);
    }

    pub fn set_frequency(&mut self, frequency: f64) {
        self.frequency = frequency.max(0.0);
    }

    pub fn set_max_load(&mut self, max_load: f64) {
        self.max_load = max_load.max(0.0);
    }

    pub fn configure_diurnal(&mut self, peak_hour: u32, low_hour: u32) {
        self.peak_hour = peak_hour % 24;
        self.low_hour = low_hour % 24;
    }

    pub fn configure_weekly(&mut self, weekend_factor: f64) {
        self.weekend_factor = weekend_factor.clamp(0.0, 1.0);
    }

    pub fn configure_bursty(&mut self, probability: f64, multiplier: f64) {
        self.burst_probability = probability.clamp(0.0, 1.0);
        self.burst_multiplier = multiplier.max(1.0);
    }

    /// Next load amount under the configured curve.
    pub fn next_load(&mut self) -> u32 {
        let t = self.step as f64;
        self.step += 1;

        let level = match self.kind {
            PatternKind::Constant => self.base_load,
            PatternKind::Random => {
                let low = self.base_load * (1.0 - self.amplitude);
                let high = self.base_load * (1.0 + self.amplitude);
                if high > low {
                    self.rng.gen_range(low..high)
                } else {
                    self.base_load
                }
            }
            PatternKind::SineWave => {
                self.base_load * (1.0 + self.amplitude * (TAU * self.frequency * t).sin())
            }
            PatternKind::Spike => {
                let interval = (1.0 / self.frequency.max(1e-6)).round().max(1.0) as u64;
                if self.step % interval == 0 {
                    self.base_load * self.burst_multiplier
                } else {
                    self.base_load
                }
            }
            PatternKind::GradualIncrease => {
                (self.base_load + self.base_load * self.frequency * t).min(self.max_load)
            }
            PatternKind::GradualDecrease => {
                (self.base_load - self.base_load * self.frequency * t).max(0.0)
            }
            PatternKind::Diurnal => self.base_load * self.diurnal_factor(t),
            PatternKind::Weekly => {
                let day = (self.step - 1) / 24 % 7;
                if day >= 5 {
                    self.base_load * self.weekend_factor
                } else {
                    self.base_load
                }
            }
            PatternKind::Bursty => {
                if self.rng.gen_bool(self.burst_probability) {
                    self.base_load * self.burst_multiplier
                } else {
                    let jitter: f64 = self.rng.gen_range(-0.1..0.1);
                    self.base_load * (1.0 + jitter)
                }
            }
        };

        level.max(0.0).round() as u32
    }

    pub fn generate_batch(&mut self, count: usize) -> Vec<u32> {
        (0..count).map(|_| self.next_load()).collect()
    }

    /// Smooth trough-to-crest curve between the configured low and peak
    /// hours, scaled into [1 - amplitude, 1 + amplitude].
    fn diurnal_factor(&self, t: f64) -> f64 {
        let hour = t % 24.0;
        let since = |from: f64, to: f64| (to - from).rem_euclid(24.0);
        let rise_span = since(self.low_hour as f64, self.peak_hour as f64).max(1.0);
        let fall_span = (24.0 - rise_span).max(1.0);

        let from_low = since(self.low_hour as f64, hour);
        let position = if from_low <= rise_span {
            from_low / rise_span
        } else {
            1.0 - since(self.peak_hour as f64, hour) / fall_span
        };
        let crest = 0.5 * (1.0 - (PI * position).cos());
        1.0 - self.amplitude + 2.0 * self.amplitude * crest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(kind: PatternKind) -> LoadPattern {
        LoadPattern::new(kind, 99)
    }

    #[test]
    fn test_constant_returns_the_base() {
        let mut p = pattern(PatternKind::Constant);
        p.set_base_load(42.0);
        assert_eq!(vec![42, 42, 42], p.generate_batch(3));
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = LoadPattern::new(PatternKind::Bursty, 7);
        let mut b = LoadPattern::new(PatternKind::Bursty, 7);
        assert_eq!(a.generate_batch(50), b.generate_batch(50));
    }

    #[test]
    fn test_sine_stays_within_the_band() {
        let mut p = pattern(PatternKind::SineWave);
        p.set_base_load(100.0);
        p.set_amplitude(0.5);
        for amount in p.generate_batch(200) {
            assert!((50..=150).contains(&amount), "{amount} outside band");
        }
    }

    #[test]
    fn test_gradual_increase_ramps_to_the_cap() {
        let mut p = pattern(PatternKind::GradualIncrease);
        p.set_base_load(10.0);
        p.set_frequency(0.5);
        p.set_max_load(30.0);

        let batch = p.generate_batch(10);
        assert_eq!(10, batch[0]);
        assert_eq!(15, batch[1]);
        assert_eq!(30, batch[9]);
        assert!(batch.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_gradual_decrease_bottoms_out_at_zero() {
        let mut p = pattern(PatternKind::GradualDecrease);
        p.set_base_load(10.0);
        p.set_frequency(0.5);

        let batch = p.generate_batch(5);
        assert_eq!(vec![10, 5, 0, 0, 0], batch);
    }

    #[test]
    fn test_random_honors_the_amplitude_band() {
        let mut p = pattern(PatternKind::Random);
        p.set_base_load(100.0);
        p.set_amplitude(0.2);
        for amount in p.generate_batch(100) {
            assert!((80..=120).contains(&amount));
        }
    }

    #[test]
    fn test_spike_fires_on_the_interval() {
        let mut p = pattern(PatternKind::Spike);
        p.set_base_load(10.0);
        p.set_frequency(0.25);
        p.configure_bursty(0.1, 5.0);

        // interval of 4 steps
        assert_eq!(vec![10, 10, 10, 50, 10, 10, 10, 50], p.generate_batch(8));
    }

    #[test]
    fn test_weekly_dips_on_the_weekend() {
        let mut p = pattern(PatternKind::Weekly);
        p.set_base_load(100.0);
        p.configure_weekly(0.5);

        let week = p.generate_batch(24 * 7);
        assert_eq!(100, week[0]);
        assert_eq!(100, week[24 * 5 - 1]);
        assert_eq!(50, week[24 * 5]);
        assert_eq!(50, week[24 * 7 - 1]);
    }

    #[test]
    fn test_diurnal_peaks_at_peak_hour() {
        let mut p = pattern(PatternKind::Diurnal);
        p.set_base_load(100.0);
        p.set_amplitude(0.5);
        p.configure_diurnal(14, 3);

        let day = p.generate_batch(24);
        let peak = day[14];
        let low = day[3];
        assert!(peak > low, "peak {peak} vs low {low}");
        assert_eq!(150, peak);
        assert_eq!(50, low);
    }

    #[test]
    fn test_bursty_bursts_when_probability_is_one() {
        let mut p = pattern(PatternKind::Bursty);
        p.set_base_load(10.0);
        p.configure_bursty(1.0, 5.0);
        assert_eq!(vec![50, 50, 50], p.generate_batch(3));
    }
}
