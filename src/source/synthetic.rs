//! Simulated receiver
//!
//! Each integration is `bins` complex baseband samples at `sample_rate`: complex
//! Gaussian noise, a set of stationary tones and a set of linear sweeps. The samples are transformed, fft-shifted and converted to dB, so
//! one integration spans `bins / sample_rate` seconds of signal.

use super::{SourceError, SpectrumSource};
use crate::spectrum::{FrequencyAxis, Integration};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};
use std::sync::Arc;

/// Magnitude floor applied before taking the logarithm
const MAGNITUDE_FLOOR: f64 = 1e-12;

/// Slack when turning a duration into a whole number of integrations
const DURATION_TOLERANCE: f64 = 1e-9;

/// Linear chirp with rate `(end - start) / duration` Hz/s
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sweep {
    pub start: f64,
    pub end: f64,
    pub duration: f64,
}

/// Phase law used for every sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SweepLaw {
    /// `exp(i*pi*k*t^2)` over the running time since the first integration.
    /// The instantaneous frequency `k*t` keeps rising and aliases around the band.
    #[default]
    Continuous,
    /// `exp(i*(2*pi*start*tau + pi*k*tau^2))` with `tau = t mod duration`,
    /// covering `start..end` once per period
    Periodic,
}

impl SweepLaw {
    fn phase(self, sweep: &Sweep, t: f64) -> f64 {
        let rate = (sweep.end - sweep.start) / sweep.duration;
        match self {
            SweepLaw::Continuous => PI * rate * t * t,
            SweepLaw::Periodic => {
                let tau = t.rem_euclid(sweep.duration);
                TAU * sweep.start * tau + PI * rate * tau * tau
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub sample_rate: f64,
    pub bins: usize,
    /// Added to the axis only; tones and sweeps are baseband offsets
    pub center_frequency: f64,
    /// Variance of each noise component
    pub noise_power: f64,
    pub tones: Vec<f64>,
    pub sweeps: Vec<Sweep>,
    pub sweep_law: SweepLaw,
    /// Total simulated time in seconds; `None` runs forever
    pub duration: Option<f64>,
    /// Fixed noise seed, for reproducible output
    pub seed: Option<u64>,
}

#[derive(Debug, Clone)]
struct Tone {
    frequency: f64,
    /// Phase at the start of the next integration, in [0, 2*pi)
    phase: f64,
}

pub struct SyntheticSource {
    sample_rate: f64,
    bins: usize,
    tones: Vec<Tone>,
    sweeps: Vec<Sweep>,
    sweep_law: SweepLaw,
    noise: Normal<f64>,
    rng: StdRng,
    fft: Arc<dyn Fft<f64>>,
    axis: FrequencyAxis,
    index: u64,
    limit: Option<u64>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self, SourceError> {
        if config.bins == 0 {
            return Err(SourceError::InvalidConfig(
                "bins must be greater than zero".to_string(),
            ));
        }
        if !(config.noise_power.is_finite() && config.noise_power >= 0.0) {
            return Err(SourceError::InvalidConfig(format!(
                "noise power must be a finite non-negative number, got {}",
                config.noise_power
            )));
        }
        if let Some(sweep) = config
            .sweeps
            .iter()
            .find(|s| !(s.duration.is_finite() && s.duration > 0.0))
        {
            return Err(SourceError::InvalidConfig(format!(
                "sweep duration must be positive, got {}",
                sweep.duration
            )));
        }

        let axis = FrequencyAxis::fft_shifted(
            config.sample_rate,
            config.bins,
            config.center_frequency,
        )?;

        let integration_time = config.bins as f64 / config.sample_rate;
        let limit = match config.duration {
            Some(duration) if !(duration.is_finite() && duration >= 0.0) => {
                return Err(SourceError::InvalidConfig(format!(
                    "duration must be a finite non-negative number, got {}",
                    duration
                )));
            }
            Some(duration) => Some((duration / integration_time - DURATION_TOLERANCE).ceil() as u64),
            None => None,
        };

        let noise = Normal::new(0.0, config.noise_power.sqrt())
            .map_err(|e| SourceError::InvalidConfig(format!("noise distribution: {}", e)))?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let fft = FftPlanner::new().plan_fft_forward(config.bins);

        Ok(Self {
            sample_rate: config.sample_rate,
            bins: config.bins,
            tones: config
                .tones
                .iter()
                .map(|&frequency| Tone {
                    frequency,
                    phase: 0.0,
                })
                .collect(),
            sweeps: config.sweeps,
            sweep_law: config.sweep_law,
            noise,
            rng,
            fft,
            axis,
            index: 0,
            limit,
        })
    }

    /// Seconds of signal covered by one integration
    pub fn integration_time(&self) -> f64 {
        self.bins as f64 / self.sample_rate
    }

    /// Number of integrations a bounded source produces in total
    pub fn integration_limit(&self) -> Option<u64> {
        self.limit
    }

    /// Current phase of every tone, in configuration order
    #[cfg(test)]
    pub fn phases(&self) -> Vec<f64> {
        self.tones.iter().map(|tone| tone.phase).collect()
    }

    fn synthesize(&mut self) -> Vec<Complex<f64>> {
        let fs = self.sample_rate;
        let integration_time = self.integration_time();

        let noise = &self.noise;
        let rng = &mut self.rng;
        let mut samples: Vec<Complex<f64>> = (0..self.bins)
            .map(|_| Complex::new(noise.sample(rng), noise.sample(rng)))
            .collect();

        for tone in &mut self.tones {
            let omega = TAU * tone.frequency;
            for (i, sample) in samples.iter_mut().enumerate() {
                let t = i as f64 / fs;
                *sample += Complex::from_polar(1.0, omega * t + tone.phase);
            }
            tone.phase = (tone.phase + omega * integration_time).rem_euclid(TAU);
        }

        let start = self.index as f64 * integration_time;
        for sweep in &self.sweeps {
            for (i, sample) in samples.iter_mut().enumerate() {
                let phase = self.sweep_law.phase(sweep, start + i as f64 / fs);
                *sample += Complex::from_polar(1.0, phase);
            }
        }

        samples
    }
}

impl SpectrumSource for SyntheticSource {
    fn axis(&self) -> &FrequencyAxis {
        &self.axis
    }

    fn next_integration(&mut self) -> Option<Integration> {
        if self.limit.is_some_and(|limit| self.index >= limit) {
            return None;
        }

        let mut samples = self.synthesize();
        self.fft.process(&mut samples);

        let mut spectrum: Vec<f32> = samples
            .iter()
            .map(|x| (10.0 * x.norm().max(MAGNITUDE_FLOOR).log10()) as f32)
            .collect();
        spectrum.rotate_right(self.bins / 2);

        let integration = Integration::new(self.index, spectrum);
        self.index += 1;
        Some(integration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config(tones: Vec<f64>) -> SyntheticConfig {
        SyntheticConfig {
            sample_rate: 1024.0,
            bins: 1024,
            center_frequency: 0.0,
            noise_power: 0.0,
            tones,
            sweeps: Vec::new(),
            sweep_law: SweepLaw::Continuous,
            duration: None,
            seed: Some(7),
        }
    }

    fn peak_index(spectrum: &[f32]) -> usize {
        spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap()
    }

    #[test]
    fn test_tone_lands_on_its_bin() {
        let mut source = SyntheticSource::new(quiet_config(vec![100.0])).unwrap();
        let integration = source.next_integration().unwrap();

        let peak = peak_index(integration.spectrum());
        assert_eq!(peak, 612);
        assert_eq!(source.axis().as_slice()[peak], 100.0);
        // |X| = bins for a unit tone on a bin centre
        assert!((integration.spectrum()[peak] - 10.0 * 1024f32.log10()).abs() < 1e-3);
    }

    #[test]
    fn test_tone_phase_carries_across_calls() {
        let mut config = quiet_config(vec![0.25, 1.5]);
        config.sample_rate = 1000.0;
        config.bins = 1000;
        let mut source = SyntheticSource::new(config).unwrap();
        assert_eq!(source.phases(), vec![0.0, 0.0]);

        source.next_integration();
        let phases = source.phases();
        assert!((phases[0] - PI / 2.0).abs() < 1e-9);
        assert!((phases[1] - PI).abs() < 1e-9);

        source.next_integration();
        let phases = source.phases();
        assert!((phases[0] - PI).abs() < 1e-9);
        assert!(phases[1].abs() < 1e-9);
    }

    #[test]
    fn test_phase_continuity_matches_one_long_capture() {
        // Two consecutive integrations of a tone must equal one capture twice
        // as long, split in half.
        let mut config = quiet_config(vec![3.3]);
        config.sample_rate = 64.0;
        config.bins = 64;
        let mut source = SyntheticSource::new(config).unwrap();
        source.next_integration();
        let second = source.synthesize();

        let omega = TAU * 3.3;
        for (i, sample) in second.iter().enumerate() {
            let t = 1.0 + i as f64 / 64.0;
            let expected = Complex::from_polar(1.0, omega * t);
            assert!((sample - expected).norm() < 1e-9);
        }
    }

    #[test]
    fn test_duration_bounds_integration_count() {
        let mut config = quiet_config(vec![]);
        config.sample_rate = 1000.0;
        config.bins = 10;
        config.duration = Some(0.1);
        let mut source = SyntheticSource::new(config).unwrap();
        assert_eq!(source.integration_limit(), Some(10));

        let timestamps: Vec<u64> = std::iter::from_fn(|| source.next_integration())
            .map(|i| i.timestamp())
            .collect();
        assert_eq!(timestamps, (0..10).collect::<Vec<_>>());
        assert!(source.next_integration().is_none());
    }

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let mut config = quiet_config(vec![50.0]);
        config.noise_power = 1.0;
        let mut a = SyntheticSource::new(config.clone()).unwrap();
        let mut b = SyntheticSource::new(config).unwrap();

        assert_eq!(a.next_integration(), b.next_integration());
        assert_eq!(a.next_integration(), b.next_integration());
    }

    #[test]
    fn test_continuous_sweep_phase_follows_running_time() {
        let mut config = quiet_config(vec![]);
        config.sample_rate = 100.0;
        config.bins = 10;
        config.sweeps = vec![Sweep {
            start: 10.0,
            end: 30.0,
            duration: 2.0,
        }];
        let mut source = SyntheticSource::new(config).unwrap();
        source.next_integration();
        source.next_integration();
        let samples = source.synthesize();

        // Third integration, sample 3: t = 0.23 s, k = 10 Hz/s
        let t: f64 = 0.23;
        let expected = Complex::from_polar(1.0, PI * 10.0 * t * t);
        assert!((samples[3] - expected).norm() < 1e-9);
        assert!((samples[0] - Complex::from_polar(1.0, PI * 10.0 * 0.04)).norm() < 1e-9);
    }

    #[test]
    fn test_periodic_sweep_restarts_each_period() {
        let mut config = quiet_config(vec![]);
        config.sample_rate = 100.0;
        config.bins = 10;
        config.sweep_law = SweepLaw::Periodic;
        config.sweeps = vec![Sweep {
            start: 5.0,
            end: 25.0,
            duration: 0.2,
        }];
        let mut source = SyntheticSource::new(config).unwrap();
        let first = source.synthesize();
        source.next_integration();
        source.next_integration();
        // t = 0.2 s is the start of the second period
        let third = source.synthesize();

        assert!((third[0] - first[0]).norm() < 1e-9);
        let tau: f64 = 0.07;
        let expected = Complex::from_polar(1.0, TAU * 5.0 * tau + PI * 100.0 * tau * tau);
        assert!((third[7] - expected).norm() < 1e-9);
    }

    #[test]
    fn test_constant_periodic_sweep_behaves_like_tone() {
        let mut config = quiet_config(vec![]);
        config.sweep_law = SweepLaw::Periodic;
        config.sweeps = vec![Sweep {
            start: -200.0,
            end: -200.0,
            duration: 1.0,
        }];
        let mut source = SyntheticSource::new(config).unwrap();

        for _ in 0..3 {
            let integration = source.next_integration().unwrap();
            assert_eq!(peak_index(integration.spectrum()), 312);
        }
    }

    #[test]
    fn test_center_frequency_shifts_axis_only() {
        let mut config = quiet_config(vec![100.0]);
        config.center_frequency = 1e6;
        let mut source = SyntheticSource::new(config).unwrap();
        let integration = source.next_integration().unwrap();

        let peak = peak_index(integration.spectrum());
        assert_eq!(peak, 612);
        assert_eq!(source.axis().as_slice()[peak], 1e6 + 100.0);
    }

    #[test]
    fn test_rejects_misconfiguration() {
        let mut config = quiet_config(vec![]);
        config.bins = 0;
        assert!(matches!(
            SyntheticSource::new(config),
            Err(SourceError::InvalidConfig(_))
        ));

        let mut config = quiet_config(vec![]);
        config.noise_power = -1.0;
        assert!(SyntheticSource::new(config).is_err());

        let mut config = quiet_config(vec![]);
        config.sweeps = vec![Sweep {
            start: 0.0,
            end: 1.0,
            duration: 0.0,
        }];
        assert!(SyntheticSource::new(config).is_err());

        let mut config = quiet_config(vec![]);
        config.sample_rate = 0.0;
        assert!(matches!(
            SyntheticSource::new(config),
            Err(SourceError::Axis(_))
        ));
    }
}
