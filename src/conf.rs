use crate::logging::LogSettings;
use crate::producer::TimestampMode;
use crate::reduce::BinReduction;
use crate::socket::{DEFAULT_SOCKET_PATH, expand_socket_path};
use crate::source::{Sweep, SweepLaw, SyntheticConfig};
use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Settings {
    /// Store service socket; `$UID` and `$RUNTIME_DIRECTORY` are expanded
    #[serde(default = "default_socket_path")]
    pub socket_path: String,

    #[serde(default)]
    pub spectrum: SpectrumSettings,

    #[serde(default)]
    pub simulation: SimulationSettings,

    #[serde(default)]
    pub producer: ProducerSettings,

    #[serde(default)]
    pub monitor: MonitorSettings,

    #[serde(default)]
    pub logging: LogSettings,
}

/// Shape of the spectra the receiver produces
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SpectrumSettings {
    /// Complex sample rate in Hz, which is also the displayed bandwidth
    pub sample_rate: f64,
    /// FFT size, i.e. samples per spectrum
    pub bins: usize,
    pub center_frequency: f64,
}

impl Default for SpectrumSettings {
    fn default() -> Self {
        Self {
            sample_rate: 2.048e9,
            bins: 2048,
            center_frequency: 0.0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SimulationSettings {
    pub noise_power: f64,
    /// Stationary tone frequencies in Hz, relative to the centre
    pub tones: Vec<f64>,
    pub sweeps: Vec<Sweep>,
    pub sweep_law: SweepLaw,
    /// Noise seed; unset draws a fresh seed per run
    pub seed: Option<u64>,
    /// Seconds of signal written by `generate`
    pub duration: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            noise_power: 1.0,
            tones: vec![25e6, 85e6, 41e6, 900e6, -400e6, -401e6, -402e6],
            sweeps: vec![
                Sweep {
                    start: 92e6,
                    end: 94e6,
                    duration: 0.1,
                },
                Sweep {
                    start: -350e6,
                    end: -15e6,
                    duration: 0.3,
                },
            ],
            sweep_law: SweepLaw::default(),
            seed: None,
            duration: 0.1,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProducerSettings {
    pub integration_period_ms: u64,
    pub timestamps: TimestampMode,
    /// Replay this file instead of simulating
    pub replay: Option<PathBuf>,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            integration_period_ms: 1000,
            timestamps: TimestampMode::Sequence,
            replay: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MonitorSettings {
    pub poll_interval_ms: u64,
    pub waterfall_height: NonZeroUsize,
    /// Default output width when the client does not ask for one
    pub width: usize,
    pub reduction: BinReduction,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            waterfall_height: NonZeroUsize::new(200).unwrap_or(NonZeroUsize::MIN),
            width: 1000,
            reduction: BinReduction::Max,
        }
    }
}

fn default_socket_path() -> String {
    DEFAULT_SOCKET_PATH.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            spectrum: SpectrumSettings::default(),
            simulation: SimulationSettings::default(),
            producer: ProducerSettings::default(),
            monitor: MonitorSettings::default(),
            logging: LogSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from `explicit`, or from ~/.config/rfmon/config.toml
    ///
    /// A missing default file yields defaults; an explicit file must exist.
    /// Returns the settings and the file they came from, if any.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<(Self, Option<PathBuf>)> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match config_path() {
                Some(path) if path.exists() => path,
                _ => return Ok((Self::default(), None)),
            },
        };

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let settings: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        settings
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok((settings, Some(path)))
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        let spectrum = &self.spectrum;
        if !(spectrum.sample_rate.is_finite() && spectrum.sample_rate > 0.0) {
            anyhow::bail!(
                "spectrum.sample_rate must be positive, got {}",
                spectrum.sample_rate
            );
        }
        if spectrum.bins == 0 {
            anyhow::bail!("spectrum.bins must be greater than zero");
        }
        if !spectrum.center_frequency.is_finite() {
            anyhow::bail!("spectrum.center_frequency must be finite");
        }

        let simulation = &self.simulation;
        if !(simulation.noise_power.is_finite() && simulation.noise_power >= 0.0) {
            anyhow::bail!(
                "simulation.noise_power must be zero or positive, got {}",
                simulation.noise_power
            );
        }
        if let Some(sweep) = simulation
            .sweeps
            .iter()
            .find(|s| !(s.duration.is_finite() && s.duration > 0.0))
        {
            anyhow::bail!(
                "simulation sweep {} Hz -> {} Hz needs a positive duration, got {}",
                sweep.start,
                sweep.end,
                sweep.duration
            );
        }
        if !(simulation.duration.is_finite() && simulation.duration > 0.0) {
            anyhow::bail!(
                "simulation.duration must be positive, got {}",
                simulation.duration
            );
        }

        if self.producer.integration_period_ms == 0 {
            anyhow::bail!("producer.integration_period_ms must be greater than zero");
        }
        if self.monitor.poll_interval_ms == 0 {
            anyhow::bail!("monitor.poll_interval_ms must be greater than zero");
        }
        if self.monitor.width == 0 {
            anyhow::bail!("monitor.width must be greater than zero");
        }

        Ok(())
    }

    pub fn socket_path(&self) -> String {
        expand_socket_path(&self.socket_path)
    }

    pub fn integration_period(&self) -> Duration {
        Duration::from_millis(self.producer.integration_period_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.poll_interval_ms)
    }

    /// Synthetic source parameters; `duration` bounds the run, `None` streams
    pub fn synthetic_config(&self, duration: Option<f64>) -> SyntheticConfig {
        SyntheticConfig {
            sample_rate: self.spectrum.sample_rate,
            bins: self.spectrum.bins,
            center_frequency: self.spectrum.center_frequency,
            noise_power: self.simulation.noise_power,
            tones: self.simulation.tones.clone(),
            sweeps: self.simulation.sweeps.clone(),
            sweep_law: self.simulation.sweep_law,
            duration,
            seed: self.simulation.seed,
        }
    }
}

/// Get the path to the config file: ~/.config/rfmon/config.toml
pub fn config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "rfmon").map(|dirs| dirs.config_dir().join("config.toml"))
}
