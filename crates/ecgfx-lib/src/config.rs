use crate::error::{EcgError, EcgResult};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Butterworth bandpass parameters for the conditioning stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Lower -3 dB edge (Hz).
    pub lowcut_hz: f64,
    /// Upper -3 dB edge (Hz). Must stay below Nyquist.
    pub highcut_hz: f64,
    /// Prototype order; the bandpass has twice as many poles.
    pub order: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            lowcut_hz: 0.5,
            highcut_hz: 20.0,
            order: 2,
        }
    }
}

impl FilterConfig {
    pub fn validate(&self, fs: f64) -> EcgResult<()> {
        if !fs.is_finite() || fs <= 0.0 {
            return Err(EcgError::invalid(format!(
                "sampling rate must be positive, got {fs}"
            )));
        }
        if self.order == 0 {
            return Err(EcgError::invalid("filter order must be at least 1"));
        }
        let nyquist = 0.5 * fs;
        let ordered = self.lowcut_hz > 0.0
            && self.lowcut_hz < self.highcut_hz
            && self.highcut_hz < nyquist;
        if !ordered {
            return Err(EcgError::invalid(format!(
                "cutoffs must satisfy 0 < lowcut < highcut < fs/2 ({} Hz), got {} and {}",
                nyquist, self.lowcut_hz, self.highcut_hz
            )));
        }
        Ok(())
    }
}

/// Energy-envelope R-peak detector parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Moving window integration length (seconds).
    pub integration_window_s: f64,
    /// Minimum physiological RR distance / refractory period (seconds).
    pub min_rr_s: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            integration_window_s: 0.150,
            min_rr_s: 0.6,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> EcgResult<()> {
        if !(self.integration_window_s > 0.0) || !self.integration_window_s.is_finite() {
            return Err(EcgError::invalid("integration window must be positive"));
        }
        if !(self.min_rr_s > 0.0) || !self.min_rr_s.is_finite() {
            return Err(EcgError::invalid("minimum RR distance must be positive"));
        }
        Ok(())
    }
}

/// Search windows around each R-peak, all in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub pre_r_s: f64,
    pub post_r_s: f64,
    /// Span before Q searched for the P wave.
    pub p_search_s: f64,
    /// Span after S searched for the T wave.
    pub t_search_s: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            pre_r_s: 0.3,
            post_r_s: 0.4,
            p_search_s: 0.15,
            t_search_s: 0.2,
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> EcgResult<()> {
        let spans = [
            ("pre_r_s", self.pre_r_s),
            ("post_r_s", self.post_r_s),
            ("p_search_s", self.p_search_s),
            ("t_search_s", self.t_search_s),
        ];
        for (name, value) in spans {
            if !(value >= 0.0) || !value.is_finite() {
                return Err(EcgError::invalid(format!(
                    "{name} must be a non-negative duration, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Immutable parameter set threaded through every pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sampling_rate_hz: f64,
    pub filter: FilterConfig,
    pub detector: DetectorConfig,
    pub features: FeatureConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sampling_rate_hz: 50.0,
            filter: FilterConfig::default(),
            detector: DetectorConfig::default(),
            features: FeatureConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_sampling_rate(self, sampling_rate_hz: f64) -> Self {
        Self {
            sampling_rate_hz,
            ..self
        }
    }

    pub fn validate(&self) -> EcgResult<()> {
        self.filter.validate(self.sampling_rate_hz)?;
        self.detector.validate()?;
        self.features.validate()
    }

    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let cfg: PipelineConfig = toml::from_str(text).context("parsing pipeline config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }
}
