use crate::{
    config::{DetectorConfig, PipelineConfig},
    error::{EcgError, EcgResult},
    features::fiducial::{extract_features, FeatureExtraction},
    filters::butterworth::condition,
    signal::{Events, RRSeries, RawSignal, TimeSeries},
};
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Standard deviations at or below this are treated as a flat line.
const MIN_STD: f64 = 1e-9;

/// Combined result of the conditioning → detection → extraction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturePipelineResult {
    pub fs: f64,
    pub sample_count: usize,
    #[serde(skip)]
    pub filtered: TimeSeries,
    pub events: Events,
    pub rr: RRSeries,
    #[serde(flatten)]
    pub extraction: FeatureExtraction,
}

/// Detect R-peaks in an already band-passed ECG.
pub fn detect_r_peaks(filtered: &TimeSeries, cfg: &DetectorConfig) -> EcgResult<Events> {
    cfg.validate()?;
    if !(filtered.fs > 0.0) || !filtered.fs.is_finite() {
        return Err(EcgError::invalid(format!(
            "sampling rate must be positive, got {}",
            filtered.fs
        )));
    }
    let win = integration_window(filtered.fs, cfg);
    if filtered.len() < win {
        return Err(EcgError::InsufficientData {
            stage: "R-peak detection",
            required: win,
            actual: filtered.len(),
        });
    }

    let envelope = match energy_envelope(&filtered.data, win) {
        Ok(env) => env,
        Err(EcgError::DegenerateSignal) => {
            debug!("flat signal, no R-peaks to detect");
            return Ok(Events::from_indices(Vec::new()));
        }
        Err(err) => return Err(err),
    };

    let threshold = mean(&envelope);
    let distance = refractory_samples(filtered.fs, cfg);
    let peaks = pick_peaks(&envelope, threshold, distance);
    info!(
        "detected {} R-peaks in {} samples (window {}, refractory {})",
        peaks.len(),
        filtered.len(),
        win,
        distance
    );
    Ok(Events::from_indices(peaks))
}

/// Moving-average length in samples, never zero.
pub fn integration_window(fs: f64, cfg: &DetectorConfig) -> usize {
    ((cfg.integration_window_s * fs).round() as usize).max(1)
}

/// Minimum spacing between accepted R-peaks in samples, never zero.
pub fn refractory_samples(fs: f64, cfg: &DetectorConfig) -> usize {
    ((cfg.min_rr_s * fs).round() as usize).max(1)
}

/// Run the full pipeline on integer ADC codes.
pub fn run_feature_pipeline(
    raw: &RawSignal,
    cfg: &PipelineConfig,
) -> EcgResult<FeaturePipelineResult> {
    let ts = raw.to_time_series();
    run_feature_pipeline_on_series(&ts, cfg)
}

/// Run the full pipeline on a real-valued recording; `ts.fs` wins over the config rate.
pub fn run_feature_pipeline_on_series(
    ts: &TimeSeries,
    cfg: &PipelineConfig,
) -> EcgResult<FeaturePipelineResult> {
    let cfg = cfg.with_sampling_rate(ts.fs);
    cfg.validate()?;
    let filtered = condition(ts, &cfg.filter)?;
    let events = detect_r_peaks(&filtered, &cfg.detector)?;
    let extraction = extract_features(&filtered, &events, &cfg.features)?;
    let rr = RRSeries::from_events(&events, ts.fs);
    Ok(FeaturePipelineResult {
        fs: ts.fs,
        sample_count: ts.len(),
        filtered,
        events,
        rr,
        extraction,
    })
}

fn energy_envelope(data: &[f64], win: usize) -> EcgResult<Vec<f64>> {
    let normalized = normalize(data)?;
    let squared = square(&normalized);
    Ok(moving_average(&squared, win))
}

fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

fn normalize(data: &[f64]) -> EcgResult<Vec<f64>> {
    let mu = mean(data);
    let var = data.iter().map(|x| (x - mu).powi(2)).sum::<f64>() / data.len().max(1) as f64;
    let sd = var.sqrt();
    if !sd.is_finite() || sd <= MIN_STD {
        return Err(EcgError::DegenerateSignal);
    }
    Ok(data.iter().map(|x| (x - mu) / sd).collect())
}

fn square(data: &[f64]) -> Vec<f64> {
    data.iter().map(|x| x * x).collect()
}

/// Centered moving average; samples outside the signal count as zero.
fn moving_average(data: &[f64], win: usize) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    if win <= 1 {
        return data.to_vec();
    }
    let n = data.len();
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    let mut acc = 0.0;
    for &sample in data {
        acc += sample;
        prefix.push(acc);
    }
    let ahead = (win - 1) / 2;
    let behind = win - 1 - ahead;
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(behind);
            let hi = (i + ahead + 1).min(n);
            (prefix[hi] - prefix[lo]) / win as f64
        })
        .collect()
}

/// Interior local maxima; a plateau reports its first sample.
fn local_maxima(envelope: &[f64]) -> Vec<usize> {
    let n = envelope.len();
    let mut out = Vec::new();
    if n < 3 {
        return out;
    }
    let mut i = 1;
    while i < n - 1 {
        if envelope[i - 1] < envelope[i] {
            let mut ahead = i + 1;
            while ahead < n - 1 && envelope[ahead] == envelope[i] {
                ahead += 1;
            }
            if envelope[ahead] < envelope[i] {
                out.push(i);
            }
            i = ahead;
        } else {
            i += 1;
        }
    }
    out
}

/// Greedy left-to-right: a candidate is kept when it lies at least `distance`
/// samples after the last kept one, so the earliest peak of a cluster wins.
fn pick_peaks(envelope: &[f64], min_height: f64, distance: usize) -> Vec<usize> {
    let mut accepted: Vec<usize> = Vec::new();
    for idx in local_maxima(envelope) {
        if envelope[idx] < min_height {
            continue;
        }
        match accepted.last() {
            Some(&kept) if idx - kept < distance => {}
            _ => accepted.push(idx),
        }
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::FilterConfig;
    use std::f64::consts::PI;

    #[test]
    fn detects_regular_beats() {
        let fs = 250.0;
        let rr = [0.82, 0.78, 0.8, 0.79, 0.81, 0.77, 0.84, 0.88];
        let ts = synthetic_timeseries(fs, &rr);
        let cfg = DetectorConfig::default();
        let events = detect_r_peaks(&ts, &cfg).unwrap();
        assert_eq!(events.indices.len(), rr.len() + 1);
        // The envelope peak lands somewhere on the QRS energy bump.
        let tolerance = integration_window(fs, &cfg) / 2;
        let beats = beat_samples(fs, &rr);
        for (found, expected) in events.indices.iter().zip(beats) {
            assert!(found.abs_diff(expected) <= tolerance, "{} vs {}", found, expected);
        }
    }

    #[test]
    fn peaks_respect_refractory_period() {
        let fs = 360.0;
        let rr = [0.62, 0.61, 0.65, 0.7, 0.6, 0.64];
        let ts = synthetic_timeseries(fs, &rr);
        let cfg = DetectorConfig::default();
        let events = detect_r_peaks(&ts, &cfg).unwrap();
        assert!(!events.is_empty());
        let min_gap = (0.6 * fs).round() as usize;
        assert!(events.respects_refractory(min_gap));
        assert_eq!(refractory_samples(fs, &cfg), min_gap);
    }

    #[test]
    fn close_double_peak_keeps_first_one() {
        let fs = 100.0;
        let mut data = vec![0.0; 400];
        add_pulse(&mut data, fs, 1.0, 1.0);
        add_pulse(&mut data, fs, 1.3, 0.5);
        add_pulse(&mut data, fs, 2.5, 1.0);
        let ts = TimeSeries { fs, data };
        let cfg = DetectorConfig::default();
        let events = detect_r_peaks(&ts, &cfg).unwrap();
        assert_eq!(events.indices.len(), 2);
        let tolerance = integration_window(fs, &cfg) / 2;
        assert!(events.indices[0].abs_diff(100) <= tolerance);
        assert!(events.indices[1].abs_diff(250) <= tolerance);
    }

    #[test]
    fn equal_height_ties_resolve_to_earliest() {
        let envelope = [0.0, 2.0, 0.0, 2.0, 0.0, 1.0, 0.0];
        assert_eq!(pick_peaks(&envelope, 0.5, 3), vec![1, 5]);
    }

    #[test]
    fn earlier_smaller_peak_wins_within_refractory_window() {
        let envelope = [0.0, 0.0, 2.0, 0.0, 5.0, 0.0, 0.0, 0.0, 0.0, 3.0, 0.0];
        assert_eq!(pick_peaks(&envelope, 0.5, 3), vec![2, 9]);
    }

    #[test]
    fn plateau_reports_first_sample() {
        let envelope = [0.0, 1.0, 3.0, 3.0, 3.0, 1.0, 0.0, 0.5, 0.5];
        assert_eq!(local_maxima(&envelope), vec![2]);
    }

    #[test]
    fn flat_signal_yields_no_peaks() {
        let ts = TimeSeries {
            fs: 50.0,
            data: vec![512.0; 256],
        };
        let events = detect_r_peaks(&ts, &DetectorConfig::default()).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn short_signal_is_rejected() {
        let ts = TimeSeries {
            fs: 50.0,
            data: vec![0.0, 1.0, 0.0],
        };
        let err = detect_r_peaks(&ts, &DetectorConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            EcgError::InsufficientData {
                required: 8,
                actual: 3,
                ..
            }
        ));
    }

    #[test]
    fn centered_average_is_aligned() {
        let mut data = vec![0.0; 11];
        data[5] = 5.0;
        let out = moving_average(&data, 5);
        assert_eq!(out.len(), data.len());
        assert_eq!(&out[3..8], &[1.0, 1.0, 1.0, 1.0, 1.0]);
        assert_eq!(out[2], 0.0);
        assert_eq!(out[8], 0.0);
    }

    #[test]
    fn pipeline_emits_interior_beats() {
        let fs = 250.0;
        let rr = [0.9, 0.85, 0.88, 0.86, 0.82, 0.81, 0.8];
        let ts = synthetic_timeseries(fs, &rr);
        let cfg = PipelineConfig {
            sampling_rate_hz: fs,
            filter: FilterConfig {
                lowcut_hz: 0.5,
                highcut_hz: 40.0,
                order: 2,
            },
            ..PipelineConfig::default()
        };
        let result = run_feature_pipeline_on_series(&ts, &cfg).unwrap();
        assert_eq!(result.events.indices.len(), rr.len() + 1);
        assert_eq!(result.rr.rr.len(), rr.len());
        assert_eq!(
            result.extraction.features.len() + result.extraction.skipped.len(),
            rr.len() - 1
        );
        assert_eq!(result.filtered.len(), ts.len());
    }

    #[test]
    fn pipeline_on_flat_raw_reports_no_peaks() {
        let raw = RawSignal::new(50, vec![2048; 256]);
        let err = run_feature_pipeline(&raw, &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, EcgError::NoPeaksDetected { found: 0 }));
    }

    fn beat_samples(fs: f64, rr: &[f64]) -> Vec<usize> {
        let mut t = 0.5;
        let mut out = vec![(t * fs).round() as usize];
        for &interval in rr {
            t += interval;
            out.push((t * fs).round() as usize);
        }
        out
    }

    fn add_pulse(data: &mut [f64], fs: f64, at_s: f64, amp: f64) {
        for (i, v) in data.iter_mut().enumerate() {
            let time = i as f64 / fs;
            let width = 0.02;
            *v += amp * (-0.5 * ((time - at_s) / width).powi(2)).exp();
        }
    }

    fn synthetic_timeseries(fs: f64, rr: &[f64]) -> TimeSeries {
        let beats: Vec<f64> = beat_samples(fs, rr)
            .into_iter()
            .map(|s| s as f64 / fs)
            .collect();
        let duration = beats.last().copied().unwrap_or(1.0) + 1.0;
        let samples = (duration * fs) as usize;
        let mut data = Vec::with_capacity(samples);
        for i in 0..samples {
            let time = i as f64 / fs;
            data.push(0.05 * (2.0 * PI * 1.0 * time).sin());
        }
        for &bt in &beats {
            add_pulse(&mut data, fs, bt, 1.2);
        }
        TimeSeries { fs, data }
    }
}
