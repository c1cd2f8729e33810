//! Fiducial-point search (P, Q, R, S, T) and interval features per heartbeat.
//!
//! Every interior R-peak gets a segment from `pre_r_s` before to `post_r_s`
//! after R. Q and S are the deepest points on either side of R, P is the
//! deepest point in a short window before Q and T the highest point in a
//! window after S. A beat whose segment or search windows cannot be formed
//! is skipped and reported, the remaining beats are still processed.

use crate::{
    config::FeatureConfig,
    error::{EcgError, EcgResult},
    signal::{Events, TimeSeries},
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Column names in the fixed order consumed by the beat classifier.
pub const FIELD_NAMES: [&str; 11] = [
    "pre_RR",
    "post_RR",
    "pPeak_time",
    "tPeak_time",
    "rPeak_time",
    "sPeak_time",
    "qPeak_time",
    "qrs_interval",
    "pq_interval",
    "qt_interval",
    "st_interval",
];

/// Morphological features of one beat, times in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    #[serde(rename = "pre_RR")]
    pub pre_rr: f64,
    #[serde(rename = "post_RR")]
    pub post_rr: f64,
    #[serde(rename = "pPeak_time")]
    pub p_peak_time: f64,
    #[serde(rename = "tPeak_time")]
    pub t_peak_time: f64,
    #[serde(rename = "rPeak_time")]
    pub r_peak_time: f64,
    #[serde(rename = "sPeak_time")]
    pub s_peak_time: f64,
    #[serde(rename = "qPeak_time")]
    pub q_peak_time: f64,
    pub qrs_interval: f64,
    pub pq_interval: f64,
    pub qt_interval: f64,
    pub st_interval: f64,
}

impl FeatureVector {
    /// Values in [`FIELD_NAMES`] order.
    pub fn as_array(&self) -> [f64; 11] {
        [
            self.pre_rr,
            self.post_rr,
            self.p_peak_time,
            self.t_peak_time,
            self.r_peak_time,
            self.s_peak_time,
            self.q_peak_time,
            self.qrs_interval,
            self.pq_interval,
            self.qt_interval,
            self.st_interval,
        ]
    }

    fn check_finite(&self) -> EcgResult<()> {
        match FIELD_NAMES
            .iter()
            .zip(self.as_array())
            .find(|(_, value)| !value.is_finite())
        {
            Some((field, _)) => Err(EcgError::NonFiniteFeature { field: *field }),
            None => Ok(()),
        }
    }
}

/// A located landmark: absolute sample index plus time in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fiducial {
    pub index: usize,
    pub time_s: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FiducialPoints {
    pub p: Fiducial,
    pub q: Fiducial,
    pub r: Fiducial,
    pub s: Fiducial,
    pub t: Fiducial,
}

/// Why an interior beat produced no feature vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedBeat {
    /// Position of the R-peak within the detected peak list.
    pub beat: usize,
    pub r_peak: usize,
    pub reason: String,
}

/// Output of [`extract_features`], in R-peak order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureExtraction {
    pub features: Vec<FeatureVector>,
    pub fiducials: Vec<FiducialPoints>,
    pub skipped: Vec<SkippedBeat>,
}

/// Search spans converted to whole samples for one sampling rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleWindows {
    pub pre_r: usize,
    pub post_r: usize,
    pub p_search: usize,
    pub t_search: usize,
}

impl SampleWindows {
    pub fn new(cfg: &FeatureConfig, fs: f64) -> Self {
        let samples = |seconds: f64| (seconds * fs).round().max(0.0) as usize;
        Self {
            pre_r: samples(cfg.pre_r_s),
            post_r: samples(cfg.post_r_s),
            p_search: samples(cfg.p_search_s),
            t_search: samples(cfg.t_search_s),
        }
    }
}

/// One interior R-peak with its neighbours and the signal around it.
#[derive(Debug, Clone, Copy)]
pub struct Beat<'a> {
    pub r_prev: usize,
    pub r: usize,
    pub r_next: usize,
    /// First absolute sample covered by `segment`.
    pub start: usize,
    /// Position of R within `segment`.
    pub anchor: usize,
    pub segment: &'a [f64],
}

impl<'a> Beat<'a> {
    pub fn carve(
        data: &'a [f64],
        r_prev: usize,
        r: usize,
        r_next: usize,
        windows: &SampleWindows,
    ) -> EcgResult<Self> {
        let end = match r.checked_add(windows.post_r) {
            Some(end) if r >= windows.pre_r && end <= data.len() => end,
            end => {
                let pre = isize::try_from(windows.pre_r).unwrap_or(isize::MAX);
                return Err(EcgError::SegmentOutOfBounds {
                    start: (r as isize).saturating_sub(pre),
                    end: end.unwrap_or(usize::MAX),
                    len: data.len(),
                });
            }
        };
        let start = r - windows.pre_r;
        Ok(Self {
            r_prev,
            r,
            r_next,
            start,
            anchor: windows.pre_r,
            segment: &data[start..end],
        })
    }

    /// Locate P, Q, S and T within the segment; R is the anchor itself.
    pub fn locate(&self, windows: &SampleWindows, fs: f64) -> EcgResult<FiducialPoints> {
        let before_r = &self.segment[..self.anchor];
        let q = argmin(before_r).ok_or(EcgError::EmptySearchWindow { wave: "Q" })?;

        let after_r = &self.segment[(self.anchor + 1).min(self.segment.len())..];
        let s = argmin(after_r)
            .map(|rel| self.anchor + 1 + rel)
            .ok_or(EcgError::EmptySearchWindow { wave: "S" })?;

        let p_start = q.saturating_sub(windows.p_search);
        let p = match argmin(&self.segment[p_start..q]) {
            Some(rel) => p_start + rel,
            None => {
                debug!("beat at {}: empty P window, P placed on Q", self.r);
                q
            }
        };

        let t_start = s + 1;
        let t_end = t_start.saturating_add(windows.t_search).min(self.segment.len());
        let t = match argmax(&self.segment[t_start.min(t_end)..t_end]) {
            Some(rel) => t_start + rel,
            None => {
                debug!("beat at {}: empty T window, T placed on S", self.r);
                s
            }
        };

        Ok(FiducialPoints {
            p: self.fiducial(p, fs),
            q: self.fiducial(q, fs),
            r: self.fiducial(self.anchor, fs),
            s: self.fiducial(s, fs),
            t: self.fiducial(t, fs),
        })
    }

    /// Time uses the R sample as reference: `r/fs + (pos - anchor)/fs`.
    fn fiducial(&self, pos: usize, fs: f64) -> Fiducial {
        let offset = pos as f64 - self.anchor as f64;
        Fiducial {
            index: self.start + pos,
            time_s: self.r as f64 / fs + offset / fs,
        }
    }

    pub fn features(&self, points: &FiducialPoints, fs: f64) -> EcgResult<FeatureVector> {
        let p_time = points.p.time_s;
        let q_time = points.q.time_s;
        let r_time = points.r.time_s;
        let s_time = points.s.time_s;
        let t_time = points.t.time_s;
        let fv = FeatureVector {
            pre_rr: (self.r - self.r_prev) as f64 / fs,
            post_rr: (self.r_next - self.r) as f64 / fs,
            p_peak_time: p_time,
            t_peak_time: t_time,
            r_peak_time: r_time,
            s_peak_time: s_time,
            q_peak_time: q_time,
            qrs_interval: s_time - q_time,
            pq_interval: r_time - p_time,
            qt_interval: t_time - q_time,
            st_interval: t_time - s_time,
        };
        fv.check_finite()?;
        Ok(fv)
    }
}

/// Extract one feature vector per interior R-peak of `filtered`.
pub fn extract_features(
    filtered: &TimeSeries,
    r_peaks: &Events,
    cfg: &FeatureConfig,
) -> EcgResult<FeatureExtraction> {
    cfg.validate()?;
    let fs = filtered.fs;
    if !(fs > 0.0) || !fs.is_finite() {
        return Err(EcgError::invalid(format!(
            "sampling rate must be positive, got {fs}"
        )));
    }
    let peaks = &r_peaks.indices;
    if peaks.len() < 3 {
        return Err(EcgError::NoPeaksDetected { found: peaks.len() });
    }
    if peaks.windows(2).any(|w| w[1] <= w[0]) {
        return Err(EcgError::invalid("R-peak indices must be strictly increasing"));
    }

    let windows = SampleWindows::new(cfg, fs);
    let mut out = FeatureExtraction::default();
    for (beat, w) in peaks.windows(3).enumerate() {
        let (r_prev, r, r_next) = (w[0], w[1], w[2]);
        let extracted = Beat::carve(&filtered.data, r_prev, r, r_next, &windows).and_then(|b| {
            let points = b.locate(&windows, fs)?;
            let fv = b.features(&points, fs)?;
            Ok((points, fv))
        });
        match extracted {
            Ok((points, fv)) => {
                out.fiducials.push(points);
                out.features.push(fv);
            }
            Err(err) if err.is_per_beat() => {
                warn!("skipping beat {} at sample {}: {}", beat + 1, r, err);
                out.skipped.push(SkippedBeat {
                    beat: beat + 1,
                    r_peak: r,
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }
    info!(
        "extracted {} beats, skipped {}",
        out.features.len(),
        out.skipped.len()
    );
    Ok(out)
}

/// Index of the smallest value, earliest on ties.
fn argmin(data: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in data.iter().enumerate() {
        match best {
            Some((_, b)) if v >= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Index of the largest value, earliest on ties.
fn argmax(data: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in data.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}
