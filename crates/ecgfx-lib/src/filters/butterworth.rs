//! Zero-phase Butterworth bandpass used to condition the raw ECG before detection.
//!
//! The filter is designed from the analog prototype (low-pass → band-pass,
//! then bilinear transform with pre-warping) and kept as second-order
//! sections. Forward-backward application cancels the group delay so the
//! fiducial timings measured downstream are not shifted.

use crate::config::FilterConfig;
use crate::error::{EcgError, EcgResult};
use crate::signal::TimeSeries;
use num_complex::Complex64;
use std::f64::consts::PI;

/// One second-order section in direct form II transposed, `a[0] == 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b: [f64; 3],
    pub a: [f64; 3],
}

impl Biquad {
    /// Steady-state delay line for a unit step input.
    fn step_state(&self) -> [f64; 2] {
        let [b0, b1, b2] = self.b;
        let [_, a1, a2] = self.a;
        let den = 1.0 + a1 + a2;
        let y = (b0 + b1 + b2) / den;
        let z1 = b2 - a2 * y;
        let z0 = b1 - a1 * y + z1;
        [z0, z1]
    }

    fn dc_gain(&self) -> f64 {
        self.b.iter().sum::<f64>() / self.a.iter().sum::<f64>()
    }

    fn run(&self, data: &mut [f64], mut state: [f64; 2]) {
        let [b0, b1, b2] = self.b;
        let [_, a1, a2] = self.a;
        for x in data.iter_mut() {
            let input = *x;
            let y = b0 * input + state[0];
            state[0] = b1 * input - a1 * y + state[1];
            state[1] = b2 * input - a2 * y;
            *x = y;
        }
    }

    fn response(&self, z_inv: Complex64) -> Complex64 {
        let z_inv2 = z_inv * z_inv;
        let num = self.b[0] + z_inv * self.b[1] + z_inv2 * self.b[2];
        let den = self.a[0] + z_inv * self.a[1] + z_inv2 * self.a[2];
        num / den
    }
}

/// Digital Butterworth bandpass of a given prototype order.
#[derive(Debug, Clone, PartialEq)]
pub struct ButterworthBandpass {
    order: usize,
    fs: f64,
    sections: Vec<Biquad>,
}

impl ButterworthBandpass {
    pub fn design(cfg: &FilterConfig, fs: f64) -> EcgResult<Self> {
        cfg.validate(fs)?;
        let order = cfg.order;
        let nyquist = 0.5 * fs;

        // Bilinear transform with a normalised sample rate of 2.
        let warp = |wn: f64| 4.0 * (PI * wn / 2.0).tan();
        let low = warp(cfg.lowcut_hz / nyquist);
        let high = warp(cfg.highcut_hz / nyquist);
        let bw = high - low;
        let w0 = (low * high).sqrt();

        let mut pole_pairs: Vec<(Complex64, Complex64)> = Vec::with_capacity(order);
        for k in 0..order / 2 {
            let theta = PI * (2 * k + order + 1) as f64 / (2 * order) as f64;
            let proto = Complex64::from_polar(1.0, theta);
            let (s1, s2) = lowpass_to_bandpass(proto, bw, w0);
            pole_pairs.push((s1, s1.conj()));
            pole_pairs.push((s2, s2.conj()));
        }
        if order % 2 == 1 {
            pole_pairs.push(lowpass_to_bandpass(Complex64::new(-1.0, 0.0), bw, w0));
        }

        let mut sections: Vec<Biquad> = pole_pairs
            .into_iter()
            .map(|(sa, sb)| {
                let za = bilinear(sa);
                let zb = bilinear(sb);
                Biquad {
                    // One zero at DC and one at Nyquist per section.
                    b: [1.0, 0.0, -1.0],
                    a: [1.0, -(za + zb).re, (za * zb).re],
                }
            })
            .collect();

        let centre = 2.0 * (w0 / 4.0).atan();
        let gain = cascade_response(&sections, centre).norm();
        if !gain.is_finite() || gain == 0.0 {
            return Err(EcgError::invalid(format!(
                "degenerate filter design for band {}-{} Hz at fs {}",
                cfg.lowcut_hz, cfg.highcut_hz, fs
            )));
        }
        if let Some(first) = sections.first_mut() {
            for coeff in first.b.iter_mut() {
                *coeff /= gain;
            }
        }
        Ok(Self {
            order,
            fs,
            sections,
        })
    }

    pub fn sections(&self) -> &[Biquad] {
        &self.sections
    }

    /// Samples of odd extension added at each edge before filtering.
    pub fn pad_len(&self) -> usize {
        3 * (2 * self.order + 1)
    }

    /// Magnitude of a single forward pass at `freq_hz`.
    pub fn magnitude_at(&self, freq_hz: f64) -> f64 {
        let omega = 2.0 * PI * freq_hz / self.fs;
        cascade_response(&self.sections, omega).norm()
    }

    /// Forward-backward application with odd-extension padding.
    pub fn filtfilt(&self, signal: &[f64]) -> EcgResult<Vec<f64>> {
        let pad = self.pad_len();
        if signal.len() <= pad {
            return Err(EcgError::InsufficientData {
                stage: "bandpass filter",
                required: pad + 1,
                actual: signal.len(),
            });
        }

        let zi = self.step_states();
        let mut work = odd_extend(signal, pad);

        let x0 = work[0];
        self.run_cascade(&mut work, &zi, x0);
        work.reverse();
        let y0 = work[0];
        self.run_cascade(&mut work, &zi, y0);
        work.reverse();

        Ok(work[pad..pad + signal.len()].to_vec())
    }

    fn run_cascade(&self, data: &mut [f64], zi: &[[f64; 2]], edge: f64) {
        for (section, state) in self.sections.iter().zip(zi) {
            section.run(data, [state[0] * edge, state[1] * edge]);
        }
    }

    /// Per-section initial conditions for a unit step entering the cascade.
    fn step_states(&self) -> Vec<[f64; 2]> {
        let mut scale = 1.0;
        self.sections
            .iter()
            .map(|section| {
                let [z0, z1] = section.step_state();
                let state = [z0 * scale, z1 * scale];
                scale *= section.dc_gain();
                state
            })
            .collect()
    }
}

/// Condition `signal` with a zero-phase Butterworth bandpass.
pub fn bandpass_filter(signal: &[f64], cfg: &FilterConfig, fs: f64) -> EcgResult<Vec<f64>> {
    let filter = ButterworthBandpass::design(cfg, fs)?;
    filter.filtfilt(signal)
}

/// Same as [`bandpass_filter`] but keeps the time base attached.
pub fn condition(ts: &TimeSeries, cfg: &FilterConfig) -> EcgResult<TimeSeries> {
    let data = bandpass_filter(&ts.data, cfg, ts.fs)?;
    Ok(TimeSeries { fs: ts.fs, data })
}

fn lowpass_to_bandpass(p: Complex64, bw: f64, w0: f64) -> (Complex64, Complex64) {
    let half = p * (bw / 2.0);
    let root = (half * half - w0 * w0).sqrt();
    (half + root, half - root)
}

fn bilinear(s: Complex64) -> Complex64 {
    (4.0 + s) / (4.0 - s)
}

fn cascade_response(sections: &[Biquad], omega: f64) -> Complex64 {
    let z_inv = Complex64::from_polar(1.0, -omega);
    sections
        .iter()
        .fold(Complex64::new(1.0, 0.0), |acc, s| acc * s.response(z_inv))
}

fn odd_extend(signal: &[f64], pad: usize) -> Vec<f64> {
    let n = signal.len();
    let first = signal[0];
    let last = signal[n - 1];
    let mut out = Vec::with_capacity(n + 2 * pad);
    out.extend((1..=pad).rev().map(|i| 2.0 * first - signal[i]));
    out.extend_from_slice(signal);
    out.extend((1..=pad).map(|i| 2.0 * last - signal[n - 1 - i]));
    out
}
