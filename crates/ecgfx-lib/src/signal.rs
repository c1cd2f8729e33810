use serde::{Deserialize, Serialize};

/// ADC codes straight from the sensor, e.g. 0–4095 for a 12-bit front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSignal {
    /// Sampling frequency in Hz
    pub fs: u32,
    pub samples: Vec<i32>,
}

impl RawSignal {
    pub fn new(fs: u32, samples: Vec<i32>) -> Self {
        Self { fs, samples }
    }
    pub fn len(&self) -> usize {
        self.samples.len()
    }
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
    pub fn to_time_series(&self) -> TimeSeries {
        TimeSeries {
            fs: self.fs as f64,
            data: self.samples.iter().map(|&s| s as f64).collect(),
        }
    }
}

/// Basic typed time series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Uniform sampling frequency in Hz
    pub fs: f64,
    /// Samples
    pub data: Vec<f64>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Point events on a timeline (e.g., R-peaks indices)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Events {
    pub indices: Vec<usize>,
}

impl Events {
    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self { indices }
    }
    pub fn len(&self) -> usize {
        self.indices.len()
    }
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
    /// Strictly increasing with every gap at least `min_gap` samples.
    pub fn respects_refractory(&self, min_gap: usize) -> bool {
        self.indices.windows(2).all(|w| w[1] > w[0] && w[1] - w[0] >= min_gap)
    }
}

/// RR intervals (seconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RRSeries {
    pub rr: Vec<f64>,
}

impl RRSeries {
    pub fn from_events(events: &Events, fs: f64) -> Self {
        let mut rr = Vec::new();
        for w in events.indices.windows(2) {
            let dt = (w[1] as f64 - w[0] as f64) / fs;
            rr.push(dt);
        }
        Self { rr }
    }

    pub fn mean_heart_rate_bpm(&self) -> Option<f64> {
        if self.rr.is_empty() {
            return None;
        }
        let mean = self.rr.iter().sum::<f64>() / self.rr.len() as f64;
        (mean > 0.0).then(|| 60.0 / mean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_signal_converts_codes() {
        let raw = RawSignal::new(50, vec![0, 2048, 4095]);
        let ts = raw.to_time_series();
        assert_eq!(ts.fs, 50.0);
        assert_eq!(ts.data, vec![0.0, 2048.0, 4095.0]);
        assert_eq!(ts.len(), raw.len());
    }

    #[test]
    fn rr_from_events() {
        let events = Events::from_indices(vec![10, 50, 90]);
        let rr = RRSeries::from_events(&events, 50.0);
        assert_eq!(rr.rr, vec![0.8, 0.8]);
        let bpm = rr.mean_heart_rate_bpm().unwrap();
        assert!((bpm - 75.0).abs() < 1e-9);
    }

    #[test]
    fn refractory_check() {
        assert!(Events::from_indices(vec![1, 31, 70]).respects_refractory(30));
        assert!(!Events::from_indices(vec![1, 30]).respects_refractory(30));
        assert!(!Events::from_indices(vec![5, 5]).respects_refractory(0));
    }
}
