//! Reference recording for offline runs: 256 synthesized AD8232-like 12-bit
//! codes at 50 Hz (about 5 s, six beats). The values were generated to mimic
//! the front end, not captured from a device. Call [`run_reference`]
//! explicitly, nothing runs on load.

use crate::{
    config::{FilterConfig, PipelineConfig},
    detectors::ecg::{run_feature_pipeline, FeaturePipelineResult},
    error::EcgResult,
    signal::RawSignal,
};

pub const REFERENCE_FS: u32 = 50;

#[rustfmt::skip]
pub const REFERENCE_SAMPLES: [i32; 256] = [
    2009, 2007, 2013, 2018, 2009, 2012, 2022, 2024, 2048, 2081, 2087, 2082,
    2051, 2030, 2025, 2029, 2030, 1936, 2909, 1858, 2036, 2035, 2031, 2043,
    2043, 2061, 2096, 2136, 2181, 2210, 2235, 2221, 2181, 2130, 2093, 2064,
    2057, 2044, 2044, 2045, 2041, 2047, 2040, 2048, 2043, 2047, 2051, 2050,
    2068, 2103, 2116, 2103, 2068, 2050, 2038, 2043, 2045, 1944, 2922, 1862,
    2040, 2033, 2037, 2042, 2046, 2058, 2090, 2122, 2168, 2206, 2218, 2200,
    2160, 2113, 2081, 2043, 2035, 2028, 2015, 2011, 2017, 2011, 2014, 2011,
    2008, 2015, 2017, 2032, 2063, 2068, 2052, 2031, 2008, 1996, 2003, 1994,
    1900, 2874, 1822, 1985, 1994, 1985, 1997, 1999, 2014, 2043, 2075, 2120,
    2162, 2170, 2159, 2119, 2075, 2037, 2005, 1983, 1976, 1976, 1978, 1981,
    1980, 1970, 1969, 1980, 1980, 1975, 1988, 2007, 2035, 2046, 2030, 2010,
    1986, 1983, 1976, 1971, 1889, 2858, 1805, 1983, 1976, 1983, 1980, 1990,
    2015, 2035, 2074, 2129, 2160, 2178, 2165, 2129, 2079, 2042, 2021, 2006,
    2002, 1997, 1995, 2000, 2003, 2001, 2009, 2005, 2006, 2012, 2011, 2017,
    2037, 2064, 2080, 2068, 2043, 2032, 2019, 2015, 2023, 1936, 2901, 1854,
    2025, 2022, 2026, 2034, 2044, 2057, 2089, 2130, 2172, 2208, 2232, 2215,
    2180, 2136, 2097, 2071, 2046, 2047, 2050, 2047, 2049, 2046, 2044, 2044,
    2045, 2045, 2042, 2055, 2078, 2101, 2109, 2098, 2068, 2051, 2047, 2040,
    2039, 1952, 2926, 1866, 2037, 2035, 2045, 2040, 2052, 2059, 2089, 2132,
    2168, 2205, 2221, 2211, 2170, 2119, 2087, 2052, 2037, 2033, 2025, 2025,
    2018, 2017, 2021, 2020, 2019, 2018, 2013, 2009, 2009, 2006, 2015, 2008,
    2012, 2004, 2006, 2008,
];

pub fn reference_signal() -> RawSignal {
    RawSignal::new(REFERENCE_FS, REFERENCE_SAMPLES.to_vec())
}

/// Parameters the reference recording was captured for.
pub fn reference_config() -> PipelineConfig {
    PipelineConfig {
        sampling_rate_hz: REFERENCE_FS as f64,
        filter: FilterConfig {
            lowcut_hz: 0.5,
            highcut_hz: 20.0,
            order: 2,
        },
        ..PipelineConfig::default()
    }
}

pub fn run_reference() -> EcgResult<FeaturePipelineResult> {
    run_feature_pipeline(&reference_signal(), &reference_config())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        detectors::ecg::detect_r_peaks, features::fiducial::extract_features,
        filters::butterworth::bandpass_filter,
    };

    #[test]
    fn filtered_reference_is_finite_and_aligned() {
        let cfg = reference_config();
        let raw = reference_signal().to_time_series();
        let filtered = bandpass_filter(&raw.data, &cfg.filter, raw.fs).unwrap();
        assert_eq!(filtered.len(), 256);
        assert!(filtered.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn reference_pipeline_stages() {
        let cfg = reference_config();
        let raw = reference_signal().to_time_series();
        let filtered = crate::filters::butterworth::condition(&raw, &cfg.filter).unwrap();

        let peaks = detect_r_peaks(&filtered, &cfg.detector).unwrap();
        assert!(!peaks.is_empty());
        assert!(peaks.respects_refractory(30));

        let extraction = extract_features(&filtered, &peaks, &cfg.features).unwrap();
        assert_eq!(extraction.features.len(), peaks.len() - 2);
        assert!(extraction.skipped.is_empty());
        for fv in &extraction.features {
            let values = fv.as_array();
            assert_eq!(values.len(), 11);
            assert!(values.iter().all(|v| v.is_finite()));
            assert!(fv.qrs_interval > 0.0);
            assert!(fv.q_peak_time < fv.r_peak_time && fv.r_peak_time < fv.s_peak_time);
        }
    }

    #[test]
    fn reference_rr_is_physiological() {
        let result = run_reference().unwrap();
        assert_eq!(result.sample_count, 256);
        assert_eq!(result.events.len(), 6);
        for fv in &result.extraction.features {
            assert!(fv.pre_rr > 0.7 && fv.pre_rr < 0.9, "{:?}", fv);
            assert!(fv.post_rr > 0.7 && fv.post_rr < 0.9, "{:?}", fv);
        }
        let bpm = result.rr.mean_heart_rate_bpm().unwrap();
        assert!(bpm > 65.0 && bpm < 85.0, "{bpm}");
    }

    #[test]
    fn pipeline_is_idempotent() {
        let first = run_reference().unwrap();
        let second = run_reference().unwrap();
        assert_eq!(first.extraction.features, second.extraction.features);
        assert_eq!(first, second);
    }
}
