//! Backend-neutral figures for inspecting the pipeline: the raw trace and the
//! filtered trace with detected landmarks on top. Rendering lives with the caller.

use crate::{
    detectors::ecg::FeaturePipelineResult,
    signal::{Events, TimeSeries},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub color: Color,
}

/// 0xRRGGBB
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

pub const RAW_COLOR: Color = Color(0x4C72B0);
pub const FILTERED_COLOR: Color = Color(0x2CA02C);
pub const R_PEAK_COLOR: Color = Color(0xD62728);
pub const FIDUCIAL_COLOR: Color = Color(0xFF7F0E);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

/// Isolated points drawn as circles of `style.width` radius.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
    Markers(MarkerSeries),
}

impl Series {
    pub fn points(&self) -> &[[f64; 2]] {
        match self {
            Series::Line(line) => &line.points,
            Series::Markers(markers) => &markers.points,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis { label: None },
            y: Axis { label: None },
            series: Vec::new(),
        }
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    /// `(x_min, x_max, y_min, y_max)` over every finite point, `None` when empty.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let mut it = self
            .series
            .iter()
            .flat_map(|s| s.points().iter())
            .filter(|p| p[0].is_finite() && p[1].is_finite());
        let first = it.next()?;
        let init = (first[0], first[0], first[1], first[1]);
        Some(it.fold(init, |(x0, x1, y0, y1), p| {
            (x0.min(p[0]), x1.max(p[0]), y0.min(p[1]), y1.max(p[1]))
        }))
    }
}

/// Renders stacked panels sharing the time axis.
pub trait PlotBackend {
    fn draw(&mut self, panels: &[Figure]) -> anyhow::Result<()>;
}

/// Keep at most `max_points` evenly spaced points.
pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    (0..max_points)
        .map(|i| (i as f64 * bucket_size).floor() as usize)
        .take_while(|&start| start < points.len())
        .map(|start| points[start])
        .collect()
}

fn timed_points(series: &TimeSeries) -> Vec<[f64; 2]> {
    let dt = 1.0 / series.fs.max(f64::MIN_POSITIVE);
    series
        .data
        .iter()
        .enumerate()
        .map(|(i, value)| [i as f64 * dt, *value])
        .collect()
}

pub fn figure_from_timeseries(
    title: &str,
    series: &TimeSeries,
    max_points: usize,
    color: Color,
) -> Figure {
    let mut fig = Figure::new(Some(title.to_string()));
    fig.x.label = Some("time (s)".into());
    fig.add_series(Series::Line(LineSeries {
        name: title.into(),
        points: decimate_points(&timed_points(series), max_points),
        style: Style { width: 1.4, color },
    }));
    fig
}

/// Markers at `events` sitting on the trace they were detected in.
pub fn event_markers(name: &str, series: &TimeSeries, events: &Events, color: Color) -> Series {
    let points = events
        .indices
        .iter()
        .filter_map(|&i| series.data.get(i).map(|&v| [i as f64 / series.fs, v]))
        .collect();
    Series::Markers(MarkerSeries {
        name: name.into(),
        points,
        style: Style { width: 4.0, color },
    })
}

/// Two panels: the raw recording, then the filtered trace with R-peaks and
/// the P/Q/S/T points of every extracted beat.
pub fn pipeline_figures(
    raw: &TimeSeries,
    result: &FeaturePipelineResult,
    max_points: usize,
) -> Vec<Figure> {
    let mut raw_fig = figure_from_timeseries("Raw ECG", raw, max_points, RAW_COLOR);
    raw_fig.y.label = Some("ADC code".into());

    let filtered = &result.filtered;
    let mut filt_fig = figure_from_timeseries("Filtered ECG", filtered, max_points, FILTERED_COLOR);
    filt_fig.y.label = Some("amplitude".into());
    filt_fig.add_series(event_markers("R", filtered, &result.events, R_PEAK_COLOR));
    let fiducials = result
        .extraction
        .fiducials
        .iter()
        .flat_map(|f| [f.p, f.q, f.s, f.t])
        .map(|f| f.index)
        .collect();
    filt_fig.add_series(event_markers(
        "P/Q/S/T",
        filtered,
        &Events::from_indices(fiducials),
        FIDUCIAL_COLOR,
    ));
    vec![raw_fig, filt_fig]
}
