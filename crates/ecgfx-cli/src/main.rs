use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ecgfx_lib::{
    config::PipelineConfig,
    detectors::ecg::{detect_r_peaks, run_feature_pipeline_on_series},
    features::fiducial::extract_features,
    filters::butterworth::condition,
    fixture,
    io::{
        acquisition::{spawn_acquisition, AcquisitionConfig},
        features_csv, text as text_io,
    },
    plot::{pipeline_figures, Figure, PlotBackend, Series},
    signal::TimeSeries,
};
use log::info;
use plotters::prelude::*;
use serde::Serialize;
use std::{
    io::{self, Read},
    path::{Path, PathBuf},
    time::Duration,
};

mod serial;
mod simulate;

#[derive(Parser)]
#[command(
    name = "ecgfx",
    version,
    about = "ECG conditioning, R-peak detection and per-beat feature extraction"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Pipeline parameters: optional TOML file, individual flags override it.
#[derive(Args, Debug, Clone)]
struct PipelineArgs {
    /// Sampling rate of the input (Hz)
    #[arg(long)]
    fs: Option<f64>,
    /// TOML file with [filter], [detector] and [features] tables
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    lowcut_hz: Option<f64>,
    #[arg(long)]
    highcut_hz: Option<f64>,
    #[arg(long)]
    order: Option<usize>,
    #[arg(long)]
    integration_window_s: Option<f64>,
    #[arg(long)]
    min_rr_s: Option<f64>,
}

impl PipelineArgs {
    fn resolve(&self) -> Result<PipelineConfig> {
        let mut cfg = match &self.config {
            Some(path) => PipelineConfig::from_toml_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(fs) = self.fs {
            cfg.sampling_rate_hz = fs;
        }
        if let Some(v) = self.lowcut_hz {
            cfg.filter.lowcut_hz = v;
        }
        if let Some(v) = self.highcut_hz {
            cfg.filter.highcut_hz = v;
        }
        if let Some(v) = self.order {
            cfg.filter.order = v;
        }
        if let Some(v) = self.integration_window_s {
            cfg.detector.integration_window_s = v;
        }
        if let Some(v) = self.min_rr_s {
            cfg.detector.min_rr_s = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Zero-phase Butterworth bandpass of newline-delimited samples (stdin or --input)
    Filter {
        #[command(flatten)]
        pipeline: PipelineArgs,
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Detect R-peaks in an already filtered recording
    FindRpeaks {
        #[command(flatten)]
        pipeline: PipelineArgs,
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Extract per-beat features from a filtered recording and its R-peak indices
    Extract {
        #[command(flatten)]
        pipeline: PipelineArgs,
        #[arg(long)]
        input: Option<PathBuf>,
        /// Newline-delimited R-peak sample indices
        #[arg(long)]
        peaks: PathBuf,
    },
    /// Run filter → R-peaks → features on a raw recording
    Features {
        #[command(flatten)]
        pipeline: PipelineArgs,
        #[arg(long)]
        input: Option<PathBuf>,
        /// Also write the feature table as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Run the pipeline on the built-in 50 Hz reference recording
    Fixture {
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Capture raw ADC codes from a serial ECG front end
    Acquire {
        #[arg(long)]
        port: String,
        #[arg(long, default_value_t = 115_200)]
        baud: u32,
        #[arg(long, default_value_t = 5.0)]
        duration_s: f64,
        #[arg(long, default_value_t = 50)]
        fs: u32,
        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,
        #[arg(long, default_value_t = 2.0)]
        settle_s: f64,
        #[arg(long, default_value_t = 1024)]
        buffer: usize,
        /// Write codes here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List serial ports
    Ports,
    /// Render raw and filtered traces with detected landmarks to a PNG via plotters
    Plot {
        #[command(flatten)]
        pipeline: PipelineArgs,
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 4096)]
        max_points: usize,
    },
    /// Generate a seeded synthetic recording
    Simulate {
        #[arg(long, default_value_t = 250)]
        fs: u32,
        #[arg(long, default_value_t = 10.0)]
        duration_s: f64,
        #[arg(long, default_value_t = 72.0)]
        heart_rate_bpm: f64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Filter { pipeline, input } => cmd_filter(&pipeline, input.as_deref())?,
        Commands::FindRpeaks { pipeline, input } => {
            cmd_find_rpeaks(&pipeline, input.as_deref())?
        }
        Commands::Extract {
            pipeline,
            input,
            peaks,
        } => cmd_extract(&pipeline, input.as_deref(), &peaks)?,
        Commands::Features {
            pipeline,
            input,
            csv,
        } => cmd_features(&pipeline, input.as_deref(), csv.as_deref())?,
        Commands::Fixture { csv } => cmd_fixture(csv.as_deref())?,
        Commands::Acquire {
            port,
            baud,
            duration_s,
            fs,
            timeout_ms,
            settle_s,
            buffer,
            out,
        } => {
            let settings = serial::SerialSettings {
                port,
                baud_rate: baud,
                read_timeout: Duration::from_millis(timeout_ms),
                settle: Duration::try_from_secs_f64(settle_s.max(0.0))
                    .map_err(|e| anyhow::anyhow!("invalid --settle-s {settle_s}: {e}"))?,
            };
            let cfg = AcquisitionConfig {
                sampling_rate_hz: fs,
                duration_s,
                buffer_capacity: buffer,
            };
            cmd_acquire(&settings, &cfg, out.as_deref())?
        }
        Commands::Ports => {
            for port in serial::list_ports()? {
                println!("{}", port);
            }
        }
        Commands::Plot {
            pipeline,
            input,
            out,
            max_points,
        } => cmd_plot(&pipeline, input.as_deref(), &out, max_points)?,
        Commands::Simulate {
            fs,
            duration_s,
            heart_rate_bpm,
            seed,
            out,
        } => {
            let params = simulate::SimulationParams {
                fs,
                duration_s,
                heart_rate_bpm,
                seed,
            };
            params.validate()?;
            cmd_simulate(&params, out.as_deref())?
        }
    }
    Ok(())
}

fn read_samples(input: Option<&Path>) -> Result<Vec<f64>> {
    match input {
        Some(path) => text_io::read_f64_series(path),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            text_io::parse_f64_series(&buf)
        }
    }
}

fn load_series(cfg: &PipelineConfig, input: Option<&Path>) -> Result<TimeSeries> {
    let data = read_samples(input)?;
    Ok(TimeSeries {
        fs: cfg.sampling_rate_hz,
        data,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn cmd_filter(args: &PipelineArgs, input: Option<&Path>) -> Result<()> {
    let cfg = args.resolve()?;
    let ts = load_series(&cfg, input)?;
    let filtered = condition(&ts, &cfg.filter)?;
    print_json(&filtered)
}

fn cmd_find_rpeaks(args: &PipelineArgs, input: Option<&Path>) -> Result<()> {
    let cfg = args.resolve()?;
    let ts = load_series(&cfg, input)?;
    let events = detect_r_peaks(&ts, &cfg.detector)?;
    print_json(&events)
}

fn cmd_extract(args: &PipelineArgs, input: Option<&Path>, peaks: &Path) -> Result<()> {
    let cfg = args.resolve()?;
    let ts = load_series(&cfg, input)?;
    let events = text_io::read_event_indices(peaks)?;
    let extraction = extract_features(&ts, &events, &cfg.features)?;
    print_json(&extraction)
}

fn cmd_features(args: &PipelineArgs, input: Option<&Path>, csv: Option<&Path>) -> Result<()> {
    let cfg = args.resolve()?;
    let ts = load_series(&cfg, input)?;
    let result = run_feature_pipeline_on_series(&ts, &cfg)?;
    info!(
        "{} beats detected, {} feature vectors, {} skipped",
        result.events.len(),
        result.extraction.features.len(),
        result.extraction.skipped.len()
    );
    if let Some(path) = csv {
        features_csv::write_features_file(path, &result.extraction.features)?;
    }
    print_json(&result)
}

fn cmd_fixture(csv: Option<&Path>) -> Result<()> {
    let result = fixture::run_reference().context("reference recording")?;
    if let Some(path) = csv {
        features_csv::write_features_file(path, &result.extraction.features)?;
    }
    print_json(&result)
}

#[derive(Serialize)]
struct AcquireSummary<'a> {
    port: &'a str,
    fs: u32,
    samples: usize,
    malformed_lines: usize,
}

fn cmd_acquire(
    settings: &serial::SerialSettings,
    cfg: &AcquisitionConfig,
    out: Option<&Path>,
) -> Result<()> {
    let reader = serial::open(settings)?;
    let report = spawn_acquisition(reader, cfg)?
        .collect()
        .with_context(|| format!("acquiring from {}", settings.port))?;
    let text = text_io::format_series(&report.signal.samples);
    match out {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("failed to write {}", path.display()))?;
            print_json(&AcquireSummary {
                port: &settings.port,
                fs: report.signal.fs,
                samples: report.signal.len(),
                malformed_lines: report.malformed_lines,
            })?;
        }
        None => print!("{}", text),
    }
    Ok(())
}

fn cmd_plot(args: &PipelineArgs, input: Option<&Path>, out: &Path, max_points: usize) -> Result<()> {
    let cfg = args.resolve()?;
    let ts = load_series(&cfg, input)?;
    let result = run_feature_pipeline_on_series(&ts, &cfg)?;
    let panels = pipeline_figures(&ts, &result, max_points);
    PngBackend::new(out, (1000, 600)).draw(&panels)
}

fn cmd_simulate(params: &simulate::SimulationParams, out: Option<&Path>) -> Result<()> {
    let sim = simulate::simulate_ecg(params);
    let text = text_io::format_series(&sim.signal.samples);
    match out {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("failed to write {}", path.display()))?;
            print_json(&sim.r_peaks)?;
        }
        None => print!("{}", text),
    }
    Ok(())
}

struct PngBackend<'a> {
    path: &'a Path,
    size: (u32, u32),
}

impl<'a> PngBackend<'a> {
    fn new(path: &'a Path, size: (u32, u32)) -> Self {
        Self { path, size }
    }
}

fn rgb(color: ecgfx_lib::plot::Color) -> RGBColor {
    let (r, g, b) = color.rgb();
    RGBColor(r, g, b)
}

/// Avoid zero-width ranges for flat traces.
fn padded(lo: f64, hi: f64) -> std::ops::Range<f64> {
    if hi > lo {
        let pad = 0.05 * (hi - lo);
        (lo - pad)..(hi + pad)
    } else {
        (lo - 1.0)..(hi + 1.0)
    }
}

impl PlotBackend for PngBackend<'_> {
    fn draw(&mut self, panels: &[Figure]) -> Result<()> {
        let root = BitMapBackend::new(self.path, self.size).into_drawing_area();
        root.fill(&WHITE)?;
        let areas = root.split_evenly((panels.len().max(1), 1));
        for (fig, area) in panels.iter().zip(areas.iter()) {
            let (x0, x1, y0, y1) = fig.bounds().unwrap_or((0.0, 1.0, 0.0, 1.0));
            let mut chart = ChartBuilder::on(area)
                .margin(10)
                .caption(
                    fig.title.clone().unwrap_or_else(|| "Plot".into()),
                    ("sans-serif", 20),
                )
                .x_label_area_size(30)
                .y_label_area_size(50)
                .build_cartesian_2d(padded(x0, x1), padded(y0, y1))?;
            let mut mesh = chart.configure_mesh();
            if let Some(label) = &fig.x.label {
                mesh.x_desc(label.as_str());
            }
            if let Some(label) = &fig.y.label {
                mesh.y_desc(label.as_str());
            }
            mesh.draw()?;
            for series in &fig.series {
                match series {
                    Series::Line(line) => {
                        chart.draw_series(LineSeries::new(
                            line.points.iter().map(|p| (p[0], p[1])),
                            rgb(line.style.color).stroke_width(line.style.width.round() as u32),
                        ))?;
                    }
                    Series::Markers(markers) => {
                        let color = rgb(markers.style.color);
                        chart.draw_series(markers.points.iter().map(|p| {
                            Circle::new((p[0], p[1]), markers.style.width.round() as u32, color.filled())
                        }))?;
                    }
                }
            }
        }
        root.present()?;
        Ok(())
    }
}
