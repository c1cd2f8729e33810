//! Line-oriented sample acquisition from an ECG front end (e.g. an AD8232
//! behind a microcontroller that prints one ADC code per line).
//!
//! Lines that are not a plain non-negative integer are skipped and counted.
//! Read time-outs are retried after checking the stop flag; any other I/O
//! failure ends the acquisition with [`EcgError::Transport`], and end of
//! stream before the requested sample count with [`EcgError::Disconnected`].

use crate::{
    error::{EcgError, EcgResult},
    signal::RawSignal,
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::{
    io::{self, BufRead},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub sampling_rate_hz: u32,
    pub duration_s: f64,
    /// Samples the reader thread may run ahead of the consumer.
    pub buffer_capacity: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sampling_rate_hz: 50,
            duration_s: 5.0,
            buffer_capacity: 1024,
        }
    }
}

impl AcquisitionConfig {
    pub fn sample_count(&self) -> usize {
        (self.duration_s * self.sampling_rate_hz as f64)
            .round()
            .max(0.0) as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionReport {
    pub signal: RawSignal,
    pub malformed_lines: usize,
}

/// Parse one transport line into an ADC code.
pub fn parse_sample_line(line: usize, text: &str) -> EcgResult<i32> {
    let trimmed = text.trim();
    let malformed = || EcgError::MalformedSample {
        line,
        content: trimmed.to_string(),
    };
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    trimmed.parse::<i32>().map_err(|_| malformed())
}

/// Read samples on the calling thread until `cfg.sample_count()` are collected.
pub fn read_samples<R: BufRead>(
    reader: R,
    cfg: &AcquisitionConfig,
    stop: &AtomicBool,
) -> EcgResult<AcquisitionReport> {
    let expected = cfg.sample_count();
    let mut samples = Vec::with_capacity(expected);
    let malformed_lines = stream_samples(reader, expected, stop, |s| {
        samples.push(s);
        true
    })?;
    Ok(AcquisitionReport {
        signal: RawSignal::new(cfg.sampling_rate_hz, samples),
        malformed_lines,
    })
}

/// Feed parsed samples to `sink`; returns the number of skipped lines.
/// A `false` from the sink means the consumer is gone.
fn stream_samples<R: BufRead>(
    mut reader: R,
    expected: usize,
    stop: &AtomicBool,
    mut sink: impl FnMut(i32) -> bool,
) -> EcgResult<usize> {
    let mut collected = 0usize;
    let mut malformed = 0usize;
    let mut line_no = 0usize;
    let mut buf = Vec::with_capacity(16);
    while collected < expected {
        if stop.load(Ordering::Relaxed) {
            return Err(EcgError::Cancelled { collected });
        }
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => return Err(EcgError::Disconnected { collected, expected }),
            Ok(_) => {
                line_no += 1;
                let text = String::from_utf8_lossy(&buf);
                match parse_sample_line(line_no, &text) {
                    Ok(sample) => {
                        if !sink(sample) {
                            return Err(EcgError::Cancelled { collected });
                        }
                        collected += 1;
                    }
                    Err(err) => {
                        debug!("{}", err);
                        malformed += 1;
                    }
                }
                buf.clear();
            }
            // Partial line stays in `buf` and is completed by the next read.
            Err(err) if is_retryable(&err) => continue,
            Err(err) => return Err(err.into()),
        }
    }
    info!("acquired {} samples, skipped {} lines", collected, malformed);
    Ok(malformed)
}

fn is_retryable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Acquisition running on its own thread, handing samples over a bounded buffer.
pub struct AcquisitionHandle {
    fs: u32,
    expected: usize,
    stop: Arc<AtomicBool>,
    rx: Receiver<i32>,
    worker: JoinHandle<EcgResult<usize>>,
}

pub fn spawn_acquisition<R>(reader: R, cfg: &AcquisitionConfig) -> EcgResult<AcquisitionHandle>
where
    R: BufRead + Send + 'static,
{
    let expected = cfg.sample_count();
    let stop = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::sync_channel(cfg.buffer_capacity.max(1));
    let worker_stop = Arc::clone(&stop);
    let worker = thread::Builder::new()
        .name("ecg-acquisition".into())
        .spawn(move || stream_samples(reader, expected, &worker_stop, |s| tx.send(s).is_ok()))?;
    Ok(AcquisitionHandle {
        fs: cfg.sampling_rate_hz,
        expected,
        stop,
        rx,
        worker,
    })
}

impl AcquisitionHandle {
    /// Shared flag for aborting from another thread while [`collect`](Self::collect) blocks.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Drain the buffer into a signal. On cancellation the reader thread is
    /// left to exit on its own so a blocked read cannot hang the caller.
    pub fn collect(self) -> EcgResult<AcquisitionReport> {
        let mut samples = Vec::with_capacity(self.expected);
        while samples.len() < self.expected {
            if self.stop.load(Ordering::Relaxed) {
                return Err(EcgError::Cancelled {
                    collected: samples.len(),
                });
            }
            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(sample) => samples.push(sample),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        let malformed_lines = self
            .worker
            .join()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "acquisition thread panicked"))??;
        Ok(AcquisitionReport {
            signal: RawSignal::new(self.fs, samples),
            malformed_lines,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::{BufReader, Cursor, Read};

    fn cfg(samples: u32) -> AcquisitionConfig {
        AcquisitionConfig {
            sampling_rate_hz: samples,
            duration_s: 1.0,
            buffer_capacity: 4,
        }
    }

    /// Reader that replays scripted chunks and errors.
    struct Scripted {
        steps: VecDeque<io::Result<Vec<u8>>>,
    }

    impl Read for Scripted {
        fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
            match self.steps.pop_front() {
                None => Ok(0),
                Some(Err(err)) => Err(err),
                Some(Ok(chunk)) => {
                    let n = chunk.len().min(out.len());
                    out[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.steps.push_front(Ok(chunk[n..].to_vec()));
                    }
                    Ok(n)
                }
            }
        }
    }

    #[test]
    fn parses_plain_codes_only() {
        assert_eq!(parse_sample_line(1, "2048\r\n").unwrap(), 2048);
        for bad in ["", "  ", "-3", "1.5", "abc", "12 34", "99999999999"] {
            assert!(matches!(
                parse_sample_line(7, bad),
                Err(EcgError::MalformedSample { line: 7, .. })
            ));
        }
    }

    #[test]
    fn malformed_lines_are_skipped_and_counted() {
        let input = Cursor::new("512\nabc\n\n-3\n1.5\n600\n700\n800\n");
        let stop = AtomicBool::new(false);
        let report = read_samples(input, &cfg(3), &stop).unwrap();
        assert_eq!(report.signal.samples, vec![512, 600, 700]);
        assert_eq!(report.signal.fs, 3);
        assert_eq!(report.malformed_lines, 4);
    }

    #[test]
    fn early_end_of_stream_is_a_disconnect() {
        let stop = AtomicBool::new(false);
        let err = read_samples(Cursor::new("1\n2\n"), &cfg(5), &stop).unwrap_err();
        assert!(matches!(
            err,
            EcgError::Disconnected {
                collected: 2,
                expected: 5
            }
        ));
    }

    #[test]
    fn stop_flag_cancels() {
        let stop = AtomicBool::new(true);
        let err = read_samples(Cursor::new("1\n2\n"), &cfg(2), &stop).unwrap_err();
        assert!(matches!(err, EcgError::Cancelled { collected: 0 }));
    }

    #[test]
    fn timeouts_are_retried_without_losing_partial_lines() {
        let reader = BufReader::new(Scripted {
            steps: VecDeque::from(vec![
                Ok(b"12".to_vec()),
                Err(io::Error::new(io::ErrorKind::TimedOut, "idle")),
                Ok(b"3\n45\n".to_vec()),
            ]),
        });
        let stop = AtomicBool::new(false);
        let report = read_samples(reader, &cfg(2), &stop).unwrap();
        assert_eq!(report.signal.samples, vec![123, 45]);
    }

    #[test]
    fn transport_errors_propagate() {
        let reader = BufReader::new(Scripted {
            steps: VecDeque::from(vec![
                Ok(b"1\n".to_vec()),
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")),
            ]),
        });
        let stop = AtomicBool::new(false);
        let err = read_samples(reader, &cfg(3), &stop).unwrap_err();
        assert!(matches!(err, EcgError::Transport(_)));
    }

    #[test]
    fn threaded_acquisition_collects_through_small_buffer() {
        let text: String = (0..10).map(|i| format!("{}\n", 2000 + i)).collect();
        let handle = spawn_acquisition(Cursor::new(text), &cfg(10)).unwrap();
        let report = handle.collect().unwrap();
        assert_eq!(report.signal.len(), 10);
        assert_eq!(report.signal.samples[9], 2009);
    }

    #[test]
    fn threaded_acquisition_reports_disconnect() {
        let handle = spawn_acquisition(Cursor::new("1\nx\n2\n"), &cfg(10)).unwrap();
        let err = handle.collect().unwrap_err();
        assert!(matches!(err, EcgError::Disconnected { collected: 2, .. }));
    }

    #[test]
    fn stopping_an_idle_device_returns_promptly() {
        // A device that never produces data, only read time-outs.
        struct Idle;
        impl Read for Idle {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                thread::sleep(Duration::from_millis(5));
                Err(io::Error::new(io::ErrorKind::TimedOut, "idle"))
            }
        }
        let handle = spawn_acquisition(BufReader::new(Idle), &cfg(10)).unwrap();
        let flag = handle.stop_flag();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            flag.store(true, Ordering::Relaxed);
        });
        let err = handle.collect().unwrap_err();
        stopper.join().unwrap();
        assert!(matches!(err, EcgError::Cancelled { collected: 0 }));
    }
}
