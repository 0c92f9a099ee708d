use std::collections::VecDeque;
use std::io::Read;
use std::time::Duration;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{DaqError, Result};

/// Something that yields sample frames on demand.
///
/// `Ok(None)` means "nothing right now" (a read timeout); it is the hook the
/// acquisition loop uses to observe the stop flag, so implementations should
/// not block much longer than their configured timeout.
pub trait SampleSource: Send {
    fn next_frame(&mut self) -> Result<Option<Vec<f64>>>;
}

/// Parse one protocol line into a frame of `channel_count` values.
///
/// Fields are separated by commas or whitespace; a single-channel line is
/// just one decimal number. Returns `None` for anything malformed: wrong
/// arity, non-numeric fields, non-finite values, empty lines.
pub fn parse_frame(line: &str, channel_count: usize) -> Option<Vec<f64>> {
    let mut frame = Vec::with_capacity(channel_count);
    for field in line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
    {
        let value: f64 = field.parse().ok()?;
        if !value.is_finite() {
            return None;
        }
        frame.push(value);
    }
    if frame.len() == channel_count {
        Some(frame)
    } else {
        None
    }
}

/// Line-oriented reader for the wired sensor.
///
/// Owns the port exclusively for its lifetime; dropping the source releases
/// the device on every exit path. Malformed lines are dropped, never
/// surfaced.
pub struct SerialSource {
    port: Box<dyn serialport::SerialPort>,
    line_buf: Vec<u8>,
    ready: VecDeque<Vec<f64>>,
    channel_count: usize,
    dropped_lines: u64,
}

impl SerialSource {
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        read_timeout: Duration,
        channel_count: usize,
    ) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(read_timeout)
            .open()
            .map_err(|e| DaqError::Connection {
                port: port_name.to_string(),
                reason: e.to_string(),
            })?;
        info!("opened {port_name} at {baud_rate} baud");
        Ok(Self {
            port,
            line_buf: Vec::with_capacity(64),
            ready: VecDeque::new(),
            channel_count,
            dropped_lines: 0,
        })
    }

    /// Lines that failed to parse so far.
    pub fn dropped_lines(&self) -> u64 {
        self.dropped_lines
    }

    fn consume(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if byte == b'\n' {
                let line = String::from_utf8_lossy(&self.line_buf).into_owned();
                self.line_buf.clear();
                match parse_frame(line.trim(), self.channel_count) {
                    Some(frame) => self.ready.push_back(frame),
                    None => {
                        if !line.trim().is_empty() {
                            self.dropped_lines += 1;
                            debug!("dropped malformed line {line:?}");
                        }
                    }
                }
            } else {
                self.line_buf.push(byte);
            }
        }
    }
}

impl SampleSource for SerialSource {
    fn next_frame(&mut self) -> Result<Option<Vec<f64>>> {
        if let Some(frame) = self.ready.pop_front() {
            return Ok(Some(frame));
        }
        let mut buf = [0u8; 256];
        match self.port.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(n) => {
                self.consume(&buf[..n]);
                Ok(self.ready.pop_front())
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(DaqError::Io(e)),
        }
    }
}

/// Open-and-close connectivity check for a port, without starting a session.
pub fn probe_port(port_name: &str, baud_rate: u32) -> Result<()> {
    serialport::new(port_name, baud_rate)
        .timeout(Duration::from_millis(100))
        .open()
        .map(|_| ())
        .map_err(|e| DaqError::Connection {
            port: port_name.to_string(),
            reason: e.to_string(),
        })
}

/// Synthetic EMG for running the pipeline without hardware: an in-band tone
/// with uniform noise, paced at the configured sample rate.
pub struct SimulatedSource {
    rng: StdRng,
    sample_rate: f64,
    channel_count: usize,
    tick: u64,
}

impl SimulatedSource {
    pub fn new(sample_rate: u32, channel_count: usize, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            sample_rate: sample_rate as f64,
            channel_count,
            tick: 0,
        }
    }
}

impl SampleSource for SimulatedSource {
    fn next_frame(&mut self) -> Result<Option<Vec<f64>>> {
        std::thread::sleep(Duration::from_secs_f64(1.0 / self.sample_rate));
        let t = self.tick as f64 / self.sample_rate;
        self.tick += 1;
        let frame = (0..self.channel_count)
            .map(|ch| {
                let tone = 60.0
                    * (2.0 * std::f64::consts::PI * 80.0 * t * (1.0 + ch as f64 * 0.1)).sin();
                tone + self.rng.gen_range(-15.0..15.0)
            })
            .collect();
        Ok(Some(frame))
    }
}

/// Deterministic in-memory source for tests: plays queued frames, then acts
/// like an idle device.
pub struct ScriptedSource {
    frames: VecDeque<Vec<f64>>,
}

impl ScriptedSource {
    pub fn from_frames(frames: impl IntoIterator<Item = Vec<f64>>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    /// Build from protocol lines, dropping malformed ones exactly like the
    /// serial reader does.
    pub fn from_lines<S: AsRef<str>>(lines: &[S], channel_count: usize) -> Self {
        Self {
            frames: lines
                .iter()
                .filter_map(|line| parse_frame(line.as_ref().trim(), channel_count))
                .collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl SampleSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<Option<Vec<f64>>> {
        match self.frames.pop_front() {
            Some(frame) => Ok(Some(frame)),
            None => {
                // Idle device: pace like a read timeout would.
                std::thread::sleep(Duration::from_millis(1));
                Ok(None)
            }
        }
    }
}
