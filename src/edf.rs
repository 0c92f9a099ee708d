use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Datelike, Local, Timelike};
use log::debug;
use once_cell::sync::Lazy;

use crate::config::BitDepth;
use crate::error::{DaqError, Result};

/// Bytes of main header; each signal adds another 256.
const MAIN_HEADER_LEN: usize = 256;
const SIGNAL_HEADER_LEN: usize = 256;
/// Offset of the data-record count field, patched on close.
const RECORD_COUNT_OFFSET: u64 = 236;

/// Per-channel metadata written into the container header, exactly once,
/// before any sample data.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelHeader {
    pub label: String,
    pub transducer: String,
    pub dimension: String,
    pub physical_min: f64,
    pub physical_max: f64,
    pub digital_min: i32,
    pub digital_max: i32,
    /// Samples per one-second data record; equals the sample rate.
    pub samples_per_record: usize,
    pub prefilter: String,
}

impl ChannelHeader {
    /// Header for one EMG channel at the given ADC generation.
    pub fn emg(label: &str, bit_depth: BitDepth, sample_rate: u32, prefilter: &str) -> Self {
        let (physical_min, physical_max) = bit_depth.physical_range();
        let (digital_min, digital_max) = bit_depth.digital_range();
        Self {
            label: label.to_string(),
            transducer: "EMG sensor".to_string(),
            dimension: "uV".to_string(),
            physical_min,
            physical_max,
            digital_min,
            digital_max,
            samples_per_record: sample_rate as usize,
            prefilter: prefilter.to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.physical_min >= self.physical_max {
            return Err(DaqError::Format(format!(
                "physical range [{}, {}] is empty",
                self.physical_min, self.physical_max
            )));
        }
        if self.digital_min >= self.digital_max {
            return Err(DaqError::Format(format!(
                "digital range [{}, {}] is empty",
                self.digital_min, self.digital_max
            )));
        }
        if self.samples_per_record == 0 {
            return Err(DaqError::Format("samples_per_record must be positive".into()));
        }
        Ok(())
    }

    fn bit_value(&self) -> f64 {
        (self.physical_max - self.physical_min) / (self.digital_max - self.digital_min) as f64
    }

    fn offset(&self) -> f64 {
        self.physical_max / self.bit_value() - self.digital_max as f64
    }

    pub fn to_digital(&self, physical: f64) -> i32 {
        let digital = (physical / self.bit_value() - self.offset()).round() as i32;
        digital.clamp(self.digital_min, self.digital_max)
    }

    pub fn to_physical(&self, digital: i32) -> f64 {
        self.bit_value() * (self.offset() + digital as f64)
    }
}

// One writer per path at a time, process-wide.
static OPEN_WRITERS: Lazy<Mutex<HashSet<PathBuf>>> = Lazy::new(|| Mutex::new(HashSet::new()));

fn register_writer(path: &Path) -> Result<()> {
    let mut open = OPEN_WRITERS.lock().expect("writer registry poisoned");
    if !open.insert(path.to_path_buf()) {
        return Err(DaqError::AlreadyOpen(path.to_path_buf()));
    }
    Ok(())
}

fn unregister_writer(path: &Path) {
    let mut open = OPEN_WRITERS.lock().expect("writer registry poisoned");
    open.remove(path);
}

/// Streaming EDF writer.
///
/// `create` writes the full header block immediately; `write_chunk` appends
/// samples in call order, emitting one-second data records as they fill;
/// `close` writes any short final record and patches the record count so the
/// file is valid even when the last chunk was partial. Every sample handed
/// to `write_chunk` before `close` is readable back, exactly once.
#[derive(Debug)]
pub struct EdfWriter {
    file: Option<BufWriter<File>>,
    path: PathBuf,
    channels: Vec<ChannelHeader>,
    samples_per_record: usize,
    pending: Vec<Vec<f64>>,
    full_records: u64,
    samples_written: u64,
    closed: bool,
}

impl EdfWriter {
    pub fn create<P: AsRef<Path>>(
        path: P,
        subject: &str,
        channels: Vec<ChannelHeader>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if channels.is_empty() {
            return Err(DaqError::Format("at least one channel is required".into()));
        }
        for channel in &channels {
            channel.validate()?;
        }
        let samples_per_record = channels[0].samples_per_record;
        if channels.iter().any(|c| c.samples_per_record != samples_per_record) {
            return Err(DaqError::Format(
                "all channels must share one samples_per_record".into(),
            ));
        }

        register_writer(&path)?;
        let file = match File::create(&path) {
            Ok(file) => file,
            Err(e) => {
                unregister_writer(&path);
                return Err(DaqError::Write { path, source: e });
            }
        };

        let channel_count = channels.len();
        let mut writer = Self {
            file: Some(BufWriter::new(file)),
            path,
            channels,
            samples_per_record,
            pending: vec![Vec::new(); channel_count],
            full_records: 0,
            samples_written: 0,
            closed: false,
        };
        writer.write_header(subject, Local::now())?;
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Samples accepted so far, per channel.
    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    fn write_header(&mut self, subject: &str, start: DateTime<Local>) -> Result<()> {
        let ns = self.channels.len();
        let header_bytes = MAIN_HEADER_LEN + ns * SIGNAL_HEADER_LEN;

        let mut main = vec![b' '; MAIN_HEADER_LEN];
        put_field(&mut main, 0, 8, "0");
        put_field(&mut main, 8, 80, &format!("{} X X X", sanitize(subject)));
        let startdate = format!(
            "Startdate {:02}-{}-{} {}",
            start.day(),
            month_abbrev(start.month()),
            start.year(),
            sanitize(subject),
        );
        put_field(&mut main, 88, 80, &startdate);
        put_field(
            &mut main,
            168,
            8,
            &format!("{:02}.{:02}.{:02}", start.day(), start.month(), start.year() % 100),
        );
        put_field(
            &mut main,
            176,
            8,
            &format!("{:02}.{:02}.{:02}", start.hour(), start.minute(), start.second()),
        );
        put_field(&mut main, 184, 8, &header_bytes.to_string());
        // [192..236) reserved
        put_field(&mut main, 236, 8, "-1"); // record count, patched on close
        put_field(&mut main, 244, 8, "1"); // one-second records
        put_field(&mut main, 252, 4, &ns.to_string());
        self.write_all(&main)?;

        // Signal headers are field-major: every label, then every
        // transducer, and so on.
        let mut signal = vec![b' '; ns * SIGNAL_HEADER_LEN];
        for (i, channel) in self.channels.iter().enumerate() {
            put_field(&mut signal, i * 16, 16, &channel.label);
            put_field(&mut signal, ns * 16 + i * 80, 80, &channel.transducer);
            put_field(&mut signal, ns * 96 + i * 8, 8, &channel.dimension);
            put_field(&mut signal, ns * 104 + i * 8, 8, &num_field(channel.physical_min));
            put_field(&mut signal, ns * 112 + i * 8, 8, &num_field(channel.physical_max));
            put_field(&mut signal, ns * 120 + i * 8, 8, &channel.digital_min.to_string());
            put_field(&mut signal, ns * 128 + i * 8, 8, &channel.digital_max.to_string());
            put_field(&mut signal, ns * 136 + i * 80, 80, &channel.prefilter);
            put_field(&mut signal, ns * 216 + i * 8, 8, &channel.samples_per_record.to_string());
            // ns * 224 .. : 32 reserved bytes per signal
        }
        self.write_all(&signal)
    }

    /// Append one chunk of samples, `chunk[channel][i]`. Channel slices must
    /// have equal length; any length is accepted, full records are emitted
    /// as they fill.
    pub fn write_chunk(&mut self, chunk: &[Vec<f64>]) -> Result<()> {
        if self.closed {
            return Err(DaqError::Format("writer is closed".into()));
        }
        if chunk.len() != self.channels.len() {
            return Err(DaqError::Format(format!(
                "chunk has {} channels, file has {}",
                chunk.len(),
                self.channels.len()
            )));
        }
        let len = chunk[0].len();
        if chunk.iter().any(|c| c.len() != len) {
            return Err(DaqError::Format("chunk channels differ in length".into()));
        }

        for (pending, samples) in self.pending.iter_mut().zip(chunk) {
            pending.extend_from_slice(samples);
        }
        self.samples_written += len as u64;

        let mut wrote_record = false;
        while self.pending[0].len() >= self.samples_per_record {
            let record: Vec<Vec<f64>> = self
                .pending
                .iter_mut()
                .map(|pending| pending.drain(..self.samples_per_record).collect())
                .collect();
            self.write_record(&record)?;
            self.full_records += 1;
            wrote_record = true;
        }
        if wrote_record {
            // Records reach the disk as they complete; an abrupt
            // termination loses at most the pending partial record.
            let file = self.file.as_mut().expect("writer file missing");
            file.flush()
                .map_err(|e| DaqError::Write { path: self.path.clone(), source: e })?;
        }
        Ok(())
    }

    fn write_record(&mut self, record: &[Vec<f64>]) -> Result<()> {
        let mut bytes = Vec::with_capacity(record.iter().map(|c| c.len() * 2).sum());
        for (channel, samples) in self.channels.iter().zip(record) {
            for &physical in samples {
                let digital = channel.to_digital(physical) as i16;
                bytes.extend_from_slice(&digital.to_le_bytes());
            }
        }
        self.write_all(&bytes)
    }

    /// Flush everything and finalize the header. The last data record may be
    /// shorter than `samples_per_record`; readers recover the exact sample
    /// count from the file size.
    pub fn close(mut self) -> Result<()> {
        let remainder: Vec<Vec<f64>> = self.pending.iter_mut().map(std::mem::take).collect();
        if !remainder[0].is_empty() {
            self.write_record(&remainder)?;
        }

        let mut writer = self.file.take().expect("file taken twice");
        writer
            .flush()
            .map_err(|e| DaqError::Write { path: self.path.clone(), source: e })?;
        let mut file = writer
            .into_inner()
            .map_err(|e| DaqError::Write { path: self.path.clone(), source: e.into_error() })?;
        file.seek(SeekFrom::Start(RECORD_COUNT_OFFSET))
            .map_err(|e| DaqError::Write { path: self.path.clone(), source: e })?;
        file.write_all(format!("{:<8}", self.full_records).as_bytes())
            .map_err(|e| DaqError::Write { path: self.path.clone(), source: e })?;
        file.flush()
            .map_err(|e| DaqError::Write { path: self.path.clone(), source: e })?;

        self.closed = true;
        unregister_writer(&self.path);
        debug!(
            "closed {} with {} samples in {} full records",
            self.path.display(),
            self.samples_written,
            self.full_records
        );
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let file = self.file.as_mut().expect("writer file missing");
        file.write_all(bytes)
            .map_err(|e| DaqError::Write { path: self.path.clone(), source: e })
    }
}

impl Drop for EdfWriter {
    fn drop(&mut self) {
        if !self.closed {
            // Abnormal teardown: flush what we have and release the path.
            if let Some(mut file) = self.file.take() {
                let _ = file.flush();
            }
            unregister_writer(&self.path);
        }
    }
}

/// Reader for files produced by [`EdfWriter`]; used for the raw-trace
/// readback that feeds the filter stage.
pub struct EdfReader {
    file: BufReader<File>,
    channels: Vec<ChannelHeader>,
    samples_per_channel: u64,
    data_offset: u64,
}

impl EdfReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = BufReader::new(File::open(path)?);

        let mut main = [0u8; MAIN_HEADER_LEN];
        file.read_exact(&mut main)
            .map_err(|_| DaqError::Format(format!("{}: truncated header", path.display())))?;
        if get_field(&main, 0, 8) != "0" {
            return Err(DaqError::Format(format!(
                "{}: not an EDF file",
                path.display()
            )));
        }
        let ns: usize = get_field(&main, 252, 4)
            .parse()
            .map_err(|_| DaqError::Format(format!("{}: bad signal count", path.display())))?;
        if ns == 0 {
            return Err(DaqError::Format(format!("{}: no signals", path.display())));
        }

        let mut signal = vec![0u8; ns * SIGNAL_HEADER_LEN];
        file.read_exact(&mut signal)
            .map_err(|_| DaqError::Format(format!("{}: truncated signal headers", path.display())))?;

        let mut channels = Vec::with_capacity(ns);
        for i in 0..ns {
            let parse_f64 = |offset: usize, what: &str| -> Result<f64> {
                get_field(&signal, offset, 8).parse().map_err(|_| {
                    DaqError::Format(format!("{}: bad {what} for signal {i}", path.display()))
                })
            };
            let parse_i32 = |offset: usize, what: &str| -> Result<i32> {
                get_field(&signal, offset, 8).parse().map_err(|_| {
                    DaqError::Format(format!("{}: bad {what} for signal {i}", path.display()))
                })
            };
            let channel = ChannelHeader {
                label: get_field(&signal, i * 16, 16),
                transducer: get_field(&signal, ns * 16 + i * 80, 80),
                dimension: get_field(&signal, ns * 96 + i * 8, 8),
                physical_min: parse_f64(ns * 104 + i * 8, "physical_min")?,
                physical_max: parse_f64(ns * 112 + i * 8, "physical_max")?,
                digital_min: parse_i32(ns * 120 + i * 8, "digital_min")?,
                digital_max: parse_i32(ns * 128 + i * 8, "digital_max")?,
                prefilter: get_field(&signal, ns * 136 + i * 80, 80),
                samples_per_record: get_field(&signal, ns * 216 + i * 8, 8)
                    .parse()
                    .map_err(|_| {
                        DaqError::Format(format!(
                            "{}: bad samples_per_record for signal {i}",
                            path.display()
                        ))
                    })?,
            };
            channel.validate()?;
            channels.push(channel);
        }

        let samples_per_record = channels[0].samples_per_record as u64;
        if channels
            .iter()
            .any(|c| c.samples_per_record as u64 != samples_per_record)
        {
            return Err(DaqError::Format(format!(
                "{}: channels disagree on samples_per_record",
                path.display()
            )));
        }

        let data_offset = (MAIN_HEADER_LEN + ns * SIGNAL_HEADER_LEN) as u64;
        let file_len = file.get_ref().metadata()?.len();
        let data_bytes = file_len.saturating_sub(data_offset);
        let record_bytes = samples_per_record * ns as u64 * 2;
        let full_records = data_bytes / record_bytes;
        let tail_bytes = data_bytes % record_bytes;
        if tail_bytes % (ns as u64 * 2) != 0 {
            return Err(DaqError::Format(format!(
                "{}: data section is not frame-aligned",
                path.display()
            )));
        }
        let tail_samples = tail_bytes / (ns as u64 * 2);
        let samples_per_channel = full_records * samples_per_record + tail_samples;

        Ok(Self {
            file,
            channels,
            samples_per_channel,
            data_offset,
        })
    }

    pub fn channels(&self) -> &[ChannelHeader] {
        &self.channels
    }

    /// Sample rate implied by the one-second record layout.
    pub fn sample_frequency(&self) -> u32 {
        self.channels[0].samples_per_record as u32
    }

    pub fn samples_per_channel(&self) -> u64 {
        self.samples_per_channel
    }

    /// Read the complete trace, one `Vec` per channel.
    pub fn read_all(&mut self) -> Result<Vec<Vec<f64>>> {
        let ns = self.channels.len();
        let spr = self.channels[0].samples_per_record;
        let total = self.samples_per_channel as usize;
        let mut traces = vec![Vec::with_capacity(total); ns];

        self.file.seek(SeekFrom::Start(self.data_offset))?;
        let mut remaining = total;
        while remaining > 0 {
            let record_len = remaining.min(spr);
            for trace_idx in 0..ns {
                let channel = &self.channels[trace_idx];
                let mut bytes = vec![0u8; record_len * 2];
                self.file.read_exact(&mut bytes)?;
                for pair in bytes.chunks_exact(2) {
                    let digital = i16::from_le_bytes([pair[0], pair[1]]);
                    traces[trace_idx].push(channel.to_physical(digital as i32));
                }
            }
            remaining -= record_len;
        }
        Ok(traces)
    }
}

fn put_field(buffer: &mut [u8], offset: usize, width: usize, text: &str) {
    let ascii = sanitize(text);
    let bytes = ascii.as_bytes();
    let len = bytes.len().min(width);
    buffer[offset..offset + len].copy_from_slice(&bytes[..len]);
}

fn get_field(buffer: &[u8], offset: usize, width: usize) -> String {
    String::from_utf8_lossy(&buffer[offset..offset + width])
        .trim()
        .to_string()
}

fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .collect()
}

fn num_field(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e7 {
        format!("{}", value as i64)
    } else {
        let mut text = format!("{value:.3}");
        text.truncate(8);
        text
    }
}

fn month_abbrev(month: u32) -> &'static str {
    match month {
        1 => "JAN",
        2 => "FEB",
        3 => "MAR",
        4 => "APR",
        5 => "MAY",
        6 => "JUN",
        7 => "JUL",
        8 => "AUG",
        9 => "SEP",
        10 => "OCT",
        11 => "NOV",
        12 => "DEC",
        _ => "XXX",
    }
}
