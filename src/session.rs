use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::Local;
use log::{info, warn};
use serde::Serialize;

use crate::buffer::ChunkBuffer;
use crate::config::{DaqConfig, FilterMode};
use crate::edf::{ChannelHeader, EdfReader, EdfWriter};
use crate::error::{DaqError, Result};
use crate::filter::BandPass;
use crate::source::{SampleSource, SerialSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Recording,
    Stopping,
    Filtering,
    Complete,
    Error,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Complete | SessionState::Error)
    }

    /// True while the session holds the device or its files.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionState::Recording | SessionState::Stopping | SessionState::Filtering
        )
    }
}

/// How long to record: a wall-clock duration or an exact sample count, both
/// resolved to a sample count at the configured rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordTarget {
    Duration(Duration),
    Samples(u64),
}

impl RecordTarget {
    pub fn samples(self, sample_rate: u32) -> u64 {
        match self {
            RecordTarget::Samples(n) => n,
            RecordTarget::Duration(d) => (d.as_secs_f64() * sample_rate as f64).round() as u64,
        }
    }
}

/// Snapshot handed to status pollers.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: Option<u64>,
    pub subject: String,
    pub state: SessionState,
    pub elapsed_ms: u64,
    pub samples_collected: u64,
    pub raw_path: Option<PathBuf>,
    pub filtered_path: Option<PathBuf>,
    /// Amplitude-threshold flag over the most recent raw sample.
    pub active: bool,
    pub message: Option<String>,
}

struct Session {
    id: Option<u64>,
    subject: String,
    state: SessionState,
    started: Instant,
    final_elapsed_ms: Option<u64>,
    samples_collected: u64,
    target_samples: u64,
    raw_path: Option<PathBuf>,
    filtered_path: Option<PathBuf>,
    last_amplitude: f64,
    /// Most recent causal-filter output, when `FilterMode::Causal` is on.
    last_filtered: Option<f64>,
    message: Option<String>,
}

impl Session {
    fn idle() -> Self {
        Self {
            id: None,
            subject: String::new(),
            state: SessionState::Idle,
            started: Instant::now(),
            final_elapsed_ms: None,
            samples_collected: 0,
            target_samples: 0,
            raw_path: None,
            filtered_path: None,
            last_amplitude: 0.0,
            last_filtered: None,
            message: None,
        }
    }

    fn elapsed_ms(&self) -> u64 {
        match (self.id, self.final_elapsed_ms) {
            (None, _) => 0,
            (_, Some(ms)) => ms,
            _ => self.started.elapsed().as_millis() as u64,
        }
    }
}

/// Owns the session lifecycle: wires source → buffer → raw writer while
/// recording, then readback → band-pass → filtered writer, and guarantees
/// the device and every file handle are released on all exit paths.
///
/// Exactly one session can be active at a time; a terminal session is
/// replaced by the next `start`.
pub struct SessionController {
    config: DaqConfig,
    shared: Arc<Mutex<Session>>,
    stop_flag: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    worker: Option<JoinHandle<()>>,
    next_id: u64,
}

impl SessionController {
    pub fn new(config: DaqConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Mutex::new(Session::idle())),
            stop_flag: Arc::new(AtomicBool::new(false)),
            reader: None,
            worker: None,
            next_id: 1,
        }
    }

    pub fn config(&self) -> &DaqConfig {
        &self.config
    }

    /// Start recording from the configured serial device.
    ///
    /// Fails with `AlreadyRecording` if a session is active, with
    /// `Connection` if the port cannot be opened (before any file is
    /// created), and with config errors before the device is touched.
    pub fn start(&mut self, subject: &str, port: &str, target: RecordTarget) -> Result<u64> {
        self.ensure_startable()?;
        let source = SerialSource::open(
            port,
            self.config.baud_rate,
            Duration::from_millis(self.config.read_timeout_ms),
            self.config.channel_count,
        )?;
        self.spawn_session(subject, Box::new(source), target)
    }

    /// Start recording from an arbitrary source; used by the simulator and
    /// by tests.
    pub fn start_with_source(
        &mut self,
        subject: &str,
        source: Box<dyn SampleSource>,
        target: RecordTarget,
    ) -> Result<u64> {
        self.ensure_startable()?;
        self.spawn_session(subject, source, target)
    }

    /// Request a cooperative stop; honored within one read timeout.
    pub fn stop(&self) -> Result<()> {
        {
            let shared = self.shared.lock().expect("session lock poisoned");
            if shared.state != SessionState::Recording {
                return Err(DaqError::NotRecording);
            }
        }
        self.stop_flag.store(true, Ordering::SeqCst);
        info!("stop requested");
        Ok(())
    }

    pub fn status(&self) -> SessionStatus {
        let shared = self.shared.lock().expect("session lock poisoned");
        SessionStatus {
            session_id: shared.id,
            subject: shared.subject.clone(),
            state: shared.state,
            elapsed_ms: shared.elapsed_ms(),
            samples_collected: shared.samples_collected,
            raw_path: shared.raw_path.clone(),
            filtered_path: shared.filtered_path.clone(),
            active: shared.last_amplitude >= self.config.activity_threshold_uv,
            message: shared.message.clone(),
        }
    }

    /// Latest causal-filter output, present only in `FilterMode::Causal`.
    pub fn live_filtered(&self) -> Option<f64> {
        self.shared.lock().expect("session lock poisoned").last_filtered
    }

    fn ensure_startable(&mut self) -> Result<()> {
        {
            let shared = self.shared.lock().expect("session lock poisoned");
            if shared.state.is_active() {
                return Err(DaqError::AlreadyRecording);
            }
        }
        // The previous session (if any) is terminal; reap its threads.
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        self.config.validate()
    }

    fn spawn_session(
        &mut self,
        subject: &str,
        source: Box<dyn SampleSource>,
        target: RecordTarget,
    ) -> Result<u64> {
        let id = self.next_id;
        self.next_id += 1;
        let target_samples = target.samples(self.config.sample_rate);

        let mut session = Session::idle();
        session.id = Some(id);
        session.subject = subject.to_string();
        session.state = SessionState::Recording;
        session.started = Instant::now();
        session.target_samples = target_samples;
        *self.shared.lock().expect("session lock poisoned") = session;

        let stop_flag = Arc::new(AtomicBool::new(false));
        self.stop_flag = Arc::clone(&stop_flag);

        let (tx, rx) = mpsc::channel::<Vec<f64>>();
        self.reader = Some(std::thread::spawn({
            let stop = Arc::clone(&stop_flag);
            move || acquisition_loop(source, tx, stop)
        }));

        self.worker = Some(std::thread::spawn({
            let config = self.config.clone();
            let shared = Arc::clone(&self.shared);
            let stop = Arc::clone(&stop_flag);
            let subject = subject.to_string();
            move || {
                if let Err(e) = run_session(&config, &subject, &shared, &stop, rx) {
                    warn!("session {id} failed: {e}");
                    stop.store(true, Ordering::SeqCst);
                    let mut session = shared.lock().expect("session lock poisoned");
                    session.state = SessionState::Error;
                    session.message = Some(e.to_string());
                    session.final_elapsed_ms = Some(session.started.elapsed().as_millis() as u64);
                }
            }
        }));

        info!("session {id} started for {subject:?} (target {target_samples} samples)");
        Ok(id)
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

/// Acquisition path: pull frames from the source and hand them to the
/// session worker. The stop flag is observed at every timeout boundary, so
/// shutdown latency is bounded by one read timeout. Dropping the source on
/// exit releases the device on every path out of this loop.
fn acquisition_loop(mut source: Box<dyn SampleSource>, tx: Sender<Vec<f64>>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::SeqCst) {
        match source.next_frame() {
            Ok(Some(frame)) => {
                if tx.send(frame).is_err() {
                    break;
                }
            }
            Ok(None) => continue,
            Err(e) => {
                warn!("device read failed, ending acquisition: {e}");
                break;
            }
        }
    }
}

fn file_stem(subject: &str) -> String {
    let cleaned: String = subject
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let cleaned = if cleaned.is_empty() { "session".to_string() } else { cleaned };
    format!("{cleaned}_{}", Local::now().format("%b-%d-%Y_%H-%M-%S"))
}

fn channel_headers(config: &DaqConfig, prefilter: &str) -> Vec<ChannelHeader> {
    (0..config.channel_count)
        .map(|ch| {
            let label = if config.channel_count == 1 {
                "EMG".to_string()
            } else {
                format!("EMG {}", ch + 1)
            };
            ChannelHeader::emg(&label, config.bit_depth, config.sample_rate, prefilter)
        })
        .collect()
}

/// The session pipeline, from first frame to filtered file.
///
/// Any error propagated from here lands the session in `Error`; writers are
/// flushed best-effort on unwind paths by their `Drop`, and the reader
/// thread releases the device as soon as the stop flag is raised or its
/// channel closes.
fn run_session(
    config: &DaqConfig,
    subject: &str,
    shared: &Arc<Mutex<Session>>,
    stop: &Arc<AtomicBool>,
    rx: Receiver<Vec<f64>>,
) -> Result<()> {
    let stem = file_stem(subject);
    let raw_dir = config.output_dir.join("raw");
    let filtered_dir = config.output_dir.join("filtered");
    std::fs::create_dir_all(&raw_dir)?;
    std::fs::create_dir_all(&filtered_dir)?;
    let raw_path = raw_dir.join(format!("{stem}_raw.edf"));
    let filtered_path = filtered_dir.join(format!("{stem}_filtered.edf"));

    let mut writer = EdfWriter::create(&raw_path, subject, channel_headers(config, "None"))?;
    {
        let mut session = shared.lock().expect("session lock poisoned");
        session.raw_path = Some(raw_path.clone());
    }

    let mut buffer = ChunkBuffer::new(config.channel_count, config.sample_rate as usize)?;
    let mut live_filter = match config.filter_mode {
        FilterMode::Causal => Some(BandPass::new(
            config.filter_low_hz,
            config.filter_high_hz,
            config.filter_order,
            config.sample_rate as f64,
            config.channel_count,
        )?),
        FilterMode::Batch => None,
    };

    let target_samples = {
        let session = shared.lock().expect("session lock poisoned");
        session.target_samples
    };
    let mut collected: u64 = 0;

    let handle_frame = |frame: Vec<f64>,
                        collected: &mut u64,
                        buffer: &mut ChunkBuffer,
                        writer: &mut EdfWriter,
                        live_filter: &mut Option<BandPass>|
     -> Result<()> {
        let live = live_filter.as_mut().map(|filter| filter.push(0, frame[0]));
        buffer.push_frame(&frame)?;
        *collected += 1;
        {
            let mut session = shared.lock().expect("session lock poisoned");
            session.samples_collected = *collected;
            session.last_amplitude = frame[0].abs();
            if live.is_some() {
                session.last_filtered = live;
            }
        }
        if let Some(chunk) = buffer.take_chunk() {
            writer.write_chunk(&chunk)?;
        }
        Ok(())
    };

    // Recording: drain the acquisition channel until a stop trigger fires.
    while collected < target_samples && !stop.load(Ordering::SeqCst) {
        match rx.recv_timeout(Duration::from_millis(50)) {
            Ok(frame) => {
                handle_frame(frame, &mut collected, &mut buffer, &mut writer, &mut live_filter)?
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // Stopping: tell the reader to let go of the device, accept whatever is
    // already in flight (still bounded by the target), flush the partial
    // chunk, and finalize the raw file.
    {
        let mut session = shared.lock().expect("session lock poisoned");
        session.state = SessionState::Stopping;
    }
    stop.store(true, Ordering::SeqCst);
    loop {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(frame) if collected < target_samples => {
                handle_frame(frame, &mut collected, &mut buffer, &mut writer, &mut live_filter)?
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }
    if let Some(chunk) = buffer.drain_remainder() {
        writer.write_chunk(&chunk)?;
    }
    writer.close()?;
    info!("raw trace closed at {collected} samples: {}", raw_path.display());

    // Filtering: read the whole raw trace back and derive the band-passed
    // copy. The persisted output always comes from the batch pass.
    {
        let mut session = shared.lock().expect("session lock poisoned");
        session.state = SessionState::Filtering;
    }
    let mut reader = EdfReader::open(&raw_path)?;
    let traces = reader.read_all()?;
    let mut band_pass = BandPass::new(
        config.filter_low_hz,
        config.filter_high_hz,
        config.filter_order,
        config.sample_rate as f64,
        config.channel_count,
    )?;
    let filtered = band_pass.run_channels(&traces);

    let headers = channel_headers(config, &band_pass.annotation());
    let mut filtered_writer = EdfWriter::create(&filtered_path, subject, headers)?;
    filtered_writer.write_chunk(&filtered)?;
    filtered_writer.close()?;
    info!("filtered trace written: {}", filtered_path.display());

    {
        let mut session = shared.lock().expect("session lock poisoned");
        session.filtered_path = Some(filtered_path);
        session.state = SessionState::Complete;
        session.final_elapsed_ms = Some(session.started.elapsed().as_millis() as u64);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ScriptedSource;
    use std::fs;
    use std::path::Path;

    fn test_config(name: &str, sample_rate: u32) -> DaqConfig {
        let nyquist = sample_rate as f64 / 2.0;
        let mut config = DaqConfig::default();
        config.sample_rate = sample_rate;
        config.filter_low_hz = (nyquist * 0.08).min(20.0);
        config.filter_high_hz = nyquist * 0.8;
        config.output_dir = std::env::temp_dir().join(format!("myotrace_session_{name}"));
        config
    }

    fn cleanup(dir: &Path) {
        fs::remove_dir_all(dir).ok();
    }

    fn wait_for<F: Fn(&SessionStatus) -> bool>(
        controller: &SessionController,
        predicate: F,
    ) -> SessionStatus {
        let deadline = Instant::now() + Duration::from_secs(20);
        loop {
            let status = controller.status();
            if predicate(&status) {
                return status;
            }
            if Instant::now() > deadline {
                panic!("timed out waiting; last status {status:?}");
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    fn wait_terminal(controller: &SessionController) -> SessionStatus {
        wait_for(controller, |s| s.state.is_terminal())
    }

    #[test]
    fn records_only_valid_lines() {
        let config = test_config("valid_lines", 100);
        let out_dir = config.output_dir.clone();
        let mut controller = SessionController::new(config);

        // 250 valid lines interleaved with malformed ones.
        let mut lines = Vec::new();
        for i in 0..250 {
            lines.push(format!("{}", (i % 200) as f64 - 100.0));
            if i % 10 == 0 {
                lines.push("garbage".to_string());
                lines.push("".to_string());
            }
        }
        let source = ScriptedSource::from_lines(&lines, 1);
        controller
            .start_with_source("S01", Box::new(source), RecordTarget::Samples(250))
            .unwrap();

        let status = wait_terminal(&controller);
        assert_eq!(status.state, SessionState::Complete, "{:?}", status.message);
        assert_eq!(status.samples_collected, 250);

        let mut raw = EdfReader::open(status.raw_path.as_ref().unwrap()).unwrap();
        assert_eq!(raw.samples_per_channel(), 250);
        let mut filtered = EdfReader::open(status.filtered_path.as_ref().unwrap()).unwrap();
        assert_eq!(filtered.samples_per_channel(), 250);
        cleanup(&out_dir);
    }

    #[test]
    fn zero_sample_session_produces_valid_files() {
        let config = test_config("zero_samples", 100);
        let out_dir = config.output_dir.clone();
        let mut controller = SessionController::new(config);

        let source = ScriptedSource::from_frames(Vec::new());
        controller
            .start_with_source("S02", Box::new(source), RecordTarget::Samples(1000))
            .unwrap();
        wait_for(&controller, |s| s.state == SessionState::Recording);
        controller.stop().unwrap();

        let status = wait_terminal(&controller);
        assert_eq!(status.state, SessionState::Complete, "{:?}", status.message);
        assert_eq!(status.samples_collected, 0);

        let mut raw = EdfReader::open(status.raw_path.as_ref().unwrap()).unwrap();
        assert_eq!(raw.samples_per_channel(), 0);
        assert_eq!(raw.channels()[0].label, "EMG");
        let mut filtered = EdfReader::open(status.filtered_path.as_ref().unwrap()).unwrap();
        assert_eq!(filtered.samples_per_channel(), 0);
        cleanup(&out_dir);
    }

    #[test]
    fn second_start_is_rejected_without_disturbing_the_first() {
        let config = test_config("double_start", 100);
        let out_dir = config.output_dir.clone();
        let mut controller = SessionController::new(config);

        // A source that delivers a few frames and then idles keeps the
        // session in Recording until we stop it.
        let frames: Vec<Vec<f64>> = (0..42).map(|i| vec![i as f64]).collect();
        let source = ScriptedSource::from_frames(frames);
        let first_id = controller
            .start_with_source("S03", Box::new(source), RecordTarget::Samples(10_000))
            .unwrap();
        let before = wait_for(&controller, |s| s.samples_collected == 42);
        assert_eq!(before.state, SessionState::Recording);

        let second = controller.start_with_source(
            "S04",
            Box::new(ScriptedSource::from_frames(Vec::new())),
            RecordTarget::Samples(10),
        );
        assert!(matches!(second, Err(DaqError::AlreadyRecording)));

        let after = controller.status();
        assert_eq!(after.session_id, Some(first_id));
        assert_eq!(after.state, SessionState::Recording);
        assert_eq!(after.samples_collected, 42);

        controller.stop().unwrap();
        let status = wait_terminal(&controller);
        assert_eq!(status.state, SessionState::Complete, "{:?}", status.message);
        assert_eq!(status.samples_collected, 42);
        cleanup(&out_dir);
    }

    #[test]
    fn stop_without_session_reports_not_recording() {
        let controller = SessionController::new(test_config("stop_idle", 100));
        assert!(matches!(controller.stop(), Err(DaqError::NotRecording)));
        assert_eq!(controller.status().state, SessionState::Idle);
    }

    #[test]
    fn stop_after_complete_reports_not_recording() {
        let config = test_config("stop_after_complete", 100);
        let out_dir = config.output_dir.clone();
        let mut controller = SessionController::new(config);
        let source = ScriptedSource::from_frames(vec![vec![1.0]; 10]);
        controller
            .start_with_source("S05", Box::new(source), RecordTarget::Samples(10))
            .unwrap();
        let status = wait_terminal(&controller);
        assert_eq!(status.state, SessionState::Complete, "{:?}", status.message);
        assert!(matches!(controller.stop(), Err(DaqError::NotRecording)));
        cleanup(&out_dir);
    }

    #[test]
    fn full_trace_attenuates_dc_relative_to_raw() {
        // 5000 frames at 1 kHz: 300 uV DC offset plus an in-band 100 Hz
        // tone, everything inside [-500, 500].
        let config = test_config("dc_attenuation", 1000);
        let out_dir = config.output_dir.clone();
        let mut controller = SessionController::new(config);

        let frames: Vec<Vec<f64>> = (0..5000)
            .map(|i| {
                let t = i as f64 / 1000.0;
                vec![300.0 + 100.0 * (2.0 * std::f64::consts::PI * 100.0 * t).sin()]
            })
            .collect();
        controller
            .start_with_source(
                "S06",
                Box::new(ScriptedSource::from_frames(frames)),
                RecordTarget::Samples(5000),
            )
            .unwrap();
        let status = wait_terminal(&controller);
        assert_eq!(status.state, SessionState::Complete, "{:?}", status.message);

        let mut raw = EdfReader::open(status.raw_path.as_ref().unwrap()).unwrap();
        let raw_trace = raw.read_all().unwrap().remove(0);
        let mut filtered = EdfReader::open(status.filtered_path.as_ref().unwrap()).unwrap();
        let filtered_trace = filtered.read_all().unwrap().remove(0);

        assert_eq!(raw_trace.len(), 5000);
        assert_eq!(filtered_trace.len(), 5000);

        let mean = |trace: &[f64]| trace.iter().sum::<f64>() / trace.len() as f64;
        let raw_mean = mean(&raw_trace[2500..]);
        let filtered_mean = mean(&filtered_trace[2500..]);
        assert!(raw_mean > 290.0, "raw DC should survive, got {raw_mean}");
        assert!(
            filtered_mean.abs() < 5.0,
            "filtered DC should be attenuated, got {filtered_mean}"
        );
        cleanup(&out_dir);
    }

    #[test]
    fn full_chunks_reach_disk_before_session_ends() {
        // 2500 frames at a 1000-frame chunk size: two full records must be
        // on disk while the session is still recording, bounding what an
        // abrupt termination could lose to one chunk.
        let config = test_config("crash_bound", 1000);
        let out_dir = config.output_dir.clone();
        let mut controller = SessionController::new(config);

        let frames: Vec<Vec<f64>> = (0..2500).map(|i| vec![(i % 400) as f64 - 200.0]).collect();
        controller
            .start_with_source(
                "S07",
                Box::new(ScriptedSource::from_frames(frames)),
                RecordTarget::Samples(100_000),
            )
            .unwrap();
        let status = wait_for(&controller, |s| s.samples_collected == 2500);

        let mut raw = EdfReader::open(status.raw_path.as_ref().unwrap()).unwrap();
        assert_eq!(raw.samples_per_channel(), 2000);

        controller.stop().unwrap();
        let status = wait_terminal(&controller);
        assert_eq!(status.state, SessionState::Complete, "{:?}", status.message);
        let mut raw = EdfReader::open(status.raw_path.as_ref().unwrap()).unwrap();
        assert_eq!(raw.samples_per_channel(), 2500);
        cleanup(&out_dir);
    }

    #[test]
    fn header_fields_round_trip_through_a_session() {
        let config = test_config("header_trip", 200);
        let out_dir = config.output_dir.clone();
        let bit_depth = config.bit_depth;
        let mut controller = SessionController::new(config);
        let source = ScriptedSource::from_frames(vec![vec![10.0]; 50]);
        controller
            .start_with_source("S08", Box::new(source), RecordTarget::Samples(50))
            .unwrap();
        let status = wait_terminal(&controller);
        assert_eq!(status.state, SessionState::Complete, "{:?}", status.message);

        let raw = EdfReader::open(status.raw_path.as_ref().unwrap()).unwrap();
        let channel = &raw.channels()[0];
        let (physical_min, physical_max) = bit_depth.physical_range();
        let (digital_min, digital_max) = bit_depth.digital_range();
        assert_eq!(raw.sample_frequency(), 200);
        assert_eq!(channel.physical_min, physical_min);
        assert_eq!(channel.physical_max, physical_max);
        assert_eq!(channel.digital_min, digital_min);
        assert_eq!(channel.digital_max, digital_max);
        assert_eq!(channel.prefilter, "None");

        let filtered = EdfReader::open(status.filtered_path.as_ref().unwrap()).unwrap();
        assert!(filtered.channels()[0].prefilter.starts_with("BP:"));
        cleanup(&out_dir);
    }

    #[test]
    fn duration_target_resolves_to_sample_count() {
        assert_eq!(
            RecordTarget::Duration(Duration::from_secs(30)).samples(1000),
            30_000
        );
        assert_eq!(RecordTarget::Samples(1234).samples(1000), 1234);
    }

    #[test]
    fn causal_mode_exposes_live_output() {
        let mut config = test_config("causal_live", 100);
        config.filter_mode = FilterMode::Causal;
        let out_dir = config.output_dir.clone();
        let mut controller = SessionController::new(config);
        let source = ScriptedSource::from_frames(vec![vec![100.0]; 30]);
        controller
            .start_with_source("S09", Box::new(source), RecordTarget::Samples(30))
            .unwrap();
        let status = wait_terminal(&controller);
        assert_eq!(status.state, SessionState::Complete, "{:?}", status.message);
        assert!(controller.live_filtered().is_some());
        cleanup(&out_dir);
    }
}
