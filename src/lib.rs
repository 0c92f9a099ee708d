//! EMG acquisition pipeline: serial samples in, EDF recordings out.
//!
//! A session reads newline-delimited samples from a wired sensor, buffers
//! them in one-second chunks, and streams them into a raw EDF file. When
//! acquisition stops the raw trace is read back, band-pass filtered
//! (20-450 Hz by default), and written to a second EDF file next to the
//! first. [`SessionController`] owns the whole lifecycle and is the only
//! surface a front end needs: `start`, `stop`, `status`.

pub mod buffer;
pub mod config;
pub mod edf;
pub mod error;
pub mod filter;
pub mod session;
pub mod source;
pub mod tabular;

pub use buffer::ChunkBuffer;
pub use config::{BitDepth, DaqConfig, FilterMode};
pub use edf::{ChannelHeader, EdfReader, EdfWriter};
pub use error::{DaqError, Result};
pub use filter::BandPass;
pub use session::{RecordTarget, SessionController, SessionState, SessionStatus};
pub use source::{probe_port, SampleSource, ScriptedSource, SerialSource, SimulatedSource};
pub use tabular::write_table;
