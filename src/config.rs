use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DaqError, Result};

/// ADC generation of the attached sensor board.
///
/// The legacy boards report raw 10-bit counts; newer ones send calibrated
/// microvolts mapped onto the full signed 16-bit range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitDepth {
    Ten,
    Sixteen,
}

impl BitDepth {
    pub fn physical_range(self) -> (f64, f64) {
        match self {
            BitDepth::Ten => (0.0, 1023.0),
            BitDepth::Sixteen => (-5000.0, 5000.0),
        }
    }

    pub fn digital_range(self) -> (i32, i32) {
        match self {
            BitDepth::Ten => (0, 1023),
            BitDepth::Sixteen => (-32768, 32767),
        }
    }
}

/// When the band-pass runs: over the whole trace after acquisition, or
/// per-sample while samples arrive (for live display consumers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterMode {
    Batch,
    Causal,
}

/// One configuration structure for the whole pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaqConfig {
    pub port: String,
    pub baud_rate: u32,
    pub sample_rate: u32,
    pub bit_depth: BitDepth,
    pub channel_count: usize,
    pub filter_low_hz: f64,
    pub filter_high_hz: f64,
    pub filter_order: usize,
    pub filter_mode: FilterMode,
    /// Serial read timeout; also the worst-case stop latency.
    pub read_timeout_ms: u64,
    /// |amplitude| at or above this counts as muscle activity.
    pub activity_threshold_uv: f64,
    pub output_dir: PathBuf,
}

impl Default for DaqConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            sample_rate: 1000,
            bit_depth: BitDepth::Sixteen,
            channel_count: 1,
            filter_low_hz: 20.0,
            filter_high_hz: 450.0,
            filter_order: 4,
            filter_mode: FilterMode::Batch,
            read_timeout_ms: 20,
            activity_threshold_uv: 200.0,
            output_dir: PathBuf::from("recordings"),
        }
    }
}

impl DaqConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        let config: DaqConfig = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| DaqError::InvalidConfig(format!("{}: {e}", path.as_ref().display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(DaqError::InvalidConfig("sample_rate must be positive".into()));
        }
        if self.baud_rate == 0 {
            return Err(DaqError::InvalidConfig("baud_rate must be positive".into()));
        }
        if self.channel_count == 0 {
            return Err(DaqError::InvalidConfig("channel_count must be at least 1".into()));
        }
        if self.read_timeout_ms == 0 {
            return Err(DaqError::InvalidConfig("read_timeout_ms must be positive".into()));
        }
        if self.filter_order == 0 || self.filter_order % 2 != 0 {
            return Err(DaqError::InvalidConfig(format!(
                "filter_order must be a positive even number, got {}",
                self.filter_order
            )));
        }
        let nyquist = self.sample_rate as f64 / 2.0;
        if self.filter_low_hz <= 0.0
            || self.filter_low_hz >= self.filter_high_hz
            || self.filter_high_hz >= nyquist
        {
            return Err(DaqError::InvalidFilterConfig {
                low_hz: self.filter_low_hz,
                high_hz: self.filter_high_hz,
                sample_rate: self.sample_rate as f64,
            });
        }
        Ok(())
    }

    pub fn nyquist_hz(&self) -> f64 {
        self.sample_rate as f64 / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        DaqConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_misordered_band() {
        let mut config = DaqConfig::default();
        config.filter_low_hz = 450.0;
        config.filter_high_hz = 20.0;
        assert!(matches!(
            config.validate(),
            Err(DaqError::InvalidFilterConfig { .. })
        ));
    }

    #[test]
    fn rejects_band_above_nyquist() {
        let mut config = DaqConfig::default();
        config.filter_high_hz = 500.0; // Nyquist at 1 kHz
        assert!(matches!(
            config.validate(),
            Err(DaqError::InvalidFilterConfig { .. })
        ));
    }

    #[test]
    fn rejects_odd_filter_order() {
        let mut config = DaqConfig::default();
        config.filter_order = 3;
        assert!(matches!(config.validate(), Err(DaqError::InvalidConfig(_))));
    }

    #[test]
    fn json_round_trip() {
        let config = DaqConfig::default();
        let text = serde_json::to_string(&config).unwrap();
        let back: DaqConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.sample_rate, config.sample_rate);
        assert_eq!(back.bit_depth, config.bit_depth);
        assert_eq!(back.filter_mode, config.filter_mode);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: DaqConfig = serde_json::from_str(r#"{"port":"COM9","baud_rate":96000}"#).unwrap();
        assert_eq!(config.port, "COM9");
        assert_eq!(config.baud_rate, 96_000);
        assert_eq!(config.sample_rate, 1000);
        config.validate().unwrap();
    }
}
