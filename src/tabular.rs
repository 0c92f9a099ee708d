use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{DaqError, Result};

/// Tabular export of a finished single-channel recording: one row per
/// sample with the elapsed time and both trace values.
pub fn write_table<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    raw: &[f64],
    filtered: &[f64],
) -> Result<()> {
    if raw.len() != filtered.len() {
        return Err(DaqError::Format(format!(
            "trace lengths differ: raw {}, filtered {}",
            raw.len(),
            filtered.len()
        )));
    }
    if sample_rate == 0 {
        return Err(DaqError::InvalidConfig("sample_rate must be positive".into()));
    }

    let path = path.as_ref();
    let map_io = |e: std::io::Error| DaqError::Write { path: path.to_path_buf(), source: e };
    let file = File::create(path).map_err(map_io)?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "elapsed_time_seconds,raw_value,filtered_value").map_err(map_io)?;
    for (i, (r, f)) in raw.iter().zip(filtered).enumerate() {
        let elapsed = i as f64 / sample_rate as f64;
        writeln!(writer, "{elapsed:.4},{r:.3},{f:.3}").map_err(map_io)?;
    }
    writer.flush().map_err(map_io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn writes_one_row_per_sample() {
        let path = std::env::temp_dir().join("myotrace_table_rows.csv");
        let raw = vec![100.0, -50.0, 25.5];
        let filtered = vec![90.0, -45.0, 20.25];
        write_table(&path, 1000, &raw, &filtered).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "elapsed_time_seconds,raw_value,filtered_value");
        assert_eq!(lines[1], "0.0000,100.000,90.000");
        assert_eq!(lines[2], "0.0010,-50.000,-45.000");
        assert_eq!(lines[3], "0.0020,25.500,20.250");
        fs::remove_file(&path).ok();
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let path = std::env::temp_dir().join("myotrace_table_mismatch.csv");
        let result = write_table(&path, 1000, &[1.0, 2.0], &[1.0]);
        assert!(matches!(result, Err(DaqError::Format(_))));
        assert!(!path.exists());
    }
}
