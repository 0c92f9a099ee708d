use std::time::Duration;

use anyhow::{Context, Result};
use log::info;

use myotrace::{
    write_table, DaqConfig, EdfReader, RecordTarget, SessionController, SessionState,
    SimulatedSource,
};

/// Usage: myotrace [config.json] [subject] [seconds] [--simulate]
///
/// Records one session and prints the resulting file paths. Any richer
/// front end (GUI, web) should drive `SessionController` itself.
fn main() -> Result<()> {
    env_logger::init();

    let mut simulate = false;
    let mut positional = Vec::new();
    for arg in std::env::args().skip(1) {
        if arg == "--simulate" {
            simulate = true;
        } else {
            positional.push(arg);
        }
    }

    let config = match positional.first() {
        Some(path) => DaqConfig::load(path).with_context(|| format!("loading {path}"))?,
        None => DaqConfig::default(),
    };
    let subject = positional.get(1).cloned().unwrap_or_else(|| "EMGTest".to_string());
    let seconds: u64 = match positional.get(2) {
        Some(text) => text.parse().context("duration must be whole seconds")?,
        None => 10,
    };

    let port = config.port.clone();
    let sample_rate = config.sample_rate;
    let channel_count = config.channel_count;
    let mut controller = SessionController::new(config);
    let target = RecordTarget::Duration(Duration::from_secs(seconds));

    let session_id = if simulate {
        info!("recording {seconds}s from the simulator");
        let source = SimulatedSource::new(sample_rate, channel_count, 0xE346);
        controller.start_with_source(&subject, Box::new(source), target)?
    } else {
        info!("recording {seconds}s from {port}");
        controller.start(&subject, &port, target)?
    };
    println!("session {session_id} recording ({subject}, {seconds}s)...");

    let status = loop {
        let status = controller.status();
        if status.state.is_terminal() {
            break status;
        }
        if status.state == SessionState::Recording {
            println!(
                "  {:>6} samples  {:>6} ms{}",
                status.samples_collected,
                status.elapsed_ms,
                if status.active { "  [active]" } else { "" }
            );
        }
        std::thread::sleep(Duration::from_millis(500));
    };

    match status.state {
        SessionState::Complete => {
            let raw_path = status.raw_path.expect("complete session has a raw path");
            let filtered_path = status
                .filtered_path
                .expect("complete session has a filtered path");
            println!("raw:      {}", raw_path.display());
            println!("filtered: {}", filtered_path.display());

            if channel_count == 1 {
                let raw = EdfReader::open(&raw_path)?.read_all()?.remove(0);
                let filtered = EdfReader::open(&filtered_path)?.read_all()?.remove(0);
                let table_path = filtered_path.with_extension("csv");
                write_table(&table_path, sample_rate, &raw, &filtered)?;
                println!("table:    {}", table_path.display());
            }
            Ok(())
        }
        _ => anyhow::bail!(
            "session ended in error: {}",
            status.message.unwrap_or_else(|| "unknown".to_string())
        ),
    }
}
