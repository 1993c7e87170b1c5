//! JSONL result sink.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::{Arc, Mutex};

use devpool::model::{Disposition, Outcome};
use devpool::sink::{JsonlSink, ResultSink};
use serde_json::{Value, json};

/// Console stand-in the test can read back.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn outcome(seq: u64, device: usize, disposition: Disposition, duration_ms: u64) -> Outcome {
    Outcome {
        seq,
        label: json!(1),
        device,
        disposition,
        payload: json!({"seq": seq}),
        duration_ms,
    }
}

fn temp_output() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("devpool-results-{}.jsonl", uuid::Uuid::new_v4()))
}

#[test]
fn results_and_summary_go_to_file() {
    let path = temp_output();
    let console = SharedBuf::default();
    let file = BufWriter::new(File::create(&path).unwrap());
    let mut sink = JsonlSink::with_console(Some(file), true, console.clone());

    sink.log_result(&outcome(0, 0, Disposition::Counted, 10)).unwrap();
    sink.log_result(&outcome(3, 1, Disposition::Skipped, 30)).unwrap();
    sink.log_summary().unwrap();
    sink.flush().unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<Value> = content
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["seq"], 0);
    assert_eq!(lines[1]["disposition"], "skipped");
    assert_eq!(lines[2]["summary"]["logged"], 2);
    assert_eq!(lines[2]["summary"]["counted"], 1);
    assert_eq!(lines[2]["summary"]["skipped"], 1);

    // Quiet: no per-item echo, but the summary is printed.
    let printed = console.contents();
    assert!(!printed.contains("\"seq\""));
    assert!(printed.contains("Summary"));
    assert!(printed.contains("Mean duration:"));
    let _ = std::fs::remove_file(path);
}

#[test]
fn results_are_echoed_unless_quiet() {
    let console = SharedBuf::default();
    let mut sink = JsonlSink::with_console(None, false, console.clone());

    sink.log_result(&outcome(7, 0, Disposition::Counted, 5)).unwrap();
    sink.flush().unwrap();

    let printed = console.contents();
    let echoed: Value = serde_json::from_str(printed.trim()).unwrap();
    assert_eq!(echoed["seq"], 7);
}

#[test]
fn tally_tracks_devices_and_durations() {
    let mut sink = JsonlSink::with_console(None, true, std::io::sink());
    sink.log_result(&outcome(0, 0, Disposition::Counted, 10)).unwrap();
    sink.log_result(&outcome(1, 1, Disposition::Counted, 20)).unwrap();
    sink.log_result(&outcome(2, 1, Disposition::Counted, 30)).unwrap();

    let tally = sink.tally();
    assert_eq!(tally.logged, 3);
    assert_eq!(tally.per_device.get(&0), Some(&1));
    assert_eq!(tally.per_device.get(&1), Some(&2));
    assert_eq!(tally.mean_duration_ms(), 20.0);
}

#[test]
fn create_writes_to_the_given_path() {
    let path = temp_output();
    let mut sink = JsonlSink::create(Some(path.as_path()), true).unwrap();
    sink.log_result(&outcome(0, 0, Disposition::Counted, 1)).unwrap();
    sink.flush().unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 1);
    let _ = std::fs::remove_file(path);
}
