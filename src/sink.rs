//! Result sinks.
//!
//! Only the coordinator talks to a sink, so implementations need no
//! synchronization of their own.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::{Disposition, Outcome};

pub trait ResultSink {
    /// Record one finalized outcome.
    fn log_result(&mut self, outcome: &Outcome) -> Result<()>;

    /// Emit the summary of everything logged so far.
    fn log_summary(&mut self) -> Result<()>;

    fn flush(&mut self) -> Result<()>;
}

/// Running totals over logged outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub logged: u64,
    pub counted: u64,
    pub skipped: u64,
    pub total_duration_ms: u64,
    pub per_device: BTreeMap<usize, u64>,
}

impl Tally {
    pub fn record(&mut self, outcome: &Outcome) {
        self.logged += 1;
        match outcome.disposition {
            Disposition::Counted => self.counted += 1,
            Disposition::Skipped => self.skipped += 1,
        }
        self.total_duration_ms += outcome.duration_ms;
        *self.per_device.entry(outcome.device).or_default() += 1;
    }

    pub fn mean_duration_ms(&self) -> f64 {
        if self.logged == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.logged as f64
        }
    }
}

#[derive(Serialize)]
struct SummaryLine<'a> {
    summary: &'a Tally,
}

/// Appends outcomes to a JSONL file and echoes them to a console writer.
///
/// Quiet mode silences the per-item echo. The summary always reaches the
/// console.
pub struct JsonlSink {
    file: Option<BufWriter<File>>,
    console: Box<dyn Write + Send>,
    quiet: bool,
    tally: Tally,
}

impl JsonlSink {
    /// Sink writing to `output` (created or truncated) and to stdout.
    pub fn create(output: Option<&Path>, quiet: bool) -> Result<Self> {
        let file = output
            .map(|path| {
                File::create(path).map(BufWriter::new).map_err(|e| {
                    Error::Sink(format!("cannot create {}: {e}", path.display()))
                })
            })
            .transpose()?;
        Ok(Self::with_console(file, quiet, std::io::stdout()))
    }

    pub fn with_console(
        file: Option<BufWriter<File>>,
        quiet: bool,
        console: impl Write + Send + 'static,
    ) -> Self {
        Self {
            file,
            console: Box::new(console),
            quiet,
            tally: Tally::default(),
        }
    }

    pub fn tally(&self) -> &Tally {
        &self.tally
    }
}

impl ResultSink for JsonlSink {
    fn log_result(&mut self, outcome: &Outcome) -> Result<()> {
        self.tally.record(outcome);

        let line = serde_json::to_string(outcome)?;
        if let Some(file) = self.file.as_mut() {
            writeln!(file, "{line}")?;
        }
        if !self.quiet {
            writeln!(self.console, "{line}")?;
        }
        Ok(())
    }

    fn log_summary(&mut self) -> Result<()> {
        let tally = &self.tally;
        if let Some(file) = self.file.as_mut() {
            serde_json::to_writer(&mut *file, &SummaryLine { summary: tally })?;
            writeln!(file)?;
        }

        let out = &mut self.console;
        writeln!(out)?;
        writeln!(out, "Summary")?;
        writeln!(out, "{}", "-".repeat(32))?;
        writeln!(out, "{:<20}{}", "Results logged:", tally.logged)?;
        writeln!(out, "{:<20}{}", "Counted:", tally.counted)?;
        writeln!(out, "{:<20}{}", "Skipped:", tally.skipped)?;
        writeln!(
            out,
            "{:<20}{:.1}ms",
            "Mean duration:",
            tally.mean_duration_ms()
        )?;
        for (device, count) in &tally.per_device {
            writeln!(out, "{:<20}{count}", format!("Device {device}:"))?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        self.console.flush()?;
        Ok(())
    }
}
