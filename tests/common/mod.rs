//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use devpool::config::RunConfig;
use devpool::device::DeviceBinding;
use devpool::model::{Outcome, Processed, WorkItem};
use devpool::sink::ResultSink;
use devpool::{BoxError, Processor, ProcessorFactory};

/// Keeps everything it is given.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub logged: Vec<Outcome>,
    pub summaries: usize,
    pub flushes: usize,
}

impl MemorySink {
    pub fn labels(&self) -> Vec<String> {
        self.logged
            .iter()
            .map(|o| o.label.as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn seqs(&self) -> Vec<u64> {
        self.logged.iter().map(|o| o.seq).collect()
    }
}

impl ResultSink for MemorySink {
    fn log_result(&mut self, outcome: &Outcome) -> devpool::Result<()> {
        self.logged.push(outcome.clone());
        Ok(())
    }

    fn log_summary(&mut self) -> devpool::Result<()> {
        self.summaries += 1;
        Ok(())
    }

    fn flush(&mut self) -> devpool::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

/// Decides each item's fate from its string label.
#[derive(Debug, Clone, Default)]
pub struct LabelFactory {
    pub skip: Vec<String>,
    pub fail: Vec<String>,
    pub panic: Vec<String>,
    pub fail_setup: bool,
    /// Device handles seen by `build`, in call order.
    pub bindings: Arc<Mutex<Vec<DeviceBinding>>>,
}

impl LabelFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skipping(mut self, labels: &[&str]) -> Self {
        self.skip.extend(labels.iter().map(|s| s.to_string()));
        self
    }

    pub fn failing(mut self, labels: &[&str]) -> Self {
        self.fail.extend(labels.iter().map(|s| s.to_string()));
        self
    }

    pub fn panicking(mut self, labels: &[&str]) -> Self {
        self.panic.extend(labels.iter().map(|s| s.to_string()));
        self
    }

    pub fn failing_setup(mut self) -> Self {
        self.fail_setup = true;
        self
    }
}

pub struct LabelProcessor {
    factory: LabelFactory,
}

impl ProcessorFactory for LabelFactory {
    type Processor = LabelProcessor;

    fn build(&self, binding: &DeviceBinding, _config: &RunConfig) -> Result<LabelProcessor, BoxError> {
        self.bindings.lock().unwrap().push(binding.clone());
        if self.fail_setup {
            return Err(format!("device {} unavailable", binding.device()).into());
        }
        Ok(LabelProcessor {
            factory: self.clone(),
        })
    }
}

impl Processor for LabelProcessor {
    fn process(&mut self, item: &WorkItem) -> Result<Processed, BoxError> {
        let label = item.label.as_str().unwrap_or_default().to_string();
        if self.factory.panic.contains(&label) {
            panic!("boom on {label}");
        }
        if self.factory.fail.contains(&label) {
            return Err(format!("cannot process {label}").into());
        }
        if self.factory.skip.contains(&label) {
            return Ok(Processed::skipped(item.content.clone()));
        }
        Ok(Processed::counted(item.content.clone()))
    }
}

/// Skips every item whose sequence number is a multiple of `every`.
#[derive(Debug, Clone)]
pub struct ModuloFactory {
    pub every: u64,
}

impl ProcessorFactory for ModuloFactory {
    type Processor = ModuloProcessor;

    fn build(&self, _binding: &DeviceBinding, _config: &RunConfig) -> Result<ModuloProcessor, BoxError> {
        Ok(ModuloProcessor { every: self.every })
    }
}

pub struct ModuloProcessor {
    every: u64,
}

impl Processor for ModuloProcessor {
    fn process(&mut self, item: &WorkItem) -> Result<Processed, BoxError> {
        std::thread::yield_now();
        if item.seq % self.every == 0 {
            Ok(Processed::skipped(serde_json::Value::Null))
        } else {
            Ok(Processed::counted(item.seq))
        }
    }
}

pub fn labels(labels: &[&str]) -> std::vec::IntoIter<(String, String)> {
    labels
        .iter()
        .map(|l| (l.to_string(), format!("text {l}")))
        .collect::<Vec<_>>()
        .into_iter()
}
