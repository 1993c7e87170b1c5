//! Command hook processor.
//!
//! Each worker starts the configured command once and keeps it running for
//! the whole run, so whatever the hook loads at startup (a model, say) is
//! loaded once per device. The worker talks to it over line-delimited JSON:
//!
//! ```text
//! -> {"seq":0,"label":1,"content":"the movie was great"}
//! <- {"disposition":"counted","payload":{"perturbed":"the film was great"}}
//! <- {"disposition":"skipped"}
//! <- {"error":"model rejected input"}
//! ```
//!
//! The child runs with the worker's device binding in its environment,
//! plus `DEVPOOL_PARAMS` holding the configured processor params. Its
//! stderr is inherited.
//!
//! Hooks should pick their device from `DEVPOOL_DEVICE`. The visible-devices
//! variable is only set when the parent did not set it, so under an
//! inherited `CUDA_VISIBLE_DEVICES=0,1` every hook sees both GPUs and
//! `DEVPOOL_DEVICE` is what tells them apart.
//!
//! Closing stdin asks the hook to exit. A hook still running after the
//! configured grace period is killed.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::RunConfig;
use crate::device::DeviceBinding;
use crate::error::{BoxError, Error};
use crate::model::{Disposition, Processed, WorkItem};
use crate::worker::{Processor, ProcessorFactory};

pub const PARAMS_VAR: &str = "DEVPOOL_PARAMS";

/// Builds a [`CommandProcessor`] from the run's `[processor]` table.
#[derive(Debug, Clone, Default)]
pub struct CommandFactory;

impl ProcessorFactory for CommandFactory {
    type Processor = CommandProcessor;

    fn build(
        &self,
        binding: &DeviceBinding,
        config: &RunConfig,
    ) -> Result<CommandProcessor, BoxError> {
        let (program, args) = config
            .processor
            .command
            .split_first()
            .ok_or_else(|| Error::Config("processor command is empty".to_string()))?;
        let params = serde_json::to_string(&config.processor.params)?;
        let processor = CommandProcessor::spawn(program, args, binding, &params)?;
        Ok(processor.with_shutdown_grace(Duration::from_millis(
            config.processor.shutdown_grace_ms,
        )))
    }
}

#[derive(Serialize)]
struct Request<'a> {
    seq: u64,
    label: &'a serde_json::Value,
    content: &'a serde_json::Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Reply {
    Error {
        error: String,
    },
    Processed {
        disposition: Disposition,
        #[serde(default)]
        payload: serde_json::Value,
    },
}

/// One long-lived child process speaking the hook protocol.
pub struct CommandProcessor {
    device: usize,
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    stdout: BufReader<ChildStdout>,
    line: String,
    grace: Duration,
}

const DEFAULT_GRACE: Duration = Duration::from_secs(5);

impl CommandProcessor {
    pub fn spawn(
        program: &str,
        args: &[String],
        binding: &DeviceBinding,
        params: &str,
    ) -> Result<Self, Error> {
        // Resolve relative paths against the process CWD so "./hook.sh"
        // means the same thing for every worker.
        let program = PathBuf::from(program);
        let program = if program.components().count() > 1 && program.is_relative() {
            std::env::current_dir()?.join(program)
        } else {
            program
        };

        debug!(
            device = binding.device(),
            command = %program.display(),
            "starting hook"
        );

        let mut child = Command::new(&program)
            .args(args)
            .envs(binding.env())
            .env(PARAMS_VAR, params)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                Error::Other(format!("failed to start hook {}: {e}", program.display()))
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::Other("hook stdio was not piped".to_string()));
        };

        Ok(Self {
            device: binding.device(),
            child,
            stdin: Some(BufWriter::new(stdin)),
            stdout: BufReader::new(stdout),
            line: String::new(),
            grace: DEFAULT_GRACE,
        })
    }

    /// How long [`Drop`] waits for the hook to exit before killing it.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Close stdin and reap the child, killing it once the grace period
    /// runs out.
    fn stop(&mut self) -> std::io::Result<ExitStatus> {
        drop(self.stdin.take());
        let deadline = Instant::now() + self.grace;
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                warn!(
                    device = self.device,
                    grace_ms = self.grace.as_millis() as u64,
                    "hook did not exit after stdin closed, killing"
                );
                let _ = self.child.kill();
                return self.child.wait();
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    fn round_trip(&mut self, item: &WorkItem) -> Result<Processed, Error> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::Other("hook stdin already closed".to_string()))?;
        serde_json::to_writer(
            &mut *stdin,
            &Request {
                seq: item.seq,
                label: &item.label,
                content: &item.content,
            },
        )?;
        stdin.write_all(b"\n")?;
        stdin.flush()?;

        self.line.clear();
        if self.stdout.read_line(&mut self.line)? == 0 {
            let status = self
                .child
                .try_wait()?
                .map(|s| s.to_string())
                .unwrap_or_else(|| "still running".to_string());
            return Err(Error::Other(format!(
                "hook closed stdout before replying to item {} ({status})",
                item.seq
            )));
        }

        match serde_json::from_str(self.line.trim_end())? {
            Reply::Processed {
                disposition,
                payload,
            } => Ok(Processed {
                disposition,
                payload,
            }),
            Reply::Error { error } => Err(Error::Other(format!(
                "hook failed on item {}: {error}",
                item.seq
            ))),
        }
    }
}

impl Processor for CommandProcessor {
    fn process(&mut self, item: &WorkItem) -> Result<Processed, BoxError> {
        Ok(self.round_trip(item)?)
    }
}

impl Drop for CommandProcessor {
    fn drop(&mut self) {
        match self.stop() {
            Ok(status) if !status.success() => {
                warn!(device = self.device, %status, "hook exited unsuccessfully");
            }
            Ok(_) => debug!(device = self.device, "hook exited"),
            Err(e) => warn!(device = self.device, error = %e, "failed to reap hook"),
        }
    }
}
