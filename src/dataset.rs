//! Dataset sources.
//!
//! A source yields labeled items one at a time and returns `Ok(None)` once
//! it has nothing left. What to do about exhaustion is the coordinator's
//! decision, not the source's.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::WorkItem;

pub trait DatasetSource {
    fn next_item(&mut self) -> Result<Option<WorkItem>>;
}

/// One JSONL record: `{"label": .., "content": ..}` (`text` is accepted for
/// `content`).
#[derive(Debug, Deserialize)]
struct Record {
    label: serde_json::Value,
    #[serde(alias = "text")]
    content: serde_json::Value,
}

/// Streams items from a JSONL file, skipping the first `offset` records.
pub struct JsonlDataset {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
    next_seq: u64,
    offset: u64,
}

impl JsonlDataset {
    pub fn open(path: impl AsRef<Path>, offset: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .map_err(|e| Error::Dataset(format!("cannot open {}: {e}", path.display())))?;
        Ok(Self {
            path,
            lines: BufReader::new(file).lines(),
            line_no: 0,
            next_seq: 0,
            offset,
        })
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        for line in self.lines.by_ref() {
            self.line_no += 1;
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|e| {
                Error::Dataset(format!(
                    "invalid record at {}:{}: {e}",
                    self.path.display(),
                    self.line_no
                ))
            })?;
            return Ok(Some(record));
        }
        Ok(None)
    }
}

impl DatasetSource for JsonlDataset {
    fn next_item(&mut self) -> Result<Option<WorkItem>> {
        // Skipped records are still parsed so a bad line is reported.
        while self.next_seq < self.offset {
            if self.next_record()?.is_none() {
                return Ok(None);
            }
            self.next_seq += 1;
        }

        let Some(record) = self.next_record()? else {
            return Ok(None);
        };
        let item = WorkItem {
            seq: self.next_seq,
            label: record.label,
            content: record.content,
        };
        self.next_seq += 1;
        Ok(Some(item))
    }
}

/// Wraps an in-memory iterator of `(label, content)` pairs.
pub struct IterSource<I> {
    iter: I,
    next_seq: u64,
}

impl<I> IterSource<I> {
    pub fn new(iter: I) -> Self {
        Self { iter, next_seq: 0 }
    }
}

impl<I, L, C> DatasetSource for IterSource<I>
where
    I: Iterator<Item = (L, C)>,
    L: Into<serde_json::Value>,
    C: Into<serde_json::Value>,
{
    fn next_item(&mut self) -> Result<Option<WorkItem>> {
        Ok(self.iter.next().map(|(label, content)| {
            let item = WorkItem::new(self.next_seq, label, content);
            self.next_seq += 1;
            item
        }))
    }
}
