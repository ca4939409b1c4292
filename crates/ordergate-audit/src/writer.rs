//! JSON Lines audit writer.
//!
//! One file per UTC day (`audit_YYYY-MM-DD.jsonl`), opened in append mode.
//! Each record is a complete JSON object on its own line and is flushed
//! before `record` returns, so an interrupted process loses at most the
//! line being written.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::AuditResult;
use crate::event::AuditEvent;
use crate::sink::AuditSink;

/// Active writer state for the current daily file.
struct ActiveWriter {
    writer: BufWriter<File>,
    date: String,
    records_written: usize,
}

/// Append-only daily JSON Lines sink.
pub struct JsonLinesAuditSink {
    base_dir: PathBuf,
    active: Mutex<Option<ActiveWriter>>,
}

impl JsonLinesAuditSink {
    /// Create the sink, creating `base_dir` when missing.
    pub fn new(base_dir: impl AsRef<Path>) -> AuditResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            active: Mutex::new(None),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of the file holding events dated `date` (`YYYY-MM-DD`).
    pub fn file_for(&self, date: &str) -> PathBuf {
        self.base_dir.join(format!("audit_{date}.jsonl"))
    }

    fn open(&self, date: &str) -> AuditResult<ActiveWriter> {
        let path = self.file_for(date);
        info!(path = %path.display(), "Opening audit log (append mode)");
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(ActiveWriter {
            writer: BufWriter::new(file),
            date: date.to_string(),
            records_written: 0,
        })
    }

    fn close(active: &mut ActiveWriter) {
        if let Err(e) = active.writer.flush() {
            warn!(?e, "Failed to flush audit log on close");
        }
        info!(
            date = %active.date,
            records = active.records_written,
            "Closed audit log"
        );
    }
}

impl AuditSink for JsonLinesAuditSink {
    fn record(&self, event: &AuditEvent) -> AuditResult<()> {
        let line = serde_json::to_string(event)?;
        let date = event.timestamp.format("%Y-%m-%d").to_string();

        let mut guard = self.active.lock();
        let active = match guard.take() {
            Some(active) if active.date == date => guard.insert(active),
            previous => {
                if let Some(mut old) = previous {
                    Self::close(&mut old);
                }
                guard.insert(self.open(&date)?)
            }
        };

        writeln!(active.writer, "{line}")?;
        active.writer.flush()?;
        active.records_written += 1;

        debug!(
            batch_id = %event.batch_id,
            stage = %event.stage,
            "Audit event written"
        );
        Ok(())
    }
}

impl Drop for JsonLinesAuditSink {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().as_mut() {
            Self::close(active);
        }
    }
}
