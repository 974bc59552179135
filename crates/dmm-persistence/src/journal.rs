//! Settlement journal.
//!
//! Append-only JSON Lines log (`settlements_YYYY-MM-DD.jsonl`), one record
//! per settlement or replenishment outcome. Records are flushed as they are
//! written; the journal is an operator audit trail and is never replayed.

use crate::error::PersistenceResult;
use chrono::Utc;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Writer for the current day's file.
struct ActiveFile {
    writer: BufWriter<File>,
    date: String,
    records_written: usize,
}

pub struct SettlementJournal {
    base_dir: PathBuf,
    active: Option<ActiveFile>,
}

impl SettlementJournal {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        let base_dir = base_dir.as_ref().to_path_buf();
        if let Err(e) = std::fs::create_dir_all(&base_dir) {
            warn!(?e, dir = %base_dir.display(), "Failed to create journal directory");
        }

        Self {
            base_dir,
            active: None,
        }
    }

    /// Append one record as a JSON line and flush it.
    pub fn append<R: Serialize>(&mut self, record: &R) -> PersistenceResult<()> {
        let line = serde_json::to_string(record)?;
        let today = Utc::now().format("%Y-%m-%d").to_string();

        if self.active.as_ref().is_some_and(|a| a.date != today) {
            self.close();
        }

        let active = match self.active.take() {
            Some(active) => active,
            None => self.open(&today)?,
        };
        let active = self.active.insert(active);

        writeln!(active.writer, "{line}")?;
        active.writer.flush()?;
        active.records_written += 1;

        debug!(date = %active.date, "Journaled settlement record");
        Ok(())
    }

    fn open(&self, date: &str) -> PersistenceResult<ActiveFile> {
        let path = self.base_dir.join(format!("settlements_{date}.jsonl"));
        info!(path = %path.display(), "Opening settlement journal (append mode)");

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(ActiveFile {
            writer: BufWriter::new(file),
            date: date.to_string(),
            records_written: 0,
        })
    }

    fn close(&mut self) {
        if let Some(mut active) = self.active.take() {
            if let Err(e) = active.writer.flush() {
                warn!(?e, "Failed to flush journal on close");
            }
            info!(
                date = %active.date,
                records = active.records_written,
                "Closed settlement journal"
            );
        }
    }
}

impl Drop for SettlementJournal {
    fn drop(&mut self) {
        self.close();
    }
}
