use std::fs::File;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::Error;
use crate::record::{EmailRecord, CSV_HEADER};
use crate::types::{MessageDetail, MessageSummary};

/// Writes fetched messages to a comma-separated file, replacing any previous run's output.
pub struct RecordExporter {
    path: PathBuf,
    missing_header: String,
}

impl RecordExporter {
    pub fn new(path: impl Into<PathBuf>, missing_header: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            missing_header: missing_header.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the header row and one row per fetched message, returning the row count.
    ///
    /// Entries without a detail are skipped. A failed write leaves the rows
    /// written so far in place.
    pub fn export(
        &self,
        batch: &[(MessageSummary, Option<MessageDetail>)],
    ) -> Result<usize, Error> {
        let file = File::create(&self.path).map_err(|e| self.io_error(e))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::CRLF)
            .from_writer(file);

        writer
            .write_record(CSV_HEADER)
            .map_err(|e| self.io_error(e.into()))?;

        let mut written = 0;
        for (summary, detail) in batch {
            let Some(detail) = detail else {
                debug!("No detail for message {}, skipping row", summary.id);
                continue;
            };
            let record = EmailRecord::from_parts(summary, detail, &self.missing_header);
            if let Err(e) = writer.serialize(&record) {
                warn!(
                    "Aborting export after {} rows: writing message {} failed: {}",
                    written, summary.id, e
                );
                return Err(self.io_error(e.into()));
            }
            written += 1;
        }

        writer.flush().map_err(|e| self.io_error(e))?;
        Ok(written)
    }

    fn io_error(&self, source: std::io::Error) -> Error {
        Error::Io {
            path: self.path.clone(),
            source,
        }
    }
}
