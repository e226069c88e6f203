//! Timestamp-named record files: writing new recordings and listing them for playback.

use super::codec::{encode_message, encode_response};
use crate::error::{Result, SimulatorError};
use crate::http::Response;
use crate::metrics;
use crate::ws::Message;
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Extension of files written by [`RecordDir`].
pub const RECORD_EXTENSION: &str = "yaml";

/// Fixed-width RFC3339 timestamp (nanoseconds, `Z` suffix), so that file names
/// sort lexicographically in chronological order.
pub fn record_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parses `<RFC3339 timestamp>.<ext>`.
pub fn parse_record_name(file_name: &str) -> Option<DateTime<FixedOffset>> {
    let (stem, _extension) = file_name.rsplit_once('.')?;
    DateTime::parse_from_rfc3339(stem).ok()
}

/// A record file and the timestamp parsed from its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFile {
    pub timestamp: DateTime<FixedOffset>,
    pub path: PathBuf,
}

/// Lists validly named record files in `dir`, ordered by timestamp.
///
/// Directories and files whose names don't parse are skipped.
pub async fn list_record_files(dir: &Path) -> Result<Vec<RecordFile>> {
    let read_error = |source| SimulatorError::FileRead {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(read_error)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_error)? {
        if !entry.file_type().await.map_err(read_error)?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(timestamp) = name.to_str().and_then(parse_record_name) else {
            continue;
        };
        files.push(RecordFile {
            timestamp,
            path: entry.path(),
        });
    }

    files.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    Ok(files)
}

/// Directory receiving one new file per recorded response or message.
#[derive(Debug, Clone)]
pub struct RecordDir {
    dir: PathBuf,
}

impl RecordDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    async fn create_record(&self, contents: &str) -> Result<PathBuf> {
        self.create_record_at(Utc::now(), contents).await
    }

    /// Writes `contents` to a new file named after `time`. A taken name is never
    /// overwritten; the next free nanosecond is used instead.
    async fn create_record_at(&self, mut time: DateTime<Utc>, contents: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| SimulatorError::RecordWrite {
                path: self.dir.clone(),
                source,
            })?;

        loop {
            let path = self
                .dir
                .join(format!("{}.{}", record_timestamp(time), RECORD_EXTENSION));
            let write_error = |source| SimulatorError::RecordWrite {
                path: path.clone(),
                source,
            };
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(contents.as_bytes()).await.map_err(write_error)?;
                    file.flush().await.map_err(write_error)?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    time = std::cmp::max(Utc::now(), time + chrono::Duration::nanoseconds(1));
                }
                Err(e) => return Err(write_error(e)),
            }
        }
    }

    pub async fn record_response(&self, response: &Response) -> Result<PathBuf> {
        let path = self.create_record(&encode_response(response)?).await?;
        metrics::record_file_written("http");
        info!(path = %path.display(), "HTTP response recorded");
        Ok(path)
    }

    pub async fn record_message(&self, message: &Message) -> Result<PathBuf> {
        let path = self.create_record(&encode_message(message)?).await?;
        metrics::record_file_written("ws");
        info!(path = %path.display(), "WebSocket message recorded");
        Ok(path)
    }
}
