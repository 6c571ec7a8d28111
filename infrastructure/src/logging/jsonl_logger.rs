//! JSONL transcript of everything crossing the worker's pipes.
//!
//! Each [`TrafficEvent`] becomes one line: the payload's fields plus
//! `type`, `seq` and an RFC 3339 `timestamp`.

use omip_application::{TrafficEvent, TrafficLogger};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

struct Sink {
    writer: BufWriter<File>,
    seq: u64,
}

/// Append-only JSONL traffic logger.
///
/// Successive runs append to the same file; `seq` restarts at 0 per logger.
pub struct JsonlTrafficLogger {
    sink: Mutex<Sink>,
    path: PathBuf,
}

impl JsonlTrafficLogger {
    /// Open (or create) the transcript at `path`, creating parent
    /// directories. Returns `None` and warns if that fails.
    pub fn new(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            warn!(
                "Could not create traffic log directory {}: {}",
                parent.display(),
                e
            );
            return None;
        }

        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => f,
            Err(e) => {
                warn!("Could not open traffic log {}: {}", path.display(), e);
                return None;
            }
        };

        Some(Self {
            sink: Mutex::new(Sink {
                writer: BufWriter::new(file),
                seq: 0,
            }),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TrafficLogger for JsonlTrafficLogger {
    fn log(&self, event: TrafficEvent) {
        let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let mut sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        let seq = sink.seq;
        sink.seq += 1;

        let mut record = match event.payload {
            serde_json::Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        record.insert("type".to_string(), event.event_type.into());
        record.insert("seq".to_string(), seq.into());
        record.insert("timestamp".to_string(), timestamp.into());

        let Ok(line) = serde_json::to_string(&record) else {
            return;
        };
        // Flush every record so a crashed session still leaves a transcript.
        if writeln!(sink.writer, "{}", line)
            .and_then(|_| sink.writer.flush())
            .is_err()
        {
            warn!("Failed to write traffic log {}", self.path.display());
        }
    }
}

impl Drop for JsonlTrafficLogger {
    fn drop(&mut self) {
        if let Ok(mut sink) = self.sink.lock() {
            let _ = sink.writer.flush();
        }
    }
}
