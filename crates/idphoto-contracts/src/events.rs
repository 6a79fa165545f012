use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Append-only JSONL log of one editing session.
///
/// Every line carries `type`, `session_id`, `seq` and `ts`; the caller's
/// payload is merged on top. Nothing that identifies image content beyond a
/// digest, and no password, may be put in a payload.
#[derive(Debug, Clone)]
pub struct EventWriter {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    path: PathBuf,
    session_id: String,
    sink: Mutex<Sink>,
}

#[derive(Debug, Default)]
struct Sink {
    file: Option<File>,
    next_seq: u64,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                path: path.into(),
                session_id: session_id.into(),
                sink: Mutex::new(Sink::default()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    /// Appends one event and returns the line as written.
    ///
    /// The file and its parent directory are created on the first call.
    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut sink = self
            .shared
            .sink
            .lock()
            .map_err(|_| anyhow::anyhow!("event sink poisoned"))?;

        let mut row = EventPayload::new();
        row.insert("type".into(), event_type.into());
        row.insert("session_id".into(), self.shared.session_id.as_str().into());
        row.insert("seq".into(), sink.next_seq.into());
        row.insert(
            "ts".into(),
            Utc::now()
                .to_rfc3339_opts(SecondsFormat::Millis, true)
                .into(),
        );
        for (key, value) in payload {
            row.insert(key, value);
        }
        let row = Value::Object(row);

        let mut encoded = serde_json::to_vec(&row)?;
        encoded.push(b'\n');
        if sink.file.is_none() {
            sink.file = Some(self.open()?);
        }
        if let Some(file) = sink.file.as_mut() {
            file.write_all(&encoded)
                .with_context(|| format!("failed to append to {}", self.shared.path.display()))?;
        }
        sink.next_seq += 1;

        Ok(row)
    }

    /// `type` of every event in the log, in file order.
    pub fn event_types(&self) -> anyhow::Result<Vec<String>> {
        let raw = match fs::read_to_string(&self.shared.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        Ok(raw
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|row| row["type"].as_str().map(str::to_string))
            .collect())
    }

    fn open(&self) -> anyhow::Result<File> {
        let path = &self.shared.path;
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open {}", path.display()))
    }
}
