use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Append-only JSONL log of what each action did.
///
/// - default fields are `type`, `action_id`, `ts`
/// - caller payload is merged last and can override defaults
/// - one compact JSON object per line
/// - a writer built with [`EventWriter::disabled`] drops every event, so an
///   action never touches the filesystem unless a log path was configured
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Option<Arc<EventWriterInner>>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Some(Arc::new(EventWriterInner {
                path: path.into(),
                lock: Mutex::new(()),
            })),
        }
    }

    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn from_optional(path: Option<PathBuf>) -> Self {
        path.map(Self::new).unwrap_or_else(Self::disabled)
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.as_ref().map(|inner| inner.path.as_path())
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub fn emit(
        &self,
        event_type: &str,
        action_id: &str,
        payload: EventPayload,
    ) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "action_id".to_string(),
            Value::String(action_id.to_string()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            event.insert(key, value);
        }

        let Some(inner) = &self.inner else {
            return Ok(Value::Object(event));
        };

        if let Some(parent) = inner.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let line = serde_json::to_string(&event)?;
        let _guard = inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(event))
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;

    use super::*;

    #[test]
    fn emit_writes_compact_jsonl_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("logs").join("events.jsonl");
        let writer = EventWriter::new(&path);

        let mut payload = EventPayload::new();
        payload.insert("num_images".to_string(), Value::from(4));
        let emitted = writer.emit("request_built", "action-1", payload)?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        let parsed: Value = serde_json::from_str(line)?;

        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], Value::String("request_built".to_string()));
        assert_eq!(parsed["action_id"], Value::String("action-1".to_string()));
        assert_eq!(parsed["num_images"], Value::from(4));

        let ts = parsed["ts"].as_str().unwrap_or("");
        DateTime::parse_from_rfc3339(ts)?;
        Ok(())
    }

    #[test]
    fn emit_appends_lines() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path);

        writer.emit("action_started", "a", EventPayload::new())?;
        writer.emit("results_written", "a", EventPayload::new())?;

        let content = fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(lines[0])?;
        let second: Value = serde_json::from_str(lines[1])?;
        assert_eq!(first["type"], Value::String("action_started".to_string()));
        assert_eq!(second["type"], Value::String("results_written".to_string()));
        Ok(())
    }

    #[test]
    fn disabled_writer_returns_event_without_writing() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::from_optional(None);
        assert!(!writer.is_enabled());

        let emitted = writer.emit("action_started", "a", EventPayload::new())?;
        assert_eq!(emitted["type"], Value::String("action_started".to_string()));
        assert_eq!(fs::read_dir(temp.path())?.count(), 0);
        Ok(())
    }
}
