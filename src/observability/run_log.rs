use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::events::{EventKind, EventSink, PipelineEvent, Severity};

/// One line of pipeline run history.
///
/// Serialized as `<rfc3339> <SEVERITY> <marker> <message>`, which is both
/// readable in a terminal and parseable back into the same value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub at: DateTime<Utc>,
    pub severity: Severity,
    pub kind: EventKind,
    pub message: String,
}

impl RunLogEntry {
    pub fn from_event(event: &PipelineEvent, at: DateTime<Utc>) -> Self {
        Self {
            at,
            severity: event.severity(),
            kind: event.kind(),
            message: event.message(),
        }
    }
}

impl fmt::Display for RunLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.at.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.severity,
            self.kind,
        )?;
        if !self.message.is_empty() {
            write!(f, " {}", self.message)?;
        }
        Ok(())
    }
}

impl FromStr for RunLogEntry {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.trim_end().splitn(4, ' ');

        let at = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or("empty line")?;
        let at = DateTime::parse_from_rfc3339(at)
            .map_err(|e| format!("bad timestamp: {e}"))?
            .with_timezone(&Utc);
        let severity = parts.next().ok_or("missing severity")?.parse()?;
        let kind = parts.next().ok_or("missing marker")?.parse()?;
        let message = parts.next().unwrap_or_default().to_string();

        Ok(Self {
            at,
            severity,
            kind,
            message,
        })
    }
}

/// A source of run history the health monitor can scan.
pub trait RunLog: EventSink {
    fn entries(&self) -> anyhow::Result<Vec<RunLogEntry>>;
}

// ---------------------------------------------------------------------------
// In-memory run log (live event stream)
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryRunLog {
    entries: Mutex<Vec<RunLogEntry>>,
}

impl MemoryRunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pre-built entry, e.g. when seeding history.
    pub fn push(&self, entry: RunLogEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }
}

impl EventSink for MemoryRunLog {
    fn record(&self, event: &PipelineEvent) {
        self.push(RunLogEntry::from_event(event, Utc::now()));
    }
}

impl RunLog for MemoryRunLog {
    fn entries(&self) -> anyhow::Result<Vec<RunLogEntry>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("run log lock poisoned"))?;
        Ok(entries.clone())
    }
}

// ---------------------------------------------------------------------------
// File-backed run log (persisted, append-only)
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct FileRunLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileRunLog {
    /// Open (or prepare to create) the log at `path`, creating parent directories.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, entry: &RunLogEntry) -> std::io::Result<()> {
        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{entry}")
    }
}

impl EventSink for FileRunLog {
    fn record(&self, event: &PipelineEvent) {
        let entry = RunLogEntry::from_event(event, Utc::now());
        if let Err(e) = self.append(&entry) {
            tracing::warn!(
                error = %e,
                path = %self.path.display(),
                "Failed to append to run log"
            );
        }
    }
}

impl RunLog for FileRunLog {
    /// Lines that do not parse (foreign or truncated) are skipped.
    fn entries(&self) -> anyhow::Result<Vec<RunLogEntry>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(content
            .lines()
            .filter_map(|line| line.parse::<RunLogEntry>().ok())
            .collect())
    }
}
