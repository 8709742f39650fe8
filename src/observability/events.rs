use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }

    /// WARN and ERROR entries surface as issues in the health report.
    pub fn is_issue(&self) -> bool {
        matches!(self, Severity::Warn | Severity::Error)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INFO" => Ok(Severity::Info),
            "WARN" | "WARNING" => Ok(Severity::Warn),
            "ERROR" => Ok(Severity::Error),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// EventKind: the stable marker written to the run log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CycleStarted,
    AttemptStarted,
    AttemptSucceeded,
    AttemptFailed,
    FetchExhausted,
    MarketsFiltered,
    RecordSkipped,
    CommitFailed,
    CycleSucceeded,
    CycleFailed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CycleStarted => "cycle_started",
            EventKind::AttemptStarted => "attempt_started",
            EventKind::AttemptSucceeded => "attempt_succeeded",
            EventKind::AttemptFailed => "attempt_failed",
            EventKind::FetchExhausted => "fetch_exhausted",
            EventKind::MarketsFiltered => "markets_filtered",
            EventKind::RecordSkipped => "record_skipped",
            EventKind::CommitFailed => "commit_failed",
            EventKind::CycleSucceeded => "cycle_succeeded",
            EventKind::CycleFailed => "cycle_failed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "cycle_started" => EventKind::CycleStarted,
            "attempt_started" => EventKind::AttemptStarted,
            "attempt_succeeded" => EventKind::AttemptSucceeded,
            "attempt_failed" => EventKind::AttemptFailed,
            "fetch_exhausted" => EventKind::FetchExhausted,
            "markets_filtered" => EventKind::MarketsFiltered,
            "record_skipped" => EventKind::RecordSkipped,
            "commit_failed" => EventKind::CommitFailed,
            "cycle_succeeded" => EventKind::CycleSucceeded,
            "cycle_failed" => EventKind::CycleFailed,
            other => return Err(format!("unknown event marker: {other}")),
        };
        Ok(kind)
    }
}

// ---------------------------------------------------------------------------
// PipelineEvent: what the pipeline reports to its observers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    CycleStarted {
        run_at: DateTime<Utc>,
    },
    AttemptStarted {
        attempt: u32,
        max_attempts: u32,
    },
    AttemptSucceeded {
        attempt: u32,
        markets: usize,
    },
    AttemptFailed {
        attempt: u32,
        max_attempts: u32,
        retryable: bool,
        error: String,
    },
    FetchExhausted {
        attempts: u32,
    },
    MarketsFiltered {
        matched: usize,
        total: usize,
    },
    RecordSkipped {
        market_id: Option<String>,
        reason: String,
    },
    CommitFailed {
        attempted: usize,
        error: String,
    },
    CycleSucceeded {
        stored: usize,
        duration_ms: u64,
    },
    CycleFailed {
        reason: String,
    },
}

impl PipelineEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PipelineEvent::CycleStarted { .. } => EventKind::CycleStarted,
            PipelineEvent::AttemptStarted { .. } => EventKind::AttemptStarted,
            PipelineEvent::AttemptSucceeded { .. } => EventKind::AttemptSucceeded,
            PipelineEvent::AttemptFailed { .. } => EventKind::AttemptFailed,
            PipelineEvent::FetchExhausted { .. } => EventKind::FetchExhausted,
            PipelineEvent::MarketsFiltered { .. } => EventKind::MarketsFiltered,
            PipelineEvent::RecordSkipped { .. } => EventKind::RecordSkipped,
            PipelineEvent::CommitFailed { .. } => EventKind::CommitFailed,
            PipelineEvent::CycleSucceeded { .. } => EventKind::CycleSucceeded,
            PipelineEvent::CycleFailed { .. } => EventKind::CycleFailed,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            PipelineEvent::AttemptFailed { .. }
            | PipelineEvent::RecordSkipped { .. } => Severity::Warn,
            PipelineEvent::MarketsFiltered { matched: 0, .. } => Severity::Warn,
            PipelineEvent::FetchExhausted { .. }
            | PipelineEvent::CommitFailed { .. }
            | PipelineEvent::CycleFailed { .. } => Severity::Error,
            _ => Severity::Info,
        }
    }

    /// Single-line, human-readable summary written after the marker.
    pub fn message(&self) -> String {
        let msg = match self {
            PipelineEvent::CycleStarted { run_at } => format!("run_at={}", run_at.to_rfc3339()),
            PipelineEvent::AttemptStarted { attempt, max_attempts } => {
                format!("attempt={attempt}/{max_attempts}")
            }
            PipelineEvent::AttemptSucceeded { attempt, markets } => {
                format!("attempt={attempt} markets={markets}")
            }
            PipelineEvent::AttemptFailed {
                attempt,
                max_attempts,
                retryable,
                error,
            } => format!("attempt={attempt}/{max_attempts} retryable={retryable} error={error}"),
            PipelineEvent::FetchExhausted { attempts } => format!("attempts={attempts}"),
            PipelineEvent::MarketsFiltered { matched, total } => {
                format!("matched={matched} total={total}")
            }
            PipelineEvent::RecordSkipped { market_id, reason } => format!(
                "market_id={} reason={reason}",
                market_id.as_deref().unwrap_or("-")
            ),
            PipelineEvent::CommitFailed { attempted, error } => {
                format!("attempted={attempted} error={error}")
            }
            PipelineEvent::CycleSucceeded { stored, duration_ms } => {
                format!("stored={stored} duration_ms={duration_ms}")
            }
            PipelineEvent::CycleFailed { reason } => format!("reason={reason}"),
        };
        // Run log entries are line-oriented.
        msg.replace(['\n', '\r'], " ")
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Receives pipeline events. Implementations must never fail the caller.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &PipelineEvent);
}

/// Forwards events to `tracing` and the Prometheus recorder.
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &PipelineEvent) {
        let marker = event.kind().as_str();
        let message = event.message();

        match event.severity() {
            Severity::Info => tracing::info!(marker = marker, "{message}"),
            Severity::Warn => tracing::warn!(marker = marker, "{message}"),
            Severity::Error => tracing::error!(marker = marker, "{message}"),
        }

        match event {
            PipelineEvent::AttemptStarted { .. } => counter!("fetch_attempts_total").increment(1),
            PipelineEvent::AttemptFailed { .. } => counter!("fetch_failures_total").increment(1),
            PipelineEvent::RecordSkipped { .. } => counter!("records_skipped_total").increment(1),
            PipelineEvent::CycleSucceeded { stored, duration_ms } => {
                counter!("cycles_succeeded_total").increment(1);
                counter!("markets_stored_total").increment(*stored as u64);
                histogram!("cycle_duration_seconds").record(*duration_ms as f64 / 1000.0);
                gauge!("last_success_timestamp_seconds").set(Utc::now().timestamp() as f64);
            }
            PipelineEvent::CycleFailed { .. } => counter!("cycles_failed_total").increment(1),
            _ => {}
        }
    }
}

/// Delivers every event to each inner sink in order.
#[derive(Clone, Default)]
pub struct Fanout {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for Fanout {
    fn record(&self, event: &PipelineEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }
}
