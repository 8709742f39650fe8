pub mod events;
pub mod run_log;

pub use events::{EventKind, EventSink, Fanout, PipelineEvent, Severity, TracingSink};
pub use run_log::{FileRunLog, MemoryRunLog, RunLog, RunLogEntry};
