use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::db::MarketStore;
use crate::models::{MarketStats, StoreSummary};
use crate::observability::{EventKind, RunLog, RunLogEntry};

pub const DEFAULT_RECENT_ISSUES: usize = 5;

const FRESH_MINUTES: i64 = 20;
const STALE_MINUTES: i64 = 60;

// ---------------------------------------------------------------------------
// Freshness and overall status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Freshness {
    Fresh,
    Stale,
    VeryStale,
    Unknown,
}

impl Freshness {
    /// Classify the age of the newest record; `None` means an empty store.
    pub fn classify(age: Option<Duration>) -> Self {
        match age {
            None => Freshness::Unknown,
            Some(age) if age < Duration::minutes(FRESH_MINUTES) => Freshness::Fresh,
            Some(age) if age < Duration::minutes(STALE_MINUTES) => Freshness::Stale,
            Some(_) => Freshness::VeryStale,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Freshness::Fresh => "FRESH",
            Freshness::Stale => "STALE",
            Freshness::VeryStale => "VERY_STALE",
            Freshness::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStatus {
    RunningNormally,
    RunningButStale,
    NotUpdating,
}

impl PipelineStatus {
    pub fn from_freshness(freshness: Freshness) -> Self {
        match freshness {
            Freshness::Fresh => PipelineStatus::RunningNormally,
            Freshness::Stale => PipelineStatus::RunningButStale,
            Freshness::VeryStale | Freshness::Unknown => PipelineStatus::NotUpdating,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::RunningNormally => "RUNNING_NORMALLY",
            PipelineStatus::RunningButStale => "RUNNING_BUT_STALE",
            PipelineStatus::NotUpdating => "NOT_UPDATING",
        }
    }
}

// ---------------------------------------------------------------------------
// Run performance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunPerformance {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    /// Percentage in [0, 100]; `None` when nothing has run yet.
    pub success_rate_pct: Option<f64>,
    /// `"80.0%"` or `"not applicable"`.
    pub success_rate: String,
}

impl RunPerformance {
    pub fn new(successful_runs: u64, failed_runs: u64) -> Self {
        let total_runs = successful_runs + failed_runs;
        let success_rate_pct = if total_runs == 0 {
            None
        } else {
            Some(successful_runs as f64 / total_runs as f64 * 100.0)
        };
        let success_rate = match success_rate_pct {
            Some(pct) => format!("{pct:.1}%"),
            None => "not applicable".to_string(),
        };

        Self {
            total_runs,
            successful_runs,
            failed_runs,
            success_rate_pct,
            success_rate,
        }
    }

    pub fn from_entries(entries: &[RunLogEntry]) -> Self {
        let successful = entries
            .iter()
            .filter(|e| e.kind == EventKind::CycleSucceeded)
            .count() as u64;
        let failed = entries
            .iter()
            .filter(|e| e.kind == EventKind::CycleFailed)
            .count() as u64;
        Self::new(successful, failed)
    }
}

/// The last `limit` WARN/ERROR entries, oldest first.
pub fn recent_issues(entries: &[RunLogEntry], limit: usize) -> Vec<String> {
    let mut issues: Vec<String> = entries
        .iter()
        .rev()
        .filter(|e| e.severity.is_issue())
        .take(limit)
        .map(|e| e.to_string())
        .collect();
    issues.reverse();
    issues
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FreshnessReport {
    pub age_minutes: Option<f64>,
    pub status: Freshness,
}

/// Point-in-time health snapshot. `Display` renders the operator report and
/// `Serialize` the machine-readable document; both read this one value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub generated_at: DateTime<Utc>,
    pub last_update: Option<DateTime<Utc>>,
    pub data_freshness: FreshnessReport,
    pub market_stats: MarketStats,
    pub pipeline_performance: RunPerformance,
    pub recent_issues: Vec<String>,
    pub status: PipelineStatus,
}

impl HealthReport {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn format_age(minutes: f64) -> String {
    let total_secs = (minutes * 60.0).round() as i64;
    let (h, m, s) = (total_secs / 3600, (total_secs % 3600) / 60, total_secs % 60);
    if h > 0 {
        format!("{h}h {m}m {s}s")
    } else {
        format!("{m}m {s}s")
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(70);
        writeln!(f, "{rule}")?;
        writeln!(f, "{:^70}", "DATA PIPELINE MONITOR")?;
        writeln!(f, "{rule}")?;

        writeln!(f, "\nDATA FRESHNESS:")?;
        match self.last_update {
            Some(ts) => {
                writeln!(f, "   Last Update: {}", ts.format("%Y-%m-%d %H:%M:%S UTC"))?;
                writeln!(f, "   Data Age: {}", self.data_freshness.status.as_str())?;
                if let Some(minutes) = self.data_freshness.age_minutes {
                    writeln!(f, "   Duration: {}", format_age(minutes))?;
                }
            }
            None => writeln!(f, "   No data updates yet")?,
        }

        writeln!(f, "\nMARKET STATISTICS:")?;
        writeln!(f, "   Total Markets: {}", self.market_stats.total)?;
        writeln!(f, "   Active Markets: {}", self.market_stats.active)?;
        writeln!(f, "   Resolved Markets: {}", self.market_stats.resolved)?;

        let perf = &self.pipeline_performance;
        writeln!(f, "\nPIPELINE PERFORMANCE:")?;
        writeln!(f, "   Total Fetches: {}", perf.total_runs)?;
        writeln!(f, "   Successful: {}", perf.successful_runs)?;
        writeln!(f, "   Failed: {}", perf.failed_runs)?;
        writeln!(f, "   Success Rate: {}", perf.success_rate)?;

        writeln!(f, "\nRECENT ERRORS & WARNINGS:")?;
        if self.recent_issues.is_empty() {
            writeln!(f, "   No errors or warnings")?;
        }
        for issue in &self.recent_issues {
            writeln!(f, "   {issue}")?;
        }

        writeln!(f, "\nSYSTEM STATUS:")?;
        writeln!(f, "   Pipeline: {}", self.status.as_str())?;

        writeln!(f, "\n{rule}")?;
        writeln!(
            f,
            "Monitor Report Generated: {}",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        write!(f, "{rule}")
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

/// Read-only view over stored markets and pipeline run history.
#[derive(Clone)]
pub struct HealthMonitor {
    store: Arc<dyn MarketStore>,
    run_log: Arc<dyn RunLog>,
    issue_limit: usize,
}

impl HealthMonitor {
    pub fn new(store: Arc<dyn MarketStore>, run_log: Arc<dyn RunLog>) -> Self {
        Self {
            store,
            run_log,
            issue_limit: DEFAULT_RECENT_ISSUES,
        }
    }

    pub fn with_issue_limit(mut self, limit: usize) -> Self {
        self.issue_limit = limit;
        self
    }

    pub async fn status(&self) -> anyhow::Result<HealthReport> {
        self.status_at(Utc::now()).await
    }

    /// Build the report as seen at `now`. A store failure is an error; an
    /// unreadable run log degrades to zero runs plus an issue line.
    pub async fn status_at(&self, now: DateTime<Utc>) -> anyhow::Result<HealthReport> {
        let StoreSummary {
            last_update,
            stats: market_stats,
        } = self.store.summary().await?;

        // Clock skew can put the newest row slightly in the future.
        let age = last_update.map(|ts| (now - ts).max(Duration::zero()));
        let freshness = Freshness::classify(age);

        let (pipeline_performance, recent_issues) = match self.run_log.entries() {
            Ok(entries) => (
                RunPerformance::from_entries(&entries),
                recent_issues(&entries, self.issue_limit),
            ),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read run log");
                (
                    RunPerformance::new(0, 0),
                    vec![format!("Could not read run log: {e}")],
                )
            }
        };

        Ok(HealthReport {
            generated_at: now,
            last_update,
            data_freshness: FreshnessReport {
                age_minutes: age.map(|a| a.num_milliseconds() as f64 / 60_000.0),
                status: freshness,
            },
            market_stats,
            pipeline_performance,
            recent_issues,
            status: PipelineStatus::from_freshness(freshness),
        })
    }

    /// Write the JSON snapshot to `path`, creating parent directories.
    pub async fn export_json(&self, path: &Path) -> anyhow::Result<HealthReport> {
        let report = self.status().await?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, report.to_json_pretty()?).await?;
        tracing::info!(path = %path.display(), "Status exported");
        Ok(report)
    }
}
