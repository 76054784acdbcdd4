//! Per-epoch results.

use kronos_types::Record;
use std::fmt;
use std::time::Duration;

/// Which half of the protocol produced an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Orders internal records and records this shard is an input of.
    Outbound,
    /// Orders cross-shard records this shard is the output of.
    Inbound,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Outbound => write!(f, "outbound"),
            Role::Inbound => write!(f, "inbound"),
        }
    }
}

/// Summary of one role's epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochReport {
    pub epoch: u32,
    pub role: Role,
    /// Records emitted as final output.
    pub records: usize,
    /// Internal records among them.
    pub internal: usize,
    /// Cross-shard records among them.
    pub cross_shard: usize,
    /// Wall time from epoch start to output.
    pub elapsed: Duration,
}

/// Final output of one role's epoch.
#[derive(Debug, Clone)]
pub struct EpochOutput {
    pub report: EpochReport,
    pub records: Vec<Record>,
}

/// Aggregate throughput and latency over a set of reports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThroughputSummary {
    pub epochs: usize,
    pub records: usize,
    pub mean_latency: Duration,
    pub max_latency: Duration,
}

impl ThroughputSummary {
    /// Summarize `reports`.
    pub fn from_reports<'a>(reports: impl IntoIterator<Item = &'a EpochReport>) -> Self {
        let mut summary = Self::default();
        let mut total = Duration::ZERO;
        for report in reports {
            summary.epochs += 1;
            summary.records += report.records;
            total += report.elapsed;
            summary.max_latency = summary.max_latency.max(report.elapsed);
        }
        if summary.epochs > 0 {
            summary.mean_latency = total / summary.epochs as u32;
        }
        summary
    }

    /// Records per second over `wall_time`.
    pub fn tps(&self, wall_time: Duration) -> f64 {
        let secs = wall_time.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.records as f64 / secs
    }
}
