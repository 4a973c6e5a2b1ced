//! Observability counters for the orchestrator.
//!
//! Counters are exposed via the `metrics` crate facade; `main` installs a
//! Prometheus exporter so they can be scraped. The orchestrator tracks job
//! launches and failures for both kinds of jobs it submits, plus a running
//! count of emitted log lines by severity.
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `matchforge_mmf_jobs_total` | Counter | - | Worker jobs submitted |
//! | `matchforge_mmf_failures_total` | Counter | - | Worker submissions that failed |
//! | `matchforge_eval_jobs_total` | Counter | `eval_reason` | Evaluator jobs submitted |
//! | `matchforge_eval_failures_total` | Counter | `eval_reason` | Evaluator submissions that failed |
//! | `matchforge_log_lines_total` | Counter | `severity` | Log lines emitted |

use metrics::{counter, describe_counter};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: worker (MMF) jobs submitted successfully.
    pub const MMF_JOBS_TOTAL: &str = "matchforge_mmf_jobs_total";
    /// Counter: worker (MMF) job submissions that failed.
    pub const MMF_FAILURES_TOTAL: &str = "matchforge_mmf_failures_total";
    /// Counter: evaluator jobs submitted successfully.
    pub const EVAL_JOBS_TOTAL: &str = "matchforge_eval_jobs_total";
    /// Counter: evaluator job submissions that failed.
    pub const EVAL_FAILURES_TOTAL: &str = "matchforge_eval_failures_total";
    /// Counter: log lines emitted, by severity.
    pub const LOG_LINES_TOTAL: &str = "matchforge_log_lines_total";
}

/// Label keys used across metrics.
pub mod labels {
    /// Why the evaluator trigger fired.
    pub const EVAL_REASON: &str = "eval_reason";
    /// Log line severity.
    pub const SEVERITY: &str = "severity";
}

/// Why the evaluator trigger fired in a given cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalReason {
    /// The configured evaluator interval elapsed.
    IntervalExceeded,
    /// Every worker launched since the last run has completed.
    MmfsCompleted,
}

impl EvalReason {
    /// The label value recorded with evaluator metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            EvalReason::IntervalExceeded => "interval_exceeded",
            EvalReason::MmfsCompleted => "mmfs_completed",
        }
    }
}

/// Recorder for orchestrator launch counters.
///
/// Cheap to clone and share across launcher tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrchestratorMetrics;

impl OrchestratorMetrics {
    /// Creates a new metrics recorder.
    pub fn new() -> Self {
        Self
    }

    /// Records a successful worker job submission.
    pub fn record_mmf_job(&self) {
        counter!(names::MMF_JOBS_TOTAL).increment(1);
    }

    /// Records a failed worker job submission.
    pub fn record_mmf_failure(&self) {
        counter!(names::MMF_FAILURES_TOTAL).increment(1);
    }

    /// Records a successful evaluator job submission.
    pub fn record_eval_job(&self, reason: EvalReason) {
        counter!(
            names::EVAL_JOBS_TOTAL,
            labels::EVAL_REASON => reason.as_str(),
        )
        .increment(1);
    }

    /// Records a failed evaluator job submission.
    pub fn record_eval_failure(&self, reason: EvalReason) {
        counter!(
            names::EVAL_FAILURES_TOTAL,
            labels::EVAL_REASON => reason.as_str(),
        )
        .increment(1);
    }
}

/// Register descriptions for every orchestrator metric.
///
/// Call once after the exporter is installed.
pub fn describe() {
    describe_counter!(names::MMF_JOBS_TOTAL, "Worker (MMF) jobs submitted");
    describe_counter!(
        names::MMF_FAILURES_TOTAL,
        "Worker (MMF) job submissions that failed"
    );
    describe_counter!(names::EVAL_JOBS_TOTAL, "Evaluator jobs submitted");
    describe_counter!(
        names::EVAL_FAILURES_TOTAL,
        "Evaluator job submissions that failed"
    );
    describe_counter!(names::LOG_LINES_TOTAL, "Log lines emitted, by severity");
}

/// A `tracing` layer that counts emitted events by severity.
///
/// Composes into the subscriber registry alongside the fmt layer, so every
/// log line is counted no matter which module emitted it.
pub struct LogLineCounter;

impl<S: Subscriber> Layer<S> for LogLineCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        let severity = if level == Level::ERROR {
            "error"
        } else if level == Level::WARN {
            "warn"
        } else if level == Level::INFO {
            "info"
        } else if level == Level::DEBUG {
            "debug"
        } else {
            "trace"
        };
        counter!(names::LOG_LINES_TOTAL, labels::SEVERITY => severity).increment(1);
    }
}
