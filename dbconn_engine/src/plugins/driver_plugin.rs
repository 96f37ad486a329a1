use crate::config::{ConnectionConfig, DriverConfig};
use crate::engine::{Connection, CursorMode};
use crate::error::Result;
use crate::handles::ConnectionTracker;
use crate::observability::{ExecutionMetrics, SharedMetrics, StructuredLogger};

/// What happens to the rest of a batch when one of its statements fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchFailureMode {
    /// Every statement runs; failures are collected and reported at the end.
    ContinueOnError,
    /// The server decides: compile errors abort the whole batch, row-level
    /// errors fail only their statement.
    ServerDecides,
}

#[derive(Debug, Clone)]
pub struct DriverCapabilities {
    pub supports_prepared_statements: bool,
    pub supports_stored_procedures: bool,
    pub supports_scrollable_cursors: bool,
    pub supports_compute_results: bool,
    pub batch_failure_mode: BatchFailureMode,
    pub driver_name: String,
    pub driver_version: String,
}

/// An engine that can open connections.
pub trait Driver: Send + Sync {
    fn name(&self) -> &str;

    /// Native library version.
    fn version(&self) -> String;

    fn capabilities(&self) -> DriverCapabilities;

    fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>>;
}

/// State one driver shares with every connection and statement it creates.
#[derive(Debug, Clone)]
pub struct DriverContext {
    pub config: DriverConfig,
    pub tracker: ConnectionTracker,
    pub logger: StructuredLogger,
    pub metrics: SharedMetrics,
}

impl DriverContext {
    pub fn new(config: DriverConfig) -> Self {
        Self {
            tracker: ConnectionTracker::new(config.max_connections),
            logger: StructuredLogger::new(config.log_statements),
            metrics: ExecutionMetrics::shared(),
            config,
        }
    }

    pub fn default_cursor(&self) -> CursorMode {
        self.config.default_cursor
    }

    /// Emits the execution counters through the statement logger.
    #[cfg(feature = "observability")]
    pub fn report_metrics(&self, engine: &str) {
        let stats = self.metrics.snapshot();
        let prefix = |name: &str| format!("{}.{}", engine, name);
        self.logger
            .log_metric(&prefix("executions"), stats.executions as f64, "count");
        self.logger
            .log_metric(&prefix("batch_failures"), stats.batch_failures as f64, "count");
        self.logger
            .log_metric(&prefix("rows_fetched"), stats.rows_fetched as f64, "count");
        self.logger.log_metric(
            &prefix("latency_p95"),
            stats.p95().as_secs_f64() * 1000.0,
            "ms",
        );
    }

    /// Applies a connection-level maximum before a new connection is counted.
    pub fn apply_limits(&self, connection: &ConnectionConfig) -> Result<()> {
        self.tracker
            .set_max(self.config.effective_max_connections(connection))
    }
}

impl Default for DriverContext {
    fn default() -> Self {
        Self::new(DriverConfig::default())
    }
}
