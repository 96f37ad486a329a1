use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const SAMPLE_WINDOW: usize = 1000;

#[derive(Debug, Clone)]
pub struct ExecutionStats {
    pub executions: u64,
    pub batch_failures: u64,
    pub failed_statements: u64,
    pub rows_fetched: u64,
    pub total_latency: Duration,
    pub min_latency: Duration,
    pub max_latency: Duration,
    pub latency_samples: VecDeque<Duration>,
}

impl Default for ExecutionStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionStats {
    pub fn new() -> Self {
        Self {
            executions: 0,
            batch_failures: 0,
            failed_statements: 0,
            rows_fetched: 0,
            total_latency: Duration::ZERO,
            min_latency: Duration::MAX,
            max_latency: Duration::ZERO,
            latency_samples: VecDeque::new(),
        }
    }

    pub fn record_execution(&mut self, latency: Duration) {
        self.executions += 1;
        self.total_latency += latency;

        if latency < self.min_latency {
            self.min_latency = latency;
        }
        if latency > self.max_latency {
            self.max_latency = latency;
        }

        self.latency_samples.push_back(latency);
        if self.latency_samples.len() > SAMPLE_WINDOW {
            self.latency_samples.pop_front();
        }
    }

    pub fn average_latency(&self) -> Duration {
        if self.executions == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total_latency.as_nanos() / u128::from(self.executions);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    pub fn percentile(&self, p: f64) -> Duration {
        if self.latency_samples.is_empty() {
            return Duration::ZERO;
        }

        let mut sorted: Vec<Duration> = self.latency_samples.iter().copied().collect();
        sorted.sort();

        let index = ((sorted.len() - 1) as f64 * p / 100.0) as usize;
        sorted[index]
    }

    pub fn p50(&self) -> Duration {
        self.percentile(50.0)
    }

    pub fn p95(&self) -> Duration {
        self.percentile(95.0)
    }
}

/// Counters shared by a driver and everything it opens.
#[derive(Debug)]
pub struct ExecutionMetrics {
    stats: Mutex<ExecutionStats>,
    start_time: Instant,
}

pub type SharedMetrics = Arc<ExecutionMetrics>;

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self {
            stats: Mutex::new(ExecutionStats::new()),
            start_time: Instant::now(),
        }
    }

    pub fn shared() -> SharedMetrics {
        Arc::new(Self::new())
    }

    pub fn record_execution(&self, latency: Duration) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.record_execution(latency);
        }
    }

    pub fn record_batch_failure(&self, failed: usize) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.batch_failures += 1;
            stats.failed_statements += failed as u64;
        }
    }

    pub fn record_rows(&self, rows: u64) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.rows_fetched += rows;
        }
    }

    pub fn snapshot(&self) -> ExecutionStats {
        self.stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|_| ExecutionStats::new())
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Default for ExecutionMetrics {
    fn default() -> Self {
        Self::new()
    }
}
