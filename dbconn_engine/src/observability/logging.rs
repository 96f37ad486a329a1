use log::Level;
use std::collections::BTreeMap;

/// `log` facade front end with a switch; engines call it on every
/// execution so statement logging can be turned off per driver.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    enabled: bool,
}

impl StructuredLogger {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn log_statement(&self, level: Level, engine: &str, sql: &str, metadata: &BTreeMap<&str, String>) {
        if !self.enabled {
            return;
        }

        let mut message = format!("[{}] Statement: {}", engine, sql);
        for (key, value) in metadata {
            message.push_str(&format!(", {}={}", key, value));
        }

        log::log!(level, "{}", message);
    }

    /// `masked_connection` must already have its password removed.
    pub fn log_connection(&self, level: Level, engine: &str, masked_connection: &str, action: &str) {
        if !self.enabled {
            return;
        }

        log::log!(level, "[{}] Connection {}: {}", engine, action, masked_connection);
    }

    pub fn log_batch_failure(&self, engine: &str, failed: usize, rows_affected: u64, message: &str) {
        if !self.enabled {
            return;
        }

        log::warn!(
            "[{}] Batch failure: failed={}, rows_affected={}, messages={}",
            engine,
            failed,
            rows_affected,
            message
        );
    }

    pub fn log_metric(&self, name: &str, value: f64, unit: &str) {
        if !self.enabled {
            return;
        }

        log::info!("Metric: {}={}{}", name, value, unit);
    }
}

impl Default for StructuredLogger {
    fn default() -> Self {
        Self::new(true)
    }
}
