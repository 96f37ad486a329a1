use super::driver_plugin::Driver;
use crate::config::ConnectionConfig;
use crate::engine::Connection;
use crate::error::{DbError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Drivers by name; picks one for a connection string.
pub struct DriverRegistry {
    drivers: Arc<Mutex<HashMap<String, Arc<dyn Driver>>>>,
}

impl DriverRegistry {
    /// A registry without any driver.
    pub fn new() -> Self {
        Self {
            drivers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn register(&self, driver: Arc<dyn Driver>) -> Result<()> {
        let mut drivers = self.drivers.lock().map_err(|_| DbError::lock_poisoned())?;
        log::debug!("Registering driver {}", driver.name());
        drivers.insert(driver.name().to_string(), driver);
        Ok(())
    }

    pub fn get(&self, driver_name: &str) -> Result<Arc<dyn Driver>> {
        let drivers = self.drivers.lock().map_err(|_| DbError::lock_poisoned())?;
        drivers
            .get(&driver_name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| DbError::Config(format!("Driver not found: {}", driver_name)))
    }

    pub fn names(&self) -> Result<Vec<String>> {
        let drivers = self.drivers.lock().map_err(|_| DbError::lock_poisoned())?;
        let mut names: Vec<String> = drivers.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Guesses the engine from the `Driver=` value, falling back to the
    /// whole connection string.
    pub fn detect_driver(&self, connection_string: &str) -> Option<String> {
        let hint = ConnectionConfig::parse(connection_string)
            .ok()
            .and_then(|c| c.driver)
            .unwrap_or_else(|| connection_string.to_string())
            .to_lowercase();

        if hint.contains("sqlite") {
            return Some("sqlite".to_string());
        }
        if hint.contains("sybase")
            || hint.contains("adaptive server")
            || hint.split(|c: char| !c.is_ascii_alphanumeric()).any(|w| w == "ase")
        {
            return Some("sybase".to_string());
        }
        None
    }

    /// Parses `connection_string`, selects its driver and opens a connection.
    pub fn connect(&self, connection_string: &str) -> Result<Box<dyn Connection>> {
        let config = ConnectionConfig::parse(connection_string)?;
        let name = self.detect_driver(connection_string).ok_or_else(|| {
            DbError::Config(format!(
                "No driver recognised in connection string: {}",
                config.masked()
            ))
        })?;
        let driver = self.get(&name)?;
        driver.open(&config)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        let registry = Self::new();
        let drivers: [Arc<dyn Driver>; 2] = [
            Arc::new(super::sqlite::SqliteDriver::default()),
            Arc::new(super::sybase::SybaseDriver::default()),
        ];
        for driver in drivers {
            if let Err(e) = registry.register(driver) {
                log::warn!("Driver registration failed: {}", e);
            }
        }
        registry
    }
}
