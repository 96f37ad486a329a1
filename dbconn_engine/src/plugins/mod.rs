pub mod driver_plugin;
pub mod registry;
pub mod sqlite;
pub mod sybase;

pub use driver_plugin::{BatchFailureMode, Driver, DriverCapabilities, DriverContext};
pub use registry::DriverRegistry;
pub use sqlite::SqliteDriver;
pub use sybase::SybaseDriver;
