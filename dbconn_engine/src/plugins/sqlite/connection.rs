use super::ffi::RawDb;
use super::statement::SqliteStatement;
use crate::config::ConnectionConfig;
use crate::engine::{Connection, Statement};
use crate::error::{DbError, Result};
use crate::handles::ConnectionSlot;
use crate::plugins::driver_plugin::DriverContext;
use log::Level;
use rusqlite::OpenFlags;

const ENGINE: &str = "sqlite";

/// A connection to one SQLite database file.
///
/// With autocommit off a transaction is always open: one is begun after
/// connecting and again after every commit or rollback.
pub struct SqliteConnection {
    config: ConnectionConfig,
    ctx: DriverContext,
    conn: Option<rusqlite::Connection>,
    slot: Option<ConnectionSlot>,
    autocommit: bool,
}

impl SqliteConnection {
    pub fn new(config: ConnectionConfig, ctx: DriverContext) -> Self {
        let autocommit = config.autocommit;
        Self {
            config,
            ctx,
            conn: None,
            slot: None,
            autocommit,
        }
    }

    /// The underlying `rusqlite` connection, for engine-specific work.
    pub fn native(&self) -> Option<&rusqlite::Connection> {
        self.conn.as_ref()
    }

    /// A statement with the SQLite-only extensions (`interrupt`).
    pub fn sqlite_statement(&self) -> Result<SqliteStatement<'_>> {
        let conn = self
            .conn
            .as_ref()
            .ok_or_else(|| DbError::InvalidState("Database connection is dead".to_string()))?;
        Ok(SqliteStatement::new(
            RawDb::new(conn),
            self.ctx.logger.clone(),
            self.ctx.metrics.clone(),
        ))
    }

    fn open_flags(&self) -> OpenFlags {
        let mut flags = if self.config.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else if self.config.create {
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };
        if self.config.uri {
            flags |= OpenFlags::SQLITE_OPEN_URI;
        }
        flags | OpenFlags::SQLITE_OPEN_NO_MUTEX
    }

    fn exec(&self, sql: &str) -> Result<()> {
        let conn = self
            .conn
            .as_ref()
            .ok_or_else(|| DbError::InvalidState("Database connection is dead".to_string()))?;
        conn.execute_batch(sql).map_err(|e| {
            let err = DbError::from(e);
            DbError::native(
                err.native_code(),
                format!("Failed to execute: {}: {}", sql, err.message()),
            )
        })
    }
}

impl Connection for SqliteConnection {
    fn connect(&mut self) -> Result<bool> {
        if self.connected() {
            self.disconnect()?;
        }
        let path = self
            .config
            .database
            .clone()
            .ok_or_else(|| DbError::Config("Database is not set".to_string()))?;

        self.ctx.apply_limits(&self.config)?;
        let slot = self.ctx.tracker.acquire()?;

        let flags = self.open_flags();
        let conn = match &self.config.vfs {
            Some(vfs) => rusqlite::Connection::open_with_flags_and_vfs(&path, flags, vfs),
            None => rusqlite::Connection::open_with_flags(&path, flags),
        }
        .map_err(|e| {
            let text = e.to_string();
            DbError::native(
                DbError::from(e).native_code(),
                format!("Failed to connect: {}: {}", path, text),
            )
        })?;
        if let Some(timeout) = self.config.busy_timeout {
            conn.busy_timeout(timeout)?;
        }

        self.conn = Some(conn);
        self.slot = Some(slot);
        self.ctx
            .logger
            .log_connection(Level::Info, ENGINE, &self.config.masked(), "open");

        if !self.autocommit {
            self.exec("begin transaction;")?;
        }
        Ok(self.alive())
    }

    fn disconnect(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            if let Err((_, e)) = conn.close() {
                log::warn!("Closing SQLite connection failed: {}", e);
            }
            self.ctx
                .logger
                .log_connection(Level::Info, ENGINE, &self.config.masked(), "close");
            #[cfg(feature = "observability")]
            self.ctx.report_metrics(ENGINE);
        }
        self.slot = None;
        Ok(())
    }

    fn alive(&mut self) -> bool {
        self.conn.is_some()
    }

    fn connected(&self) -> bool {
        self.conn.is_some()
    }

    fn commit(&mut self) -> Result<()> {
        if !self.autocommit {
            self.exec("commit transaction;")?;
            self.exec("begin transaction;")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if !self.autocommit {
            self.exec("rollback transaction;")?;
            self.exec("begin transaction;")?;
        }
        Ok(())
    }

    fn set_autocommit(&mut self, on: bool) -> Result<()> {
        if on == self.autocommit {
            return Ok(());
        }
        self.autocommit = on;
        if self.connected() {
            if on {
                self.exec("rollback transaction;")?;
            } else {
                self.exec("begin transaction;")?;
            }
        }
        Ok(())
    }

    fn autocommit(&self) -> bool {
        self.autocommit
    }

    fn statement(&self) -> Result<Box<dyn Statement + '_>> {
        Ok(Box::new(self.sqlite_statement()?))
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            log::warn!("Disconnect on drop failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ResultSetExt;

    fn open(conn_str: &str) -> SqliteConnection {
        let config = ConnectionConfig::parse(conn_str).unwrap();
        let mut conn = SqliteConnection::new(config, DriverContext::default());
        assert!(conn.connect().unwrap());
        conn
    }

    #[test]
    fn test_connect_and_disconnect() {
        let mut conn = open("Database=:memory:;Autocommit=1");
        assert!(conn.connected());
        assert!(conn.alive());
        conn.disconnect().unwrap();
        assert!(!conn.connected());
        assert!(conn.statement().is_err());
    }

    #[test]
    fn test_missing_database_is_config_error() {
        let config = ConnectionConfig::parse("Server=nowhere").unwrap();
        let mut conn = SqliteConnection::new(config, DriverContext::default());
        assert!(matches!(conn.connect(), Err(DbError::Config(_))));
    }

    #[test]
    fn test_rollback_discards_work_without_autocommit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tx.db");
        let mut conn = open(&format!("Database={};Autocommit=0", path.display()));
        assert!(!conn.autocommit());
        {
            let mut stmt = conn.statement().unwrap();
            stmt.execute_sql("CREATE TABLE t (a INTEGER)").unwrap();
        }
        conn.commit().unwrap();
        {
            let mut stmt = conn.statement().unwrap();
            stmt.execute_sql("INSERT INTO t VALUES (1)").unwrap();
        }
        conn.rollback().unwrap();

        let mut stmt = conn.statement().unwrap();
        let rs = stmt.execute_sql("SELECT count(*) FROM t").unwrap();
        assert!(rs.more_results().unwrap());
        assert!(rs.next().unwrap());
        assert_eq!(rs.get_long(0).unwrap(), 0);
    }

    #[test]
    fn test_enabling_autocommit_rolls_back_open_transaction() {
        let mut conn = open("Database=:memory:;Autocommit=0");
        {
            let mut stmt = conn.statement().unwrap();
            stmt.execute_sql("CREATE TABLE t (a INTEGER)").unwrap();
        }
        conn.set_autocommit(true).unwrap();
        assert!(conn.autocommit());
        assert!(conn.native().unwrap().is_autocommit());
        // the CREATE was rolled back with the transaction
        let mut stmt = conn.statement().unwrap();
        assert!(matches!(
            stmt.execute_sql("SELECT * FROM t"),
            Err(DbError::Native { .. })
        ));
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ro.db");
        {
            let conn = open(&format!("Database={}", path.display()));
            let mut stmt = conn.statement().unwrap();
            stmt.execute_sql("CREATE TABLE t (a INTEGER)").unwrap();
        }
        let conn = open(&format!("Database={};ReadOnly=1", path.display()));
        let mut stmt = conn.statement().unwrap();
        let err = match stmt.execute_sql("INSERT INTO t VALUES (1)") {
            Ok(_) => panic!("called `Result::unwrap_err()` on an `Ok` value"),
            Err(e) => e,
        };
        assert!(err.is_batch_failure());
        assert!(err.message().contains("readonly"));
    }

    #[test]
    fn test_connection_limit() {
        let ctx = DriverContext::default();
        let config = ConnectionConfig::parse("Database=:memory:;Max_Connections=1").unwrap();
        let mut first = SqliteConnection::new(config.clone(), ctx.clone());
        let mut second = SqliteConnection::new(config, ctx.clone());
        first.connect().unwrap();
        assert!(matches!(
            second.connect(),
            Err(DbError::ConnectionLimit { max: 1 })
        ));
        drop(first);
        assert!(second.connect().unwrap());
        assert_eq!(ctx.tracker.open_count().unwrap(), 1);
    }
}
