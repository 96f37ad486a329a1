use super::ctlib::{send_and_drain, CtContext, CtContextFactory};
use super::statement::SybaseStatement;
use crate::config::ConnectionConfig;
use crate::engine::{Connection, Statement};
use crate::error::{DbError, Result};
use crate::handles::ConnectionSlot;
use crate::plugins::driver_plugin::DriverContext;
use log::Level;
use std::sync::Arc;

const ENGINE: &str = "sybase";

/// Assumed when the server does not report a parsable version.
const FALLBACK_SERVER_VERSION: u32 = 15;

/// A session on one Sybase server.
///
/// With autocommit off a transaction is always open, as for SQLite.
pub struct SybaseConnection {
    config: ConnectionConfig,
    ctx: DriverContext,
    factory: Arc<dyn CtContextFactory>,
    context: Option<Box<dyn CtContext>>,
    slot: Option<ConnectionSlot>,
    autocommit: bool,
    server_version: u32,
}

impl SybaseConnection {
    pub fn new(config: ConnectionConfig, ctx: DriverContext, factory: Arc<dyn CtContextFactory>) -> Self {
        let autocommit = config.autocommit;
        Self {
            config,
            ctx,
            factory,
            context: None,
            slot: None,
            autocommit,
            server_version: FALLBACK_SERVER_VERSION,
        }
    }

    /// Major version reported by the server at connect time.
    pub fn server_version(&self) -> u32 {
        self.server_version
    }

    /// A statement with the Sybase-only extensions (cursors).
    pub fn sybase_statement(&self) -> Result<SybaseStatement<'_>> {
        let context = self.live()?;
        Ok(SybaseStatement::new(
            context.command()?,
            self.server_version,
            self.ctx.default_cursor(),
            self.ctx.logger.clone(),
            self.ctx.metrics.clone(),
        ))
    }

    fn live(&self) -> Result<&dyn CtContext> {
        self.context
            .as_deref()
            .ok_or_else(|| DbError::InvalidState("Database connection is dead".to_string()))
    }

    fn exec(&self, sql: &str) -> Result<()> {
        let mut cmd = self.live()?.command()?;
        cmd.language(sql)?;
        send_and_drain(cmd.as_mut()).map(|_| ()).map_err(|e| {
            DbError::native(
                e.native_code(),
                format!("Failed to execute: {}: {}", sql, e.message()),
            )
        })
    }
}

impl Connection for SybaseConnection {
    fn connect(&mut self) -> Result<bool> {
        if self.connected() {
            self.disconnect()?;
        }
        if self.config.server.is_none() && self.config.native_connection_string().is_empty() {
            return Err(DbError::Config("Server is not set".to_string()));
        }

        self.ctx.apply_limits(&self.config)?;
        let slot = self.ctx.tracker.acquire()?;

        let context = self.factory.connect(&self.config).map_err(|e| {
            DbError::native(
                e.native_code(),
                format!("Failed to connect: {}: {}", self.config.masked(), e.message()),
            )
        })?;
        self.server_version = context.server_version().unwrap_or_else(|e| {
            log::warn!("Server version unavailable, assuming {}: {}", FALLBACK_SERVER_VERSION, e);
            FALLBACK_SERVER_VERSION
        });

        self.context = Some(context);
        self.slot = Some(slot);
        self.ctx.logger.log_connection(
            Level::Info,
            ENGINE,
            &format!("{} via {}", self.config.masked(), self.factory.name()),
            "open",
        );

        if !self.autocommit {
            self.exec("begin tran")?;
        }
        Ok(self.alive())
    }

    fn disconnect(&mut self) -> Result<()> {
        if let Some(mut context) = self.context.take() {
            if let Err(e) = context.close() {
                log::warn!("Closing Sybase connection failed: {}", e);
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
        self.context.as_mut().is_some_and(|c| c.alive())
    }

    fn connected(&self) -> bool {
        self.context.is_some()
    }

    fn commit(&mut self) -> Result<()> {
        if !self.autocommit {
            self.exec("commit tran")?;
            self.exec("begin tran")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if !self.autocommit {
            self.exec("rollback tran")?;
            self.exec("begin tran")?;
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
                self.exec("rollback tran")?;
            } else {
                self.exec("begin tran")?;
            }
        }
        Ok(())
    }

    fn autocommit(&self) -> bool {
        self.autocommit
    }

    fn statement(&self) -> Result<Box<dyn Statement + '_>> {
        Ok(Box::new(self.sybase_statement()?))
    }
}

impl Drop for SybaseConnection {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            log::warn!("Disconnect on drop failed: {}", e);
        }
    }
}
