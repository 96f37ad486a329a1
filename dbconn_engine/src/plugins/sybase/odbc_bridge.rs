//! CT command surface over an ODBC driver manager.
//!
//! Only language commands are available. Each send drains every ODBC result
//! up front and replays it through `results`/`fetch` in CT order.

use super::ctlib::{CancelKind, CtCommand, CtContext, CtContextFactory, CtResultType};
use crate::config::ConnectionConfig;
use crate::engine::Orientation;
use crate::error::{DbError, Result};
use crate::protocol::datetime;
use crate::protocol::{
    AggregateOp, ColumnDescriptor, ColumnSet, LogicalType, NativeType, ParamDescriptor, ParamSlot,
    ValueBuffer,
};
use odbc_api::{Connection, ConnectionOptions, Cursor, DataType, Environment};
use std::collections::VecDeque;
use std::sync::OnceLock;

static ODBC_ENV: OnceLock<std::result::Result<Environment, String>> = OnceLock::new();

fn odbc_env() -> Result<&'static Environment> {
    let env = ODBC_ENV.get_or_init(|| {
        Environment::new().map_err(|e| format!("Failed to create ODBC environment: {}", e))
    });
    match env {
        Ok(environment) => Ok(environment),
        Err(msg) => Err(DbError::Internal(msg.clone())),
    }
}

fn unsupported(what: &str) -> DbError {
    DbError::Unsupported(format!("{}: not available over ODBC", what))
}

type Row = Vec<Option<Vec<u8>>>;

#[derive(Debug)]
enum Drained {
    Rows {
        columns: Vec<ColumnDescriptor>,
        rows: VecDeque<Row>,
    },
    Done(u64),
    Fail(Vec<String>),
}

/// Native layout for an ODBC column type.
fn native_column(name: String, data_type: &DataType) -> ColumnDescriptor {
    let native = match data_type {
        DataType::TinyInt | DataType::SmallInt => NativeType::SmallInt,
        DataType::Integer => NativeType::Int,
        DataType::BigInt => NativeType::BigInt,
        DataType::Bit => NativeType::Bit,
        DataType::Real => NativeType::Real,
        DataType::Float { .. } | DataType::Double => NativeType::Float,
        DataType::Numeric { precision, scale } | DataType::Decimal { precision, scale } => {
            return ColumnDescriptor::new(name, NativeType::Decimal, 0).with_precision(
                u8::try_from(*precision).unwrap_or(38),
                u8::try_from(*scale).unwrap_or(0),
            );
        }
        DataType::WChar { .. } => NativeType::UniChar,
        DataType::WVarchar { .. } | DataType::WLongVarchar { .. } => NativeType::UniText,
        DataType::LongVarchar { .. } => NativeType::Text,
        DataType::Binary { .. } => NativeType::Binary,
        DataType::Varbinary { .. } => NativeType::VarBinary,
        DataType::LongVarbinary { .. } => NativeType::Image,
        DataType::Date => NativeType::Date,
        DataType::Time { .. } => NativeType::BigTime,
        DataType::Timestamp { .. } => NativeType::BigDateTime,
        _ => NativeType::VarChar,
    };
    let width = native.fixed_width().unwrap_or(0);
    ColumnDescriptor::new(name, native, width)
}

/// Converts the text or binary form read from ODBC into the native buffer layout.
fn to_native(column: &ColumnDescriptor, raw: Vec<u8>) -> Result<Vec<u8>> {
    let native = column.native_type;
    let bad = |detail: String| DbError::mismatch_with(LogicalType::String, native, detail);
    let text = || String::from_utf8_lossy(&raw).trim().to_string();
    Ok(match native {
        NativeType::SmallInt | NativeType::Int | NativeType::BigInt | NativeType::Bit => {
            let t = text();
            let v: i64 = t.parse().map_err(|_| bad(format!("bad integer '{}'", t)))?;
            match native {
                NativeType::SmallInt => i16::try_from(v)
                    .map_err(|_| bad(format!("value {} out of range", v)))?
                    .to_le_bytes()
                    .to_vec(),
                NativeType::Int => i32::try_from(v)
                    .map_err(|_| bad(format!("value {} out of range", v)))?
                    .to_le_bytes()
                    .to_vec(),
                NativeType::Bit => vec![u8::from(v != 0)],
                _ => v.to_le_bytes().to_vec(),
            }
        }
        NativeType::Real => {
            let t = text();
            let v: f32 = t.parse().map_err(|_| bad(format!("bad real '{}'", t)))?;
            v.to_le_bytes().to_vec()
        }
        NativeType::Float => {
            let t = text();
            let v: f64 = t.parse().map_err(|_| bad(format!("bad float '{}'", t)))?;
            v.to_le_bytes().to_vec()
        }
        NativeType::UniChar | NativeType::UniText => String::from_utf8_lossy(&raw)
            .encode_utf16()
            .flat_map(u16::to_le_bytes)
            .collect(),
        NativeType::Date | NativeType::BigTime | NativeType::BigDateTime => {
            let t = text();
            let parsed =
                datetime::parse_text(&t).ok_or_else(|| bad(format!("bad temporal '{}'", t)))?;
            datetime::pack(native, &parsed.to_rec(), LogicalType::DateTime)?
        }
        _ => raw,
    })
}

fn read_cursor<C: Cursor>(cursor: &mut C) -> Result<(Vec<ColumnDescriptor>, VecDeque<Row>)> {
    let count = u16::try_from(cursor.num_result_cols()?)
        .map_err(|_| DbError::Internal("Invalid column count".to_string()))?;
    let mut columns = Vec::with_capacity(usize::from(count));
    for col in 1..=count {
        let name = cursor.col_name(col)?;
        let data_type = cursor.col_data_type(col)?;
        columns.push(native_column(name, &data_type));
    }

    let mut rows = VecDeque::new();
    while let Some(mut row) = cursor.next_row()? {
        let mut cells = Vec::with_capacity(columns.len());
        for (col, column) in (1..=count).zip(&columns) {
            let mut buf = Vec::new();
            let present = if column.native_type.is_binary() {
                row.get_binary(col, &mut buf)?
            } else {
                row.get_text(col, &mut buf)?
            };
            cells.push(if present {
                Some(to_native(column, buf)?)
            } else {
                None
            });
        }
        rows.push_back(cells);
    }
    Ok((columns, rows))
}

/// Runs `sql` and queues every result it produced.
fn drain(conn: &Connection<'static>, sql: &str, queue: &mut VecDeque<Drained>) {
    let fail = |e: DbError| Drained::Fail(vec![e.message()]);
    let mut stmt = match conn.prepare(sql) {
        Ok(stmt) => stmt,
        Err(e) => {
            queue.push_back(fail(e.into()));
            return;
        }
    };

    let mut produced_rows = false;
    match stmt.execute(()) {
        Ok(mut next) => {
            while let Some(mut cursor) = next {
                produced_rows = true;
                match read_cursor(&mut cursor) {
                    Ok((columns, rows)) => {
                        let fetched = rows.len() as u64;
                        queue.push_back(Drained::Rows { columns, rows });
                        queue.push_back(Drained::Done(fetched));
                    }
                    Err(e) => {
                        queue.push_back(fail(e));
                        return;
                    }
                }
                next = match cursor.more_results() {
                    Ok(more) => more,
                    Err(e) => {
                        queue.push_back(fail(e.into()));
                        None
                    }
                };
            }
        }
        Err(e) => {
            queue.push_back(fail(e.into()));
            return;
        }
    }

    if !produced_rows {
        let affected = stmt.row_count().ok().flatten().unwrap_or(0);
        queue.push_back(Drained::Done(affected as u64));
    }
}

pub struct OdbcCommand<'c> {
    conn: &'c Connection<'static>,
    sql: Option<String>,
    queue: VecDeque<Drained>,
    current: Option<(Vec<ColumnDescriptor>, VecDeque<Row>)>,
    row_count: u64,
    messages: Vec<String>,
    sent: bool,
}

impl<'c> OdbcCommand<'c> {
    fn new(conn: &'c Connection<'static>) -> Self {
        Self {
            conn,
            sql: None,
            queue: VecDeque::new(),
            current: None,
            row_count: 0,
            messages: Vec::new(),
            sent: false,
        }
    }
}

impl CtCommand for OdbcCommand<'_> {
    fn language(&mut self, sql: &str) -> Result<()> {
        self.sql = Some(sql.to_string());
        Ok(())
    }

    fn dynamic_prepare(&mut self, _id: &str, _sql: &str) -> Result<()> {
        Err(unsupported("prepare()"))
    }

    fn dynamic_describe_input(&mut self, _id: &str) -> Result<Vec<ParamDescriptor>> {
        Err(unsupported("prepare()"))
    }

    fn dynamic_execute(&mut self, _id: &str) -> Result<()> {
        Err(unsupported("execute()"))
    }

    fn dynamic_deallocate(&mut self, _id: &str) -> Result<()> {
        Err(unsupported("deallocate"))
    }

    fn rpc(&mut self, _procedure: &str) -> Result<()> {
        Err(unsupported("call()"))
    }

    fn cursor_declare(&mut self, _name: &str, _sql: &str, _scrollable: bool, _read_only: bool) -> Result<()> {
        Err(unsupported("execute_cursor()"))
    }

    fn param(&mut self, _slot: &ParamSlot) -> Result<()> {
        Err(unsupported("parameters"))
    }

    fn send(&mut self) -> Result<()> {
        let sql = self
            .sql
            .take()
            .ok_or_else(|| DbError::InvalidState("SQL command is not set".to_string()))?;
        self.queue.clear();
        self.current = None;
        drain(self.conn, &sql, &mut self.queue);
        log::trace!("ODBC drain queued {} result(s)", self.queue.len());
        self.sent = true;
        Ok(())
    }

    fn results(&mut self) -> Result<CtResultType> {
        self.current = None;
        Ok(match self.queue.pop_front() {
            Some(Drained::Rows { columns, rows }) => {
                self.current = Some((columns, rows));
                CtResultType::Row
            }
            Some(Drained::Done(rows)) => {
                self.row_count = rows;
                CtResultType::CmdDone
            }
            Some(Drained::Fail(messages)) => {
                self.messages.extend(messages);
                CtResultType::CmdFail
            }
            None => {
                self.sent = false;
                CtResultType::EndResults
            }
        })
    }

    fn row_count(&mut self) -> Result<u64> {
        Ok(self.row_count)
    }

    fn describe(&mut self) -> Result<Vec<ColumnDescriptor>> {
        self.current
            .as_ref()
            .map(|(columns, _)| columns.clone())
            .ok_or_else(|| DbError::InvalidState("No row result to describe".to_string()))
    }

    fn compute_info(&mut self, _column: usize) -> Result<(AggregateOp, String)> {
        Err(unsupported("compute results"))
    }

    fn bind(&mut self, _columns: &ColumnSet) -> Result<()> {
        Ok(())
    }

    fn fetch(&mut self, orientation: Orientation, buffers: &mut [ValueBuffer]) -> Result<usize> {
        if orientation != Orientation::Next {
            return Err(unsupported("scrolling"));
        }
        let Some(row) = self.current.as_mut().and_then(|(_, rows)| rows.pop_front()) else {
            return Ok(0);
        };
        for (buffer, cell) in buffers.iter_mut().zip(row) {
            match cell {
                Some(bytes) => buffer.fill_growing(&bytes),
                None => buffer.set_null(),
            }
        }
        Ok(1)
    }

    fn cancel(&mut self, kind: CancelKind) -> Result<()> {
        self.current = None;
        if kind == CancelKind::All {
            self.queue.clear();
            self.sent = false;
        }
        Ok(())
    }

    fn take_messages(&mut self) -> Vec<String> {
        std::mem::take(&mut self.messages)
    }
}

/// Picks the major release out of `@@version`, e.g. 16 from
/// `Adaptive Server Enterprise/16.0 SP03/...`.
pub fn parse_server_major(version: &str) -> Option<u32> {
    version
        .split('/')
        .chain(std::iter::once(version))
        .map(str::trim)
        .find(|part| part.starts_with(|c: char| c.is_ascii_digit()))
        .and_then(|part| {
            let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        })
}

pub struct OdbcCtContext {
    conn: Option<Connection<'static>>,
}

impl OdbcCtContext {
    fn conn(&self) -> Result<&Connection<'static>> {
        self.conn
            .as_ref()
            .ok_or_else(|| DbError::InvalidState("Database connection is dead".to_string()))
    }
}

impl CtContext for OdbcCtContext {
    fn command(&self) -> Result<Box<dyn CtCommand + '_>> {
        Ok(Box::new(OdbcCommand::new(self.conn()?)))
    }

    fn server_version(&self) -> Result<u32> {
        let conn = self.conn()?;
        let mut text = String::new();
        if let Some(mut cursor) = conn.execute("select @@version", (), None)? {
            if let Some(mut row) = cursor.next_row()? {
                let mut buf = Vec::new();
                if row.get_text(1, &mut buf)? {
                    text = String::from_utf8_lossy(&buf).into_owned();
                }
            }
        }
        parse_server_major(&text)
            .ok_or_else(|| DbError::Internal(format!("Unrecognised server version '{}'", text)))
    }

    fn alive(&mut self) -> bool {
        self.conn
            .as_ref()
            .is_some_and(|conn| conn.execute("SELECT 1", (), None).is_ok())
    }

    fn close(&mut self) -> Result<()> {
        self.conn = None;
        Ok(())
    }
}

/// Opens sessions through the process-wide ODBC environment.
#[derive(Debug, Default)]
pub struct OdbcCtFactory;

impl CtContextFactory for OdbcCtFactory {
    fn name(&self) -> &str {
        "odbc"
    }

    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn CtContext>> {
        let env = odbc_env()?;
        let conn = env
            .connect_with_connection_string(config.native_connection_string(), ConnectionOptions::default())?;
        Ok(Box::new(OdbcCtContext { conn: Some(conn) }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server_major() {
        assert_eq!(
            parse_server_major("Adaptive Server Enterprise/16.0 SP03 PL02/EBF 27413/P/x86_64"),
            Some(16)
        );
        assert_eq!(parse_server_major("Adaptive Server Enterprise/12.5.4/EBF"), Some(12));
        assert_eq!(parse_server_major("15.7"), Some(15));
        assert_eq!(parse_server_major("unknown"), None);
    }

    #[test]
    fn test_native_column_mapping() {
        let col = native_column("n".to_string(), &DataType::Integer);
        assert_eq!(col.native_type, NativeType::Int);
        assert_eq!(col.max_length, 4);

        let col = native_column("d".to_string(), &DataType::Decimal { precision: 10, scale: 2 });
        assert_eq!(col.native_type, NativeType::Decimal);
        assert_eq!((col.precision, col.scale), (10, 2));

        let col = native_column("t".to_string(), &DataType::Date);
        assert_eq!(col.native_type, NativeType::Date);
    }

    #[test]
    fn test_to_native_layouts() {
        let int = ColumnDescriptor::new("i", NativeType::Int, 4);
        assert_eq!(to_native(&int, b" 42 ".to_vec()).unwrap(), 42i32.to_le_bytes());
        assert!(to_native(&int, b"abc".to_vec()).is_err());

        let wide = ColumnDescriptor::new("w", NativeType::UniText, 0);
        assert_eq!(to_native(&wide, b"hi".to_vec()).unwrap(), vec![b'h', 0, b'i', 0]);

        let date = ColumnDescriptor::new("d", NativeType::Date, 4);
        let packed = to_native(&date, b"2024-01-05".to_vec()).unwrap();
        let rec = datetime::crack(NativeType::Date, &packed, LogicalType::Date).unwrap();
        assert_eq!(rec.date_value(), 20240105);
    }
}
