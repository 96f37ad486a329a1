//! In-process stand-ins for native servers, plus shared test setup.
//!
//! [`ScriptedServer`] answers CT commands from a list of scripted batches so
//! the Sybase engine can be exercised without a live server.

use crate::config::ConnectionConfig;
use crate::engine::Orientation;
use crate::error::{DbError, Result};
use crate::plugins::sybase::ctlib::{
    CancelKind, CtCommand, CtContext, CtContextFactory, CtResultType,
};
use crate::protocol::marshal;
use crate::protocol::{
    AggregateOp, ColumnDescriptor, ColumnSet, NativeType, ParamDescriptor, ParamSlot, Value,
    ValueBuffer,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, Once};

/// Cells of one row in native layout, `None` for NULL.
pub type NativeRow = Vec<Option<Vec<u8>>>;

/// Encodes `values` into the native layout of `columns`.
pub fn native_row(columns: &[ColumnDescriptor], values: &[Value]) -> Result<NativeRow> {
    columns
        .iter()
        .zip(values)
        .map(|(column, value)| marshal::encode_value(column, value))
        .collect()
}

/// One server response in a scripted batch.
#[derive(Debug, Clone)]
pub enum ScriptedResult {
    /// A row result followed by its `CMD_DONE`.
    Rows {
        columns: Vec<ColumnDescriptor>,
        rows: Vec<NativeRow>,
    },
    /// Rows of an opened cursor.
    CursorRows {
        columns: Vec<ColumnDescriptor>,
        rows: Vec<NativeRow>,
    },
    /// Output parameters of an RPC.
    Params {
        columns: Vec<ColumnDescriptor>,
        row: NativeRow,
    },
    /// Procedure return status.
    Status(i32),
    /// Aggregate row closing the preceding row result.
    Compute {
        columns: Vec<(ColumnDescriptor, AggregateOp, String)>,
        row: NativeRow,
    },
    Succeed,
    /// `CMD_DONE` of a statement affecting `n` rows.
    Done(u64),
    /// `CMD_FAIL` with one server message.
    Fail(String),
}

impl ScriptedResult {
    /// Row result from plain values.
    pub fn rows(columns: Vec<ColumnDescriptor>, rows: &[Vec<Value>]) -> Result<Self> {
        let rows = rows
            .iter()
            .map(|r| native_row(&columns, r))
            .collect::<Result<Vec<_>>>()?;
        Ok(ScriptedResult::Rows { columns, rows })
    }

    /// Cursor result from plain values.
    pub fn cursor_rows(columns: Vec<ColumnDescriptor>, rows: &[Vec<Value>]) -> Result<Self> {
        Ok(match Self::rows(columns, rows)? {
            ScriptedResult::Rows { columns, rows } => ScriptedResult::CursorRows { columns, rows },
            other => other,
        })
    }

    pub fn params(columns: Vec<ColumnDescriptor>, values: &[Value]) -> Result<Self> {
        let row = native_row(&columns, values)?;
        Ok(ScriptedResult::Params { columns, row })
    }

    pub fn compute(
        columns: Vec<(ColumnDescriptor, AggregateOp, String)>,
        values: &[Value],
    ) -> Result<Self> {
        let descriptors: Vec<ColumnDescriptor> = columns.iter().map(|(c, _, _)| c.clone()).collect();
        let row = native_row(&descriptors, values)?;
        Ok(ScriptedResult::Compute { columns, row })
    }
}

/// A command the server received.
#[derive(Debug, Clone, PartialEq)]
pub struct SentCommand {
    /// `language`, `prepare`, `execute`, `deallocate`, `rpc` or `cursor`.
    pub kind: &'static str,
    pub text: String,
    pub params: NativeRow,
    pub scrollable: bool,
}

#[derive(Debug, Default)]
struct ServerState {
    batches: VecDeque<Vec<ScriptedResult>>,
    sent: Vec<SentCommand>,
    cancels: Vec<CancelKind>,
    version: u32,
    /// Input parameters reported by DESCRIBE INPUT, keyed by SQL text.
    prepared_params: HashMap<String, Vec<ParamDescriptor>>,
    /// Dynamic statement ids currently allocated.
    dynamic: HashMap<String, String>,
    procedures: HashMap<String, Vec<ParamDescriptor>>,
    connect_error: Option<String>,
    open_sessions: usize,
}

/// A fake server shared by every context it opens.
#[derive(Debug, Clone)]
pub struct ScriptedServer {
    state: Arc<Mutex<ServerState>>,
}

impl Default for ScriptedServer {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedServer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                version: 16,
                ..Default::default()
            })),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut ServerState) -> T) -> T {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut state)
    }

    /// Queues the responses to the next executed command.
    pub fn push_batch(&self, results: Vec<ScriptedResult>) -> &Self {
        self.with(|s| s.batches.push_back(results));
        self
    }

    pub fn set_version(&self, major: u32) -> &Self {
        self.with(|s| s.version = major);
        self
    }

    /// Parameters DESCRIBE INPUT reports once `sql` is prepared.
    pub fn prepared(&self, sql: &str, params: Vec<ParamDescriptor>) -> &Self {
        self.with(|s| s.prepared_params.insert(sql.to_string(), params));
        self
    }

    /// Catalog entry answered for `object_id('<name>')` lookups.
    pub fn procedure(&self, name: &str, params: Vec<ParamDescriptor>) -> &Self {
        self.with(|s| s.procedures.insert(name.to_string(), params));
        self
    }

    pub fn fail_connect(&self, message: &str) -> &Self {
        self.with(|s| s.connect_error = Some(message.to_string()));
        self
    }

    pub fn sent(&self) -> Vec<SentCommand> {
        self.with(|s| s.sent.clone())
    }

    pub fn cancels(&self) -> Vec<CancelKind> {
        self.with(|s| s.cancels.clone())
    }

    pub fn pending_batches(&self) -> usize {
        self.with(|s| s.batches.len())
    }

    pub fn open_sessions(&self) -> usize {
        self.with(|s| s.open_sessions)
    }

    /// Dynamic statements prepared and not yet deallocated.
    pub fn allocated_dynamics(&self) -> usize {
        self.with(|s| s.dynamic.len())
    }
}

impl CtContextFactory for ScriptedServer {
    fn name(&self) -> &str {
        "scripted"
    }

    fn connect(&self, _config: &ConnectionConfig) -> Result<Box<dyn CtContext>> {
        if let Some(message) = self.with(|s| s.connect_error.clone()) {
            return Err(DbError::native(-1, message));
        }
        self.with(|s| s.open_sessions += 1);
        Ok(Box::new(ScriptedContext {
            server: self.clone(),
            open: true,
        }))
    }
}

struct ScriptedContext {
    server: ScriptedServer,
    open: bool,
}

impl CtContext for ScriptedContext {
    fn command(&self) -> Result<Box<dyn CtCommand + '_>> {
        if !self.open {
            return Err(DbError::InvalidState("Database connection is dead".to_string()));
        }
        Ok(Box::new(ScriptedCommand::new(self.server.clone())))
    }

    fn server_version(&self) -> Result<u32> {
        Ok(self.server.with(|s| s.version))
    }

    fn alive(&mut self) -> bool {
        self.open
    }

    fn close(&mut self) -> Result<()> {
        if std::mem::take(&mut self.open) {
            self.server.with(|s| s.open_sessions -= 1);
        }
        Ok(())
    }
}

/// One CT result waiting to be pulled by `results`.
#[derive(Debug, Clone)]
struct Pending {
    kind: CtResultType,
    columns: Vec<ColumnDescriptor>,
    compute: Vec<(AggregateOp, String)>,
    rows: Vec<NativeRow>,
    count: u64,
    message: Option<String>,
}

impl Pending {
    fn bare(kind: CtResultType) -> Self {
        Self {
            kind,
            columns: Vec::new(),
            compute: Vec::new(),
            rows: Vec::new(),
            count: 0,
            message: None,
        }
    }

    fn data(kind: CtResultType, columns: Vec<ColumnDescriptor>, rows: Vec<NativeRow>) -> Self {
        Self {
            columns,
            rows,
            ..Self::bare(kind)
        }
    }

    fn done(count: u64) -> Self {
        Self {
            count,
            ..Self::bare(CtResultType::CmdDone)
        }
    }
}

fn expand(batch: Vec<ScriptedResult>) -> VecDeque<Pending> {
    let mut out = VecDeque::new();
    let mut iter = batch.into_iter().peekable();
    while let Some(result) = iter.next() {
        match result {
            ScriptedResult::Rows { columns, rows } => {
                let n = rows.len() as u64;
                out.push_back(Pending::data(CtResultType::Row, columns, rows));
                if !matches!(iter.peek(), Some(ScriptedResult::Compute { .. })) {
                    out.push_back(Pending::done(n));
                }
            }
            ScriptedResult::CursorRows { columns, rows } => {
                let n = rows.len() as u64;
                out.push_back(Pending::data(CtResultType::Cursor, columns, rows));
                out.push_back(Pending::done(n));
            }
            ScriptedResult::Params { columns, row } => {
                out.push_back(Pending::data(CtResultType::Param, columns, vec![row]));
            }
            ScriptedResult::Status(status) => {
                let column = ColumnDescriptor::new("", NativeType::Int, 4);
                let row = vec![Some(status.to_le_bytes().to_vec())];
                out.push_back(Pending::data(CtResultType::Status, vec![column], vec![row]));
            }
            ScriptedResult::Compute { columns, row } => {
                let (descriptors, compute) = columns
                    .into_iter()
                    .map(|(c, op, base)| (c, (op, base)))
                    .unzip();
                out.push_back(Pending {
                    compute,
                    ..Pending::data(CtResultType::Compute, descriptors, vec![row])
                });
                out.push_back(Pending::done(0));
            }
            ScriptedResult::Succeed => out.push_back(Pending::bare(CtResultType::CmdSucceed)),
            ScriptedResult::Done(n) => out.push_back(Pending::done(n)),
            ScriptedResult::Fail(message) => out.push_back(Pending {
                message: Some(message),
                ..Pending::bare(CtResultType::CmdFail)
            }),
        }
    }
    out
}

fn ase_code(native: NativeType) -> u8 {
    match native {
        NativeType::TinyInt => 48,
        NativeType::SmallInt => 52,
        NativeType::USmallInt => 65,
        NativeType::Int => 56,
        NativeType::UInt => 66,
        NativeType::BigInt => 191,
        NativeType::UBigInt => 67,
        NativeType::Real => 59,
        NativeType::Float => 62,
        NativeType::Decimal => 106,
        NativeType::Numeric => 108,
        NativeType::Money => 60,
        NativeType::SmallMoney => 122,
        NativeType::Bit => 50,
        NativeType::Char => 47,
        NativeType::VarChar | NativeType::LongChar => 39,
        NativeType::Text => 35,
        NativeType::UniChar => 135,
        NativeType::UniText => 174,
        NativeType::Binary => 45,
        NativeType::VarBinary | NativeType::LongBinary => 37,
        NativeType::Image => 34,
        NativeType::Date => 49,
        NativeType::Time => 51,
        NativeType::DateTime => 61,
        NativeType::SmallDateTime => 58,
        NativeType::BigDateTime => 187,
        NativeType::BigTime => 188,
        NativeType::Null | NativeType::Unknown => 0,
    }
}

/// Rows `syscolumns` would return for a procedure's parameters.
fn catalog_result(params: &[ParamDescriptor]) -> Result<ScriptedResult> {
    let columns = vec![
        ColumnDescriptor::new("name", NativeType::VarChar, 255),
        ColumnDescriptor::new("type", NativeType::TinyInt, 1),
        ColumnDescriptor::new("length", NativeType::Int, 4),
        ColumnDescriptor::new("prec", NativeType::TinyInt, 1),
        ColumnDescriptor::new("scale", NativeType::TinyInt, 1),
        ColumnDescriptor::new("output", NativeType::Int, 4),
    ];
    let rows: Vec<Vec<Value>> = params
        .iter()
        .map(|p| {
            vec![
                Value::String(p.name().to_string()),
                Value::Int(i32::from(ase_code(p.native_type()))),
                Value::Int(i32::try_from(p.column.max_length).unwrap_or(i32::MAX)),
                Value::Int(i32::from(p.column.precision)),
                Value::Int(i32::from(p.column.scale)),
                Value::Int(i32::from(p.direction.is_output())),
            ]
        })
        .collect();
    ScriptedResult::rows(columns, &rows)
}

fn quoted_object(sql: &str) -> Option<String> {
    let start = sql.find("object_id('")? + "object_id('".len();
    let rest = &sql[start..];
    let end = rest.find("')")?;
    Some(rest[..end].replace("''", "'"))
}

fn is_transaction_control(sql: &str) -> bool {
    matches!(
        sql.trim().to_ascii_lowercase().as_str(),
        "begin tran" | "commit tran" | "rollback tran"
    )
}

struct ScriptedCommand {
    server: ScriptedServer,
    setup: Option<SentCommand>,
    pending: VecDeque<Pending>,
    current: Option<Pending>,
    /// 1-based row of `current` the last fetch landed on, 0 before the first.
    position: usize,
    row_count: u64,
    messages: Vec<String>,
}

impl ScriptedCommand {
    fn new(server: ScriptedServer) -> Self {
        Self {
            server,
            setup: None,
            pending: VecDeque::new(),
            current: None,
            position: 0,
            row_count: 0,
            messages: Vec::new(),
        }
    }

    fn begin(&mut self, kind: &'static str, text: &str) {
        self.setup = Some(SentCommand {
            kind,
            text: text.to_string(),
            params: Vec::new(),
            scrollable: false,
        });
    }

    fn respond(&self, command: &SentCommand) -> Result<VecDeque<Pending>> {
        self.server.with(|s| match command.kind {
            "prepare" => Ok(expand(vec![ScriptedResult::Succeed])),
            "deallocate" => {
                s.dynamic.remove(&command.text);
                Ok(expand(vec![ScriptedResult::Succeed]))
            }
            _ => {
                if command.kind == "language" && is_transaction_control(&command.text) {
                    return Ok(expand(vec![ScriptedResult::Succeed]));
                }
                if command.kind == "language" {
                    if let Some(params) = quoted_object(&command.text)
                        .and_then(|name| s.procedures.get(&name).cloned())
                    {
                        return Ok(expand(vec![catalog_result(&params)?]));
                    }
                }
                Ok(expand(s.batches.pop_front().unwrap_or_default()))
            }
        })
    }
}

impl CtCommand for ScriptedCommand {
    fn language(&mut self, sql: &str) -> Result<()> {
        self.begin("language", sql);
        Ok(())
    }

    fn dynamic_prepare(&mut self, id: &str, sql: &str) -> Result<()> {
        self.begin("prepare", id);
        self.server.with(|s| s.dynamic.insert(id.to_string(), sql.to_string()));
        Ok(())
    }

    fn dynamic_describe_input(&mut self, id: &str) -> Result<Vec<ParamDescriptor>> {
        self.server.with(|s| {
            let sql = s
                .dynamic
                .get(id)
                .ok_or_else(|| DbError::native(-1, format!("Dynamic statement {} not found", id)))?;
            Ok(s.prepared_params.get(sql).cloned().unwrap_or_default())
        })
    }

    fn dynamic_execute(&mut self, id: &str) -> Result<()> {
        if !self.server.with(|s| s.dynamic.contains_key(id)) {
            return Err(DbError::native(-1, format!("Dynamic statement {} not found", id)));
        }
        self.begin("execute", id);
        Ok(())
    }

    fn dynamic_deallocate(&mut self, id: &str) -> Result<()> {
        self.begin("deallocate", id);
        Ok(())
    }

    fn rpc(&mut self, procedure: &str) -> Result<()> {
        self.begin("rpc", procedure);
        Ok(())
    }

    fn cursor_declare(&mut self, _name: &str, sql: &str, scrollable: bool, _read_only: bool) -> Result<()> {
        self.begin("cursor", sql);
        if let Some(setup) = self.setup.as_mut() {
            setup.scrollable = scrollable;
        }
        Ok(())
    }

    fn param(&mut self, slot: &ParamSlot) -> Result<()> {
        let setup = self
            .setup
            .as_mut()
            .ok_or_else(|| DbError::InvalidState("No command to add parameters to".to_string()))?;
        let cell = (!slot.buffer.is_null()).then(|| slot.buffer.bytes().to_vec());
        setup.params.push(cell);
        Ok(())
    }

    fn send(&mut self) -> Result<()> {
        let command = self
            .setup
            .take()
            .ok_or_else(|| DbError::InvalidState("SQL command is not set".to_string()))?;
        self.current = None;
        self.pending = self.respond(&command)?;
        self.server.with(|s| s.sent.push(command));
        Ok(())
    }

    fn results(&mut self) -> Result<CtResultType> {
        self.current = None;
        self.position = 0;
        let Some(next) = self.pending.pop_front() else {
            return Ok(CtResultType::EndResults);
        };
        let kind = next.kind;
        match kind {
            CtResultType::CmdDone => self.row_count = next.count,
            CtResultType::CmdFail => self.messages.extend(next.message.clone()),
            _ => {}
        }
        self.current = Some(next);
        Ok(kind)
    }

    fn row_count(&mut self) -> Result<u64> {
        Ok(self.row_count)
    }

    fn describe(&mut self) -> Result<Vec<ColumnDescriptor>> {
        Ok(self.current.as_ref().map(|c| c.columns.clone()).unwrap_or_default())
    }

    fn compute_info(&mut self, column: usize) -> Result<(AggregateOp, String)> {
        self.current
            .as_ref()
            .and_then(|c| c.compute.get(column).cloned())
            .ok_or_else(|| DbError::native(-1, format!("No compute info for column {}", column)))
    }

    fn bind(&mut self, columns: &ColumnSet) -> Result<()> {
        let described = self.current.as_ref().map(|c| c.columns.len()).unwrap_or(0);
        if columns.len() != described {
            return Err(DbError::Internal(format!(
                "bound {} column(s), result has {}",
                columns.len(),
                described
            )));
        }
        Ok(())
    }

    fn fetch(&mut self, orientation: Orientation, buffers: &mut [ValueBuffer]) -> Result<usize> {
        let Some(current) = self.current.as_ref() else {
            return Ok(0);
        };
        let total = current.rows.len();
        if orientation != Orientation::Next && current.kind != CtResultType::Cursor {
            return Err(DbError::native(-1, "ct_scroll_fetch on a non-cursor result"));
        }
        self.position = match orientation {
            Orientation::Next => (self.position + 1).min(total + 1),
            Orientation::Prior => self.position.saturating_sub(1),
            Orientation::First => 1.min(total + 1),
            Orientation::Last => total,
        };
        let Some(row) = self.position.checked_sub(1).and_then(|i| current.rows.get(i)) else {
            return Ok(0);
        };
        for (buffer, cell) in buffers.iter_mut().zip(row) {
            match cell {
                Some(bytes) => buffer.fill_growing(bytes),
                None => buffer.set_null(),
            }
        }
        Ok(1)
    }

    fn cancel(&mut self, kind: CancelKind) -> Result<()> {
        self.server.with(|s| s.cancels.push(kind));
        self.current = None;
        if kind == CancelKind::All {
            self.pending.clear();
        }
        Ok(())
    }

    fn take_messages(&mut self) -> Vec<String> {
        std::mem::take(&mut self.messages)
    }
}

/// Loads `.env` once for tests that read connection settings.
pub fn load_dotenv() {
    static LOAD: Once = Once::new();
    LOAD.call_once(|| {
        let _ = dotenvy::dotenv();
    });
}

/// Routes `log` output to the test harness; safe to call repeatedly.
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG_TYPES: [NativeType; 30] = [
        NativeType::TinyInt,
        NativeType::SmallInt,
        NativeType::USmallInt,
        NativeType::Int,
        NativeType::UInt,
        NativeType::BigInt,
        NativeType::UBigInt,
        NativeType::Real,
        NativeType::Float,
        NativeType::Decimal,
        NativeType::Numeric,
        NativeType::Money,
        NativeType::SmallMoney,
        NativeType::Bit,
        NativeType::Char,
        NativeType::VarChar,
        NativeType::LongChar,
        NativeType::Text,
        NativeType::UniChar,
        NativeType::UniText,
        NativeType::Binary,
        NativeType::VarBinary,
        NativeType::LongBinary,
        NativeType::Image,
        NativeType::Date,
        NativeType::Time,
        NativeType::DateTime,
        NativeType::SmallDateTime,
        NativeType::BigDateTime,
        NativeType::BigTime,
    ];

    #[test]
    fn test_catalog_type_codes_read_back() {
        for native in CATALOG_TYPES {
            let read = NativeType::from_ase_code(ase_code(native));
            match native {
                NativeType::LongChar => assert_eq!(read, NativeType::VarChar),
                NativeType::LongBinary => assert_eq!(read, NativeType::VarBinary),
                _ => assert_eq!(read, native),
            }
            assert_ne!(read, NativeType::Unknown, "{:?}", native);
        }
    }

    #[test]
    fn test_long_types_stay_in_their_family() {
        assert!(NativeType::from_ase_code(ase_code(NativeType::LongChar)).is_character());
        assert!(NativeType::from_ase_code(ase_code(NativeType::LongBinary)).is_binary());
    }

    #[test]
    fn test_untyped_columns_have_no_code() {
        assert_eq!(ase_code(NativeType::Null), 0);
        assert_eq!(ase_code(NativeType::Unknown), 0);
    }
}
