//! Stored-procedure parameter lookup in the system catalog.

use super::ctlib::{failure_messages, CancelKind, CtCommand, CtResultType};
use crate::engine::Orientation;
use crate::error::{DbError, Result};
use crate::protocol::marshal;
use crate::protocol::{
    ColumnDescriptor, ColumnSet, LogicalType, NativeType, ParamDescriptor, ParamDirection, Value,
    ValueBuffer,
};

/// First ASE release that flags output parameters in `syscolumns.status2`.
pub const STATUS2_MIN_VERSION: u32 = 15;

/// Catalog query listing the parameters of `procedure` in declaration order.
pub fn procedure_params_sql(procedure: &str, server_major: u32) -> String {
    let output_flag = if server_major >= STATUS2_MIN_VERSION {
        "c.status2 & 2"
    } else {
        "c.status & 64"
    };
    format!(
        "select c.name, c.type, c.length, isnull(c.prec, 0), isnull(c.scale, 0), \
         case when {flag} = 0 then 0 else 1 end \
         from syscolumns c where c.id = object_id('{proc}') order by c.colid",
        flag = output_flag,
        proc = procedure.replace('\'', "''"),
    )
}

/// Reads the parameter descriptors of `procedure`.
pub fn procedure_params(
    cmd: &mut dyn CtCommand,
    procedure: &str,
    server_major: u32,
) -> Result<Vec<ParamDescriptor>> {
    cmd.language(&procedure_params_sql(procedure, server_major))?;
    cmd.send()?;

    let mut params = Vec::new();
    let mut failures = Vec::new();
    loop {
        match cmd.results()? {
            CtResultType::Row => {
                let columns = ColumnSet::new(cmd.describe()?);
                cmd.bind(&columns)?;
                let mut buffers: Vec<ValueBuffer> =
                    columns.iter().map(ValueBuffer::for_column).collect();
                while cmd.fetch(Orientation::Next, &mut buffers)? > 0 {
                    params.push(param_from_row(&columns, &buffers)?);
                }
            }
            CtResultType::CmdFail => failures.extend(failure_messages(cmd)),
            CtResultType::Cursor
            | CtResultType::Param
            | CtResultType::Status
            | CtResultType::Compute => cmd.cancel(CancelKind::Current)?,
            CtResultType::CmdSucceed | CtResultType::CmdDone => {}
            CtResultType::EndResults | CtResultType::Canceled => break,
        }
    }

    if !failures.is_empty() {
        return Err(DbError::native(-1, failures.join("; ")));
    }
    if params.is_empty() {
        log::debug!("Procedure {} has no parameters", procedure);
    }
    Ok(params)
}

fn param_from_row(columns: &ColumnSet, buffers: &[ValueBuffer]) -> Result<ParamDescriptor> {
    let read = |index: usize, kind: LogicalType| -> Result<Value> {
        let column = columns
            .get(index)
            .ok_or_else(|| DbError::Internal(format!("catalog column {} missing", index)))?;
        let buffer = buffers
            .get(index)
            .ok_or_else(|| DbError::Internal(format!("catalog buffer {} missing", index)))?;
        marshal::decode(column, buffer, kind, index)
    };
    let int = |index: usize| -> Result<i64> {
        match read(index, LogicalType::Long)? {
            Value::Long(v) => Ok(v),
            other => Err(DbError::Internal(format!("unexpected catalog value {}", other))),
        }
    };

    let name = match read(0, LogicalType::String)? {
        Value::String(name) => name.trim_end().to_string(),
        other => return Err(DbError::Internal(format!("unexpected catalog value {}", other))),
    };
    let native = NativeType::from_ase_code(u8::try_from(int(1)?).unwrap_or(0));
    let length = usize::try_from(int(2)?).unwrap_or(0);
    let precision = u8::try_from(int(3)?).unwrap_or(0);
    let scale = u8::try_from(int(4)?).unwrap_or(0);
    let direction = if int(5)? != 0 {
        ParamDirection::InOut
    } else {
        ParamDirection::In
    };

    Ok(ParamDescriptor::new(
        ColumnDescriptor::new(name, native, length).with_precision(precision, scale),
        direction,
    ))
}
