//! Typed accessors layered over the single generic cell accessor.

use super::{ResultSet, Statement};
use crate::error::{DbError, Result};
use crate::protocol::kind::{self, Kind};
use crate::protocol::Value;

/// A column addressed by 0-based index or by name.
pub trait ColumnRef {
    fn resolve<R: ResultSet + ?Sized>(&self, rs: &R) -> Result<usize>;
}

impl ColumnRef for usize {
    fn resolve<R: ResultSet + ?Sized>(&self, _rs: &R) -> Result<usize> {
        Ok(*self)
    }
}

impl ColumnRef for &str {
    fn resolve<R: ResultSet + ?Sized>(&self, rs: &R) -> Result<usize> {
        rs.column_index(self)
            .ok_or_else(|| DbError::InvalidState(format!("Column '{}' not found", self)))
    }
}

impl ColumnRef for String {
    fn resolve<R: ResultSet + ?Sized>(&self, rs: &R) -> Result<usize> {
        self.as_str().resolve(rs)
    }
}

macro_rules! getters {
    ($($name:ident => $marker:ident),* $(,)?) => {
        $(
            fn $name<C: ColumnRef>(&self, column: C) -> Result<<kind::$marker as Kind>::Output> {
                self.get::<kind::$marker, C>(column)
            }
        )*
    };
}

pub trait ResultSetExt: ResultSet {
    /// `rs.get::<kind::Int, _>("id")`
    fn get<K: Kind, C: ColumnRef>(&self, column: C) -> Result<K::Output> {
        let index = column.resolve(self)?;
        let value = self.value(index, K::TYPE)?;
        K::extract(value).ok_or_else(|| {
            DbError::Internal(format!("accessor for {} produced another kind", K::TYPE.name()))
        })
    }

    fn is_null_at<C: ColumnRef>(&self, column: C) -> Result<bool> {
        let index = column.resolve(self)?;
        self.is_null(index)
    }

    getters! {
        get_short => Short,
        get_ushort => UShort,
        get_int => Int,
        get_uint => UInt,
        get_long => Long,
        get_ulong => ULong,
        get_float => Float,
        get_double => Double,
        get_bool => Bool,
        get_char => Char,
        get_string => Str,
        get_date => Date,
        get_time => Time,
        get_datetime => DateTime,
        get_unichar => UniChar,
        get_unistring => UniString,
        get_binary => Binary,
    }
}

impl<T: ResultSet + ?Sized> ResultSetExt for T {}

macro_rules! setters {
    ($($name:ident($ty:ty) => $variant:ident),* $(,)?) => {
        $(
            fn $name(&mut self, index: usize, value: $ty) -> Result<()> {
                self.bind_value(index, Value::$variant(value))
            }
        )*
    };
}

pub trait StatementExt: Statement {
    setters! {
        set_short(i16) => Short,
        set_ushort(u16) => UShort,
        set_int(i32) => Int,
        set_uint(u32) => UInt,
        set_long(i64) => Long,
        set_ulong(u64) => ULong,
        set_float(f32) => Float,
        set_double(f64) => Double,
        set_bool(bool) => Bool,
        set_char(u8) => Char,
        set_date(i32) => Date,
        set_time(f64) => Time,
        set_datetime(i64) => DateTime,
        set_unichar(u16) => UniChar,
        set_unistring(Vec<u16>) => UniString,
        set_binary(Vec<u8>) => Binary,
    }

    fn set_string(&mut self, index: usize, value: impl Into<String>) -> Result<()> {
        self.bind_value(index, Value::String(value.into()))
    }

    /// Binds each value in order, NULLs included.
    fn bind_all(&mut self, values: &[Value]) -> Result<()> {
        for (index, value) in values.iter().enumerate() {
            match value {
                Value::Null => self.set_null(index)?,
                other => self.bind_value(index, other.clone())?,
            }
        }
        Ok(())
    }
}

impl<T: Statement + ?Sized> StatementExt for T {}
