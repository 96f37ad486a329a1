//! Reads and binds by SQLite storage class.
//!
//! SQLite cells carry a storage class instead of a declared type, so the
//! acceptance rules here differ from the buffer marshaling of the send/poll
//! engine. Temporal kinds travel as ISO text.

use super::ffi::{RawStmt, StorageClass};
use crate::error::{DbError, Result};
use crate::protocol::datetime::{self, TemporalText};
use crate::protocol::{LogicalType, NativeType, Value};

/// Native tag reported in mismatch errors for a storage class.
pub fn storage_native_type(class: StorageClass) -> NativeType {
    match class {
        StorageClass::Integer => NativeType::BigInt,
        StorageClass::Real => NativeType::Float,
        StorageClass::Text => NativeType::Text,
        StorageClass::Blob => NativeType::Image,
        StorageClass::Null => NativeType::Null,
    }
}

pub fn accepts(kind: LogicalType, class: StorageClass) -> bool {
    use StorageClass as S;
    match kind {
        LogicalType::Short
        | LogicalType::UShort
        | LogicalType::Int
        | LogicalType::UInt
        | LogicalType::Long
        | LogicalType::ULong
        | LogicalType::Bool => class == S::Integer,
        LogicalType::Float | LogicalType::Double => matches!(class, S::Real | S::Integer),
        LogicalType::Char | LogicalType::String => matches!(class, S::Text | S::Integer | S::Real),
        LogicalType::UniChar | LogicalType::UniString => class == S::Text,
        LogicalType::Binary => matches!(class, S::Blob | S::Text),
        LogicalType::Date | LogicalType::Time | LogicalType::DateTime => class == S::Text,
    }
}

/// Reads column `index` of the current row as `kind`.
pub fn read(stmt: &RawStmt<'_>, index: usize, kind: LogicalType) -> Result<Value> {
    let class = stmt.column_type(index);
    if class == StorageClass::Null {
        if let Some(declared) = declared_class(stmt, index) {
            if !accepts(kind, declared) {
                return Err(DbError::mismatch(kind, storage_native_type(declared)));
            }
        }
        return Value::empty_of(kind).ok_or(DbError::NullConversion { column: index });
    }
    if !accepts(kind, class) {
        return Err(DbError::mismatch(kind, storage_native_type(class)));
    }

    let native = storage_native_type(class);
    let out_of_range =
        |v: i64| DbError::mismatch_with(kind, native, format!("value {} out of range", v));

    Ok(match kind {
        LogicalType::Short => {
            let v = stmt.column_i64(index);
            Value::Short(i16::try_from(v).map_err(|_| out_of_range(v))?)
        }
        LogicalType::UShort => {
            let v = stmt.column_i64(index);
            Value::UShort(u16::try_from(v).map_err(|_| out_of_range(v))?)
        }
        LogicalType::Int => {
            let v = stmt.column_i64(index);
            Value::Int(i32::try_from(v).map_err(|_| out_of_range(v))?)
        }
        LogicalType::UInt => {
            let v = stmt.column_i64(index);
            Value::UInt(u32::try_from(v).map_err(|_| out_of_range(v))?)
        }
        LogicalType::Long => Value::Long(stmt.column_i64(index)),
        LogicalType::ULong => {
            let v = stmt.column_i64(index);
            Value::ULong(u64::try_from(v).map_err(|_| out_of_range(v))?)
        }
        LogicalType::Bool => Value::Bool(stmt.column_i64(index) != 0),
        LogicalType::Float => Value::Float(stmt.column_f64(index) as f32),
        LogicalType::Double => Value::Double(stmt.column_f64(index)),
        LogicalType::Char => Value::Char(stmt.column_text(index).first().copied().unwrap_or(0)),
        LogicalType::String => Value::String(text_of(stmt, index, kind)?),
        LogicalType::UniChar => {
            let text = text_of(stmt, index, kind)?;
            Value::UniChar(text.encode_utf16().next().unwrap_or(0))
        }
        LogicalType::UniString => Value::UniString(text_of(stmt, index, kind)?.encode_utf16().collect()),
        LogicalType::Binary => match class {
            StorageClass::Blob => Value::Binary(stmt.column_blob(index)),
            _ => Value::Binary(stmt.column_text(index)),
        },
        LogicalType::Date => {
            let parsed = temporal(stmt, index, kind)?;
            if parsed.date.is_none() {
                return Err(DbError::mismatch_with(kind, native, "text has no date part"));
            }
            Value::Date(parsed.to_rec().date_value())
        }
        LogicalType::Time => {
            let parsed = temporal(stmt, index, kind)?;
            if parsed.time.is_none() {
                return Err(DbError::mismatch_with(kind, native, "text has no time part"));
            }
            Value::Time(parsed.to_rec().time_value())
        }
        LogicalType::DateTime => {
            let parsed = temporal(stmt, index, kind)?;
            if parsed.date.is_none() {
                return Err(DbError::mismatch_with(kind, native, "text has no date part"));
            }
            Value::DateTime(parsed.to_rec().epoch_seconds()?)
        }
    })
}

/// Storage class implied by the column's declared type; `None` for
/// expressions and NUMERIC affinity, which hold any class.
fn declared_class(stmt: &RawStmt<'_>, index: usize) -> Option<StorageClass> {
    let decl = stmt.column_decltype(index).filter(|d| !d.trim().is_empty())?;
    match NativeType::from_sqlite_decltype(Some(&decl)) {
        NativeType::BigInt => Some(StorageClass::Integer),
        NativeType::Float => Some(StorageClass::Real),
        NativeType::Text => Some(StorageClass::Text),
        NativeType::Image => Some(StorageClass::Blob),
        _ => None,
    }
}

fn text_of(stmt: &RawStmt<'_>, index: usize, kind: LogicalType) -> Result<String> {
    String::from_utf8(stmt.column_text(index))
        .map_err(|_| DbError::mismatch_with(kind, NativeType::Text, "text is not valid UTF-8"))
}

fn temporal(stmt: &RawStmt<'_>, index: usize, kind: LogicalType) -> Result<TemporalText> {
    let text = text_of(stmt, index, kind)?;
    datetime::parse_text(&text).ok_or_else(|| {
        DbError::mismatch_with(kind, NativeType::Text, format!("'{}' is not a date/time", text))
    })
}

/// Binds `value` at 0-based parameter `index`.
pub fn bind(stmt: &RawStmt<'_>, index: usize, value: &Value) -> Result<()> {
    match value {
        Value::Null => stmt.bind_null(index),
        Value::Short(v) => stmt.bind_i64(index, i64::from(*v)),
        Value::UShort(v) => stmt.bind_i64(index, i64::from(*v)),
        Value::Int(v) => stmt.bind_i64(index, i64::from(*v)),
        Value::UInt(v) => stmt.bind_i64(index, i64::from(*v)),
        Value::Long(v) => stmt.bind_i64(index, *v),
        Value::ULong(v) => {
            let v = i64::try_from(*v).map_err(|_| {
                DbError::mismatch_with(
                    LogicalType::ULong,
                    NativeType::BigInt,
                    format!("value {} out of range", v),
                )
            })?;
            stmt.bind_i64(index, v)
        }
        Value::Float(v) => stmt.bind_f64(index, f64::from(*v)),
        Value::Double(v) => stmt.bind_f64(index, *v),
        Value::Bool(v) => stmt.bind_i64(index, i64::from(*v)),
        Value::Char(c) => stmt.bind_text(index, &char::from(*c).to_string()),
        Value::String(s) => stmt.bind_text(index, s),
        Value::Date(v) => stmt.bind_text(index, &datetime::format_date(*v)?),
        Value::Time(v) => stmt.bind_text(index, &datetime::format_time(*v)?),
        Value::DateTime(v) => stmt.bind_text(index, &datetime::format_datetime(*v)?),
        Value::UniChar(u) => stmt.bind_text(index, &utf16_text(std::slice::from_ref(u))?),
        Value::UniString(units) => stmt.bind_text(index, &utf16_text(units)?),
        Value::Binary(bytes) => stmt.bind_blob(index, bytes),
    }
}

fn utf16_text(units: &[u16]) -> Result<String> {
    String::from_utf16(units)
        .map_err(|_| DbError::Validation("unistring parameter is not valid UTF-16".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::sqlite::ffi::{RawDb, StepResult};

    fn with_row<F: FnOnce(&RawStmt<'_>)>(select: &str, check: F) {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let db = RawDb::new(&conn);
        let handles = db.prepare_all(select).unwrap();
        assert_eq!(handles[0].step().unwrap(), StepResult::Row);
        check(&handles[0]);
    }

    #[test]
    fn test_integer_range_checks() {
        with_row("SELECT 70000, -1, 12", |stmt| {
            assert!(matches!(
                read(stmt, 0, LogicalType::Short),
                Err(DbError::TypeMismatch { .. })
            ));
            assert_eq!(read(stmt, 0, LogicalType::Int).unwrap(), Value::Int(70000));
            assert!(read(stmt, 1, LogicalType::UInt).is_err());
            assert_eq!(read(stmt, 2, LogicalType::UShort).unwrap(), Value::UShort(12));
            assert_eq!(read(stmt, 2, LogicalType::Bool).unwrap(), Value::Bool(true));
        });
    }

    #[test]
    fn test_text_rejected_by_integer_accessors() {
        with_row("SELECT 'abc'", |stmt| {
            match read(stmt, 0, LogicalType::Int) {
                Err(DbError::TypeMismatch { native, .. }) => assert_eq!(native, NativeType::Text),
                other => panic!("Expected TypeMismatch, got {:?}", other),
            }
        });
    }

    #[test]
    fn test_numbers_render_as_strings() {
        with_row("SELECT 42, 2.5", |stmt| {
            assert_eq!(read(stmt, 0, LogicalType::String).unwrap(), Value::String("42".into()));
            assert_eq!(read(stmt, 1, LogicalType::String).unwrap(), Value::String("2.5".into()));
            assert_eq!(read(stmt, 0, LogicalType::Double).unwrap(), Value::Double(42.0));
        });
    }

    #[test]
    fn test_null_policy() {
        with_row("SELECT NULL", |stmt| {
            assert_eq!(read(stmt, 0, LogicalType::String).unwrap(), Value::String(String::new()));
            assert_eq!(read(stmt, 0, LogicalType::Binary).unwrap(), Value::Binary(Vec::new()));
            assert!(matches!(
                read(stmt, 0, LogicalType::Int),
                Err(DbError::NullConversion { column: 0 })
            ));
        });
    }

    #[test]
    fn test_declared_type_checked_before_null() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (n INTEGER, s TEXT, d DATE); INSERT INTO t VALUES (NULL, NULL, NULL)",
        )
        .unwrap();
        let db = RawDb::new(&conn);
        let handles = db.prepare_all("SELECT n, s, d FROM t").unwrap();
        let stmt = &handles[0];
        assert_eq!(stmt.step().unwrap(), StepResult::Row);

        match read(stmt, 1, LogicalType::Int) {
            Err(DbError::TypeMismatch { native, .. }) => assert_eq!(native, NativeType::Text),
            other => panic!("Expected TypeMismatch, got {:?}", other),
        }
        assert_eq!(read(stmt, 0, LogicalType::String).unwrap(), Value::String(String::new()));
        assert!(matches!(
            read(stmt, 0, LogicalType::UniString),
            Err(DbError::TypeMismatch { .. })
        ));
        assert!(matches!(
            read(stmt, 0, LogicalType::Int),
            Err(DbError::NullConversion { column: 0 })
        ));
        assert!(matches!(
            read(stmt, 2, LogicalType::Int),
            Err(DbError::NullConversion { column: 2 })
        ));
    }

    #[test]
    fn test_temporal_text() {
        with_row(
            "SELECT '2024-01-05', '10:15:30.250', '2024-01-05 10:15:30', 'later'",
            |stmt| {
                assert_eq!(read(stmt, 0, LogicalType::Date).unwrap(), Value::Date(20240105));
                assert!(read(stmt, 0, LogicalType::Time).is_err());
                assert_eq!(read(stmt, 1, LogicalType::Time).unwrap(), Value::Time(101530.25));
                assert_eq!(read(stmt, 2, LogicalType::Time).unwrap(), Value::Time(101530.0));
                assert_eq!(
                    read(stmt, 2, LogicalType::DateTime).unwrap(),
                    Value::DateTime(1_704_449_730)
                );
                assert_eq!(
                    read(stmt, 0, LogicalType::DateTime).unwrap(),
                    Value::DateTime(1_704_412_800)
                );
                assert!(matches!(
                    read(stmt, 3, LogicalType::Date),
                    Err(DbError::TypeMismatch { .. })
                ));
            },
        );
    }

    #[test]
    fn test_unicode_and_binary() {
        with_row("SELECT 'héllo', x'00ff'", |stmt| {
            let expected: Vec<u16> = "héllo".encode_utf16().collect();
            assert_eq!(read(stmt, 0, LogicalType::UniString).unwrap(), Value::UniString(expected));
            assert_eq!(read(stmt, 0, LogicalType::UniChar).unwrap(), Value::UniChar(u16::from(b'h')));
            assert_eq!(read(stmt, 1, LogicalType::Binary).unwrap(), Value::Binary(vec![0, 0xff]));
            assert!(read(stmt, 1, LogicalType::String).is_err());
        });
    }

    #[test]
    fn test_bind_formats_temporal_values() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let db = RawDb::new(&conn);
        let handles = db.prepare_all("SELECT ?, ?, ?").unwrap();
        let stmt = &handles[0];
        bind(stmt, 0, &Value::Date(20240105)).unwrap();
        bind(stmt, 1, &Value::Time(101530.25)).unwrap();
        bind(stmt, 2, &Value::DateTime(1_704_449_730)).unwrap();
        assert_eq!(stmt.step().unwrap(), StepResult::Row);
        assert_eq!(stmt.column_text(0), b"2024-01-05");
        assert_eq!(stmt.column_text(1), b"10:15:30.250");
        assert_eq!(stmt.column_text(2), b"2024-01-05 10:15:30");
    }

    #[test]
    fn test_bind_rejects_ulong_overflow() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let db = RawDb::new(&conn);
        let handles = db.prepare_all("SELECT ?").unwrap();
        assert!(bind(&handles[0], 0, &Value::ULong(u64::MAX)).is_err());
        bind(&handles[0], 0, &Value::ULong(7)).unwrap();
    }
}
