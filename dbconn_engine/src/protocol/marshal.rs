//! Conversion between native value buffers and logical values.

use super::buffer::{ParamSlot, ValueBuffer};
use super::datetime::{self, DateRec};
use super::descriptor::ColumnDescriptor;
use super::numeric::{self, read_le};
use super::types::{LogicalType, NativeType};
use super::value::Value;
use crate::error::{DbError, Result};

/// Whether `get_<kind>` may read a column of this native type.
pub fn accepts(kind: LogicalType, column: &ColumnDescriptor) -> bool {
    use NativeType as N;
    let native = column.native_type;
    match kind {
        LogicalType::Short => matches!(native, N::TinyInt | N::SmallInt),
        LogicalType::UShort => matches!(native, N::TinyInt | N::USmallInt),
        LogicalType::Int => matches!(native, N::TinyInt | N::SmallInt | N::USmallInt | N::Int),
        LogicalType::UInt => matches!(native, N::TinyInt | N::USmallInt | N::UInt),
        LogicalType::Long => matches!(
            native,
            N::TinyInt | N::SmallInt | N::USmallInt | N::Int | N::UInt | N::BigInt | N::Decimal | N::Numeric
        ),
        LogicalType::ULong => matches!(
            native,
            N::TinyInt | N::USmallInt | N::UInt | N::UBigInt | N::Decimal | N::Numeric
        ),
        LogicalType::Float => {
            native == N::Real || (native == N::Float && column.max_length <= 4)
        }
        LogicalType::Double => native == N::Real || native == N::Float || native.is_fixed_point(),
        LogicalType::Bool => native == N::Bit,
        LogicalType::Char | LogicalType::String => native.is_character(),
        LogicalType::UniChar | LogicalType::UniString => native.is_unichar(),
        LogicalType::Binary => native.is_binary(),
        LogicalType::Date | LogicalType::DateTime => native.has_date_part(),
        LogicalType::Time => native.has_time_part(),
    }
}

/// Reads one cell of the visible row as `kind`.
///
/// Type compatibility is checked before NULL: a NULL in an incompatible
/// column is still a mismatch.
pub fn decode(column: &ColumnDescriptor, buffer: &ValueBuffer, kind: LogicalType, index: usize) -> Result<Value> {
    if !accepts(kind, column) {
        return Err(DbError::mismatch(kind, column.native_type));
    }
    if buffer.is_null() {
        return Value::empty_of(kind).ok_or(DbError::NullConversion { column: index });
    }
    decode_bytes(column.native_type, buffer.bytes(), kind)
}

fn decode_bytes(native: NativeType, bytes: &[u8], kind: LogicalType) -> Result<Value> {
    let out_of_range = |v: i128| DbError::mismatch_with(kind, native, format!("value {} out of range", v));
    Ok(match kind {
        LogicalType::Short => {
            let v = read_integer(native, bytes, kind)?;
            Value::Short(i16::try_from(v).map_err(|_| out_of_range(v))?)
        }
        LogicalType::UShort => {
            let v = read_integer(native, bytes, kind)?;
            Value::UShort(u16::try_from(v).map_err(|_| out_of_range(v))?)
        }
        LogicalType::Int => {
            let v = read_integer(native, bytes, kind)?;
            Value::Int(i32::try_from(v).map_err(|_| out_of_range(v))?)
        }
        LogicalType::UInt => {
            let v = read_integer(native, bytes, kind)?;
            Value::UInt(u32::try_from(v).map_err(|_| out_of_range(v))?)
        }
        LogicalType::Long => {
            let v = if native.is_fixed_point() {
                numeric::fixed_to_f64(native, bytes, kind)?.trunc() as i128
            } else {
                read_integer(native, bytes, kind)?
            };
            Value::Long(i64::try_from(v).map_err(|_| out_of_range(v))?)
        }
        LogicalType::ULong => {
            let v = if native.is_fixed_point() {
                numeric::fixed_to_f64(native, bytes, kind)?.trunc() as i128
            } else {
                read_integer(native, bytes, kind)?
            };
            Value::ULong(u64::try_from(v).map_err(|_| out_of_range(v))?)
        }
        LogicalType::Float => Value::Float(read_float(native, bytes, kind)? as f32),
        LogicalType::Double => {
            if native.is_fixed_point() {
                Value::Double(numeric::fixed_to_f64(native, bytes, kind)?)
            } else {
                Value::Double(read_float(native, bytes, kind)?)
            }
        }
        LogicalType::Bool => Value::Bool(bytes.first().copied().unwrap_or(0) != 0),
        LogicalType::Char => Value::Char(bytes.first().copied().unwrap_or(0)),
        LogicalType::String => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        LogicalType::UniChar => Value::UniChar(utf16_units(bytes).first().copied().unwrap_or(0)),
        LogicalType::UniString => Value::UniString(utf16_units(bytes)),
        LogicalType::Binary => Value::Binary(bytes.to_vec()),
        LogicalType::Date => Value::Date(datetime::crack(native, bytes, kind)?.date_value()),
        LogicalType::Time => Value::Time(datetime::crack(native, bytes, kind)?.time_value()),
        LogicalType::DateTime => {
            Value::DateTime(datetime::crack(native, bytes, kind)?.epoch_seconds()?)
        }
    })
}

fn read_integer(native: NativeType, bytes: &[u8], kind: LogicalType) -> Result<i128> {
    Ok(match native {
        NativeType::TinyInt | NativeType::Bit => i128::from(read_le::<1>(bytes, kind, native)?[0]),
        NativeType::SmallInt => i128::from(i16::from_le_bytes(read_le::<2>(bytes, kind, native)?)),
        NativeType::USmallInt => i128::from(u16::from_le_bytes(read_le::<2>(bytes, kind, native)?)),
        NativeType::Int => i128::from(i32::from_le_bytes(read_le::<4>(bytes, kind, native)?)),
        NativeType::UInt => i128::from(u32::from_le_bytes(read_le::<4>(bytes, kind, native)?)),
        NativeType::BigInt => i128::from(i64::from_le_bytes(read_le::<8>(bytes, kind, native)?)),
        NativeType::UBigInt => i128::from(u64::from_le_bytes(read_le::<8>(bytes, kind, native)?)),
        other => return Err(DbError::mismatch(kind, other)),
    })
}

fn read_float(native: NativeType, bytes: &[u8], kind: LogicalType) -> Result<f64> {
    match native {
        NativeType::Real => Ok(f64::from(f32::from_le_bytes(read_le::<4>(bytes, kind, native)?))),
        NativeType::Float if bytes.len() == 4 => {
            Ok(f64::from(f32::from_le_bytes(read_le::<4>(bytes, kind, native)?)))
        }
        NativeType::Float => Ok(f64::from_le_bytes(read_le::<8>(bytes, kind, native)?)),
        other => Err(DbError::mismatch(kind, other)),
    }
}

fn utf16_units(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Encodes `value` into the native layout described by `column`.
///
/// Returns `None` for NULL. Capacity is not checked here.
pub fn encode_value(column: &ColumnDescriptor, value: &Value) -> Result<Option<Vec<u8>>> {
    let Some(kind) = value.logical_type() else {
        return Ok(None);
    };
    let native = column.native_type;
    let mismatch = || DbError::mismatch(kind, native);

    let bytes = match value {
        Value::Null => return Ok(None),
        Value::Float(_) | Value::Double(_) => {
            let v = value.as_f64().unwrap_or_default();
            match native {
                NativeType::Real => (v as f32).to_le_bytes().to_vec(),
                NativeType::Float => encode_float(column, v),
                NativeType::Decimal | NativeType::Numeric => {
                    numeric::f64_to_decimal_text(v, column.precision, column.scale, kind, native)?
                        .into_bytes()
                }
                NativeType::Money | NativeType::SmallMoney => numeric::f64_to_money(v, native, kind)?,
                _ => return Err(mismatch()),
            }
        }
        Value::Short(_)
        | Value::UShort(_)
        | Value::Int(_)
        | Value::UInt(_)
        | Value::Long(_)
        | Value::ULong(_)
        | Value::Bool(_) => {
            let v = value.as_i128().unwrap_or_default();
            encode_integral(column, v, kind)?
        }
        Value::Char(c) if native.is_character() => vec![*c],
        Value::String(s) if native.is_character() => s.as_bytes().to_vec(),
        Value::UniChar(u) if native.is_unichar() => u.to_le_bytes().to_vec(),
        Value::UniString(units) if native.is_unichar() => {
            units.iter().flat_map(|u| u.to_le_bytes()).collect()
        }
        Value::Binary(b) if native.is_binary() => b.clone(),
        Value::Date(d) if native.has_date_part() => {
            datetime::pack(native, &DateRec::from_date_value(*d)?, kind)?
        }
        Value::Time(t) if native.has_time_part() => {
            datetime::pack(native, &DateRec::from_time_value(*t)?, kind)?
        }
        Value::DateTime(e) if native.has_date_part() => {
            datetime::pack(native, &DateRec::from_epoch(*e)?, kind)?
        }
        _ => return Err(mismatch()),
    };
    Ok(Some(bytes))
}

fn encode_float(column: &ColumnDescriptor, v: f64) -> Vec<u8> {
    if column.max_length == 4 {
        (v as f32).to_le_bytes().to_vec()
    } else {
        v.to_le_bytes().to_vec()
    }
}

fn encode_integral(column: &ColumnDescriptor, v: i128, kind: LogicalType) -> Result<Vec<u8>> {
    let native = column.native_type;
    let out_of_range = || DbError::mismatch_with(kind, native, format!("value {} out of range", v));
    Ok(match native {
        NativeType::TinyInt => vec![u8::try_from(v).map_err(|_| out_of_range())?],
        NativeType::Bit => match v {
            0 | 1 => vec![v as u8],
            _ => return Err(out_of_range()),
        },
        NativeType::SmallInt => i16::try_from(v).map_err(|_| out_of_range())?.to_le_bytes().to_vec(),
        NativeType::USmallInt => u16::try_from(v).map_err(|_| out_of_range())?.to_le_bytes().to_vec(),
        NativeType::Int => i32::try_from(v).map_err(|_| out_of_range())?.to_le_bytes().to_vec(),
        NativeType::UInt => u32::try_from(v).map_err(|_| out_of_range())?.to_le_bytes().to_vec(),
        NativeType::BigInt => i64::try_from(v).map_err(|_| out_of_range())?.to_le_bytes().to_vec(),
        NativeType::UBigInt => u64::try_from(v).map_err(|_| out_of_range())?.to_le_bytes().to_vec(),
        NativeType::Decimal | NativeType::Numeric => {
            numeric::int_to_decimal_text(v, column.precision, column.scale, kind, native)?.into_bytes()
        }
        NativeType::Money | NativeType::SmallMoney => numeric::f64_to_money(v as f64, native, kind)?,
        NativeType::Real => (v as f32).to_le_bytes().to_vec(),
        NativeType::Float => encode_float(column, v as f64),
        _ => return Err(DbError::mismatch(kind, native)),
    })
}

/// Binds `value` into a parameter slot.
///
/// Variable-length kinds grow the slot; everything else must fit the
/// declared maximum.
pub fn encode(slot: &mut ParamSlot, value: &Value) -> Result<()> {
    let Some(bytes) = encode_value(&slot.descriptor.column, value)? else {
        slot.buffer.set_null();
        return Ok(());
    };
    let native = slot.descriptor.native_type();
    let limit = match native.fixed_width() {
        Some(width) => width.max(slot.max_length()),
        None => slot.max_length(),
    };
    if bytes.len() > limit {
        let kind = value.logical_type().unwrap_or(LogicalType::Binary);
        if !kind.is_variable_length() {
            return Err(DbError::mismatch_with(
                kind,
                native,
                format!(
                    "value of {} byte(s) exceeds parameter capacity {}",
                    bytes.len(),
                    limit
                ),
            ));
        }
        slot.descriptor.column.max_length = bytes.len();
        slot.buffer.fill_growing(&bytes);
        return Ok(());
    }
    slot.buffer.fill_growing(&bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::descriptor::ParamDescriptor;

    fn col(native: NativeType, len: usize) -> ColumnDescriptor {
        ColumnDescriptor::new("c", native, len)
    }

    fn buffer_with(column: &ColumnDescriptor, value: Value) -> ValueBuffer {
        let mut buf = ValueBuffer::for_column(column);
        match encode_value(column, &value).unwrap() {
            Some(bytes) => buf.fill_growing(&bytes),
            None => buf.set_null(),
        }
        buf
    }

    #[test]
    fn test_uint_rejects_native_int() {
        assert!(accepts(LogicalType::UInt, &col(NativeType::TinyInt, 1)));
        assert!(accepts(LogicalType::UInt, &col(NativeType::USmallInt, 2)));
        assert!(accepts(LogicalType::UInt, &col(NativeType::UInt, 4)));
        assert!(!accepts(LogicalType::UInt, &col(NativeType::Int, 4)));
        assert!(!accepts(LogicalType::UInt, &col(NativeType::SmallInt, 2)));
    }

    #[test]
    fn test_integer_acceptance_table() {
        assert!(accepts(LogicalType::Short, &col(NativeType::SmallInt, 2)));
        assert!(!accepts(LogicalType::Short, &col(NativeType::USmallInt, 2)));
        assert!(accepts(LogicalType::Int, &col(NativeType::USmallInt, 2)));
        assert!(!accepts(LogicalType::Int, &col(NativeType::UInt, 4)));
        assert!(accepts(LogicalType::Long, &col(NativeType::Numeric, 20)));
        assert!(!accepts(LogicalType::Long, &col(NativeType::UBigInt, 8)));
        assert!(accepts(LogicalType::ULong, &col(NativeType::UBigInt, 8)));
        assert!(!accepts(LogicalType::ULong, &col(NativeType::BigInt, 8)));
    }

    #[test]
    fn test_float_family_acceptance() {
        assert!(accepts(LogicalType::Float, &col(NativeType::Real, 4)));
        assert!(accepts(LogicalType::Float, &col(NativeType::Float, 4)));
        assert!(!accepts(LogicalType::Float, &col(NativeType::Float, 8)));
        assert!(accepts(LogicalType::Double, &col(NativeType::Money, 8)));
        assert!(accepts(LogicalType::Double, &col(NativeType::Decimal, 20)));
        assert!(!accepts(LogicalType::Double, &col(NativeType::Int, 4)));
    }

    #[test]
    fn test_temporal_acceptance() {
        assert!(!accepts(LogicalType::Date, &col(NativeType::Time, 4)));
        assert!(!accepts(LogicalType::DateTime, &col(NativeType::BigTime, 8)));
        assert!(!accepts(LogicalType::Time, &col(NativeType::Date, 4)));
        assert!(accepts(LogicalType::Time, &col(NativeType::DateTime, 8)));
        assert!(accepts(LogicalType::Date, &col(NativeType::BigDateTime, 8)));
    }

    #[test]
    fn test_get_int_on_text_is_type_mismatch() {
        let c = col(NativeType::VarChar, 10);
        let buf = buffer_with(&c, Value::String("42".to_string()));
        let err = decode(&c, &buf, LogicalType::Int, 0).unwrap_err();
        assert!(matches!(err, DbError::TypeMismatch { .. }));
    }

    #[test]
    fn test_null_policy() {
        let c = col(NativeType::Int, 4);
        let mut buf = ValueBuffer::for_column(&c);
        buf.set_null();
        assert!(matches!(
            decode(&c, &buf, LogicalType::Int, 3),
            Err(DbError::NullConversion { column: 3 })
        ));

        let t = col(NativeType::VarChar, 10);
        let mut buf = ValueBuffer::for_column(&t);
        buf.set_null();
        assert_eq!(
            decode(&t, &buf, LogicalType::String, 0).unwrap(),
            Value::String(String::new())
        );
        assert!(matches!(
            decode(&t, &buf, LogicalType::Int, 0),
            Err(DbError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_widening_reads() {
        let c = col(NativeType::TinyInt, 1);
        let buf = buffer_with(&c, Value::Short(200));
        assert_eq!(decode(&c, &buf, LogicalType::Int, 0).unwrap(), Value::Int(200));
        assert_eq!(decode(&c, &buf, LogicalType::ULong, 0).unwrap(), Value::ULong(200));

        let c = col(NativeType::UInt, 4);
        let buf = buffer_with(&c, Value::UInt(u32::MAX));
        assert_eq!(
            decode(&c, &buf, LogicalType::Long, 0).unwrap(),
            Value::Long(i64::from(u32::MAX))
        );
    }

    #[test]
    fn test_decimal_through_double() {
        let c = col(NativeType::Numeric, 20).with_precision(18, 8);
        let buf = buffer_with(&c, Value::Double(1234.5678));
        assert_eq!(decode(&c, &buf, LogicalType::Long, 0).unwrap(), Value::Long(1234));
        match decode(&c, &buf, LogicalType::Double, 0).unwrap() {
            Value::Double(v) => assert!((v - 1234.5678).abs() < 1e-9),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_negative_decimal_as_ulong_is_rejected() {
        let c = col(NativeType::Decimal, 20).with_precision(10, 0);
        let buf = buffer_with(&c, Value::Long(-5));
        assert!(decode(&c, &buf, LogicalType::ULong, 0).is_err());
    }

    #[test]
    fn test_float_column_of_four_bytes() {
        let c = col(NativeType::Float, 4);
        let buf = buffer_with(&c, Value::Float(1.5));
        assert_eq!(buf.len(), 4);
        assert_eq!(decode(&c, &buf, LogicalType::Float, 0).unwrap(), Value::Float(1.5));
        assert_eq!(decode(&c, &buf, LogicalType::Double, 0).unwrap(), Value::Double(1.5));
    }

    #[test]
    fn test_unichar_and_binary() {
        let c = col(NativeType::UniChar, 20);
        let units: Vec<u16> = "héllo".encode_utf16().collect();
        let buf = buffer_with(&c, Value::UniString(units.clone()));
        assert_eq!(
            decode(&c, &buf, LogicalType::UniString, 0).unwrap(),
            Value::UniString(units)
        );
        assert_eq!(
            decode(&c, &buf, LogicalType::UniChar, 0).unwrap(),
            Value::UniChar(u16::from(b'h'))
        );

        let b = col(NativeType::Image, 16);
        let buf = buffer_with(&b, Value::Binary(vec![0, 1, 255]));
        assert_eq!(
            decode(&b, &buf, LogicalType::Binary, 0).unwrap(),
            Value::Binary(vec![0, 1, 255])
        );
    }

    #[test]
    fn test_datetime_reads() {
        let c = col(NativeType::DateTime, 8);
        let buf = buffer_with(&c, Value::DateTime(1_000_000_000));
        assert_eq!(decode(&c, &buf, LogicalType::Date, 0).unwrap(), Value::Date(20010909));
        assert_eq!(
            decode(&c, &buf, LogicalType::DateTime, 0).unwrap(),
            Value::DateTime(1_000_000_000)
        );
        match decode(&c, &buf, LogicalType::Time, 0).unwrap() {
            Value::Time(t) => assert!((t - 14640.0).abs() < 1e-9),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_encode_rejects_incompatible_slot() {
        let mut slot = ParamSlot::new(ParamDescriptor::input("@d", NativeType::Time, 4));
        assert!(matches!(
            encode(&mut slot, &Value::Date(20240101)),
            Err(DbError::TypeMismatch { .. })
        ));
        let mut slot = ParamSlot::new(ParamDescriptor::input("@s", NativeType::Int, 4));
        assert!(encode(&mut slot, &Value::String("x".to_string())).is_err());
    }

    #[test]
    fn test_encode_range_checks_narrow_slots() {
        let mut slot = ParamSlot::new(ParamDescriptor::input("@t", NativeType::TinyInt, 1));
        assert!(encode(&mut slot, &Value::Short(1)).is_ok());
        assert_eq!(slot.buffer.bytes(), &[1]);
        assert!(encode(&mut slot, &Value::Int(300)).is_err());
        assert!(encode(&mut slot, &Value::Short(-1)).is_err());
    }

    #[test]
    fn test_encode_grows_variable_length() {
        let mut slot = ParamSlot::new(ParamDescriptor::input("@s", NativeType::VarChar, 4));
        encode(&mut slot, &Value::String("longer than four".to_string())).unwrap();
        assert_eq!(slot.buffer.bytes(), b"longer than four");
        assert_eq!(slot.max_length(), 16);
    }

    #[test]
    fn test_encode_rejects_oversized_fixed_kind() {
        let column = ColumnDescriptor::new("@n", NativeType::Numeric, 6).with_precision(0, 2);
        let mut slot = ParamSlot::new(ParamDescriptor::new(
            column,
            crate::protocol::descriptor::ParamDirection::In,
        ));
        assert!(encode(&mut slot, &Value::Long(42)).is_ok());
        assert!(matches!(
            encode(&mut slot, &Value::Long(123456789)),
            Err(DbError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_encode_null_keeps_storage() {
        let mut slot = ParamSlot::new(ParamDescriptor::input("@i", NativeType::Int, 4));
        encode(&mut slot, &Value::Int(7)).unwrap();
        encode(&mut slot, &Value::Null).unwrap();
        assert!(slot.buffer.is_null());
        assert_eq!(slot.buffer.capacity(), 4);
    }
}
