use super::types::LogicalType;
use std::fmt;

/// A value of one logical kind, or NULL.
///
/// Dates are `YYYYMMDD`, times `HHMMSS.mmm`, datetimes UTC epoch seconds.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Short(i16),
    UShort(u16),
    Int(i32),
    UInt(u32),
    Long(i64),
    ULong(u64),
    Float(f32),
    Double(f64),
    Bool(bool),
    Char(u8),
    String(String),
    Date(i32),
    Time(f64),
    DateTime(i64),
    UniChar(u16),
    UniString(Vec<u16>),
    Binary(Vec<u8>),
}

impl Value {
    pub fn logical_type(&self) -> Option<LogicalType> {
        Some(match self {
            Value::Null => return None,
            Value::Short(_) => LogicalType::Short,
            Value::UShort(_) => LogicalType::UShort,
            Value::Int(_) => LogicalType::Int,
            Value::UInt(_) => LogicalType::UInt,
            Value::Long(_) => LogicalType::Long,
            Value::ULong(_) => LogicalType::ULong,
            Value::Float(_) => LogicalType::Float,
            Value::Double(_) => LogicalType::Double,
            Value::Bool(_) => LogicalType::Bool,
            Value::Char(_) => LogicalType::Char,
            Value::String(_) => LogicalType::String,
            Value::Date(_) => LogicalType::Date,
            Value::Time(_) => LogicalType::Time,
            Value::DateTime(_) => LogicalType::DateTime,
            Value::UniChar(_) => LogicalType::UniChar,
            Value::UniString(_) => LogicalType::UniString,
            Value::Binary(_) => LogicalType::Binary,
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The value a variable-length accessor yields for a NULL cell.
    pub fn empty_of(kind: LogicalType) -> Option<Value> {
        match kind {
            LogicalType::String => Some(Value::String(String::new())),
            LogicalType::UniString => Some(Value::UniString(Vec::new())),
            LogicalType::Binary => Some(Value::Binary(Vec::new())),
            _ => None,
        }
    }

    /// Signed integral view used by the integer encoders, `None` for other kinds.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Short(v) => Some(i128::from(*v)),
            Value::UShort(v) => Some(i128::from(*v)),
            Value::Int(v) => Some(i128::from(*v)),
            Value::UInt(v) => Some(i128::from(*v)),
            Value::Long(v) => Some(i128::from(*v)),
            Value::ULong(v) => Some(i128::from(*v)),
            Value::Bool(v) => Some(i128::from(u8::from(*v))),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Short(v) => write!(f, "{}", v),
            Value::UShort(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::UInt(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::ULong(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Char(v) => write!(f, "{}", char::from(*v)),
            Value::String(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{:08}", v),
            Value::Time(v) => write!(f, "{:010.3}", v),
            Value::DateTime(v) => write!(f, "@{}", v),
            Value::UniChar(v) => write!(f, "{}", String::from_utf16_lossy(&[*v])),
            Value::UniString(v) => write!(f, "{}", String::from_utf16_lossy(v)),
            Value::Binary(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// Marker types binding a logical kind to its Rust representation.
///
/// `rs.get::<kind::Date, _>(0)` yields the `i32` `YYYYMMDD` form while
/// `rs.get::<kind::Int, _>(0)` yields a plain `i32`.
pub mod kind {
    use super::Value;
    use crate::protocol::types::LogicalType;

    pub trait Kind {
        const TYPE: LogicalType;
        type Output;

        fn extract(value: Value) -> Option<Self::Output>;
    }

    macro_rules! logical_kind {
        ($marker:ident, $variant:ident, $out:ty) => {
            pub struct $marker;

            impl Kind for $marker {
                const TYPE: LogicalType = LogicalType::$variant;
                type Output = $out;

                fn extract(value: Value) -> Option<$out> {
                    match value {
                        Value::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        };
    }

    logical_kind!(Short, Short, i16);
    logical_kind!(UShort, UShort, u16);
    logical_kind!(Int, Int, i32);
    logical_kind!(UInt, UInt, u32);
    logical_kind!(Long, Long, i64);
    logical_kind!(ULong, ULong, u64);
    logical_kind!(Float, Float, f32);
    logical_kind!(Double, Double, f64);
    logical_kind!(Bool, Bool, bool);
    logical_kind!(Char, Char, u8);
    logical_kind!(Str, String, String);
    logical_kind!(Date, Date, i32);
    logical_kind!(Time, Time, f64);
    logical_kind!(DateTime, DateTime, i64);
    logical_kind!(UniChar, UniChar, u16);
    logical_kind!(UniString, UniString, Vec<u16>);
    logical_kind!(Binary, Binary, Vec<u8>);
}

#[cfg(test)]
mod tests {
    use super::kind::Kind;
    use super::*;

    #[test]
    fn test_logical_type_of_values() {
        assert_eq!(Value::Null.logical_type(), None);
        assert_eq!(Value::Short(1).logical_type(), Some(LogicalType::Short));
        assert_eq!(Value::Date(20240105).logical_type(), Some(LogicalType::Date));
        assert_eq!(
            Value::UniString(vec![0x41]).logical_type(),
            Some(LogicalType::UniString)
        );
    }

    #[test]
    fn test_empty_of_only_variable_length() {
        assert_eq!(
            Value::empty_of(LogicalType::String),
            Some(Value::String(String::new()))
        );
        assert_eq!(
            Value::empty_of(LogicalType::Binary),
            Some(Value::Binary(Vec::new()))
        );
        assert_eq!(Value::empty_of(LogicalType::Int), None);
        assert_eq!(Value::empty_of(LogicalType::Date), None);
    }

    #[test]
    fn test_integral_views() {
        assert_eq!(Value::UInt(u32::MAX).as_i128(), Some(i128::from(u32::MAX)));
        assert_eq!(Value::Bool(true).as_i128(), Some(1));
        assert_eq!(Value::Double(1.5).as_i128(), None);
        assert_eq!(Value::Float(0.5).as_f64(), Some(0.5));
    }

    #[test]
    fn test_kind_extract() {
        assert_eq!(kind::Date::extract(Value::Date(20240101)), Some(20240101));
        assert_eq!(kind::Int::extract(Value::Date(20240101)), None);
        assert_eq!(kind::Str::TYPE, LogicalType::String);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Date(19990102).to_string(), "19990102");
        assert_eq!(Value::Char(b'x').to_string(), "x");
        assert_eq!(Value::Binary(vec![1, 2]).to_string(), "<2 bytes>");
        assert_eq!(Value::Null.to_string(), "NULL");
    }
}
