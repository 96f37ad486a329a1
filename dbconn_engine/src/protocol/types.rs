use serde::{Deserialize, Serialize};

/// The fixed set of value kinds callers can read and bind.
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalType {
    Short = 1,
    UShort = 2,
    Int = 3,
    UInt = 4,
    Long = 5,
    ULong = 6,
    Float = 7,
    Double = 8,
    Bool = 9,
    Char = 10,
    String = 11,
    Date = 12,
    Time = 13,
    DateTime = 14,
    UniChar = 15,
    UniString = 16,
    Binary = 17,
}

impl LogicalType {
    pub const ALL: [LogicalType; 17] = [
        LogicalType::Short,
        LogicalType::UShort,
        LogicalType::Int,
        LogicalType::UInt,
        LogicalType::Long,
        LogicalType::ULong,
        LogicalType::Float,
        LogicalType::Double,
        LogicalType::Bool,
        LogicalType::Char,
        LogicalType::String,
        LogicalType::Date,
        LogicalType::Time,
        LogicalType::DateTime,
        LogicalType::UniChar,
        LogicalType::UniString,
        LogicalType::Binary,
    ];

    /// Variable-length kinds read NULL as an empty value and grow parameter slots.
    pub fn is_variable_length(self) -> bool {
        matches!(
            self,
            LogicalType::String | LogicalType::UniString | LogicalType::Binary
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            LogicalType::Short => "short",
            LogicalType::UShort => "ushort",
            LogicalType::Int => "int",
            LogicalType::UInt => "uint",
            LogicalType::Long => "long",
            LogicalType::ULong => "ulong",
            LogicalType::Float => "float",
            LogicalType::Double => "double",
            LogicalType::Bool => "bool",
            LogicalType::Char => "char",
            LogicalType::String => "string",
            LogicalType::Date => "date",
            LogicalType::Time => "time",
            LogicalType::DateTime => "datetime",
            LogicalType::UniChar => "unichar",
            LogicalType::UniString => "unistring",
            LogicalType::Binary => "binary",
        }
    }
}

/// Native column/parameter type tags reported by the engines.
///
/// The send/poll engine reports these directly; SQLite columns are mapped
/// onto them from declared type affinity and per-cell storage class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NativeType {
    TinyInt,
    SmallInt,
    USmallInt,
    Int,
    UInt,
    BigInt,
    UBigInt,
    Real,
    Float,
    Decimal,
    Numeric,
    Money,
    SmallMoney,
    Bit,
    Char,
    VarChar,
    LongChar,
    Text,
    UniChar,
    UniText,
    Binary,
    VarBinary,
    LongBinary,
    Image,
    Date,
    Time,
    DateTime,
    SmallDateTime,
    BigDateTime,
    BigTime,
    Null,
    Unknown,
}

impl NativeType {
    /// Fixed byte width of the native buffer layout, `None` for variable-length kinds.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            NativeType::TinyInt | NativeType::Bit => Some(1),
            NativeType::SmallInt | NativeType::USmallInt => Some(2),
            NativeType::Int | NativeType::UInt | NativeType::Real | NativeType::SmallMoney => {
                Some(4)
            }
            NativeType::BigInt | NativeType::UBigInt | NativeType::Float | NativeType::Money => {
                Some(8)
            }
            NativeType::Date | NativeType::Time | NativeType::SmallDateTime => Some(4),
            NativeType::DateTime | NativeType::BigDateTime | NativeType::BigTime => Some(8),
            _ => None,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            NativeType::TinyInt
                | NativeType::SmallInt
                | NativeType::USmallInt
                | NativeType::Int
                | NativeType::UInt
                | NativeType::BigInt
                | NativeType::UBigInt
        )
    }

    pub fn is_fixed_point(self) -> bool {
        matches!(
            self,
            NativeType::Decimal | NativeType::Numeric | NativeType::Money | NativeType::SmallMoney
        )
    }

    pub fn is_character(self) -> bool {
        matches!(
            self,
            NativeType::Char | NativeType::VarChar | NativeType::LongChar | NativeType::Text
        )
    }

    pub fn is_unichar(self) -> bool {
        matches!(self, NativeType::UniChar | NativeType::UniText)
    }

    pub fn is_binary(self) -> bool {
        matches!(
            self,
            NativeType::Binary | NativeType::VarBinary | NativeType::LongBinary | NativeType::Image
        )
    }

    pub fn is_temporal(self) -> bool {
        matches!(
            self,
            NativeType::Date
                | NativeType::Time
                | NativeType::DateTime
                | NativeType::SmallDateTime
                | NativeType::BigDateTime
                | NativeType::BigTime
        )
    }

    /// True when the type carries a calendar date part.
    pub fn has_date_part(self) -> bool {
        matches!(
            self,
            NativeType::Date
                | NativeType::DateTime
                | NativeType::SmallDateTime
                | NativeType::BigDateTime
        )
    }

    /// True when the type carries a time-of-day part.
    pub fn has_time_part(self) -> bool {
        matches!(
            self,
            NativeType::Time
                | NativeType::BigTime
                | NativeType::DateTime
                | NativeType::SmallDateTime
                | NativeType::BigDateTime
        )
    }

    /// Maps an ASE `syscolumns.type` / `systypes.type` code.
    pub fn from_ase_code(code: u8) -> Self {
        match code {
            48 => NativeType::TinyInt,
            52 => NativeType::SmallInt,
            65 => NativeType::USmallInt,
            56 | 38 => NativeType::Int,
            66 => NativeType::UInt,
            191 => NativeType::BigInt,
            67 => NativeType::UBigInt,
            59 => NativeType::Real,
            62 | 109 => NativeType::Float,
            55 | 106 => NativeType::Decimal,
            63 | 108 => NativeType::Numeric,
            60 | 110 => NativeType::Money,
            122 => NativeType::SmallMoney,
            50 => NativeType::Bit,
            47 => NativeType::Char,
            39 => NativeType::VarChar,
            35 => NativeType::Text,
            135 | 155 => NativeType::UniChar,
            174 => NativeType::UniText,
            45 => NativeType::Binary,
            37 => NativeType::VarBinary,
            34 => NativeType::Image,
            49 | 123 => NativeType::Date,
            51 | 147 => NativeType::Time,
            61 | 111 => NativeType::DateTime,
            58 => NativeType::SmallDateTime,
            187 => NativeType::BigDateTime,
            188 => NativeType::BigTime,
            _ => NativeType::Unknown,
        }
    }

    /// Applies SQLite's column affinity rules to a declared type.
    pub fn from_sqlite_decltype(decltype: Option<&str>) -> Self {
        let Some(decl) = decltype else {
            return NativeType::Image;
        };
        let upper = decl.to_ascii_uppercase();
        if upper.contains("INT") {
            NativeType::BigInt
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            NativeType::Text
        } else if upper.contains("BLOB") || upper.is_empty() {
            NativeType::Image
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            NativeType::Float
        } else {
            NativeType::Numeric
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_type_repr_values() {
        assert_eq!(LogicalType::Short as u16, 1);
        assert_eq!(LogicalType::Binary as u16, 17);
        assert_eq!(LogicalType::ALL.len(), 17);
    }

    #[test]
    fn test_variable_length_kinds() {
        let variable: Vec<_> = LogicalType::ALL
            .iter()
            .filter(|k| k.is_variable_length())
            .collect();
        assert_eq!(
            variable,
            vec![&LogicalType::String, &LogicalType::UniString, &LogicalType::Binary]
        );
    }

    #[test]
    fn test_fixed_width() {
        assert_eq!(NativeType::TinyInt.fixed_width(), Some(1));
        assert_eq!(NativeType::USmallInt.fixed_width(), Some(2));
        assert_eq!(NativeType::Money.fixed_width(), Some(8));
        assert_eq!(NativeType::DateTime.fixed_width(), Some(8));
        assert_eq!(NativeType::VarChar.fixed_width(), None);
        assert_eq!(NativeType::Decimal.fixed_width(), None);
    }

    #[test]
    fn test_temporal_parts() {
        assert!(NativeType::Date.has_date_part());
        assert!(!NativeType::Date.has_time_part());
        assert!(NativeType::Time.has_time_part());
        assert!(!NativeType::BigTime.has_date_part());
        assert!(NativeType::SmallDateTime.has_date_part());
        assert!(NativeType::SmallDateTime.has_time_part());
    }

    #[test]
    fn test_from_ase_code() {
        assert_eq!(NativeType::from_ase_code(56), NativeType::Int);
        assert_eq!(NativeType::from_ase_code(39), NativeType::VarChar);
        assert_eq!(NativeType::from_ase_code(187), NativeType::BigDateTime);
        assert_eq!(NativeType::from_ase_code(122), NativeType::SmallMoney);
        assert_eq!(NativeType::from_ase_code(200), NativeType::Unknown);
    }

    #[test]
    fn test_from_sqlite_decltype_affinity() {
        assert_eq!(NativeType::from_sqlite_decltype(Some("INTEGER")), NativeType::BigInt);
        assert_eq!(NativeType::from_sqlite_decltype(Some("varchar(20)")), NativeType::Text);
        assert_eq!(NativeType::from_sqlite_decltype(Some("BLOB")), NativeType::Image);
        assert_eq!(NativeType::from_sqlite_decltype(Some("double")), NativeType::Float);
        assert_eq!(NativeType::from_sqlite_decltype(Some("DATE")), NativeType::Numeric);
        assert_eq!(NativeType::from_sqlite_decltype(None), NativeType::Image);
    }
}
