//! Fixed-point conversions shared by the read and bind paths.
//!
//! DECIMAL/NUMERIC buffers hold ASCII decimal text; MONEY and SMALLMONEY hold
//! integers scaled by 10 000. Reads go through an `f64` intermediate.

use crate::error::{DbError, Result};
use crate::protocol::types::{LogicalType, NativeType};

pub const MONEY_SCALE: f64 = 10_000.0;

/// Decodes a fixed-point buffer to `f64`.
pub fn fixed_to_f64(native: NativeType, bytes: &[u8], requested: LogicalType) -> Result<f64> {
    match native {
        NativeType::Decimal | NativeType::Numeric => {
            let text = std::str::from_utf8(bytes)
                .map_err(|_| DbError::mismatch_with(requested, native, "decimal is not ASCII"))?;
            text.trim()
                .parse::<f64>()
                .map_err(|_| DbError::mismatch_with(requested, native, format!("bad decimal '{}'", text.trim())))
        }
        NativeType::Money => {
            let raw = read_le::<8>(bytes, requested, native)?;
            Ok(i64::from_le_bytes(raw) as f64 / MONEY_SCALE)
        }
        NativeType::SmallMoney => {
            let raw = read_le::<4>(bytes, requested, native)?;
            Ok(f64::from(i32::from_le_bytes(raw)) / MONEY_SCALE)
        }
        other => Err(DbError::mismatch(requested, other)),
    }
}

/// Renders `value` as decimal text with exactly `scale` fractional digits.
pub fn f64_to_decimal_text(value: f64, precision: u8, scale: u8, requested: LogicalType, native: NativeType) -> Result<String> {
    if !value.is_finite() {
        return Err(DbError::mismatch_with(requested, native, "value is not finite"));
    }
    let text = format!("{:.*}", scale as usize, value);
    check_precision(&text, precision, requested, native)?;
    Ok(text)
}

/// Renders an integer as decimal text at `scale`.
pub fn int_to_decimal_text(value: i128, precision: u8, scale: u8, requested: LogicalType, native: NativeType) -> Result<String> {
    let mut text = value.to_string();
    if scale > 0 {
        text.push('.');
        text.extend(std::iter::repeat('0').take(scale as usize));
    }
    check_precision(&text, precision, requested, native)?;
    Ok(text)
}

fn check_precision(text: &str, precision: u8, requested: LogicalType, native: NativeType) -> Result<()> {
    if precision == 0 {
        return Ok(());
    }
    let digits = text.chars().filter(|c| c.is_ascii_digit()).count();
    if digits > precision as usize {
        return Err(DbError::mismatch_with(
            requested,
            native,
            format!("{} digits exceed precision {}", digits, precision),
        ));
    }
    Ok(())
}

/// Encodes `value` as MONEY (8 bytes) or SMALLMONEY (4 bytes).
pub fn f64_to_money(value: f64, native: NativeType, requested: LogicalType) -> Result<Vec<u8>> {
    let scaled = (value * MONEY_SCALE).round();
    match native {
        NativeType::Money => {
            if !scaled.is_finite() || scaled < i64::MIN as f64 || scaled > i64::MAX as f64 {
                return Err(DbError::mismatch_with(requested, native, "money out of range"));
            }
            Ok((scaled as i64).to_le_bytes().to_vec())
        }
        NativeType::SmallMoney => {
            if !scaled.is_finite() || scaled < f64::from(i32::MIN) || scaled > f64::from(i32::MAX) {
                return Err(DbError::mismatch_with(requested, native, "smallmoney out of range"));
            }
            Ok((scaled as i32).to_le_bytes().to_vec())
        }
        other => Err(DbError::mismatch(requested, other)),
    }
}

pub(crate) fn read_le<const N: usize>(bytes: &[u8], requested: LogicalType, native: NativeType) -> Result<[u8; N]> {
    bytes
        .get(..N)
        .and_then(|b| <[u8; N]>::try_from(b).ok())
        .ok_or_else(|| {
            DbError::mismatch_with(
                requested,
                native,
                format!("buffer holds {} byte(s), expected {}", bytes.len(), N),
            )
        })
}
