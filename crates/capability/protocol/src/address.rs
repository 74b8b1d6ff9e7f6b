//! 字节地址解析与类型转换
//!
//! 面向字节流协议的通用地址语法：
//!
//! - `<start>,<length>[,<extra>]`：从 `start` 开始取 `length` 个字节，`-1` 表示取到缓冲区末尾
//! - `<byte>.<bit>`：`Bool` 类型按位取值
//!
//! `extra` 的含义取决于数据类型：`Float`/`Double` 为保留小数位（`2` 或 `0.00`），
//! 字符串类型为编码（`ascii` / `utf8` / `hex`）。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let address = ByteAddress::parse("2,4,2")?;
//! let value = address.decode(&frame, DataType::Float, EndianType::BigEndian)?;
//!
//! let mut frame = vec![0u8; 8];
//! ByteAddress::parse("0,2")?.write_into(&mut frame, &Value::Int(-2), DataType::Int16, EndianType::BigEndian)?;
//! ```

use crate::error::ProtocolError;
use domain::{DataType, EndianType, Value};

/// 小数位上限（超过后 f64 舍入已无意义）。
const MAX_DECIMALS: u32 = 15;

/// 字节区间长度。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanLength {
    Fixed(usize),
    /// `-1`：从起始位置到缓冲区末尾。
    ToEnd,
}

/// 解析后的字节地址。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ByteAddress {
    Span {
        start: usize,
        length: SpanLength,
        extra: Option<String>,
    },
    Bit {
        byte: usize,
        bit: u8,
    },
}

impl ByteAddress {
    /// 解析地址表达式。
    pub fn parse(expr: &str) -> Result<Self, ProtocolError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(ProtocolError::AddressFormat("empty address".to_string()));
        }

        if !expr.contains(',') && expr.contains('.') {
            let (byte, bit) = expr
                .split_once('.')
                .ok_or_else(|| ProtocolError::AddressFormat(expr.to_string()))?;
            let byte = parse_field::<usize>(byte, "byte", expr)?;
            let bit = parse_field::<u8>(bit, "bit", expr)?;
            if bit > 7 {
                return Err(ProtocolError::AddressFormat(format!(
                    "bit index {} out of 0..=7 in '{}'",
                    bit, expr
                )));
            }
            return Ok(ByteAddress::Bit { byte, bit });
        }

        let parts: Vec<&str> = expr.splitn(3, ',').map(str::trim).collect();
        if parts.len() < 2 {
            return Err(ProtocolError::AddressFormat(format!(
                "expected <start>,<length>[,<extra>], got '{}'",
                expr
            )));
        }
        let start = parse_field::<usize>(parts[0], "start", expr)?;
        let length = match parts[1] {
            "-1" => SpanLength::ToEnd,
            value => SpanLength::Fixed(parse_field::<usize>(value, "length", expr)?),
        };
        let extra = parts
            .get(2)
            .filter(|value| !value.is_empty())
            .map(|value| value.to_string());
        Ok(ByteAddress::Span {
            start,
            length,
            extra,
        })
    }

    /// 从缓冲区解码指定类型的值。
    pub fn decode(
        &self,
        buffer: &[u8],
        data_type: DataType,
        endian: EndianType,
    ) -> Result<Value, ProtocolError> {
        match self {
            ByteAddress::Bit { byte, bit } => {
                ensure_bool(data_type)?;
                let value = buffer.get(*byte).ok_or(ProtocolError::OutOfRange {
                    start: *byte,
                    length: 1,
                    available: buffer.len(),
                })?;
                Ok(Value::Bool((*value >> *bit) & 1 == 1))
            }
            ByteAddress::Span { extra, .. } => {
                let (start, len) = self.span(buffer.len())?;
                let bytes = &buffer[start..start + len];
                match data_type.fixed_size() {
                    Some(size) => {
                        ensure_span_fits(len, size, data_type)?;
                        let raw = reorder(&bytes[..size], endian);
                        decode_fixed(&raw, data_type, extra.as_deref())
                    }
                    None => decode_text(bytes, data_type, extra.as_deref()),
                }
            }
        }
    }

    /// 将值编码为字节（大小由数据类型或地址长度决定）。
    ///
    /// 位地址必须使用 [`ByteAddress::write_into`]，以保留同字节的其他位。
    pub fn encode(
        &self,
        value: &Value,
        data_type: DataType,
        endian: EndianType,
    ) -> Result<Vec<u8>, ProtocolError> {
        let (length, extra) = match self {
            ByteAddress::Bit { .. } => {
                return Err(ProtocolError::AddressFormat(
                    "bit addresses can only be written into an existing buffer".to_string(),
                ))
            }
            ByteAddress::Span { length, extra, .. } => (*length, extra.as_deref()),
        };

        match data_type.fixed_size() {
            Some(size) => {
                if let SpanLength::Fixed(len) = length {
                    ensure_span_fits(len, size, data_type)?;
                }
                let raw = encode_fixed(value, data_type)?;
                Ok(reorder(&raw, endian))
            }
            None => {
                let mut bytes = encode_text(value, data_type, extra)?;
                if let SpanLength::Fixed(len) = length {
                    if bytes.len() > len {
                        return Err(ProtocolError::TypeConversion(format!(
                            "encoded {} bytes exceed the {}-byte span",
                            bytes.len(),
                            len
                        )));
                    }
                    bytes.resize(len, 0);
                }
                Ok(bytes)
            }
        }
    }

    /// 将值写入缓冲区对应位置。
    pub fn write_into(
        &self,
        buffer: &mut [u8],
        value: &Value,
        data_type: DataType,
        endian: EndianType,
    ) -> Result<(), ProtocolError> {
        match self {
            ByteAddress::Bit { byte, bit } => {
                ensure_bool(data_type)?;
                let flag = value.as_bool().ok_or_else(|| conversion_error(value, data_type))?;
                let available = buffer.len();
                let target = buffer.get_mut(*byte).ok_or(ProtocolError::OutOfRange {
                    start: *byte,
                    length: 1,
                    available,
                })?;
                if flag {
                    *target |= 1u8 << *bit;
                } else {
                    *target &= !(1u8 << *bit);
                }
                Ok(())
            }
            ByteAddress::Span { start, .. } => {
                let bytes = self.encode(value, data_type, endian)?;
                let end = start + bytes.len();
                if end > buffer.len() {
                    return Err(ProtocolError::OutOfRange {
                        start: *start,
                        length: bytes.len(),
                        available: buffer.len(),
                    });
                }
                buffer[*start..end].copy_from_slice(&bytes);
                Ok(())
            }
        }
    }

    /// 计算地址在给定长度缓冲区中覆盖的 `(start, len)`。
    pub fn span(&self, available: usize) -> Result<(usize, usize), ProtocolError> {
        match self {
            ByteAddress::Bit { byte, .. } => {
                if *byte >= available {
                    return Err(ProtocolError::OutOfRange {
                        start: *byte,
                        length: 1,
                        available,
                    });
                }
                Ok((*byte, 1))
            }
            ByteAddress::Span { start, length, .. } => {
                let len = match length {
                    SpanLength::Fixed(len) => *len,
                    SpanLength::ToEnd => available.saturating_sub(*start),
                };
                if start.saturating_add(len) > available || *start > available {
                    return Err(ProtocolError::OutOfRange {
                        start: *start,
                        length: len,
                        available,
                    });
                }
                Ok((*start, len))
            }
        }
    }
}

/// 解析地址并解码。
pub fn decode(
    buffer: &[u8],
    address: &str,
    data_type: DataType,
    endian: EndianType,
) -> Result<Value, ProtocolError> {
    ByteAddress::parse(address)?.decode(buffer, data_type, endian)
}

/// 解析地址并编码。
pub fn encode(
    value: &Value,
    address: &str,
    data_type: DataType,
    endian: EndianType,
) -> Result<Vec<u8>, ProtocolError> {
    ByteAddress::parse(address)?.encode(value, data_type, endian)
}

/// 字节转十六进制字符串（大写、`-` 分隔）。
pub fn hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join("-")
}

/// 解析十六进制字符串，允许 `-`、空格或无分隔。
pub fn parse_hex(text: &str) -> Result<Vec<u8>, ProtocolError> {
    let digits: String = text
        .chars()
        .filter(|c| !matches!(c, '-' | ' ' | ':'))
        .collect();
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ProtocolError::TypeConversion(format!(
            "invalid hex digits in '{}'",
            text
        )));
    }
    if digits.len() % 2 != 0 {
        return Err(ProtocolError::TypeConversion(format!(
            "odd number of hex digits in '{}'",
            text
        )));
    }
    Ok(digits
        .as_bytes()
        .chunks(2)
        .map(|pair| (hex_nibble(pair[0]) << 4) | hex_nibble(pair[1]))
        .collect())
}

fn hex_nibble(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}

fn parse_field<T: std::str::FromStr>(
    value: &str,
    field: &str,
    expr: &str,
) -> Result<T, ProtocolError> {
    value.trim().parse::<T>().map_err(|_| {
        ProtocolError::AddressFormat(format!("invalid {} '{}' in '{}'", field, value, expr))
    })
}

fn ensure_bool(data_type: DataType) -> Result<(), ProtocolError> {
    if data_type != DataType::Bool {
        return Err(ProtocolError::AddressFormat(format!(
            "bit address requires Bool, got {}",
            data_type
        )));
    }
    Ok(())
}

fn ensure_span_fits(len: usize, size: usize, data_type: DataType) -> Result<(), ProtocolError> {
    if len < size {
        return Err(ProtocolError::TypeConversion(format!(
            "{} needs {} bytes, address spans {}",
            data_type, size, len
        )));
    }
    Ok(())
}

fn conversion_error(value: &Value, data_type: DataType) -> ProtocolError {
    ProtocolError::TypeConversion(format!("{} cannot be represented as {}", value, data_type))
}

/// 按字节序把原始字节转换为大端顺序（该变换是自反的，编码时同样适用）。
fn reorder(bytes: &[u8], endian: EndianType) -> Vec<u8> {
    match endian {
        EndianType::BigEndian => bytes.to_vec(),
        EndianType::LittleEndian => bytes.iter().rev().copied().collect(),
        EndianType::BigEndianSwap => bytes
            .chunks(2)
            .flat_map(|pair| pair.iter().rev().copied())
            .collect(),
        EndianType::LittleEndianSwap => bytes
            .chunks(2)
            .rev()
            .flat_map(|pair| pair.iter().copied())
            .collect(),
    }
}

fn array<const N: usize>(raw: &[u8]) -> Result<[u8; N], ProtocolError> {
    raw.try_into()
        .map_err(|_| ProtocolError::TypeConversion(format!("expected {} bytes, got {}", N, raw.len())))
}

fn decode_fixed(
    raw: &[u8],
    data_type: DataType,
    extra: Option<&str>,
) -> Result<Value, ProtocolError> {
    let value = match data_type {
        DataType::Bool => Value::Bool(raw[0] != 0),
        DataType::Byte => Value::UInt(u64::from(raw[0])),
        DataType::Int16 => Value::Int(i64::from(i16::from_be_bytes(array(raw)?))),
        DataType::Uint16 => Value::UInt(u64::from(u16::from_be_bytes(array(raw)?))),
        DataType::Int32 => Value::Int(i64::from(i32::from_be_bytes(array(raw)?))),
        DataType::Uint32 => Value::UInt(u64::from(u32::from_be_bytes(array(raw)?))),
        DataType::Int64 => Value::Int(i64::from_be_bytes(array(raw)?)),
        DataType::Uint64 => Value::UInt(u64::from_be_bytes(array(raw)?)),
        DataType::Float => {
            let value = f64::from(f32::from_be_bytes(array(raw)?));
            Value::Float(round_to(value, decimals(extra)?))
        }
        DataType::Double => {
            let value = f64::from_be_bytes(array(raw)?);
            Value::Float(round_to(value, decimals(extra)?))
        }
        DataType::AsciiString | DataType::Utf8String | DataType::ByteArray => {
            return decode_text(raw, data_type, extra)
        }
    };
    Ok(value)
}

fn decimals(extra: Option<&str>) -> Result<Option<u32>, ProtocolError> {
    let Some(extra) = extra else {
        return Ok(None);
    };
    let count = match extra.split_once('.') {
        // `0.00` 形式的格式掩码
        Some((_, fraction)) if fraction.chars().all(|c| c == '0' || c == '#') => {
            fraction.len() as u32
        }
        _ => extra.parse::<u32>().map_err(|_| {
            ProtocolError::AddressFormat(format!("invalid decimal places '{}'", extra))
        })?,
    };
    Ok(Some(count.min(MAX_DECIMALS)))
}

fn round_to(value: f64, decimals: Option<u32>) -> f64 {
    match decimals {
        Some(decimals) if value.is_finite() => {
            let factor = 10f64.powi(decimals as i32);
            (value * factor).round() / factor
        }
        _ => value,
    }
}

fn text_encoding(data_type: DataType, extra: Option<&str>) -> Result<&'static str, ProtocolError> {
    match extra.map(|value| value.to_ascii_lowercase()) {
        Some(value) => match value.as_str() {
            "ascii" => Ok("ascii"),
            "utf8" | "utf-8" => Ok("utf8"),
            "hex" => Ok("hex"),
            _ => Err(ProtocolError::AddressFormat(format!(
                "unknown string encoding '{}'",
                value
            ))),
        },
        None if data_type == DataType::AsciiString => Ok("ascii"),
        None => Ok("utf8"),
    }
}

fn decode_text(
    bytes: &[u8],
    data_type: DataType,
    extra: Option<&str>,
) -> Result<Value, ProtocolError> {
    if data_type == DataType::ByteArray {
        return Ok(Value::Bytes(bytes.to_vec()));
    }
    let trimmed = {
        let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |pos| pos + 1);
        &bytes[..end]
    };
    let text = match text_encoding(data_type, extra)? {
        "hex" => hex_string(bytes),
        "ascii" => trimmed
            .iter()
            .map(|b| if b.is_ascii() { *b as char } else { '?' })
            .collect(),
        _ => String::from_utf8_lossy(trimmed).into_owned(),
    };
    Ok(Value::String(text))
}

fn encode_text(
    value: &Value,
    data_type: DataType,
    extra: Option<&str>,
) -> Result<Vec<u8>, ProtocolError> {
    if data_type == DataType::ByteArray {
        return match value {
            Value::Bytes(bytes) => Ok(bytes.clone()),
            Value::String(text) => parse_hex(text),
            other => Err(conversion_error(other, data_type)),
        };
    }
    let text = match value {
        Value::Bytes(_) | Value::Null => return Err(conversion_error(value, data_type)),
        other => other.to_string(),
    };
    match text_encoding(data_type, extra)? {
        "hex" => parse_hex(&text),
        "ascii" => {
            if !text.is_ascii() {
                return Err(ProtocolError::TypeConversion(format!(
                    "'{}' is not ascii",
                    text
                )));
            }
            Ok(text.into_bytes())
        }
        _ => Ok(text.into_bytes()),
    }
}

fn encode_fixed(value: &Value, data_type: DataType) -> Result<Vec<u8>, ProtocolError> {
    let integer = || value.as_i128().ok_or_else(|| conversion_error(value, data_type));
    let bytes = match data_type {
        DataType::Bool => {
            let flag = value.as_bool().ok_or_else(|| conversion_error(value, data_type))?;
            vec![u8::from(flag)]
        }
        DataType::Byte => vec![narrow::<u8>(integer()?, value, data_type)?],
        DataType::Int16 => narrow::<i16>(integer()?, value, data_type)?
            .to_be_bytes()
            .to_vec(),
        DataType::Uint16 => narrow::<u16>(integer()?, value, data_type)?
            .to_be_bytes()
            .to_vec(),
        DataType::Int32 => narrow::<i32>(integer()?, value, data_type)?
            .to_be_bytes()
            .to_vec(),
        DataType::Uint32 => narrow::<u32>(integer()?, value, data_type)?
            .to_be_bytes()
            .to_vec(),
        DataType::Int64 => narrow::<i64>(integer()?, value, data_type)?
            .to_be_bytes()
            .to_vec(),
        DataType::Uint64 => narrow::<u64>(integer()?, value, data_type)?
            .to_be_bytes()
            .to_vec(),
        DataType::Float => {
            let number = value.as_f64().ok_or_else(|| conversion_error(value, data_type))?;
            let single = number as f32;
            if number.is_finite() && !single.is_finite() {
                return Err(conversion_error(value, data_type));
            }
            single.to_be_bytes().to_vec()
        }
        DataType::Double => value
            .as_f64()
            .ok_or_else(|| conversion_error(value, data_type))?
            .to_be_bytes()
            .to_vec(),
        DataType::AsciiString | DataType::Utf8String | DataType::ByteArray => {
            return encode_text(value, data_type, None)
        }
    };
    Ok(bytes)
}

fn narrow<T: TryFrom<i128>>(
    number: i128,
    value: &Value,
    data_type: DataType,
) -> Result<T, ProtocolError> {
    T::try_from(number).map_err(|_| conversion_error(value, data_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: [u8; 6] = [0x01, 0x02, 0x03, 0x04, 0xFF, 0xFE];

    #[test]
    fn test_parse_span_and_bit() {
        assert_eq!(
            ByteAddress::parse("16,-1").unwrap(),
            ByteAddress::Span {
                start: 16,
                length: SpanLength::ToEnd,
                extra: None
            }
        );
        assert_eq!(
            ByteAddress::parse(" 2 , 4 , 0.00 ").unwrap(),
            ByteAddress::Span {
                start: 2,
                length: SpanLength::Fixed(4),
                extra: Some("0.00".to_string())
            }
        );
        assert_eq!(
            ByteAddress::parse("22.5").unwrap(),
            ByteAddress::Bit { byte: 22, bit: 5 }
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for expr in ["", "4", "a,2", "0,x", "0,-2", "3.8", "x.1"] {
            let err = ByteAddress::parse(expr).unwrap_err();
            assert!(
                matches!(err, ProtocolError::AddressFormat(_)),
                "{} -> {:?}",
                expr,
                err
            );
        }
    }

    #[test]
    fn test_decode_integers_big_endian() {
        let be = EndianType::BigEndian;
        assert_eq!(decode(&FRAME, "0,2", DataType::Int16, be).unwrap(), Value::Int(258));
        assert_eq!(
            decode(&FRAME, "0,4", DataType::Int32, be).unwrap(),
            Value::Int(16_909_060)
        );
        assert_eq!(decode(&FRAME, "4,2", DataType::Int16, be).unwrap(), Value::Int(-2));
        assert_eq!(
            decode(&FRAME, "4,2", DataType::Uint16, be).unwrap(),
            Value::UInt(65_534)
        );
        assert_eq!(decode(&FRAME, "4,1", DataType::Byte, be).unwrap(), Value::UInt(255));
    }

    #[test]
    fn test_decode_honors_endian_variants() {
        let frame = [0x0A, 0x0B, 0x0C, 0x0D];
        let read = |endian| decode(&frame, "0,4", DataType::Uint32, endian).unwrap();
        assert_eq!(read(EndianType::BigEndian), Value::UInt(0x0A0B_0C0D));
        assert_eq!(read(EndianType::LittleEndian), Value::UInt(0x0D0C_0B0A));
        assert_eq!(read(EndianType::BigEndianSwap), Value::UInt(0x0B0A_0D0C));
        assert_eq!(read(EndianType::LittleEndianSwap), Value::UInt(0x0C0D_0A0B));
    }

    #[test]
    fn test_length_shorter_than_type_is_conversion_error() {
        let err = decode(&FRAME, "0,2", DataType::Int32, EndianType::BigEndian).unwrap_err();
        assert!(matches!(err, ProtocolError::TypeConversion(_)));
    }

    #[test]
    fn test_float_decimal_mask() {
        let frame = 2.71828f32.to_be_bytes();
        assert_eq!(
            decode(&frame, "0,4,0.00", DataType::Float, EndianType::BigEndian).unwrap(),
            Value::Float(2.72)
        );
        let err = decode(&frame, "0,4,two", DataType::Float, EndianType::BigEndian).unwrap_err();
        assert!(matches!(err, ProtocolError::AddressFormat(_)));
    }

    #[test]
    fn test_strings_and_encodings() {
        let frame = b"AB\xC3\xA9\0\0";
        let be = EndianType::BigEndian;
        assert_eq!(
            decode(frame, "0,-1", DataType::Utf8String, be).unwrap(),
            Value::String("ABé".to_string())
        );
        assert_eq!(
            decode(frame, "0,-1", DataType::AsciiString, be).unwrap(),
            Value::String("AB??".to_string())
        );
        assert_eq!(
            decode(frame, "0,3,hex", DataType::AsciiString, be).unwrap(),
            Value::String("41-42-C3".to_string())
        );
        let err = decode(frame, "0,2,ebcdic", DataType::AsciiString, be).unwrap_err();
        assert!(matches!(err, ProtocolError::AddressFormat(_)));
    }

    #[test]
    fn test_bit_write_preserves_other_bits() {
        let mut frame = [0b1000_0001u8];
        let address = ByteAddress::parse("0.3").unwrap();
        address
            .write_into(&mut frame, &Value::Bool(true), DataType::Bool, EndianType::BigEndian)
            .unwrap();
        assert_eq!(frame[0], 0b1000_1001);
        address
            .write_into(&mut frame, &Value::Bool(false), DataType::Bool, EndianType::BigEndian)
            .unwrap();
        assert_eq!(frame[0], 0b1000_0001);
        assert!(address.encode(&Value::Bool(true), DataType::Bool, EndianType::BigEndian).is_err());
    }

    #[test]
    fn test_encode_rejects_out_of_range_values() {
        let err = encode(&Value::Int(70_000), "0,2", DataType::Int16, EndianType::BigEndian)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::TypeConversion(_)));
        let err = encode(&Value::Int(-1), "0,4", DataType::Uint32, EndianType::BigEndian)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::TypeConversion(_)));
        let err = encode(
            &Value::String("too long".to_string()),
            "0,4",
            DataType::AsciiString,
            EndianType::BigEndian,
        )
        .unwrap_err();
        assert!(matches!(err, ProtocolError::TypeConversion(_)));
    }

    #[test]
    fn test_hex_helpers() {
        assert_eq!(hex_string(&[0x02, 0x01, 0xAB]), "02-01-AB");
        assert_eq!(parse_hex("02-01-ab").unwrap(), vec![0x02, 0x01, 0xAB]);
        assert_eq!(parse_hex("0201").unwrap(), vec![0x02, 0x01]);
        assert!(parse_hex("021").is_err());
    }
}
