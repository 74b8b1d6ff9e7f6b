use serde::{Deserialize, Serialize};
use std::fmt;

/// 变量值。
///
/// 反序列化时按 JSON 原生类型匹配：整数优先落到 `Int`，超出 i64 的正整数落到 `UInt`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// 数值视图；布尔按 0/1 处理，字符串尝试解析。
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::String(v) => v.trim().parse::<f64>().ok(),
            Value::Null | Value::Bytes(_) => None,
        }
    }

    /// 整数视图；浮点仅在没有小数部分时转换。
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Bool(v) => Some(i128::from(*v)),
            Value::Int(v) => Some(i128::from(*v)),
            Value::UInt(v) => Some(i128::from(*v)),
            Value::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i128),
            Value::String(v) => {
                let text = v.trim();
                if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                    i128::from_str_radix(hex, 16).ok()
                } else {
                    text.parse::<i128>().ok()
                }
            }
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::Int(v) => Some(*v != 0),
            Value::UInt(v) => Some(*v != 0),
            Value::Float(v) => Some(*v != 0.0),
            Value::String(v) => match v.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "on" => Some(true),
                "false" | "0" | "off" => Some(false),
                _ => None,
            },
            Value::Null | Value::Bytes(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::UInt(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Bytes(v) => {
                let parts: Vec<String> = v.iter().map(|b| format!("{:02X}", b)).collect();
                write!(f, "{}", parts.join("-"))
            }
        }
    }
}

/// 变量数据类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Byte,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float,
    Double,
    AsciiString,
    Utf8String,
    ByteArray,
}

impl DataType {
    /// 定长类型占用的字节数；字符串与字节数组返回 `None`。
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            DataType::Bool | DataType::Byte => Some(1),
            DataType::Int16 | DataType::Uint16 => Some(2),
            DataType::Int32 | DataType::Uint32 | DataType::Float => Some(4),
            DataType::Int64 | DataType::Uint64 | DataType::Double => Some(8),
            DataType::AsciiString | DataType::Utf8String | DataType::ByteArray => None,
        }
    }

    pub fn is_string(self) -> bool {
        matches!(self, DataType::AsciiString | DataType::Utf8String)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// 多字节数值的字节序。
///
/// `BigEndianSwap` 为 BADC（字内字节交换），`LittleEndianSwap` 为 CDAB（字序反转）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EndianType {
    #[default]
    BigEndian,
    LittleEndian,
    BigEndianSwap,
    LittleEndianSwap,
}

/// 变量读写权限。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ProtectType {
    #[default]
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl ProtectType {
    pub fn readable(self) -> bool {
        !matches!(self, ProtectType::WriteOnly)
    }

    pub fn writable(self) -> bool {
        !matches!(self, ProtectType::ReadOnly)
    }
}

/// 采样质量。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusType {
    Good,
    Bad,
    Uncertain,
}

impl fmt::Display for StatusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// 变量最近一次采样。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub value: Value,
    pub cooked_value: Value,
    pub status: StatusType,
    pub timestamp_ms: i64,
    pub message: Option<String>,
}

impl Sample {
    /// 运行时启动后、首次轮询前的占位采样。
    pub fn pending() -> Self {
        Self {
            value: Value::Null,
            cooked_value: Value::Null,
            status: StatusType::Bad,
            timestamp_ms: 0,
            message: Some("not yet polled".to_string()),
        }
    }
}
