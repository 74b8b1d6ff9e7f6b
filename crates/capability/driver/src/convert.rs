//! 值类型转换。

use domain::{DataType, EndianType, Value};
use gw_protocol::{ByteAddress, ProtocolError};

/// 把任意值规整为目标数据类型（经字节编解码往返，规则与地址解析一致）。
pub fn coerce(value: &Value, data_type: DataType) -> Result<Value, ProtocolError> {
    let expr = match data_type.fixed_size() {
        Some(size) => format!("0,{}", size),
        None => "0,-1".to_string(),
    };
    let address = ByteAddress::parse(&expr)?;
    let bytes = address.encode(value, data_type, EndianType::BigEndian)?;
    address.decode(&bytes, data_type, EndianType::BigEndian)
}

/// JSON 节点转变量值；对象与数组保留为 JSON 文本。
pub fn json_to_value(node: &serde_json::Value) -> Value {
    match node {
        serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
            Value::String(node.to_string())
        }
        scalar => serde_json::from_value(scalar.clone()).unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_text_to_numbers() {
        assert_eq!(
            coerce(&Value::String("12.5".to_string()), DataType::Float).unwrap(),
            Value::Float(12.5)
        );
        assert_eq!(
            coerce(&Value::String("-7".to_string()), DataType::Int16).unwrap(),
            Value::Int(-7)
        );
        assert_eq!(
            coerce(&Value::Int(1), DataType::Bool).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            coerce(&Value::Float(3.5), DataType::Utf8String).unwrap(),
            Value::String("3.5".to_string())
        );
        assert!(coerce(&Value::String("12.5".to_string()), DataType::Int32).is_err());
    }

    #[test]
    fn test_json_scalars_and_containers() {
        assert_eq!(json_to_value(&serde_json::json!(4)), Value::Int(4));
        assert_eq!(json_to_value(&serde_json::json!("a")), Value::String("a".to_string()));
        assert_eq!(json_to_value(&serde_json::json!(null)), Value::Null);
        assert_eq!(
            json_to_value(&serde_json::json!({"k": 1})),
            Value::String("{\"k\":1}".to_string())
        );
    }
}
