//! 驱动描述与配置模式
//!
//! 每个驱动声明参数表（名称、类型、默认值、是否必填），
//! 设备提交的参数在构造驱动前按表校验并补齐默认值。

use crate::contract::AddressDefinition;
use crate::error::DriverError;
use domain::ParamValue;
use serde::Serialize;
use std::collections::BTreeMap;

/// 参数类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    String,
    Number,
    Bool,
}

/// 参数声明。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParameterKind,
    pub default: Option<ParamValue>,
    pub required: bool,
    pub description: String,
}

impl ParameterSpec {
    fn new(name: &str, kind: ParameterKind, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            default: None,
            required: false,
            description: description.to_string(),
        }
    }

    pub fn string(name: &str, description: &str) -> Self {
        Self::new(name, ParameterKind::String, description)
    }

    pub fn number(name: &str, description: &str) -> Self {
        Self::new(name, ParameterKind::Number, description)
    }

    pub fn bool(name: &str, description: &str) -> Self {
        Self::new(name, ParameterKind::Bool, description)
    }

    pub fn with_default(mut self, value: ParamValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// 按声明类型规整参数值；数值与布尔允许字符串形式。
    fn coerce(&self, value: &ParamValue) -> Result<ParamValue, DriverError> {
        let invalid = || {
            DriverError::InvalidConfig(format!(
                "parameter '{}' expects {:?}, got '{}'",
                self.name, self.kind, value
            ))
        };
        match (self.kind, value) {
            (ParameterKind::String, other) => Ok(ParamValue::String(other.to_string())),
            (ParameterKind::Number, ParamValue::Number(number)) => Ok(ParamValue::Number(*number)),
            (ParameterKind::Number, ParamValue::String(text)) => text
                .trim()
                .parse::<f64>()
                .map(ParamValue::Number)
                .map_err(|_| invalid()),
            (ParameterKind::Bool, ParamValue::Bool(flag)) => Ok(ParamValue::Bool(*flag)),
            (ParameterKind::Bool, ParamValue::String(text)) => {
                match text.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" | "on" => Ok(ParamValue::Bool(true)),
                    "false" | "0" | "off" => Ok(ParamValue::Bool(false)),
                    _ => Err(invalid()),
                }
            }
            _ => Err(invalid()),
        }
    }
}

/// 驱动元数据。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverDescriptor {
    pub type_tag: String,
    pub version: String,
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
    pub address_definitions: BTreeMap<String, AddressDefinition>,
}

impl DriverDescriptor {
    /// 校验设备参数并补齐默认值。
    pub fn validate(
        &self,
        submitted: &BTreeMap<String, ParamValue>,
    ) -> Result<DriverParams, DriverError> {
        if let Some(unknown) = submitted
            .keys()
            .find(|name| !self.parameters.iter().any(|spec| &spec.name == *name))
        {
            return Err(DriverError::InvalidConfig(format!(
                "unknown parameter '{}' for driver {}",
                unknown, self.type_tag
            )));
        }

        let mut values = BTreeMap::new();
        for spec in &self.parameters {
            match (submitted.get(&spec.name), &spec.default) {
                (Some(value), _) => {
                    values.insert(spec.name.clone(), spec.coerce(value)?);
                }
                (None, Some(default)) => {
                    values.insert(spec.name.clone(), default.clone());
                }
                (None, None) if spec.required => {
                    return Err(DriverError::InvalidConfig(format!(
                        "missing required parameter '{}' for driver {}",
                        spec.name, self.type_tag
                    )));
                }
                (None, None) => {}
            }
        }
        Ok(DriverParams { values })
    }
}

/// 校验后的驱动参数。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverParams {
    values: BTreeMap<String, ParamValue>,
}

impl DriverParams {
    fn missing(name: &str) -> DriverError {
        DriverError::InvalidConfig(format!("parameter '{}' is not set", name))
    }

    pub fn opt_str(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ParamValue::String(text)) if !text.is_empty() => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn str(&self, name: &str) -> Result<&str, DriverError> {
        self.opt_str(name).ok_or_else(|| Self::missing(name))
    }

    pub fn number(&self, name: &str) -> Result<f64, DriverError> {
        match self.values.get(name) {
            Some(ParamValue::Number(number)) => Ok(*number),
            _ => Err(Self::missing(name)),
        }
    }

    pub fn u64(&self, name: &str) -> Result<u64, DriverError> {
        let number = self.number(name)?;
        if number < 0.0 || number.fract() != 0.0 || number > u64::MAX as f64 {
            return Err(DriverError::InvalidConfig(format!(
                "parameter '{}' must be a non-negative integer, got {}",
                name, number
            )));
        }
        Ok(number as u64)
    }

    pub fn u16(&self, name: &str) -> Result<u16, DriverError> {
        let number = self.u64(name)?;
        u16::try_from(number).map_err(|_| {
            DriverError::InvalidConfig(format!("parameter '{}' out of range: {}", name, number))
        })
    }

    pub fn bool(&self, name: &str) -> Result<bool, DriverError> {
        match self.values.get(name) {
            Some(ParamValue::Bool(flag)) => Ok(*flag),
            _ => Err(Self::missing(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> DriverDescriptor {
        DriverDescriptor {
            type_tag: "Demo".to_string(),
            version: "1.0".to_string(),
            description: "demo".to_string(),
            parameters: vec![
                ParameterSpec::string("host", "peer host").required(),
                ParameterSpec::number("port", "peer port").with_default(ParamValue::Number(502.0)),
                ParameterSpec::bool("verbose", "trace frames")
                    .with_default(ParamValue::Bool(false)),
                ParameterSpec::string("tag", "optional tag"),
            ],
            address_definitions: BTreeMap::new(),
        }
    }

    fn params(pairs: &[(&str, ParamValue)]) -> BTreeMap<String, ParamValue> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_defaults_are_filled() {
        let resolved = descriptor()
            .validate(&params(&[("host", ParamValue::String("plc".to_string()))]))
            .unwrap();
        assert_eq!(resolved.str("host").unwrap(), "plc");
        assert_eq!(resolved.u16("port").unwrap(), 502);
        assert!(!resolved.bool("verbose").unwrap());
        assert_eq!(resolved.opt_str("tag"), None);
    }

    #[test]
    fn test_string_forms_are_coerced() {
        let resolved = descriptor()
            .validate(&params(&[
                ("host", ParamValue::String("plc".to_string())),
                ("port", ParamValue::String("1502".to_string())),
                ("verbose", ParamValue::String("on".to_string())),
            ]))
            .unwrap();
        assert_eq!(resolved.u16("port").unwrap(), 1502);
        assert!(resolved.bool("verbose").unwrap());
    }

    #[test]
    fn test_rejects_missing_unknown_and_mistyped() {
        let descriptor = descriptor();
        assert!(matches!(
            descriptor.validate(&BTreeMap::new()),
            Err(DriverError::InvalidConfig(_))
        ));
        assert!(matches!(
            descriptor.validate(&params(&[
                ("host", ParamValue::String("plc".to_string())),
                ("hots", ParamValue::String("typo".to_string())),
            ])),
            Err(DriverError::InvalidConfig(_))
        ));
        assert!(matches!(
            descriptor.validate(&params(&[
                ("host", ParamValue::String("plc".to_string())),
                ("verbose", ParamValue::Number(1.0)),
            ])),
            Err(DriverError::InvalidConfig(_))
        ));
        let resolved = descriptor
            .validate(&params(&[
                ("host", ParamValue::String("plc".to_string())),
                ("port", ParamValue::Number(70000.0)),
            ]))
            .unwrap();
        assert!(resolved.u16("port").is_err());
    }
}
