use crate::data::{DataType, EndianType, ProtectType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 驱动配置参数值（字符串 / 数值 / 布尔）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Number(v) => write!(f, "{}", v),
            ParamValue::String(v) => write!(f, "{}", v),
        }
    }
}

/// 设备节点类型：分组只用于界面组织，不参与采集。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    #[default]
    Device,
    Group,
}

/// 设备配置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub kind: DeviceKind,
    /// 驱动类型标签。
    #[serde(default)]
    pub driver: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamValue>,
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,
    /// 同一变量两次轮询的最小间隔（毫秒）。
    #[serde(default = "default_min_period_ms")]
    pub min_period_ms: u64,
    /// 同一周期内相邻变量读取之间的间隔（毫秒）。
    #[serde(default)]
    pub cmd_period_ms: u64,
    #[serde(default)]
    pub variables: Vec<VariableConfig>,
}

fn default_auto_start() -> bool {
    true
}

fn default_min_period_ms() -> u64 {
    1000
}

impl DeviceConfig {
    /// 以默认调度参数创建设备（无参数、无变量）。
    pub fn new(id: impl Into<String>, name: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            parent_id: None,
            kind: DeviceKind::Device,
            driver: driver.into(),
            parameters: BTreeMap::new(),
            auto_start: default_auto_start(),
            min_period_ms: default_min_period_ms(),
            cmd_period_ms: 0,
            variables: Vec::new(),
        }
    }

    /// 是否应由网关维持在线采集。
    pub fn is_runnable(&self) -> bool {
        self.kind == DeviceKind::Device && self.auto_start
    }

    pub fn variable(&self, name: &str) -> Option<&VariableConfig> {
        self.variables.iter().find(|variable| variable.name == name)
    }

    /// 是否有变量以 `alias` 作为上报设备名。
    pub fn has_alias(&self, alias: &str) -> bool {
        !alias.is_empty()
            && self
                .variables
                .iter()
                .any(|variable| variable.alias.as_deref() == Some(alias))
    }

    /// 按请求寻址的设备名查找变量：设备 ID 查全部变量，别名只查该别名下的变量。
    pub fn addressed_variable(&self, addressed: &str, name: &str) -> Option<&VariableConfig> {
        if addressed == self.id {
            return self.variable(name);
        }
        self.variables
            .iter()
            .find(|variable| variable.name == name && variable.alias.as_deref() == Some(addressed))
    }
}

/// 设备变量配置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableConfig {
    pub name: String,
    pub address: String,
    pub data_type: DataType,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub endian: EndianType,
    #[serde(default)]
    pub protect: ProtectType,
    /// 事件驱动变量：不参与轮询，由驱动事件更新。
    #[serde(default)]
    pub is_trigger: bool,
    /// 读后表达式，可引用 `raw`、`$pv`、`$ppv`。
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}
