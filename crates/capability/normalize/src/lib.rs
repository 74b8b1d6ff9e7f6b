//! 变量值规范化：读后表达式（raw → cooked）与原始值历史。
//!
//! 表达式可引用：
//!
//! - `raw`：本次读取的原始值
//! - `$pv`：上一次原始值
//! - `$ppv`：再上一次原始值
//!
//! 数值统一按浮点绑定，`raw / 10` 不会退化为整除。历史不足时 `$pv`/`$ppv` 取本次值。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let expression = Expression::compile("(raw - $pv) * 0.1")?;
//! let mut history = ValueHistory::default();
//! let cooked = expression.evaluate(&raw, &history)?;
//! history.push(raw);
//! ```

use domain::Value;
use evalexpr::{ContextWithMutableVariables, HashMapContext, Node};
use std::collections::VecDeque;

/// 历史保留的原始值个数（含本次）。
pub const HISTORY_DEPTH: usize = 3;

/// 规范化错误。
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("invalid expression '{0}': {1}")]
    Compile(String, String),
    #[error("expression error: {0}")]
    Evaluate(String),
}

/// 最近的原始值，最新的在队尾。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueHistory {
    values: VecDeque<Value>,
}

impl ValueHistory {
    pub fn push(&mut self, raw: Value) {
        if self.values.len() == HISTORY_DEPTH {
            self.values.pop_front();
        }
        self.values.push_back(raw);
    }

    /// 往前第 `back` 个值（1 = 上一次）。
    pub fn previous(&self, back: usize) -> Option<&Value> {
        self.values
            .len()
            .checked_sub(back)
            .and_then(|index| self.values.get(index))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// 已编译的读后表达式。
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    tree: Node,
}

impl Expression {
    pub fn compile(source: &str) -> Result<Self, NormalizeError> {
        let rewritten = source.replace("$ppv", "ppv").replace("$pv", "pv");
        let tree = evalexpr::build_operator_tree(&rewritten)
            .map_err(|err| NormalizeError::Compile(source.to_string(), err.to_string()))?;
        Ok(Self {
            source: source.to_string(),
            tree,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// 以本次原始值与历史求值；历史中最近的值即 `$pv`。
    pub fn evaluate(&self, raw: &Value, history: &ValueHistory) -> Result<Value, NormalizeError> {
        let pv = history.previous(1).unwrap_or(raw);
        let ppv = history.previous(2).unwrap_or(pv);

        let mut context = HashMapContext::new();
        for (name, value) in [("raw", raw), ("pv", pv), ("ppv", ppv)] {
            context
                .set_value(name.to_string(), to_eval(value))
                .map_err(|err| NormalizeError::Evaluate(err.to_string()))?;
        }
        let result = self
            .tree
            .eval_with_context(&context)
            .map_err(|err| NormalizeError::Evaluate(err.to_string()))?;
        from_eval(result)
    }
}

fn to_eval(value: &Value) -> evalexpr::Value {
    match value {
        Value::Null => evalexpr::Value::Empty,
        Value::Bool(flag) => evalexpr::Value::Boolean(*flag),
        Value::String(text) => evalexpr::Value::String(text.clone()),
        Value::Bytes(_) => evalexpr::Value::String(value.to_string()),
        numeric => numeric
            .as_f64()
            .map(evalexpr::Value::Float)
            .unwrap_or(evalexpr::Value::Empty),
    }
}

fn from_eval(value: evalexpr::Value) -> Result<Value, NormalizeError> {
    match value {
        evalexpr::Value::Float(number) if number.is_finite() => Ok(Value::Float(number)),
        evalexpr::Value::Float(number) => Err(NormalizeError::Evaluate(format!(
            "result is not finite: {}",
            number
        ))),
        evalexpr::Value::Int(number) => Ok(Value::Int(number)),
        evalexpr::Value::Boolean(flag) => Ok(Value::Bool(flag)),
        evalexpr::Value::String(text) => Ok(Value::String(text)),
        other => Err(NormalizeError::Evaluate(format!(
            "unsupported result type: {}",
            other
        ))),
    }
}
