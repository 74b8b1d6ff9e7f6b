//! 响应匹配规则
//!
//! 规则按前缀区分：
//! - `02-01`：十六进制字节前缀
//! - `regex:<pattern>`：帧按文本匹配正则
//! - `json:<path>`：帧按 JSON 解析并要求路径存在（如 `json:data.items[0].value`）

use crate::address::parse_hex;
use crate::error::ProtocolError;
use regex::Regex;

/// JSON 路径片段。
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Key(String),
    Index(usize),
}

/// 简化 JSON 路径：`a.b[0].c`，允许 `$` / `$.` 前缀。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    segments: Vec<PathSegment>,
}

impl JsonPath {
    pub fn parse(path: &str) -> Result<Self, ProtocolError> {
        let path = path.trim();
        let path = path
            .strip_prefix("$.")
            .or_else(|| path.strip_prefix('$'))
            .unwrap_or(path);
        let mut segments = Vec::new();
        for part in path.split('.').filter(|part| !part.is_empty()) {
            let (key, mut rest) = match part.find('[') {
                Some(index) => (&part[..index], &part[index..]),
                None => (part, ""),
            };
            if !key.is_empty() {
                segments.push(PathSegment::Key(key.to_string()));
            }
            while !rest.is_empty() {
                let close = rest
                    .find(']')
                    .filter(|_| rest.starts_with('['))
                    .ok_or_else(|| {
                        ProtocolError::AddressFormat(format!("invalid json path '{}'", path))
                    })?;
                let index = rest[1..close].trim().parse::<usize>().map_err(|_| {
                    ProtocolError::AddressFormat(format!("invalid json index in '{}'", path))
                })?;
                segments.push(PathSegment::Index(index));
                rest = &rest[close + 1..];
            }
        }
        Ok(Self { segments })
    }

    /// 按路径选取节点。
    pub fn select<'a>(&self, root: &'a serde_json::Value) -> Option<&'a serde_json::Value> {
        self.segments
            .iter()
            .try_fold(root, |node, segment| match segment {
                PathSegment::Key(key) => node.get(key.as_str()),
                PathSegment::Index(index) => node.get(*index),
            })
    }
}

/// 匹配结果。
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    /// 正则捕获文本或 JSON 路径选中的值；字节前缀匹配为空。
    pub parsed: Option<serde_json::Value>,
}

/// 响应匹配规则。
#[derive(Debug, Clone)]
pub enum ResponsePattern {
    BytePrefix(Vec<u8>),
    Regex(Regex),
    Json(JsonPath),
}

impl ResponsePattern {
    pub fn parse(pattern: &str) -> Result<Self, ProtocolError> {
        if let Some(expr) = pattern.strip_prefix("regex:") {
            let regex = Regex::new(expr)
                .map_err(|err| ProtocolError::ConfigParse(format!("invalid regex: {}", err)))?;
            return Ok(ResponsePattern::Regex(regex));
        }
        if let Some(path) = pattern.strip_prefix("json:") {
            return Ok(ResponsePattern::Json(JsonPath::parse(path)?));
        }
        let prefix = parse_hex(pattern.trim())
            .map_err(|err| ProtocolError::ConfigParse(format!("invalid hex pattern: {}", err)))?;
        Ok(ResponsePattern::BytePrefix(prefix))
    }

    /// 判断帧是否匹配；空的字节前缀匹配任意帧。
    pub fn matches(&self, frame: &[u8]) -> Option<PatternMatch> {
        match self {
            ResponsePattern::BytePrefix(prefix) => frame
                .starts_with(prefix)
                .then_some(PatternMatch { parsed: None }),
            ResponsePattern::Regex(regex) => {
                let text = String::from_utf8_lossy(frame);
                let captures = regex.captures(&text)?;
                let matched = captures.get(1).or_else(|| captures.get(0))?;
                Some(PatternMatch {
                    parsed: Some(serde_json::Value::String(matched.as_str().to_string())),
                })
            }
            ResponsePattern::Json(path) => {
                let document: serde_json::Value = serde_json::from_slice(frame).ok()?;
                let selected = path.select(&document)?;
                Some(PatternMatch {
                    parsed: Some(selected.clone()),
                })
            }
        }
    }
}
