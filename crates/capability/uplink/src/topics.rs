//! topic 约定。

fn join(prefix: &str, rest: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        rest.to_string()
    } else {
        format!("{}/{}", prefix, rest)
    }
}

/// MQTT topic 段中不允许出现的字符替换为 `_`。
fn segment(value: &str) -> String {
    value
        .chars()
        .map(|ch| match ch {
            '/' | '+' | '#' => '_',
            other => other,
        })
        .collect()
}

pub fn telemetry_topic(prefix: &str, device_name: &str) -> String {
    join(prefix, &format!("telemetry/{}", segment(device_name)))
}

pub fn rpc_request_filter(prefix: &str) -> String {
    join(prefix, "rpc/request/#")
}

pub fn rpc_response_topic(prefix: &str, request_id: &str) -> String {
    join(prefix, &format!("rpc/response/{}", segment(request_id)))
}

/// 从请求 topic 取出请求 ID（`rpc/request/` 之后的最后一段）。
pub fn request_id_from_topic(prefix: &str, topic: &str) -> Option<String> {
    let base = join(prefix, "rpc/request");
    let rest = topic.trim_matches('/').strip_prefix(&base)?;
    let rest = rest.strip_prefix('/')?;
    rest.split('/')
        .filter(|part| !part.is_empty())
        .next_back()
        .map(str::to_string)
}
