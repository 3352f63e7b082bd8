//! 非流式响应的展示文本提取

use crate::client::board::RequestStatus;
use serde_json::Value;

pub const ERROR_PREFIX: &str = "Error: ";
pub const REQUEST_FAILED_PREFIX: &str = "Request failed: ";

/// 按顺序取 `error`、`choices[0].message.content`、`data`，都没有时输出整个 JSON
pub fn unwrap_response(value: &Value) -> (RequestStatus, String) {
    if let Some(error) = value.get("error").filter(|e| !is_falsy(e)) {
        return (
            RequestStatus::Errored,
            format!("{}{}", ERROR_PREFIX, value_text(error)),
        );
    }

    if let Some(first) = value
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
    {
        let content = first
            .pointer("/message/content")
            .map(value_text)
            .unwrap_or_default();
        return (RequestStatus::Complete, content);
    }

    if let Some(data) = value.get("data").filter(|d| !is_falsy(d)) {
        return (RequestStatus::Complete, value_text(data));
    }

    (RequestStatus::Complete, value.to_string())
}

/// 本地异常（网络错误、非 JSON 响应等）的展示文本
pub fn failure_text(err: impl std::fmt::Display) -> String {
    format!("{}{}", REQUEST_FAILED_PREFIX, err)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}
