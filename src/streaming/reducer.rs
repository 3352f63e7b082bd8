//! 流式文本累积器

use crate::models::openai::StreamChunk;

/// SSE 数据行前缀
pub const DATA_PREFIX: &str = "data:";

/// 流结束标记。虽然不是 JSON，也不按原文追加
pub const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReducerState {
    #[default]
    Empty,
    Accumulating,
}

/// Folds a relayed chat-completion stream into one display string.
///
/// Each complete line is handled on its own: blank lines are skipped, a
/// leading `data:` is stripped, and the payload is parsed as JSON. Parsed
/// payloads contribute `choices[0].delta.content`; anything that fails to
/// parse is appended verbatim. A line cut off at a chunk boundary is held
/// back until the next chunk (or [`StreamReducer::finish`]) completes it;
/// [`StreamReducer::display_text`] still shows a plain-text tail right away.
#[derive(Debug, Default)]
pub struct StreamReducer {
    accumulated: String,
    partial: Vec<u8>,
    // partial[..scanned] 已确认不含换行
    scanned: usize,
    state: ReducerState,
}

impl StreamReducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 处理一个字节块，返回本次新增的文本
    pub fn feed(&mut self, chunk: &[u8]) -> String {
        self.partial.extend_from_slice(chunk);

        let mut appended = String::new();
        while let Some(offset) = self.partial[self.scanned..].iter().position(|&b| b == b'\n') {
            let pos = self.scanned + offset;
            let line: Vec<u8> = self.partial.drain(..=pos).collect();
            self.scanned = 0;
            if let Some(text) = self.reduce_line(&String::from_utf8_lossy(&line)) {
                appended.push_str(&text);
            }
        }
        self.scanned = self.partial.len();
        appended
    }

    /// 展示用文本：已累积文本加上尚未换行的纯文本尾部。
    /// 尾部像 `data:` 行或 JSON 时先不展示，等它完整后再解析
    pub fn display_text(&self) -> String {
        let tail = String::from_utf8_lossy(&self.partial);
        let trimmed = tail.trim_start();
        if trimmed.is_empty() || trimmed.starts_with(DATA_PREFIX) || trimmed.starts_with('{') {
            return self.accumulated.clone();
        }
        format!("{}{}", self.accumulated, tail.trim())
    }

    /// 流结束时处理残留的不完整行
    pub fn finish(&mut self) -> String {
        if self.partial.is_empty() {
            return String::new();
        }
        let line = std::mem::take(&mut self.partial);
        self.scanned = 0;
        self.reduce_line(&String::from_utf8_lossy(&line))
            .unwrap_or_default()
    }

    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    pub fn into_accumulated(self) -> String {
        self.accumulated
    }

    pub fn state(&self) -> ReducerState {
        self.state
    }

    fn reduce_line(&mut self, line: &str) -> Option<String> {
        if line.trim().is_empty() {
            return None;
        }

        let payload = line
            .strip_prefix(DATA_PREFIX)
            .unwrap_or(line)
            .trim();

        if payload == DONE_MARKER {
            return None;
        }

        let text = match serde_json::from_str::<serde_json::Value>(payload) {
            Ok(value) => serde_json::from_value::<StreamChunk>(value)
                .map(|chunk| chunk.first_delta_text().to_string())
                .unwrap_or_default(),
            Err(_) => {
                tracing::trace!("Unparsable stream line kept as text: {}", payload);
                payload.to_string()
            }
        };

        self.accumulated.push_str(&text);
        self.state = ReducerState::Accumulating;
        Some(text)
    }
}
