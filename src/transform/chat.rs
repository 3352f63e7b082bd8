//! /analyze 请求 → chat completions 请求

use crate::config::Config;
use crate::models::analyze::AnalyzeRequest;
use crate::models::openai::{ChatRequest, ContentPart, ImageUrl, Message, MessageContent};
use crate::transform::utils::image_data_url;

/// 图片统一使用高精度识别
pub const IMAGE_DETAIL: &str = "high";

/// 组装上游请求：system 消息 + user 消息（文本在前，图片在后）
pub fn build_chat_request(req: &AnalyzeRequest, config: &Config) -> ChatRequest {
    let system_content = config.system_prompt_or_default(req.sys_prompt.as_deref());

    let mut user_parts = Vec::new();
    if let Some(text) = req.user_prompt.as_deref().filter(|t| !t.is_empty()) {
        user_parts.push(ContentPart::Text {
            text: text.to_string(),
        });
    }
    if let Some(image) = req.base64_image.as_deref().filter(|i| !i.is_empty()) {
        user_parts.push(ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: image_data_url(image),
                detail: Some(IMAGE_DETAIL.to_string()),
            },
        });
    }

    ChatRequest {
        model: req.model.clone(),
        messages: vec![
            Message {
                role: "system".to_string(),
                content: MessageContent::Text(system_content.to_string()),
            },
            Message {
                role: "user".to_string(),
                content: MessageContent::Parts(user_parts),
            },
        ],
        stream: req.stream,
    }
}
