//! 请求转换模块
//!
//! 将 /analyze 请求组装为上游 chat completions 请求

pub mod chat;
pub mod utils;

pub use chat::build_chat_request;
