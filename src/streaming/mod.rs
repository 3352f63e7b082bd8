//! 流式输出处理
//!
//! 将中继透传回来的 chat completions 流还原为累积文本

pub mod reducer;

pub use reducer::StreamReducer;
