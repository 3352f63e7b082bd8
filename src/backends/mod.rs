//! 后端模块
//!
//! 负责与各视觉模型后端的通信

pub mod upstream;

pub use upstream::relay;
