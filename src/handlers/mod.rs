//! 请求处理器模块
//!
//! 包含 /analyze 中继端点以及健康检查、模型列表

pub mod analyze;
pub mod models;

pub use analyze::analyze_handler;
pub use models::models_handler;

use crate::config::Config;
use axum::{
    routing::{get, post},
    Extension, Router,
};
use reqwest::Client;
use std::sync::Arc;

/// 组装全部路由（不含 CORS/Trace 等外层中间件）
pub fn routes(config: Arc<Config>, client: Client) -> Router {
    Router::new()
        .route("/analyze", post(analyze_handler))
        .route("/models", get(models_handler))
        .route("/health", get(health_handler))
        .layer(Extension(config))
        .layer(Extension(client))
}

async fn health_handler() -> &'static str {
    "OK"
}
