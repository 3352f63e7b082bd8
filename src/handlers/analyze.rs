//! 图像分析端点处理器 (/analyze)

use crate::backends;
use crate::config::Config;
use crate::error::{ProxyError, ProxyResult};
use crate::models::analyze::AnalyzeRequest;
use axum::{
    response::{IntoResponse, Response},
    Extension,
};
use reqwest::Client;
use std::sync::Arc;

pub async fn analyze_handler(
    Extension(config): Extension<Arc<Config>>,
    Extension(client): Extension<Client>,
    body: axum::body::Bytes,
) -> ProxyResult<Response> {
    let req: AnalyzeRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::error!("Failed to parse analyze request: {}", e);
        ProxyError::Serialization(e)
    })?;

    if config.debug && config.log_raw_json {
        tracing::debug!("Raw analyze request: {}", String::from_utf8_lossy(&body));
    }

    tracing::debug!(
        "Received analyze request for model: {} (streaming: {}, image: {})",
        req.model,
        req.is_streaming(),
        req.base64_image.as_deref().is_some_and(|i| !i.is_empty())
    );

    let outcome = backends::relay(&config, &client, &req).await?;
    Ok(outcome.into_response())
}
