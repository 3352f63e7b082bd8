//! 上游中继
//!
//! 每个 /analyze 请求对应一次上游 chat completions 调用，流式时逐块透传

use crate::config::Config;
use crate::error::{ProxyError, ProxyResult};
use crate::models::analyze::AnalyzeRequest;
use crate::router::BackendConfig;
use crate::transform;
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use futures::stream::{BoxStream, Stream};
use futures::StreamExt;
use reqwest::Client;

/// 中继结果：流式时为原样透传的字节流，否则为完整 JSON
pub enum RelayOutcome {
    Stream(BoxStream<'static, Result<Bytes, std::io::Error>>),
    Json(serde_json::Value),
}

impl std::fmt::Debug for RelayOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayOutcome::Stream(_) => f.write_str("RelayOutcome::Stream(..)"),
            RelayOutcome::Json(value) => f.debug_tuple("RelayOutcome::Json").field(value).finish(),
        }
    }
}

impl IntoResponse for RelayOutcome {
    fn into_response(self) -> Response {
        match self {
            RelayOutcome::Stream(stream) => {
                let mut headers = HeaderMap::new();
                headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; charset=utf-8"),
                );
                headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

                (headers, Body::from_stream(stream)).into_response()
            }
            RelayOutcome::Json(value) => Json(value).into_response(),
        }
    }
}

/// 发起一次上游调用，不重试、不缓存
pub async fn relay(
    config: &Config,
    client: &Client,
    req: &AnalyzeRequest,
) -> ProxyResult<RelayOutcome> {
    let backend = BackendConfig::resolve(&req.model, config)?;
    let url = backend.chat_completions_url()?;
    let chat_req = transform::build_chat_request(req, config);
    let is_streaming = req.is_streaming();

    tracing::debug!(
        "Relaying model {} to {} ({}), streaming={}",
        req.model,
        backend.backend,
        url,
        is_streaming
    );

    if config.verbose {
        tracing::trace!(
            "Upstream request: {}",
            serde_json::to_string_pretty(&chat_req).unwrap_or_default()
        );
    }

    let mut req_builder = client.post(&url).json(&chat_req);
    if let Some(key) = &backend.api_key {
        req_builder = req_builder.header(header::AUTHORIZATION, format!("Bearer {}", key));
    }

    let response = req_builder.send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await?;
        tracing::error!("Upstream error ({}) from {}: {}", status, url, error_text);
        return Err(ProxyError::Upstream {
            status,
            body: error_text,
        });
    }

    if is_streaming {
        Ok(RelayOutcome::Stream(
            passthrough_stream(response.bytes_stream()).boxed(),
        ))
    } else {
        let body: serde_json::Value = response.json().await?;

        if config.verbose {
            tracing::trace!(
                "Upstream response: {}",
                serde_json::to_string_pretty(&body).unwrap_or_default()
            );
        }

        Ok(RelayOutcome::Json(body))
    }
}

/// 逐块转发上游 body；读取失败时向下游发出错误并终止
pub fn passthrough_stream<E>(
    stream: impl Stream<Item = Result<Bytes, E>> + Send + 'static,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send
where
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        tokio::pin!(stream);

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => yield Ok(bytes),
                Err(e) => {
                    let err = ProxyError::StreamRead(e.to_string());
                    tracing::error!("{}", err);
                    yield Err(std::io::Error::other(err.to_string()));
                    break;
                }
            }
        }
    }
}
