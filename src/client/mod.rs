//! 中继客户端
//!
//! 把一次对比或一批行拆成多个独立的 /analyze 请求并发发出，
//! 每个请求的状态单独记录在结果面板上，互不影响

pub mod board;
pub mod display;

pub use board::{RequestState, RequestStatus, ResultBoard};

use crate::error::{ProxyError, ProxyResult};
use crate::models::analyze::AnalyzeRequest;
use crate::streaming::StreamReducer;
use base64::Engine;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;

/// 批量中的一个请求，`id` 用于在结果面板上定位
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub id: String,
    pub request: AnalyzeRequest,
}

/// Batch file row
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BatchRow {
    pub id: Option<String>,
    pub model: String,
    pub stream: Option<bool>,
    pub sys_prompt: String,
    pub user_prompt: String,
    pub image: Option<PathBuf>,
}

/// 将第一行的模型/系统提示词/用户提示词同步到所有行
pub fn sync_rows(rows: &mut [BatchRow], model: bool, sys_prompt: bool, user_prompt: bool) {
    let Some(first) = rows.first().cloned() else {
        return;
    };
    for row in rows.iter_mut().skip(1) {
        if model {
            row.model = first.model.clone();
        }
        if sys_prompt {
            row.sys_prompt = first.sys_prompt.clone();
        }
        if user_prompt {
            row.user_prompt = first.user_prompt.clone();
        }
    }
}

/// 读取图片并编码为不带前缀的 base64
pub fn encode_image(path: &std::path::Path) -> ProxyResult<String> {
    let bytes = std::fs::read(path)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

impl BatchRow {
    /// 行默认开启流式
    pub fn into_item(self, index: usize) -> ProxyResult<BatchItem> {
        let base64_image = self.image.as_deref().map(encode_image).transpose()?;
        Ok(BatchItem {
            id: self.id.unwrap_or_else(|| (index + 1).to_string()),
            request: AnalyzeRequest {
                model: self.model,
                sys_prompt: Some(self.sys_prompt),
                user_prompt: Some(self.user_prompt),
                base64_image,
                stream: Some(self.stream.unwrap_or(true)),
            },
        })
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisClient {
    http: Client,
    relay_url: String,
}

impl AnalysisClient {
    pub fn new(http: Client, relay_url: impl Into<String>) -> Self {
        Self {
            http,
            relay_url: relay_url.into(),
        }
    }

    fn analyze_url(&self) -> String {
        format!("{}/analyze", self.relay_url.trim_end_matches('/'))
    }

    /// 同一组输入对比多个模型，结果以模型名为 id
    pub async fn compare(
        &self,
        models: &[String],
        template: &AnalyzeRequest,
        board: &ResultBoard,
    ) -> ProxyResult<Vec<RequestState>> {
        if models.is_empty() {
            return Err(ProxyError::Validation(
                "select at least one model".to_string(),
            ));
        }

        let mut items: Vec<BatchItem> = Vec::with_capacity(models.len());
        for model in models {
            if items.iter().any(|item| &item.id == model) {
                continue;
            }
            items.push(BatchItem {
                id: model.clone(),
                request: AnalyzeRequest {
                    model: model.clone(),
                    ..template.clone()
                },
            });
        }

        self.run_batch(items, board).await
    }

    /// 并发发出所有请求并等待全部结束；结果顺序与输入一致。
    /// 任一请求缺少模型或 id 重复时整批拒绝，不发出任何请求。
    pub async fn run_batch(
        &self,
        items: Vec<BatchItem>,
        board: &ResultBoard,
    ) -> ProxyResult<Vec<RequestState>> {
        if let Some(item) = items.iter().find(|i| i.request.model.trim().is_empty()) {
            return Err(ProxyError::Validation(format!(
                "request {} has no model selected",
                item.id
            )));
        }

        let mut seen = HashSet::with_capacity(items.len());
        if let Some(item) = items.iter().find(|i| !seen.insert(i.id.as_str())) {
            return Err(ProxyError::Validation(format!(
                "request id {} is used more than once",
                item.id
            )));
        }

        tracing::info!("Dispatching {} analyze requests", items.len());

        let futures = items.iter().map(|item| self.analyze(item, board));
        let results = futures::future::join_all(futures).await;

        let errored = results
            .iter()
            .filter(|s| s.status == RequestStatus::Errored)
            .count();
        tracing::info!(
            "Batch finished: {} complete, {} errored",
            results.len() - errored,
            errored
        );

        Ok(results)
    }

    /// 执行单个请求，所有失败都转换为该条目的展示文本
    pub async fn analyze(&self, item: &BatchItem, board: &ResultBoard) -> RequestState {
        let pending = RequestState::pending(&item.id, &item.request.model);
        board.replace(pending.clone());

        let final_state = match self.try_analyze(&pending, &item.request, board).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!("Request {} ({}) failed: {}", item.id, item.request.model, e);
                pending.with(display::failure_text(&e), RequestStatus::Errored)
            }
        };

        board.replace(final_state.clone());
        final_state
    }

    async fn try_analyze(
        &self,
        pending: &RequestState,
        req: &AnalyzeRequest,
        board: &ResultBoard,
    ) -> ProxyResult<RequestState> {
        let response = self.http.post(self.analyze_url()).json(req).send().await?;
        let status = response.status();

        if !(req.is_streaming() && status.is_success()) {
            let body: serde_json::Value = response.json().await?;
            let (status, text) = display::unwrap_response(&body);
            return Ok(pending.with(text, status));
        }

        let mut reducer = StreamReducer::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    reducer.feed(&bytes);
                    board.replace(pending.with(reducer.display_text(), RequestStatus::Streaming));
                }
                Err(e) => {
                    let err = ProxyError::StreamRead(e.to_string());
                    tracing::warn!("Request {} stream interrupted: {}", pending.id, err);
                    reducer.finish();
                    let text = format!(
                        "{}\n[{}]",
                        reducer.accumulated(),
                        display::failure_text(&err)
                    );
                    return Ok(pending.with(text, RequestStatus::Errored));
                }
            }
        }

        reducer.finish();
        Ok(pending.with(reducer.into_accumulated(), RequestStatus::Complete))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::raw_http_server;
    use httpmock::prelude::*;
    use serde_json::json;

    fn item(id: &str, model: &str, stream: bool) -> BatchItem {
        BatchItem {
            id: id.to_string(),
            request: AnalyzeRequest {
                model: model.to_string(),
                user_prompt: Some("describe".to_string()),
                stream: Some(stream),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_batch_results_pair_with_requests_in_order() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/analyze").body_contains("\"step-1v-8k\"");
                then.status(200)
                    .json_body(json!({ "choices": [{ "message": { "content": "from step" } }] }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/analyze").body_contains("\"gpt-4o\"");
                then.status(200).json_body(json!({ "data": "from gpt" }));
            })
            .await;

        let client = AnalysisClient::new(Client::new(), server.base_url());
        let board = ResultBoard::new();
        let results = client
            .run_batch(
                vec![item("r1", "gpt-4o", false), item("r2", "step-1v-8k", false)],
                &board,
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "r1");
        assert_eq!(results[0].accumulated, "from gpt");
        assert_eq!(results[1].id, "r2");
        assert_eq!(results[1].accumulated, "from step");
        assert!(results.iter().all(|s| s.status == RequestStatus::Complete));
        assert_eq!(board.get("r2").unwrap().accumulated, "from step");
    }

    #[tokio::test]
    async fn test_missing_model_rejects_whole_batch() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.any_request();
                then.status(200).json_body(json!({ "data": "x" }));
            })
            .await;

        let client = AnalysisClient::new(Client::new(), server.base_url());
        let board = ResultBoard::new();
        let result = client
            .run_batch(vec![item("1", "gpt-4o", false), item("2", "", false)], &board)
            .await;

        assert!(matches!(result, Err(ProxyError::Validation(_))));
        mock.assert_hits_async(0).await;
        assert!(board.is_empty());
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_siblings() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/analyze").body_contains("\"step-1v-32k\"");
                then.status(401).json_body(json!({ "error": "bad key" }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/analyze").body_contains("\"gpt-4o\"");
                then.status(200)
                    .json_body(json!({ "choices": [{ "message": { "content": "ok" } }] }));
            })
            .await;

        let client = AnalysisClient::new(Client::new(), server.base_url());
        let board = ResultBoard::new();
        let results = client
            .run_batch(
                vec![
                    item("a", "step-1v-32k", false),
                    item("b", "gpt-4o", false),
                    item("c", "step-1v-32k", true),
                ],
                &board,
            )
            .await
            .unwrap();

        assert_eq!(results[0].status, RequestStatus::Errored);
        assert!(results[0].accumulated.contains("bad key"));
        assert_eq!(results[1].status, RequestStatus::Complete);
        assert_eq!(results[1].accumulated, "ok");
        // 流式请求遇到非 2xx 时同样显示错误
        assert_eq!(results[2].status, RequestStatus::Errored);
        assert!(results[2].accumulated.contains("bad key"));
    }

    #[tokio::test]
    async fn test_duplicate_ids_reject_whole_batch() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.any_request();
                then.status(200).json_body(json!({ "data": "x" }));
            })
            .await;

        let client = AnalysisClient::new(Client::new(), server.base_url());
        let board = ResultBoard::new();
        let result = client
            .run_batch(
                vec![
                    item("1", "gpt-4o", false),
                    item("2", "step-1v-8k", false),
                    item("1", "step-1v-32k", false),
                ],
                &board,
            )
            .await;

        assert!(matches!(result, Err(ProxyError::Validation(ref m)) if m.contains("request id 1 ")));
        mock.assert_hits_async(0).await;
        assert!(board.is_empty());
    }

    #[tokio::test]
    async fn test_stream_cut_mid_body_keeps_partial_text() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"He\"}}]}\n";
        // 发送一个 chunk 后直接断开，不发送结束 chunk
        let response = format!(
            "HTTP/1.1 200 OK\r\n\
             Content-Type: text/plain\r\n\
             Transfer-Encoding: chunked\r\n\r\n\
             {:x}\r\n{}\r\n",
            line.len(),
            line
        );
        let relay_url = raw_http_server(response.into_bytes()).await;

        let client = AnalysisClient::new(Client::new(), relay_url);
        let board = ResultBoard::new();
        let results = client
            .run_batch(vec![item("1", "step-1v-8k", true)], &board)
            .await
            .unwrap();

        assert_eq!(results[0].status, RequestStatus::Errored);
        assert!(results[0].accumulated.starts_with("He"));
        assert!(results[0].accumulated.contains(display::REQUEST_FAILED_PREFIX));
        assert_eq!(board.get("1").unwrap(), results[0]);
    }

    #[tokio::test]
    async fn test_unreachable_relay_becomes_error_text() {
        let client = AnalysisClient::new(Client::new(), "http://127.0.0.1:1");
        let board = ResultBoard::new();
        let results = client
            .run_batch(vec![item("1", "gpt-4o", false)], &board)
            .await
            .unwrap();

        assert_eq!(results[0].status, RequestStatus::Errored);
        assert!(results[0].accumulated.starts_with(display::REQUEST_FAILED_PREFIX));
    }

    #[tokio::test]
    async fn test_streaming_request_accumulates_deltas() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/analyze").json_body_partial(r#"{ "stream": true }"#);
                then.status(200)
                    .header("content-type", "text/plain")
                    .body(
                        "data: {\"choices\":[{\"delta\":{\"content\":\"He\"}}]}\n\n\
                         data: {\"choices\":[{\"delta\":{\"content\":\"llo\"}}]}\n\n\
                         data: [DONE]\n\n",
                    );
            })
            .await;

        let client = AnalysisClient::new(Client::new(), server.base_url());
        let board = ResultBoard::new();
        let results = client
            .run_batch(vec![item("1", "step-1v-8k", true)], &board)
            .await
            .unwrap();

        assert_eq!(results[0].status, RequestStatus::Complete);
        assert_eq!(results[0].accumulated, "Hello");
    }

    #[tokio::test]
    async fn test_compare_keys_results_by_model() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/analyze");
                then.status(200).json_body(json!({ "data": "same" }));
            })
            .await;

        let client = AnalysisClient::new(Client::new(), server.base_url());
        let board = ResultBoard::new();
        let models = vec![
            "step-1v-8k".to_string(),
            "gpt-4o".to_string(),
            "step-1v-8k".to_string(),
        ];
        let results = client
            .compare(&models, &AnalyzeRequest::default(), &board)
            .await
            .unwrap();

        mock.assert_hits_async(2).await;
        let ids: Vec<_> = results.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["step-1v-8k", "gpt-4o"]);
        assert_eq!(board.get("gpt-4o").unwrap().accumulated, "same");
    }

    #[tokio::test]
    async fn test_compare_requires_a_model() {
        let client = AnalysisClient::new(Client::new(), "http://127.0.0.1:1");
        let result = client
            .compare(&[], &AnalyzeRequest::default(), &ResultBoard::new())
            .await;
        assert!(matches!(result, Err(ProxyError::Validation(_))));
    }

    #[test]
    fn test_sync_rows_copies_first_row() {
        let mut rows = vec![
            BatchRow {
                model: "gpt-4o".into(),
                sys_prompt: "sys".into(),
                user_prompt: "user".into(),
                ..Default::default()
            },
            BatchRow {
                model: "step-1v-8k".into(),
                sys_prompt: "other".into(),
                user_prompt: "keep".into(),
                ..Default::default()
            },
        ];

        sync_rows(&mut rows, true, true, false);

        assert_eq!(rows[1].model, "gpt-4o");
        assert_eq!(rows[1].sys_prompt, "sys");
        assert_eq!(rows[1].user_prompt, "keep");
    }

    #[test]
    fn test_row_into_item_defaults() {
        let row: BatchRow = serde_json::from_value(json!({ "model": "gpt-4o" })).unwrap();
        let item = row.into_item(2).unwrap();
        assert_eq!(item.id, "3");
        assert!(item.request.is_streaming());
        assert!(item.request.base64_image.is_none());
    }

    #[test]
    fn test_row_with_missing_image_fails() {
        let row = BatchRow {
            model: "gpt-4o".into(),
            image: Some(PathBuf::from("/nonexistent/image.png")),
            ..Default::default()
        };
        assert!(matches!(row.into_item(0), Err(ProxyError::Io(_))));
    }
}
