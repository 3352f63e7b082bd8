//! 模型列表端点 (/models)

use crate::config::Config;
use crate::router::{BackendConfig, AVAILABLE_MODELS};
use axum::{Extension, Json};
use serde_json::{json, Value};
use std::sync::Arc;

pub async fn models_handler(Extension(config): Extension<Arc<Config>>) -> Json<Value> {
    let models: Vec<Value> = AVAILABLE_MODELS
        .iter()
        .map(|model| {
            let configured = BackendConfig::resolve(model, &config)
                .map(|b| b.is_configured())
                .unwrap_or(false);
            json!({ "id": model, "configured": configured })
        })
        .collect();

    Json(json!({ "models": models }))
}
