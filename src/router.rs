//! 路由决策模块
//!
//! 根据模型名称决定请求发往哪个后端，并解析该后端的凭证与地址

use crate::config::Config;
use crate::error::{ProxyError, ProxyResult};
use std::fmt;

/// 可选模型列表
pub const AVAILABLE_MODELS: &[&str] = &[
    "step-1v-8k",
    "step-1v-32k",
    "step-1o-vision-32k",
    "gpt-4o",
];

const STEP_MODEL_PREFIX: &str = "step-";
const OPENAI_VISION_MODEL: &str = "gpt-4o";

/// 目标后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// StepFun 接口（step-* 模型）
    StepFun,
    /// OpenAI 接口（gpt-4o）
    OpenAI,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::StepFun => write!(f, "StepFun"),
            Backend::OpenAI => write!(f, "OpenAI"),
        }
    }
}

impl Backend {
    /// 按模型名称匹配后端：`step-` 前缀走 StepFun，`gpt-4o` 精确匹配走 OpenAI
    pub fn from_model(model: &str) -> ProxyResult<Self> {
        if model.starts_with(STEP_MODEL_PREFIX) {
            return Ok(Backend::StepFun);
        }
        if model == OPENAI_VISION_MODEL {
            return Ok(Backend::OpenAI);
        }
        Err(ProxyError::UnsupportedModel(model.to_string()))
    }
}

/// 某个后端的凭证与地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub backend: Backend,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl BackendConfig {
    /// 解析模型对应的后端配置。纯函数，不做 I/O
    pub fn resolve(model: &str, config: &Config) -> ProxyResult<Self> {
        let backend = Backend::from_model(model)?;
        let (api_key, base_url) = match backend {
            Backend::StepFun => (config.step_api_key.clone(), config.step_api_url.clone()),
            Backend::OpenAI => (config.openai_api_key.clone(), config.openai_api_url.clone()),
        };
        Ok(Self {
            backend,
            api_key,
            base_url,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    pub fn chat_completions_url(&self) -> ProxyResult<String> {
        let url = self.base_url.as_ref().ok_or_else(|| {
            ProxyError::Config(format!("{} base URL not configured", self.backend))
        })?;
        Ok(format!("{}/chat/completions", url.trim_end_matches('/')))
    }
}
