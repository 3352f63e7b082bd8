use anyhow::Result;
use std::{env, path::PathBuf};

/// 未传入系统提示词时使用的默认值
pub const DEFAULT_SYSTEM_PROMPT: &str = "你是一个强大的 AI 助手，专注于描述和分析图像。";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,

    // StepFun 后端配置（step-* 模型）
    pub step_api_url: Option<String>,
    pub step_api_key: Option<String>,

    // OpenAI 后端配置（gpt-4o）
    pub openai_api_url: Option<String>,
    pub openai_api_key: Option<String>,

    // 客户端子命令调用的中继地址
    pub relay_url: String,

    pub default_system_prompt: String,

    // 日志配置
    pub debug: bool,
    pub verbose: bool,
    pub log_raw_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            step_api_url: None,
            step_api_key: None,
            openai_api_url: None,
            openai_api_key: None,
            relay_url: "http://127.0.0.1:3000".to_string(),
            default_system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            debug: false,
            verbose: false,
            log_raw_json: false,
        }
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
}

fn env_non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    fn load_dotenv(custom_path: Option<PathBuf>) -> Option<PathBuf> {
        if let Some(path) = custom_path {
            if path.exists() && dotenvy::from_path(&path).is_ok() {
                return Some(path);
            }
            eprintln!("⚠️  WARNING: Custom config file not found: {}", path.display());
        }

        if let Ok(path) = dotenvy::dotenv() {
            return Some(path);
        }

        if let Ok(home) = env::var("HOME") {
            let home_config = PathBuf::from(home).join(".vision-relay.env");
            if home_config.exists() && dotenvy::from_path(&home_config).is_ok() {
                return Some(home_config);
            }
        }

        let etc_config = PathBuf::from("/etc/vision-relay/.env");
        if etc_config.exists() && dotenvy::from_path(&etc_config).is_ok() {
            return Some(etc_config);
        }

        None
    }

    pub fn from_env_with_path(custom_path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = Self::load_dotenv(custom_path) {
            eprintln!("📄 Loaded config from: {}", path.display());
        } else {
            eprintln!("ℹ️  No .env file found, using environment variables only");
        }

        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let step_api_url = env_non_empty("STEP_API_URL");
        let step_api_key = env_non_empty("STEP_API_KEY");
        let openai_api_url = env_non_empty("OPENAI_API_URL");
        let openai_api_key = env_non_empty("OPENAI_API_KEY");

        let relay_url = env_non_empty("RELAY_URL")
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", port));

        let default_system_prompt = env_non_empty("DEFAULT_SYSTEM_PROMPT")
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        for (name, url) in [("STEP_API_URL", &step_api_url), ("OPENAI_API_URL", &openai_api_url)] {
            if let Some(url) = url {
                if url.trim_end_matches('/').ends_with("/chat/completions") {
                    eprintln!("⚠️  WARNING: {} ends with '/chat/completions'", name);
                    eprintln!("   This will result in URLs like: {}/chat/completions", url);
                    eprintln!("   Consider removing '/chat/completions' from {}", name);
                }
            }
        }

        Ok(Config {
            port,
            step_api_url,
            step_api_key,
            openai_api_url,
            openai_api_key,
            relay_url,
            default_system_prompt,
            debug: env_flag("DEBUG"),
            verbose: env_flag("VERBOSE"),
            log_raw_json: env_flag("LOG_RAW_JSON"),
        })
    }

    /// 启动中继服务前校验：至少配置一个后端
    pub fn validate_backends(&self) -> Result<()> {
        if self.step_api_url.is_none() && self.openai_api_url.is_none() {
            return Err(anyhow::anyhow!(
                "At least one backend must be configured.\n\
                Configure one or more of:\n\
                  - StepFun: STEP_API_URL + STEP_API_KEY (models step-*)\n\
                  - OpenAI: OPENAI_API_URL + OPENAI_API_KEY (model gpt-4o)"
            ));
        }
        Ok(())
    }

    /// 解析空系统提示词为默认值
    pub fn system_prompt_or_default<'a>(&'a self, prompt: Option<&'a str>) -> &'a str {
        match prompt {
            Some(p) if !p.is_empty() => p,
            _ => &self.default_system_prompt,
        }
    }
}
