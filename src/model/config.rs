use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};
use crate::parsers::ParserPatterns;
use crate::services::output;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    #[default]
    Exponential,
    Fixed,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay")]
    pub base_delay_sec: u64,

    #[serde(default)]
    pub strategy: RetryStrategy,
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_delay() -> u64 {
    2
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        ErrorPolicy {
            max_retries: default_max_retries(),
            base_delay_sec: default_base_delay(),
            strategy: RetryStrategy::Exponential,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ApiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, alias = "model_id")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    #[serde(default)]
    pub only_tooltips: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    OpenAiCompatible,
    Ollama,
}

#[derive(Debug, Clone, Copy)]
pub struct ServiceDef {
    pub name: &'static str,
    pub base_url: &'static str,
    pub default_model: &'static str,
    pub kind: BackendKind,
    pub requires_key: bool,
}

pub const SERVICES: &[ServiceDef] = &[
    ServiceDef {
        name: "doubao",
        base_url: "https://ark.cn-beijing.volces.com/api/v3",
        default_model: "",
        kind: BackendKind::OpenAiCompatible,
        requires_key: true,
    },
    ServiceDef {
        name: "aliyun",
        base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1",
        default_model: "qwen-plus",
        kind: BackendKind::OpenAiCompatible,
        requires_key: true,
    },
    ServiceDef {
        name: "deepseek",
        base_url: "https://api.deepseek.com",
        default_model: "deepseek-chat",
        kind: BackendKind::OpenAiCompatible,
        requires_key: true,
    },
    ServiceDef {
        name: "moonshot",
        base_url: "https://api.moonshot.cn/v1",
        default_model: "moonshot-v1-8k",
        kind: BackendKind::OpenAiCompatible,
        requires_key: true,
    },
    ServiceDef {
        name: "zhipu",
        base_url: "https://open.bigmodel.cn/api/paas/v4",
        default_model: "glm-4-flash",
        kind: BackendKind::OpenAiCompatible,
        requires_key: true,
    },
    ServiceDef {
        name: "siliconflow",
        base_url: "https://api.siliconflow.cn/v1",
        default_model: "Qwen/Qwen2.5-72B-Instruct",
        kind: BackendKind::OpenAiCompatible,
        requires_key: true,
    },
    ServiceDef {
        name: "openai",
        base_url: "https://api.openai.com/v1",
        default_model: "gpt-3.5-turbo",
        kind: BackendKind::OpenAiCompatible,
        requires_key: true,
    },
    ServiceDef {
        name: "openrouter",
        base_url: "https://openrouter.ai/api/v1",
        default_model: "",
        kind: BackendKind::OpenAiCompatible,
        requires_key: true,
    },
    ServiceDef {
        name: "lmstudio",
        base_url: "http://localhost:1234/v1",
        default_model: "",
        kind: BackendKind::OpenAiCompatible,
        requires_key: false,
    },
    ServiceDef {
        name: "ollama",
        base_url: "http://localhost:11434",
        default_model: "",
        kind: BackendKind::Ollama,
        requires_key: false,
    },
];

pub fn service_def(name: &str) -> Option<&'static ServiceDef> {
    SERVICES.iter().find(|s| s.name == name)
}

/// Resolved connection settings for one translation service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSettings {
    pub service: String,
    pub kind: BackendKind,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    pub only_tooltips: bool,
}

/// Contents of `config.json`. Keys this tool does not know are kept in
/// `extra` and written back on save.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_service")]
    pub current_service: String,

    #[serde(default)]
    pub api_keys: BTreeMap<String, String>,

    #[serde(default)]
    pub api_configs: BTreeMap<String, ApiConfig>,

    #[serde(default)]
    pub error_policy: ErrorPolicy,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_rounds")]
    pub rounds: usize,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loader_dir: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub fill_missing_tooltips: bool,

    #[serde(default)]
    pub glossary: BTreeMap<String, String>,

    #[serde(default)]
    pub parser: ParserPatterns,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_service() -> String {
    "doubao".to_string()
}

fn default_batch_size() -> usize {
    6
}

fn default_concurrency() -> usize {
    4
}

fn default_rounds() -> usize {
    2
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            current_service: default_service(),
            api_keys: BTreeMap::new(),
            api_configs: BTreeMap::new(),
            error_policy: ErrorPolicy::default(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            rounds: default_rounds(),
            output_dir: default_output_dir(),
            loader_dir: None,
            fill_missing_tooltips: true,
            glossary: BTreeMap::new(),
            parser: ParserPatterns::default(),
            extra: Map::new(),
        }
    }
}

impl AppConfig {
    /// Missing file means defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "config not found, using defaults");
            return Ok(AppConfig::default());
        }
        let data = fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        serde_json::from_str(&data).map_err(|e| CoreError::json(path, e))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let value = serde_json::to_value(self).map_err(|e| CoreError::json(path, e))?;
        output::write_json_atomic(path, &value)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(CoreError::Config("batch_size must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(CoreError::Config("concurrency must be at least 1".into()));
        }
        if !(1..=5).contains(&self.rounds) {
            return Err(CoreError::Config(format!(
                "rounds must be between 1 and 5, got {}",
                self.rounds
            )));
        }
        Ok(())
    }

    pub fn service_settings(&self) -> Result<ServiceSettings> {
        let name = self.current_service.trim();
        if name.is_empty() {
            return Err(CoreError::Config("current_service is empty".into()));
        }
        let def = service_def(name);
        let api = self.api_configs.get(name).cloned().unwrap_or_default();

        let base_url = api
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or(def.map(|d| d.base_url))
            .ok_or_else(|| CoreError::Config(format!("no base_url configured for service {name}")))?
            .trim_end_matches('/')
            .to_string();

        let model = if api.model.trim().is_empty() {
            def.map(|d| d.default_model).unwrap_or("").to_string()
        } else {
            api.model.trim().to_string()
        };
        if model.is_empty() {
            return Err(CoreError::Config(format!("model is required for service {name}")));
        }

        let api_key = self
            .api_keys
            .get(name)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        let requires_key = def.map(|d| d.requires_key).unwrap_or(true);
        if requires_key && api_key.is_none() {
            return Err(CoreError::Config(format!("api key is required for service {name}")));
        }

        let temperature = api.temperature.unwrap_or(0.3);
        if !(0.0..=2.0).contains(&temperature) {
            return Err(CoreError::Config(format!(
                "temperature must be between 0 and 2, got {temperature}"
            )));
        }
        let top_p = api.top_p.unwrap_or(0.95);
        if !(0.0..=1.0).contains(&top_p) {
            return Err(CoreError::Config(format!(
                "top_p must be between 0 and 1, got {top_p}"
            )));
        }

        Ok(ServiceSettings {
            service: name.to_string(),
            kind: def.map(|d| d.kind).unwrap_or(BackendKind::OpenAiCompatible),
            base_url,
            api_key,
            model,
            temperature,
            top_p,
            only_tooltips: api.only_tooltips,
        })
    }
}
