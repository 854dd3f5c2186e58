use std::sync::atomic::{AtomicBool, Ordering};
use std::{thread, time::Duration};

use rand::{thread_rng, Rng};
use reqwest::blocking::Client;
use serde_json::{json, Value};

use crate::error::{CoreError, Result};
use crate::model::config::{BackendKind, ErrorPolicy, RetryStrategy, ServiceSettings};
use crate::model::entry::FailureCause;
use crate::services::ai_types::{
    BackendError, ChatMessage, Completion, CompletionRequest, StrategyStats, TokenUsage,
};
use crate::services::prompts;

const TIMEOUT_SECS: u64 = 300;
const MAX_TOKENS: u32 = 4096;
const MAX_DELAY_SECS: u64 = 60;

/// One chat-completion capable service.
pub trait CompletionBackend: Send + Sync {
    fn model(&self) -> &str;

    fn complete(&self, request: &CompletionRequest) -> std::result::Result<Completion, BackendError>;
}

pub struct HttpBackend {
    client: Client,
    kind: BackendKind,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

fn endpoint_for(kind: BackendKind, base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    match kind {
        BackendKind::OpenAiCompatible => format!("{base}/chat/completions"),
        BackendKind::Ollama => format!("{base}/api/chat"),
    }
}

impl HttpBackend {
    pub fn new(settings: &ServiceSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .map_err(|e| CoreError::Backend(e.to_string()))?;

        Ok(HttpBackend {
            client,
            kind: settings.kind,
            endpoint: endpoint_for(settings.kind, &settings.base_url),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
        })
    }

    fn body(&self, request: &CompletionRequest) -> Value {
        match self.kind {
            BackendKind::OpenAiCompatible => json!({
                "model": self.model,
                "messages": request.messages,
                "temperature": request.temperature,
                "top_p": request.top_p,
                "max_tokens": request.max_tokens,
                "stream": false
            }),
            BackendKind::Ollama => json!({
                "model": self.model,
                "messages": request.messages,
                "stream": false,
                "options": {
                    "temperature": request.temperature,
                    "top_p": request.top_p,
                    "num_predict": request.max_tokens
                }
            }),
        }
    }

    fn parse_reply(&self, v: &Value) -> Option<Completion> {
        match self.kind {
            BackendKind::OpenAiCompatible => {
                let content = v
                    .get("choices")
                    .and_then(|c| c.get(0))
                    .and_then(|c| c.get("message"))
                    .and_then(|m| m.get("content"))
                    .and_then(|c| c.as_str())?;
                let usage = v.get("usage").map(|u| TokenUsage {
                    prompt_tokens: u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
                    completion_tokens: u
                        .get("completion_tokens")
                        .and_then(Value::as_u64)
                        .unwrap_or(0),
                });
                Some(Completion {
                    content: content.to_string(),
                    usage,
                })
            }
            BackendKind::Ollama => {
                let content = v
                    .get("message")
                    .and_then(|m| m.get("content"))
                    .and_then(|c| c.as_str())?;
                let usage = v.get("eval_count").map(|_| TokenUsage {
                    prompt_tokens: v.get("prompt_eval_count").and_then(Value::as_u64).unwrap_or(0),
                    completion_tokens: v.get("eval_count").and_then(Value::as_u64).unwrap_or(0),
                });
                Some(Completion {
                    content: content.to_string(),
                    usage,
                })
            }
        }
    }
}

impl CompletionBackend for HttpBackend {
    fn model(&self) -> &str {
        &self.model
    }

    fn complete(&self, request: &CompletionRequest) -> std::result::Result<Completion, BackendError> {
        let mut req = self.client.post(&self.endpoint).json(&self.body(request));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().map_err(|e| BackendError::Connect(e.to_string()))?;
        let status = resp.status();

        // Read as text first so error bodies are not lost when they are not JSON.
        let text = resp
            .text()
            .map_err(|e| BackendError::Connect(e.to_string()))?;

        if !status.is_success() {
            return Err(BackendError::Http {
                status: status.as_u16(),
                message: extract_error_message(&text),
            });
        }

        let v: Value = serde_json::from_str(&text)
            .map_err(|e| BackendError::InvalidResponse(format!("reply is not JSON: {e}")))?;
        self.parse_reply(&v).ok_or_else(|| {
            BackendError::InvalidResponse("reply has no message content".into())
        })
    }
}

fn extract_error_message(body_text: &str) -> String {
    // Common shapes: { "error": { "message": "..." } } or { "message": "..." }
    if let Ok(v) = serde_json::from_str::<Value>(body_text) {
        if let Some(msg) = v
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
        {
            return msg.to_string();
        }
        if let Some(msg) = v.get("error").and_then(|m| m.as_str()) {
            return msg.to_string();
        }
        if let Some(msg) = v.get("message").and_then(|m| m.as_str()) {
            return msg.to_string();
        }
    }

    let trimmed = body_text.trim();
    if trimmed.chars().count() > 400 {
        let head: String = trimmed.chars().take(400).collect();
        format!("{head}...")
    } else {
        trimmed.to_string()
    }
}

pub fn backoff(policy: &ErrorPolicy, attempt: u32) -> Duration {
    let secs = match policy.strategy {
        RetryStrategy::Fixed => policy.base_delay_sec,
        RetryStrategy::Exponential => policy
            .base_delay_sec
            .saturating_mul(2_u64.saturating_pow(attempt)),
    }
    .min(MAX_DELAY_SECS);

    if policy.base_delay_sec == 0 {
        return Duration::ZERO;
    }
    let jitter: u64 = thread_rng().gen_range(0..500);
    Duration::from_secs(secs) + Duration::from_millis(jitter)
}

#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub temperature: f64,
    pub top_p: f64,
    pub policy: ErrorPolicy,
}

/// Sends one translation payload, retrying rate limits and transient
/// errors under `opts.policy`. `single_user` is shared by all workers and
/// flips on the first developer-instruction rejection.
pub fn request_translation(
    backend: &dyn CompletionBackend,
    payload: &str,
    opts: &RequestOptions,
    single_user: &AtomicBool,
    stats: &mut StrategyStats,
) -> std::result::Result<Completion, BackendError> {
    let mut attempt: u32 = 0;

    loop {
        let single = single_user.load(Ordering::Relaxed);
        let request = CompletionRequest {
            messages: prompts::build_messages(payload, single),
            temperature: opts.temperature,
            top_p: opts.top_p,
            max_tokens: MAX_TOKENS,
        };

        let err = match backend.complete(&request) {
            Ok(c) => {
                stats.add_usage(c.usage);
                return Ok(c);
            }
            Err(e) => e,
        };

        if !single && err.is_developer_instruction_rejection() {
            tracing::info!(model = backend.model(), "switching to single user message");
            single_user.store(true, Ordering::Relaxed);
            stats.switch_single_user += 1;
            continue;
        }

        let rate_limited = err.cause() == FailureCause::RateLimit;
        if (rate_limited || err.is_transient()) && attempt < opts.policy.max_retries {
            let delay = backoff(&opts.policy, attempt);
            if rate_limited {
                stats.rate_limit_retry += 1;
            }
            tracing::warn!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %err, "retrying request");
            thread::sleep(delay);
            attempt += 1;
            continue;
        }

        return Err(err);
    }
}

/// Short probe of the configured service; returns the reply text.
pub fn test_connection(
    backend: &dyn CompletionBackend,
    settings: &ServiceSettings,
) -> std::result::Result<String, BackendError> {
    let messages = if prompts::needs_single_user(&settings.model) {
        vec![ChatMessage::user(format!("{}\n\n你好", prompts::TEST_PROMPT))]
    } else {
        vec![
            ChatMessage::system(prompts::TEST_PROMPT),
            ChatMessage::user("你好"),
        ]
    };
    let reply = backend.complete(&CompletionRequest {
        messages,
        temperature: settings.temperature,
        top_p: settings.top_p,
        max_tokens: 100,
    })?;
    Ok(reply.content.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned outcomes, then succeeds with `"{}"`.
    struct QueueBackend {
        replies: Mutex<VecDeque<std::result::Result<Completion, BackendError>>>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl QueueBackend {
        fn new(replies: Vec<std::result::Result<Completion, BackendError>>) -> Self {
            QueueBackend {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl CompletionBackend for QueueBackend {
        fn model(&self) -> &str {
            "queue"
        }

        fn complete(&self, request: &CompletionRequest) -> std::result::Result<Completion, BackendError> {
            self.seen.lock().unwrap().push(request.clone());
            self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
                Ok(Completion {
                    content: "{}".into(),
                    usage: None,
                })
            })
        }
    }

    fn opts(max_retries: u32) -> RequestOptions {
        RequestOptions {
            temperature: 0.3,
            top_p: 0.95,
            policy: ErrorPolicy {
                max_retries,
                base_delay_sec: 0,
                strategy: RetryStrategy::Exponential,
            },
        }
    }

    fn http(status: u16, message: &str) -> std::result::Result<Completion, BackendError> {
        Err(BackendError::Http {
            status,
            message: message.into(),
        })
    }

    #[test]
    fn rate_limits_are_retried_then_succeed() {
        let backend = QueueBackend::new(vec![http(429, "slow down"), http(429, "slow down")]);
        let mut stats = StrategyStats::default();
        let flag = AtomicBool::new(false);

        let reply = request_translation(&backend, "{}", &opts(5), &flag, &mut stats).unwrap();
        assert_eq!(reply.content, "{}");
        assert_eq!(stats.rate_limit_retry, 2);
        assert_eq!(backend.seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn retries_stop_at_policy_limit() {
        let backend = QueueBackend::new(vec![http(503, "busy"), http(503, "busy"), http(503, "busy")]);
        let mut stats = StrategyStats::default();
        let err = request_translation(&backend, "{}", &opts(1), &AtomicBool::new(false), &mut stats)
            .unwrap_err();
        assert_eq!(err.cause(), FailureCause::Service);
        assert_eq!(backend.seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn auth_errors_are_not_retried() {
        let backend = QueueBackend::new(vec![http(401, "invalid api key")]);
        let mut stats = StrategyStats::default();
        let err = request_translation(&backend, "{}", &opts(5), &AtomicBool::new(false), &mut stats)
            .unwrap_err();
        assert_eq!(err.cause(), FailureCause::Authentication);
        assert_eq!(backend.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn developer_instruction_rejection_switches_mode() {
        let backend = QueueBackend::new(vec![http(400, "developer instruction is not enabled")]);
        let mut stats = StrategyStats::default();
        let flag = AtomicBool::new(false);

        request_translation(&backend, "{}", &opts(0), &flag, &mut stats).unwrap();
        assert!(flag.load(Ordering::Relaxed));
        assert_eq!(stats.switch_single_user, 1);

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].messages.len(), 2);
        assert_eq!(seen[1].messages.len(), 1);
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let policy = ErrorPolicy {
            max_retries: 10,
            base_delay_sec: 2,
            strategy: RetryStrategy::Exponential,
        };
        assert!(backoff(&policy, 0) >= Duration::from_secs(2));
        assert!(backoff(&policy, 10) < Duration::from_secs(61));

        let fixed = ErrorPolicy {
            strategy: RetryStrategy::Fixed,
            ..policy
        };
        assert!(backoff(&fixed, 5) < Duration::from_secs(3));
    }

    #[test]
    fn error_body_snippet_is_char_safe() {
        let body = "错".repeat(500);
        let msg = extract_error_message(&body);
        assert!(msg.ends_with("..."));
        assert_eq!(msg.chars().count(), 403);
    }

    #[test]
    fn endpoints_follow_backend_kind() {
        assert_eq!(
            endpoint_for(BackendKind::OpenAiCompatible, "https://api.deepseek.com/"),
            "https://api.deepseek.com/chat/completions"
        );
        assert_eq!(
            endpoint_for(BackendKind::Ollama, "http://localhost:11434"),
            "http://localhost:11434/api/chat"
        );
    }
}
