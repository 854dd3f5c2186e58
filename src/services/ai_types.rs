use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::entry::FailureCause;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    pub fn cause(&self) -> FailureCause {
        match self {
            BackendError::Http { status: 401 | 403, .. } => FailureCause::Authentication,
            BackendError::Http { status: 429, .. } => FailureCause::RateLimit,
            BackendError::Http { message, .. } if is_rate_limit_text(message) => {
                FailureCause::RateLimit
            }
            BackendError::Http { .. } => FailureCause::Service,
            BackendError::Connect(_) => FailureCause::Connectivity,
            BackendError::InvalidResponse(_) => FailureCause::MalformedResponse,
        }
    }

    /// 408/5xx: worth another attempt under the error policy.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Http { status, .. } if *status == 408 || *status >= 500)
    }

    pub fn is_developer_instruction_rejection(&self) -> bool {
        match self {
            BackendError::Http { message, .. } | BackendError::InvalidResponse(message) => {
                message.to_lowercase().contains("developer instruction")
            }
            BackendError::Connect(_) => false,
        }
    }
}

fn is_rate_limit_text(message: &str) -> bool {
    let m = message.to_lowercase();
    m.contains("rate limit") || m.contains("rate-limited")
}

/// Recovery strategies taken during one run.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct StrategyStats {
    pub rate_limit_retry: usize,
    pub switch_single_user: usize,
    pub split_batch: usize,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl StrategyStats {
    pub fn absorb(&mut self, other: &StrategyStats) {
        self.rate_limit_retry += other.rate_limit_retry;
        self.switch_single_user += other.switch_single_user;
        self.split_batch += other.split_batch;
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }

    pub fn add_usage(&mut self, usage: Option<TokenUsage>) {
        if let Some(u) = usage {
            self.prompt_tokens += u.prompt_tokens;
            self.completion_tokens += u.completion_tokens;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_maps_to_cause() {
        let e = |status| BackendError::Http {
            status,
            message: "x".into(),
        };
        assert_eq!(e(401).cause(), FailureCause::Authentication);
        assert_eq!(e(403).cause(), FailureCause::Authentication);
        assert_eq!(e(429).cause(), FailureCause::RateLimit);
        assert_eq!(e(500).cause(), FailureCause::Service);
        assert_eq!(
            BackendError::Connect("refused".into()).cause(),
            FailureCause::Connectivity
        );
        assert!(e(503).is_transient());
        assert!(e(408).is_transient());
        assert!(!e(404).is_transient());
    }

    #[test]
    fn detects_developer_instruction_rejection() {
        let e = BackendError::Http {
            status: 400,
            message: "Developer instruction is not enabled for this model".into(),
        };
        assert!(e.is_developer_instruction_rejection());
    }
}
