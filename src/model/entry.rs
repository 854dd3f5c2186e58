use serde::{Deserialize, Serialize};
use std::fmt;

use super::node::Section;

/// Field address inside one plugin. Titles use an empty `name`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    pub node: String,
    pub section: Section,

    #[serde(default)]
    pub name: String,
}

impl FieldKey {
    pub fn new(node: impl Into<String>, section: Section, name: impl Into<String>) -> Self {
        FieldKey {
            node: node.into(),
            section,
            name: name.into(),
        }
    }

    pub fn title(node: impl Into<String>) -> Self {
        FieldKey::new(node, Section::Title, "")
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryKey {
    pub plugin: String,

    #[serde(flatten)]
    pub field: FieldKey,
}

impl EntryKey {
    pub fn new(plugin: impl Into<String>, field: FieldKey) -> Self {
        EntryKey {
            plugin: plugin.into(),
            field,
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.name.is_empty() {
            write!(f, "{}/{}/{}", self.plugin, self.field.node, self.field.section.as_str())
        } else {
            write!(
                f,
                "{}/{}/{}/{}",
                self.plugin,
                self.field.node,
                self.field.section.as_str(),
                self.field.name
            )
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    Authentication,
    RateLimit,
    Connectivity,
    MalformedResponse,
    Service,
}

impl FailureCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCause::Authentication => "authentication",
            FailureCause::RateLimit => "rate_limit",
            FailureCause::Connectivity => "connectivity",
            FailureCause::MalformedResponse => "malformed_response",
            FailureCause::Service => "service",
        }
    }

    fn default_message(&self) -> &'static str {
        match self {
            FailureCause::Authentication => "authentication failed",
            FailureCause::RateLimit => "rate limited",
            FailureCause::Connectivity => "service unreachable",
            FailureCause::MalformedResponse => "response did not contain a valid translation",
            FailureCause::Service => "service error",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Failure {
    pub cause: FailureCause,
    pub message: String,
}

impl Failure {
    /// Never leaves `message` empty.
    pub fn new(cause: FailureCause, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            cause.default_message().to_string()
        } else {
            message
        };
        Failure { cause, message }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EntryStatus {
    #[default]
    Pending,
    Success,
    Failed { cause: FailureCause, message: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TranslationEntry {
    pub key: EntryKey,

    #[serde(default)]
    pub source: String,

    #[serde(default)]
    pub translation: String,

    #[serde(default)]
    pub status: EntryStatus,
}

impl TranslationEntry {
    pub fn new(key: EntryKey, source: impl Into<String>) -> Self {
        TranslationEntry {
            key,
            source: source.into(),
            translation: String::new(),
            status: EntryStatus::Pending,
        }
    }

    pub fn mark_success(&mut self, translation: impl Into<String>) {
        self.translation = translation.into();
        self.status = EntryStatus::Success;
    }

    pub fn mark_failed(&mut self, failure: Failure) {
        self.status = EntryStatus::Failed {
            cause: failure.cause,
            message: failure.message,
        };
    }

    pub fn is_success(&self) -> bool {
        self.status == EntryStatus::Success
    }

    pub fn is_pending(&self) -> bool {
        self.status == EntryStatus::Pending
    }

    pub fn failure(&self) -> Option<Failure> {
        match &self.status {
            EntryStatus::Failed { cause, message } => Some(Failure {
                cause: *cause,
                message: message.clone(),
            }),
            _ => None,
        }
    }

    /// What the loader should show: the translation once it succeeded, else the source.
    pub fn effective_text(&self) -> &str {
        if self.is_success() && !self.translation.trim().is_empty() {
            &self.translation
        } else {
            &self.source
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_message_is_never_empty() {
        let f = Failure::new(FailureCause::RateLimit, "  ");
        assert_eq!(f.message, "rate limited");

        let mut e = TranslationEntry::new(EntryKey::new("p", FieldKey::title("N")), "Node");
        e.mark_failed(f);
        assert!(matches!(e.status, EntryStatus::Failed { ref message, .. } if !message.is_empty()));
        assert_eq!(e.effective_text(), "Node");
    }

    #[test]
    fn display_includes_name_only_when_present() {
        let title = EntryKey::new("pack", FieldKey::title("Loader"));
        assert_eq!(title.to_string(), "pack/Loader/title");

        let seed = EntryKey::new("pack", FieldKey::new("KSampler", Section::Widgets, "seed"));
        assert_eq!(seed.to_string(), "pack/KSampler/widgets/seed");
    }

    #[test]
    fn status_serializes_with_state_tag() {
        let mut e = TranslationEntry::new(EntryKey::new("p", FieldKey::title("N")), "Node");
        e.mark_failed(Failure::new(FailureCause::Authentication, "HTTP 401: bad key"));
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["status"]["state"], "failed");
        assert_eq!(v["status"]["cause"], "authentication");
        assert_eq!(v["key"]["section"], "title");
    }
}
