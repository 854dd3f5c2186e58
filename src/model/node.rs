use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Title,
    Inputs,
    Widgets,
    Outputs,
    Tooltips,
}

impl Section {
    pub const LABELS: [Section; 3] = [Section::Inputs, Section::Widgets, Section::Outputs];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Title => "title",
            Section::Inputs => "inputs",
            Section::Widgets => "widgets",
            Section::Outputs => "outputs",
            Section::Tooltips => "tooltips",
        }
    }

    pub fn is_label(&self) -> bool {
        matches!(self, Section::Inputs | Section::Widgets | Section::Outputs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiVersion {
    #[default]
    V1,
    V3,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FieldTooltip {
    pub field: String,
    pub text: String,
}

/// One ComfyUI node as found in the plugin source.
///
/// Input, widget and output labels are the field names themselves; the
/// loader keys its translations by those names.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct NodeDefinition {
    pub key: String,

    #[serde(default)]
    pub class_name: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub inputs: Vec<String>,

    #[serde(default)]
    pub widgets: Vec<String>,

    /// Output names in return order.
    #[serde(default)]
    pub outputs: Vec<String>,

    #[serde(default)]
    pub tooltips: Vec<FieldTooltip>,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub function: Option<String>,

    #[serde(default)]
    pub is_output: bool,

    #[serde(default)]
    pub api_version: ApiVersion,

    #[serde(default)]
    pub source_file: String,
}

impl NodeDefinition {
    pub fn new(key: impl Into<String>, class_name: impl Into<String>) -> Self {
        let key = key.into();
        NodeDefinition {
            title: key.clone(),
            key,
            class_name: class_name.into(),
            ..Default::default()
        }
    }

    pub fn tooltip(&self, field: &str) -> Option<&str> {
        self.tooltips
            .iter()
            .find(|t| t.field == field)
            .map(|t| t.text.as_str())
    }

    pub fn set_tooltip(&mut self, field: &str, text: impl Into<String>) {
        let text = text.into();
        match self.tooltips.iter_mut().find(|t| t.field == field) {
            Some(existing) => existing.text = text,
            None => self.tooltips.push(FieldTooltip {
                field: field.to_string(),
                text,
            }),
        }
    }

    pub fn labels(&self, section: Section) -> &[String] {
        match section {
            Section::Inputs => &self.inputs,
            Section::Widgets => &self.widgets,
            Section::Outputs => &self.outputs,
            Section::Title | Section::Tooltips => &[],
        }
    }

    pub fn push_label(&mut self, section: Section, name: &str) {
        let list = match section {
            Section::Inputs => &mut self.inputs,
            Section::Widgets => &mut self.widgets,
            Section::Outputs => &mut self.outputs,
            Section::Title | Section::Tooltips => return,
        };
        if !list.iter().any(|n| n == name) {
            list.push(name.to_string());
        }
    }

    /// Source text of a field, if the node has it.
    pub fn source_text(&self, section: Section, name: &str) -> Option<&str> {
        match section {
            Section::Title => Some(self.title.as_str()),
            Section::Tooltips => self.tooltip(name),
            _ => self
                .labels(section)
                .iter()
                .find(|n| n.as_str() == name)
                .map(|n| n.as_str()),
        }
    }

    /// Every field in loader order: title, inputs, widgets, outputs, tooltips.
    pub fn fields(&self) -> Vec<(Section, String, String)> {
        let mut out = vec![(Section::Title, String::new(), self.title.clone())];
        for section in Section::LABELS {
            for name in self.labels(section) {
                out.push((section, name.clone(), name.clone()));
            }
        }
        for t in &self.tooltips {
            out.push((Section::Tooltips, t.field.clone(), t.text.clone()));
        }
        out
    }
}

/// Text worth sending to a translator: at least one letter.
pub fn is_human_readable(text: &str) -> bool {
    text.chars().any(char::is_alphabetic)
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    pub file: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Plugin {
    pub name: String,
    pub path: PathBuf,
    pub nodes: Vec<NodeDefinition>,

    #[serde(default)]
    pub warnings: Vec<ParseWarning>,
}

impl Plugin {
    pub fn node(&self, key: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.key == key)
    }

    /// Inserts or replaces by node key, keeping first-seen position.
    pub fn upsert_node(&mut self, node: NodeDefinition) {
        match self.nodes.iter_mut().find(|n| n.key == node.key) {
            Some(existing) => *existing = node,
            None => self.nodes.push(node),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_readable_requires_a_letter() {
        assert!(is_human_readable("seed"));
        assert!(is_human_readable("随机种子"));
        assert!(!is_human_readable("0"));
        assert!(!is_human_readable("_1"));
        assert!(!is_human_readable(""));
    }

    #[test]
    fn fields_follow_loader_order() {
        let mut node = NodeDefinition::new("KSampler", "KSampler");
        node.push_label(Section::Inputs, "model");
        node.push_label(Section::Widgets, "seed");
        node.push_label(Section::Widgets, "seed");
        node.push_label(Section::Outputs, "LATENT");
        node.set_tooltip("seed", "random seed");

        let fields = node.fields();
        let sections: Vec<Section> = fields.iter().map(|f| f.0).collect();
        assert_eq!(
            sections,
            vec![
                Section::Title,
                Section::Inputs,
                Section::Widgets,
                Section::Outputs,
                Section::Tooltips
            ]
        );
        assert_eq!(node.source_text(Section::Tooltips, "seed"), Some("random seed"));
        assert_eq!(node.source_text(Section::Inputs, "missing"), None);
    }
}
