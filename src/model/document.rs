use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entry::{EntryKey, FieldKey, TranslationEntry};
use super::node::{is_human_readable, NodeDefinition, Plugin, Section};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PluginSection {
    pub plugin: Plugin,
    pub entries: Vec<TranslationEntry>,
}

impl PluginSection {
    /// One pending entry per node field, in loader order.
    pub fn from_plugin(plugin: Plugin) -> Self {
        let mut entries = Vec::new();
        for node in &plugin.nodes {
            for (section, name, text) in node.fields() {
                let key = EntryKey::new(&plugin.name, FieldKey::new(&node.key, section, name));
                entries.push(TranslationEntry::new(key, text));
            }
        }
        PluginSection { plugin, entries }
    }

    pub fn name(&self) -> &str {
        &self.plugin.name
    }

    pub fn entry(&self, field: &FieldKey) -> Option<&TranslationEntry> {
        self.entries.iter().find(|e| &e.key.field == field)
    }

    /// Whether any entry a run in this mode would send is still untranslated.
    pub fn has_unfinished(&self, only_tooltips: bool) -> bool {
        self.entries
            .iter()
            .any(|e| is_candidate(e, only_tooltips) && !e.is_success())
    }
}

fn is_candidate(entry: &TranslationEntry, only_tooltips: bool) -> bool {
    is_human_readable(&entry.source)
        && (!only_tooltips || entry.key.field.section == Section::Tooltips)
}

/// Ordered plugin sections; at most one section per plugin name.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct TranslationDocument {
    pub plugins: Vec<PluginSection>,
}

impl TranslationDocument {
    pub fn new() -> Self {
        TranslationDocument::default()
    }

    /// Adds a freshly parsed plugin, replacing any section with the same name.
    pub fn add_plugin(&mut self, plugin: Plugin) {
        let section = PluginSection::from_plugin(plugin);
        match self.plugins.iter_mut().find(|p| p.name() == section.name()) {
            Some(existing) => *existing = section,
            None => self.plugins.push(section),
        }
    }

    pub fn section(&self, plugin: &str) -> Option<&PluginSection> {
        self.plugins.iter().find(|p| p.name() == plugin)
    }

    pub fn entry(&self, key: &EntryKey) -> Option<&TranslationEntry> {
        self.section(&key.plugin)?.entry(&key.field)
    }

    pub fn entry_mut(&mut self, key: &EntryKey) -> Option<&mut TranslationEntry> {
        self.plugins
            .iter_mut()
            .find(|p| p.plugin.name == key.plugin)?
            .entries
            .iter_mut()
            .find(|e| e.key.field == key.field)
    }

    pub fn entries(&self) -> impl Iterator<Item = &TranslationEntry> {
        self.plugins.iter().flat_map(|p| p.entries.iter())
    }

    pub fn len(&self) -> usize {
        self.plugins.iter().map(|p| p.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys worth translating, in document order.
    pub fn candidates(&self, only_tooltips: bool) -> Vec<EntryKey> {
        self.entries()
            .filter(|e| is_candidate(e, only_tooltips))
            .map(|e| e.key.clone())
            .collect()
    }

    pub fn effective_values(&self) -> BTreeMap<EntryKey, String> {
        self.entries()
            .map(|e| (e.key.clone(), e.effective_text().to_string()))
            .collect()
    }

    /// Reads one plugin back from a loader translation file.
    ///
    /// Every value present in the file counts as a successful translation
    /// whose source is the field name (the node key for titles). Fields the
    /// file does not carry get no entry.
    pub fn from_loader_json(plugin_name: &str, root: &Value) -> Self {
        let mut plugin = Plugin {
            name: plugin_name.to_string(),
            ..Default::default()
        };
        let mut values: Vec<(FieldKey, String)> = Vec::new();

        if let Some(obj) = root.as_object() {
            for (node_key, node_val) in obj {
                let Some(node_obj) = node_val.as_object() else {
                    continue;
                };
                let mut node = NodeDefinition::new(node_key.as_str(), node_key.as_str());

                if let Some(title) = node_obj.get("title").and_then(|v| v.as_str()) {
                    values.push((FieldKey::title(node_key.as_str()), title.to_string()));
                }

                for section in Section::LABELS {
                    let Some(map) = node_obj.get(section.as_str()).and_then(|v| v.as_object())
                    else {
                        continue;
                    };
                    for (name, v) in map {
                        node.push_label(section, name);
                        values.push((
                            FieldKey::new(node_key.as_str(), section, name.as_str()),
                            value_text(v),
                        ));
                    }
                }

                if let Some(map) = node_obj.get("tooltips").and_then(|v| v.as_object()) {
                    for (name, v) in map {
                        let text = value_text(v);
                        node.set_tooltip(name, text.clone());
                        values.push((
                            FieldKey::new(node_key.as_str(), Section::Tooltips, name.as_str()),
                            text,
                        ));
                    }
                }

                plugin.upsert_node(node);
            }
        }

        let mut section = PluginSection::from_plugin(plugin);
        for (field, text) in values {
            if let Some(entry) = section.entries.iter_mut().find(|e| e.key.field == field) {
                entry.mark_success(text);
            }
        }
        section.entries.retain(|e| e.is_success());

        TranslationDocument {
            plugins: vec![section],
        }
    }
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
