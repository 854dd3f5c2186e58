use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::model::document::PluginSection;
use crate::model::entry::{FieldKey, TranslationEntry};
use crate::model::node::{NodeDefinition, Section};

fn missing_tooltip(label: &str) -> String {
    format!("该参数用于设置“{label}”")
}

/// Loader JSON for one plugin, nodes and fields in parse order.
pub fn render_plugin(section: &PluginSection, fill_missing_tooltips: bool) -> Value {
    let by_field: HashMap<&FieldKey, &TranslationEntry> =
        section.entries.iter().map(|e| (&e.key.field, e)).collect();

    let mut root = Map::new();
    for node in &section.plugin.nodes {
        root.insert(
            node.key.clone(),
            Value::Object(render_node(node, &by_field, fill_missing_tooltips)),
        );
    }
    Value::Object(root)
}

fn render_node(
    node: &NodeDefinition,
    by_field: &HashMap<&FieldKey, &TranslationEntry>,
    fill_missing_tooltips: bool,
) -> Map<String, Value> {
    // Falls back to the source when a field has no entry at all.
    let text = |section: Section, name: &str, source: &str| -> String {
        by_field
            .get(&FieldKey::new(node.key.as_str(), section, name))
            .map(|e| e.effective_text().to_string())
            .unwrap_or_else(|| source.to_string())
    };

    let mut obj = Map::new();
    obj.insert("title".into(), Value::String(text(Section::Title, "", &node.title)));

    for section in Section::LABELS {
        let labels: Map<String, Value> = node
            .labels(section)
            .iter()
            .map(|name| (name.clone(), Value::String(text(section, name, name))))
            .collect();
        obj.insert(section.as_str().into(), Value::Object(labels));
    }

    let mut tooltips = Map::new();
    for t in &node.tooltips {
        tooltips.insert(
            t.field.clone(),
            Value::String(text(Section::Tooltips, &t.field, &t.text)),
        );
    }
    if fill_missing_tooltips {
        for section in [Section::Inputs, Section::Widgets] {
            for name in node.labels(section) {
                if !tooltips.contains_key(name) {
                    let label = text(section, name, name);
                    tooltips.insert(name.clone(), Value::String(missing_tooltip(&label)));
                }
            }
        }
    }
    obj.insert("tooltips".into(), Value::Object(tooltips));
    obj
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entry::EntryKey;
    use crate::model::node::Plugin;

    fn section() -> PluginSection {
        let mut node = NodeDefinition::new("KSamplerX", "KSamplerX");
        node.title = "KSampler X".into();
        node.push_label(Section::Inputs, "model");
        node.push_label(Section::Widgets, "seed");
        node.push_label(Section::Outputs, "LATENT");
        node.set_tooltip("seed", "Random seed");

        let mut s = PluginSection::from_plugin(Plugin {
            name: "plug".into(),
            nodes: vec![node],
            ..Default::default()
        });
        let key = |sec, name: &str| EntryKey::new("plug", FieldKey::new("KSamplerX", sec, name));
        for e in &mut s.entries {
            if e.key == key(Section::Widgets, "seed") {
                e.mark_success("随机种子");
            }
            if e.key == key(Section::Inputs, "model") {
                e.mark_success("模型");
            }
        }
        s
    }

    #[test]
    fn untranslated_fields_fall_back_to_source() {
        let v = render_plugin(&section(), false);
        let node = &v["KSamplerX"];
        assert_eq!(node["title"], "KSampler X");
        assert_eq!(node["widgets"]["seed"], "随机种子");
        assert_eq!(node["outputs"]["LATENT"], "LATENT");
        assert_eq!(node["tooltips"]["seed"], "Random seed");
        assert!(node["tooltips"].get("model").is_none());
    }

    #[test]
    fn missing_tooltips_use_translated_label() {
        let v = render_plugin(&section(), true);
        assert_eq!(v["KSamplerX"]["tooltips"]["model"], "该参数用于设置“模型”");
        assert_eq!(v["KSamplerX"]["tooltips"]["seed"], "Random seed");
        assert!(v["KSamplerX"]["tooltips"].get("LATENT").is_none());
    }

    #[test]
    fn key_order_follows_loader_layout() {
        let v = render_plugin(&section(), true);
        let keys: Vec<_> = v["KSamplerX"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["title", "inputs", "widgets", "outputs", "tooltips"]);
    }
}
