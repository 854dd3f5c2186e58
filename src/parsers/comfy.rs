//! Legacy (V1/V2) node registration: mapping tables plus classes with
//! `INPUT_TYPES` / `RETURN_TYPES`.

use std::collections::HashMap;

use tree_sitter::Node;

use super::patterns::ParserPatterns;
use super::syntax::{
    assignment_parts, descendants_of_kind, dict_pairs, last_segment, name_of,
    named_children, positional_args, sequence_items, string_value, text, unparen,
    unwrap_definition,
};
use super::SourceFile;
use crate::model::node::{ApiVersion, NodeDefinition, Section};

/// Registration tables merged over every file of a plugin.
#[derive(Debug, Default)]
pub struct Mappings {
    /// `(key, class name)` in first-seen order.
    pub classes: Vec<(String, String)>,
    pub display: HashMap<String, String>,
}

impl Mappings {
    fn add_class(&mut self, key: String, class_name: String) {
        match self.classes.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = class_name,
            None => self.classes.push((key, class_name)),
        }
    }

    fn keys_for(&self, class_name: &str) -> Vec<&str> {
        self.classes
            .iter()
            .filter(|(_, c)| c == class_name)
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

pub fn collect_mappings(files: &[SourceFile], patterns: &ParserPatterns) -> Mappings {
    let mut mappings = Mappings::default();
    for file in files {
        let root = file.tree.root_node();
        let src = file.source.as_str();

        for assign in descendants_of_kind(root, "assignment")
            .into_iter()
            .chain(descendants_of_kind(root, "augmented_assignment"))
        {
            let Some((left, right)) = assignment_parts(assign) else {
                continue;
            };
            match left.kind() {
                // NAME = {...} / NAME |= {...}
                "identifier" => {
                    let name = text(left, src);
                    if let Some(dict) = dict_literal(right) {
                        absorb_table(&mut mappings, patterns, name, dict, src);
                    }
                }
                // NAME["Key"] = Value
                "subscript" => {
                    let (Some(target), Some(index)) = (
                        left.child_by_field_name("value"),
                        left.child_by_field_name("subscript"),
                    ) else {
                        continue;
                    };
                    if target.kind() != "identifier" {
                        continue;
                    }
                    let Some(key) = string_value(index, src) else {
                        continue;
                    };
                    absorb_pair(&mut mappings, patterns, text(target, src), key, right, src);
                }
                _ => {}
            }
        }

        // NAME.update({...})
        for call in descendants_of_kind(root, "call") {
            let Some(func) = call.child_by_field_name("function") else {
                continue;
            };
            if func.kind() != "attribute" {
                continue;
            }
            let (Some(object), Some(method)) = (
                func.child_by_field_name("object"),
                func.child_by_field_name("attribute"),
            ) else {
                continue;
            };
            if object.kind() != "identifier" || text(method, src) != "update" {
                continue;
            }
            let name = text(object, src);
            for arg in positional_args(call) {
                if let Some(dict) = dict_literal(arg) {
                    absorb_table(&mut mappings, patterns, name, dict, src);
                }
            }
        }
    }
    mappings
}

fn dict_literal(node: Node) -> Option<Node> {
    let node = unparen(node);
    (node.kind() == "dictionary").then_some(node)
}

fn absorb_table(
    mappings: &mut Mappings,
    patterns: &ParserPatterns,
    table: &str,
    dict: Node,
    src: &str,
) {
    for (k, v) in dict_pairs(dict) {
        if let Some(key) = string_value(k, src) {
            absorb_pair(mappings, patterns, table, key, v, src);
        }
    }
}

fn absorb_pair(
    mappings: &mut Mappings,
    patterns: &ParserPatterns,
    table: &str,
    key: String,
    value: Node,
    src: &str,
) {
    if patterns.is_class_mapping(table) {
        if let Some(class_name) = last_segment(unparen(value), src) {
            mappings.add_class(key, class_name.to_string());
        }
    } else if patterns.is_display_mapping(table) {
        if let Some(title) = string_value(value, src) {
            mappings.display.insert(key, title);
        }
    }
}

/// Node classes of every file, keyed and titled through `mappings`.
pub fn extract(
    files: &[SourceFile],
    mappings: &Mappings,
    patterns: &ParserPatterns,
) -> Vec<NodeDefinition> {
    let mut nodes: Vec<NodeDefinition> = Vec::new();

    for file in files {
        let src = file.source.as_str();
        for class in descendants_of_kind(file.tree.root_node(), "class_definition") {
            let Some(class_name) = name_of(class, src) else {
                continue;
            };
            let Some(parsed) = parse_node_class(class, src, patterns) else {
                continue;
            };
            let class_title = patterns
                .display_name_attrs
                .iter()
                .find_map(|a| parsed.display_attrs.get(a).cloned());

            let mapped = mappings.keys_for(class_name);
            let keys: Vec<&str> = if mapped.is_empty() {
                vec![class_name]
            } else {
                mapped
            };

            for key in keys {
                let mut node = parsed.node.clone();
                node.key = key.to_string();
                node.class_name = class_name.to_string();
                node.source_file = file.rel_path.clone();
                node.title = mappings
                    .display
                    .get(key)
                    .cloned()
                    .or_else(|| class_title.clone())
                    .unwrap_or_else(|| key.to_string());

                tracing::debug!(class = class_name, key, title = %node.title, "legacy node");
                match nodes.iter_mut().find(|n| n.key == node.key) {
                    Some(existing) => *existing = node,
                    None => nodes.push(node),
                }
            }
        }
    }
    nodes
}

struct ParsedClass {
    node: NodeDefinition,
    /// `NODE_DISPLAY_NAME`-style attributes, resolved once the key is known.
    display_attrs: HashMap<String, String>,
}

/// Class body scan. `None` when the class is not a node.
fn parse_node_class(class: Node, src: &str, patterns: &ParserPatterns) -> Option<ParsedClass> {
    let body = class.child_by_field_name("body")?;

    let mut node = NodeDefinition {
        api_version: ApiVersion::V1,
        ..Default::default()
    };
    let mut is_node = false;
    let mut return_types: Option<Vec<String>> = None;
    let mut return_names: Option<Vec<String>> = None;
    let mut display_attrs: HashMap<String, String> = HashMap::new();

    for item in named_children(body) {
        let item = unwrap_definition(item);

        if item.kind() == "function_definition" {
            if name_of(item, src) == Some(patterns.input_types_method.as_str()) {
                is_node = true;
                parse_input_types(item, src, patterns, &mut node);
            }
            continue;
        }

        let Some((left, right)) = assignment_parts(item) else {
            continue;
        };
        if left.kind() != "identifier" {
            continue;
        }
        let attr = text(left, src);

        if attr == patterns.return_types_attr {
            is_node = true;
            return_types = Some(name_list(right, src));
        } else if attr == patterns.return_names_attr {
            return_names = Some(name_list(right, src));
        } else if attr == patterns.category_attr {
            node.category = string_value(right, src);
        } else if attr == patterns.function_attr {
            node.function = string_value(right, src);
        } else if attr == patterns.output_node_attr {
            node.is_output = text(unparen(right), src) == "True";
        } else if patterns.display_name_attrs.iter().any(|a| a == attr) {
            if let Some(v) = string_value(right, src) {
                display_attrs.insert(attr.to_string(), v);
            }
        }
    }

    if !is_node {
        return None;
    }

    let outputs = return_names
        .filter(|n| !n.is_empty())
        .or(return_types)
        .unwrap_or_default();
    for name in outputs {
        node.push_label(Section::Outputs, &name);
    }
    Some(ParsedClass {
        node,
        display_attrs,
    })
}

/// String or identifier elements of a tuple/list.
fn name_list(node: Node, src: &str) -> Vec<String> {
    let Some(items) = sequence_items(node) else {
        return string_value(node, src).into_iter().collect();
    };
    items
        .into_iter()
        .filter_map(|item| {
            string_value(item, src).or_else(|| last_segment(item, src).map(str::to_string))
        })
        .collect()
}

fn parse_input_types(func: Node, src: &str, patterns: &ParserPatterns, node: &mut NodeDefinition) {
    let Some(body) = func.child_by_field_name("body") else {
        return;
    };

    for ret in descendants_of_kind(body, "return_statement") {
        let Some(value) = named_children(ret).into_iter().next() else {
            continue;
        };
        let Some(dict) = resolve_dict(value, body, src) else {
            continue;
        };

        for (section_key, section_val) in dict_pairs(dict) {
            let Some(section_name) = string_value(section_key, src) else {
                continue;
            };
            if !patterns.input_sections.iter().any(|s| *s == section_name) {
                continue;
            }
            let Some(items) = resolve_dict(section_val, body, src) else {
                continue;
            };
            for (item_key, item_val) in dict_pairs(items) {
                let Some(name) = string_value(item_key, src) else {
                    continue;
                };
                parse_input_item(&name, item_val, src, patterns, node);
            }
        }
    }
}

/// A dict literal, or a local name assigned one inside `scope`.
fn resolve_dict<'t>(value: Node<'t>, scope: Node<'t>, src: &str) -> Option<Node<'t>> {
    let value = unparen(value);
    if value.kind() == "dictionary" {
        return Some(value);
    }
    if value.kind() != "identifier" {
        return None;
    }
    let name = text(value, src);
    descendants_of_kind(scope, "assignment")
        .into_iter()
        .filter_map(|a| assignment_parts(a))
        .filter(|(left, _)| left.kind() == "identifier" && text(*left, src) == name)
        .find_map(|(_, right)| dict_literal(right))
}

/// `"name": (TYPE, {params})`.
fn parse_input_item(
    name: &str,
    value: Node,
    src: &str,
    patterns: &ParserPatterns,
    node: &mut NodeDefinition,
) {
    let value = unparen(value);
    let Some(elements) = (value.kind() == "tuple").then(|| named_children(value)) else {
        return;
    };
    let Some(first) = elements.first() else {
        return;
    };

    let type_name = type_name(*first, src);
    let section = if patterns.is_widget_type(&type_name) {
        Section::Widgets
    } else {
        Section::Inputs
    };
    node.push_label(section, name);

    if let Some(params) = elements.get(1).and_then(|p| dict_literal(*p)) {
        for (k, v) in dict_pairs(params) {
            if string_value(k, src).as_deref() != Some(patterns.tooltip_param.as_str()) {
                continue;
            }
            if let Some(tip) = string_value(v, src) {
                node.set_tooltip(name, tip);
            }
        }
    }
}

fn type_name(node: Node, src: &str) -> String {
    let node = unparen(node);
    match node.kind() {
        "string" | "concatenated_string" => string_value(node, src).unwrap_or_default(),
        "identifier" | "attribute" => last_segment(node, src).unwrap_or_default().to_string(),
        "list" | "tuple" | "list_comprehension" | "set" | "set_comprehension"
        | "generator_expression" | "call" => "COMBO".to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::source_file;
    use super::*;

    const NODES_PY: &str = r#"
import folder_paths

class KSamplerLite:
    @classmethod
    def INPUT_TYPES(s):
        return {
            "required": {
                "model": ("MODEL",),
                "seed": ("INT", {"default": 0, "min": 0, "tooltip": "The random seed"}),
                "sampler_name": (comfy.samplers.KSampler.SAMPLERS, ),
                "ckpt": (folder_paths.get_filename_list("checkpoints"), ),
                "mode": (["fast", "slow"],),
            },
            "optional": {
                "positive": ("CONDITIONING", {"tooltip": "conditioning " "text"}),
            },
            "hidden": {"prompt": "PROMPT"},
        }

    RETURN_TYPES = ("LATENT",)
    FUNCTION = "sample"
    CATEGORY = "sampling"

class Helper:
    def run(self):
        pass

class LocalDict:
    NODE_NAME = "Local Dict Node"
    OUTPUT_NODE = True

    @classmethod
    def INPUT_TYPES(cls):
        inputs = {"required": {"image": ("IMAGE",), "strength": ("FLOAT", {})}}
        return inputs

    RETURN_TYPES = ("IMAGE", "MASK")
    RETURN_NAMES = ("image_out", "mask_out")
"#;

    const INIT_PY: &str = r#"
from .nodes import KSamplerLite, LocalDict

NODE_CLASS_MAPPINGS = {"KSamplerLite": KSamplerLite}
NODE_CLASS_MAPPINGS.update({"LocalDictNode": LocalDict})
NODE_DISPLAY_NAME_MAPPINGS = {}
NODE_DISPLAY_NAME_MAPPINGS["KSamplerLite"] = "KSampler (Lite)"
"#;

    fn parse() -> Vec<NodeDefinition> {
        let files = vec![
            source_file("__init__.py", INIT_PY),
            source_file("nodes.py", NODES_PY),
        ];
        let patterns = ParserPatterns::default();
        let mappings = collect_mappings(&files, &patterns);
        extract(&files, &mappings, &patterns)
    }

    #[test]
    fn classifies_inputs_and_widgets() {
        let nodes = parse();
        assert_eq!(nodes.len(), 2);

        let ks = nodes.iter().find(|n| n.key == "KSamplerLite").unwrap();
        assert_eq!(ks.title, "KSampler (Lite)");
        assert_eq!(ks.inputs, vec!["model", "sampler_name", "positive"]);
        assert_eq!(ks.widgets, vec!["seed", "ckpt", "mode"]);
        assert_eq!(ks.outputs, vec!["LATENT"]);
        assert_eq!(ks.tooltip("seed"), Some("The random seed"));
        assert_eq!(ks.tooltip("positive"), Some("conditioning text"));
        assert_eq!(ks.category.as_deref(), Some("sampling"));
        assert_eq!(ks.function.as_deref(), Some("sample"));
        assert_eq!(ks.source_file, "nodes.py");
    }

    #[test]
    fn local_dict_and_return_names() {
        let nodes = parse();
        let local = nodes.iter().find(|n| n.key == "LocalDictNode").unwrap();
        assert_eq!(local.class_name, "LocalDict");
        assert_eq!(local.title, "Local Dict Node");
        assert_eq!(local.inputs, vec!["image"]);
        assert_eq!(local.widgets, vec!["strength"]);
        assert_eq!(local.outputs, vec!["image_out", "mask_out"]);
        assert!(local.is_output);
    }

    #[test]
    fn plain_classes_are_ignored() {
        assert!(parse().iter().all(|n| n.class_name != "Helper"));
    }

    #[test]
    fn unmapped_class_uses_class_name() {
        let files = vec![source_file("nodes.py", NODES_PY)];
        let patterns = ParserPatterns::default();
        let mappings = collect_mappings(&files, &patterns);
        let nodes = extract(&files, &mappings, &patterns);
        let ks = nodes.iter().find(|n| n.class_name == "KSamplerLite").unwrap();
        assert_eq!(ks.key, "KSamplerLite");
        assert_eq!(ks.title, "KSamplerLite");
    }
}
