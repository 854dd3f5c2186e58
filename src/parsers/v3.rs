//! ComfyUI V3 extensions: `comfy_entrypoint` + `ComfyExtension.get_node_list`
//! + per-class `define_schema`.

use tree_sitter::Node;

use super::patterns::ParserPatterns;
use super::syntax::{
    descendants_of_kind, keyword_arg, keyword_args, last_segment, name_of, named_children,
    positional_args, sequence_items, string_value, unparen, unwrap_definition,
};
use super::SourceFile;
use crate::model::node::{ApiVersion, NodeDefinition, Section};

pub fn has_entrypoint(files: &[SourceFile], patterns: &ParserPatterns) -> bool {
    files.iter().any(|f| {
        descendants_of_kind(f.tree.root_node(), "function_definition")
            .into_iter()
            .any(|func| name_of(func, &f.source) == Some(patterns.v3_entrypoint.as_str()))
    })
}

/// Empty when the plugin is not a V3 extension.
pub fn extract(files: &[SourceFile], patterns: &ParserPatterns) -> Vec<NodeDefinition> {
    if !has_entrypoint(files, patterns) {
        return Vec::new();
    }

    let listed = listed_classes(files, patterns);
    tracing::debug!(classes = ?listed, "v3 node list");

    let mut nodes: Vec<NodeDefinition> = Vec::new();
    for class_name in listed {
        let Some(node) = find_schema(files, &class_name, patterns) else {
            tracing::warn!(class = %class_name, "v3 node listed without a schema");
            continue;
        };
        match nodes.iter_mut().find(|n| n.key == node.key) {
            Some(existing) => *existing = node,
            None => nodes.push(node),
        }
    }
    nodes
}

fn class_body_items<'t>(class: Node<'t>) -> Vec<Node<'t>> {
    class
        .child_by_field_name("body")
        .map(named_children)
        .unwrap_or_default()
        .into_iter()
        .map(unwrap_definition)
        .collect()
}

fn derives_from(class: Node, src: &str, base: &str) -> bool {
    class
        .child_by_field_name("superclasses")
        .map(named_children)
        .unwrap_or_default()
        .into_iter()
        .any(|b| last_segment(b, src) == Some(base))
}

fn method<'t>(class: Node<'t>, src: &str, name: &str) -> Option<Node<'t>> {
    class_body_items(class)
        .into_iter()
        .find(|item| item.kind() == "function_definition" && name_of(*item, src) == Some(name))
}

fn listed_classes(files: &[SourceFile], patterns: &ParserPatterns) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for file in files {
        let src = file.source.as_str();
        for class in descendants_of_kind(file.tree.root_node(), "class_definition") {
            if !derives_from(class, src, &patterns.v3_extension_base) {
                continue;
            }
            let Some(func) = method(class, src, &patterns.v3_node_list_method) else {
                continue;
            };
            for ret in descendants_of_kind(func, "return_statement") {
                let Some(value) = named_children(ret).into_iter().next() else {
                    continue;
                };
                for item in sequence_items(value).unwrap_or_default() {
                    if let Some(name) = last_segment(item, src) {
                        if !out.iter().any(|n| n == name) {
                            out.push(name.to_string());
                        }
                    }
                }
            }
        }
    }
    out
}

fn find_schema(
    files: &[SourceFile],
    class_name: &str,
    patterns: &ParserPatterns,
) -> Option<NodeDefinition> {
    for file in files {
        let src = file.source.as_str();
        for class in descendants_of_kind(file.tree.root_node(), "class_definition") {
            if name_of(class, src) != Some(class_name) {
                continue;
            }
            let Some(func) = method(class, src, &patterns.v3_schema_method) else {
                continue;
            };
            if let Some(mut node) = parse_define_schema(func, class_name, src) {
                node.source_file = file.rel_path.clone();
                return Some(node);
            }
        }
    }
    None
}

fn parse_define_schema(func: Node, class_name: &str, src: &str) -> Option<NodeDefinition> {
    let schema = descendants_of_kind(func, "return_statement")
        .into_iter()
        .filter_map(|ret| named_children(ret).into_iter().next())
        .map(unparen)
        .find(|v| v.kind() == "call")?;

    let mut node = NodeDefinition::new(class_name, class_name);
    node.api_version = ApiVersion::V3;
    let mut display_name: Option<String> = None;

    for (kw, value) in keyword_args(schema, src) {
        match kw.as_str() {
            "node_id" => {
                if let Some(id) = string_value(value, src) {
                    node.key = id;
                }
            }
            "display_name" => display_name = string_value(value, src),
            "category" => node.category = string_value(value, src),
            "is_output_node" => node.is_output = value.kind() == "true",
            "inputs" => {
                for item in sequence_items(value).unwrap_or_default() {
                    parse_input(unparen(item), src, &mut node);
                }
            }
            "outputs" => {
                for item in sequence_items(value).unwrap_or_default() {
                    if let Some(name) = io_name(unparen(item), src, &["display_name", "name"]) {
                        node.push_label(Section::Outputs, &name);
                    }
                }
            }
            _ => {}
        }
    }

    node.title = display_name.unwrap_or_else(|| node.key.clone());
    Some(node)
}

/// First positional string, else the first matching keyword.
fn io_name(call: Node, src: &str, keywords: &[&str]) -> Option<String> {
    if call.kind() != "call" {
        return None;
    }
    if let Some(name) = positional_args(call)
        .first()
        .and_then(|a| string_value(*a, src))
    {
        return Some(name);
    }
    keywords
        .iter()
        .find_map(|k| keyword_arg(call, src, k).and_then(|v| string_value(v, src)))
}

fn parse_input(call: Node, src: &str, node: &mut NodeDefinition) {
    let Some(name) = io_name(call, src, &["name"]) else {
        return;
    };
    node.push_label(Section::Inputs, &name);

    let tooltip = keyword_arg(call, src, "tooltip")
        .and_then(|v| string_value(v, src))
        .or_else(|| keyword_arg(call, src, "description").and_then(|v| string_value(v, src)));
    if let Some(tip) = tooltip {
        node.set_tooltip(&name, tip);
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::source_file;
    use super::*;

    const EXT_PY: &str = r#"
from comfy_api.latest import ComfyExtension, io
from .nodes import Blur

class BlurExtension(ComfyExtension):
    async def get_node_list(self) -> list[type[io.ComfyNode]]:
        return [Blur]

async def comfy_entrypoint() -> BlurExtension:
    return BlurExtension()
"#;

    const NODES_PY: &str = r#"
from comfy_api.latest import io

class Blur(io.ComfyNode):
    @classmethod
    def define_schema(cls):
        return io.Schema(
            node_id="ImageBlurV3",
            display_name="Image Blur",
            category="image/filters",
            inputs=[
                io.Image.Input("image", tooltip="Image to blur"),
                io.Int.Input("radius", default=3, description="Blur radius"),
                io.Float.Input(name="sigma"),
            ],
            outputs=[
                io.Image.Output("blurred"),
                io.Custom("MASK").Output(display_name="mask"),
            ],
        )
"#;

    #[test]
    fn reads_schema_of_listed_nodes() {
        let files = vec![
            source_file("__init__.py", EXT_PY),
            source_file("nodes.py", NODES_PY),
        ];
        let nodes = extract(&files, &ParserPatterns::default());
        assert_eq!(nodes.len(), 1);

        let blur = &nodes[0];
        assert_eq!(blur.key, "ImageBlurV3");
        assert_eq!(blur.class_name, "Blur");
        assert_eq!(blur.title, "Image Blur");
        assert_eq!(blur.api_version, ApiVersion::V3);
        assert_eq!(blur.inputs, vec!["image", "radius", "sigma"]);
        assert!(blur.widgets.is_empty());
        assert_eq!(blur.outputs, vec!["blurred", "mask"]);
        assert_eq!(blur.tooltip("image"), Some("Image to blur"));
        assert_eq!(blur.tooltip("radius"), Some("Blur radius"));
        assert_eq!(blur.source_file, "nodes.py");
    }

    #[test]
    fn no_entrypoint_means_no_v3_nodes() {
        let files = vec![source_file("nodes.py", NODES_PY)];
        assert!(extract(&files, &ParserPatterns::default()).is_empty());
    }
}
