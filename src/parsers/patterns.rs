use serde::{Deserialize, Serialize};

/// Names the scanner looks for. Every field can be overridden from the
/// `parser` section of `config.json`; omitted fields keep their defaults.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ParserPatterns {
    pub class_mappings: Vec<String>,
    pub display_mappings: Vec<String>,
    pub input_types_method: String,
    pub input_sections: Vec<String>,
    pub tooltip_param: String,
    pub return_types_attr: String,
    pub return_names_attr: String,
    pub display_name_attrs: Vec<String>,
    pub category_attr: String,
    pub function_attr: String,
    pub output_node_attr: String,
    pub widget_types: Vec<String>,

    pub v3_entrypoint: String,
    pub v3_extension_base: String,
    pub v3_node_list_method: String,
    pub v3_schema_method: String,

    pub ignored_dirs: Vec<String>,
    pub skipped_file_prefixes: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for ParserPatterns {
    fn default() -> Self {
        ParserPatterns {
            class_mappings: strings(&["NODE_CLASS_MAPPINGS"]),
            display_mappings: strings(&["NODE_DISPLAY_NAME_MAPPINGS"]),
            input_types_method: "INPUT_TYPES".into(),
            input_sections: strings(&["required", "optional", "hidden"]),
            tooltip_param: "tooltip".into(),
            return_types_attr: "RETURN_TYPES".into(),
            return_names_attr: "RETURN_NAMES".into(),
            display_name_attrs: strings(&["NODE_DISPLAY_NAME", "NODE_NAME"]),
            category_attr: "CATEGORY".into(),
            function_attr: "FUNCTION".into(),
            output_node_attr: "OUTPUT_NODE".into(),
            widget_types: strings(&[
                "INT", "FLOAT", "STRING", "BOOLEAN", "COMBO", "DROPDOWN", "TEXT", "TEXTAREA",
                "SLIDER", "CHECKBOX", "COLOR", "RADIO", "SELECT", "NUMBER",
            ]),
            v3_entrypoint: "comfy_entrypoint".into(),
            v3_extension_base: "ComfyExtension".into(),
            v3_node_list_method: "get_node_list".into(),
            v3_schema_method: "define_schema".into(),
            ignored_dirs: strings(&["__pycache__", ".git", "node_modules", "venv", ".venv"]),
            skipped_file_prefixes: strings(&["test_"]),
        }
    }
}

impl ParserPatterns {
    pub fn is_widget_type(&self, type_name: &str) -> bool {
        self.widget_types
            .iter()
            .any(|w| w.eq_ignore_ascii_case(type_name))
    }

    pub fn is_class_mapping(&self, name: &str) -> bool {
        self.class_mappings.iter().any(|m| m == name)
    }

    pub fn is_display_mapping(&self, name: &str) -> bool {
        self.display_mappings.iter().any(|m| m == name)
    }

    pub fn is_ignored_dir(&self, name: &str) -> bool {
        self.ignored_dirs.iter().any(|d| d == name)
    }

    pub fn is_skipped_file(&self, file_name: &str) -> bool {
        self.skipped_file_prefixes
            .iter()
            .any(|p| file_name.starts_with(p.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_override_keeps_other_defaults() {
        let p: ParserPatterns =
            serde_json::from_str(r#"{"class_mappings": ["NODE_CLASS_MAPPINGS", "EXTRA_NODES"]}"#)
                .unwrap();
        assert!(p.is_class_mapping("EXTRA_NODES"));
        assert!(p.is_display_mapping("NODE_DISPLAY_NAME_MAPPINGS"));
        assert!(p.is_widget_type("int"));
        assert!(!p.is_widget_type("IMAGE"));
    }
}
