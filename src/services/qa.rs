use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::model::node::Section;
use crate::services::glossary::Glossary;
use crate::services::output;
use crate::services::validate::has_cjk;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct QaIssue {
    pub node: String,
    pub code: String,
    pub message: String,
}

impl QaIssue {
    fn new(node: &str, code: &str, message: impl Into<String>) -> Self {
        QaIssue {
            node: node.to_string(),
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub valid_json: bool,
    pub node_count: usize,
    pub titled_nodes: usize,
    pub issues: Vec<QaIssue>,
}

/// Inspects a loader file. Only an unreadable file is an error; broken JSON
/// is reported through `valid_json`.
pub fn check(path: &Path) -> Result<CheckReport> {
    let data = fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
    let root: Value = match serde_json::from_str(&data) {
        Ok(v) => v,
        Err(e) => {
            return Ok(CheckReport {
                valid_json: false,
                issues: vec![QaIssue::new("", "INVALID_JSON", e.to_string())],
                ..Default::default()
            })
        }
    };
    Ok(check_value(&root))
}

pub fn check_value(root: &Value) -> CheckReport {
    let mut report = CheckReport {
        valid_json: true,
        ..Default::default()
    };

    let Some(nodes) = root.as_object() else {
        report
            .issues
            .push(QaIssue::new("", "ROOT_NOT_OBJECT", "root must be an object of nodes"));
        return report;
    };
    report.node_count = nodes.len();

    for (key, node) in nodes {
        let Some(obj) = node.as_object() else {
            report
                .issues
                .push(QaIssue::new(key, "NODE_NOT_OBJECT", "node entry is not an object"));
            continue;
        };

        match obj.get("title").and_then(Value::as_str) {
            Some(t) if !t.trim().is_empty() => report.titled_nodes += 1,
            _ => report
                .issues
                .push(QaIssue::new(key, "MISSING_TITLE", "node has no title")),
        }

        for section in Section::LABELS {
            let Some(map) = obj.get(section.as_str()).and_then(Value::as_object) else {
                continue;
            };
            for (name, v) in map {
                let Some(text) = v.as_str() else {
                    continue;
                };
                let where_ = format!("{}.{name}", section.as_str());
                let type_name = Glossary::type_name_translation(text);
                if type_name.is_some_and(|t| t != text.trim()) {
                    report.issues.push(QaIssue::new(
                        key,
                        "TYPE_NAME_VALUE",
                        format!("{where_} is a raw type name: {text}"),
                    ));
                } else if type_name.is_none() && !has_cjk(text) && !Glossary::is_preserved_type(text) {
                    report.issues.push(QaIssue::new(
                        key,
                        "UNTRANSLATED_VALUE",
                        format!("{where_} has no Chinese text: {text}"),
                    ));
                }
            }
        }
    }

    report
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct FixReport {
    pub fixed: usize,
    pub changes: Vec<String>,
}

/// Replaces raw type-name values in label sections and saves the file.
pub fn fix(path: &Path) -> Result<FixReport> {
    let mut root = output::load_loader_file(path)?;
    let report = fix_value(&mut root);
    if report.fixed > 0 {
        output::write_json_atomic(path, &root)?;
        tracing::info!(path = %path.display(), fixed = report.fixed, "loader file repaired");
    }
    Ok(report)
}

pub fn fix_value(root: &mut Value) -> FixReport {
    let mut report = FixReport::default();
    let Some(nodes) = root.as_object_mut() else {
        return report;
    };

    for (key, node) in nodes.iter_mut() {
        let Some(obj) = node.as_object_mut() else {
            continue;
        };
        for section in Section::LABELS {
            let Some(map) = obj.get_mut(section.as_str()).and_then(Value::as_object_mut) else {
                continue;
            };
            for (name, v) in map.iter_mut() {
                let Some(fixed) = v
                    .as_str()
                    .and_then(|t| Glossary::type_name_translation(t).filter(|f| *f != t.trim()))
                else {
                    continue;
                };
                report.changes.push(format!(
                    "{key}.{}.{name}: {} -> {fixed}",
                    section.as_str(),
                    v.as_str().unwrap_or_default()
                ));
                *v = Value::String(fixed.to_string());
                report.fixed += 1;
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn check_reports_each_problem_kind() {
        let root = json!({
            "A": {"title": "节点", "inputs": {"image": "IMAGE", "x": "输入"}, "outputs": {"o": "LATENT"}},
            "B": {"inputs": {"p": "prompt"}},
            "C": "oops"
        });
        let report = check_value(&root);
        assert_eq!(report.node_count, 3);
        assert_eq!(report.titled_nodes, 1);

        let codes: Vec<(&str, &str)> = report
            .issues
            .iter()
            .map(|i| (i.node.as_str(), i.code.as_str()))
            .collect();
        assert!(codes.contains(&("A", "TYPE_NAME_VALUE")));
        assert!(codes.contains(&("B", "MISSING_TITLE")));
        assert!(codes.contains(&("B", "UNTRANSLATED_VALUE")));
        assert!(codes.contains(&("C", "NODE_NOT_OBJECT")));
        // raw type names are reported once, not also as untranslated
        assert!(!codes.iter().any(|(n, c)| *n == "A" && *c == "UNTRANSLATED_VALUE"));
    }

    #[test]
    fn broken_json_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.json");
        fs::write(&path, "{not json").unwrap();
        let report = check(&path).unwrap();
        assert!(!report.valid_json);
    }

    #[test]
    fn fix_rewrites_type_names_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.json");
        fs::write(
            &path,
            r#"{"A": {"title": "节点", "inputs": {"image": "IMAGE", "vae": "VAE"}, "outputs": {"o": "LATENT"}, "tooltips": {"image": "IMAGE"}}}"#,
        )
        .unwrap();

        let report = fix(&path).unwrap();
        assert_eq!(report.fixed, 2);

        let v = output::load_loader_file(&path).unwrap();
        assert_eq!(v["A"]["inputs"]["image"], "图像");
        assert_eq!(v["A"]["outputs"]["o"], "潜在空间");
        assert_eq!(v["A"]["tooltips"]["image"], "IMAGE");
        assert!(check(&path).unwrap().issues.is_empty());
    }
}
