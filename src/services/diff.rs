use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::model::document::TranslationDocument;
use crate::model::entry::EntryKey;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueChange {
    pub key: EntryKey,
    pub old: String,
    pub new: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diff {
    pub added: Vec<(EntryKey, String)>,
    pub removed: Vec<(EntryKey, String)>,
    pub changed: Vec<ValueChange>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Exact key comparison of effective values; every list comes out sorted.
pub fn compare(old: &TranslationDocument, new: &TranslationDocument) -> Diff {
    let old_values = old.effective_values();
    let new_values = new.effective_values();
    let mut diff = Diff::default();

    for (key, new_text) in &new_values {
        match old_values.get(key) {
            None => diff.added.push((key.clone(), new_text.clone())),
            Some(old_text) if old_text != new_text => diff.changed.push(ValueChange {
                key: key.clone(),
                old: old_text.clone(),
                new: new_text.clone(),
            }),
            Some(_) => {}
        }
    }
    for (key, old_text) in &old_values {
        if !new_values.contains_key(key) {
            diff.removed.push((key.clone(), old_text.clone()));
        }
    }
    diff
}

/// `Foo_translation.json` and `Foo.json` both name plugin `Foo`.
pub fn plugin_name_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    stem.strip_suffix("_translation")
        .map(str::to_string)
        .unwrap_or(stem)
}

fn read_json(path: &Path) -> Result<Value> {
    let data = fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
    serde_json::from_str(&data).map_err(|e| CoreError::json(path, e))
}

/// Both files are read under the new file's plugin name so that a renamed
/// copy still lines up key for key.
pub fn compare_files(old: &Path, new: &Path) -> Result<Diff> {
    let plugin = plugin_name_from_path(new);
    let old_doc = TranslationDocument::from_loader_json(&plugin, &read_json(old)?);
    let new_doc = TranslationDocument::from_loader_json(&plugin, &read_json(new)?);
    Ok(compare(&old_doc, &new_doc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entry::FieldKey;
    use serde_json::json;

    fn doc(v: Value) -> TranslationDocument {
        TranslationDocument::from_loader_json("p", &v)
    }

    #[test]
    fn identical_documents_have_no_diff() {
        let d = doc(json!({"A": {"title": "甲", "inputs": {"x": "输入"}}}));
        assert!(compare(&d, &d).is_empty());
    }

    #[test]
    fn one_extra_key_is_one_addition() {
        let old = doc(json!({"A": {"title": "甲", "inputs": {"x": "输入"}}}));
        let new = doc(json!({"A": {"title": "甲", "inputs": {"x": "输入", "y": "另一个"}}}));
        let diff = compare(&old, &new);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].1, "另一个");
        assert!(diff.removed.is_empty());
        assert!(diff.changed.is_empty());
    }

    #[test]
    fn title_present_on_one_side_only_is_added_or_removed() {
        let bare = doc(json!({"A": {"inputs": {"x": "输入"}}}));
        let titled = doc(json!({"A": {"title": "甲", "inputs": {"x": "输入"}}}));

        let diff = compare(&bare, &titled);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].0.field, FieldKey::title("A"));
        assert!(diff.changed.is_empty());
        assert!(diff.removed.is_empty());

        let diff = compare(&titled, &bare);
        assert_eq!(diff.removed.len(), 1);
        assert!(diff.changed.is_empty());
        assert!(diff.added.is_empty());
    }

    #[test]
    fn changed_and_removed_are_sorted() {
        let old = doc(json!({"B": {"title": "乙"}, "A": {"title": "甲"}, "C": {"title": "丙"}}));
        let new = doc(json!({"A": {"title": "甲甲"}, "B": {"title": "乙乙"}}));
        let diff = compare(&old, &new);
        let changed: Vec<_> = diff.changed.iter().map(|c| c.key.field.node.as_str()).collect();
        assert_eq!(changed, vec!["A", "B"]);
        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.removed[0].0.field.node, "C");
    }

    #[test]
    fn files_compare_under_new_plugin_name() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("Foo.json");
        let new = dir.path().join("Foo_translation.json");
        fs::write(&old, r#"{"N": {"title": "旧"}}"#).unwrap();
        fs::write(&new, r#"{"N": {"title": "新"}}"#).unwrap();

        assert_eq!(plugin_name_from_path(&new), "Foo");
        let diff = compare_files(&old, &new).unwrap();
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].key.plugin, "Foo");
    }
}
