use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tree_sitter::{Parser, Tree};
use walkdir::WalkDir;

use crate::error::{CoreError, Result};
use crate::model::node::{ParseWarning, Plugin};
use crate::services::encoding;

pub mod comfy;
pub mod patterns;
pub mod syntax;
pub mod v3;

pub use patterns::ParserPatterns;

/// One decoded, syntactically valid Python file of a plugin.
pub struct SourceFile {
    /// Relative to the plugin root, `/`-separated.
    pub rel_path: String,
    pub source: String,
    pub tree: Tree,
}

fn python_parser() -> Result<Parser> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::language())
        .map_err(|e| CoreError::Invalid(format!("python grammar unavailable: {e}")))?;
    Ok(parser)
}

pub fn parse_source(rel_path: &str, source: String) -> std::result::Result<SourceFile, String> {
    let mut parser = python_parser().map_err(|e| e.to_string())?;
    let tree = parser
        .parse(&source, None)
        .ok_or_else(|| "parser produced no tree".to_string())?;

    let root = tree.root_node();
    if root.has_error() {
        let line = syntax::first_error_line(root).unwrap_or(1);
        return Err(format!("syntax error near line {line}"));
    }

    Ok(SourceFile {
        rel_path: rel_path.to_string(),
        source,
        tree,
    })
}

fn read_source(path: &Path, rel_path: &str) -> std::result::Result<SourceFile, String> {
    let bytes = fs::read(path).map_err(|e| format!("cannot read file: {e}"))?;
    let text = encoding::decode_source(&bytes)?;
    parse_source(rel_path, text)
}

fn python_files(root: &Path, patterns: &ParserPatterns, warnings: &mut Vec<ParseWarning>) -> Vec<PathBuf> {
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e.file_type().is_dir()
                || !patterns.is_ignored_dir(&e.file_name().to_string_lossy())
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                let file = e
                    .path()
                    .map(|p| relative(root, p))
                    .unwrap_or_default();
                warnings.push(ParseWarning {
                    file,
                    message: e.to_string(),
                });
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !name.ends_with(".py") || patterns.is_skipped_file(&name) {
            continue;
        }
        files.push(entry.into_path());
    }
    files
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Scans one plugin directory. Files that cannot be read, decoded or
/// parsed become warnings; the rest of the plugin is still scanned.
pub fn parse_plugin(dir: &Path, patterns: &ParserPatterns) -> Result<Plugin> {
    if !dir.is_dir() {
        return Err(CoreError::Invalid(format!(
            "plugin path is not a directory: {}",
            dir.display()
        )));
    }
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| CoreError::Invalid(format!("plugin path has no name: {}", dir.display())))?;

    let mut warnings = Vec::new();
    let paths = python_files(dir, patterns, &mut warnings);

    let results: Vec<(String, std::result::Result<SourceFile, String>)> = paths
        .par_iter()
        .map(|p| {
            let rel = relative(dir, p);
            let parsed = read_source(p, &rel);
            (rel, parsed)
        })
        .collect();

    let mut files = Vec::with_capacity(results.len());
    for (rel, parsed) in results {
        match parsed {
            Ok(f) => files.push(f),
            Err(message) => {
                tracing::warn!(plugin = %name, file = %rel, %message, "skipping file");
                warnings.push(ParseWarning { file: rel, message });
            }
        }
    }

    let v3_nodes = v3::extract(&files, patterns);
    let nodes = if !v3_nodes.is_empty() {
        tracing::info!(plugin = %name, nodes = v3_nodes.len(), "using V3 schema nodes");
        v3_nodes
    } else {
        let mappings = comfy::collect_mappings(&files, patterns);
        comfy::extract(&files, &mappings, patterns)
    };

    tracing::info!(
        plugin = %name,
        files = files.len(),
        nodes = nodes.len(),
        warnings = warnings.len(),
        "plugin parsed"
    );

    Ok(Plugin {
        name,
        path: dir.to_path_buf(),
        nodes,
        warnings,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::document::TranslationDocument;
    use crate::model::entry::FieldKey;
    use crate::model::node::Section;

    pub(crate) fn source_file(rel: &str, src: &str) -> SourceFile {
        match parse_source(rel, src.to_string()) {
            Ok(f) => f,
            Err(e) => panic!("fixture {rel} does not parse: {e}"),
        }
    }

    fn write(dir: &Path, rel: &str, content: &[u8]) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    const NODE_PY: &str = r#"
class Loader:
    @classmethod
    def INPUT_TYPES(cls):
        return {"required": {"path": ("STRING", {"tooltip": "File path"})}}
    RETURN_TYPES = ("IMAGE",)

NODE_CLASS_MAPPINGS = {"Loader": Loader}
"#;

    #[test]
    fn broken_files_become_warnings() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("my-pack");
        write(&root, "nodes.py", NODE_PY.as_bytes());
        write(&root, "broken.py", b"def oops(:\n    pass\n");
        write(&root, "test_nodes.py", b"class Bad:\n    RETURN_TYPES = ('X',)\n");
        write(&root, "__pycache__/cached.py", b"class Cached:\n    RETURN_TYPES = ('X',)\n");
        write(&root, "sub/more.py", b"class More:\n    RETURN_TYPES = ('MASK',)\n");

        let plugin = parse_plugin(&root, &ParserPatterns::default()).unwrap();
        assert_eq!(plugin.name, "my-pack");

        let keys: Vec<&str> = plugin.nodes.iter().map(|n| n.key.as_str()).collect();
        assert_eq!(keys, vec!["Loader", "More"]);
        assert_eq!(plugin.node("More").unwrap().source_file, "sub/more.py");

        assert_eq!(plugin.warnings.len(), 1);
        assert_eq!(plugin.warnings[0].file, "broken.py");
        assert!(plugin.warnings[0].message.starts_with("syntax error"));
    }

    #[test]
    fn legacy_encoded_source_is_decoded() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("gbk-pack");
        let (bytes, _, _) =
            encoding_rs::GBK.encode("# 中文注释，用于测试编码检测\nclass N:\n    RETURN_TYPES = ('IMAGE',)\n");
        write(&root, "nodes.py", &bytes);

        let plugin = parse_plugin(&root, &ParserPatterns::default()).unwrap();
        assert!(plugin.warnings.is_empty(), "{:?}", plugin.warnings);
        assert_eq!(plugin.nodes.len(), 1);
    }

    const SEED_PROMPT_PY: &str = r#"
class Gen:
    @classmethod
    def INPUT_TYPES(cls):
        return {
            "required": {
                "seed": ("INT",),
                "prompt": ("STRING", {"tooltip": "positive prompt"}),
                "1": ("INT",),
            }
        }

NODE_CLASS_MAPPINGS = {"Gen": Gen}
"#;

    #[test]
    fn seed_and_prompt_become_one_node_and_four_candidates() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("gen-pack");
        write(&root, "nodes.py", SEED_PROMPT_PY.as_bytes());

        let plugin = parse_plugin(&root, &ParserPatterns::default()).unwrap();
        assert_eq!(plugin.nodes.len(), 1);
        let node = &plugin.nodes[0];
        assert_eq!(node.labels(Section::Widgets), ["seed", "prompt", "1"]);
        assert_eq!(node.tooltip("prompt"), Some("positive prompt"));

        let mut doc = TranslationDocument::new();
        doc.add_plugin(plugin);
        let candidates: Vec<FieldKey> = doc.candidates(false).into_iter().map(|k| k.field).collect();
        assert_eq!(
            candidates,
            vec![
                FieldKey::title("Gen"),
                FieldKey::new("Gen", Section::Widgets, "seed"),
                FieldKey::new("Gen", Section::Widgets, "prompt"),
                FieldKey::new("Gen", Section::Tooltips, "prompt"),
            ]
        );
        // the numeric name is extracted but never sent
        assert!(doc.entries().any(|e| e.key.field.name == "1"));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(parse_plugin(&tmp.path().join("nope"), &ParserPatterns::default()).is_err());
    }
}
