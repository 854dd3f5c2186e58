use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{CoreError, Result};

const LOADER_SUBDIR: &[&str] = &["ComfyUI-DD-Translation", "zh-CN", "Nodes"];

/// Writes through `<name>.tmp` and a rename so readers never see a partial file.
pub fn write_json_atomic(path: &Path, value: &Value) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| CoreError::json(path, e))?;
    write_atomic(path, &bytes)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);

    if let Some(parent) = tmp.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
        }
    }

    fs::write(&tmp, bytes).map_err(|e| CoreError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| CoreError::io(path, e))?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut p = path.to_path_buf();
    let file_name = match path.file_name().and_then(|s| s.to_str()) {
        Some(n) => n.to_string(),
        None => "output".to_string(),
    };
    p.set_file_name(format!("{file_name}.tmp"));
    p
}

/// Plugin names come from directory basenames; keep them usable as file names.
pub fn safe_dir_name(name: &str) -> String {
    let mut n = name.trim().to_string();

    if n.contains('\\') || n.contains('/') {
        if let Some(bn) = Path::new(&n).file_name().and_then(|s| s.to_str()) {
            n = bn.to_string();
        }
    }

    let mut out = String::with_capacity(n.len());
    for ch in n.chars() {
        let bad = ch.is_control() || matches!(ch, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|');
        out.push(if bad { '_' } else { ch });
    }

    let out = out.trim().trim_matches('.').to_string();
    if out.is_empty() {
        "Plugin".to_string()
    } else {
        out
    }
}

pub fn translation_path(output_dir: &Path, plugin: &str) -> PathBuf {
    let name = safe_dir_name(plugin);
    output_dir.join(&name).join(format!("{name}_translation.json"))
}

pub fn write_plugin_output(output_dir: &Path, plugin: &str, value: &Value) -> Result<PathBuf> {
    let path = translation_path(output_dir, plugin);
    write_json_atomic(&path, value)?;
    tracing::info!(plugin, path = %path.display(), "translation written");
    Ok(path)
}

/// Loader `Nodes` directory for a plugin: below its `custom_nodes` ancestor,
/// or `configured` when given.
pub fn locate_loader_dir(plugin_path: &Path, configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = configured {
        return Some(dir.to_path_buf());
    }
    let custom_nodes = plugin_path
        .ancestors()
        .find(|p| p.file_name().is_some_and(|n| n == "custom_nodes"))?;
    let mut dir = custom_nodes.to_path_buf();
    for part in LOADER_SUBDIR {
        dir.push(part);
    }
    Some(dir)
}

/// First free `<file>.bak`, `<file>.bak1`, `<file>.bak2`, ...
fn backup_path(path: &Path) -> PathBuf {
    let base = path.as_os_str().to_string_lossy().into_owned();
    let first = PathBuf::from(format!("{base}.bak"));
    if !first.exists() {
        return first;
    }
    let mut n = 1u32;
    loop {
        let candidate = PathBuf::from(format!("{base}.bak{n}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Copies a written translation into the loader directory, backing up any
/// file it replaces. Returns the destination path.
pub fn install_for_loader(source: &Path, loader_dir: &Path, plugin: &str) -> Result<PathBuf> {
    fs::create_dir_all(loader_dir).map_err(|e| CoreError::io(loader_dir, e))?;
    let dest = loader_dir.join(format!("{}.json", safe_dir_name(plugin)));

    if dest.exists() {
        let backup = backup_path(&dest);
        fs::copy(&dest, &backup).map_err(|e| CoreError::io(&backup, e))?;
        tracing::info!(backup = %backup.display(), "existing loader file backed up");
    }

    let bytes = fs::read(source).map_err(|e| CoreError::io(source, e))?;
    write_atomic(&dest, &bytes)?;
    tracing::info!(plugin, path = %dest.display(), "copied for loader");
    Ok(dest)
}

pub fn load_loader_file(path: &Path) -> Result<Value> {
    let data = fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
    serde_json::from_str(&data).map_err(|e| CoreError::json(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn atomic_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b.json");
        write_json_atomic(&path, &json!({"x": 1})).unwrap();
        write_json_atomic(&path, &json!({"x": 2})).unwrap();
        assert_eq!(load_loader_file(&path).unwrap(), json!({"x": 2}));
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn loader_dir_is_found_under_custom_nodes() {
        let plugin = Path::new("/srv/ComfyUI/custom_nodes/ComfyUI-Foo");
        assert_eq!(
            locate_loader_dir(plugin, None),
            Some(PathBuf::from("/srv/ComfyUI/custom_nodes/ComfyUI-DD-Translation/zh-CN/Nodes"))
        );
        assert_eq!(locate_loader_dir(Path::new("/tmp/plugin"), None), None);
        assert_eq!(
            locate_loader_dir(Path::new("/tmp/plugin"), Some(Path::new("/x"))),
            Some(PathBuf::from("/x"))
        );
    }

    #[test]
    fn installing_twice_keeps_backups() {
        let dir = tempfile::tempdir().unwrap();
        let out = write_plugin_output(&dir.path().join("output"), "Foo", &json!({"N": {"title": "节点"}}))
            .unwrap();
        assert!(out.ends_with("Foo/Foo_translation.json"));

        let loader = dir.path().join("Nodes");
        let dest = install_for_loader(&out, &loader, "Foo").unwrap();
        install_for_loader(&out, &loader, "Foo").unwrap();
        install_for_loader(&out, &loader, "Foo").unwrap();

        assert!(dest.exists());
        assert!(loader.join("Foo.json.bak").exists());
        assert!(loader.join("Foo.json.bak1").exists());
    }

    #[test]
    fn unsafe_names_are_cleaned() {
        assert_eq!(safe_dir_name("a:b*c"), "a_b_c");
        assert_eq!(safe_dir_name("/x/y/ComfyUI-Foo"), "ComfyUI-Foo");
        assert_eq!(safe_dir_name(" .. "), "Plugin");
    }
}
