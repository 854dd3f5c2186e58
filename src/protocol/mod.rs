use std::path::PathBuf;

use serde_json::{json, Value};

use crate::model::config::AppConfig;
use crate::model::entry::EntryKey;
use crate::services::registry::Selection;
use crate::services::{diff, qa};
use crate::session::Session;

mod command;
pub use command::Command;

fn get_cmd(req: &Value) -> &str {
    req.get("cmd").and_then(|v| v.as_str()).unwrap_or("")
}

fn get_id(req: &Value) -> Value {
    req.get("id").cloned().unwrap_or(Value::Null)
}

fn get_payload(req: &Value) -> &Value {
    static EMPTY: Value = Value::Null;
    req.get("payload").unwrap_or(&EMPTY)
}

pub fn ok(id: Value, payload: Value) -> String {
    json!({
        "id": id,
        "status": "ok",
        "payload": payload
    })
    .to_string()
}

pub fn err(id: Value, message: impl Into<String>) -> String {
    json!({
        "id": id,
        "status": "error",
        "message": message.into()
    })
    .to_string()
}

fn to_payload<T: serde::Serialize>(id: Value, value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(v) => ok(id, v),
        Err(e) => err(id, format!("cannot serialize response: {e}")),
    }
}

fn get_path(payload: &Value, field: &str) -> Result<PathBuf, String> {
    payload
        .get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| format!("payload.{field} is required"))
}

fn get_paths(payload: &Value) -> Result<Option<Vec<PathBuf>>, String> {
    let Some(v) = payload.get("paths") else {
        return Ok(None);
    };
    let arr = v
        .as_array()
        .ok_or_else(|| "payload.paths must be an array".to_string())?;
    arr.iter()
        .enumerate()
        .map(|(i, p)| {
            p.as_str()
                .map(PathBuf::from)
                .ok_or_else(|| format!("payload.paths[{i}] must be a string"))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn get_selection(payload: &Value) -> Result<Selection, String> {
    match payload.get("keys") {
        None | Some(Value::Null) => Ok(Selection::All),
        Some(v) => serde_json::from_value::<Vec<EntryKey>>(v.clone())
            .map(Selection::Keys)
            .map_err(|e| format!("invalid payload.keys: {e}")),
    }
}

/// Cheap check the reader thread uses to act on `terminate` without
/// waiting for the coordinator.
pub fn terminate_request(line: &str) -> Option<Value> {
    let req: Value = serde_json::from_str(line).ok()?;
    (Command::from(get_cmd(&req)) == Command::Terminate).then(|| get_id(&req))
}

pub fn handle(session: &mut Session, input: &str) -> String {
    let req: Value = match serde_json::from_str(input) {
        Ok(v) => v,
        Err(_) => {
            return json!({
                "status": "error",
                "message": "invalid json"
            })
            .to_string();
        }
    };

    let id = get_id(&req);
    let cmd_str = get_cmd(&req);
    let payload = get_payload(&req);
    tracing::debug!(cmd = cmd_str, "request");

    match Command::from(cmd_str) {
        Command::Ping => ok(id, json!({ "message": "comfy-translator-core alive" })),

        Command::ConfigGet => to_payload(id, &session.config),

        Command::ConfigSave => {
            let Some(raw) = payload.get("config").cloned() else {
                return err(id, "payload.config is required");
            };
            let config: AppConfig = match serde_json::from_value(raw) {
                Ok(c) => c,
                Err(e) => return err(id, format!("invalid payload.config: {e}")),
            };
            match session.save_config(config) {
                Ok(()) => ok(id, json!({ "saved": true })),
                Err(e) => err(id, e.to_string()),
            }
        }

        Command::Parse => {
            let paths = match get_paths(payload) {
                Ok(Some(p)) if !p.is_empty() => p,
                Ok(_) => return err(id, "payload.paths is required"),
                Err(e) => return err(id, e),
            };
            match session.parse_paths(&paths) {
                Ok(plugins) => ok(id, json!({ "plugins": plugins })),
                Err(e) => err(id, e.to_string()),
            }
        }

        Command::Translate => {
            match get_paths(payload) {
                Ok(Some(paths)) if !paths.is_empty() => {
                    if let Err(e) = session.parse_paths(&paths) {
                        return err(id, e.to_string());
                    }
                }
                Ok(_) => {}
                Err(e) => return err(id, e),
            }
            match session.translate() {
                Ok(run) => to_payload(id, &run),
                Err(e) => err(id, e.to_string()),
            }
        }

        Command::FailuresList => ok(id, json!({ "failures": session.registry.list() })),

        Command::Retry => {
            let selection = match get_selection(payload) {
                Ok(s) => s,
                Err(e) => return err(id, e),
            };
            match session.retry(&selection) {
                Ok(run) => to_payload(id, &run),
                Err(e) => err(id, e.to_string()),
            }
        }

        Command::Terminate => {
            session.terminate();
            ok(id, json!({ "terminating": true }))
        }

        Command::Compare => {
            let (old, new) = match (get_path(payload, "old"), get_path(payload, "new")) {
                (Ok(o), Ok(n)) => (o, n),
                (Err(e), _) | (_, Err(e)) => return err(id, e),
            };
            match diff::compare_files(&old, &new) {
                Ok(d) => to_payload(id, &d),
                Err(e) => err(id, e.to_string()),
            }
        }

        Command::Check => {
            let path = match get_path(payload, "path") {
                Ok(p) => p,
                Err(e) => return err(id, e),
            };
            match qa::check(&path) {
                Ok(r) => to_payload(id, &r),
                Err(e) => err(id, e.to_string()),
            }
        }

        Command::Fix => {
            let path = match get_path(payload, "path") {
                Ok(p) => p,
                Err(e) => return err(id, e),
            };
            match qa::fix(&path) {
                Ok(r) => to_payload(id, &r),
                Err(e) => err(id, e.to_string()),
            }
        }

        Command::TestConnection => match session.test_connection() {
            Ok(reply) => ok(id, json!({ "reply": reply })),
            Err(e) => err(id, e.to_string()),
        },

        Command::Unknown => err(id, "unknown command"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::batcher::tests::ScriptedBackend;
    use crate::session::tests::session;
    use std::sync::Arc;

    fn call(s: &mut Session, req: Value) -> Value {
        serde_json::from_str(&handle(s, &req.to_string())).unwrap()
    }

    #[test]
    fn ping_and_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let (mut s, _) = session(dir.path());
        let r = call(&mut s, json!({"id": 1, "cmd": "ping"}));
        assert_eq!(r["status"], "ok");
        assert_eq!(r["id"], 1);

        let r = call(&mut s, json!({"id": 2, "cmd": "nope"}));
        assert_eq!(r["status"], "error");
        assert_eq!(r["message"], "unknown command");

        let r: Value = serde_json::from_str(&handle(&mut s, "{broken")).unwrap();
        assert_eq!(r["message"], "invalid json");
    }

    #[test]
    fn translate_then_list_failures_then_retry_selected() {
        let dir = tempfile::tempdir().unwrap();
        let (mut s, plugin) = session(dir.path());
        s.set_backend(Arc::new(ScriptedBackend::failing(&["SeedNode"], 429)));

        let r = call(
            &mut s,
            json!({"id": "t", "cmd": "translate", "payload": {"paths": [plugin]}}),
        );
        assert_eq!(r["status"], "ok", "{r}");
        assert_eq!(r["payload"]["summary"]["outcome"], "partial_failure");

        let r = call(&mut s, json!({"id": "f", "cmd": "failures.list"}));
        let failures = r["payload"]["failures"].as_array().unwrap();
        assert!(!failures.is_empty());
        assert_eq!(failures[0]["cause"], "rate_limit");
        let first = failures[0]["key"].clone();

        s.set_backend(Arc::new(ScriptedBackend::new()));
        let r = call(
            &mut s,
            json!({"id": "r", "cmd": "retry", "payload": {"keys": [first]}}),
        );
        assert_eq!(r["status"], "ok", "{r}");
        assert_eq!(r["payload"]["summary"]["counts"]["attempted"], 1);
        assert_eq!(s.registry.len(), failures.len() - 1);
    }

    #[test]
    fn terminate_is_recognized_from_raw_line() {
        assert_eq!(
            terminate_request(r#"{"id": 7, "cmd": "terminate"}"#),
            Some(json!(7))
        );
        assert_eq!(terminate_request(r#"{"id": 7, "cmd": "ping"}"#), None);
    }

    #[test]
    fn check_requires_path() {
        let dir = tempfile::tempdir().unwrap();
        let (mut s, _) = session(dir.path());
        let r = call(&mut s, json!({"id": 1, "cmd": "check", "payload": {}}));
        assert_eq!(r["message"], "payload.path is required");
    }
}
