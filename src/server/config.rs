//! Configuration extraction from LSP settings.
//!
//! This module handles parsing configuration values from JSON settings
//! received via `didChangeConfiguration` notifications.

use std::collections::HashMap;

use crate::lexer::IncludeMode;

/// Extract predefined preprocessor macros from LSP settings.
///
/// Supports two formats:
/// 1. Object map: `{ "DEBUG": "1", "TARGET": "X86" }`
/// 2. String array: `["DEBUG=1", "BARE_NAME"]`
///
/// Expects settings in the format:
/// ```json
/// { "pearl": { "defines": { ... } } }
/// ```
pub fn extract_defines(settings: &serde_json::Value) -> Option<HashMap<String, String>> {
    let defines = settings.get("pearl").and_then(|v| v.get("defines"))?;

    let mut out = HashMap::new();
    match defines {
        serde_json::Value::Object(map) => {
            for (name, value) in map {
                let value = match value {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Number(n) => n.to_string(),
                    serde_json::Value::Bool(b) => b.to_string(),
                    _ => continue,
                };
                out.insert(name.clone(), value);
            }
        }
        serde_json::Value::Array(entries) => {
            for entry in entries {
                let Some(raw) = entry.as_str() else { continue };
                match raw.split_once('=') {
                    Some((name, value)) => {
                        out.insert(name.to_string(), value.to_string());
                    }
                    None => {
                        out.insert(raw.to_string(), String::new());
                    }
                }
            }
        }
        _ => return None,
    }
    Some(out)
}

/// Extract the include working-directory mode from LSP settings.
///
/// Expects settings in the format:
/// ```json
/// { "pearl": { "includeMode": "file" | "workspace" } }
/// ```
pub fn extract_include_mode(settings: &serde_json::Value) -> Option<IncludeMode> {
    let mode = settings
        .get("pearl")
        .and_then(|v| v.get("includeMode"))
        .and_then(|v| v.as_str())?;
    match mode {
        "file" => Some(IncludeMode::FileRelative),
        "workspace" => Some(IncludeMode::WorkspaceRelative),
        _ => None,
    }
}
