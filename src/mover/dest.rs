// src/mover/dest.rs

//! Destination layout: where a file lands under the destination root.

use serde_json::{Map, Value};

use crate::exec::expand_template;

/// How the destination path relative to the destination root is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelPathStrategy {
    /// `scope/hh/hh/name`, with the two directory levels taken from a hash
    /// of `scope:name` so files spread evenly regardless of naming.
    Hash,
    /// Admin-supplied pattern referencing `$scope`, `$name` and metadata
    /// keys (e.g. `$core.run_type/$core.data_tier/$name`).
    Template { pattern: String },
}

impl RelPathStrategy {
    pub fn rel_path(
        &self,
        scope: &str,
        name: &str,
        metadata: &Map<String, Value>,
    ) -> Result<String, String> {
        match self {
            RelPathStrategy::Hash => Ok(hashed_rel_path(scope, name)),
            RelPathStrategy::Template { pattern } => {
                templated_rel_path(pattern, scope, name, metadata)
            }
        }
    }
}

fn hashed_rel_path(scope: &str, name: &str) -> String {
    let digest = blake3::hash(format!("{scope}:{name}").as_bytes());
    let hex = digest.to_hex();
    let hex = hex.as_str();

    // Per-user and per-group scopes become directory trees.
    let scope_dir = if scope.starts_with("user") || scope.starts_with("group") {
        scope.replace('.', "/")
    } else {
        scope.to_string()
    };

    format!("{}/{}/{}/{}", scope_dir, &hex[0..2], &hex[2..4], name)
}

fn templated_rel_path(
    pattern: &str,
    scope: &str,
    name: &str,
    metadata: &Map<String, Value>,
) -> Result<String, String> {
    let mut rendered: Vec<(String, String)> = vec![
        ("scope".to_string(), scope.to_string()),
        ("name".to_string(), name.to_string()),
    ];
    for (key, value) in metadata {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            // Arrays and objects do not make path components.
            _ => continue,
        };
        rendered.push((key.clone(), text));
    }
    let pairs: Vec<(&str, &str)> = rendered
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    let out = expand_template(pattern, &pairs);
    if out.contains('$') {
        return Err(format!(
            "destination path template left unresolved placeholders: {out:?}"
        ));
    }
    Ok(out.trim_matches('/').to_string())
}
