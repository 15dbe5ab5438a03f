// src/mover/metadata.rs

//! Sidecar metadata parsing and validation.
//!
//! Validation failures here are structural: the file is malformed, not
//! transiently broken, so every error string returned from this module
//! becomes a quarantine reason.

use serde_json::{Map, Value};

/// One `[run, subrun, run_type]` triple from the `runs` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTriple {
    pub run: u64,
    pub subrun: u64,
    pub run_type: String,
}

/// Parsed and validated sidecar content.
#[derive(Debug, Clone)]
pub struct Sidecar {
    attrs: Map<String, Value>,
    pub file_size: u64,
    /// Normalized adler32 value, lowercase, without the `adler32:` prefix.
    pub adler32: String,
    pub runs: Vec<RunTriple>,
}

/// Attribute aliases accepted without a category prefix.
const CORE_ATTRIBUTES: &[(&str, &str)] = &[
    ("event_count", "core.event_count"),
    ("file_type", "core.file_type"),
    ("file_format", "core.file_format"),
    ("data_tier", "core.data_tier"),
    ("data_stream", "core.data_stream"),
    ("events", "core.events"),
    ("first_event", "core.first_event_number"),
    ("last_event", "core.last_event_number"),
];

/// Parse sidecar JSON and check the minimum contract: a checksum, a file
/// size and run/run-type identification.
pub fn parse_sidecar(text: &str) -> Result<Sidecar, String> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| format!("sidecar is not valid JSON: {e}"))?;
    let object = value
        .as_object()
        .ok_or_else(|| "sidecar is not a JSON object".to_string())?;

    // Attribute names occasionally arrive with stray whitespace.
    let attrs: Map<String, Value> = object
        .iter()
        .map(|(k, v)| (k.trim().to_string(), v.clone()))
        .collect();

    for required in ["checksum", "file_size", "runs"] {
        if !attrs.contains_key(required) {
            return Err(format!("required metadata field {required:?} is missing"));
        }
    }

    let file_size = attrs
        .get("file_size")
        .and_then(Value::as_u64)
        .ok_or_else(|| "file_size is not a non-negative integer".to_string())?;

    let checksum = attrs
        .get("checksum")
        .and_then(Value::as_str)
        .ok_or_else(|| "checksum is not a string".to_string())?;
    let adler32 = match checksum.split_once(':') {
        Some(("adler32", value)) => value.to_lowercase(),
        Some((kind, _)) => return Err(format!("unsupported checksum type {kind:?}")),
        None => checksum.to_lowercase(),
    };

    let runs = parse_runs(attrs.get("runs").unwrap_or(&Value::Null))?;
    if runs.is_empty() {
        return Err("runs is empty; cannot determine file scope".to_string());
    }

    Ok(Sidecar {
        attrs,
        file_size,
        adler32,
        runs,
    })
}

fn parse_runs(value: &Value) -> Result<Vec<RunTriple>, String> {
    let entries = value
        .as_array()
        .ok_or_else(|| "runs is not an array".to_string())?;
    entries
        .iter()
        .map(|entry| {
            let triple = entry
                .as_array()
                .filter(|t| t.len() == 3)
                .ok_or_else(|| format!("runs entry {entry} is not a [run, subrun, type] triple"))?;
            Ok(RunTriple {
                run: triple[0]
                    .as_u64()
                    .ok_or_else(|| format!("run number in {entry} is not an integer"))?,
                subrun: triple[1]
                    .as_u64()
                    .ok_or_else(|| format!("subrun number in {entry} is not an integer"))?,
                run_type: triple[2]
                    .as_str()
                    .ok_or_else(|| format!("run type in {entry} is not a string"))?
                    .to_string(),
            })
        })
        .collect()
}

impl Sidecar {
    /// The file's namespace, taken from the run type of the first run.
    pub fn file_scope(&self) -> &str {
        &self.runs[0].run_type
    }

    pub fn run_number(&self) -> u64 {
        self.runs[0].run
    }

    /// Metadata in MetaCat form: native file attributes stripped, run
    /// triples expanded, unprefixed names mapped through the core aliases.
    pub fn metacat_metadata(&self, lowercase_names: bool) -> Result<Map<String, Value>, String> {
        let mut out = Map::new();

        let mut runs: Vec<u64> = Vec::new();
        let mut runs_subruns: Vec<u64> = Vec::new();
        for triple in &self.runs {
            runs.push(triple.run);
            runs_subruns.push(triple.run * 100_000 + triple.subrun);
        }
        runs.sort_unstable();
        runs.dedup();
        runs_subruns.sort_unstable();
        runs_subruns.dedup();
        out.insert("core.runs".to_string(), runs.into());
        out.insert("core.runs_subruns".to_string(), runs_subruns.into());
        out.insert(
            "core.run_type".to_string(),
            Value::String(self.runs[0].run_type.clone()),
        );

        for (name, value) in &self.attrs {
            if matches!(name.as_str(), "file_size" | "checksum" | "file_name" | "runs") {
                continue;
            }
            let mut name = if name.contains('.') {
                name.clone()
            } else {
                CORE_ATTRIBUTES
                    .iter()
                    .find(|(alias, _)| alias == name)
                    .map(|(_, full)| full.to_string())
                    .ok_or_else(|| format!("unknown core metadata parameter {name:?}"))?
            };
            if lowercase_names {
                name = name.to_lowercase();
            }
            out.insert(name, value.clone());
        }

        if !out.contains_key("core.event_count") {
            let events = out
                .get("core.events")
                .and_then(Value::as_array)
                .map(|a| a.len())
                .unwrap_or(0);
            out.insert("core.event_count".to_string(), events.into());
        }

        Ok(out)
    }

    /// Metadata in SAM form: raw attributes plus file name and user, with
    /// the checksum re-wrapped as a typed list and events dropped.
    pub fn sam_metadata(&self, file_name: &str, user: &str) -> Value {
        let mut out = self.attrs.clone();
        out.insert("file_name".to_string(), Value::String(file_name.to_string()));
        out.insert("user".to_string(), Value::String(user.to_string()));
        out.insert(
            "checksum".to_string(),
            Value::Array(vec![Value::String(format!("adler32:{}", self.adler32))]),
        );
        out.remove("events");
        Value::Object(out)
    }
}
