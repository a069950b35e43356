use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use glob::glob;
use reforge_types::candidates::{CandidateEnvelope, DetectorInfo};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct LoadedCandidates {
    pub path: Utf8PathBuf,
    /// Directory name under the artifacts dir (best effort).
    pub detector_id: String,
    /// Every record that parsed; rejected ones are listed in `rejected`.
    pub envelope: Result<CandidateEnvelope, CandidateLoadError>,
    pub rejected: Vec<CandidateLoadError>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CandidateLoadError {
    #[error("io error: {message}")]
    Io { message: String },

    #[error("json parse error: {message}")]
    Json { message: String },

    #[error("unsupported schema `{schema}`")]
    Schema { schema: String },

    /// `record` is the record's id when it has one, else its position.
    #[error("rejected {section} record {record}: {message}")]
    Record {
        section: &'static str,
        record: String,
        message: String,
    },
}

/// Envelope with records left raw, so one bad record does not cost the rest.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    schema: String,
    detector: DetectorInfo,
    #[serde(default)]
    issues: Vec<Value>,
    #[serde(default)]
    refactorings: Vec<Value>,
}

pub fn load_candidates(artifacts_dir: &Utf8Path) -> anyhow::Result<Vec<LoadedCandidates>> {
    let pattern = artifacts_dir.join("*/candidates.json");
    let pattern_str = pattern.as_str();

    debug!(pattern = %pattern_str, "scanning artifacts for candidates");

    let mut out = Vec::new();
    for entry in glob(pattern_str).context("glob artifacts/*/candidates.json")? {
        let path = entry
            .map_err(|e| anyhow::anyhow!("glob error: {e}"))?
            .to_string_lossy()
            .to_string();

        let utf8_path = Utf8PathBuf::from(path);
        let detector_id = utf8_path
            .parent()
            .and_then(|p| p.file_name())
            .unwrap_or("unknown")
            .to_string();

        if detector_id == crate::OUTPUT_DIR_NAME {
            debug!(path = %utf8_path, "skipping reforge's own output");
            continue;
        }

        let (envelope, rejected) = match read_envelope(&utf8_path) {
            Ok((envelope, rejected)) => (Ok(envelope), rejected),
            Err(e) => {
                warn!(path = %utf8_path, error = %e, "failed to load candidates");
                (Err(e), vec![])
            }
        };
        for e in &rejected {
            warn!(path = %utf8_path, error = %e, "rejected candidate record");
        }

        out.push(LoadedCandidates {
            path: utf8_path,
            detector_id,
            envelope,
            rejected,
        });
    }

    out.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(out)
}

fn read_envelope(
    path: &Utf8Path,
) -> Result<(CandidateEnvelope, Vec<CandidateLoadError>), CandidateLoadError> {
    let text = fs::read_to_string(path).map_err(|e| CandidateLoadError::Io {
        message: e.to_string(),
    })?;
    let raw = serde_json::from_str::<RawEnvelope>(&text).map_err(|e| CandidateLoadError::Json {
        message: e.to_string(),
    })?;
    if !raw.schema.starts_with("reforge.candidates.") {
        return Err(CandidateLoadError::Schema { schema: raw.schema });
    }

    let mut rejected = Vec::new();
    let mut envelope = CandidateEnvelope::new(raw.detector);
    envelope.schema = raw.schema;
    envelope.issues = parse_records("issues", raw.issues, &mut rejected);
    envelope.refactorings = parse_records("refactorings", raw.refactorings, &mut rejected);
    Ok((envelope, rejected))
}

fn parse_records<T: DeserializeOwned>(
    section: &'static str,
    values: Vec<Value>,
    rejected: &mut Vec<CandidateLoadError>,
) -> Vec<T> {
    let mut out = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        let record = match value.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => format!("`{id}`"),
            _ => format!("#{index}"),
        };
        match serde_json::from_value(value) {
            Ok(parsed) => out.push(parsed),
            Err(e) => rejected.push(CandidateLoadError::Record {
                section,
                record,
                message: e.to_string(),
            }),
        }
    }
    out
}
