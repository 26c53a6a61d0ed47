//! Artifact index: every file a suite writes, with its SHA-256.

use std::path::Path;

use heapmark_core::structured_log::{now_utc, LogEmitter, LogLevel, Outcome};
use serde::{Deserialize, Serialize};

use crate::error::HarnessError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub path: String,
    pub kind: String,
    pub sha256: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactIndex {
    pub index_version: u32,
    pub run_id: String,
    pub generated_utc: String,
    pub artifacts: Vec<ArtifactEntry>,
}

fn hex_lower(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        use std::fmt::Write;
        write!(out, "{b:02x}").ok();
        out
    })
}

#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::Digest;
    hex_lower(&sha2::Sha256::digest(data))
}

/// Record written artifacts as one `artifacts_written` log line referencing each path.
pub fn log_artifacts(
    log: &mut LogEmitter,
    seed: u64,
    written: &[(&Path, &str)],
) -> std::io::Result<()> {
    let refs = written.iter().map(|(path, _)| path.display().to_string()).collect();
    let kinds: Vec<&str> = written.iter().map(|(_, kind)| *kind).collect();
    let entry = log
        .entry(LogLevel::Info, "artifacts_written")
        .with_seed(seed)
        .with_outcome(Outcome::Success)
        .with_artifacts(refs)
        .with_details(serde_json::json!({ "kinds": kinds }));
    log.emit_entry(entry)?;
    log.flush()
}

/// Write `contents` to `path`, creating parent directories.
pub fn write_file(path: &Path, contents: &[u8]) -> Result<(), HarnessError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| HarnessError::io(parent, e))?;
    }
    std::fs::write(path, contents).map_err(|e| HarnessError::io(path, e))
}

impl ArtifactIndex {
    #[must_use]
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            index_version: 1,
            run_id: run_id.into(),
            generated_utc: now_utc(),
            artifacts: Vec::new(),
        }
    }

    /// Hash an already-written file and record it.
    pub fn add_file(&mut self, path: &Path, kind: &str) -> Result<&mut Self, HarnessError> {
        let data = std::fs::read(path).map_err(|e| HarnessError::io(path, e))?;
        self.artifacts.push(ArtifactEntry {
            path: path.display().to_string(),
            kind: kind.to_string(),
            sha256: sha256_hex(&data),
            size_bytes: data.len() as u64,
        });
        Ok(self)
    }

    /// Re-hash every recorded file; returns one message per mismatch or unreadable file.
    #[must_use]
    pub fn verify(&self) -> Vec<String> {
        self.artifacts
            .iter()
            .filter_map(|art| match std::fs::read(&art.path) {
                Ok(data) => {
                    let actual = sha256_hex(&data);
                    (!actual.eq_ignore_ascii_case(&art.sha256)).then(|| {
                        format!(
                            "sha256 mismatch for '{}': expected={}, actual={actual}",
                            art.path, art.sha256
                        )
                    })
                }
                Err(err) => Some(format!("failed reading '{}': {err}", art.path)),
            })
            .collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
