use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{MatchOutcome, MatchPair, PipelineDiagnostics, UnmatchedRecord};
use crate::services::review::{shortlists_for_unmatched, ReviewShortlist};

/// Everything persisted for one matching batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    #[serde(rename = "batchId")]
    pub batch_id: Uuid,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    pub matches: Vec<MatchPair>,
    pub unmatched: Vec<UnmatchedRecord>,
    /// Review hand-off for unmatched candidates with eligible partners.
    #[serde(default)]
    pub shortlists: Vec<ReviewShortlist>,
    pub diagnostics: PipelineDiagnostics,
}

impl BatchRecord {
    /// New record under a fresh batch id, with top-`k` review shortlists.
    pub fn from_outcome(outcome: &MatchOutcome, k: usize) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            created_at: Utc::now(),
            matches: outcome.matches.clone(),
            unmatched: outcome.unmatched.clone(),
            shortlists: shortlists_for_unmatched(outcome, k),
            diagnostics: outcome.diagnostics.clone(),
        }
    }
}

/// Persistence collaborator for batch results
pub trait MatchStore {
    fn save(&self, record: &BatchRecord) -> Result<(), StoreError>;
    fn load(&self, batch_id: Uuid) -> Result<BatchRecord, StoreError>;
    /// Stored batch ids, oldest first.
    fn list(&self) -> Result<Vec<Uuid>, StoreError>;
}

/// Stores each batch as `<dir>/<batch_id>.json`
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, batch_id: Uuid) -> PathBuf {
        self.dir.join(format!("{batch_id}.json"))
    }
}

impl MatchStore for JsonFileStore {
    fn save(&self, record: &BatchRecord) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(record.batch_id);
        let tmp = path.with_extension("json.tmp");

        fs::write(&tmp, serde_json::to_vec_pretty(record)?)?;
        fs::rename(&tmp, &path)?;

        tracing::info!(
            batch_id = %record.batch_id,
            matches = record.matches.len(),
            shortlists = record.shortlists.len(),
            path = %path.display(),
            "Batch saved"
        );
        Ok(())
    }

    fn load(&self, batch_id: Uuid) -> Result<BatchRecord, StoreError> {
        let path = self.path_for(batch_id);
        if !path.exists() {
            return Err(StoreError::NotFound(batch_id.to_string()));
        }
        let bytes = fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn list(&self) -> Result<Vec<Uuid>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut batches = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            else {
                continue;
            };
            let bytes = fs::read(&path)?;
            let record: BatchRecord = serde_json::from_slice(&bytes)?;
            batches.push((record.created_at, id));
        }
        batches.sort();
        Ok(batches.into_iter().map(|(_, id)| id).collect())
    }
}
