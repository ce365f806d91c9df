//! Run store: finalized tables and sweep manifests on disk.
//!
//! Each sweep gets its own directory named after the plan id, holding
//! `metrics.csv`, `metrics.json` and a `sweep.json` manifest.

use crate::error::SweepError;
use crate::training::metrics::FinalizedTable;
use crate::training::runner::{SkippedRepetition, SweepOutcome, TrialRecord};
use crate::training::sweep::SweepPlan;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const MANIFEST: &str = "sweep.json";
const METRICS_CSV: &str = "metrics.csv";
const METRICS_JSON: &str = "metrics.json";

/// Description of one stored sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub id: String,
    pub plan: SweepPlan,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rows: usize,
    pub trials: Vec<TrialRecord>,
    pub skipped: Vec<SkippedRepetition>,
    /// Effective configuration the sweep ran with.
    pub config: serde_json::Value,
    pub files: Vec<String>,
}

/// Directory of stored sweeps.
#[derive(Debug, Clone)]
pub struct RunStore {
    base_dir: PathBuf,
    write_csv: bool,
    write_json: bool,
}

impl RunStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            write_csv: true,
            write_json: true,
        }
    }

    pub fn with_formats(mut self, csv: bool, json: bool) -> Self {
        self.write_csv = csv;
        self.write_json = json;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn run_dir(&self, id: &str) -> PathBuf {
        self.base_dir.join(id)
    }

    /// Persist a finished sweep and return its manifest.
    pub fn save<C: Serialize>(
        &self,
        plan: &SweepPlan,
        outcome: &SweepOutcome,
        config: &C,
        started_at: DateTime<Utc>,
    ) -> Result<RunManifest, SweepError> {
        let dir = self.run_dir(&plan.id);
        std::fs::create_dir_all(&dir)?;
        let mut files = Vec::new();

        if self.write_csv {
            let mut buf = Vec::new();
            outcome.table.write_csv(&mut buf)?;
            atomic_write(&dir.join(METRICS_CSV), &buf)?;
            files.push(METRICS_CSV.to_string());
        }
        if self.write_json {
            atomic_write_json(&dir.join(METRICS_JSON), &outcome.table)?;
            files.push(METRICS_JSON.to_string());
        }

        let manifest = RunManifest {
            id: plan.id.clone(),
            plan: plan.clone(),
            started_at,
            finished_at: Utc::now(),
            rows: outcome.table.len(),
            trials: outcome.trials.clone(),
            skipped: outcome.skipped.clone(),
            config: serde_json::to_value(config)?,
            files,
        };
        atomic_write_json(&dir.join(MANIFEST), &manifest)?;
        tracing::info!(id = %manifest.id, dir = %dir.display(), rows = manifest.rows, "Saved sweep");
        Ok(manifest)
    }

    /// Load a manifest by sweep id.
    pub fn load(&self, id: &str) -> Result<RunManifest, SweepError> {
        let path = self.run_dir(id).join(MANIFEST);
        if !path.exists() {
            return Err(SweepError::NotFound(format!("sweep {id}")));
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load the finalized table of a stored sweep.
    pub fn load_table(&self, id: &str) -> Result<FinalizedTable, SweepError> {
        let path = self.run_dir(id).join(METRICS_JSON);
        if !path.exists() {
            return Err(SweepError::NotFound(format!("metrics for sweep {id}")));
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// All stored sweeps, oldest first. Directories without a readable
    /// manifest are skipped.
    pub fn list(&self) -> Result<Vec<RunManifest>, SweepError> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }
        let mut manifests = Vec::new();
        for entry in std::fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().to_string();
            match self.load(&id) {
                Ok(m) => manifests.push(m),
                Err(e) => tracing::warn!(id = %id, error = %e, "Skipping unreadable sweep"),
            }
        }
        manifests.sort_by_key(|m| m.started_at);
        Ok(manifests)
    }
}

/// Write to a `.tmp` sibling, then rename over the target.
fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn atomic_write_json<T: Serialize>(path: &Path, data: &T) -> Result<(), SweepError> {
    let json = serde_json::to_string_pretty(data)?;
    atomic_write(path, json.as_bytes())?;
    Ok(())
}
