use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const GUARDIANS_FILE: &str = "guardians.json";

/// A guardian paired with this device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PairedGuardian {
    pub guardian_id: String,
    pub guardian_name: String,
    pub paired_at_ms: u64,
}

/// Paired guardian set backed by a JSON file.
pub struct GuardianStore {
    path: PathBuf,
    guardians: Vec<PairedGuardian>,
}

impl GuardianStore {
    /// Load from disk, or create empty.
    pub fn load(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join(GUARDIANS_FILE);
        let guardians = if path.exists() {
            let data = std::fs::read_to_string(&path).context("failed to read guardians.json")?;
            serde_json::from_str(&data).context("invalid guardians.json")?
        } else {
            Vec::new()
        };
        Ok(Self { path, guardians })
    }

    fn save(&self) -> Result<()> {
        let data = serde_json::to_string_pretty(&self.guardians)?;
        std::fs::write(&self.path, data)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }

    /// Pair a guardian. Re-pairing an existing id replaces its name and pairing time.
    pub fn pair(&mut self, record: PairedGuardian) -> Result<()> {
        if let Some(existing) = self
            .guardians
            .iter_mut()
            .find(|g| g.guardian_id == record.guardian_id)
        {
            existing.guardian_name = record.guardian_name;
            existing.paired_at_ms = record.paired_at_ms;
        } else {
            self.guardians.push(record);
        }
        self.save()
    }

    /// Remove a guardian. Returns whether it was paired.
    pub fn unpair(&mut self, guardian_id: &str) -> Result<bool> {
        let before = self.guardians.len();
        self.guardians.retain(|g| g.guardian_id != guardian_id);
        if self.guardians.len() == before {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Paired guardians, most recently paired first.
    pub fn list(&self) -> Vec<PairedGuardian> {
        let mut out = self.guardians.clone();
        out.sort_by(|a, b| b.paired_at_ms.cmp(&a.paired_at_ms));
        out
    }

    /// Snapshot of the guardian ids, for fan-out.
    pub fn ids(&self) -> Vec<String> {
        self.guardians.iter().map(|g| g.guardian_id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.guardians.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guardians.is_empty()
    }
}
