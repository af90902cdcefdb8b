use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const PROFILE_FILE: &str = "profile.json";

/// Display details for the monitored person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElderProfile {
    pub name: String,
    pub age: Option<u32>,
}

impl Default for ElderProfile {
    fn default() -> Self {
        Self {
            name: "Elder".to_string(),
            age: None,
        }
    }
}

/// Elder profile persisted as a single JSON document.
pub struct ProfileStore {
    path: PathBuf,
    profile: ElderProfile,
}

impl ProfileStore {
    /// Load from disk, or start with the default profile.
    pub fn load(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join(PROFILE_FILE);
        let profile = if path.exists() {
            let data = std::fs::read_to_string(&path).context("failed to read profile.json")?;
            serde_json::from_str(&data).context("invalid profile.json")?
        } else {
            ElderProfile::default()
        };
        Ok(Self { path, profile })
    }

    pub fn get(&self) -> &ElderProfile {
        &self.profile
    }

    /// Overwrite the supplied fields and persist.
    pub fn update(&mut self, name: Option<String>, age: Option<u32>) -> Result<()> {
        if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
            self.profile.name = name;
        }
        if age.is_some() {
            self.profile.age = age;
        }
        let data = serde_json::to_string_pretty(&self.profile)?;
        std::fs::write(&self.path, data)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}
