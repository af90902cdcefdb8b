use crate::state_dir::StateDir;
use crate::time::now_ms;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

const ELDER_JSON_FILE: &str = "elder.json";
const ELDER_ID_PREFIX: &str = "elder_";

/// Stable identifier of this elder device on the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElderIdentity {
    pub elder_id: String,
    pub created_at_ms: u64,
}

impl ElderIdentity {
    /// Load the identity from `state_dir`, generating and persisting a new
    /// `elder_<uuid>` id on first use. The id never changes afterwards.
    pub fn load_or_create(state_dir: &StateDir) -> Result<Self> {
        let path = state_dir.file(ELDER_JSON_FILE);

        if path.exists() {
            let data = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let identity: Self = serde_json::from_str(&data).context("invalid elder.json")?;
            if identity.elder_id.trim().is_empty() {
                bail!("elder.json has an empty elder_id");
            }
            return Ok(identity);
        }

        let identity = Self {
            elder_id: format!("{ELDER_ID_PREFIX}{}", uuid::Uuid::new_v4()),
            created_at_ms: now_ms(),
        };
        let data = serde_json::to_string_pretty(&identity)?;
        std::fs::write(&path, data)
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(elder_id = %identity.elder_id, "created elder identity");
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_dir(dir: &tempfile::TempDir) -> StateDir {
        StateDir::open(dir.path()).unwrap()
    }

    #[test]
    fn creates_prefixed_id() {
        let dir = tempfile::tempdir().unwrap();
        let id = ElderIdentity::load_or_create(&state_dir(&dir)).unwrap();
        let rest = id.elder_id.strip_prefix("elder_").unwrap();
        assert!(uuid::Uuid::parse_str(rest).is_ok());
    }

    #[test]
    fn id_is_stable_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let first = ElderIdentity::load_or_create(&state_dir(&dir)).unwrap();
        let second = ElderIdentity::load_or_create(&state_dir(&dir)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_blank_id_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(ELDER_JSON_FILE),
            r#"{"elder_id":" ","created_at_ms":0}"#,
        )
        .unwrap();
        assert!(ElderIdentity::load_or_create(&state_dir(&dir)).is_err());
    }
}
