use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Records stored as one JSON document together with the next id to hand out.
///
/// Ids only ever grow, so a deleted record's id is never given to a new one.
/// Callers mutate a clone and [`Table::save`] it before swapping it in, which
/// keeps memory and disk in step when a write fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Table<T> {
    next_id: i64,
    records: Vec<T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            next_id: 1,
            records: Vec::new(),
        }
    }
}

impl<T: Serialize + DeserializeOwned> Table<T> {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut table: Self = serde_json::from_str(&data)
            .with_context(|| format!("invalid {}", path.display()))?;
        table.next_id = table.next_id.max(1);
        Ok(table)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))
    }
}

impl<T> Table<T> {
    pub fn allocate_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut Vec<T> {
        &mut self.records
    }
}
