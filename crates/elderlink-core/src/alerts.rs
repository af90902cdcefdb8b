use anyhow::{Context, Result};
use elderlink::payloads::{AlertKind, LocationInfo};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

const ALERTS_FILE: &str = "alerts.jsonl";

/// A recorded alert. Only the resolution fields change after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub id: i64,
    pub kind: AlertKind,
    pub triggered_at_ms: u64,
    #[serde(default)]
    pub location: Option<LocationInfo>,
    #[serde(default)]
    pub battery_level: Option<i32>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub resolved_at_ms: Option<u64>,
    pub notes: String,
}

/// Fields supplied by the caller when raising an alert.
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub kind: AlertKind,
    pub triggered_at_ms: u64,
    pub location: Option<LocationInfo>,
    pub battery_level: Option<i32>,
    pub notes: String,
}

/// Alert history persisted as JSONL. Alerts are never deleted.
pub struct AlertLog {
    path: PathBuf,
    alerts: Vec<Alert>,
}

impl AlertLog {
    /// Load existing alerts from disk, or start empty.
    pub fn load(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join(ALERTS_FILE);
        let alerts = if path.exists() {
            let data = std::fs::read_to_string(&path).context("failed to read alerts.jsonl")?;
            data.lines()
                .filter(|l| !l.trim().is_empty())
                .map(|l| serde_json::from_str(l).context("invalid alert entry"))
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };
        Ok(Self { path, alerts })
    }

    /// Assign an id, append to disk and return the stored alert.
    pub fn record(&mut self, new: NewAlert) -> Result<Alert> {
        let id = self.alerts.iter().map(|a| a.id).max().unwrap_or(0) + 1;
        let alert = Alert {
            id,
            kind: new.kind,
            triggered_at_ms: new.triggered_at_ms,
            location: new.location,
            battery_level: new.battery_level,
            resolved: false,
            resolved_at_ms: None,
            notes: new.notes,
        };
        let line = serde_json::to_string(&alert)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        writeln!(file, "{line}")?;
        self.alerts.push(alert.clone());
        Ok(alert)
    }

    pub fn get(&self, id: i64) -> Option<&Alert> {
        self.alerts.iter().find(|a| a.id == id)
    }

    /// All alerts, newest first.
    pub fn all(&self) -> Vec<Alert> {
        let mut out = self.alerts.clone();
        out.sort_by(|a, b| {
            b.triggered_at_ms
                .cmp(&a.triggered_at_ms)
                .then_with(|| b.id.cmp(&a.id))
        });
        out
    }

    /// The `limit` newest alerts.
    pub fn recent(&self, limit: usize) -> Vec<Alert> {
        let mut out = self.all();
        out.truncate(limit);
        out
    }

    /// Whether an alert of `kind` was triggered at or after `since_ms`.
    pub fn has_since(&self, kind: AlertKind, since_ms: u64) -> bool {
        self.alerts
            .iter()
            .any(|a| a.kind == kind && a.triggered_at_ms >= since_ms)
    }

    /// Mark an alert resolved. Returns false if no such alert exists.
    /// Resolving twice keeps the first resolution time.
    pub fn resolve(&mut self, id: i64, at_ms: u64) -> Result<bool> {
        let Some(alert) = self.alerts.iter_mut().find(|a| a.id == id) else {
            return Ok(false);
        };
        if !alert.resolved {
            alert.resolved = true;
            alert.resolved_at_ms = Some(at_ms);
            self.rewrite()?;
        }
        Ok(true)
    }

    fn rewrite(&self) -> Result<()> {
        let mut file = std::fs::File::create(&self.path)
            .with_context(|| format!("failed to rewrite {}", self.path.display()))?;
        for alert in &self.alerts {
            let line = serde_json::to_string(alert)?;
            writeln!(file, "{line}")?;
        }
        Ok(())
    }
}
