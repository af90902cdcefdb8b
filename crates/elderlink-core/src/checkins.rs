use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

const CHECKINS_FILE: &str = "checkins.jsonl";

/// A daily self-reported health check-in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthCheckIn {
    pub id: i64,
    pub date: NaiveDate,
    /// 1..=5
    pub mood: Option<u8>,
    /// 1..=10
    pub pain_level: Option<u8>,
    /// 1..=5
    pub sleep_quality: Option<u8>,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub notes: String,
    pub created_at_ms: u64,
}

#[derive(Debug, Clone)]
pub struct NewCheckIn {
    pub date: NaiveDate,
    pub mood: Option<u8>,
    pub pain_level: Option<u8>,
    pub sleep_quality: Option<u8>,
    pub symptoms: Vec<String>,
    pub notes: String,
    pub created_at_ms: u64,
}

/// Check-ins persisted as JSONL. Guardians only read them.
pub struct CheckInStore {
    path: PathBuf,
    checkins: Vec<HealthCheckIn>,
}

impl CheckInStore {
    /// Load existing check-ins from disk, or start empty.
    pub fn load(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join(CHECKINS_FILE);
        let checkins = if path.exists() {
            let data = std::fs::read_to_string(&path).context("failed to read checkins.jsonl")?;
            data.lines()
                .filter(|l| !l.trim().is_empty())
                .map(|l| serde_json::from_str(l).context("invalid check-in entry"))
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };
        Ok(Self { path, checkins })
    }

    /// Append a check-in. Scores are clamped to their scales.
    pub fn record(&mut self, new: NewCheckIn) -> Result<HealthCheckIn> {
        let id = self.checkins.iter().map(|c| c.id).max().unwrap_or(0) + 1;
        let checkin = HealthCheckIn {
            id,
            date: new.date,
            mood: new.mood.map(|v| v.clamp(1, 5)),
            pain_level: new.pain_level.map(|v| v.clamp(1, 10)),
            sleep_quality: new.sleep_quality.map(|v| v.clamp(1, 5)),
            symptoms: new.symptoms,
            notes: new.notes,
            created_at_ms: new.created_at_ms,
        };
        let line = serde_json::to_string(&checkin)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        writeln!(file, "{line}")?;
        self.checkins.push(checkin.clone());
        Ok(checkin)
    }

    /// All check-ins, newest date first.
    pub fn all(&self) -> Vec<HealthCheckIn> {
        let mut out = self.checkins.clone();
        out.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id)));
        out
    }
}
