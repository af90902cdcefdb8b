use crate::table::Table;
use anyhow::{Context, Result};
use elderlink::days::ALL_LOCAL_DAYS;
use elderlink::payloads::DoseAction;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

const MEDICATIONS_FILE: &str = "medications.json";
const SCHEDULES_FILE: &str = "schedules.json";
const DOSE_LOG_FILE: &str = "dose_log.jsonl";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Medication {
    pub id: i64,
    pub name: String,
    pub dosage: String,
    pub instructions: String,
    pub is_active: bool,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

/// When a medication is due. Days are 1 (Sunday) through 7 (Saturday).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schedule {
    pub id: i64,
    pub medication_id: i64,
    pub hour: u8,
    pub minute: u8,
    pub days_of_week: Vec<u8>,
    pub enabled: bool,
}

impl Schedule {
    /// `HH:MM`, zero padded.
    pub fn time_label(&self) -> String {
        format!("{:02}:{:02}", self.hour, self.minute)
    }

    pub fn runs_on(&self, day: u8) -> bool {
        self.days_of_week.contains(&day)
    }
}

/// A schedule before it has been assigned an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSchedule {
    pub hour: u8,
    pub minute: u8,
    pub days_of_week: Vec<u8>,
    pub enabled: bool,
}

impl NewSchedule {
    /// Every day at the given time.
    pub fn daily(hour: u8, minute: u8) -> Self {
        Self {
            hour,
            minute,
            days_of_week: ALL_LOCAL_DAYS.to_vec(),
            enabled: true,
        }
    }
}

/// Fields of a medication that may be overwritten. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct MedicationPatch {
    pub name: Option<String>,
    pub dosage: Option<String>,
    pub instructions: Option<String>,
}

/// One entry of the append-only dose log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DoseLog {
    pub id: i64,
    pub medication_id: i64,
    #[serde(default)]
    pub schedule_id: Option<i64>,
    pub scheduled_at_ms: u64,
    pub action_at_ms: u64,
    pub action: DoseAction,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone)]
pub struct NewDose {
    pub medication_id: i64,
    pub schedule_id: Option<i64>,
    pub scheduled_at_ms: u64,
    pub action_at_ms: u64,
    pub action: DoseAction,
    pub notes: String,
}

/// Medications and schedules as JSON documents, doses as JSONL.
///
/// A failed write leaves both memory and disk as they were before the call.
pub struct MedicationStore {
    medications_path: PathBuf,
    schedules_path: PathBuf,
    log_path: PathBuf,
    medications: Table<Medication>,
    schedules: Table<Schedule>,
    doses: Vec<DoseLog>,
}

impl MedicationStore {
    /// Load from disk, or create empty.
    pub fn load(state_dir: &Path) -> Result<Self> {
        let medications_path = state_dir.join(MEDICATIONS_FILE);
        let schedules_path = state_dir.join(SCHEDULES_FILE);
        let log_path = state_dir.join(DOSE_LOG_FILE);

        let medications = Table::load(&medications_path)?;
        let schedules = Table::load(&schedules_path)?;

        let doses = if log_path.exists() {
            let data = std::fs::read_to_string(&log_path).context("failed to read dose_log.jsonl")?;
            data.lines()
                .filter(|l| !l.trim().is_empty())
                .map(|l| serde_json::from_str(l).context("invalid dose log entry"))
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };

        Ok(Self {
            medications_path,
            schedules_path,
            log_path,
            medications,
            schedules,
            doses,
        })
    }

    /// Write the changed documents, schedules first, then adopt them.
    /// If the medications write fails the schedules file is put back.
    fn commit(
        &mut self,
        medications: Option<Table<Medication>>,
        schedules: Option<Table<Schedule>>,
    ) -> Result<()> {
        if let Some(schedules) = &schedules {
            schedules.save(&self.schedules_path)?;
        }
        if let Some(medications) = &medications {
            if let Err(e) = medications.save(&self.medications_path) {
                if schedules.is_some() {
                    if let Err(restore) = self.schedules.save(&self.schedules_path) {
                        tracing::error!(err = %restore, "failed to restore schedules after a failed write");
                    }
                }
                return Err(e);
            }
        }
        if let Some(medications) = medications {
            self.medications = medications;
        }
        if let Some(schedules) = schedules {
            self.schedules = schedules;
        }
        Ok(())
    }

    /// Create an active medication with its schedules.
    pub fn add(
        &mut self,
        name: String,
        dosage: String,
        instructions: String,
        schedules: Vec<NewSchedule>,
        now_ms: u64,
    ) -> Result<Medication> {
        let mut medications = self.medications.clone();
        let mut all_schedules = self.schedules.clone();

        let id = medications.allocate_id();
        let medication = Medication {
            id,
            name,
            dosage,
            instructions,
            is_active: true,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        };
        medications.records_mut().push(medication.clone());
        attach_schedules(&mut all_schedules, id, schedules);

        self.commit(Some(medications), Some(all_schedules))?;
        Ok(medication)
    }

    /// Apply a patch and optionally replace every schedule of the medication.
    /// Returns `None` if the medication does not exist.
    pub fn update(
        &mut self,
        id: i64,
        patch: MedicationPatch,
        schedules: Option<Vec<NewSchedule>>,
        now_ms: u64,
    ) -> Result<Option<Medication>> {
        let mut medications = self.medications.clone();
        let Some(medication) = medications.records_mut().iter_mut().find(|m| m.id == id) else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            medication.name = name;
        }
        if let Some(dosage) = patch.dosage {
            medication.dosage = dosage;
        }
        if let Some(instructions) = patch.instructions {
            medication.instructions = instructions;
        }
        medication.updated_at_ms = now_ms;
        let updated = medication.clone();

        let replaced = schedules.map(|schedules| {
            let mut all = self.schedules.clone();
            all.records_mut().retain(|s| s.medication_id != id);
            attach_schedules(&mut all, id, schedules);
            all
        });
        self.commit(Some(medications), replaced)?;
        Ok(Some(updated))
    }

    /// Delete a medication and its schedules, schedules first.
    /// Returns the removed medication, or `None` if it did not exist.
    pub fn delete(&mut self, id: i64) -> Result<Option<Medication>> {
        let Some(pos) = self.medications.records().iter().position(|m| m.id == id) else {
            return Ok(None);
        };
        let mut medications = self.medications.clone();
        let removed = medications.records_mut().remove(pos);
        let mut schedules = self.schedules.clone();
        schedules.records_mut().retain(|s| s.medication_id != id);

        self.commit(Some(medications), Some(schedules))?;
        Ok(Some(removed))
    }

    pub fn get(&self, id: i64) -> Option<&Medication> {
        self.medications.records().iter().find(|m| m.id == id)
    }

    /// Active medications ordered by name.
    pub fn active(&self) -> Vec<Medication> {
        let mut out: Vec<_> = self
            .medications
            .records()
            .iter()
            .filter(|m| m.is_active)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        out
    }

    pub fn schedules_for(&self, medication_id: i64) -> Vec<Schedule> {
        self.schedules
            .records()
            .iter()
            .filter(|s| s.medication_id == medication_id)
            .cloned()
            .collect()
    }

    /// Append a dose log entry.
    pub fn record_dose(&mut self, new: NewDose) -> Result<DoseLog> {
        let id = self.doses.iter().map(|d| d.id).max().unwrap_or(0) + 1;
        let entry = DoseLog {
            id,
            medication_id: new.medication_id,
            schedule_id: new.schedule_id,
            scheduled_at_ms: new.scheduled_at_ms,
            action_at_ms: new.action_at_ms,
            action: new.action,
            notes: new.notes,
        };
        let line = serde_json::to_string(&entry)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("failed to open {}", self.log_path.display()))?;
        writeln!(file, "{line}")?;
        self.doses.push(entry.clone());
        Ok(entry)
    }

    /// Dose log entries acted on at or after `since_ms`, newest first.
    pub fn doses_since(&self, since_ms: u64) -> Vec<DoseLog> {
        let mut out: Vec<_> = self
            .doses
            .iter()
            .filter(|d| d.action_at_ms >= since_ms)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.action_at_ms.cmp(&a.action_at_ms));
        out
    }
}

fn attach_schedules(table: &mut Table<Schedule>, medication_id: i64, schedules: Vec<NewSchedule>) {
    for s in schedules {
        let id = table.allocate_id();
        table.records_mut().push(Schedule {
            id,
            medication_id,
            hour: s.hour,
            minute: s.minute,
            days_of_week: s.days_of_week,
            enabled: s.enabled,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dose(medication_id: i64, at: u64, action: DoseAction) -> NewDose {
        NewDose {
            medication_id,
            schedule_id: None,
            scheduled_at_ms: at,
            action_at_ms: at,
            action,
            notes: String::new(),
        }
    }

    #[test]
    fn add_assigns_ids_and_schedules() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MedicationStore::load(dir.path()).unwrap();
        let med = store
            .add(
                "Aspirin".into(),
                "100mg".into(),
                "with food".into(),
                vec![NewSchedule::daily(8, 0), NewSchedule::daily(20, 30)],
                1,
            )
            .unwrap();
        assert_eq!(med.id, 1);
        assert!(med.is_active);

        let schedules = store.schedules_for(med.id);
        assert_eq!(schedules.len(), 2);
        assert_eq!(schedules[1].time_label(), "20:30");
        assert!(schedules[0].runs_on(1));
    }

    #[test]
    fn update_patches_and_replaces_schedules() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MedicationStore::load(dir.path()).unwrap();
        let med = store
            .add(
                "A".into(),
                "1".into(),
                "i".into(),
                vec![NewSchedule::daily(8, 0), NewSchedule::daily(9, 0)],
                1,
            )
            .unwrap();

        let patch = MedicationPatch {
            dosage: Some("2".into()),
            ..Default::default()
        };
        let updated = store
            .update(med.id, patch, Some(vec![NewSchedule::daily(7, 15)]), 5)
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "A");
        assert_eq!(updated.dosage, "2");
        assert_eq!(updated.updated_at_ms, 5);

        let schedules = store.schedules_for(med.id);
        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].time_label(), "07:15");

        assert!(
            store
                .update(99, MedicationPatch::default(), None, 5)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn delete_removes_schedules_too() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MedicationStore::load(dir.path()).unwrap();
        let med = store
            .add("A".into(), "1".into(), "i".into(), vec![NewSchedule::daily(8, 0)], 1)
            .unwrap();
        assert!(store.delete(med.id).unwrap().is_some());
        assert!(store.delete(med.id).unwrap().is_none());
        assert!(store.schedules_for(med.id).is_empty());

        let reloaded = MedicationStore::load(dir.path()).unwrap();
        assert!(reloaded.get(med.id).is_none());
    }

    #[test]
    fn deleted_ids_are_never_handed_out_again() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MedicationStore::load(dir.path()).unwrap();
        let aspirin = store
            .add("Aspirin".into(), "1".into(), String::new(), vec![NewSchedule::daily(8, 0)], 1)
            .unwrap();
        let first_schedule = store.schedules_for(aspirin.id)[0].id;
        store.record_dose(dose(aspirin.id, 10, DoseAction::Taken)).unwrap();
        store.delete(aspirin.id).unwrap().unwrap();

        let warfarin = store
            .add("Warfarin".into(), "5".into(), String::new(), vec![NewSchedule::daily(9, 0)], 2)
            .unwrap();
        assert_ne!(warfarin.id, aspirin.id);
        assert_ne!(store.schedules_for(warfarin.id)[0].id, first_schedule);

        // a replayed delete of the old id must not touch the new medication
        assert!(store.delete(aspirin.id).unwrap().is_none());
        assert!(store.get(warfarin.id).is_some());
        assert!(store.doses_since(0).iter().all(|d| d.medication_id != warfarin.id));

        // the counter survives a restart even after the newest record is gone
        store.delete(warfarin.id).unwrap().unwrap();
        let mut reloaded = MedicationStore::load(dir.path()).unwrap();
        let zinc = reloaded
            .add("Zinc".into(), "1".into(), String::new(), vec![], 3)
            .unwrap();
        assert!(zinc.id > warfarin.id);
    }

    #[test]
    fn failed_write_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MedicationStore::load(dir.path()).unwrap();
        let kept = store
            .add("Kept".into(), "1".into(), String::new(), vec![NewSchedule::daily(8, 0)], 1)
            .unwrap();

        // schedules.json cannot be written while a directory sits in its place
        let schedules_file = dir.path().join(SCHEDULES_FILE);
        std::fs::remove_file(&schedules_file).unwrap();
        std::fs::create_dir(&schedules_file).unwrap();

        let ghost = store.add(
            "Ghost".into(),
            "1".into(),
            String::new(),
            vec![NewSchedule::daily(9, 0)],
            2,
        );
        assert!(ghost.is_err());
        assert_eq!(store.active().len(), 1);
        assert!(store.delete(kept.id).is_err());
        assert!(store.get(kept.id).is_some());
        assert_eq!(store.schedules_for(kept.id).len(), 1);

        std::fs::remove_dir(&schedules_file).unwrap();
        let patch = MedicationPatch {
            name: Some("Renamed".into()),
            ..Default::default()
        };
        let medications_file = dir.path().join(MEDICATIONS_FILE);
        std::fs::remove_file(&medications_file).unwrap();
        std::fs::create_dir(&medications_file).unwrap();
        assert!(
            store
                .update(kept.id, patch, Some(vec![NewSchedule::daily(20, 0)]), 3)
                .is_err()
        );
        assert_eq!(store.get(kept.id).unwrap().name, "Kept");
        assert_eq!(store.schedules_for(kept.id)[0].time_label(), "08:00");

        // the schedules file was put back to its previous contents
        std::fs::remove_dir(&medications_file).unwrap();
        let on_disk: Table<Schedule> = Table::load(&schedules_file).unwrap();
        assert_eq!(on_disk.records().len(), 1);
        assert_eq!(on_disk.records()[0].hour, 8);
    }

    #[test]
    fn active_is_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MedicationStore::load(dir.path()).unwrap();
        for name in ["Zinc", "Aspirin", "Metformin"] {
            store
                .add(name.into(), "1".into(), String::new(), vec![], 1)
                .unwrap();
        }
        let names: Vec<_> = store.active().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["Aspirin", "Metformin", "Zinc"]);
    }

    #[test]
    fn dose_log_is_append_only_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MedicationStore::load(dir.path()).unwrap();
        store.record_dose(dose(1, 100, DoseAction::Taken)).unwrap();
        store.record_dose(dose(1, 300, DoseAction::Missed)).unwrap();
        store.record_dose(dose(1, 200, DoseAction::Skipped)).unwrap();

        let reloaded = MedicationStore::load(dir.path()).unwrap();
        let recent: Vec<_> = reloaded
            .doses_since(200)
            .into_iter()
            .map(|d| d.action_at_ms)
            .collect();
        assert_eq!(recent, vec![300, 200]);
    }
}
