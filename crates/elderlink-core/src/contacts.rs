use crate::table::Table;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONTACTS_FILE: &str = "emergency_contacts.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmergencyContact {
    pub id: i64,
    pub name: String,
    pub phone_number: String,
    pub relationship: String,
    pub is_primary: bool,
    pub sort_order: u32,
}

/// Contact details written by an upsert.
#[derive(Debug, Clone)]
pub struct ContactDetails {
    pub name: String,
    pub phone_number: String,
    pub relationship: String,
}

/// Emergency contacts backed by a JSON file. At most one contact is primary.
pub struct ContactStore {
    path: PathBuf,
    contacts: Table<EmergencyContact>,
}

impl ContactStore {
    /// Load from disk, or create empty.
    pub fn load(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join(CONTACTS_FILE);
        let contacts = Table::load(&path).context("failed to load emergency contacts")?;
        Ok(Self { path, contacts })
    }

    /// Write `next` and adopt it only once it is on disk.
    fn commit(&mut self, next: Table<EmergencyContact>) -> Result<()> {
        next.save(&self.path)?;
        self.contacts = next;
        Ok(())
    }

    /// Create a contact at the end of the list, or overwrite `existing`.
    /// With `make_primary` every other contact loses the primary flag.
    /// Returns `None` if `existing` names a contact that does not exist.
    pub fn upsert(
        &mut self,
        existing: Option<i64>,
        details: ContactDetails,
        make_primary: bool,
    ) -> Result<Option<EmergencyContact>> {
        let mut next = self.contacts.clone();
        let id = match existing {
            Some(id) => {
                let Some(contact) = next.records_mut().iter_mut().find(|c| c.id == id) else {
                    return Ok(None);
                };
                contact.name = details.name;
                contact.phone_number = details.phone_number;
                contact.relationship = details.relationship;
                id
            }
            None => {
                let id = next.allocate_id();
                let sort_order = next
                    .records()
                    .iter()
                    .map(|c| c.sort_order + 1)
                    .max()
                    .unwrap_or(0);
                next.records_mut().push(EmergencyContact {
                    id,
                    name: details.name,
                    phone_number: details.phone_number,
                    relationship: details.relationship,
                    is_primary: false,
                    sort_order,
                });
                id
            }
        };
        if make_primary {
            for contact in next.records_mut() {
                contact.is_primary = contact.id == id;
            }
        }
        let saved = next.records().iter().find(|c| c.id == id).cloned();
        self.commit(next)?;
        Ok(saved)
    }

    pub fn delete(&mut self, id: i64) -> Result<bool> {
        if !self.contacts.records().iter().any(|c| c.id == id) {
            return Ok(false);
        }
        let mut next = self.contacts.clone();
        next.records_mut().retain(|c| c.id != id);
        self.commit(next)?;
        Ok(true)
    }

    /// Contacts in display order.
    pub fn list(&self) -> Vec<EmergencyContact> {
        let mut out = self.contacts.records().to_vec();
        out.sort_by_key(|c| (c.sort_order, c.id));
        out
    }
}
