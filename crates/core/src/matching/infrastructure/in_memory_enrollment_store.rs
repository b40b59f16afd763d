use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::matching::domain::enrollment::{EnrollmentRecord, SubjectId};
use crate::matching::domain::enrollment_store::{EnrollmentStore, StoreError};

type Slot = Arc<RwLock<Option<Arc<EnrollmentRecord>>>>;

/// Process-local store with one lock per subject.
///
/// The index lock is held only long enough to find or create a slot, so
/// writers to different subjects never wait on each other. Readers clone
/// the `Arc` out of the slot and keep a consistent snapshot even if the
/// record is replaced a moment later. Deleted subjects keep an empty slot
/// so a concurrent writer never lands in an orphaned one.
#[derive(Default)]
pub struct InMemoryEnrollmentStore {
    slots: RwLock<HashMap<SubjectId, Slot>>,
}

impl InMemoryEnrollmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, subject: &SubjectId) -> Result<Option<Slot>, StoreError> {
        let slots = self.slots.read().map_err(|_| StoreError::Poisoned)?;
        Ok(slots.get(subject).cloned())
    }

    fn slot_or_insert(&self, subject: &SubjectId) -> Result<Slot, StoreError> {
        if let Some(slot) = self.slot(subject)? {
            return Ok(slot);
        }
        let mut slots = self.slots.write().map_err(|_| StoreError::Poisoned)?;
        Ok(slots.entry(subject.clone()).or_default().clone())
    }
}

impl EnrollmentStore for InMemoryEnrollmentStore {
    fn get(&self, subject: &SubjectId) -> Result<Option<Arc<EnrollmentRecord>>, StoreError> {
        let Some(slot) = self.slot(subject)? else {
            return Ok(None);
        };
        let record = slot.read().map_err(|_| StoreError::Poisoned)?;
        Ok(record.clone())
    }

    fn put(&self, record: EnrollmentRecord) -> Result<(), StoreError> {
        let slot = self.slot_or_insert(record.subject())?;
        let mut current = slot.write().map_err(|_| StoreError::Poisoned)?;
        *current = Some(Arc::new(record));
        Ok(())
    }

    fn delete(&self, subject: &SubjectId) -> Result<bool, StoreError> {
        let Some(slot) = self.slot(subject)? else {
            return Ok(false);
        };
        let mut current = slot.write().map_err(|_| StoreError::Poisoned)?;
        Ok(current.take().is_some())
    }

    fn subjects(&self) -> Result<Vec<SubjectId>, StoreError> {
        let slots = self.slots.read().map_err(|_| StoreError::Poisoned)?;
        let mut subjects = Vec::with_capacity(slots.len());
        for (subject, slot) in slots.iter() {
            if slot.read().map_err(|_| StoreError::Poisoned)?.is_some() {
                subjects.push(subject.clone());
            }
        }
        subjects.sort();
        Ok(subjects)
    }
}
