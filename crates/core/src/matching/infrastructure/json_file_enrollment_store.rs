use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use tempfile::NamedTempFile;

use crate::matching::domain::enrollment::{EnrollmentRecord, SubjectId};
use crate::matching::domain::enrollment_store::{EnrollmentStore, StoreError};

const EXTENSION: &str = "json";

/// One pretty-printed JSON file per subject under a directory.
///
/// Writes go to a temporary file in the same directory that is persisted
/// over the record, so readers never parse a half-written file. A
/// per-subject lock serializes writers and keeps readers of that subject
/// off the file while it is replaced. Records that fail their invariants
/// on load are reported as corrupt.
pub struct JsonFileEnrollmentStore {
    dir: PathBuf,
    locks: Mutex<HashMap<SubjectId, Arc<RwLock<()>>>>,
}

impl JsonFileEnrollmentStore {
    /// Opens (and creates if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Write {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, subject: &SubjectId) -> Result<PathBuf, StoreError> {
        validate_subject(subject)?;
        Ok(self.dir.join(format!("{subject}.{EXTENSION}")))
    }

    fn lock_for(&self, subject: &SubjectId) -> Result<Arc<RwLock<()>>, StoreError> {
        let mut locks = self.locks.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(locks.entry(subject.clone()).or_default().clone())
    }

    /// Forgets a subject's lock once no reader or writer holds it.
    fn release_lock(&self, subject: &SubjectId) -> Result<(), StoreError> {
        let mut locks = self.locks.lock().map_err(|_| StoreError::Poisoned)?;
        if locks.get(subject).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(subject);
        }
        Ok(())
    }
}

impl EnrollmentStore for JsonFileEnrollmentStore {
    fn get(&self, subject: &SubjectId) -> Result<Option<Arc<EnrollmentRecord>>, StoreError> {
        let path = self.record_path(subject)?;
        let lock = self.lock_for(subject)?;
        let data = {
            let _guard = lock.read().map_err(|_| StoreError::Poisoned)?;
            match fs::read(&path) {
                Ok(data) => Some(data),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(source) => return Err(StoreError::Read { path, source }),
            }
        };
        let Some(data) = data else {
            drop(lock);
            self.release_lock(subject)?;
            return Ok(None);
        };
        let record: EnrollmentRecord = serde_json::from_slice(&data)
            .map_err(|source| StoreError::Corrupt { path: path.clone(), source })?;
        Ok(Some(Arc::new(record)))
    }

    fn put(&self, record: EnrollmentRecord) -> Result<(), StoreError> {
        let path = self.record_path(record.subject())?;
        let lock = self.lock_for(record.subject())?;
        let _guard = lock.write().map_err(|_| StoreError::Poisoned)?;

        let json = serde_json::to_vec_pretty(&record).map_err(|source| StoreError::Corrupt {
            path: path.clone(),
            source,
        })?;
        write_atomically(&self.dir, &path, &json)?;

        log::debug!("Stored enrollment for {} at {}", record.subject(), path.display());
        Ok(())
    }

    fn delete(&self, subject: &SubjectId) -> Result<bool, StoreError> {
        let path = self.record_path(subject)?;
        let lock = self.lock_for(subject)?;
        let removed = {
            let _guard = lock.write().map_err(|_| StoreError::Poisoned)?;
            match fs::remove_file(&path) {
                Ok(()) => true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
                Err(source) => return Err(StoreError::Write { path, source }),
            }
        };
        drop(lock);
        self.release_lock(subject)?;
        Ok(removed)
    }

    fn subjects(&self) -> Result<Vec<SubjectId>, StoreError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| StoreError::Read {
            path: self.dir.clone(),
            source,
        })?;

        let mut subjects = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Read {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                subjects.push(SubjectId::new(stem));
            }
        }
        subjects.sort();
        Ok(subjects)
    }
}

fn write_atomically(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Subject ids become file names, so only a conservative character set
/// is accepted.
fn validate_subject(subject: &SubjectId) -> Result<(), StoreError> {
    let s = subject.as_str();
    let ok = !s.is_empty()
        && !s.starts_with('.')
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidSubject(s.to_string()))
    }
}
