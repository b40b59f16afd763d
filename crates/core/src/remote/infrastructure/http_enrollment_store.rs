use std::sync::Arc;

use crate::matching::domain::enrollment::{EnrollmentRecord, SubjectId};
use crate::matching::domain::enrollment_store::{EnrollmentStore, StoreError};
use crate::remote::domain::http_transport::Method;
use crate::remote::domain::network_error::NetworkError;
use crate::remote::domain::wire::{UserRecord, UserSummary};
use crate::shared::embedding::{Embedding, ModelVersion};

use super::http_verification_client::{user_path, HttpVerificationClient};

/// Enrollment records kept by the remote service's user endpoints.
pub struct HttpEnrollmentStore {
    client: Arc<HttpVerificationClient>,
}

impl HttpEnrollmentStore {
    pub fn new(client: Arc<HttpVerificationClient>) -> Self {
        Self { client }
    }
}

impl EnrollmentStore for HttpEnrollmentStore {
    fn get(&self, subject: &SubjectId) -> Result<Option<Arc<EnrollmentRecord>>, StoreError> {
        let user: UserRecord = match self
            .client
            .call_json::<(), _>(Method::Get, &user_path(subject), None)
        {
            Ok(user) => user,
            Err(e) if e.status() == Some(404) => return Ok(None),
            Err(e) => return Err(remote(e)),
        };
        from_wire(user).map(|r| Some(Arc::new(r)))
    }

    fn put(&self, record: EnrollmentRecord) -> Result<(), StoreError> {
        let body = to_wire(&record);
        let path = user_path(record.subject());
        match self.client.call(Method::Put, &path, Some(&body)) {
            Ok(_) => Ok(()),
            Err(e) if e.status() == Some(404) => {
                log::debug!("{} not on server yet, creating", record.subject());
                self.client
                    .call(Method::Post, "api/users", Some(&body))
                    .map(|_| ())
                    .map_err(remote)
            }
            Err(e) => Err(remote(e)),
        }
    }

    fn delete(&self, subject: &SubjectId) -> Result<bool, StoreError> {
        match self
            .client
            .call::<()>(Method::Delete, &user_path(subject), None)
        {
            Ok(_) => Ok(true),
            Err(e) if e.status() == Some(404) => Ok(false),
            Err(e) => Err(remote(e)),
        }
    }

    fn subjects(&self) -> Result<Vec<SubjectId>, StoreError> {
        let users: Vec<UserSummary> = self
            .client
            .call_json::<(), _>(Method::Get, "api/users", None)
            .map_err(remote)?;
        let mut subjects: Vec<SubjectId> = users
            .into_iter()
            .map(|u| SubjectId::new(u.subject_id))
            .collect();
        subjects.sort();
        Ok(subjects)
    }
}

fn remote(e: NetworkError) -> StoreError {
    StoreError::Remote(e.to_string())
}

fn to_wire(record: &EnrollmentRecord) -> UserRecord {
    UserRecord {
        subject_id: record.subject().to_string(),
        model_version: record.model().to_string(),
        references: record
            .references()
            .iter()
            .map(|e| e.values().to_vec())
            .collect(),
        created_at: Some(record.created_at()),
        updated_at: Some(record.updated_at()),
    }
}

fn from_wire(user: UserRecord) -> Result<EnrollmentRecord, StoreError> {
    let model: ModelVersion = user.model_version.parse().map_err(StoreError::Remote)?;
    let references = user
        .references
        .into_iter()
        .map(|values| Embedding::new(values, model.clone()))
        .collect();
    let record = EnrollmentRecord::new(SubjectId::new(user.subject_id), references)
        .map_err(|e| StoreError::Remote(e.to_string()))?;
    Ok(match user.created_at {
        Some(created) => record.with_timestamps(created, user.updated_at.unwrap_or(created)),
        None => record,
    })
}
