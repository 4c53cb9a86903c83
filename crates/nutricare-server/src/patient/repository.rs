//! Patient persistence.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use super::model::Patient;
use crate::resilience::Transient;

/// Errors returned by a [`PatientRepository`].
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Patient {0} not found")]
    NotFound(Uuid),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Backend temporarily unreachable; safe to retry.
    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl Transient for RepositoryError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait PatientRepository: Send + Sync {
    /// All patients ordered by name.
    async fn list(&self) -> RepositoryResult<Vec<Patient>>;

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Patient>>;

    /// Patients assigned to a diet group, ordered by name.
    async fn find_by_diet_group(&self, diet_group_id: Uuid) -> RepositoryResult<Vec<Patient>>;

    /// Insert a new patient.
    ///
    /// Fails with `Conflict` if the id or email is taken.
    async fn create(&self, patient: Patient) -> RepositoryResult<Patient>;

    /// Replace an existing patient.
    ///
    /// Fails with `NotFound` if no patient has `patient.id`.
    async fn update(&self, patient: Patient) -> RepositoryResult<Patient>;

    /// Returns `true` if a patient was removed.
    async fn delete(&self, id: Uuid) -> RepositoryResult<bool>;
}

/// In-memory [`PatientRepository`].
#[derive(Debug, Default)]
pub struct InMemoryPatientRepository {
    patients: DashMap<Uuid, Patient>,
}

impl InMemoryPatientRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted(mut patients: Vec<Patient>) -> Vec<Patient> {
        patients.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        patients
    }
}

#[async_trait]
impl PatientRepository for InMemoryPatientRepository {
    async fn list(&self) -> RepositoryResult<Vec<Patient>> {
        let patients = self.patients.iter().map(|e| e.value().clone()).collect();
        Ok(Self::sorted(patients))
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Patient>> {
        Ok(self.patients.get(&id).map(|e| e.value().clone()))
    }

    async fn find_by_diet_group(&self, diet_group_id: Uuid) -> RepositoryResult<Vec<Patient>> {
        let patients = self
            .patients
            .iter()
            .filter(|e| e.value().diet_group_id == Some(diet_group_id))
            .map(|e| e.value().clone())
            .collect();
        Ok(Self::sorted(patients))
    }

    async fn create(&self, patient: Patient) -> RepositoryResult<Patient> {
        // Principal registration already enforces unique emails; this guards
        // records inserted without one.
        if self
            .patients
            .iter()
            .any(|e| e.value().email == patient.email && e.key() != &patient.id)
        {
            return Err(RepositoryError::conflict(format!(
                "Email {} is already registered",
                patient.email
            )));
        }
        match self.patients.entry(patient.id) {
            Entry::Occupied(_) => Err(RepositoryError::conflict(format!(
                "Patient {} already exists",
                patient.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(patient.clone());
                Ok(patient)
            }
        }
    }

    async fn update(&self, patient: Patient) -> RepositoryResult<Patient> {
        match self.patients.get_mut(&patient.id) {
            Some(mut existing) => {
                *existing = patient.clone();
                Ok(patient)
            }
            None => Err(RepositoryError::NotFound(patient.id)),
        }
    }

    async fn delete(&self, id: Uuid) -> RepositoryResult<bool> {
        Ok(self.patients.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use tokio_test::block_on;

    fn patient(name: &str, email: &str, group: Option<Uuid>) -> Patient {
        let now = OffsetDateTime::now_utc();
        Patient {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            phone: None,
            birth_date: None,
            diet_group_id: group,
            nutritionist_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn create_find_and_list() {
        let repo = InMemoryPatientRepository::new();
        block_on(async {
            let bia = repo.create(patient("Bia", "b@x.com", None)).await.unwrap();
            let ana = repo.create(patient("Ana", "a@x.com", None)).await.unwrap();

            assert_eq!(repo.find_by_id(bia.id).await.unwrap(), Some(bia.clone()));
            let names: Vec<_> = repo.list().await.unwrap().into_iter().map(|p| p.name).collect();
            assert_eq!(names, vec!["Ana", "Bia"]);
            assert!(repo.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
            assert_ne!(ana.id, bia.id);
        });
    }

    #[tokio::test]
    async fn create_rejects_duplicates() {
        let repo = InMemoryPatientRepository::new();
        let ana = repo.create(patient("Ana", "a@x.com", None)).await.unwrap();

        let same_id = Patient {
            email: "other@x.com".into(),
            ..ana.clone()
        };
        assert!(matches!(
            repo.create(same_id).await,
            Err(RepositoryError::Conflict(_))
        ));
        assert!(matches!(
            repo.create(patient("Ana 2", "a@x.com", None)).await,
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn filters_by_diet_group() {
        let repo = InMemoryPatientRepository::new();
        let group = Uuid::new_v4();
        repo.create(patient("Ana", "a@x.com", Some(group))).await.unwrap();
        repo.create(patient("Bia", "b@x.com", None)).await.unwrap();

        let members = repo.find_by_diet_group(group).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, "Ana");
        assert!(repo.find_by_diet_group(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_and_delete() {
        let repo = InMemoryPatientRepository::new();
        let mut ana = repo.create(patient("Ana", "a@x.com", None)).await.unwrap();
        ana.name = "Ana S.".into();
        repo.update(ana.clone()).await.unwrap();
        assert_eq!(repo.find_by_id(ana.id).await.unwrap().unwrap().name, "Ana S.");

        let missing = patient("Nobody", "n@x.com", None);
        assert!(repo.update(missing).await.unwrap_err().is_not_found());

        assert!(repo.delete(ana.id).await.unwrap());
        assert!(!repo.delete(ana.id).await.unwrap());
    }

    #[test]
    fn only_unavailable_is_transient() {
        assert!(RepositoryError::unavailable("down").is_transient());
        assert!(!RepositoryError::NotFound(Uuid::nil()).is_transient());
        assert!(!RepositoryError::conflict("dup").is_transient());
    }
}
