//! Patient record and request payloads.

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use nutricare_auth::{AuthError, AuthResult, Registration, storage::ROLE_PATIENT};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// A patient record. `id` is shared with the patient's login principal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, with = "iso_date::option", skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<Date>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diet_group_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutritionist_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Patient {
    /// Apply the mutable fields of `update`. Email and timestamps other than
    /// `updated_at` are left untouched.
    pub fn apply(&mut self, update: PatientUpdate) {
        self.name = update.name;
        self.phone = update.phone;
        self.birth_date = update.birth_date;
        self.diet_group_id = update.diet_group_id;
        self.nutritionist_id = update.nutritionist_id;
        self.updated_at = OffsetDateTime::now_utc();
    }
}

/// `POST /patient/register` body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPatientRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, with = "iso_date::option")]
    pub birth_date: Option<Date>,
    #[serde(default)]
    pub diet_group_id: Option<Uuid>,
    #[serde(default)]
    pub nutritionist_id: Option<Uuid>,
}

impl RegisterPatientRequest {
    /// # Errors
    ///
    /// `InvalidRequest` if the name is blank or the credentials are unusable.
    pub fn validate(&self) -> AuthResult<()> {
        validate_name(&self.name)?;
        self.registration(Uuid::nil()).validate()
    }

    /// Login principal for this patient, sharing `id`.
    pub fn registration(&self, id: Uuid) -> Registration {
        Registration::new(&self.email, &self.password, vec![ROLE_PATIENT.to_string()]).with_id(id)
    }

    /// Patient record for `id`; `email` is the normalized principal email.
    pub fn into_patient(self, id: Uuid, email: String) -> Patient {
        let now = OffsetDateTime::now_utc();
        Patient {
            id,
            name: self.name.trim().to_string(),
            email,
            phone: self.phone,
            birth_date: self.birth_date,
            diet_group_id: self.diet_group_id,
            nutritionist_id: self.nutritionist_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// `PUT /patient` body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientUpdate {
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, with = "iso_date::option")]
    pub birth_date: Option<Date>,
    #[serde(default)]
    pub diet_group_id: Option<Uuid>,
    #[serde(default)]
    pub nutritionist_id: Option<Uuid>,
}

impl PatientUpdate {
    /// # Errors
    ///
    /// `InvalidRequest` if the name is blank.
    pub fn validate(&self) -> AuthResult<()> {
        validate_name(&self.name)
    }
}

fn validate_name(name: &str) -> AuthResult<()> {
    if name.trim().is_empty() {
        return Err(AuthError::invalid_request("name is required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn register_request() -> RegisterPatientRequest {
        serde_json::from_value(serde_json::json!({
            "name": "Ana Souza",
            "email": "Ana@X.com",
            "password": "correct",
            "birthDate": "1990-04-12",
            "dietGroupId": "7d3c8a4e-2f0b-4c55-9a2e-6d1b0f3e9a11"
        }))
        .unwrap()
    }

    #[test]
    fn register_request_parses_camel_case_and_dates() {
        let request = register_request();
        assert_eq!(request.birth_date, Some(date!(1990 - 04 - 12)));
        assert!(request.diet_group_id.is_some());
        assert!(request.nutritionist_id.is_none());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn register_request_requires_name_and_credentials() {
        let mut request = register_request();
        request.name = "  ".into();
        assert!(matches!(
            request.validate(),
            Err(AuthError::InvalidRequest { .. })
        ));

        let mut request = register_request();
        request.password = "123".into();
        assert!(request.validate().is_err());
    }

    #[test]
    fn registration_is_a_patient_principal() {
        let id = Uuid::new_v4();
        let registration = register_request().registration(id);
        assert_eq!(registration.id, Some(id));
        assert_eq!(registration.roles, vec![ROLE_PATIENT.to_string()]);
    }

    #[test]
    fn apply_update_keeps_identity() {
        let id = Uuid::new_v4();
        let mut patient = register_request().into_patient(id, "ana@x.com".into());
        let created_at = patient.created_at;

        patient.apply(PatientUpdate {
            id,
            name: "Ana S.".into(),
            phone: Some("555-0100".into()),
            birth_date: None,
            diet_group_id: None,
            nutritionist_id: None,
        });

        assert_eq!(patient.id, id);
        assert_eq!(patient.email, "ana@x.com");
        assert_eq!(patient.name, "Ana S.");
        assert_eq!(patient.created_at, created_at);
        assert!(patient.diet_group_id.is_none());
    }

    #[test]
    fn serializes_without_empty_optionals() {
        let patient = register_request().into_patient(Uuid::new_v4(), "ana@x.com".into());
        let value = serde_json::to_value(&patient).unwrap();
        assert_eq!(value["birthDate"], "1990-04-12");
        assert!(value.get("phone").is_none());
        assert!(value.get("createdAt").is_some());
    }
}
