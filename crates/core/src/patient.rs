//! Patient record model.
//!
//! The record mirrors what the upstream patient service returns over the
//! wire. Every field except the identifier is optional: absence is a normal
//! value, not an error, and downstream rendering substitutes a sentinel for
//! anything missing. Date-like fields stay strings here because the upstream
//! format is lenient (birth dates sometimes carry a time part); parsing
//! happens where a value is actually derived, such as the age calculation.

use serde::{Deserialize, Serialize};

/// A patient record as served by a remote patient source.
///
/// Wire format is camelCase JSON. `#[serde(default)]` keeps partial payloads
/// deserialisable, so a source that only knows demographics still produces a
/// usable record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PatientRecord {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub birth_date: Option<String>,
    pub gender: Option<String>,
    pub blood_type: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub emergency_contact_name2: Option<String>,
    pub emergency_contact_phone2: Option<String>,
    pub emergency_contact_name3: Option<String>,
    pub emergency_contact_phone3: Option<String>,
    pub medical_history: Option<String>,
    pub allergies: Option<String>,
    pub insurance_provider: Option<String>,
    pub insurance_number: Option<String>,
    pub registration_date: Option<String>,
    pub updated_at: Option<String>,
    pub status: Option<bool>,
    pub active: Option<bool>,
}

impl PatientRecord {
    /// Creates an empty record for the given identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_full_camel_case_payload() {
        let json = r#"{
            "id": "p-1001",
            "firstName": "Ana",
            "lastName": "Gomez",
            "birthDate": "1991-04-12",
            "bloodType": "O+",
            "emergencyContactName2": "Luis Gomez",
            "status": true
        }"#;

        let record: PatientRecord =
            serde_json::from_str(json).expect("payload should deserialize");
        assert_eq!(record.id, "p-1001");
        assert_eq!(record.first_name.as_deref(), Some("Ana"));
        assert_eq!(record.blood_type.as_deref(), Some("O+"));
        assert_eq!(record.emergency_contact_name2.as_deref(), Some("Luis Gomez"));
        assert_eq!(record.status, Some(true));
        assert_eq!(record.email, None, "absent fields should stay None");
    }

    #[test]
    fn deserializes_partial_payload() {
        let record: PatientRecord =
            serde_json::from_str(r#"{"id": "p-2"}"#).expect("partial payload should deserialize");
        assert_eq!(record.id, "p-2");
        assert_eq!(record.first_name, None);
        assert_eq!(record.active, None);
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let record = PatientRecord {
            blood_type: Some("AB-".into()),
            ..PatientRecord::new("p-3")
        };
        let json = serde_json::to_string(&record).expect("serialize should succeed");
        assert!(json.contains("\"bloodType\":\"AB-\""));
        assert!(!json.contains("blood_type"));
    }
}
