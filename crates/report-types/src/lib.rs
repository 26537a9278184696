/// Errors that can occur when creating a validated patient identifier.
#[derive(Debug, thiserror::Error)]
pub enum IdError {
    /// The input was empty or contained only whitespace
    #[error("Patient id cannot be empty")]
    Empty,
    /// The input exceeded the maximum accepted length
    #[error("Patient id exceeds {max} characters", max = PatientId::MAX_LEN)]
    TooLong,
}

/// An opaque, validated patient identifier.
///
/// The upstream patient service owns the id format, so no particular shape
/// (UUID or otherwise) is enforced here. This type only guarantees that the
/// identifier is non-empty after trimming and of bounded length, which keeps
/// obviously broken inputs out of the resolver and cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatientId(String);

impl PatientId {
    /// Maximum accepted identifier length, in characters.
    pub const MAX_LEN: usize = 128;

    /// Creates a new `PatientId` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. The trimmed
    /// result must be non-empty and at most [`MAX_LEN`](Self::MAX_LEN)
    /// characters long.
    ///
    /// # Arguments
    ///
    /// * `input` - Any type that can be converted to a string reference
    ///
    /// # Returns
    ///
    /// Returns `Ok(PatientId)` if the trimmed input is valid, or an
    /// `IdError` describing why it was rejected.
    pub fn new(input: impl AsRef<str>) -> Result<Self, IdError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(IdError::Empty);
        }
        if trimmed.chars().count() > Self::MAX_LEN {
            return Err(IdError::TooLong);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PatientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for PatientId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for PatientId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for PatientId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PatientId::new(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifier() {
        let id = PatientId::new("p-1001").expect("plain id should be accepted");
        assert_eq!(id.as_str(), "p-1001");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let id = PatientId::new("  550e8400-e29b-41d4  ").expect("id should be accepted");
        assert_eq!(id.as_str(), "550e8400-e29b-41d4");
    }

    #[test]
    fn rejects_empty_input() {
        let err = PatientId::new("   ").expect_err("whitespace-only id should be rejected");
        assert!(matches!(err, IdError::Empty), "should return IdError::Empty");
    }

    #[test]
    fn rejects_overlong_input() {
        let long = "x".repeat(PatientId::MAX_LEN + 1);
        let err = PatientId::new(&long).expect_err("overlong id should be rejected");
        assert!(
            matches!(err, IdError::TooLong),
            "should return IdError::TooLong"
        );
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = PatientId::new("p-42").expect("id should be accepted");
        let json = serde_json::to_string(&id).expect("serialize should succeed");
        assert_eq!(json, "\"p-42\"");
    }

    #[test]
    fn deserialize_validates() {
        let id: PatientId = serde_json::from_str("\"p-42\"").expect("valid id should deserialize");
        assert_eq!(id.as_str(), "p-42");

        let err = serde_json::from_str::<PatientId>("\"  \"")
            .expect_err("empty id should fail to deserialize");
        assert!(err.to_string().contains("empty"));
    }
}
