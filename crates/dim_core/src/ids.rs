use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::{DimError, DimResult};

/// Source-side user identifier (`BINARY(16)` in the operational store).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NaturalKey(pub [u8; 16]);

impl NaturalKey {
    pub fn new() -> Self {
        Self(*Uuid::new_v4().as_bytes())
    }

    pub fn from_uuid_str(value: &str) -> DimResult<Self> {
        let uuid = Uuid::parse_str(value)
            .map_err(|err| DimError::invalid(format!("invalid user id '{value}': {err}")))?;
        Ok(Self(*uuid.as_bytes()))
    }

    pub fn from_slice(bytes: &[u8]) -> DimResult<Self> {
        let buf: [u8; 16] = bytes
            .try_into()
            .map_err(|_| DimError::invalid(format!("invalid user id length {}", bytes.len())))?;
        Ok(Self(buf))
    }

    pub fn to_uuid_string(self) -> String {
        Uuid::from_bytes(self.0).to_string()
    }

    pub fn as_bytes(self) -> [u8; 16] {
        self.0
    }

    pub fn as_vec(self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl Default for NaturalKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_bytes(self.0))
    }
}

impl Serialize for NaturalKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_uuid_string())
    }
}

impl<'de> Deserialize<'de> for NaturalKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        NaturalKey::from_uuid_str(&value).map_err(serde::de::Error::custom)
    }
}

/// Store-assigned key of one dimension version.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurrogateKey(pub i64);

impl fmt::Display for SurrogateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::NaturalKey;

    #[test]
    fn natural_key_roundtrips_uuid_and_bytes() {
        let key = NaturalKey::new();
        let parsed = NaturalKey::from_uuid_str(&key.to_uuid_string()).expect("uuid parse");
        assert_eq!(parsed, key);
        let from_slice = NaturalKey::from_slice(&key.as_vec()).expect("slice");
        assert_eq!(from_slice, key);
    }

    #[test]
    fn natural_key_rejects_invalid_input() {
        assert!(NaturalKey::from_uuid_str("not-a-uuid").is_err());
        assert!(NaturalKey::from_slice(&[1, 2, 3]).is_err());
    }
}
