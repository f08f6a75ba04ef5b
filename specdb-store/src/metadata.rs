//! Typed metadata fields attached to a reading
//!
//! Fields are stored as (name, type tag, string value) rows. On read the tag
//! selects the variant; a value that does not parse under its tag falls back
//! to [`FieldValue::Text`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Timestamp added on first store when the record has none
pub const FIELD_INSERT_TIMESTAMP: &str = "insert_timestamp";

/// Reserved: mirrors the reading row's format column
pub const FIELD_FORMAT: &str = "format";

/// Reserved: read-only indicator of the reading's surrogate key
pub const FIELD_DATABASE_ID: &str = "database_id";

/// Boolean flag marking placeholder readings
pub const FIELD_DUMMY: &str = "dummy";

pub const FIELD_INSTRUMENT: &str = "instrument";

/// Layout of [`FIELD_INSERT_TIMESTAMP`] values (sorts lexicographically)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Fields that are never written to the metadata table
///
/// `format` and `database_id` mirror columns of the reading row. The dummy
/// flag is not reserved: it is persisted so filters can match on its value.
pub fn is_reserved(name: &str) -> bool {
    name == FIELD_FORMAT || name == FIELD_DATABASE_ID
}

/// Declared type of a metadata field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Text,
    Number,
    Boolean,
}

impl FieldType {
    /// One-letter tag persisted in the `type` column
    pub fn tag(self) -> &'static str {
        match self {
            FieldType::Text => "S",
            FieldType::Number => "N",
            FieldType::Boolean => "B",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "S" => Some(FieldType::Text),
            "N" => Some(FieldType::Number),
            "B" => Some(FieldType::Boolean),
            _ => None,
        }
    }
}

/// Value of a single metadata field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Boolean(bool),
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Text(_) => FieldType::Text,
            FieldValue::Number(_) => FieldType::Number,
            FieldValue::Boolean(_) => FieldType::Boolean,
        }
    }

    /// String form persisted in the `value` column
    pub fn encode(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Boolean(b) => b.to_string(),
        }
    }

    /// Decode a stored value under its declared tag
    ///
    /// Returns `Err` with the text fallback when the value does not parse.
    pub fn decode(field_type: FieldType, raw: &str) -> Result<Self, FieldValue> {
        match field_type {
            FieldType::Text => Ok(FieldValue::Text(raw.to_string())),
            FieldType::Number => raw
                .trim()
                .parse::<f64>()
                .map(FieldValue::Number)
                .map_err(|_| FieldValue::Text(raw.to_string())),
            FieldType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(FieldValue::Boolean(true)),
                "false" | "0" => Ok(FieldValue::Boolean(false)),
                _ => Err(FieldValue::Text(raw.to_string())),
            },
        }
    }

    /// Decode a (tag, value) row, coercing to text on any mismatch
    pub fn decode_lossy(owner: &str, field: &str, tag: &str, raw: &str) -> Self {
        let Some(field_type) = FieldType::from_tag(tag) else {
            warn!(owner, field, tag, "Unknown field type tag, treating value as string");
            return FieldValue::Text(raw.to_string());
        };

        match FieldValue::decode(field_type, raw) {
            Ok(value) => value,
            Err(fallback) => {
                warn!(
                    owner,
                    field,
                    tag,
                    value = raw,
                    "Value does not match declared type, treating as string"
                );
                fallback
            }
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

/// Full set of metadata fields for one owner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl MetadataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Insert or overwrite a field
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    /// Fields that are written to the metadata table
    pub fn persistable(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter().filter(|(name, _)| !is_reserved(name))
    }

    pub fn is_dummy(&self) -> bool {
        matches!(self.get(FIELD_DUMMY), Some(FieldValue::Boolean(true)))
    }
}

impl FromIterator<(String, FieldValue)> for MetadataRecord {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Current UTC time in [`TIMESTAMP_FORMAT`]
pub fn now_timestamp() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_by_tag() {
        assert_eq!(
            FieldValue::decode(FieldType::Number, "7.25"),
            Ok(FieldValue::Number(7.25))
        );
        assert_eq!(
            FieldValue::decode(FieldType::Boolean, "true"),
            Ok(FieldValue::Boolean(true))
        );
        assert_eq!(
            FieldValue::decode(FieldType::Text, "7.25"),
            Ok(FieldValue::Text("7.25".to_string()))
        );
    }

    #[test]
    fn test_decode_mismatch_falls_back_to_text() {
        let value = FieldValue::decode_lossy("s1", "moisture", "N", "wet");
        assert_eq!(value, FieldValue::Text("wet".to_string()));

        let value = FieldValue::decode_lossy("s1", "flag", "B", "maybe");
        assert_eq!(value, FieldValue::Text("maybe".to_string()));

        let value = FieldValue::decode_lossy("s1", "odd", "X", "1");
        assert_eq!(value, FieldValue::Text("1".to_string()));
    }

    #[test]
    fn test_number_encoding_round_trips() {
        for n in [0.0, 5.0, -3.5, 1e-9, 12345.678] {
            let encoded = FieldValue::Number(n).encode();
            assert_eq!(FieldValue::decode(FieldType::Number, &encoded), Ok(FieldValue::Number(n)));
        }
    }

    #[test]
    fn test_reserved_fields_not_persistable() {
        let record = MetadataRecord::new()
            .with(FIELD_FORMAT, "NIR")
            .with(FIELD_DATABASE_ID, 4.0)
            .with("moisture", 5.5);

        let names: Vec<&String> = record.persistable().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["moisture"]);
    }

    #[test]
    fn test_json_shape() {
        let record = MetadataRecord::new()
            .with("instrument", "nir-1")
            .with("moisture", 5.5)
            .with(FIELD_DUMMY, true);

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"dummy":true,"instrument":"nir-1","moisture":5.5}"#);

        let back: MetadataRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert!(back.is_dummy());
    }
}
