use crate::errors::DbError;
use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const FIELD_ID: &str = "id";
pub const FIELD_CREATED_AT: &str = "createdAt";
pub const FIELD_UPDATED_AT: &str = "updatedAt";

#[must_use]
pub fn is_reserved_field(name: &str) -> bool {
    matches!(name, FIELD_ID | FIELD_CREATED_AT | FIELD_UPDATED_AT)
}

/// A single stored document: user fields plus the reserved `id`,
/// `createdAt` and `updatedAt` fields, which the engine manages.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Builds a fresh document at insert time. Reserved keys are stripped
    /// from `fields`; both timestamps are set to `now`.
    #[must_use]
    pub fn new(id: String, mut fields: Map<String, Value>, now: DateTime<Utc>) -> Self {
        for key in [FIELD_ID, FIELD_CREATED_AT, FIELD_UPDATED_AT] {
            fields.shift_remove(key);
        }
        Self { id, fields, created_at: now, updated_at: now }
    }

    /// Field-wise merge of `incoming` over the existing fields (upsert).
    /// `createdAt` is preserved; `updatedAt` is refreshed.
    pub fn merge(&mut self, incoming: Map<String, Value>, now: DateTime<Utc>) {
        for (key, value) in incoming {
            if is_reserved_field(&key) {
                continue;
            }
            self.fields.insert(key, value);
        }
        self.updated_at = now;
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    /// Canonical JSON rendering: `id` first, user fields in lexicographic
    /// order, then `createdAt` and `updatedAt`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut out = Map::with_capacity(self.fields.len() + 3);
        out.insert(FIELD_ID.to_string(), Value::String(self.id.clone()));
        let mut keys: Vec<&String> = self.fields.keys().collect();
        keys.sort();
        for key in keys {
            out.insert(key.clone(), self.fields[key.as_str()].clone());
        }
        out.insert(FIELD_CREATED_AT.to_string(), Value::String(format_ts(self.created_at)));
        out.insert(FIELD_UPDATED_AT.to_string(), Value::String(format_ts(self.updated_at)));
        Value::Object(out)
    }

    /// Rebuilds a document from a stored JSON object. Missing reserved
    /// fields are tolerated: a fresh id or load-time timestamps fill in.
    #[must_use]
    pub fn from_stored(mut map: Map<String, Value>) -> Self {
        let id = map
            .shift_remove(FIELD_ID)
            .and_then(|v| coerce_id(&v).ok())
            .unwrap_or_else(random_id);
        let created_at = take_ts(&mut map, FIELD_CREATED_AT);
        let updated_at = take_ts(&mut map, FIELD_UPDATED_AT);
        Self { id, fields: map, created_at, updated_at }
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 3))?;
        map.serialize_entry(FIELD_ID, &self.id)?;
        let mut entries: Vec<(&String, &Value)> = self.fields.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in entries {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry(FIELD_CREATED_AT, &format_ts(self.created_at))?;
        map.serialize_entry(FIELD_UPDATED_AT, &format_ts(self.updated_at))?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::deserialize(deserializer)?;
        Ok(Self::from_stored(map))
    }
}

fn take_ts(map: &mut Map<String, Value>, key: &str) -> DateTime<Utc> {
    map.shift_remove(key)
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map_or_else(Utc::now, |dt| dt.with_timezone(&Utc))
}

/// RFC-3339 with millisecond precision and a `Z` suffix.
pub(crate) fn format_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Coerces a caller-supplied id value to its string form.
pub(crate) fn coerce_id(value: &Value) -> Result<String, DbError> {
    match value {
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(DbError::Validation(format!("unusable id value: {other}"))),
    }
}

/// 16 hex digits from the thread-local CSPRNG.
pub(crate) fn random_id() -> String {
    let mut bytes = [0u8; 8];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Short monotonically-varying batch-id token: base-36 of the insert-time
/// millisecond timestamp.
pub(crate) fn batch_prefix(millis: u64) -> String {
    base36(millis)
}

fn base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
