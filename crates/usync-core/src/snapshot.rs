//! Cached user snapshot.
//!
//! A `UserSnapshot` is the locally cached copy of the account's externally
//! visible status fields (verification flag, approval status, display name...).
//! It is the monotonic merge of every accepted update: `last_timestamp` only
//! ever moves forward.

use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Status fields keyed by name.
///
/// Ordered so that serialized snapshots are byte-stable across tabs.
pub type Fields = BTreeMap<String, Value>;

/// Cached account snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    /// Opaque identity key of the account.
    pub identity: String,
    /// Status fields.
    #[serde(default)]
    pub fields: Fields,
    /// Timestamp of the most recent accepted update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_timestamp: Option<DateTime<Utc>>,
}

/// A single field difference between two snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

impl UserSnapshot {
    /// Create an empty snapshot for an identity.
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            fields: Fields::new(),
            last_timestamp: None,
        }
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Builder-style timestamp setter.
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.last_timestamp = Some(timestamp);
        self
    }

    /// Build a snapshot from a profile endpoint body.
    ///
    /// `identity_field` names the member that carries the identity key
    /// (string or number). Every other top-level member becomes a field.
    pub fn from_profile(body: Value, identity_field: &str) -> Result<Self> {
        let Value::Object(map) = body else {
            return Err(CoreError::MalformedSnapshot(
                "profile body is not a JSON object".to_string(),
            ));
        };

        let mut fields = Fields::new();
        let mut identity = None;
        for (key, value) in map {
            if key == identity_field {
                identity = match value {
                    Value::String(s) if !s.is_empty() => Some(s),
                    Value::Number(n) => Some(n.to_string()),
                    other => {
                        return Err(CoreError::MalformedSnapshot(format!(
                            "identity field '{identity_field}' has unusable value {other}"
                        )))
                    }
                };
            } else {
                fields.insert(key, value);
            }
        }

        let identity = identity.ok_or_else(|| {
            CoreError::MalformedSnapshot(format!("missing identity field '{identity_field}'"))
        })?;

        Ok(Self {
            identity,
            fields,
            last_timestamp: None,
        })
    }

    /// Get a field value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Check whether a boolean field is set to `true`.
    pub fn is_flag_set(&self, name: &str) -> bool {
        self.fields.get(name).and_then(Value::as_bool) == Some(true)
    }

    /// Compare identity and fields, ignoring the timestamp.
    pub fn same_fields(&self, other: &Self) -> bool {
        self.identity == other.identity && self.fields == other.fields
    }

    /// Merge a partial field set into this snapshot (field-by-field overwrite).
    pub fn merge(&mut self, partial: &Fields) {
        for (name, value) in partial {
            self.fields.insert(name.clone(), value.clone());
        }
    }

    /// List every field that differs between `self` and `newer`.
    pub fn diff(&self, newer: &Self) -> Vec<FieldChange> {
        let mut changes = Vec::new();
        for (name, before) in &self.fields {
            match newer.fields.get(name) {
                Some(after) if after == before => {}
                after => changes.push(FieldChange {
                    field: name.clone(),
                    before: Some(before.clone()),
                    after: after.cloned(),
                }),
            }
        }
        for (name, after) in &newer.fields {
            if !self.fields.contains_key(name) {
                changes.push(FieldChange {
                    field: name.clone(),
                    before: None,
                    after: Some(after.clone()),
                });
            }
        }
        changes
    }

    /// Serialize for the storage slot.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from the storage slot.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
