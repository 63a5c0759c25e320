// Copyright 2026 Modelmesh Contributors.

//! Identifier extraction and entity-kind classification.
//!
//! Entities in a data model are dynamically shaped JSON values; this module
//! draws a stable string identifier out of such a value following a fixed
//! precedence and classifies values into identifiable / container / scalar
//! kinds.

use serde_json::Value;
use std::collections::HashSet;

use crate::error::{MiddlewareError, MiddlewareResult};

/// Field names treated as conventional identifier carriers, in precedence order.
pub const CONVENTIONAL_ID_FIELDS: &[&str] =
    &["id", "id_short", "Id", "ID", "Identifier", "identity"];

/// Standard metadata fields excluded from reference-suffix detection.
pub const STANDARD_METADATA_FIELDS: &[&str] = &["id", "description", "id_short", "semantic_id"];

/// The three entity kinds a value can be classified into (§3, §4.A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Carries a stable id and is not itself a container.
    Identifiable,
    /// An ordered sequence, set, tuple, or mapping whose elements are all identifiable.
    IdentifiableContainer,
    /// A scalar, timestamp, byte blob, file, or blob handle.
    Unidentifiable,
}

/// Returns true if `value` is a JSON object carrying an identifiable marker.
///
/// A value is identifiable when it is a JSON object (not an array, not a
/// bare scalar) that is not one of the well-known unidentifiable shapes
/// (`File`, `Blob`, RFC 3339 timestamp string, byte array).
pub fn is_identifiable(value: &Value) -> bool {
    match value {
        Value::Object(map) => !is_file_or_blob(map) && has_any_id_field(map),
        _ => false,
    }
}

fn is_file_or_blob(map: &serde_json::Map<String, Value>) -> bool {
    matches!(
        map.get("__type").and_then(Value::as_str),
        Some("File") | Some("Blob")
    )
}

fn has_any_id_field(map: &serde_json::Map<String, Value>) -> bool {
    CONVENTIONAL_ID_FIELDS.iter().any(|f| map.contains_key(*f))
}

/// Returns true if `value` is an array, or an object acting as a mapping,
/// whose elements/values are all identifiable.
pub fn is_identifiable_container(value: &Value) -> bool {
    match value {
        Value::Array(items) => !items.is_empty() && items.iter().all(is_identifiable),
        Value::Object(map) if !is_file_or_blob(map) => {
            !map.is_empty() && map.values().all(is_identifiable) && !has_any_id_field(map)
        }
        _ => false,
    }
}

/// Classifies a value into one of the three entity kinds.
pub fn classify(value: &Value) -> EntityKind {
    if is_identifiable(value) {
        EntityKind::Identifiable
    } else if is_identifiable_container(value) {
        EntityKind::IdentifiableContainer
    } else {
        EntityKind::Unidentifiable
    }
}

/// Extracts a stable identifier from `value`.
///
/// Precedence: a declared `id_field` (if the caller knows the schema's
/// identifier-typed field name) → the first present conventional field
/// (`id`, `id_short`, …) → failure.
pub fn id(value: &Value, id_field: Option<&str>) -> MiddlewareResult<String> {
    if let Some(field) = id_field {
        if let Some(v) = value.get(field) {
            if let Some(s) = as_id_string(v) {
                return Ok(s);
            }
        }
    }
    for field in CONVENTIONAL_ID_FIELDS {
        if let Some(v) = value.get(field) {
            if let Some(s) = as_id_string(v) {
                return Ok(s);
            }
        }
    }
    Err(MiddlewareError::NoIdentifier(
        serde_json::to_string(value).unwrap_or_default(),
    ))
}

/// Like [`id`] but never fails: falls back to a synthetic `id_<hash>` derived
/// from the value's canonical JSON representation.
pub fn id_with_patch(value: &Value, id_field: Option<&str>) -> String {
    id(value, id_field).unwrap_or_else(|_| synthetic_id(value))
}

fn synthetic_id(value: &Value) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let canonical = serde_json::to_string(value).unwrap_or_default();
    let mut hasher = DefaultHasher::new();
    canonical.hash(&mut hasher);
    format!("id_{:016x}", hasher.finish())
}

fn as_id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// User-configurable heuristic for detecting REFERENCE-kind fields by name
/// suffix (§3, §9 Open Question).
#[derive(Debug, Clone)]
pub struct ReferenceSuffixPolicy {
    suffixes: HashSet<String>,
    excluded_fields: HashSet<String>,
}

impl Default for ReferenceSuffixPolicy {
    fn default() -> Self {
        Self {
            suffixes: [
                "id", "ids", "Id", "Ids", "ID", "IDs", "Identifier", "Identifiers", "identity",
                "identities",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            excluded_fields: STANDARD_METADATA_FIELDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ReferenceSuffixPolicy {
    /// Builds a policy from an explicit suffix set and exclusion list.
    pub fn new(suffixes: HashSet<String>, excluded_fields: HashSet<String>) -> Self {
        Self {
            suffixes,
            excluded_fields,
        }
    }

    /// Returns true if `field_name` should be treated as carrying a REFERENCE
    /// id under this policy.
    pub fn matches(&self, field_name: &str) -> bool {
        if self.excluded_fields.contains(field_name) {
            return false;
        }
        self.suffixes
            .iter()
            .any(|suffix| field_name.ends_with(suffix.as_str()))
    }
}
