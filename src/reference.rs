// Copyright 2026 Modelmesh Contributors.

//! Reference finder: walks an entity tree and emits cross-reference edges.

use serde_json::Value;
use std::collections::HashSet;

use crate::identifier::{self, EntityKind, ReferenceSuffixPolicy};

/// The three kinds of edges the finder can emit (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    /// `from` directly holds `to` as a field value.
    Association,
    /// `from` holds the string identifier of `to`.
    Reference,
    /// A type-level edge only (not emitted by the instance-level finder).
    Attribute,
}

/// One edge in the instance reference graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceInfo {
    /// Id of the entity the edge originates from.
    pub from_id: String,
    /// Id of the entity (or dangling string) the edge points to.
    pub to_id: String,
    /// The kind of edge.
    pub kind: ReferenceKind,
}

impl ReferenceInfo {
    /// Builds a new edge.
    pub fn new(from_id: impl Into<String>, to_id: impl Into<String>, kind: ReferenceKind) -> Self {
        Self {
            from_id: from_id.into(),
            to_id: to_id.into(),
            kind,
        }
    }
}

/// Result of walking an entity's tree: the identifiable values discovered
/// beneath it, and the edges from it to them (and to any dangling string ids).
pub struct FindResult {
    /// Identifiable descendants, paired with their own extracted id.
    pub contained: Vec<(String, Value)>,
    /// All edges discovered during the walk, deduplicated by `(from, to, kind)`.
    pub edges: Vec<ReferenceInfo>,
}

/// Depth-first walk of `root`, classifying descendants and emitting edges
/// per §4.B. `root_id` is the identifier already extracted for `root` itself.
pub fn find(root_id: &str, root: &Value, policy: &ReferenceSuffixPolicy) -> FindResult {
    let mut contained = Vec::new();
    let mut edges = HashSet::new();
    let mut visited = HashSet::new();
    visited.insert(root_id.to_string());

    walk(root_id, root, policy, &mut contained, &mut edges, &mut visited);

    FindResult {
        contained,
        edges: edges.into_iter().collect(),
    }
}

fn walk(
    from_id: &str,
    value: &Value,
    policy: &ReferenceSuffixPolicy,
    contained: &mut Vec<(String, Value)>,
    edges: &mut HashSet<ReferenceInfo>,
    visited: &mut HashSet<String>,
) {
    let Value::Object(map) = value else { return };

    for (field_name, field_value) in map {
        if identifier::STANDARD_METADATA_FIELDS.contains(&field_name.as_str()) {
            continue;
        }
        walk_field(from_id, field_name, field_value, policy, contained, edges, visited);
    }
}

fn walk_field(
    from_id: &str,
    field_name: &str,
    field_value: &Value,
    policy: &ReferenceSuffixPolicy,
    contained: &mut Vec<(String, Value)>,
    edges: &mut HashSet<ReferenceInfo>,
    visited: &mut HashSet<String>,
) {
    match field_value {
        Value::Null => {}
        Value::Array(items) => {
            for item in items {
                walk_field(from_id, field_name, item, policy, contained, edges, visited);
            }
        }
        Value::String(s) => {
            if policy.matches(field_name) && !s.is_empty() {
                emit_reference(from_id, s, edges);
            }
        }
        Value::Number(n) => {
            if policy.matches(field_name) {
                emit_reference(from_id, &n.to_string(), edges);
            }
        }
        obj @ Value::Object(_) => match identifier::classify(obj) {
            EntityKind::Identifiable => {
                descend_identifiable(from_id, obj, policy, contained, edges, visited)
            }
            EntityKind::IdentifiableContainer => {
                if let Value::Object(inner) = obj {
                    for v in inner.values() {
                        walk_field(from_id, field_name, v, policy, contained, edges, visited);
                    }
                }
            }
            EntityKind::Unidentifiable => {}
        },
        Value::Bool(_) => {}
    }
}

fn descend_identifiable(
    from_id: &str,
    obj: &Value,
    policy: &ReferenceSuffixPolicy,
    contained: &mut Vec<(String, Value)>,
    edges: &mut HashSet<ReferenceInfo>,
    visited: &mut HashSet<String>,
) {
    let child_id = identifier::id_with_patch(obj, None);
    if child_id == from_id {
        return; // self-loop, excluded
    }
    edges.insert(ReferenceInfo::new(from_id, &child_id, ReferenceKind::Association));

    if visited.contains(&child_id) {
        return; // cycle already walked
    }
    visited.insert(child_id.clone());
    contained.push((child_id.clone(), obj.clone()));
    walk(&child_id, obj, policy, contained, edges, visited);
}

fn emit_reference(from_id: &str, to_id: &str, edges: &mut HashSet<ReferenceInfo>) {
    if to_id == from_id {
        return;
    }
    edges.insert(ReferenceInfo::new(from_id, to_id, ReferenceKind::Reference));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy() -> ReferenceSuffixPolicy {
        ReferenceSuffixPolicy::default()
    }

    #[test]
    fn association_edge_for_embedded_identifiable() {
        let root = json!({
            "id": "valid_aas_id",
            "submodel": {"id": "example_submodel_id", "value": 1}
        });
        let result = find("valid_aas_id", &root, &policy());
        assert_eq!(result.contained.len(), 1);
        assert!(result.edges.contains(&ReferenceInfo::new(
            "valid_aas_id",
            "example_submodel_id",
            ReferenceKind::Association
        )));
    }

    #[test]
    fn reference_edge_for_suffix_named_string_field() {
        let root = json!({"id": "a", "target_id": "b"});
        let result = find("a", &root, &policy());
        assert!(result.edges.contains(&ReferenceInfo::new(
            "a",
            "b",
            ReferenceKind::Reference
        )));
        assert!(result.contained.is_empty());
    }

    #[test]
    fn plain_nested_object_without_id_is_not_an_association() {
        let root = json!({"parent_id": "p1", "addr": {"street": "x"}});
        let result = find("a", &root, &policy());
        assert!(result.contained.is_empty());
        assert!(!result
            .edges
            .iter()
            .any(|e| e.kind == ReferenceKind::Association));
    }

    #[test]
    fn standard_metadata_fields_never_emit_reference() {
        let root = json!({"id": "a", "description": "not a ref", "semantic_id": "sem"});
        let result = find("a", &root, &policy());
        assert!(result.edges.is_empty());
    }

    #[test]
    fn self_loop_is_excluded() {
        let root = json!({"id": "a", "parent_id": "a"});
        let result = find("a", &root, &policy());
        assert!(result.edges.is_empty());
    }

    #[test]
    fn cycle_is_emitted_once_and_does_not_infinitely_recurse() {
        // A references B via id-string, B references A via id-string: no
        // embedded objects, so this is two REFERENCE edges, not a structural
        // cycle, but we still verify dedup across repeated fields.
        let root = json!({"id": "a", "peer_id": "b", "other_peer_id": "b"});
        let result = find("a", &root, &policy());
        let to_b: Vec<_> = result
            .edges
            .iter()
            .filter(|e| e.to_id == "b")
            .collect();
        assert_eq!(to_b.len(), 1);
    }

    #[test]
    fn empty_string_suffix_field_is_ignored() {
        let root = json!({"id": "a", "target_id": ""});
        let result = find("a", &root, &policy());
        assert!(result.edges.is_empty());
    }

    #[test]
    fn nested_container_of_identifiables_flattens() {
        let root = json!({
            "id": "valid_aas_id",
            "submodels": [
                {"id": "example_submodel_id"},
                {"id": "example_submodel_2_id"}
            ]
        });
        let result = find("valid_aas_id", &root, &policy());
        assert_eq!(result.contained.len(), 2);
        assert_eq!(result.edges.len(), 2);
    }

    #[test]
    fn dangling_reference_is_retained() {
        let root = json!({"id": "a", "missing_id": "does_not_exist"});
        let result = find("a", &root, &policy());
        assert_eq!(result.edges.len(), 1);
        assert_eq!(result.edges[0].kind, ReferenceKind::Reference);
    }

    #[test]
    fn numeric_id_suffix_field_coerces_to_string() {
        let root = json!({"id": "a", "target_id": 42});
        let result = find("a", &root, &policy());
        assert!(result.edges.contains(&ReferenceInfo::new(
            "a",
            "42",
            ReferenceKind::Reference
        )));
    }
}
