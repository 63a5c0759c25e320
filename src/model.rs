// Copyright 2026 Modelmesh Contributors.

//! The data model: an indexed container of entities plus its reference graph (§3, §4.C).

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::error::{MiddlewareError, MiddlewareResult};
use crate::identifier::{self, ReferenceSuffixPolicy};
use crate::reference::{self, ReferenceInfo, ReferenceKind};

/// An entity stored in the data model: its JSON value, shared so in-place
/// mutation is visible through every index that holds it (§5).
pub type SharedEntity = Arc<RwLock<Value>>;

/// Indexed container of entities discovered during ingestion, plus the
/// instance reference graph built from them.
///
/// `by_type_name` uses an [`IndexMap`] rather than a `HashMap` so
/// [`DataModel::type_names`] enumerates types in first-seen order — the
/// order REST routes and GraphQL list fields are generated in, which makes
/// repeated runs against the same input produce a stable router/schema.
pub struct DataModel {
    name: String,
    suffix_policy: ReferenceSuffixPolicy,
    by_id: HashMap<String, SharedEntity>,
    by_type_name: IndexMap<String, IndexSet<String>>,
    id_to_type: HashMap<String, String>,
    top_level: IndexSet<String>,
    referenced_by: HashMap<String, IndexSet<String>>,
    referring_to: HashMap<String, IndexSet<String>>,
    edges: Vec<ReferenceInfo>,
}

impl DataModel {
    /// Creates an empty data model with the default reference-suffix policy.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_policy(name, ReferenceSuffixPolicy::default())
    }

    /// Creates an empty data model with a caller-supplied reference-suffix policy.
    pub fn with_policy(name: impl Into<String>, suffix_policy: ReferenceSuffixPolicy) -> Self {
        Self {
            name: name.into(),
            suffix_policy,
            by_id: HashMap::new(),
            by_type_name: IndexMap::new(),
            id_to_type: HashMap::new(),
            top_level: IndexSet::new(),
            referenced_by: HashMap::new(),
            referring_to: HashMap::new(),
            edges: Vec::new(),
        }
    }

    /// Name of this data model, used as the first component of every
    /// [`crate::connection_info::ConnectionInfo`] addressing it.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ingests a single top-level entity (§4.C `from_models`/`load_model`).
    pub fn load_model(&mut self, type_name: impl Into<String>, value: Value) -> MiddlewareResult<String> {
        let type_name = type_name.into();
        let root_id = identifier::id_with_patch(&value, None);
        self.ingest(&root_id, &type_name, value.clone())?;
        self.top_level.insert(root_id.clone());

        let find_result = reference::find(&root_id, &value, &self.suffix_policy);
        for (child_id, child_value) in &find_result.contained {
            let child_type = child_value
                .get("__type")
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_string();
            self.ingest(child_id, &child_type, child_value.clone())?;
        }
        self.record_edges(find_result.edges);
        Ok(root_id)
    }

    /// Ingests many top-level entities in one call (§4.C `load_models`).
    pub fn load_models(
        &mut self,
        entities: impl IntoIterator<Item = (String, Value)>,
    ) -> MiddlewareResult<Vec<String>> {
        entities
            .into_iter()
            .map(|(type_name, value)| self.load_model(type_name, value))
            .collect()
    }

    fn ingest(&mut self, id: &str, type_name: &str, value: Value) -> MiddlewareResult<()> {
        if let Some(existing) = self.by_id.get(id) {
            let existing_value = existing.read().expect("entity lock poisoned").clone();
            if existing_value == value {
                return Ok(()); // normalization: identical value, keep canonical instance
            }
            return Err(MiddlewareError::DuplicateIdWithConflict { id: id.to_string() });
        }
        self.by_id.insert(id.to_string(), Arc::new(RwLock::new(value)));
        self.id_to_type.insert(id.to_string(), type_name.to_string());
        self.by_type_name
            .entry(type_name.to_string())
            .or_default()
            .insert(id.to_string());
        Ok(())
    }

    fn record_edges(&mut self, edges: Vec<ReferenceInfo>) {
        for edge in edges {
            self.referring_to
                .entry(edge.from_id.clone())
                .or_default()
                .insert(edge.to_id.clone());
            self.referenced_by
                .entry(edge.to_id.clone())
                .or_default()
                .insert(edge.from_id.clone());
            self.edges.push(edge);
        }
    }

    /// Looks up an entity by id.
    pub fn get_model(&self, id: &str) -> Option<SharedEntity> {
        self.by_id.get(id).cloned()
    }

    /// All ids registered under `type_name`.
    pub fn get_models_of_type_name(&self, type_name: &str) -> Vec<String> {
        self.by_type_name
            .get(type_name)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Ids explicitly passed to `load_model`/`load_models`, not merely discovered.
    pub fn get_top_level_models(&self) -> Vec<String> {
        self.top_level.iter().cloned().collect()
    }

    /// Ids discovered during traversal but not passed in directly.
    pub fn get_contained_models(&self) -> Vec<String> {
        self.by_id
            .keys()
            .filter(|id| !self.top_level.contains(*id))
            .cloned()
            .collect()
    }

    /// Ids of entities that hold a reference edge pointing at `id`.
    pub fn get_referencing_models(&self, id: &str) -> Vec<String> {
        self.referenced_by
            .get(id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Ids referenced by the entity at `id`.
    pub fn get_referenced_models(&self, id: &str) -> Vec<String> {
        self.referring_to
            .get(id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All edges in the instance reference graph.
    pub fn edges(&self) -> &[ReferenceInfo] {
        &self.edges
    }

    /// Adds a standalone entity (not part of any traversal), e.g. one
    /// constructed directly by a workflow.
    pub fn add_model(&mut self, type_name: impl Into<String>, value: Value, top_level: bool) -> MiddlewareResult<String> {
        let type_name = type_name.into();
        let id = identifier::id_with_patch(&value, None);
        self.ingest(&id, &type_name, value.clone())?;
        if top_level {
            self.top_level.insert(id.clone());
        }
        let find_result = reference::find(&id, &value, &self.suffix_policy);
        self.record_edges(find_result.edges);
        Ok(id)
    }

    /// Removes an entity by id. Refuses if another still-present entity
    /// holds an ASSOCIATION edge to it, unless `cascade` is set.
    pub fn remove_model(&mut self, id: &str, cascade: bool) -> MiddlewareResult<()> {
        if !self.by_id.contains_key(id) {
            return Err(MiddlewareError::NotFound(id.to_string()));
        }
        let associating_referrers: Vec<String> = self
            .edges
            .iter()
            .filter(|e| e.to_id == id && e.kind == ReferenceKind::Association && self.by_id.contains_key(&e.from_id))
            .map(|e| e.from_id.clone())
            .collect();

        if !associating_referrers.is_empty() && !cascade {
            return Err(MiddlewareError::ConnectionError(format!(
                "cannot remove '{id}': still referenced by {associating_referrers:?}"
            )));
        }

        self.by_id.remove(id);
        if let Some(type_name) = self.id_to_type.remove(id) {
            if let Some(set) = self.by_type_name.get_mut(&type_name) {
                set.shift_remove(id);
            }
        }
        self.top_level.shift_remove(id);
        self.edges.retain(|e| e.from_id != id && e.to_id != id);
        self.referenced_by.remove(id);
        self.referring_to.remove(id);
        for set in self.referenced_by.values_mut() {
            set.shift_remove(id);
        }
        for set in self.referring_to.values_mut() {
            set.shift_remove(id);
        }
        Ok(())
    }

    /// Re-keys every index entry from `old_id` to `new_id` after an in-place
    /// mutation of an entity's identifier field (§5).
    pub fn reindex(&mut self, old_id: &str, new_id: &str) -> MiddlewareResult<()> {
        let entity = self
            .by_id
            .remove(old_id)
            .ok_or_else(|| MiddlewareError::NotFound(old_id.to_string()))?;
        self.by_id.insert(new_id.to_string(), entity);

        if let Some(type_name) = self.id_to_type.remove(old_id) {
            if let Some(set) = self.by_type_name.get_mut(&type_name) {
                set.shift_remove(old_id);
                set.insert(new_id.to_string());
            }
            self.id_to_type.insert(new_id.to_string(), type_name);
        }
        if self.top_level.shift_remove(old_id) {
            self.top_level.insert(new_id.to_string());
        }
        for edge in &mut self.edges {
            if edge.from_id == old_id {
                edge.from_id = new_id.to_string();
            }
            if edge.to_id == old_id {
                edge.to_id = new_id.to_string();
            }
        }
        if let Some(set) = self.referenced_by.remove(old_id) {
            self.referenced_by.insert(new_id.to_string(), set);
        }
        if let Some(set) = self.referring_to.remove(old_id) {
            self.referring_to.insert(new_id.to_string(), set);
        }
        for set in self.referenced_by.values_mut() {
            if set.shift_remove(old_id) {
                set.insert(new_id.to_string());
            }
        }
        for set in self.referring_to.values_mut() {
            if set.shift_remove(old_id) {
                set.insert(new_id.to_string());
            }
        }
        Ok(())
    }

    /// Every distinct type name present in this data model, used to drive
    /// REST/GraphQL generation over the whole type graph.
    pub fn type_names(&self) -> Vec<String> {
        self.by_type_name.keys().cloned().collect()
    }

    /// Type-level edges: for every instance ASSOCIATION/REFERENCE edge,
    /// the corresponding (from-type, to-type) pair (§3 type graph, §4.C).
    pub fn type_graph_edges(&self) -> HashSet<(String, String)> {
        self.edges
            .iter()
            .filter_map(|e| {
                let from_type = self.id_to_type.get(&e.from_id)?;
                let to_type = self.id_to_type.get(&e.to_id)?;
                Some((from_type.clone(), to_type.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_aas() -> Value {
        json!({
            "id": "valid_aas_id",
            "id_short": "ValidAAS",
            "submodels": [
                {"id": "example_submodel_id", "id_short": "ExampleSubmodel", "float_attribute": 1.0,
                 "nested": [{"id": "nested_1"}, {"id": "nested_2"}]},
                {"id": "example_submodel_2_id", "id_short": "ExampleSubmodel2",
                 "items": [{"id": "c1"}, {"id": "c2"}, {"id": "c3"}, {"id": "c4"}, {"id": "c5"}]}
            ]
        })
    }

    #[test]
    fn ingest_and_query_scenario() {
        let mut dm = DataModel::new("test");
        dm.load_model("ValidAAS", valid_aas()).unwrap();

        assert_eq!(dm.get_top_level_models().len(), 1);
        assert_eq!(dm.get_contained_models().len(), 8);
        assert_eq!(
            dm.get_referencing_models("example_submodel_id"),
            vec!["valid_aas_id".to_string()]
        );
    }

    #[test]
    fn duplicate_conflicting_ids_fail() {
        let mut dm = DataModel::new("test");
        dm.load_model(
            "ExampleSubmodel",
            json!({"id_short": "example_submodel_id", "float_attribute": 1.0}),
        )
        .unwrap();
        let result = dm.load_model(
            "ExampleSubmodel",
            json!({"id_short": "example_submodel_id", "float_attribute": 2.0}),
        );
        assert!(matches!(
            result,
            Err(MiddlewareError::DuplicateIdWithConflict { .. })
        ));
    }

    #[test]
    fn duplicate_identical_ids_are_normalized_not_rejected() {
        let mut dm = DataModel::new("test");
        let value = json!({"id_short": "example_submodel_id", "float_attribute": 1.0});
        dm.load_model("ExampleSubmodel", value.clone()).unwrap();
        assert!(dm.load_model("ExampleSubmodel", value).is_ok());
    }

    #[test]
    fn association_edges_resolve_in_by_id() {
        let mut dm = DataModel::new("test");
        dm.load_model("ValidAAS", valid_aas()).unwrap();
        for edge in dm.edges() {
            if edge.kind == ReferenceKind::Association {
                assert!(dm.get_model(&edge.from_id).is_some());
                assert!(dm.get_model(&edge.to_id).is_some());
            }
        }
    }

    #[test]
    fn remove_model_refuses_when_still_referenced() {
        let mut dm = DataModel::new("test");
        dm.load_model("ValidAAS", valid_aas()).unwrap();
        let result = dm.remove_model("example_submodel_id", false);
        assert!(result.is_err());
    }

    #[test]
    fn remove_model_with_cascade_succeeds() {
        let mut dm = DataModel::new("test");
        dm.load_model("ValidAAS", valid_aas()).unwrap();
        dm.remove_model("example_submodel_id", true).unwrap();
        assert!(dm.get_model("example_submodel_id").is_none());
    }

    #[test]
    fn remove_top_level_model_then_recreate_is_idempotent_scenario() {
        let mut dm = DataModel::new("test");
        let id = dm.load_model("ValidAAS", json!({"id": "valid_aas_id"})).unwrap();
        dm.remove_model(&id, false).unwrap();
        assert!(dm.get_top_level_models().is_empty());
        dm.load_model("ValidAAS", json!({"id": "valid_aas_id"})).unwrap();
        assert_eq!(dm.get_top_level_models().len(), 1);
    }

    #[test]
    fn reindex_moves_all_index_entries() {
        let mut dm = DataModel::new("test");
        dm.load_model("ValidAAS", json!({"id": "valid_aas_id"})).unwrap();
        dm.reindex("valid_aas_id", "new").unwrap();
        assert!(dm.get_model("valid_aas_id").is_none());
        assert!(dm.get_model("new").is_some());
        assert_eq!(dm.get_top_level_models(), vec!["new".to_string()]);
    }

    #[test]
    fn reindex_updates_edges_pointing_at_old_id() {
        let mut dm = DataModel::new("test");
        dm.load_model("ValidAAS", valid_aas()).unwrap();
        dm.reindex("example_submodel_id", "renamed_submodel").unwrap();
        assert_eq!(
            dm.get_referencing_models("renamed_submodel"),
            vec!["valid_aas_id".to_string()]
        );
        assert!(dm.get_referencing_models("example_submodel_id").is_empty());
    }

    #[test]
    fn in_place_mutation_is_visible_through_index() {
        let mut dm = DataModel::new("test");
        dm.load_model("ValidAAS", json!({"id": "valid_aas_id", "count": 1})).unwrap();
        let entity = dm.get_model("valid_aas_id").unwrap();
        entity.write().unwrap()["count"] = json!(2);
        let reread = dm.get_model("valid_aas_id").unwrap();
        assert_eq!(reread.read().unwrap()["count"], json!(2));
    }

    #[test]
    fn type_graph_edges_reflect_instance_edges() {
        let mut dm = DataModel::new("test");
        dm.load_model("ValidAAS", valid_aas()).unwrap();
        let type_edges = dm.type_graph_edges();
        assert!(type_edges
            .iter()
            .any(|(from, to)| from == "ValidAAS" && to == "ExampleSubmodel"));
    }
}
