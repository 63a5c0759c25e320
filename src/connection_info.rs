// Copyright 2026 Modelmesh Contributors.

//! Immutable addressing tuple for any node or sub-node under a data model.

use std::hash::{Hash, Hasher};

/// The derived connection type of a [`ConnectionInfo`] (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionType {
    /// Only `data_model_name` is set.
    DataModel,
    /// `model_id` is set.
    Model,
    /// `contained_model_id` is set.
    ContainedModel,
    /// `field_id` is set.
    Field,
}

/// Immutable tuple identifying a data model, an entity within it, an
/// optional nested identifiable inside that entity, and an optional field
/// inside whichever of those is most specific.
///
/// Equality and hashing ignore `model_type`, which is carried purely as a
/// hint for connector construction.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Name of the data model this connection addresses.
    pub data_model_name: String,
    /// Id of the top-level entity, if addressing below the data-model level.
    pub model_id: Option<String>,
    /// Id of a nested identifiable inside `model_id`, if addressing that deep.
    pub contained_model_id: Option<String>,
    /// Name of a field inside the most specific of the above, if addressing a field.
    pub field_id: Option<String>,
    /// Simple type name of the target, used only to pick a persistence factory.
    pub model_type: Option<String>,
}

impl ConnectionInfo {
    /// Addresses an entire data model.
    pub fn for_data_model(data_model_name: impl Into<String>) -> Self {
        Self {
            data_model_name: data_model_name.into(),
            model_id: None,
            contained_model_id: None,
            field_id: None,
            model_type: None,
        }
    }

    /// Addresses a single top-level entity.
    pub fn for_model(data_model_name: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            data_model_name: data_model_name.into(),
            model_id: Some(model_id.into()),
            contained_model_id: None,
            field_id: None,
            model_type: None,
        }
    }

    /// Addresses a nested identifiable inside a top-level entity.
    pub fn for_contained_model(
        data_model_name: impl Into<String>,
        model_id: impl Into<String>,
        contained_model_id: impl Into<String>,
    ) -> Self {
        Self {
            data_model_name: data_model_name.into(),
            model_id: Some(model_id.into()),
            contained_model_id: Some(contained_model_id.into()),
            field_id: None,
            model_type: None,
        }
    }

    /// Attaches a field name, returning a connection addressing that field.
    pub fn with_field(mut self, field_id: impl Into<String>) -> Self {
        self.field_id = Some(field_id.into());
        self
    }

    /// Attaches a model-type hint used only for factory resolution.
    pub fn with_model_type(mut self, model_type: impl Into<String>) -> Self {
        self.model_type = Some(model_type.into());
        self
    }

    /// The derived connection type (§3).
    pub fn connection_type(&self) -> ConnectionType {
        if self.field_id.is_some() {
            ConnectionType::Field
        } else if self.contained_model_id.is_some() {
            ConnectionType::ContainedModel
        } else if self.model_id.is_some() {
            ConnectionType::Model
        } else {
            ConnectionType::DataModel
        }
    }

    /// Returns the sequence of connection infos from most specific to least
    /// specific, used by the registry's hierarchical fallback lookup (§4.F).
    pub fn fallback_chain(&self) -> Vec<ConnectionInfo> {
        let mut chain = Vec::new();
        chain.push(self.clone());
        if self.field_id.is_some() {
            let mut without_field = self.clone();
            without_field.field_id = None;
            chain.push(without_field);
        }
        if self.contained_model_id.is_some() {
            let mut without_contained = self.clone();
            without_contained.field_id = None;
            without_contained.contained_model_id = None;
            chain.push(without_contained);
        }
        if self.model_id.is_some() {
            chain.push(ConnectionInfo::for_data_model(self.data_model_name.clone()));
        }
        chain
    }
}

impl PartialEq for ConnectionInfo {
    fn eq(&self, other: &Self) -> bool {
        self.data_model_name == other.data_model_name
            && self.model_id == other.model_id
            && self.contained_model_id == other.contained_model_id
            && self.field_id == other.field_id
    }
}

impl Eq for ConnectionInfo {}

impl Hash for ConnectionInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.data_model_name.hash(state);
        self.model_id.hash(state);
        self.contained_model_id.hash(state);
        self.field_id.hash(state);
    }
}
