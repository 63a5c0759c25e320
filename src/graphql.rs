// Copyright 2026 Modelmesh Contributors.

//! Read-only GraphQL schema generated from the data model's type graph (§4.J).
//!
//! Each top-level type gets a list query returning its entities. Because the
//! data model is dynamically typed at runtime rather than described by a
//! static schema, generated object types expose `id` plus the entity's raw
//! JSON under `json`; recursing into nested identifiable sub-attributes as
//! their own typed fields is left for a schema-aware follow-up. Per entity,
//! the list resolver also checks the persistence registry for a connection
//! registered at that entity's [`ConnectionInfo`] and overlays its current
//! value, the same way the REST layer does (§2).

use async_graphql::dynamic::{Field, FieldFuture, FieldValue, Object, Schema, SchemaError, TypeRef};
use async_graphql::Value as GqlValue;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::connection_info::ConnectionInfo;
use crate::connector::Provider;
use crate::model::DataModel;
use crate::registry::PersistenceRegistry;

/// Builds a dynamic, query-only GraphQL schema with one list field per
/// entry in `type_names`, resolving each entity through `registry` where a
/// persistence connection is registered for it.
pub fn build_schema(
    data_model: Arc<RwLock<DataModel>>,
    registry: Arc<PersistenceRegistry>,
    type_names: &[String],
) -> Result<Schema, SchemaError> {
    let mut builder = Schema::build("Query", None, None);
    let mut query = Object::new("Query");

    for type_name in type_names {
        builder = builder.register(entity_object_type(type_name));

        let dm = data_model.clone();
        let registry = registry.clone();
        let target_type = type_name.clone();
        query = query.field(Field::new(
            list_field_name(type_name),
            TypeRef::named_nn_list_nn(type_name.clone()),
            move |_ctx| {
                let dm = dm.clone();
                let registry = registry.clone();
                let target_type = target_type.clone();
                FieldFuture::new(async move {
                    let data_model = dm.read().await;
                    let dm_name = data_model.name().to_string();
                    let top_level = data_model.get_top_level_models();
                    let mut values = Vec::new();
                    for id in data_model.get_models_of_type_name(&target_type) {
                        let Some(entity) = data_model.get_model(&id) else { continue };
                        let mut value = entity.read().expect("entity lock poisoned").clone();
                        let ci = if top_level.iter().any(|t| t == &id) {
                            ConnectionInfo::for_model(dm_name.clone(), id.clone())
                        } else {
                            let ancestor = data_model
                                .get_referencing_models(&id)
                                .into_iter()
                                .find(|r| top_level.iter().any(|t| t == r));
                            match ancestor {
                                Some(top) => ConnectionInfo::for_contained_model(dm_name.clone(), top, id.clone()),
                                None => ConnectionInfo::for_model(dm_name.clone(), id.clone()),
                            }
                        };
                        if let Ok(connector) = registry.get_connection(&ci).await {
                            if let Ok(Value::Object(synced)) = connector.provide().await {
                                if let Value::Object(map) = &mut value {
                                    for (k, v) in synced {
                                        map.insert(k, v);
                                    }
                                }
                            }
                        }
                        values.push(FieldValue::owned_any(value));
                    }
                    Ok(Some(FieldValue::list(values)))
                })
            },
        ));
    }

    builder.register(query).finish()
}

/// An object type resolving `id` and `json` from the [`Value`] stashed in
/// the parent [`FieldValue`] by the enclosing list resolver.
fn entity_object_type(type_name: &str) -> Object {
    Object::new(type_name)
        .field(Field::new("id", TypeRef::named(TypeRef::STRING), |ctx| {
            FieldFuture::new(async move {
                let entity = ctx.parent_value.try_downcast_ref::<Value>()?;
                let id = string_field(entity, "id").or_else(|| string_field(entity, "id_short"));
                Ok(id.map(|s| FieldValue::value(GqlValue::String(s))))
            })
        }))
        .field(Field::new("json", TypeRef::named(TypeRef::STRING), |ctx| {
            FieldFuture::new(async move {
                let entity = ctx.parent_value.try_downcast_ref::<Value>()?;
                let json = serde_json::to_string(entity).unwrap_or_default();
                Ok(Some(FieldValue::value(GqlValue::String(json))))
            })
        }))
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_string)
}

fn list_field_name(type_name: &str) -> String {
    let mut snake = String::new();
    for (i, ch) in type_name.char_indices() {
        if ch.is_uppercase() && i != 0 {
            snake.push('_');
        }
        snake.push(ch.to_ascii_lowercase());
    }
    format!("{snake}s")
}
