// Copyright 2026 Modelmesh Contributors.

//! Schema mappers and wire formatters, and their composition into the
//! to-persistence / from-persistence pipelines (§4.E).

use serde_json::Value;

use crate::error::MiddlewareResult;

/// A pure, schema-changing transform from one JSON shape to another.
pub trait Mapper: Send + Sync {
    /// Maps a value from the source shape to the target shape.
    fn map(&self, source: &Value) -> MiddlewareResult<Value>;
}

/// Serializes a domain value to a wire representation and back.
///
/// Implementations must round-trip: `deserialize(serialize(v)) == v` for
/// every `v` the formatter accepts.
pub trait Formatter: Send + Sync {
    /// Serializes `domain` to wire bytes.
    fn serialize(&self, domain: &Value) -> MiddlewareResult<Vec<u8>>;
    /// Deserializes wire bytes back into a domain value.
    fn deserialize(&self, bytes: &[u8]) -> MiddlewareResult<Value>;
}

/// Default wire formatter: `serde_json` in, `serde_json` out.
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn serialize(&self, domain: &Value) -> MiddlewareResult<Vec<u8>> {
        Ok(serde_json::to_vec(domain)?)
    }

    fn deserialize(&self, bytes: &[u8]) -> MiddlewareResult<Value> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Identity mapper, used where no shape change is needed but a `Mapper` is
/// required by an API.
#[derive(Debug, Clone, Default)]
pub struct IdentityMapper;

impl Mapper for IdentityMapper {
    fn map(&self, source: &Value) -> MiddlewareResult<Value> {
        Ok(source.clone())
    }
}

/// Prepares a value for a write into persistence: deserialize the wire
/// bytes first (if a formatter is given), then apply the external mapper.
pub fn to_persistence(
    value: &Value,
    external_mapper: Option<&dyn Mapper>,
    formatter: Option<(&dyn Formatter, &[u8])>,
) -> MiddlewareResult<Value> {
    let staged = match formatter {
        Some((fmt, bytes)) => fmt.deserialize(bytes)?,
        None => value.clone(),
    };
    match external_mapper {
        Some(mapper) => mapper.map(&staged),
        None => Ok(staged),
    }
}

/// Prepares a value read from persistence for delivery to a connector: map
/// first, then serialize through the formatter (if given).
pub fn from_persistence(
    value: &Value,
    persistence_mapper: Option<&dyn Mapper>,
    formatter: Option<&dyn Formatter>,
) -> MiddlewareResult<Value> {
    let mapped = match persistence_mapper {
        Some(mapper) => mapper.map(value)?,
        None => value.clone(),
    };
    match formatter {
        Some(fmt) => {
            let bytes = fmt.serialize(&mapped)?;
            fmt.deserialize(&bytes)
        }
        None => Ok(mapped),
    }
}
