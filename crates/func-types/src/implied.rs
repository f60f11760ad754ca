//! Implied type inference
//!
//! Derives a [`Type`] from the JSON rendering of a value in one forward pass
//! over the token stream. Arrays become tuples and objects become records;
//! `null` is the universal "unknown" placeholder and becomes
//! [`Type::Dynamic`].

use crate::error::{Result, TypeError};
use crate::types::Type;
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

/// Infer the type of a JSON document.
///
/// Trailing data after the top-level value is an error.
pub fn implied_type(json: &[u8]) -> Result<Type> {
    let mut de = serde_json::Deserializer::from_slice(json);
    let ImpliedType(ty) =
        ImpliedType::deserialize(&mut de).map_err(|e| TypeError::TypeInference(e.to_string()))?;
    de.end()
        .map_err(|e| TypeError::TypeInference(e.to_string()))?;
    Ok(ty)
}

/// Infer the type of an already decoded JSON value.
pub fn implied_type_of(value: &JsonValue) -> Type {
    match value {
        JsonValue::Null => Type::Dynamic,
        JsonValue::Bool(_) => Type::Bool,
        JsonValue::Number(_) => Type::Number,
        JsonValue::String(_) => Type::String,
        JsonValue::Array(items) => Type::tuple(items.iter().map(implied_type_of)),
        JsonValue::Object(map) => Type::Object {
            fields: map
                .iter()
                .map(|(k, v)| (k.clone(), implied_type_of(v)))
                .collect(),
        },
    }
}

struct ImpliedType(Type);

impl<'de> Deserialize<'de> for ImpliedType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ImpliedVisitor)
    }
}

struct ImpliedVisitor;

impl<'de> Visitor<'de> for ImpliedVisitor {
    type Value = ImpliedType;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON value")
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> std::result::Result<Self::Value, E> {
        Ok(ImpliedType(Type::Bool))
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> std::result::Result<Self::Value, E> {
        Ok(ImpliedType(Type::Number))
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> std::result::Result<Self::Value, E> {
        Ok(ImpliedType(Type::Number))
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> std::result::Result<Self::Value, E> {
        Ok(ImpliedType(Type::Number))
    }

    fn visit_str<E: de::Error>(self, _: &str) -> std::result::Result<Self::Value, E> {
        Ok(ImpliedType(Type::String))
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
        Ok(ImpliedType(Type::Dynamic))
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
        Ok(ImpliedType(Type::Dynamic))
    }

    fn visit_some<D>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        ImpliedType::deserialize(deserializer)
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut elements = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(ImpliedType(ty)) = seq.next_element()? {
            elements.push(ty);
        }
        Ok(ImpliedType(Type::Tuple { elements }))
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut fields = BTreeMap::new();
        while let Some((key, ImpliedType(ty))) = map.next_entry::<String, ImpliedType>()? {
            fields.insert(key, ty);
        }
        Ok(ImpliedType(Type::Object { fields }))
    }
}
