//! Structural schema types
//!
//! A [`Type`] is a closed description of a value's shape. Equality is
//! structural: two `Map<string>` types are equal no matter how each was built.
//!
//! Types render back into the expression grammar understood by
//! [`parse_type`](crate::parse_type):
//!
//! ```text
//! boolean  number  string  any
//! T[]      Set<T>  Map<T>  [T, U]  { key: T; }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt;

/// Schema type of a function argument, return or nested value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Type {
    Bool,
    Number,
    String,
    /// Placeholder for values whose type is not known statically
    Dynamic,
    /// Ordered, homogeneous: `T[]`
    List { element: Box<Type> },
    /// Homogeneous, set semantics on the schema side only: `Set<T>`
    Set { element: Box<Type> },
    /// String-keyed, homogeneous: `Map<T>`
    Map { element: Box<Type> },
    /// Fixed-length, heterogeneous: `[T, U]`
    Tuple { elements: Vec<Type> },
    /// Named fields: `{ key: T; }`
    Object { fields: BTreeMap<String, Type> },
}

impl Type {
    pub fn list(element: Type) -> Self {
        Type::List {
            element: Box::new(element),
        }
    }

    pub fn set(element: Type) -> Self {
        Type::Set {
            element: Box::new(element),
        }
    }

    pub fn map(element: Type) -> Self {
        Type::Map {
            element: Box::new(element),
        }
    }

    pub fn tuple(elements: impl IntoIterator<Item = Type>) -> Self {
        Type::Tuple {
            elements: elements.into_iter().collect(),
        }
    }

    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, Type)>) -> Self {
        Type::Object {
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Type::Dynamic)
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Bool | Type::Number | Type::String)
    }

    /// Name of the variant, ignoring nested types.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Type::Bool => "bool",
            Type::Number => "number",
            Type::String => "string",
            Type::Dynamic => "dynamic",
            Type::List { .. } => "list",
            Type::Set { .. } => "set",
            Type::Map { .. } => "map",
            Type::Tuple { .. } => "tuple",
            Type::Object { .. } => "object",
        }
    }

    /// Element type of a homogeneous container
    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::List { element } | Type::Set { element } | Type::Map { element } => {
                Some(element)
            }
            _ => None,
        }
    }

    /// Render as JSON Schema
    pub fn to_json_schema(&self) -> JsonValue {
        match self {
            Type::Bool => json!({ "type": "boolean" }),
            Type::Number => json!({ "type": "number" }),
            Type::String => json!({ "type": "string" }),
            Type::Dynamic => json!({}),
            Type::List { element } => json!({
                "type": "array",
                "items": element.to_json_schema()
            }),
            Type::Set { element } => json!({
                "type": "array",
                "items": element.to_json_schema(),
                "uniqueItems": true
            }),
            Type::Map { element } => json!({
                "type": "object",
                "additionalProperties": element.to_json_schema()
            }),
            Type::Tuple { elements } => json!({
                "type": "array",
                "prefixItems": elements.iter().map(Type::to_json_schema).collect::<Vec<_>>(),
                "minItems": elements.len(),
                "maxItems": elements.len()
            }),
            Type::Object { fields } => {
                let properties: serde_json::Map<String, JsonValue> = fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json_schema()))
                    .collect();
                json!({
                    "type": "object",
                    "properties": properties,
                    "required": fields.keys().collect::<Vec<_>>(),
                    "additionalProperties": false
                })
            }
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => f.write_str("boolean"),
            Type::Number => f.write_str("number"),
            Type::String => f.write_str("string"),
            Type::Dynamic => f.write_str("any"),
            Type::List { element } => write!(f, "{}[]", element),
            Type::Set { element } => write!(f, "Set<{}>", element),
            Type::Map { element } => write!(f, "Map<{}>", element),
            Type::Tuple { elements } => {
                f.write_str("[")?;
                for (i, ty) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", ty)?;
                }
                f.write_str("]")
            }
            Type::Object { fields } if fields.is_empty() => f.write_str("{}"),
            Type::Object { fields } => {
                f.write_str("{ ")?;
                for (key, ty) in fields {
                    if is_identifier(key) {
                        write!(f, "{}: {}; ", key, ty)?;
                    } else {
                        write!(f, "\"{}\": {}; ", key, ty)?;
                    }
                }
                f.write_str("}")
            }
        }
    }
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
