//! Typed values
//!
//! A [`Value`] payload does not describe itself: a list and a set with the
//! same items have the same shape. It is always paired with a [`Type`] inside
//! a [`TypedValue`], whose constructors check that the two agree.

use crate::error::{PathStep, Result, TypeError};
use crate::implied::implied_type_of;
use crate::types::Type;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Payload of a typed value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value; admitted by every type
    Null,
    Bool(bool),
    Number(Decimal),
    String(String),
    List(Vec<Value>),
    Set(Vec<Value>),
    Tuple(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Object(BTreeMap<String, Value>),
    /// A value whose static type is unknown, carrying its own type
    Dynamic(Box<TypedValue>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Items of a list, set or tuple
    pub fn as_items(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Set(items) | Value::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Entries of a map or object
    pub fn as_entries(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(entries) | Value::Object(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Tuple(_) => "tuple",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
            Value::Dynamic(_) => "dynamic",
        }
    }
}

impl Type {
    /// Verify that `value` is a valid payload for this type.
    ///
    /// The error names the first mismatching element.
    pub fn check(&self, value: &Value) -> Result<()> {
        match (self, value) {
            (_, Value::Null) => Ok(()),
            (Type::Bool, Value::Bool(_))
            | (Type::Number, Value::Number(_))
            | (Type::String, Value::String(_)) => Ok(()),
            (Type::Dynamic, Value::Dynamic(inner)) => {
                if inner.ty.is_dynamic() {
                    return Err(TypeError::conversion("dynamic value wraps another dynamic value"));
                }
                inner.ty.check(&inner.value)
            }
            (Type::List { element }, Value::List(items))
            | (Type::Set { element }, Value::Set(items)) => {
                for (i, item) in items.iter().enumerate() {
                    element.check(item).map_err(|e| e.at(PathStep::Index(i)))?;
                }
                Ok(())
            }
            (Type::Map { element }, Value::Map(entries)) => {
                for (key, item) in entries {
                    element
                        .check(item)
                        .map_err(|e| e.at(PathStep::Key(key.clone())))?;
                }
                Ok(())
            }
            (Type::Tuple { elements }, Value::Tuple(items)) => {
                if elements.len() != items.len() {
                    return Err(TypeError::conversion(format!(
                        "tuple of {} elements given {} values",
                        elements.len(),
                        items.len()
                    )));
                }
                for (i, (ty, item)) in elements.iter().zip(items).enumerate() {
                    ty.check(item).map_err(|e| e.at(PathStep::Index(i)))?;
                }
                Ok(())
            }
            (Type::Object { fields }, Value::Object(entries)) => {
                check_same_keys(fields, entries)?;
                for (key, ty) in fields {
                    if let Some(item) = entries.get(key) {
                        ty.check(item).map_err(|e| e.at(PathStep::Key(key.clone())))?;
                    }
                }
                Ok(())
            }
            (ty, value) => Err(TypeError::conversion(format!(
                "expected {}, found {} payload",
                ty,
                value.kind_name()
            ))),
        }
    }
}

fn check_same_keys<A, B>(fields: &BTreeMap<String, A>, entries: &BTreeMap<String, B>) -> Result<()> {
    if let Some(missing) = fields.keys().find(|k| !entries.contains_key(*k)) {
        return Err(TypeError::conversion(format!("missing field '{}'", missing)));
    }
    if let Some(extra) = entries.keys().find(|k| !fields.contains_key(*k)) {
        return Err(TypeError::conversion(format!("unexpected field '{}'", extra)));
    }
    Ok(())
}

/// A payload paired with its schema type
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    ty: Type,
    value: Value,
}

impl TypedValue {
    /// Pair a payload with a type, verifying that they agree.
    pub fn new(ty: Type, value: Value) -> Result<Self> {
        ty.check(&value)?;
        Ok(Self { ty, value })
    }

    pub(crate) fn new_unchecked(ty: Type, value: Value) -> Self {
        Self { ty, value }
    }

    /// The null value of `ty`
    pub fn null(ty: Type) -> Self {
        Self {
            ty,
            value: Value::Null,
        }
    }

    pub fn dynamic_null() -> Self {
        Self::null(Type::Dynamic)
    }

    pub fn bool(b: bool) -> Self {
        Self {
            ty: Type::Bool,
            value: Value::Bool(b),
        }
    }

    pub fn number(n: impl Into<Decimal>) -> Self {
        Self {
            ty: Type::Number,
            value: Value::Number(n.into()),
        }
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self {
            ty: Type::String,
            value: Value::String(s.into()),
        }
    }

    /// Wrap a value as [`Type::Dynamic`].
    ///
    /// Null and already dynamic values are not wrapped again.
    pub fn dynamic(inner: TypedValue) -> Self {
        if inner.ty.is_dynamic() {
            return inner;
        }
        if inner.value.is_null() {
            return Self::dynamic_null();
        }
        Self {
            ty: Type::Dynamic,
            value: Value::Dynamic(Box::new(inner)),
        }
    }

    /// Build a list whose items all have type `element`.
    pub fn list(element: Type, items: impl IntoIterator<Item = TypedValue>) -> Result<Self> {
        let items = collect_items(&element, items)?;
        Ok(Self {
            ty: Type::list(element),
            value: Value::List(items),
        })
    }

    /// Build a set whose items all have type `element`.
    pub fn set(element: Type, items: impl IntoIterator<Item = TypedValue>) -> Result<Self> {
        let items = collect_items(&element, items)?;
        Ok(Self {
            ty: Type::set(element),
            value: Value::Set(items),
        })
    }

    /// Build a map whose values all have type `element`.
    pub fn map<K: Into<String>>(
        element: Type,
        entries: impl IntoIterator<Item = (K, TypedValue)>,
    ) -> Result<Self> {
        let mut map = BTreeMap::new();
        for (key, item) in entries {
            let key = key.into();
            let payload = payload_as(item, &element).map_err(|e| e.at(PathStep::Key(key.clone())))?;
            map.insert(key, payload);
        }
        Ok(Self {
            ty: Type::map(element),
            value: Value::Map(map),
        })
    }

    /// Build a tuple typed by its items.
    pub fn tuple(items: impl IntoIterator<Item = TypedValue>) -> Self {
        let (types, values): (Vec<_>, Vec<_>) = items.into_iter().map(Self::into_parts).unzip();
        Self {
            ty: Type::Tuple { elements: types },
            value: Value::Tuple(values),
        }
    }

    /// Build an object typed by its fields.
    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, TypedValue)>) -> Self {
        let mut types = BTreeMap::new();
        let mut values = BTreeMap::new();
        for (key, item) in fields {
            let key = key.into();
            let (ty, value) = item.into_parts();
            types.insert(key.clone(), ty);
            values.insert(key, value);
        }
        Self {
            ty: Type::Object { fields: types },
            value: Value::Object(values),
        }
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_parts(self) -> (Type, Value) {
        (self.ty, self.value)
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    /// Decode JSON data as a value of type `ty`.
    ///
    /// `Dynamic` targets take the implied type of the data.
    pub fn from_json(json: &JsonValue, ty: &Type) -> Result<Self> {
        let value = match (ty, json) {
            (_, JsonValue::Null) => Value::Null,
            (Type::Dynamic, json) => {
                let implied = implied_type_of(json);
                return Ok(Self::dynamic(Self::from_json(json, &implied)?));
            }
            (Type::Bool, JsonValue::Bool(b)) => Value::Bool(*b),
            (Type::Number, JsonValue::Number(n)) => Value::Number(decimal_from_json(n)?),
            (Type::String, JsonValue::String(s)) => Value::String(s.clone()),
            (Type::List { element }, JsonValue::Array(items)) => {
                Value::List(decode_items(items, |_| element.as_ref())?)
            }
            (Type::Set { element }, JsonValue::Array(items)) => {
                Value::Set(decode_items(items, |_| element.as_ref())?)
            }
            (Type::Tuple { elements }, JsonValue::Array(items)) => {
                if elements.len() != items.len() {
                    return Err(TypeError::conversion(format!(
                        "tuple of {} elements given {} values",
                        elements.len(),
                        items.len()
                    )));
                }
                Value::Tuple(decode_items(items, |i| &elements[i])?)
            }
            (Type::Map { element }, JsonValue::Object(entries)) => {
                let mut map = BTreeMap::new();
                for (key, item) in entries {
                    let decoded = Self::from_json(item, element)
                        .map_err(|e| e.at(PathStep::Key(key.clone())))?;
                    map.insert(key.clone(), decoded.value);
                }
                Value::Map(map)
            }
            (Type::Object { fields }, JsonValue::Object(entries)) => {
                if let Some(missing) = fields.keys().find(|k| !entries.contains_key(*k)) {
                    return Err(TypeError::conversion(format!("missing field '{}'", missing)));
                }
                let mut map = BTreeMap::new();
                for (key, item) in entries {
                    let Some(field_ty) = fields.get(key) else {
                        return Err(TypeError::conversion(format!("unexpected field '{}'", key)));
                    };
                    let decoded = Self::from_json(item, field_ty)
                        .map_err(|e| e.at(PathStep::Key(key.clone())))?;
                    map.insert(key.clone(), decoded.value);
                }
                Value::Object(map)
            }
            (ty, json) => {
                return Err(TypeError::conversion(format!(
                    "expected {}, found JSON {}",
                    ty,
                    json_kind(json)
                )))
            }
        };
        Ok(Self::new_unchecked(ty.clone(), value))
    }

    /// Render as JSON data.
    ///
    /// Exact integers become JSON integers and sets become arrays.
    pub fn to_json(&self) -> JsonValue {
        value_to_json(&self.value)
    }
}

fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Number(n) => decimal_to_json(n),
        Value::String(s) => JsonValue::String(s.clone()),
        Value::List(items) | Value::Set(items) | Value::Tuple(items) => {
            JsonValue::Array(items.iter().map(value_to_json).collect())
        }
        Value::Map(entries) | Value::Object(entries) => JsonValue::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
        Value::Dynamic(inner) => inner.to_json(),
    }
}

fn decimal_to_json(n: &Decimal) -> JsonValue {
    if is_exact_integer(n) {
        if let Some(i) = n.to_i64() {
            return JsonValue::from(i);
        }
        if let Some(u) = n.to_u64() {
            return JsonValue::from(u);
        }
    }
    n.to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

pub(crate) fn is_exact_integer(n: &Decimal) -> bool {
    n.fract().is_zero()
}

/// Read a JSON number without going through a float when it is an integer.
///
/// Fractions finer than [`MAX_SCALE`] digits round to the nearest
/// representable value. Only magnitudes beyond `Decimal::MAX` fail.
pub(crate) fn decimal_from_json(n: &serde_json::Number) -> Result<Decimal> {
    if let Some(i) = n.as_i64() {
        return Ok(Decimal::from(i));
    }
    if let Some(u) = n.as_u64() {
        return Ok(Decimal::from(u));
    }
    let text = n.to_string();
    if let Some(d) = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
        .or_else(|| round_to_max_scale(&text))
    {
        return Ok(d);
    }

    let too_large = n
        .as_f64()
        .zip(Decimal::MAX.to_f64())
        .is_some_and(|(f, max)| f.abs() > max);
    if too_large {
        Err(TypeError::conversion(format!("number {} is out of range", text)))
    } else {
        Err(TypeError::conversion(format!("number {} has no decimal form", text)))
    }
}

/// Decimal places a number can carry.
const MAX_SCALE: u32 = 28;

/// Round `[-]digits[.digits][e[-]exp]` to `MAX_SCALE` decimal places.
///
/// Returns `None` unless the text needs more places than that.
fn round_to_max_scale(text: &str) -> Option<Decimal> {
    let (mantissa, exponent) = text.split_once(['e', 'E']).unwrap_or((text, "0"));
    let exponent: i64 = exponent.parse().ok()?;
    let negative = mantissa.starts_with('-');
    let mantissa = mantissa.trim_start_matches(['-', '+']);
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));

    let mut units: i128 = format!("{whole}{fraction}").parse().ok()?;
    let scale = fraction.len() as i64 - exponent;
    let excess = scale - i64::from(MAX_SCALE);
    if excess <= 0 {
        return None;
    }

    // 10^38 is the largest power of ten an i128 holds
    if excess > 38 {
        units = 0;
    } else {
        let divisor = 10i128.pow(excess as u32);
        let (quotient, remainder) = (units / divisor, units % divisor);
        units = quotient + i128::from(remainder >= divisor - remainder);
    }
    if negative {
        units = -units;
    }
    Decimal::try_from_i128_with_scale(units, MAX_SCALE)
        .ok()
        .map(|d| d.normalize())
}

fn decode_items<'t>(
    items: &[JsonValue],
    element: impl Fn(usize) -> &'t Type,
) -> Result<Vec<Value>> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            TypedValue::from_json(item, element(i))
                .map(|decoded| decoded.value)
                .map_err(|e| e.at(PathStep::Index(i)))
        })
        .collect()
}

fn collect_items(
    element: &Type,
    items: impl IntoIterator<Item = TypedValue>,
) -> Result<Vec<Value>> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| payload_as(item, element).map_err(|e| e.at(PathStep::Index(i))))
        .collect()
}

/// Payload of `item` for a container slot of type `ty`.
fn payload_as(item: TypedValue, ty: &Type) -> Result<Value> {
    if item.ty == *ty || item.is_null() {
        return Ok(item.value);
    }
    if ty.is_dynamic() {
        return Ok(TypedValue::dynamic(item).value);
    }
    Err(TypeError::conversion(format!(
        "expected {}, found {}",
        ty, item.ty
    )))
}

fn json_kind(json: &JsonValue) -> &'static str {
    match json {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
