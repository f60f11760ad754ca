//! Type coercion engine
//!
//! [`convert`] turns a value of one type into an equivalent value of another,
//! dispatching on the source type. Conversions widen freely into `string` but
//! never parse strings back into numbers or booleans.

use crate::error::{PathStep, Result, TypeError};
use crate::types::Type;
use crate::value::{is_exact_integer, TypedValue, Value};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::debug;

/// Fractional digits considered when deciding whether a non-integer number is
/// zero for a number to boolean conversion.
///
/// A fractional number converts to `false` only when it rounds to zero at
/// this many decimal places. Exact integers are `false` only when they are 0.
pub const EFFECTIVE_ZERO_DIGITS: u32 = 15;

/// Convert `value` into a value of type `target`.
///
/// Null payloads convert to the null value of the target wherever the pair
/// of types has a rule. A map converted into an object keeps the map's own
/// keys as fields; when those keys are exactly the target's fields the
/// result has the target type.
pub fn convert(value: TypedValue, target: &Type) -> Result<TypedValue> {
    if value.ty() == target {
        return Ok(value);
    }
    if target.is_dynamic() {
        return Ok(TypedValue::dynamic(value));
    }

    let (source, payload) = value.into_parts();
    let converted = match (&source, target) {
        (Type::Dynamic, _) => return from_dynamic(payload, target),

        (Type::Bool, Type::Number) => primitive(payload, &source, |v| {
            v.as_bool()
                .map(|b| Value::Number(if b { Decimal::ONE } else { Decimal::ZERO }))
        })?,
        (Type::Bool, Type::String) => primitive(payload, &source, |v| {
            v.as_bool().map(|b| Value::String(b.to_string()))
        })?,
        (Type::Number, Type::Bool) => primitive(payload, &source, |v| {
            v.as_number().map(|n| Value::Bool(!is_effectively_zero(&n)))
        })?,
        (Type::Number, Type::String) => primitive(payload, &source, |v| {
            v.as_number().map(|n| Value::String(n.normalize().to_string()))
        })?,

        (Type::Tuple { elements }, Type::List { element } | Type::Set { element }) => {
            let common = match common_type(elements.iter()) {
                Some(common) => {
                    common.map_err(|reason| TypeError::incompatible(&source, target, reason))?
                }
                None => element.as_ref(),
            };
            match sequence(payload, &source)? {
                None => Value::Null,
                Some(items) => {
                    let items = convert_items(items, |_| common, |_| element.as_ref())?;
                    if matches!(target, Type::Set { .. }) {
                        Value::Set(items)
                    } else {
                        Value::List(items)
                    }
                }
            }
        }
        (Type::Tuple { elements: from }, Type::Tuple { elements: to }) => {
            if from.len() != to.len() {
                return Err(TypeError::incompatible(
                    &source,
                    target,
                    format!("tuple arity {} differs from {}", from.len(), to.len()),
                ));
            }
            match sequence(payload, &source)? {
                None => Value::Null,
                Some(items) => Value::Tuple(convert_items(items, |i| &from[i], |i| &to[i])?),
            }
        }
        (Type::List { element } | Type::Set { element }, Type::Tuple { elements }) => {
            return sequence_to_tuple(element, payload, elements, target, &source)
        }
        (Type::List { element: from } | Type::Set { element: from }, Type::List { element: to }) => {
            match sequence(payload, &source)? {
                None => Value::Null,
                Some(items) => Value::List(convert_items(items, |_| from.as_ref(), |_| to.as_ref())?),
            }
        }
        (Type::Set { element: from }, Type::Set { element: to }) => {
            match sequence(payload, &source)? {
                None => Value::Null,
                Some(items) => Value::Set(convert_items(items, |_| from.as_ref(), |_| to.as_ref())?),
            }
        }

        (Type::Object { fields: from }, Type::Object { fields: to }) => {
            if !from.keys().eq(to.keys()) {
                return Err(TypeError::incompatible(
                    &source,
                    target,
                    "object fields differ",
                ));
            }
            match entries(payload, &source)? {
                None => Value::Null,
                Some(entries) => Value::Object(convert_entries(entries, |k| from.get(k), |k| to.get(k))?),
            }
        }
        (Type::Object { fields }, Type::Map { element }) => {
            let common = match common_type(fields.values()) {
                Some(common) => {
                    common.map_err(|reason| TypeError::incompatible(&source, target, reason))?
                }
                None => element.as_ref(),
            };
            match entries(payload, &source)? {
                None => Value::Null,
                Some(entries) => {
                    Value::Map(convert_entries(entries, |_| Some(common), |_| Some(element.as_ref()))?)
                }
            }
        }
        (Type::Map { element: from }, Type::Map { element: to }) => match entries(payload, &source)? {
            None => Value::Null,
            Some(entries) => {
                Value::Map(convert_entries(entries, |_| Some(from.as_ref()), |_| Some(to.as_ref()))?)
            }
        },
        (Type::Map { element }, Type::Object { fields }) => {
            return map_to_object(element, payload, fields, target)
        }
        // Empty Lua tables come back as empty objects
        (Type::Object { fields }, Type::List { .. } | Type::Set { .. } | Type::Tuple { .. })
            if fields.is_empty() =>
        {
            match entries(payload, &source)? {
                None => Value::Null,
                Some(entries) if entries.is_empty() => match target {
                    Type::Tuple { elements } if !elements.is_empty() => {
                        return Err(TypeError::incompatible(
                            &source,
                            target,
                            format!("an empty table does not fit {} elements", elements.len()),
                        ))
                    }
                    Type::Tuple { .. } => Value::Tuple(Vec::new()),
                    Type::Set { .. } => Value::Set(Vec::new()),
                    _ => Value::List(Vec::new()),
                },
                Some(_) => {
                    return Err(TypeError::conversion(
                        "object payload has entries its type does not declare",
                    ))
                }
            }
        }

        _ => {
            return Err(TypeError::incompatible(
                &source,
                target,
                "no conversion rule applies",
            ))
        }
    };

    Ok(TypedValue::new_unchecked(target.clone(), converted))
}

fn is_effectively_zero(n: &Decimal) -> bool {
    if is_exact_integer(n) {
        n.is_zero()
    } else {
        n.round_dp(EFFECTIVE_ZERO_DIGITS).is_zero()
    }
}

fn from_dynamic(payload: Value, target: &Type) -> Result<TypedValue> {
    match payload {
        Value::Null => Ok(TypedValue::null(target.clone())),
        Value::Dynamic(inner) => convert(*inner, target),
        other => Err(TypeError::conversion(format!(
            "dynamic value holds an untyped {} payload",
            other.kind_name()
        ))),
    }
}

fn map_to_object(
    element: &Type,
    payload: Value,
    fields: &BTreeMap<String, Type>,
    target: &Type,
) -> Result<TypedValue> {
    let source = Type::map(element.clone());
    let Some(entries) = entries(payload, &source)? else {
        return Ok(TypedValue::null(target.clone()));
    };

    let derived = Type::Object {
        fields: entries
            .keys()
            .map(|k| (k.clone(), element.clone()))
            .collect(),
    };
    let keys_match = entries.keys().eq(fields.keys());
    let value = TypedValue::new_unchecked(derived, Value::Object(entries));

    if keys_match {
        convert(value, target)
    } else {
        debug!(
            derived = %value.ty(),
            target = %target,
            "map keys differ from object fields, keeping derived shape"
        );
        Ok(value)
    }
}

/// A list or set of `n` items becomes a tuple of `n` elements.
///
/// When `n` matches the target arity each item is converted to its slot;
/// otherwise the items keep the source element type.
fn sequence_to_tuple(
    element: &Type,
    payload: Value,
    elements: &[Type],
    target: &Type,
    source: &Type,
) -> Result<TypedValue> {
    let Some(items) = sequence(payload, source)? else {
        return Ok(TypedValue::null(target.clone()));
    };

    if items.len() == elements.len() {
        let items = convert_items(items, |_| element, |i| &elements[i])?;
        return Ok(TypedValue::new_unchecked(target.clone(), Value::Tuple(items)));
    }

    let derived = Type::tuple(std::iter::repeat(element.clone()).take(items.len()));
    debug!(
        derived = %derived,
        target = %target,
        "sequence length differs from tuple arity, keeping derived shape"
    );
    Ok(TypedValue::new_unchecked(derived, Value::Tuple(items)))
}

/// The single type shared by every element, if there are any elements.
fn common_type<'a>(
    mut types: impl Iterator<Item = &'a Type>,
) -> Option<std::result::Result<&'a Type, String>> {
    let first = types.next()?;
    Some(match types.find(|ty| *ty != first) {
        None => Ok(first),
        Some(other) => Err(format!("elements mix {} and {}", first, other)),
    })
}

fn primitive(
    payload: Value,
    source: &Type,
    f: impl FnOnce(&Value) -> Option<Value>,
) -> Result<Value> {
    match payload {
        Value::Null => Ok(Value::Null),
        other => f(&other).ok_or_else(|| mismatched(source, &other)),
    }
}

fn sequence(payload: Value, source: &Type) -> Result<Option<Vec<Value>>> {
    match payload {
        Value::Null => Ok(None),
        Value::List(items) | Value::Set(items) | Value::Tuple(items) => Ok(Some(items)),
        other => Err(mismatched(source, &other)),
    }
}

fn entries(payload: Value, source: &Type) -> Result<Option<BTreeMap<String, Value>>> {
    match payload {
        Value::Null => Ok(None),
        Value::Map(entries) | Value::Object(entries) => Ok(Some(entries)),
        other => Err(mismatched(source, &other)),
    }
}

fn mismatched(source: &Type, payload: &Value) -> TypeError {
    TypeError::conversion(format!(
        "{} payload does not match type {}",
        payload.kind_name(),
        source
    ))
}

fn convert_items<'a>(
    items: Vec<Value>,
    from: impl Fn(usize) -> &'a Type,
    to: impl Fn(usize) -> &'a Type,
) -> Result<Vec<Value>> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| convert_slot(from(i), item, to(i)).map_err(|e| e.at(PathStep::Index(i))))
        .collect()
}

fn convert_entries<'a>(
    entries: BTreeMap<String, Value>,
    from: impl Fn(&str) -> Option<&'a Type>,
    to: impl Fn(&str) -> Option<&'a Type>,
) -> Result<BTreeMap<String, Value>> {
    entries
        .into_iter()
        .map(|(key, item)| {
            let (Some(from), Some(to)) = (from(&key), to(&key)) else {
                return Err(TypeError::conversion("unexpected field").at(PathStep::Key(key)));
            };
            let converted =
                convert_slot(from, item, to).map_err(|e| e.at(PathStep::Key(key.clone())))?;
            Ok((key, converted))
        })
        .collect()
}

/// Convert a nested payload, which must end up with exactly the slot type.
fn convert_slot(from: &Type, payload: Value, to: &Type) -> Result<Value> {
    let converted = convert(TypedValue::new_unchecked(from.clone(), payload), to)?;
    if converted.ty() != to {
        return Err(TypeError::incompatible(
            converted.ty(),
            to,
            "map keys do not match the object fields",
        ));
    }
    Ok(converted.into_parts().1)
}
