//! Marshalling between typed values and Lua values
//!
//! Outbound, every typed value becomes a plain Lua value: sequences become
//! tables tagged with the array metatable, records and maps become tables,
//! exact integers become Lua integers.
//!
//! Inbound is lossy. The Lua value is serialized to JSON, its type is
//! inferred from that rendering, and the JSON data is decoded against the
//! inferred type. Maps and records both come back as objects; lists, sets and
//! tuples all come back as tuples. Callers that expect a narrower type
//! convert the result.

use func_types::{implied_type, PathStep, Result, TypeError, TypedValue, Value};
use mlua::{Lua, LuaSerdeExt, Value as LuaValue};
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value as JsonValue;

/// Convert a typed value into a Lua value.
///
/// A null at the top level becomes `nil`; nulls nested in containers become
/// the `null` light userdata so sequences keep their length.
pub fn to_lua(lua: &Lua, value: &TypedValue) -> Result<LuaValue> {
    if value.is_null() {
        return Ok(LuaValue::Nil);
    }
    payload_to_lua(lua, value.value())
}

fn payload_to_lua(lua: &Lua, value: &Value) -> Result<LuaValue> {
    match value {
        Value::Null => Ok(LuaValue::NULL),
        Value::Bool(b) => Ok(LuaValue::Boolean(*b)),
        Value::Number(n) => {
            if n.fract().is_zero() {
                if let Some(i) = n.to_i64() {
                    return Ok(LuaValue::Integer(i));
                }
            }
            n.to_f64()
                .map(LuaValue::Number)
                .ok_or_else(|| TypeError::conversion(format!("number {} has no float form", n)))
        }
        Value::String(s) => lua
            .create_string(s)
            .map(LuaValue::String)
            .map_err(lua_failure),
        Value::List(items) | Value::Set(items) | Value::Tuple(items) => {
            let table = lua
                .create_table_with_capacity(items.len(), 0)
                .map_err(lua_failure)?;
            for (i, item) in items.iter().enumerate() {
                let converted = payload_to_lua(lua, item).map_err(|e| e.at(PathStep::Index(i)))?;
                table
                    .raw_set(i + 1, converted)
                    .map_err(|e| lua_failure(e).at(PathStep::Index(i)))?;
            }
            table
                .set_metatable(Some(lua.array_metatable()))
                .map_err(lua_failure)?;
            Ok(LuaValue::Table(table))
        }
        Value::Map(entries) | Value::Object(entries) => {
            let table = lua
                .create_table_with_capacity(0, entries.len())
                .map_err(lua_failure)?;
            for (key, item) in entries {
                let step = || PathStep::Key(key.clone());
                let converted = payload_to_lua(lua, item).map_err(|e| e.at(step()))?;
                table
                    .raw_set(key.as_str(), converted)
                    .map_err(|e| lua_failure(e).at(step()))?;
            }
            Ok(LuaValue::Table(table))
        }
        Value::Dynamic(inner) => payload_to_lua(lua, inner.value()),
    }
}

/// Convert a Lua value into a typed value.
///
/// `nil`, `null` and values JSON has no form for (functions, threads,
/// userdata) become a dynamic null.
pub fn from_lua(value: LuaValue) -> Result<TypedValue> {
    if matches!(
        value,
        LuaValue::Nil
            | LuaValue::LightUserData(_)
            | LuaValue::Function(_)
            | LuaValue::Thread(_)
            | LuaValue::Error(_)
    ) {
        return Ok(TypedValue::dynamic_null());
    }

    let json = serde_json::to_vec(&value.to_serializable().deny_unsupported_types(false))
        .map_err(|e| TypeError::conversion(format!("Lua value cannot be serialized: {}", e)))?;
    if json == b"null" {
        return Ok(TypedValue::dynamic_null());
    }

    let ty = implied_type(&json)?;
    let data: JsonValue =
        serde_json::from_slice(&json).map_err(|e| TypeError::TypeInference(e.to_string()))?;
    TypedValue::from_json(&data, &ty)
}

fn lua_failure(err: mlua::Error) -> TypeError {
    TypeError::conversion(err.to_string())
}
