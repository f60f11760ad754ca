//! Integration tests for loading Lua sources and calling typed functions

use func_lua::{load_library, FuncConfig, FuncError, FunctionRegistry};
use func_types::{convert, Decimal, Type, TypedValue};
use serde_json::json;
use tempfile::TempDir;
use tokio::fs;

fn registry_with(name: &str, source: &str) -> FunctionRegistry {
    let registry = FunctionRegistry::new(FuncConfig::default());
    let report = registry.load_source(name, source).unwrap();
    assert!(report.warnings.is_empty(), "unexpected warnings: {:?}", report.warnings);
    registry
}

// ============================================================================
// END TO END CALLS
// ============================================================================

#[test]
fn test_documented_add() {
    let registry = registry_with(
        "math.lua",
        r#"
--- Add two numbers
-- @param a number The left operand
-- @param b number The right operand
-- @return number The sum
local function add(a, b)
    return a + b
end

func.export(add)
"#,
    );

    let add = registry.get("add").unwrap();
    let names: Vec<_> = add.arguments().iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(add.arguments()[0].description, "The left operand");

    let sum = add
        .invoke(vec![TypedValue::number(100), TypedValue::number(100)])
        .unwrap();
    assert_eq!(sum.ty(), &Type::Number);
    assert_eq!(sum.value().as_number(), Some(Decimal::from(200)));

    assert_eq!(
        convert(sum.clone(), &Type::String).unwrap(),
        TypedValue::string("200")
    );
    assert_eq!(convert(sum, &Type::Bool).unwrap(), TypedValue::bool(true));
}

#[test]
fn test_arguments_are_coerced_to_declared_types() {
    let registry = registry_with(
        "text.lua",
        r#"
--- Repeat a string
-- @param {string} s - The text
-- @param {number} n - How often
-- @returns {string}
function rep(s, n)
    return string.rep(s, n)
end
func.export(rep)
"#,
    );

    // The number 7 is passed as the string "7"
    let result = registry
        .invoke("rep", vec![TypedValue::number(7), TypedValue::number(3)])
        .unwrap();
    assert_eq!(result, TypedValue::string("777"));

    let err = registry
        .invoke("rep", vec![TypedValue::bool(true)])
        .unwrap_err();
    assert!(matches!(err, FuncError::Arity { expected: 2, got: 1, .. }));
}

#[test]
fn test_object_return_is_exact() {
    let registry = registry_with(
        "people.lua",
        r#"
--- Build a person
-- @return { name: string; age: number }
local function person()
    return { name = "Bob", age = 35 }
end
func.export(person)
"#,
    );

    let person = registry.invoke("person", vec![]).unwrap();
    assert_eq!(
        person.ty(),
        &Type::object([("name", Type::String), ("age", Type::Number)])
    );
    assert_eq!(person.to_json(), json!({ "name": "Bob", "age": 35 }));

    let extra = Type::object([
        ("name", Type::String),
        ("age", Type::Number),
        ("email", Type::String),
    ]);
    let err = convert(person.clone(), &extra).unwrap_err();
    assert!(err.is_incompatible_types());

    let missing = Type::object([("name", Type::String)]);
    assert!(convert(person, &missing).is_err());
}

#[test]
fn test_return_coercion_to_collections() {
    let registry = registry_with(
        "lists.lua",
        r#"
return {
    evens = {
        fn = function(n)
            local out = {}
            for i = 1, n do out[i] = i * 2 end
            return out
        end,
        args = { { type = "number", name = "n" } },
        returns = "number[]",
    },
    counts = {
        fn = function() return { a = 1, b = 2 } end,
        returns = "Map<number>",
    },
}
"#,
    );

    let evens = registry.invoke("evens", vec![TypedValue::number(3)]).unwrap();
    assert_eq!(evens.ty(), &Type::list(Type::Number));
    assert_eq!(evens.to_json(), json!([2, 4, 6]));

    let counts = registry.invoke("counts", vec![]).unwrap();
    assert_eq!(counts.ty(), &Type::map(Type::Number));
    assert_eq!(counts.to_json(), json!({ "a": 1, "b": 2 }));
}

#[test]
fn test_empty_list_return() {
    let registry = registry_with(
        "evens.lua",
        r#"
--- Even numbers up to 2n
-- @param n number
-- @return number[]
local function evens(n)
    local out = {}
    for i = 1, n do out[i] = i * 2 end
    return out
end
func.export(evens)
"#,
    );

    let some = registry.invoke("evens", vec![TypedValue::number(2)]).unwrap();
    assert_eq!(some.to_json(), json!([2, 4]));

    let none = registry.invoke("evens", vec![TypedValue::number(0)]).unwrap();
    assert_eq!(none.ty(), &Type::list(Type::Number));
    assert_eq!(none.to_json(), json!([]));
}

#[test]
fn test_tiny_float_result_rounds() {
    let registry = registry_with(
        "tiny.lua",
        "return { tiny = { fn = function() return 2^-100 end, returns = \"number\" } }",
    );
    let tiny = registry.invoke("tiny", vec![]).unwrap();
    assert_eq!(tiny, TypedValue::number(0));
}

#[test]
fn test_heterogeneous_result_fails_call() {
    let registry = registry_with(
        "mixed.lua",
        r#"
--- Mixed values
-- @return number[]
local function mixed()
    return { 1, "two" }
end
func.export(mixed)
"#,
    );

    let err = registry.invoke("mixed", vec![]).unwrap_err();
    assert!(matches!(err, FuncError::Call { .. }));
    assert!(err.type_error().is_some_and(|e| e.is_incompatible_types()));

    // A failed call leaves the function usable
    assert!(registry.get("mixed").is_some());
}

// ============================================================================
// EXPORT PROTOCOL
// ============================================================================

#[test]
fn test_explicit_declaration() {
    let registry = registry_with(
        "decl.lua",
        r#"
local function scale(values, factor)
    local out = {}
    for i, v in ipairs(values) do out[i] = v * factor end
    return out
end

func.export(scale, {
    name = "scale_all",
    summary = "Scale every value",
    args = {
        { type = "number[]", description = "Values to scale" },
        { type = "number" },
    },
    returns = "number[]",
})
"#,
    );

    let scale = registry.get("scale_all").unwrap();
    assert_eq!(scale.summary(), "Scale every value");
    assert_eq!(scale.arguments()[0].name, "values");
    assert_eq!(scale.arguments()[0].ty, Type::list(Type::Number));
    assert_eq!(scale.arguments()[1].name, "factor");

    let values = TypedValue::list(
        Type::Number,
        [TypedValue::number(1), TypedValue::number(2)],
    )
    .unwrap();
    let scaled = scale.invoke(vec![values, TypedValue::number(10)]).unwrap();
    assert_eq!(scaled.to_json(), json!([10, 20]));

    let schema = scale.input_schema();
    assert_eq!(schema["properties"]["values"]["type"], "array");
    assert_eq!(schema["properties"]["values"]["description"], "Values to scale");
}

#[test]
fn test_partial_success_load() {
    let source = r#"
local function good(x) return x end
func.export(good)

local function untyped(x) return x end
func.export(untyped, { args = { { description = "no type" } } })

--- Union types are rejected
-- @param {string|number} x
local function union(x) return x end
func.export(union)

func.export("not a function")
"#;

    let library = load_library("mixed.lua", source, &FuncConfig::default()).unwrap();
    let names: Vec<_> = library.functions.iter().map(|f| f.name()).collect();
    assert_eq!(names, vec!["good"]);
    assert_eq!(library.warnings.len(), 3);
    assert!(library.warnings[0].contains("declared without a type"));
    assert!(library.warnings[1].contains("union"));
    assert!(library.warnings[2].contains("not a function"));

    let strict = FuncConfig {
        optimistic: false,
        ..Default::default()
    };
    let err = load_library("mixed.lua", source, &strict).unwrap_err();
    assert!(matches!(err, FuncError::SignatureBuild { ref function, .. } if function == "untyped"));
}

#[test]
fn test_stray_bracket_in_doc_type_loads() {
    let registry = FunctionRegistry::new(FuncConfig::default());
    let report = registry
        .load_source(
            "odd.lua",
            r#"
--- Thing
-- @param x )
local function f(x) return x end
func.export(f)

local function g(y) return y end
func.export(g)
"#,
        )
        .unwrap();

    assert_eq!(report.registered, vec!["f", "g"]);
    assert_eq!(registry.get("f").unwrap().arguments()[0].ty, Type::Dynamic);
}

#[test]
fn test_methods_receive_self() {
    let registry = registry_with(
        "counter.lua",
        r#"
local Counter = {}

--- Add to a counter table
-- @param self { count: number }
-- @param n number
-- @return number
function Counter:add(n)
    return self.count + n
end

func.export(Counter.add)
"#,
    );

    let add = registry.get("add").unwrap();
    assert_eq!(add.arguments()[0].name, "self");
    let counter = TypedValue::object([("count", TypedValue::number(4))]);
    let result = add.invoke(vec![counter, TypedValue::number(1)]).unwrap();
    assert_eq!(result, TypedValue::number(5));
}

#[test]
fn test_sandboxed_sources() {
    let config = FuncConfig {
        sandboxed: true,
        ..Default::default()
    };
    let registry = FunctionRegistry::new(config);

    let err = registry
        .load_source("io.lua", "io.write('x')")
        .unwrap_err();
    assert!(matches!(err, FuncError::Lua(_)));

    registry
        .load_source("ok.lua", "return { floor = function(x) return math.floor(x) end }")
        .unwrap();
    let result = registry
        .invoke("floor", vec![TypedValue::number(Decimal::new(27, 1))])
        .unwrap();
    assert_eq!(result, TypedValue::dynamic(TypedValue::number(2)));
}

// ============================================================================
// DISCOVERY
// ============================================================================

#[tokio::test]
async fn test_discovery_and_configured_reload() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("greet.lua"),
        r#"
--- Greet someone
-- @param name string
-- @return string
local function greet(name)
    return "Hello, " .. name
end
func.export(greet)
"#,
    )
    .await
    .unwrap();
    fs::write(
        dir.path().join("shout.luau"),
        "return { shout = function(s) return string.upper(s) end }",
    )
    .await
    .unwrap();

    let config_path = dir.path().join("func.toml");
    fs::write(
        &config_path,
        "extensions = [\"lua\", \"luau\"]\nlibraries = [\"greet.lua\"]\n",
    )
    .await
    .unwrap();

    let config = FuncConfig::load(&config_path).unwrap();
    let registry = FunctionRegistry::new(config);

    let report = registry.discover_from(dir.path()).await.unwrap();
    assert_eq!(report.registered, vec!["greet", "shout"]);

    let greeting = registry
        .invoke("greet", vec![TypedValue::string("Ada")])
        .unwrap();
    assert_eq!(greeting, TypedValue::string("Hello, Ada"));

    let report = registry.load_configured().await.unwrap();
    assert_eq!(report.registered, vec!["greet"]);
    assert!(registry.get("shout").is_none());
}
