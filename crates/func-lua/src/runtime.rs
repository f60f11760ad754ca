//! Lua engines and the export protocol
//!
//! Every loaded source runs on its own [`LuaEngine`]. While the chunk runs,
//! scripts see a `func` global:
//!
//! - `func.log(level, message)` routes into `tracing`
//! - `func.export(fn [, decl])` registers `fn` for export
//!
//! A chunk may also return a table of exports (module form), keyed by
//! function name, whose values are functions or declaration tables carrying
//! the function under `fn`.

use crate::annotations::{
    fingerprint, function_name, param_names, parse_doc_blocks, FunctionMetadata,
};
use crate::bridge::{from_lua, to_lua};
use crate::config::FuncConfig;
use crate::error::{FuncError, Result};
use crate::signature::{Callable, ExportDeclaration, FunctionSignature, SignatureBuilder};
use func_types::{convert, Type, TypedValue};
use mlua::{
    DeserializeOptions, Function, Lua, LuaOptions, LuaSerdeExt, MultiValue, RegistryKey, StdLib,
    Value as LuaValue,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// One Lua state; entry is serialized by a mutex
pub struct LuaEngine {
    lua: Mutex<Lua>,
}

impl LuaEngine {
    pub fn new(config: &FuncConfig) -> Result<Self> {
        let lua = if config.sandboxed {
            Lua::new_with(
                StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8,
                LuaOptions::default(),
            )?
        } else {
            Lua::new()
        };
        Ok(Self {
            lua: Mutex::new(lua),
        })
    }

    /// Run `f` with exclusive access to the Lua state.
    pub fn with<R>(&self, f: impl FnOnce(&Lua) -> R) -> R {
        // A panic inside a previous call leaves the state usable
        let lua = self.lua.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&lua)
    }
}

/// Callable bound to a Lua function
struct LuaCallable {
    name: String,
    engine: Arc<LuaEngine>,
    function: RegistryKey,
    return_type: Type,
}

impl Callable for LuaCallable {
    fn call(&self, args: Vec<TypedValue>) -> Result<TypedValue> {
        let result = self.engine.with(|lua| -> Result<TypedValue> {
            let function: Function = lua.registry_value(&self.function)?;
            let mut values = Vec::with_capacity(args.len());
            for (index, arg) in args.iter().enumerate() {
                let value =
                    to_lua(lua, arg).map_err(|source| FuncError::Argument { index, source })?;
                values.push(value);
            }
            let returned: LuaValue = function.call(MultiValue::from_vec(values))?;
            Ok(from_lua(returned)?)
        })?;

        if result.ty() == &self.return_type {
            return Ok(result);
        }
        debug!(
            "Coercing result of '{}' from {} to {}",
            self.name,
            result.ty(),
            self.return_type
        );
        Ok(convert(result, &self.return_type)?)
    }
}

/// Functions exported by one source
#[derive(Debug)]
pub struct LoadedLibrary {
    pub name: String,
    pub functions: Vec<Arc<FunctionSignature>>,
    /// Isolated registration failures (optimistic mode only)
    pub warnings: Vec<String>,
}

/// An export recorded by `func.export` while the chunk runs
struct PendingExport {
    value: RegistryKey,
    declaration: Option<RegistryKey>,
}

/// An export resolved against the Lua state, ready to build
struct Candidate {
    label: String,
    key: Option<String>,
    function: RegistryKey,
    line: usize,
    declaration: Option<ExportDeclaration>,
}

/// Load `source` on a fresh engine and build a signature for every export.
///
/// Errors running the chunk fail the whole load. Failures of a single export
/// become warnings when `config.optimistic` is set; otherwise the first one
/// is returned.
pub fn load_library(name: &str, source: &str, config: &FuncConfig) -> Result<LoadedLibrary> {
    let engine = Arc::new(LuaEngine::new(config)?);
    let resolved = engine.with(|lua| run_chunk(lua, name, source))?;

    let docs = if config.doc_comments {
        parse_doc_blocks(source)
    } else {
        HashMap::new()
    };
    let lines = SourceLines::new(source);
    let mut matched = HashSet::new();

    let mut library = LoadedLibrary {
        name: name.to_string(),
        functions: Vec::new(),
        warnings: Vec::new(),
    };

    for (label, candidate) in resolved {
        let built = candidate.and_then(|candidate| {
            build_signature(&engine, candidate, &lines, &docs, &mut matched)
                .map_err(|e| match e {
                    e @ FuncError::SignatureBuild { .. } => e,
                    e => FuncError::signature(label.clone(), e),
                })
        });

        match built {
            Ok(signature) => {
                info!(
                    "Registered function: {} ({} args) from {}",
                    signature.name(),
                    signature.arguments().len(),
                    name
                );
                library.functions.push(Arc::new(signature));
            }
            Err(e) if config.optimistic => {
                warn!("Skipping export in {}: {}", name, e);
                library.warnings.push(format!("{}: {}", name, e));
            }
            Err(e) => return Err(e),
        }
    }

    for key in docs.keys().filter(|k| !matched.contains(*k)) {
        debug!("Documentation block in {} matches no export: {}", name, key);
    }

    Ok(library)
}

/// Run the chunk and resolve every export against the Lua state.
fn run_chunk(
    lua: &Lua,
    name: &str,
    source: &str,
) -> Result<Vec<(String, Result<Candidate>)>> {
    let pending = Arc::new(Mutex::new(Vec::new()));
    install_globals(lua, Arc::clone(&pending))?;

    let returned: LuaValue = lua.load(source).set_name(name).eval()?;

    let pending = std::mem::take(
        &mut *pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner()),
    );

    let mut resolved = Vec::new();
    for (i, export) in pending.into_iter().enumerate() {
        let label = format!("export #{}", i + 1);
        let candidate = (|| -> Result<Candidate> {
            let value: LuaValue = lua.registry_value(&export.value)?;
            let declaration = match &export.declaration {
                Some(key) => Some(read_declaration(lua, lua.registry_value(key)?)?),
                None => None,
            };
            resolve(lua, &label, None, value, declaration)
        })();
        resolved.push((label, candidate));
    }

    if let LuaValue::Table(module) = returned {
        let mut entries = Vec::new();
        for pair in module.pairs::<LuaValue, LuaValue>() {
            let (key, value) = pair?;
            match key {
                LuaValue::String(s) => entries.push((s.to_str()?.to_string(), value)),
                other => debug!("Ignoring module entry with {} key", other.type_name()),
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        for (key, value) in entries {
            let candidate = module_entry(lua, &key, value);
            resolved.push((key, candidate));
        }
    }

    Ok(resolved)
}

fn install_globals(lua: &Lua, pending: Arc<Mutex<Vec<PendingExport>>>) -> Result<()> {
    let func = lua.create_table()?;

    // func.log(level, message)
    let log_fn = lua.create_function(|_, (level, msg): (String, String)| {
        match level.as_str() {
            "debug" => tracing::debug!("{}", msg),
            "info" => tracing::info!("{}", msg),
            "warn" => tracing::warn!("{}", msg),
            "error" => tracing::error!("{}", msg),
            _ => tracing::info!("{}", msg),
        }
        Ok(())
    })?;
    func.set("log", log_fn)?;

    // func.export(fn [, decl])
    let export_fn =
        lua.create_function(move |lua, (value, decl): (LuaValue, Option<LuaValue>)| {
            let export = PendingExport {
                value: lua.create_registry_value(value)?,
                declaration: decl.map(|d| lua.create_registry_value(d)).transpose()?,
            };
            pending
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(export);
            Ok(())
        })?;
    func.set("export", export_fn)?;

    lua.globals().set("func", func)?;
    Ok(())
}

fn module_entry(lua: &Lua, key: &str, value: LuaValue) -> Result<Candidate> {
    match value {
        LuaValue::Table(table) => {
            let function: LuaValue = table.raw_get("fn")?;
            let declaration = read_declaration(lua, LuaValue::Table(table))?;
            resolve(lua, key, Some(key.to_string()), function, Some(declaration))
        }
        value => resolve(lua, key, Some(key.to_string()), value, None),
    }
}

fn read_declaration(lua: &Lua, value: LuaValue) -> Result<ExportDeclaration> {
    let options = DeserializeOptions::new().deny_unsupported_types(false);
    Ok(lua.from_value_with(value, options)?)
}

fn resolve(
    lua: &Lua,
    label: &str,
    key: Option<String>,
    value: LuaValue,
    declaration: Option<ExportDeclaration>,
) -> Result<Candidate> {
    let function = match value {
        LuaValue::Function(function) => function,
        other => {
            return Err(FuncError::InvalidExport(format!(
                "'{}' is a {}, not a function",
                label,
                other.type_name()
            )))
        }
    };

    let Some(line) = function.info().line_defined else {
        return Err(FuncError::InvalidExport(format!(
            "'{}' is a native function",
            label
        )));
    };

    Ok(Candidate {
        label: label.to_string(),
        key,
        function: lua.create_registry_value(function)?,
        line,
        declaration,
    })
}

fn build_signature(
    engine: &Arc<LuaEngine>,
    candidate: Candidate,
    lines: &SourceLines<'_>,
    docs: &HashMap<String, FunctionMetadata>,
    matched: &mut HashSet<String>,
) -> Result<FunctionSignature> {
    let Candidate {
        label,
        key,
        function,
        line,
        declaration,
    } = candidate;

    let declaration_line = lines.line(line).unwrap_or_default();
    let name = declaration
        .as_ref()
        .and_then(|d| d.name.clone())
        .or(key)
        .or_else(|| function_name(declaration_line))
        .ok_or_else(|| {
            FuncError::MissingDeclaration(format!("{} has no resolvable name", label))
        })?;

    let params = lines
        .from_line(line)
        .and_then(param_names)
        .unwrap_or_default();

    let print = fingerprint(declaration_line);
    let metadata = docs.get(&print).cloned();
    if metadata.is_some() {
        matched.insert(print);
    }

    SignatureBuilder::new(name.clone())
        .param_names(params)
        .declaration(declaration)
        .metadata(metadata)
        .build(|return_type| {
            let callable: Arc<dyn Callable> = Arc::new(LuaCallable {
                name,
                engine: Arc::clone(engine),
                function,
                return_type: return_type.clone(),
            });
            callable
        })
}

/// Line lookup by the 1-based numbers Lua reports
struct SourceLines<'a> {
    source: &'a str,
    starts: Vec<usize>,
}

impl<'a> SourceLines<'a> {
    fn new(source: &'a str) -> Self {
        let starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { source, starts }
    }

    fn from_line(&self, number: usize) -> Option<&'a str> {
        let start = *self.starts.get(number.checked_sub(1)?)?;
        self.source.get(start..)
    }

    fn line(&self, number: usize) -> Option<&'a str> {
        self.from_line(number)
            .and_then(|rest| rest.lines().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn load(source: &str) -> LoadedLibrary {
        load_library("test.lua", source, &FuncConfig::default()).unwrap()
    }

    fn function<'a>(library: &'a LoadedLibrary, name: &str) -> &'a FunctionSignature {
        library
            .functions
            .iter()
            .find(|f| f.name() == name)
            .map(|f| f.as_ref())
            .unwrap_or_else(|| panic!("{name} not exported"))
    }

    #[test]
    fn test_source_lines() {
        let lines = SourceLines::new("a\nbb\n\nccc");
        assert_eq!(lines.line(1), Some("a"));
        assert_eq!(lines.line(2), Some("bb"));
        assert_eq!(lines.line(3), None);
        assert_eq!(lines.from_line(4), Some("ccc"));
        assert_eq!(lines.line(0), None);
        assert_eq!(lines.line(9), None);
    }

    #[test]
    fn test_call_form_export_uses_docs() {
        let library = load(
            r#"
--- Multiply two numbers
-- @param a number
-- @param b number
-- @return number
local function mul(a, b)
    return a * b
end

func.export(mul)
"#,
        );

        assert!(library.warnings.is_empty());
        let mul = function(&library, "mul");
        assert_eq!(mul.summary(), "Multiply two numbers");
        assert_eq!(mul.arguments()[0].name, "a");
        assert_eq!(mul.arguments()[0].ty, Type::Number);
        assert_eq!(mul.return_type(), &Type::Number);

        let result = mul
            .invoke(vec![TypedValue::number(6), TypedValue::number(7)])
            .unwrap();
        assert_eq!(result, TypedValue::number(42));
    }

    #[test]
    fn test_module_form_exports_sorted() {
        let library = load(
            r#"
local M = {}

function M.shout(s)
    return string.upper(s)
end

return {
    shout = M.shout,
    twice = {
        fn = function(n) return n * 2 end,
        summary = "Double a number",
        args = { { type = "number", name = "n" } },
        returns = "number",
    },
}
"#,
        );

        let names: Vec<_> = library.functions.iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["shout", "twice"]);

        let shout = function(&library, "shout");
        assert_eq!(shout.arguments()[0].name, "s");
        assert_eq!(shout.arguments()[0].ty, Type::Dynamic);
        let result = shout.invoke(vec![TypedValue::string("hi")]).unwrap();
        assert_eq!(result, TypedValue::dynamic(TypedValue::string("HI")));

        let twice = function(&library, "twice");
        assert_eq!(twice.summary(), "Double a number");
        let result = twice.invoke(vec![TypedValue::number(21)]).unwrap();
        assert_eq!(result, TypedValue::number(42));
    }

    #[test]
    fn test_invalid_exports_become_warnings() {
        let library = load(
            r#"
func.export(print)
func.export(42)

local function ok(x)
    return x
end
func.export(ok)
"#,
        );

        assert_eq!(library.functions.len(), 1);
        assert_eq!(library.functions[0].name(), "ok");
        assert_eq!(library.warnings.len(), 2);
        assert!(library.warnings[0].contains("native function"));
        assert!(library.warnings[1].contains("not a function"));
    }

    #[test]
    fn test_strict_mode_fails_on_first_error() {
        let config = FuncConfig {
            optimistic: false,
            ..Default::default()
        };
        let err = load_library("strict.lua", "func.export(42)", &config).unwrap_err();
        assert!(matches!(err, FuncError::SignatureBuild { .. }));
    }

    #[test]
    fn test_chunk_error_fails_load() {
        let err = load_library("bad.lua", "this is not lua", &FuncConfig::default()).unwrap_err();
        assert!(matches!(err, FuncError::Lua(_)));
    }

    #[test]
    fn test_sandbox_hides_os() {
        let config = FuncConfig {
            sandboxed: true,
            ..Default::default()
        };
        let err = load_library("os.lua", "return os.time()", &config).unwrap_err();
        assert!(matches!(err, FuncError::Lua(_)));

        let library = load_library(
            "ok.lua",
            "return { len = function(s) return string.len(s) end }",
            &config,
        )
        .unwrap();
        assert_eq!(library.functions.len(), 1);
    }

    #[test]
    fn test_doc_comments_can_be_disabled() {
        let config = FuncConfig {
            doc_comments: false,
            ..Default::default()
        };
        let library = load_library(
            "nodoc.lua",
            "--- Identity\n-- @param x number\nlocal function id(x) return x end\nfunc.export(id)\n",
            &config,
        )
        .unwrap();
        assert_eq!(library.functions[0].arguments()[0].ty, Type::Dynamic);
        assert_eq!(library.functions[0].summary(), "");
    }

    #[test]
    fn test_script_errors_fail_the_call() {
        let library = load(
            "local function boom() error('nope') end\nfunc.export(boom)\n",
        );
        let err = library.functions[0].invoke(vec![]).unwrap_err();
        assert!(matches!(err, FuncError::Call { .. }));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    #[traced_test]
    fn test_script_logging() {
        load("func.log('warn', 'from script')\nfunc.log('debug', 'details')\n");
        assert!(logs_contain("from script"));
        assert!(logs_contain("details"));
    }
}
