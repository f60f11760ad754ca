//! Function signatures
//!
//! A [`FunctionSignature`] is the host-facing description of one exported
//! script function: its name, typed arguments, return type and a bound
//! [`Callable`]. Signatures are assembled by [`SignatureBuilder`], which
//! merges three sources in priority order:
//!
//! 1. explicit declarations attached to the export (`args`, `returns`)
//! 2. documentation blocks above the function
//! 3. the declared parameter list, with every type defaulting to `any`

use crate::annotations::FunctionMetadata;
use crate::error::{FuncError, Result};
use func_types::{convert, parse_type, Type, TypedValue};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// One typed argument of a function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionArgument {
    pub name: String,

    #[serde(rename = "type")]
    pub ty: Type,

    #[serde(default)]
    pub description: String,
}

/// Invocation surface of a function
pub trait Callable: Send + Sync {
    /// Call with arguments already matching the declared parameter types.
    fn call(&self, args: Vec<TypedValue>) -> Result<TypedValue>;
}

impl<F> Callable for F
where
    F: Fn(Vec<TypedValue>) -> Result<TypedValue> + Send + Sync,
{
    fn call(&self, args: Vec<TypedValue>) -> Result<TypedValue> {
        self(args)
    }
}

/// A function exported with a typed signature
#[derive(Clone, Serialize)]
pub struct FunctionSignature {
    name: String,
    arguments: Vec<FunctionArgument>,
    return_type: Type,
    summary: String,
    description: String,
    #[serde(skip)]
    callable: Arc<dyn Callable>,
}

impl fmt::Debug for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionSignature")
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .field("return_type", &self.return_type)
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}

impl FunctionSignature {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[FunctionArgument] {
        &self.arguments
    }

    pub fn return_type(&self) -> &Type {
        &self.return_type
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Invoke the function.
    ///
    /// Arguments whose type differs from the declared parameter type are
    /// converted first. Conversion failures fail the call; no argument is
    /// ever replaced with a default.
    pub fn invoke(&self, args: Vec<TypedValue>) -> Result<TypedValue> {
        if args.len() != self.arguments.len() {
            return Err(FuncError::Arity {
                function: self.name.clone(),
                expected: self.arguments.len(),
                got: args.len(),
            });
        }

        let mut prepared = Vec::with_capacity(args.len());
        for (index, (arg, param)) in args.into_iter().zip(&self.arguments).enumerate() {
            if arg.ty() != &param.ty {
                debug!(
                    "Coercing argument '{}' of '{}' from {} to {}",
                    param.name,
                    self.name,
                    arg.ty(),
                    param.ty
                );
            }
            let arg = convert(arg, &param.ty)
                .map_err(|source| FuncError::call(&self.name, FuncError::Argument { index, source }))?;
            prepared.push(arg);
        }

        self.callable
            .call(prepared)
            .map_err(|e| FuncError::call(&self.name, e))
    }

    /// JSON Schema of the argument list as an object keyed by argument name
    pub fn input_schema(&self) -> JsonValue {
        let properties: serde_json::Map<String, JsonValue> = self
            .arguments
            .iter()
            .map(|arg| {
                let mut schema = arg.ty.to_json_schema();
                if let (Some(object), false) = (schema.as_object_mut(), arg.description.is_empty()) {
                    object.insert("description".to_string(), json!(arg.description));
                }
                (arg.name.clone(), schema)
            })
            .collect();

        let required: Vec<&str> = self.arguments.iter().map(|a| a.name.as_str()).collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required
        })
    }
}

/// Declaration attached to an export from the script side
///
/// ```lua
/// func.export(add, {
///     summary = "Add two numbers",
///     args = { { type = "number" }, { type = "number" } },
///     returns = "number",
/// })
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExportDeclaration {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Explicit arguments; when present each entry must carry a type
    #[serde(default)]
    pub args: Option<Vec<ArgumentDeclaration>>,
    #[serde(default)]
    pub returns: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ArgumentDeclaration {
    #[serde(default, rename = "type")]
    pub ty: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
}

/// Merges declarations, documentation and parameter names into a signature
#[derive(Debug, Clone, Default)]
pub struct SignatureBuilder {
    name: String,
    param_names: Vec<String>,
    declaration: Option<ExportDeclaration>,
    metadata: Option<FunctionMetadata>,
}

impl SignatureBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Names from the function's own parameter list
    pub fn param_names(mut self, names: Vec<String>) -> Self {
        self.param_names = names;
        self
    }

    pub fn declaration(mut self, declaration: Option<ExportDeclaration>) -> Self {
        self.declaration = declaration;
        self
    }

    pub fn metadata(mut self, metadata: Option<FunctionMetadata>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Resolve the signature and bind it to a callable.
    ///
    /// `bind` receives the resolved return type. Any failure is reported as
    /// [`FuncError::SignatureBuild`] naming the function.
    pub fn build<F>(self, bind: F) -> Result<FunctionSignature>
    where
        F: FnOnce(&Type) -> Arc<dyn Callable>,
    {
        let name = self.name.clone();
        self.resolve(bind)
            .map_err(|e| FuncError::signature(name, e))
    }

    fn resolve<F>(self, bind: F) -> Result<FunctionSignature>
    where
        F: FnOnce(&Type) -> Arc<dyn Callable>,
    {
        if self.name.trim().is_empty() {
            return Err(FuncError::MissingDeclaration(
                "exported function has no name".to_string(),
            ));
        }

        let declaration = self.declaration.unwrap_or_default();
        let metadata = self.metadata.unwrap_or_default();

        let arguments = match &declaration.args {
            Some(declared) => declared_arguments(&self.name, declared, &self.param_names)?,
            None => documented_arguments(&self.name, &metadata, &self.param_names)?,
        };

        let mut seen = HashSet::new();
        for arg in &arguments {
            if arg.name.is_empty() {
                return Err(FuncError::MissingDeclaration(format!(
                    "an argument of '{}' has no name",
                    self.name
                )));
            }
            if !seen.insert(arg.name.as_str()) {
                return Err(FuncError::DuplicateArgument {
                    function: self.name.clone(),
                    name: arg.name.clone(),
                });
            }
        }

        let return_expr = declaration
            .returns
            .as_deref()
            .or_else(|| metadata.returns.as_ref().and_then(|r| r.type_expr.as_deref()));
        let return_type = match return_expr {
            Some(expr) => parse_type(expr).map_err(|source| FuncError::ReturnType {
                function: self.name.clone(),
                source,
            })?,
            None => Type::Dynamic,
        };

        let callable = bind(&return_type);
        Ok(FunctionSignature {
            summary: declaration.summary.unwrap_or(metadata.summary),
            description: declaration.description.unwrap_or(metadata.description),
            name: self.name,
            arguments,
            return_type,
            callable,
        })
    }
}

fn declared_arguments(
    function: &str,
    declared: &[ArgumentDeclaration],
    param_names: &[String],
) -> Result<Vec<FunctionArgument>> {
    declared
        .iter()
        .enumerate()
        .map(|(index, arg)| {
            let expr = arg.ty.as_deref().ok_or_else(|| {
                FuncError::MissingDeclaration(format!(
                    "argument {} of '{}' is declared without a type",
                    index, function
                ))
            })?;
            let name = arg
                .name
                .clone()
                .or_else(|| param_names.get(index).cloned())
                .ok_or_else(|| {
                    FuncError::MissingDeclaration(format!(
                        "argument {} of '{}' has no name",
                        index, function
                    ))
                })?;
            Ok(FunctionArgument {
                name,
                ty: resolve_argument(function, index, expr)?,
                description: arg.description.clone(),
            })
        })
        .collect()
}

fn documented_arguments(
    function: &str,
    metadata: &FunctionMetadata,
    param_names: &[String],
) -> Result<Vec<FunctionArgument>> {
    // Without a parameter list the documentation is all there is
    let names: Vec<String> = if param_names.is_empty() {
        metadata.params.iter().map(|p| p.name.clone()).collect()
    } else {
        param_names.to_vec()
    };

    names
        .into_iter()
        .enumerate()
        .map(|(index, name)| {
            let doc = metadata.params.iter().find(|p| p.name == name).or_else(|| {
                metadata
                    .params
                    .get(index)
                    .filter(|p| !param_names.contains(&p.name))
            });

            let ty = match doc.and_then(|d| d.type_expr.as_deref()) {
                Some(expr) => resolve_argument(function, index, expr)?,
                None => Type::Dynamic,
            };
            Ok(FunctionArgument {
                name,
                ty,
                description: doc.map(|d| d.description.clone()).unwrap_or_default(),
            })
        })
        .collect()
}

fn resolve_argument(function: &str, index: usize, expr: &str) -> Result<Type> {
    parse_type(expr).map_err(|source| FuncError::ArgumentType {
        function: function.to_string(),
        index,
        source,
    })
}
