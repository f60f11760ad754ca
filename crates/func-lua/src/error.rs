//! Error types for func-lua

use func_types::TypeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FuncError {
    #[error("Lua error: {0}")]
    Lua(#[from] mlua::Error),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("Missing declaration: {0}")]
    MissingDeclaration(String),

    #[error("Invalid export: {0}")]
    InvalidExport(String),

    /// Registration of one exported function failed
    #[error("Failed to build signature for '{function}': {source}")]
    SignatureBuild {
        function: String,
        #[source]
        source: Box<FuncError>,
    },

    #[error("Argument {index} of '{function}' has an invalid type: {source}")]
    ArgumentType {
        function: String,
        index: usize,
        #[source]
        source: TypeError,
    },

    #[error("Return type of '{function}' is invalid: {source}")]
    ReturnType {
        function: String,
        #[source]
        source: TypeError,
    },

    #[error("Duplicate argument name '{name}' in '{function}'")]
    DuplicateArgument { function: String, name: String },

    #[error("'{function}' expects {expected} arguments, got {got}")]
    Arity {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("Argument {index} cannot be passed: {source}")]
    Argument {
        index: usize,
        #[source]
        source: TypeError,
    },

    /// An invocation failed; the function is still registered
    #[error("Call to '{function}' failed: {source}")]
    Call {
        function: String,
        #[source]
        source: Box<FuncError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Function not found: {0}")]
    NotFound(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl FuncError {
    pub(crate) fn signature(function: impl Into<String>, source: FuncError) -> Self {
        FuncError::SignatureBuild {
            function: function.into(),
            source: Box::new(source),
        }
    }

    pub(crate) fn call(function: impl Into<String>, source: FuncError) -> Self {
        FuncError::Call {
            function: function.into(),
            source: Box::new(source),
        }
    }

    /// The type error at the root of this failure, if any
    pub fn type_error(&self) -> Option<&TypeError> {
        match self {
            FuncError::Type(e)
            | FuncError::ArgumentType { source: e, .. }
            | FuncError::ReturnType { source: e, .. }
            | FuncError::Argument { source: e, .. } => Some(e),
            FuncError::SignatureBuild { source, .. } | FuncError::Call { source, .. } => {
                source.type_error()
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FuncError>;
