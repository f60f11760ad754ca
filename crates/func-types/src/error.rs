//! Error types for func-types

use crate::types::Type;
use std::fmt;
use thiserror::Error;

/// One step into a nested value or type expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
    /// Position inside a tuple, list or set
    Index(usize),
    /// Field of an object or key of a map
    Key(String),
    /// The element type of a homogeneous container
    Element,
}

/// Location of a failure inside a nested value, rendered as `$[2].name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ValuePath(Vec<PathStep>);

impl ValuePath {
    /// The root of a value
    pub fn root() -> Self {
        Self::default()
    }

    /// Steps from the root to the failing element
    pub fn steps(&self) -> &[PathStep] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Prepend a step while an error unwinds out of a container.
    fn prepend(&mut self, step: PathStep) {
        self.0.insert(0, step);
    }
}

impl fmt::Display for ValuePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for step in &self.0 {
            match step {
                PathStep::Index(i) => write!(f, "[{}]", i)?,
                PathStep::Key(k) => write!(f, ".{}", k)?,
                PathStep::Element => f.write_str("[*]")?,
            }
        }
        Ok(())
    }
}

impl<const N: usize> From<[PathStep; N]> for ValuePath {
    fn from(steps: [PathStep; N]) -> Self {
        Self(steps.into())
    }
}

/// Errors raised while parsing, inferring, marshalling or converting types.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypeError {
    /// A type expression uses a construct outside the supported grammar
    #[error("unsupported type '{fragment}' at {path}: {reason}")]
    UnsupportedType {
        path: ValuePath,
        fragment: String,
        reason: String,
    },

    /// The JSON-equivalent stream of a value is malformed
    #[error("cannot infer type: {0}")]
    TypeInference(String),

    /// A value cannot be marshalled into or out of its typed representation
    #[error("cannot convert value at {path}: {reason}")]
    ConversionFailure { path: ValuePath, reason: String },

    /// No coercion rule exists between two types
    #[error("cannot convert {from} into {to} at {path}: {reason}")]
    IncompatibleTypes {
        path: ValuePath,
        from: Box<Type>,
        to: Box<Type>,
        reason: String,
    },
}

impl TypeError {
    pub fn unsupported(fragment: impl Into<String>, reason: impl Into<String>) -> Self {
        TypeError::UnsupportedType {
            path: ValuePath::root(),
            fragment: fragment.into(),
            reason: reason.into(),
        }
    }

    pub fn conversion(reason: impl Into<String>) -> Self {
        TypeError::ConversionFailure {
            path: ValuePath::root(),
            reason: reason.into(),
        }
    }

    pub fn incompatible(from: &Type, to: &Type, reason: impl Into<String>) -> Self {
        TypeError::IncompatibleTypes {
            path: ValuePath::root(),
            from: Box::new(from.clone()),
            to: Box::new(to.clone()),
            reason: reason.into(),
        }
    }

    /// Record that this error happened inside `step` of an enclosing value.
    pub fn at(mut self, step: PathStep) -> Self {
        match &mut self {
            TypeError::UnsupportedType { path, .. }
            | TypeError::ConversionFailure { path, .. }
            | TypeError::IncompatibleTypes { path, .. } => path.prepend(step),
            TypeError::TypeInference(_) => {}
        }
        self
    }

    /// Path of the failing element, if the error carries one.
    pub fn path(&self) -> Option<&ValuePath> {
        match self {
            TypeError::UnsupportedType { path, .. }
            | TypeError::ConversionFailure { path, .. }
            | TypeError::IncompatibleTypes { path, .. } => Some(path),
            TypeError::TypeInference(_) => None,
        }
    }

    pub fn is_unsupported_type(&self) -> bool {
        matches!(self, TypeError::UnsupportedType { .. })
    }

    pub fn is_conversion_failure(&self) -> bool {
        matches!(self, TypeError::ConversionFailure { .. })
    }

    pub fn is_incompatible_types(&self) -> bool {
        matches!(self, TypeError::IncompatibleTypes { .. })
    }
}

pub type Result<T> = std::result::Result<T, TypeError>;
