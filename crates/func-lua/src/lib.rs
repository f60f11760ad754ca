//! Lua functions with typed signatures
//!
//! This crate loads Lua 5.4 sources and exposes their exported functions to
//! the host as [`FunctionSignature`]s:
//! - **Typed**: argument and return types come from export declarations or
//!   LDoc blocks, parsed with [`func_types::parse_type`]
//! - **Coerced**: arguments and results are converted to the declared types
//! - **Isolated**: every source runs on its own engine, and one bad export
//!   does not stop its siblings from loading
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  math.lua                                   │
//! │                                             │
//! │  --- Add two numbers                        │
//! │  -- @param a number                         │
//! │  -- @param b number                         │
//! │  -- @return number                          │
//! │  local function add(a, b) ... end           │
//! │  func.export(add)                           │
//! └─────────────────────────────────────────────┘
//!             │
//!             ▼
//! ┌─────────────────────────────────────────────┐
//! │  runtime (mlua, one engine per source)      │
//! │  annotations → SignatureBuilder             │
//! └─────────────────────────────────────────────┘
//!             │
//!             ▼
//! ┌─────────────────────────────────────────────┐
//! │  FunctionRegistry (Arc snapshot swap)       │
//! │  invoke: convert → bridge → Lua → convert   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use func_lua::{FuncConfig, FunctionRegistry};
//! use func_types::TypedValue;
//!
//! let registry = FunctionRegistry::new(FuncConfig::default());
//! let report = registry.discover_from("scripts").await?;
//! for warning in &report.warnings {
//!     eprintln!("{warning}");
//! }
//!
//! let sum = registry.invoke("add", vec![TypedValue::number(100), TypedValue::number(100)])?;
//! ```

pub mod annotations;
pub mod bridge;
mod config;
mod error;
mod registry;
mod runtime;
mod signature;

pub use bridge::{from_lua, to_lua};
pub use config::FuncConfig;
pub use error::{FuncError, Result};
pub use registry::{FunctionRegistry, LoadReport};
pub use runtime::{load_library, LoadedLibrary, LuaEngine};
pub use signature::{
    ArgumentDeclaration, Callable, ExportDeclaration, FunctionArgument, FunctionSignature,
    SignatureBuilder,
};
