//! Schema types and typed values for script functions
//!
//! This crate is the engine-agnostic half of the function bridge:
//!
//! - [`Type`]: the closed structural type tree (primitives, lists, sets,
//!   maps, tuples, objects and `any`)
//! - [`parse_type`]: parses informal annotations such as `Map<string[]>` or
//!   `{ name: string; age: number }`
//! - [`implied_type`]: infers a type from the JSON rendering of a value
//! - [`TypedValue`]: a [`Value`] payload paired with its type
//! - [`convert`]: coerces a typed value into another compatible type
//!
//! ## Example
//!
//! ```
//! use func_types::{convert, parse_type, TypedValue, Type};
//!
//! let ty = parse_type("[number, number]").unwrap();
//! let pair = TypedValue::tuple([TypedValue::number(1), TypedValue::number(2)]);
//! assert_eq!(pair.ty(), &ty);
//!
//! let list = convert(pair, &Type::list(Type::String)).unwrap();
//! assert_eq!(list.to_json(), serde_json::json!(["1", "2"]));
//! ```

pub mod convert;
pub mod error;
pub mod expr;
pub mod implied;
pub mod types;
pub mod value;

pub use convert::{convert, EFFECTIVE_ZERO_DIGITS};
pub use error::{PathStep, Result, TypeError, ValuePath};
pub use expr::parse_type;
pub use implied::{implied_type, implied_type_of};
pub use types::Type;
pub use value::{TypedValue, Value};

// Re-export so callers can build numbers without naming the dependency
pub use rust_decimal::Decimal;
