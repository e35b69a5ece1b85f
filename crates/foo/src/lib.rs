//! A toy language model built on [`handly_model`].
//!
//! A Foo project is a directory of `*.foo` files, each a sequence of
//! `var x;` and `def f(a, b) { ... }` declarations:
//!
//! ```text
//! FooProject          the directory
//!   FooFile           a.foo
//!     FooVar          x
//!     FooDef          f/2   (name includes arity, `parameters` = ["a", "b"])
//! ```
//!
//! Files with syntax errors still build; the file body records the number of
//! errors as the [`PROBLEMS`] property.

pub mod model;
pub mod parser;

use handly_model::{ElementKind, Property};

pub use model::FooModel;

/// The project directory.
pub const FOO_PROJECT: ElementKind = ElementKind::new("FooProject").openable();
/// A source file.
pub const FOO_FILE: ElementKind = ElementKind::new("FooFile").openable();
/// A `var` declaration.
pub const FOO_VAR: ElementKind = ElementKind::new("FooVar");
/// A `def` declaration, named `name/arity`.
pub const FOO_DEF: ElementKind = ElementKind::new("FooDef");

/// Parameter names of a `FooDef`.
pub const PARAMETERS: Property<Vec<String>> = Property::new("parameters");
/// Number of syntax errors in a `FooFile`.
pub const PROBLEMS: Property<i64> = Property::new("problems");
