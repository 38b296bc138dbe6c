//! Configuration document access and compilation.
//!
//! This module contains the typed configuration surface:
//! - `ConfigReader`: type-checked value extraction with `$ENV` indirection
//! - `IndexDefinition`: index configuration compiled to keys plus options

mod index;
mod reader;

pub use index::IndexDefinition;
pub use reader::ConfigReader;
