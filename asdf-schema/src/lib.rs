#![deny(missing_docs)]

//! Schema validation for tagged ASDF trees.
//!
//! Schemas are JSON schema draft 4 documents extended with the keywords of the YAML schema
//! meta-schema: `tag` constrains the tag of a node, while `propertyOrder`, `flowStyle` and
//! `style` record writing hints on the nodes they apply to.
//!
//! A tree is validated by walking it (see [`ValidationErrors`]): each tagged node is validated
//! against the schema its tag resolves to through the [`ValidationContext`]. The same walk, run
//! with a different [`KeywordSet`], fills in or strips schema defaults.
//!
//! Both parsed schema documents and [`Validator`]s are cached for the life of the process.

pub use context::*;
pub use error::*;
pub use loader::*;
pub use ops::*;
pub use validator::{KeywordSet, Validator};
pub use walk::*;

mod context;
mod error;
mod loader;
mod ops;
mod validator;
mod walk;

#[cfg(test)]
mod tests;
