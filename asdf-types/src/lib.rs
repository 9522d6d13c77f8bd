//! Conversion between tagged trees and native objects.
//!
//! A [`Registry`] maps tags to [`Converter`]s for reading and native Rust types to converters
//! for writing. Reading a tag no converter knows is not an error: the node comes back as a
//! [`Value::Tagged`] holding its plain content and is written back unchanged.
//!
//! The core `ndarray` type is handled by [`NDArrayConverter`], which places array data inline
//! or in the block area as decided by the document's [`BlockManager`](asdf_block::BlockManager).

mod context;
mod converter;
mod ndarray;
mod registry;
#[cfg(any(test, feature = "test-harness"))]
pub mod test_harness;
mod value;

pub use context::*;
pub use converter::*;
pub use ndarray::*;
pub use registry::*;
pub use value::*;
