//! Read and write ASDF documents: a tagged tree followed by a binary block area.
//!
//! # Reading
//!
//! Documents are opened with [`AsdfOpenOptions`], from anything implementing
//! [`ReadAt`](asdf_block::ReadAt): a file on disk or bytes in memory. Opening parses the tree,
//! validates it against the schemas its tags resolve to, optionally fills in schema defaults and
//! converts it to native objects through a [`Registry`](asdf_types::Registry). Only the block
//! headers are read; array payloads are loaded when they are first accessed.
//!
//! # Writing
//!
//! [`AsdfWriteOptions`] control where arrays are stored (inline, internal blocks or one trailing
//! streamed block), how blocks are compressed and padded, and whether the tree is validated or
//! stripped of default values before it is written. Writing to a path goes through a temporary
//! file in the same directory, so the target is either fully replaced or left as it was.
//!
//! # File Format
//!
//! ```text
//! ┌────────────────────────────┐
//! │ #ASDF 1.0.0                │  header comments
//! │ #ASDF_STANDARD 1.0.0       │
//! ├────────────────────────────┤
//! │                            │
//! │        Tagged tree         │  text, see [`TreeFormat`]
//! │                            │
//! ├────────────────────────────┤
//! │ ...                        │  end of tree marker
//! ├────────────────────────────┤
//! │ Block header │  payload    │  zero or more internal blocks
//! ├────────────────────────────┤
//! │ Block header │  payload .. │  optional streamed block, up to the end of the file
//! └────────────────────────────┘
//! ```
//!
//! Array leaves of the tree refer to blocks by their position in the block area. A document
//! without blocks ends right after the end of tree marker.

mod file;
mod format;
mod open;
mod writer;

use std::sync::{Arc, LazyLock};

use asdf_error::AsdfExpect;
use asdf_types::{Registry, RegistryRef};
pub use file::*;
pub use format::*;
pub use open::*;
pub use writer::*;

/// Leading bytes of every document.
pub const ASDF_MAGIC: &[u8] = b"#ASDF ";

/// Version of the container layout written in the first header line.
pub const ASDF_FILE_FORMAT_VERSION: &str = "1.0.0";

/// Version of the standard the written tags belong to.
pub const ASDF_STANDARD_VERSION: &str = "1.0.0";

/// Separates the tree from the block area.
pub const TREE_END: &[u8] = b"\n...\n";

/// Tag of the root map of a document.
pub const ASDF_ROOT_TAG: &str = "tag:stsci.edu:asdf/core/asdf-1.0.0";

/// The library recorded in the `asdf_library` entry of written documents.
pub const ASDF_LIBRARY_NAME: &str = env!("CARGO_PKG_NAME");

/// A registry with the core converters, shared by documents that are not given one.
pub static DEFAULT_REGISTRY: LazyLock<RegistryRef> = LazyLock::new(|| {
    Registry::core().asdf_expect("the core converters never overlap")
});

pub(crate) fn default_registry() -> RegistryRef {
    Arc::clone(&DEFAULT_REGISTRY)
}
