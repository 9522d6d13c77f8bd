//! The binary block area of an ASDF container.
//!
//! A block is a header followed by a payload. Array leaves of the tree refer to blocks by their
//! index in the file (`source`), and every array view over the same [`SharedBuffer`] shares one
//! block. The [`BlockManager`] owns the blocks of a document: it deduplicates buffers, decides
//! between inline, internal and streamed storage, renumbers blocks when a document is rewritten
//! and materializes payloads only when they are first read.
//!
//! [`SharedBuffer`]: asdf_buffer::SharedBuffer

mod codec;
mod header;
mod manager;
mod read_at;

pub use codec::{Bzip2Codec, Codec, CodecRef, Compression, codec_for, register_codec};
pub use header::*;
pub use manager::*;
pub use read_at::*;
