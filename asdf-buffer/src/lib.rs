#![deny(missing_docs)]

//! Shared byte buffers and N-dimensional array views for ASDF.
//!
//! Array data in an ASDF document lives in a [`SharedBuffer`]. Many [`NDArray`] views may point
//! into the same buffer with different offsets, shapes and strides; the buffer's [`BufferId`] is
//! the identity used to decide that two views share storage.
//!
//! # Lazy payloads
//!
//! A buffer read from a file starts out _pending_: only its length is known. The payload is
//! produced by the loader on first access to the bytes. Reading metadata (length, identity,
//! element type) never forces the load.

pub use dtype::*;
pub use ndarray::*;
pub use pvalue::*;
pub use shared::*;

mod dtype;
mod ndarray;
mod pvalue;
mod shared;
