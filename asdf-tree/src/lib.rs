#![deny(missing_docs)]

//! The tagged value model of an ASDF tree.
//!
//! Every node is a [`Node`]: a map, a sequence or a scalar. Each may carry a [`Tag`] naming its
//! semantic type, plus hints that only affect how it is written (property order, flow style,
//! scalar style). Nodes without a tag have the YAML core tag implied by their shape, see
//! [`Node::effective_tag`].
//!
//! Containers are shared handles. Cloning a [`Node`] aliases it rather than copying it, so a
//! tree may hold the same container twice or even contain itself; use [`Node::deep_copy`] for
//! an independent copy.

pub use node::*;
pub use tag::*;

mod json;
mod node;
mod tag;
