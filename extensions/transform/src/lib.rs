//! Composable coordinate transforms and the converters that store them in ASDF trees.
//!
//! Simple transforms ([`Shift`], [`Scale`], [`Identity`], [`Constant`], [`Mapping`]) combine
//! through an [`Operator`] into a [`CompoundModel`], a binary tree that is written as nested
//! `forward` pairs under the operator's tag.

use std::any::Any;
use std::sync::Arc;

use asdf_error::{AsdfResult, asdf_bail, asdf_err};
use asdf_types::{ConverterRef, NativeObject, ObjectRef, RegistryBuilder, RegistryRef};

pub use compound::*;
pub use mapping::*;
pub use models::*;
pub use operator::*;

mod compound;
mod mapping;
mod models;
mod operator;
mod tree;

#[cfg(test)]
mod tests;

/// Tags of every transform share this prefix.
pub const TRANSFORM_TAG_PREFIX: &str = "tag:stsci.edu:asdf/transform/";
/// The version written for transform tags.
pub const TRANSFORM_VERSION: &str = "1.0.0";

/// A function from `n_inputs` coordinates to `n_outputs` coordinates.
pub trait Transform: NativeObject {
    fn n_inputs(&self) -> usize;

    fn n_outputs(&self) -> usize;

    fn name(&self) -> Option<&str>;

    /// Evaluate at one point. `inputs` holds exactly [`Self::n_inputs`] values.
    fn unchecked_evaluate(&self, inputs: &[f64]) -> Vec<f64>;
}

pub type TransformRef = Arc<dyn Transform>;

impl dyn Transform + '_ {
    pub fn evaluate(&self, inputs: &[f64]) -> AsdfResult<Vec<f64>> {
        if inputs.len() != self.n_inputs() {
            asdf_bail!(
                "{:?} takes {} inputs, got {}",
                self,
                self.n_inputs(),
                inputs.len()
            );
        }
        Ok(self.unchecked_evaluate(inputs))
    }
}

/// Recover the transform behind a converted object.
///
/// Operands of a compound model are read as plain objects; this is where they regain their
/// composable capability. Anything that is not a transform is rejected.
pub fn as_transform(object: &ObjectRef) -> AsdfResult<TransformRef> {
    type AnyRef = Arc<dyn Any + Send + Sync>;

    fn cast<T: Transform>(any: AnyRef) -> Result<TransformRef, AnyRef> {
        any.downcast::<T>().map(|t| t as TransformRef)
    }

    cast::<Shift>(object.clone().into_any())
        .or_else(cast::<Scale>)
        .or_else(cast::<Identity>)
        .or_else(cast::<Constant>)
        .or_else(cast::<Mapping>)
        .or_else(cast::<CompoundModel>)
        .map_err(|_| asdf_err!(Conversion: "unknown model type {:?}", object))
}

/// The converters for every transform in this crate.
pub fn converters() -> Vec<ConverterRef> {
    vec![
        Arc::new(ShiftConverter),
        Arc::new(ScaleConverter),
        Arc::new(IdentityConverter),
        Arc::new(ConstantConverter),
        Arc::new(RemapAxesConverter),
        Arc::new(CompoundConverter),
    ]
}

/// A registry holding the core converters and the transform converters.
pub fn registry() -> AsdfResult<RegistryRef> {
    RegistryBuilder::core().with_converters(converters()).build()
}

/// Schemas for the transform tags, keyed by URL.
pub static TRANSFORM_SCHEMAS: &[(&str, &str)] = &[
    (
        "http://stsci.edu/schemas/asdf/transform/transform-1.0.0",
        include_str!("../schemas/transform/transform-1.0.0.json"),
    ),
    (
        "http://stsci.edu/schemas/asdf/transform/shift-1.0.0",
        include_str!("../schemas/transform/shift-1.0.0.json"),
    ),
    (
        "http://stsci.edu/schemas/asdf/transform/scale-1.0.0",
        include_str!("../schemas/transform/scale-1.0.0.json"),
    ),
    (
        "http://stsci.edu/schemas/asdf/transform/identity-1.0.0",
        include_str!("../schemas/transform/identity-1.0.0.json"),
    ),
    (
        "http://stsci.edu/schemas/asdf/transform/constant-1.0.0",
        include_str!("../schemas/transform/constant-1.0.0.json"),
    ),
    (
        "http://stsci.edu/schemas/asdf/transform/remap_axes-1.0.0",
        include_str!("../schemas/transform/remap_axes-1.0.0.json"),
    ),
    (
        "http://stsci.edu/schemas/asdf/transform/binary_operator-1.0.0",
        include_str!("../schemas/transform/binary_operator-1.0.0.json"),
    ),
    (
        "http://stsci.edu/schemas/asdf/transform/add-1.0.0",
        include_str!("../schemas/transform/add-1.0.0.json"),
    ),
    (
        "http://stsci.edu/schemas/asdf/transform/subtract-1.0.0",
        include_str!("../schemas/transform/subtract-1.0.0.json"),
    ),
    (
        "http://stsci.edu/schemas/asdf/transform/multiply-1.0.0",
        include_str!("../schemas/transform/multiply-1.0.0.json"),
    ),
    (
        "http://stsci.edu/schemas/asdf/transform/divide-1.0.0",
        include_str!("../schemas/transform/divide-1.0.0.json"),
    ),
    (
        "http://stsci.edu/schemas/asdf/transform/power-1.0.0",
        include_str!("../schemas/transform/power-1.0.0.json"),
    ),
    (
        "http://stsci.edu/schemas/asdf/transform/compose-1.0.0",
        include_str!("../schemas/transform/compose-1.0.0.json"),
    ),
    (
        "http://stsci.edu/schemas/asdf/transform/concatenate-1.0.0",
        include_str!("../schemas/transform/concatenate-1.0.0.json"),
    ),
];
