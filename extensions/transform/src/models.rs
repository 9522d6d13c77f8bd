use std::sync::Arc;

use asdf_error::AsdfResult;
use asdf_tree::Node;
use asdf_types::{ConversionContext, Converter, NativeObject, NativeType, ObjectRef, native_object};

use crate::Transform;
use crate::tree::{
    downcast, expect_map, read_f64, read_label, read_usize, transform_map, usize_node,
};

/// Adds a constant offset to its single input.
#[derive(Debug, Clone, PartialEq)]
pub struct Shift {
    offset: f64,
    name: Option<String>,
}

impl Shift {
    pub fn new(offset: f64) -> Self {
        Self { offset, name: None }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }
}

/// Multiplies its single input by a constant factor.
#[derive(Debug, Clone, PartialEq)]
pub struct Scale {
    factor: f64,
    name: Option<String>,
}

impl Scale {
    pub fn new(factor: f64) -> Self {
        Self { factor, name: None }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }
}

/// Passes `n` inputs through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    n_dims: usize,
    name: Option<String>,
}

impl Identity {
    pub fn new(n_dims: usize) -> Self {
        Self { n_dims, name: None }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Takes no inputs and produces a single constant.
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    value: f64,
    name: Option<String>,
}

impl Constant {
    pub fn new(value: f64) -> Self {
        Self { value, name: None }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

native_object!(Shift);
native_object!(Scale);
native_object!(Identity);
native_object!(Constant);

impl Transform for Shift {
    fn n_inputs(&self) -> usize {
        1
    }

    fn n_outputs(&self) -> usize {
        1
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn unchecked_evaluate(&self, inputs: &[f64]) -> Vec<f64> {
        inputs.iter().map(|x| x + self.offset).collect()
    }
}

impl Transform for Scale {
    fn n_inputs(&self) -> usize {
        1
    }

    fn n_outputs(&self) -> usize {
        1
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn unchecked_evaluate(&self, inputs: &[f64]) -> Vec<f64> {
        inputs.iter().map(|x| x * self.factor).collect()
    }
}

impl Transform for Identity {
    fn n_inputs(&self) -> usize {
        self.n_dims
    }

    fn n_outputs(&self) -> usize {
        self.n_dims
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn unchecked_evaluate(&self, inputs: &[f64]) -> Vec<f64> {
        inputs.to_vec()
    }
}

impl Transform for Constant {
    fn n_inputs(&self) -> usize {
        0
    }

    fn n_outputs(&self) -> usize {
        1
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn unchecked_evaluate(&self, _inputs: &[f64]) -> Vec<f64> {
        vec![self.value]
    }
}

#[derive(Debug)]
pub struct ShiftConverter;

impl Converter for ShiftConverter {
    fn tags(&self) -> &[&'static str] {
        &["tag:stsci.edu:asdf/transform/shift-*"]
    }

    fn native_types(&self) -> Vec<NativeType> {
        vec![NativeType::of::<Shift>()]
    }

    fn to_tree(
        &self,
        object: &dyn NativeObject,
        _ctx: &mut ConversionContext<'_>,
    ) -> AsdfResult<Node> {
        let shift = downcast::<Shift>(object)?;
        Ok(transform_map("shift", shift.name())
            .with("offset", shift.offset)
            .into())
    }

    fn from_tree(&self, node: &Node, _ctx: &mut ConversionContext<'_>) -> AsdfResult<ObjectRef> {
        let map = expect_map(node)?;
        Ok(Arc::new(Shift {
            offset: read_f64(map, "offset")?,
            name: read_label(map)?,
        }))
    }
}

#[derive(Debug)]
pub struct ScaleConverter;

impl Converter for ScaleConverter {
    fn tags(&self) -> &[&'static str] {
        &["tag:stsci.edu:asdf/transform/scale-*"]
    }

    fn native_types(&self) -> Vec<NativeType> {
        vec![NativeType::of::<Scale>()]
    }

    fn to_tree(
        &self,
        object: &dyn NativeObject,
        _ctx: &mut ConversionContext<'_>,
    ) -> AsdfResult<Node> {
        let scale = downcast::<Scale>(object)?;
        Ok(transform_map("scale", scale.name())
            .with("factor", scale.factor)
            .into())
    }

    fn from_tree(&self, node: &Node, _ctx: &mut ConversionContext<'_>) -> AsdfResult<ObjectRef> {
        let map = expect_map(node)?;
        Ok(Arc::new(Scale {
            factor: read_f64(map, "factor")?,
            name: read_label(map)?,
        }))
    }
}

#[derive(Debug)]
pub struct IdentityConverter;

impl Converter for IdentityConverter {
    fn tags(&self) -> &[&'static str] {
        &["tag:stsci.edu:asdf/transform/identity-*"]
    }

    fn native_types(&self) -> Vec<NativeType> {
        vec![NativeType::of::<Identity>()]
    }

    fn to_tree(
        &self,
        object: &dyn NativeObject,
        _ctx: &mut ConversionContext<'_>,
    ) -> AsdfResult<Node> {
        let identity = downcast::<Identity>(object)?;
        let map = transform_map("identity", identity.name());
        if identity.n_dims != 1 {
            map.insert("n_dims", usize_node(identity.n_dims)?);
        }
        Ok(map.into())
    }

    fn from_tree(&self, node: &Node, _ctx: &mut ConversionContext<'_>) -> AsdfResult<ObjectRef> {
        // `!transform/identity {}` is a one dimensional identity.
        let map = expect_map(node)?;
        Ok(Arc::new(Identity {
            n_dims: read_usize(map, "n_dims")?.unwrap_or(1),
            name: read_label(map)?,
        }))
    }
}

#[derive(Debug)]
pub struct ConstantConverter;

impl Converter for ConstantConverter {
    fn tags(&self) -> &[&'static str] {
        &["tag:stsci.edu:asdf/transform/constant-*"]
    }

    fn native_types(&self) -> Vec<NativeType> {
        vec![NativeType::of::<Constant>()]
    }

    fn to_tree(
        &self,
        object: &dyn NativeObject,
        _ctx: &mut ConversionContext<'_>,
    ) -> AsdfResult<Node> {
        let constant = downcast::<Constant>(object)?;
        Ok(transform_map("constant", constant.name())
            .with("value", constant.value)
            .into())
    }

    fn from_tree(&self, node: &Node, _ctx: &mut ConversionContext<'_>) -> AsdfResult<ObjectRef> {
        let map = expect_map(node)?;
        Ok(Arc::new(Constant {
            value: read_f64(map, "value")?,
            name: read_label(map)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use asdf_block::BlockPolicy;
    use asdf_types::Value;
    use asdf_types::test_harness::assert_roundtrip;
    use rstest::rstest;

    use super::*;
    use crate::TransformRef;

    #[rstest]
    #[case(Arc::new(Shift::new(2.0)), &[1.0], &[3.0])]
    #[case(Arc::new(Scale::new(-0.5)), &[4.0], &[-2.0])]
    #[case(Arc::new(Identity::new(3)), &[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0])]
    #[case(Arc::new(Constant::new(7.5)), &[], &[7.5])]
    fn evaluate(#[case] transform: TransformRef, #[case] inputs: &[f64], #[case] expected: &[f64]) {
        assert_eq!(transform.evaluate(inputs).unwrap(), expected);
    }

    #[test]
    fn wrong_input_count() {
        let shift: TransformRef = Arc::new(Shift::new(1.0));
        assert!(shift.evaluate(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn names_round_trip() {
        let registry = crate::registry().unwrap();
        for value in [
            Value::object(Shift::new(1.5).with_name("dx")),
            Value::object(Scale::new(3.0)),
            Value::object(Identity::new(2).with_name("pass")),
            Value::object(Constant::new(0.25)),
        ] {
            assert_roundtrip(&registry, &value, BlockPolicy::default());
        }
    }
}
