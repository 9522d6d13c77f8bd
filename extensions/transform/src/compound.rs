use std::any::Any;
use std::sync::Arc;

use asdf_error::{AsdfResult, ResultExt, asdf_bail, asdf_err};
use asdf_tree::{Node, TaggedSeq};
use asdf_types::{ConversionContext, Converter, NativeObject, NativeType, ObjectRef, Registry};

use crate::tree::{downcast, expect_map, read_label, transform_map};
use crate::{Operator, TRANSFORM_TAG_PREFIX, Transform, TransformRef, as_transform};

/// Two transforms combined by an [`Operator`].
#[derive(Debug, Clone)]
pub struct CompoundModel {
    op: Operator,
    left: TransformRef,
    right: TransformRef,
    n_inputs: usize,
    n_outputs: usize,
    name: Option<String>,
}

impl CompoundModel {
    pub fn try_new(op: Operator, left: TransformRef, right: TransformRef) -> AsdfResult<Self> {
        let (n_inputs, n_outputs) = op.arity(left.as_ref(), right.as_ref())?;
        Ok(Self {
            op,
            left,
            right,
            n_inputs,
            n_outputs,
            name: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn op(&self) -> Operator {
        self.op
    }

    pub fn left(&self) -> &TransformRef {
        &self.left
    }

    pub fn right(&self) -> &TransformRef {
        &self.right
    }
}

impl NativeObject for CompoundModel {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    /// Compound models have no structural equality of their own; two handles are equal when
    /// they are the same model. [`CompoundConverter::assert_equal`] compares structure.
    fn equals(&self, other: &dyn NativeObject) -> bool {
        std::ptr::addr_eq(self, other)
    }
}

impl Transform for CompoundModel {
    fn n_inputs(&self) -> usize {
        self.n_inputs
    }

    fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn unchecked_evaluate(&self, inputs: &[f64]) -> Vec<f64> {
        self.op.evaluate(&self.left, &self.right, inputs)
    }
}

fn combine(op: Operator, left: TransformRef, right: TransformRef) -> AsdfResult<TransformRef> {
    Ok(Arc::new(CompoundModel::try_new(op, left, right)?))
}

/// `left + right`
pub fn add(left: TransformRef, right: TransformRef) -> AsdfResult<TransformRef> {
    combine(Operator::Add, left, right)
}

/// `left - right`
pub fn subtract(left: TransformRef, right: TransformRef) -> AsdfResult<TransformRef> {
    combine(Operator::Subtract, left, right)
}

/// `left * right`
pub fn multiply(left: TransformRef, right: TransformRef) -> AsdfResult<TransformRef> {
    combine(Operator::Multiply, left, right)
}

/// `left / right`
pub fn divide(left: TransformRef, right: TransformRef) -> AsdfResult<TransformRef> {
    combine(Operator::Divide, left, right)
}

/// `left ** right`
pub fn power(left: TransformRef, right: TransformRef) -> AsdfResult<TransformRef> {
    combine(Operator::Power, left, right)
}

/// `left | right`: evaluate `left`, then feed its outputs to `right`.
pub fn compose(left: TransformRef, right: TransformRef) -> AsdfResult<TransformRef> {
    combine(Operator::Compose, left, right)
}

/// `left & right`: evaluate both side by side on disjoint inputs.
pub fn concatenate(left: TransformRef, right: TransformRef) -> AsdfResult<TransformRef> {
    combine(Operator::Concatenate, left, right)
}

/// Reads and writes every [`Operator`] tag.
///
/// A compound model becomes a map tagged with its operator holding a `forward` pair. Each
/// operand goes back through the registry, so nested compounds recurse through this converter
/// and leaves use their own.
#[derive(Debug)]
pub struct CompoundConverter;

impl Converter for CompoundConverter {
    fn tags(&self) -> &[&'static str] {
        &[
            "tag:stsci.edu:asdf/transform/add-*",
            "tag:stsci.edu:asdf/transform/subtract-*",
            "tag:stsci.edu:asdf/transform/multiply-*",
            "tag:stsci.edu:asdf/transform/divide-*",
            "tag:stsci.edu:asdf/transform/power-*",
            "tag:stsci.edu:asdf/transform/compose-*",
            "tag:stsci.edu:asdf/transform/concatenate-*",
        ]
    }

    fn native_types(&self) -> Vec<NativeType> {
        vec![NativeType::of::<CompoundModel>()]
    }

    fn to_tree(
        &self,
        object: &dyn NativeObject,
        ctx: &mut ConversionContext<'_>,
    ) -> AsdfResult<Node> {
        let model = downcast::<CompoundModel>(object)?;
        let forward = TaggedSeq::from_items(vec![
            ctx.object_to_tree(model.left.as_ref())?,
            ctx.object_to_tree(model.right.as_ref())?,
        ]);
        Ok(transform_map(model.op.tag_name(), model.name())
            .with("forward", forward)
            .into())
    }

    fn from_tree(&self, node: &Node, ctx: &mut ConversionContext<'_>) -> AsdfResult<ObjectRef> {
        let tag = node.effective_tag();
        let op = tag
            .as_str()
            .strip_prefix(TRANSFORM_TAG_PREFIX)
            .and_then(|_| Operator::from_tag_name(tag.short_name()))
            .ok_or_else(|| asdf_err!(Conversion: "{tag} is not a compound transform"))?;

        let map = expect_map(node)?;
        let forward = map
            .get("forward")
            .and_then(|forward| forward.as_seq().map(TaggedSeq::items))
            .ok_or_else(|| asdf_err!(Conversion: "{tag} needs a 'forward' sequence"))?;
        let [left, right] = forward.as_slice() else {
            asdf_bail!(
                Conversion: "{tag} combines exactly two transforms, found {}",
                forward.len()
            );
        };

        let left = as_transform(&ctx.object_from_tree(left)?)?;
        let right = as_transform(&ctx.object_from_tree(right)?)?;
        log::trace!(
            "reading {} -> {} {op} {} -> {}",
            left.n_inputs(),
            left.n_outputs(),
            right.n_inputs(),
            right.n_outputs()
        );
        let model =
            CompoundModel::try_new(op, left, right).with_context(|| format!("reading {tag}"))?;
        Ok(Arc::new(match read_label(map)? {
            Some(name) => model.with_name(name),
            None => model,
        }))
    }

    fn assert_equal(
        &self,
        a: &dyn NativeObject,
        b: &dyn NativeObject,
        registry: &Registry,
    ) -> AsdfResult<()> {
        let (a, b) = (downcast::<CompoundModel>(a)?, downcast::<CompoundModel>(b)?);
        if a.op != b.op {
            asdf_bail!("compound operators differ: '{}' and '{}'", a.op, b.op);
        }
        if a.name != b.name {
            asdf_bail!(
                "compound names differ: '{}' and '{}'",
                a.name.as_deref().unwrap_or_default(),
                b.name.as_deref().unwrap_or_default()
            );
        }
        registry.assert_equal(a.left.as_ref(), b.left.as_ref())?;
        registry.assert_equal(a.right.as_ref(), b.right.as_ref())
    }
}
