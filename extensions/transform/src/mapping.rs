use std::sync::Arc;

use asdf_error::{AsdfResult, asdf_bail, asdf_err};
use asdf_tree::{Node, TaggedSeq};
use asdf_types::{ConversionContext, Converter, NativeObject, NativeType, ObjectRef, native_object};
use itertools::Itertools;

use crate::tree::{downcast, expect_map, read_label, read_usize, transform_map, usize_node};
use crate::{CompoundModel, Constant, Identity, Operator, Transform, TransformRef, concatenate};

/// Tag of a constant entry in a `remap_axes` mapping.
pub const CONSTANT_ENTRY_TAG: &str = "tag:stsci.edu:asdf/core/constant-1.0.0";

/// Reorders, drops or duplicates its inputs: output `i` is input `mapping[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    mapping: Vec<usize>,
    n_inputs: usize,
    name: Option<String>,
}

impl Mapping {
    pub fn try_new(mapping: Vec<usize>, n_inputs: usize) -> AsdfResult<Self> {
        if let Some(out_of_range) = mapping.iter().find(|&&axis| axis >= n_inputs) {
            asdf_bail!(OutOfBounds: *out_of_range, 0, n_inputs);
        }
        Ok(Self {
            mapping,
            n_inputs,
            name: None,
        })
    }

    /// A mapping over as many inputs as its largest index needs.
    pub fn new(mapping: Vec<usize>) -> Self {
        let n_inputs = implied_inputs(&mapping);
        Self {
            mapping,
            n_inputs,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn mapping(&self) -> &[usize] {
        &self.mapping
    }
}

fn implied_inputs(axes: &[usize]) -> usize {
    axes.iter().max().map_or(0, |max| max + 1)
}

native_object!(Mapping);

impl Transform for Mapping {
    fn n_inputs(&self) -> usize {
        self.n_inputs
    }

    fn n_outputs(&self) -> usize {
        self.mapping.len()
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn unchecked_evaluate(&self, inputs: &[f64]) -> Vec<f64> {
        self.mapping.iter().map(|&axis| inputs[axis]).collect()
    }
}

/// One entry of a `remap_axes` mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Entry {
    Axis(usize),
    Constant(f64),
}

impl Entry {
    fn read(node: &Node) -> AsdfResult<Self> {
        let constant = node.tag().is_some_and(|tag| tag.as_str() == CONSTANT_ENTRY_TAG);
        match (node.as_i64(), node.as_f64()) {
            (Some(axis), _) if !constant => usize::try_from(axis)
                .map(Self::Axis)
                .map_err(|_| asdf_err!(Conversion: "mapping entry {axis} is negative")),
            (_, Some(value)) => Ok(Self::Constant(value)),
            _ => Err(asdf_err!(
                Conversion: "mapping entries are axes or constants, found a {}",
                node.json_type()
            )),
        }
    }
}

/// Reads and writes [`Mapping`] as `transform/remap_axes`.
///
/// On read, a mapping may mix axis indices with constants. Such a mapping becomes the identity
/// on the inputs concatenated with one [`Constant`] per constant entry, composed with a plain
/// mapping that picks from the combined outputs.
#[derive(Debug)]
pub struct RemapAxesConverter;

impl RemapAxesConverter {
    fn read_mapping(
        entries: &[Entry],
        n_inputs: Option<usize>,
        name: Option<String>,
    ) -> AsdfResult<ObjectRef> {
        let axes: Vec<usize> = entries
            .iter()
            .filter_map(|entry| match entry {
                Entry::Axis(axis) => Some(*axis),
                Entry::Constant(_) => None,
            })
            .collect();
        let n_inputs = n_inputs.unwrap_or_else(|| implied_inputs(&axes));

        if axes.len() == entries.len() {
            let mapping = Mapping::try_new(axes, n_inputs)?;
            return Ok(Arc::new(match name {
                Some(name) => mapping.with_name(name),
                None => mapping,
            }));
        }

        let mut transform: TransformRef = Arc::new(Identity::new(n_inputs));
        let mut next = n_inputs;
        let mut mapping = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry {
                Entry::Axis(axis) => mapping.push(*axis),
                Entry::Constant(value) => {
                    transform = concatenate(transform, Arc::new(Constant::new(*value)))?;
                    mapping.push(next);
                    next += 1;
                }
            }
        }
        log::debug!(
            "remap_axes with {} constant entries expanded over {} inputs",
            next - n_inputs,
            n_inputs
        );
        let model = CompoundModel::try_new(
            Operator::Compose,
            transform,
            Arc::new(Mapping::try_new(mapping, next)?),
        )?;
        Ok(Arc::new(match name {
            Some(name) => model.with_name(name),
            None => model,
        }))
    }
}

impl Converter for RemapAxesConverter {
    fn tags(&self) -> &[&'static str] {
        &["tag:stsci.edu:asdf/transform/remap_axes-*"]
    }

    fn native_types(&self) -> Vec<NativeType> {
        vec![NativeType::of::<Mapping>()]
    }

    fn to_tree(
        &self,
        object: &dyn NativeObject,
        _ctx: &mut ConversionContext<'_>,
    ) -> AsdfResult<Node> {
        let mapping = downcast::<Mapping>(object)?;
        let map = transform_map("remap_axes", mapping.name()).with(
            "mapping",
            mapping
                .mapping
                .iter()
                .map(|&axis| usize_node(axis))
                .collect::<AsdfResult<TaggedSeq>>()?,
        );
        if mapping.n_inputs != implied_inputs(&mapping.mapping) {
            map.insert("n_inputs", usize_node(mapping.n_inputs)?);
        }
        Ok(map.into())
    }

    fn from_tree(&self, node: &Node, _ctx: &mut ConversionContext<'_>) -> AsdfResult<ObjectRef> {
        let map = expect_map(node)?;
        let entries: Vec<Entry> = map
            .get("mapping")
            .and_then(|mapping| mapping.as_seq().map(TaggedSeq::items))
            .ok_or_else(|| asdf_err!(Conversion: "remap_axes needs a 'mapping' sequence"))?
            .iter()
            .map(Entry::read)
            .try_collect()?;

        Self::read_mapping(&entries, read_usize(map, "n_inputs")?, read_label(map)?)
    }
}
