use std::sync::Arc;

use asdf_block::ArrayStorage;
use asdf_buffer::{ByteOrder, DataType, NDArray, PValue};
use asdf_error::{AsdfResult, asdf_bail, asdf_err};
use asdf_tree::{Node, Scalar, TaggedMap, TaggedSeq};

use crate::converter::NativeType;
use crate::{ConversionContext, Converter, NativeObject, ObjectRef};

pub const NDARRAY_TAG: &str = "tag:stsci.edu:asdf/core/ndarray-1.0.0";

/// Shape entry standing for the unknown length of a streamed array.
const STREAMED_DIM: &str = "*";

/// Reads and writes [`NDArray`]s as `core/ndarray` nodes.
///
/// Depending on the block manager's choice an array is written as a literal `data` list or as a
/// `source` index into the block area. `-1` refers to the streamed block, whose first dimension
/// is written as `*` and recomputed from the block's length on read.
#[derive(Debug, Default)]
pub struct NDArrayConverter;

impl Converter for NDArrayConverter {
    fn tags(&self) -> &[&'static str] {
        &[NDARRAY_TAG]
    }

    fn native_types(&self) -> Vec<NativeType> {
        vec![NativeType::of::<NDArray>()]
    }

    fn to_tree(
        &self,
        object: &dyn NativeObject,
        ctx: &mut ConversionContext<'_>,
    ) -> AsdfResult<Node> {
        let array = object
            .downcast_ref::<NDArray>()
            .ok_or_else(|| asdf_err!(Conversion: "{:?} is not an ndarray", object))?;
        let map = TaggedMap::tagged(NDARRAY_TAG);

        let storage = ctx.blocks().storage_for(array);
        if storage == ArrayStorage::Inline {
            map.insert("data", inline_data(array)?);
            map.insert("datatype", array.dtype().name());
            map.insert("shape", shape_node(array.shape(), false)?);
            return Ok(map.into());
        }

        let streamed = storage == ArrayStorage::Streamed;
        if streamed && !(array.covers_buffer() && array.ndim() > 0) {
            asdf_bail!(
                Conversion: "only an array covering its whole buffer can be streamed, got {:?}",
                array
            );
        }
        let source = ctx.blocks_mut().reserve_source(array.buffer(), storage)?;
        map.insert("source", source);
        map.insert("datatype", array.dtype().name());
        map.insert("byteorder", array.byte_order().name());
        map.insert("shape", shape_node(array.shape(), streamed)?);
        if array.offset() != 0 {
            map.insert("offset", int(array.offset())?);
        }
        if !array.is_contiguous() {
            map.insert(
                "strides",
                array
                    .strides()
                    .iter()
                    .map(|s| int(*s))
                    .collect::<AsdfResult<Vec<_>>>()?,
            );
        }
        Ok(map.into())
    }

    fn from_tree(&self, node: &Node, ctx: &mut ConversionContext<'_>) -> AsdfResult<ObjectRef> {
        let map = match node {
            Node::Seq(_) => return Ok(Arc::new(read_inline(node, None, None)?)),
            Node::Map(map) => map,
            Node::Scalar(_) => asdf_bail!(Conversion: "ndarray must be a map or a list"),
        };

        let datatype = map
            .get("datatype")
            .map(|node| {
                node.as_str()
                    .ok_or_else(|| asdf_err!(Conversion: "unsupported ndarray datatype {:?}", node))?
                    .parse::<DataType>()
            })
            .transpose()?;
        let shape = map.get("shape");

        if let Some(data) = map.get("data") {
            let shape = shape.map(|s| read_shape(&s, None)).transpose()?;
            return Ok(Arc::new(read_inline(&data, datatype, shape)?));
        }

        let source = map
            .get("source")
            .ok_or_else(|| asdf_err!(Conversion: "ndarray has neither source nor data"))?;
        let source = source.as_i64().ok_or_else(|| {
            asdf_err!(Conversion: "ndarray source {:?} is not a block index", source)
        })?;
        let buffer = ctx.blocks().buffer_for_source(source)?;
        let datatype =
            datatype.ok_or_else(|| asdf_err!(Conversion: "ndarray in a block needs a datatype"))?;
        let byte_order = match map.get("byteorder") {
            Some(order) => order
                .as_str()
                .ok_or_else(|| asdf_err!(Conversion: "byteorder must be a string"))?
                .parse::<ByteOrder>()?,
            None => ByteOrder::Little,
        };
        let offset = map
            .get("offset")
            .map(|offset| index(&offset))
            .transpose()?
            .unwrap_or(0);
        let strides = map
            .get("strides")
            .map(|strides| {
                strides
                    .as_seq()
                    .ok_or_else(|| asdf_err!(Conversion: "strides must be a list"))?
                    .items()
                    .iter()
                    .map(index)
                    .collect::<AsdfResult<Vec<_>>>()
            })
            .transpose()?;

        let shape = shape.ok_or_else(|| asdf_err!(Conversion: "ndarray in a block needs a shape"))?;
        let row_bytes = |rest: &[usize]| rest.iter().product::<usize>() * datatype.byte_width();
        let shape = read_shape(
            &shape,
            Some(&|rest: &[usize]| {
                let row = row_bytes(rest);
                if row == 0 {
                    0
                } else {
                    buffer.len().saturating_sub(offset) / row
                }
            }),
        )?;

        Ok(Arc::new(NDArray::try_new(
            buffer, datatype, byte_order, shape, offset, strides,
        )?))
    }
}

fn int(n: usize) -> AsdfResult<Node> {
    i64::try_from(n)
        .map(Node::from)
        .map_err(|_| asdf_err!(Conversion: "{} does not fit in the tree", n))
}

fn index(node: &Node) -> AsdfResult<usize> {
    node.as_i64()
        .and_then(|i| usize::try_from(i).ok())
        .ok_or_else(|| asdf_err!(Conversion: "expected a non-negative integer, got {:?}", node))
}

fn shape_node(shape: &[usize], streamed: bool) -> AsdfResult<Node> {
    let mut dims = shape.iter().map(|d| int(*d)).collect::<AsdfResult<Vec<_>>>()?;
    if streamed {
        if let Some(first) = dims.first_mut() {
            *first = Node::from(STREAMED_DIM);
        }
    }
    let seq = TaggedSeq::from_items(dims);
    Ok(seq.into())
}

type StreamedRows<'a> = &'a dyn Fn(&[usize]) -> usize;

/// Parse a shape. A leading `*` is only allowed when `streamed_rows` can compute it.
fn read_shape(node: &Node, streamed_rows: Option<StreamedRows<'_>>) -> AsdfResult<Vec<usize>> {
    let dims = node
        .as_seq()
        .ok_or_else(|| asdf_err!(Conversion: "shape must be a list, got {:?}", node))?
        .items();
    let mut shape = Vec::with_capacity(dims.len());
    for (i, dim) in dims.iter().enumerate() {
        match (i, dim.as_str().as_deref(), streamed_rows) {
            (0, Some(STREAMED_DIM), Some(_)) => shape.push(0),
            (_, Some(_), _) => asdf_bail!(Conversion: "unexpected shape entry {:?}", dim),
            _ => shape.push(index(dim)?),
        }
    }
    if let Some(rows) = streamed_rows {
        if dims.first().and_then(Node::as_str).as_deref() == Some(STREAMED_DIM) {
            let first = rows(&shape[1..]);
            shape[0] = first;
        }
    }
    Ok(shape)
}

fn pvalue_node(value: PValue) -> AsdfResult<Node> {
    Ok(match value {
        PValue::Bool(b) => Node::from(b),
        PValue::I64(i) => Node::from(i),
        PValue::U64(u) => Node::from(
            i64::try_from(u).map_err(|_| asdf_err!(Conversion: "{} does not fit in the tree", u))?,
        ),
        PValue::F64(f) => Node::from(f),
    })
}

/// The elements of `array` as nested lists following its shape.
fn inline_data(array: &NDArray) -> AsdfResult<Node> {
    let values = array
        .values()?
        .into_iter()
        .map(pvalue_node)
        .collect::<AsdfResult<Vec<_>>>()?;
    Ok(nest(&values, array.shape()))
}

fn nest(values: &[Node], shape: &[usize]) -> Node {
    match shape.split_first() {
        None => values.first().cloned().unwrap_or_else(Node::null),
        Some((dim, rest)) => {
            let chunk = rest.iter().product::<usize>();
            TaggedSeq::from_items(
                (0..*dim)
                    .map(|i| nest(&values[i * chunk..(i + 1) * chunk], rest))
                    .collect(),
            )
            .into()
        }
    }
}

/// Flatten nested lists, recording the shape and rejecting ragged input.
struct Flattener {
    shape: Vec<usize>,
    leaf_depth: Option<usize>,
    values: Vec<PValue>,
}

impl Flattener {
    fn visit(&mut self, node: &Node, depth: usize) -> AsdfResult<()> {
        match node {
            Node::Seq(seq) => {
                if self.leaf_depth.is_some_and(|leaf| depth >= leaf) {
                    asdf_bail!(Conversion: "ragged inline array data");
                }
                let items = seq.items();
                match self.shape.get(depth) {
                    Some(len) if *len != items.len() => {
                        asdf_bail!(Conversion: "ragged inline array data")
                    }
                    Some(_) => {}
                    None => self.shape.push(items.len()),
                }
                items.iter().try_for_each(|item| self.visit(item, depth + 1))
            }
            Node::Scalar(scalar) => {
                if *self.leaf_depth.get_or_insert(depth) != depth || self.shape.len() != depth {
                    asdf_bail!(Conversion: "ragged inline array data");
                }
                self.values.push(match scalar.value() {
                    Scalar::Bool(b) => PValue::Bool(b),
                    Scalar::Int(i) => PValue::I64(i),
                    Scalar::Float(f) => PValue::F64(f),
                    other => asdf_bail!(Conversion: "{} in inline array data", other),
                });
                Ok(())
            }
            Node::Map(_) => asdf_bail!(Conversion: "map in inline array data"),
        }
    }
}

fn read_inline(
    data: &Node,
    datatype: Option<DataType>,
    shape: Option<Vec<usize>>,
) -> AsdfResult<NDArray> {
    let mut flat = Flattener {
        shape: Vec::new(),
        leaf_depth: None,
        values: Vec::new(),
    };
    flat.visit(data, 0)?;

    if let Some(declared) = shape {
        if declared != flat.shape {
            asdf_bail!(
                Conversion: "inline data has shape {:?} but declares {:?}",
                flat.shape,
                declared
            );
        }
    }
    let datatype = datatype.unwrap_or_else(|| {
        if flat.values.iter().any(|v| matches!(v, PValue::F64(_))) {
            DataType::Float64
        } else if !flat.values.is_empty() && flat.values.iter().all(|v| matches!(v, PValue::Bool(_))) {
            DataType::Bool8
        } else if flat.values.is_empty() {
            DataType::Float64
        } else {
            DataType::Int64
        }
    });
    NDArray::from_values(datatype, ByteOrder::Little, flat.shape, &flat.values)
}

#[cfg(test)]
mod tests {
    use asdf_block::{BlockManager, BlockPolicy};
    use asdf_tree::tag_object;
    use rstest::rstest;

    use super::*;
    use crate::test_harness::{assert_roundtrip, roundtrip};
    use crate::{Registry, Value};

    fn inline_all() -> BlockPolicy {
        BlockPolicy::default().with_storage(Some(ArrayStorage::Inline))
    }

    #[rstest]
    #[case(BlockPolicy::default())]
    #[case(inline_all())]
    #[case(BlockPolicy::default().with_compression(asdf_block::Compression::BZIP2))]
    fn arrays_round_trip(#[case] policy: BlockPolicy) {
        let registry = Registry::core().unwrap();
        let values: Vec<Value> = vec![
            NDArray::from_vec((0..12).map(f64::from).collect(), vec![3, 4])
                .unwrap()
                .into(),
            NDArray::from_vec_with_order(vec![1u16, 2, 65535], vec![3], ByteOrder::Big)
                .unwrap()
                .into(),
            NDArray::from_vec(vec![true, false], vec![2]).unwrap().into(),
            NDArray::from_vec(vec![7i8], vec![]).unwrap().into(),
        ];
        assert_roundtrip(&registry, &Value::Seq(values), policy);
    }

    #[test]
    fn auto_inline_threshold() {
        let registry = Registry::core().unwrap();
        let policy = BlockPolicy::default().with_auto_inline(Some(64));
        for (len, inline) in [(64, true), (65, false)] {
            let array = NDArray::from_vec(vec![0f64; len], vec![len]).unwrap();
            let mut blocks = BlockManager::new(policy.clone());
            blocks.begin_write();
            let node = registry.to_tree(&array.into(), &mut blocks).unwrap();
            let map = node.as_map().unwrap();
            assert_eq!(map.contains_key("data"), inline);
            assert_eq!(map.contains_key("source"), !inline);
        }
    }

    #[test]
    fn views_alias_after_round_trip() {
        env_logger::builder().is_test(true).try_init().ok();
        let registry = Registry::core().unwrap();
        let base = NDArray::from_vec((0..10).map(f64::from).collect(), vec![10]).unwrap();
        let evens = base.slice(0, 0, 10, 2).unwrap();
        let tail = base.slice(0, 5, 10, 1).unwrap();
        let value = Value::Seq(vec![evens.into(), tail.into()]);

        let (back, blocks) = roundtrip(&registry, &value, BlockPolicy::default()).unwrap();
        assert_eq!(blocks.len(), 1);

        let Value::Seq(items) = back else {
            panic!("expected a sequence");
        };
        let evens = items[0].downcast_ref::<NDArray>().unwrap();
        let tail = items[1].downcast_ref::<NDArray>().unwrap();
        assert_eq!(evens.buffer().id(), tail.buffer().id());
        assert_eq!(evens.to_vec::<f64>().unwrap(), vec![0.0, 2.0, 4.0, 6.0, 8.0]);

        // Element 6 of the base is evens[3] and tail[1].
        evens.set(&[3], -1.0).unwrap();
        assert_eq!(tail.get(&[1]).unwrap(), PValue::F64(-1.0));
    }

    #[test]
    fn streamed_array_shape() {
        let registry = Registry::core().unwrap();
        let array = NDArray::from_vec((0..6).map(f64::from).collect(), vec![3, 2]).unwrap();
        let mut blocks = BlockManager::default();
        blocks.set_array_storage(&array, ArrayStorage::Streamed).unwrap();
        blocks.begin_write();

        let node = registry.to_tree(&array.clone().into(), &mut blocks).unwrap();
        let map = node.as_map().unwrap();
        assert_eq!(map.get("source").unwrap().as_i64(), Some(-1));
        let shape = map.get("shape").unwrap();
        assert_eq!(shape.as_seq().unwrap().get(0).unwrap().as_str().as_deref(), Some("*"));

        let policy = BlockPolicy::default().with_storage(Some(ArrayStorage::Streamed));
        let (back, _) = roundtrip(&registry, &array.clone().into(), policy).unwrap();
        assert_eq!(back.downcast_ref::<NDArray>().unwrap(), &array);
    }

    #[test]
    fn streamed_view_is_rejected() {
        let registry = Registry::core().unwrap();
        let base = NDArray::from_vec((0..6).map(f64::from).collect(), vec![6]).unwrap();
        let view = base.slice(0, 1, 6, 1).unwrap();
        let mut blocks = BlockManager::new(
            BlockPolicy::default().with_storage(Some(ArrayStorage::Streamed)),
        );
        blocks.begin_write();
        assert!(registry.to_tree(&view.into(), &mut blocks).is_err());
    }

    #[test]
    fn bare_inline_lists() {
        let registry = Registry::core().unwrap();
        let node = tag_object(
            NDARRAY_TAG,
            Node::from(vec![
                Node::from(vec![Node::from(1i64), Node::from(2i64)]),
                Node::from(vec![Node::from(3i64), Node::from(4i64)]),
            ]),
        )
        .unwrap();
        let mut blocks = BlockManager::default();
        let value = registry.from_tree(&node, &mut blocks).unwrap();
        let array = value.downcast_ref::<NDArray>().unwrap();
        assert_eq!(array.dtype(), DataType::Int64);
        assert_eq!(array.shape(), &[2, 2]);
        assert_eq!(array.to_vec::<i64>().unwrap(), vec![1, 2, 3, 4]);
    }

    #[rstest]
    #[case(vec![Node::from(1i64), Node::from(vec![Node::from(2i64)])])]
    #[case(vec![Node::from(vec![Node::from(2i64)]), Node::from(1i64)])]
    #[case(vec![Node::from(vec![Node::from(1i64)]), Node::from(vec![Node::from(1i64), Node::from(2i64)])])]
    #[case(vec![Node::from("a")])]
    fn ragged_or_non_numeric_inline_data(#[case] items: Vec<Node>) {
        let registry = Registry::core().unwrap();
        let node = tag_object(NDARRAY_TAG, Node::from(items)).unwrap();
        let mut blocks = BlockManager::default();
        assert!(registry.from_tree(&node, &mut blocks).is_err());
    }

    #[test]
    fn missing_block_is_a_consistency_error() {
        let registry = Registry::core().unwrap();
        let node = tag_object(
            NDARRAY_TAG,
            TaggedMap::new()
                .with("source", 3i64)
                .with("datatype", "float64")
                .with("shape", Node::from(vec![Node::from(2i64)])),
        )
        .unwrap();
        let mut blocks = BlockManager::default();
        let err = registry.from_tree(&node, &mut blocks).unwrap_err();
        assert!(err.is_block_consistency());
    }
}
