use std::sync::Arc;

use asdf_block::{BlockManager, BlockPolicy};
use asdf_error::AsdfError;
use asdf_schema::{ValidationContext, check_schema, validate};
use asdf_tree::{Node, TaggedMap, TaggedSeq};
use asdf_types::test_harness::{assert_roundtrip, roundtrip};
use asdf_types::{Registry, Value};

use crate::*;

fn validation_context() -> ValidationContext {
    ValidationContext::default().with_embedded_schemas(TRANSFORM_SCHEMAS)
}

fn tag_of(node: &Node) -> String {
    node.tag().unwrap().as_str().to_string()
}

fn forward(node: &Node) -> Vec<Node> {
    node.as_map()
        .unwrap()
        .get("forward")
        .unwrap()
        .as_seq()
        .unwrap()
        .items()
}

/// `(shift + scale) | shift`
fn sum_then_shift() -> TransformRef {
    let sum = add(Arc::new(Shift::new(1.0)), Arc::new(Scale::new(2.0))).unwrap();
    compose(sum, Arc::new(Shift::new(-3.0).with_name("recentre"))).unwrap()
}

#[test]
fn compound_writes_nested_forward_pairs() {
    let registry = registry().unwrap();
    let model: ObjectRef = sum_then_shift();

    let node = registry
        .to_tree(&Value::Object(model), &mut BlockManager::default())
        .unwrap();
    assert_eq!(tag_of(&node), "tag:stsci.edu:asdf/transform/compose-1.0.0");

    let [sum, shift] = forward(&node).try_into().unwrap();
    assert_eq!(tag_of(&sum), "tag:stsci.edu:asdf/transform/add-1.0.0");
    assert_eq!(tag_of(&shift), "tag:stsci.edu:asdf/transform/shift-1.0.0");
    assert_eq!(
        shift.as_map().unwrap().get("name").unwrap().as_str().as_deref(),
        Some("recentre")
    );

    let [a, b] = forward(&sum).try_into().unwrap();
    assert_eq!(tag_of(&a), "tag:stsci.edu:asdf/transform/shift-1.0.0");
    assert_eq!(tag_of(&b), "tag:stsci.edu:asdf/transform/scale-1.0.0");
}

#[test]
fn compound_round_trips_structurally() {
    env_logger::builder().is_test(true).try_init().ok();
    let registry = registry().unwrap();
    let model: ObjectRef = sum_then_shift();
    let value = Value::Object(model);

    assert_roundtrip(&registry, &value, BlockPolicy::default());

    let (back, _) = roundtrip(&registry, &value, BlockPolicy::default()).unwrap();
    // A fresh model is a different object, only structurally equal.
    assert_ne!(back, value);
    let transform = as_transform(back.as_object().unwrap()).unwrap();
    // (x + 1 + 2x) - 3
    assert_eq!(transform.evaluate(&[2.0]).unwrap(), vec![4.0]);
}

#[test]
fn structural_comparison_sees_differences() {
    let registry = registry().unwrap();
    let one: ObjectRef = sum_then_shift();
    let other: ObjectRef = compose(
        subtract(Arc::new(Shift::new(1.0)), Arc::new(Scale::new(2.0))).unwrap(),
        Arc::new(Shift::new(-3.0).with_name("recentre")),
    )
    .unwrap();
    let renamed: ObjectRef = compose(
        add(Arc::new(Shift::new(1.0)), Arc::new(Scale::new(2.0))).unwrap(),
        Arc::new(Shift::new(-3.0)),
    )
    .unwrap();

    assert!(registry.assert_equal(one.as_ref(), sum_then_shift().as_ref()).is_ok());
    assert!(registry.assert_equal(one.as_ref(), other.as_ref()).is_err());
    assert!(registry.assert_equal(one.as_ref(), renamed.as_ref()).is_err());
}

#[test]
fn every_operator_round_trips() {
    let registry = registry().unwrap();
    for op in Operator::ALL {
        let model = CompoundModel::try_new(
            op,
            Arc::new(Scale::new(2.0)),
            Arc::new(Shift::new(0.5)),
        )
        .unwrap();
        assert_roundtrip(&registry, &Value::object(model), BlockPolicy::default());
    }
}

#[test]
fn operators_evaluate() {
    let x: TransformRef = Arc::new(Identity::new(1));
    let two: TransformRef = Arc::new(Scale::new(2.0));
    let cases = [
        (add(x.clone(), two.clone()), vec![3.0], vec![9.0]),
        (subtract(x.clone(), two.clone()), vec![3.0], vec![-3.0]),
        (multiply(x.clone(), two.clone()), vec![3.0], vec![18.0]),
        (divide(x.clone(), two.clone()), vec![3.0], vec![0.5]),
        (power(x.clone(), two.clone()), vec![3.0], vec![729.0]),
        (compose(two.clone(), two.clone()), vec![3.0], vec![12.0]),
        (concatenate(x, two), vec![3.0, 4.0], vec![3.0, 8.0]),
    ];
    for (model, inputs, expected) in cases {
        assert_eq!(model.unwrap().evaluate(&inputs).unwrap(), expected);
    }
}

#[test]
fn mismatched_operands_are_rejected() {
    let pair: TransformRef = Arc::new(Identity::new(2));
    let single: TransformRef = Arc::new(Shift::new(1.0));
    assert!(add(pair.clone(), single.clone()).is_err());
    assert!(compose(pair.clone(), single.clone()).is_err());
    assert_eq!(concatenate(pair, single).unwrap().n_inputs(), 3);
}

#[test]
fn non_transform_operand_is_a_conversion_error() {
    let registry = registry().unwrap();
    let node: Node = TaggedMap::tagged("tag:stsci.edu:asdf/transform/add-1.0.0")
        .with(
            "forward",
            TaggedSeq::from_items(vec![
                TaggedMap::tagged("tag:stsci.edu:asdf/transform/shift-1.0.0")
                    .with("offset", 1.0)
                    .into(),
                TaggedSeq::from_items(vec![Node::from(1i64), Node::from(2i64)])
                    .into(),
            ]),
        )
        .into();
    let err = registry
        .from_tree(&node, &mut BlockManager::default())
        .unwrap_err();
    assert!(matches!(err.root(), AsdfError::Conversion(..)), "{err}");
}

#[test]
fn ndarray_operand_is_not_a_transform() {
    let registry = registry().unwrap();
    let node: Node = TaggedMap::tagged("tag:stsci.edu:asdf/transform/compose-1.0.0")
        .with(
            "forward",
            TaggedSeq::from_items(vec![
                asdf_tree::tag_object(
                    "tag:stsci.edu:asdf/core/ndarray-1.0.0",
                    Node::from(vec![Node::from(1i64)]),
                )
                .unwrap(),
                TaggedMap::tagged("tag:stsci.edu:asdf/transform/scale-1.0.0")
                    .with("factor", 2.0)
                    .into(),
            ]),
        )
        .into();
    let err = registry
        .from_tree(&node, &mut BlockManager::default())
        .unwrap_err();
    assert!(matches!(err.root(), AsdfError::Conversion(..)), "{err}");
}

#[test]
fn forward_needs_two_operands() {
    let registry = registry().unwrap();
    let node: Node = TaggedMap::tagged("tag:stsci.edu:asdf/transform/add-1.0.0")
        .with(
            "forward",
            TaggedSeq::from_items(vec![
                TaggedMap::tagged("tag:stsci.edu:asdf/transform/shift-1.0.0")
                    .with("offset", 1.0)
                    .into(),
            ]),
        )
        .into();
    assert!(
        registry
            .from_tree(&node, &mut BlockManager::default())
            .is_err()
    );
}

#[test]
fn written_compounds_validate() {
    let registry = registry().unwrap();
    let model: ObjectRef = concatenate(
        sum_then_shift(),
        Arc::new(Mapping::try_new(vec![0, 0], 1).unwrap()),
    )
    .unwrap();
    let node = registry
        .to_tree(&Value::Object(model), &mut BlockManager::default())
        .unwrap();
    validate(&node, &validation_context()).unwrap();
}

#[test]
fn invalid_transform_fails_validation() {
    let node: Node = TaggedMap::tagged("tag:stsci.edu:asdf/transform/shift-1.0.0")
        .with("offset", "far")
        .into();
    let err = validate(&node, &validation_context()).unwrap_err();
    assert!(matches!(err.root(), AsdfError::Validation(..)), "{err}");
}

#[test]
fn transform_schemas_are_valid() {
    let ctx = validation_context();
    for (url, _) in TRANSFORM_SCHEMAS {
        let schema = ctx.load_schema(url).unwrap();
        check_schema(&schema, &ctx).unwrap();
    }
}

#[test]
fn converters_do_not_overlap_with_core() {
    let registry = registry().unwrap();
    assert_eq!(
        registry.converters().count(),
        Registry::core().unwrap().converters().count() + converters().len()
    );
    for op in Operator::ALL {
        let tag = format!("{TRANSFORM_TAG_PREFIX}{}-{TRANSFORM_VERSION}", op.tag_name());
        assert!(registry.converter_for_tag(&tag).is_some(), "{tag}");
    }
}
