use asdf_error::{AsdfError, AsdfResult};
use asdf_tree::{FlowStyle, Node, ScalarStyle, TaggedMap, TaggedSeq, tag_object};
use rstest::rstest;
use serde_json::{Value, json};
use url::Url;

use crate::*;

const POINT_TAG: &str = "tag:example.org:tests/point-1.0.0";
const POINT_URL: &str = "http://example.org/schemas/tests/point-1.0.0";
const POINT_SCHEMA: &str = r##"{
    "$schema": "http://stsci.edu/schemas/yaml-schema/draft-01",
    "id": "http://example.org/schemas/tests/point-1.0.0",
    "tag": "tag:example.org:tests/point-1.0.0",
    "type": "object",
    "properties": {
        "x": { "type": "number" },
        "y": { "type": "number", "default": 0 },
        "label": { "type": "string", "style": "literal" },
        "unit": { "tag": "tag:example.org:units/*" },
        "meta": {
            "type": "object",
            "default": {},
            "properties": {
                "origin": { "type": "string", "default": "lab" }
            }
        },
        "next": { "$ref": "#" }
    },
    "required": [ "x" ],
    "propertyOrder": [ "x", "y", "label" ],
    "flowStyle": "flow"
}"##;

fn ctx() -> ValidationContext {
    ValidationContext::default()
        .with_tag_resolver(
            TagResolver::default()
                .with_prefix("tag:example.org:tests/", "http://example.org/schemas/tests/"),
        )
        .with_embedded_schema(POINT_URL, POINT_SCHEMA)
}

fn point(entries: TaggedMap) -> Node {
    tag_object(POINT_TAG, entries).unwrap()
}

fn errors(tree: &Node) -> Vec<ValidationError> {
    let ctx = ctx();
    iter_errors(tree, &ctx)
        .unwrap()
        .collect::<AsdfResult<Vec<_>>>()
        .unwrap()
}

#[test]
fn valid_tree_passes() {
    env_logger::builder().is_test(true).try_init().ok();
    let tree = point(TaggedMap::new().with("x", 1.5).with("y", 2i64));
    validate(&tree, &ctx()).unwrap();
}

#[test]
fn errors_name_path_expected_and_actual() {
    let unit = tag_object("tag:example.org:other/thing-1.0.0", Node::from("m")).unwrap();
    let tree = point(TaggedMap::new().with("x", "far").with("unit", unit));

    let errors = errors(&tree);
    assert_eq!(errors.len(), 2);

    assert_eq!(errors[0].path.to_string(), "/x");
    assert_eq!(errors[0].keyword, "type");

    assert_eq!(errors[1].path.to_string(), "/unit");
    assert_eq!(errors[1].keyword, "tag");
    assert_eq!(errors[1].expected, "tag:example.org:units/*");
    assert!(errors[1].message.contains("tag:example.org:other/thing-1.0.0"));
}

#[test]
fn strict_mode_stops_at_first_error() {
    let tree: Node = TaggedSeq::from_items(vec![
        point(TaggedMap::new()),
        point(TaggedMap::new()),
        point(TaggedMap::new()),
    ])
    .into();

    assert_eq!(errors(&tree).len(), 3);

    let ctx = ctx();
    let first = iter_errors(&tree, &ctx).unwrap().next().unwrap().unwrap();
    assert_eq!(first.path.to_string(), "/0");
    assert_eq!(first.keyword, "required");

    let err = validate(&tree, &ctx).unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn cyclic_tree_terminates_without_errors() {
    let map = TaggedMap::new().with("x", 1i64);
    let tree = point(map.clone());
    map.insert("next", tree.clone());
    map.insert("loop", TaggedSeq::from_items(vec![tree.clone()]));

    assert!(errors(&tree).is_empty());
}

#[test]
fn external_references_are_skipped() {
    let reference = point(TaggedMap::new().with("$ref", "other.asdf#/tree"));
    let tree: Node = TaggedMap::new().with("ref", reference).into();
    assert!(errors(&tree).is_empty());
}

#[test]
fn external_references_under_a_property_are_left_alone() {
    let ctx = ctx();
    let reference = TaggedMap::new().with("$ref", "other.asdf#/tree");
    let tree = point(TaggedMap::new().with("x", 1i64).with("next", reference.clone()));

    assert!(errors(&tree).is_empty());

    fill_defaults(&tree, &ctx).unwrap();
    assert_eq!(reference.keys(), vec!["$ref"]);
    assert!(tree.as_map().unwrap().contains_key("meta"));

    reference.insert("y", 0i64);
    remove_defaults(&tree, &ctx).unwrap();
    assert_eq!(reference.keys(), vec!["$ref", "y"]);
}

#[test]
fn unloadable_schema_aborts_walk() {
    let missing = tag_object(
        "tag:example.org:tests/missing-1.0.0",
        TaggedMap::new(),
    )
    .unwrap();
    let tree: Node = TaggedSeq::from_items(vec![missing, point(TaggedMap::new())]).into();

    let ctx = ctx();
    let mut iter = iter_errors(&tree, &ctx).unwrap();
    assert!(matches!(iter.next(), Some(Err(AsdfError::SchemaLoad(..)))));
    assert!(iter.next().is_none());
}

#[test]
fn hints_are_recorded() {
    let map = TaggedMap::new().with("label", "a\nb").with("x", 1i64);
    let tree = point(map.clone());
    validate(&tree, &ctx()).unwrap();

    assert_eq!(map.flow_style(), Some(FlowStyle::Flow));
    assert_eq!(
        map.property_order().unwrap(),
        vec!["x".to_string(), "y".into(), "label".into()]
    );
    let Some(Node::Scalar(label)) = map.get("label") else {
        panic!("label is a scalar");
    };
    assert_eq!(label.style(), Some(ScalarStyle::Literal));
}

#[test]
fn defaults_fill_at_every_level() {
    let inner = TaggedMap::new().with("x", 1i64);
    let tree: Node = TaggedMap::new().with("p", point(inner.clone())).into();
    fill_defaults(&tree, &ctx()).unwrap();

    assert_eq!(inner.get("y").unwrap().as_i64(), Some(0));
    let meta = inner.get("meta").unwrap();
    assert_eq!(
        meta.as_map().unwrap().get("origin").unwrap().as_str().as_deref(),
        Some("lab")
    );
}

#[test]
fn remove_defaults_undoes_fill_defaults() {
    let ctx = ctx();
    let original = point(
        TaggedMap::new()
            .with("x", 3i64)
            .with("y", 0i64)
            .with("label", "kept"),
    );

    let stripped = original.deep_copy();
    remove_defaults(&stripped, &ctx).unwrap();

    let round_trip = original.deep_copy();
    fill_defaults(&round_trip, &ctx).unwrap();
    assert!(round_trip.as_map().unwrap().contains_key("meta"));
    remove_defaults(&round_trip, &ctx).unwrap();

    assert_eq!(round_trip, stripped);
    assert_eq!(stripped.as_map().unwrap().keys(), vec!["x", "label"]);
}

#[test]
fn core_ndarray_schema() {
    let ctx = ValidationContext::default();
    let ndarray = |datatype: &str| {
        tag_object(
            "tag:stsci.edu:asdf/core/ndarray-1.0.0",
            TaggedMap::new()
                .with("data", Node::from_json(&json!([1, 2, 3])))
                .with("datatype", datatype)
                .with("shape", Node::from_json(&json!([3]))),
        )
        .unwrap()
    };

    validate(&ndarray("float64"), &ctx).unwrap();

    let errors = iter_errors(&ndarray("complex512"), &ctx)
        .unwrap()
        .collect::<AsdfResult<Vec<_>>>()
        .unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path.to_string(), "/datatype");
    assert_eq!(errors[0].keyword, "enum");
}

#[test]
fn validate_against_explicit_schema() {
    let tree: Node = TaggedMap::new().with("x", 1i64).into();
    assert!(validate_against(&tree, POINT_URL, &ctx()).unwrap().is_empty());

    let errors = iter_errors(&Node::from(TaggedMap::new()), &ctx())
        .unwrap()
        .with_root_schema(POINT_URL)
        .collect::<AsdfResult<Vec<_>>>()
        .unwrap();
    assert_eq!(errors.len(), 1);
}

#[rstest]
#[case(r#"{"type": "integer"}"#, "1", true)]
#[case(r#"{"type": "integer"}"#, "1.5", false)]
#[case(r#"{"type": "number"}"#, "1", true)]
#[case(r#"{"type": ["string", "null"]}"#, "null", true)]
#[case(r#"{"enum": [1, "a"]}"#, r#""a""#, true)]
#[case(r#"{"enum": [1, "a"]}"#, r#""b""#, false)]
#[case(r#"{"required": ["a"]}"#, "{}", false)]
#[case(r#"{"properties": {"a": {"type": "string"}}, "additionalProperties": false}"#, r#"{"a": "x", "b": 1}"#, false)]
#[case(r#"{"patternProperties": {"^x_": {"type": "integer"}}, "additionalProperties": false}"#, r#"{"x_1": 1}"#, true)]
#[case(r#"{"patternProperties": {"^x_": {"type": "integer"}}}"#, r#"{"x_1": "no"}"#, false)]
#[case(r#"{"dependencies": {"a": ["b"]}}"#, r#"{"a": 1}"#, false)]
#[case(r#"{"dependencies": {"a": {"required": ["c"]}}}"#, r#"{"a": 1, "c": 2}"#, true)]
#[case(r#"{"items": {"type": "integer"}}"#, r#"[1, 2, "x"]"#, false)]
#[case(r#"{"items": [{"type": "integer"}], "additionalItems": false}"#, "[1, 2]", false)]
#[case(r#"{"items": [{"type": "integer"}], "additionalItems": {"type": "string"}}"#, r#"[1, "a"]"#, true)]
#[case(r#"{"minItems": 2, "maxItems": 3}"#, "[1]", false)]
#[case(r#"{"minItems": 2, "maxItems": 3}"#, "[1, 2]", true)]
#[case(r#"{"uniqueItems": true}"#, "[1, 2, 1]", false)]
#[case(r#"{"minLength": 2, "maxLength": 3}"#, r#""abcd""#, false)]
#[case(r#"{"pattern": "^a+$"}"#, r#""aaa""#, true)]
#[case(r#"{"minimum": 0, "exclusiveMinimum": true}"#, "0", false)]
#[case(r#"{"maximum": 10}"#, "10", true)]
#[case(r#"{"multipleOf": 0.5}"#, "1.5", true)]
#[case(r#"{"multipleOf": 3}"#, "7", false)]
#[case(r#"{"minProperties": 1}"#, "{}", false)]
#[case(r#"{"allOf": [{"type": "integer"}, {"minimum": 5}]}"#, "3", false)]
#[case(r#"{"anyOf": [{"type": "string"}, {"minimum": 5}]}"#, "3", false)]
#[case(r#"{"anyOf": [{"type": "string"}, {"minimum": 5}]}"#, r#""x""#, true)]
#[case(r#"{"oneOf": [{"type": "integer"}, {"minimum": 0}]}"#, "3", false)]
#[case(r#"{"not": {"type": "string"}}"#, r#""x""#, false)]
#[case(r#"{"properties": {"t": {"tag": "tag:yaml.org,2002:str"}}}"#, r#"{"t": "x"}"#, true)]
#[case(r#"{"properties": {"t": {"tag": "tag:yaml.org,2002:str"}}}"#, r#"{"t": 1}"#, false)]
#[case(r#"{"tag": "tag:example.org:never"}"#, "1", true)]
#[case(r##"{"definitions": {"n": {"type": "integer"}}, "items": {"$ref": "#/definitions/n"}}"##, "[1, 2.5]", false)]
fn draft4_keywords(#[case] schema: &str, #[case] instance: &str, #[case] valid: bool) {
    let schema: Value = serde_json::from_str(schema).unwrap();
    let instance: Value = serde_json::from_str(instance).unwrap();
    let base = Url::parse("http://example.org/schemas/tests/inline").unwrap();

    let errors = Validator::for_keywords(KeywordSet::Yaml)
        .unwrap()
        .validate_with_schema(
            &Node::from_json(&instance),
            &schema,
            &base,
            &ctx(),
            &InstancePath::root(),
        )
        .unwrap();
    assert_eq!(errors.is_empty(), valid, "{errors:?}");
}

#[test]
fn core_schemas_are_valid() {
    let ctx = ValidationContext::default();
    for (url, _) in CORE_SCHEMAS {
        let schema = ctx.load_schema(url).unwrap();
        check_schema(&schema, &ctx).unwrap();
    }
    check_schema(&serde_json::from_str(POINT_SCHEMA).unwrap(), &self::ctx()).unwrap();
}

#[rstest]
#[case(json!({"type": 5}))]
#[case(json!({"minLength": -1}))]
#[case(json!({"properties": {"n": {"type": "integer", "default": "x"}}}))]
#[case(json!({"items": [{"enum": [1, 2], "default": 3}]}))]
fn invalid_schemas_are_rejected(#[case] schema: Value) {
    let err = check_schema(&schema, &ValidationContext::default()).unwrap_err();
    assert!(err.is_validation(), "{err}");
}
