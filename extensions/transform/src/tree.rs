use asdf_error::{AsdfResult, asdf_err};
use asdf_tree::{Node, TaggedMap};
use asdf_types::NativeObject;

use crate::{TRANSFORM_TAG_PREFIX, TRANSFORM_VERSION};

/// The tag written for the transform called `name`.
pub(crate) fn transform_tag(name: &str) -> String {
    format!("{TRANSFORM_TAG_PREFIX}{name}-{TRANSFORM_VERSION}")
}

/// A map tagged for the transform called `name`, holding the transform's own name if it has one.
pub(crate) fn transform_map(name: &str, label: Option<&str>) -> TaggedMap {
    let map = TaggedMap::tagged(transform_tag(name));
    if let Some(label) = label {
        map.insert("name", label);
    }
    map
}

pub(crate) fn expect_map(node: &Node) -> AsdfResult<&TaggedMap> {
    node.as_map().ok_or_else(|| {
        asdf_err!(
            Conversion: "{} must be a map, found a {}",
            node.effective_tag(),
            node.json_type()
        )
    })
}

pub(crate) fn read_label(map: &TaggedMap) -> AsdfResult<Option<String>> {
    map.get("name")
        .map(|name| {
            name.as_str()
                .ok_or_else(|| asdf_err!(Conversion: "transform name must be a string"))
        })
        .transpose()
}

pub(crate) fn read_f64(map: &TaggedMap, key: &str) -> AsdfResult<f64> {
    map.get(key)
        .and_then(|value| value.as_f64())
        .ok_or_else(|| asdf_err!(Conversion: "transform needs a numeric '{key}'"))
}

pub(crate) fn read_usize(map: &TaggedMap, key: &str) -> AsdfResult<Option<usize>> {
    map.get(key)
        .map(|value| {
            value
                .as_i64()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| asdf_err!(Conversion: "'{key}' must be a non-negative integer"))
        })
        .transpose()
}

pub(crate) fn downcast<T: NativeObject>(object: &dyn NativeObject) -> AsdfResult<&T> {
    object.downcast_ref::<T>().ok_or_else(|| {
        asdf_err!(
            Conversion: "expected a {}, found {:?}",
            std::any::type_name::<T>(),
            object
        )
    })
}

pub(crate) fn usize_node(n: usize) -> AsdfResult<Node> {
    i64::try_from(n)
        .map(Node::from)
        .map_err(|_| asdf_err!(Conversion: "{n} does not fit in a tree integer"))
}
