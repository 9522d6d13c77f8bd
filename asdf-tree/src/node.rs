use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use asdf_error::{AsdfError, AsdfResult, asdf_bail, asdf_err};
use indexmap::IndexMap;
use itertools::Itertools;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::Tag;

/// A primitive value held by a [`TaggedScalar`].
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// The null value.
    Null,
    /// A boolean.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A float.
    Float(f64),
    /// A text string.
    Str(String),
    /// A byte string.
    Bytes(Vec<u8>),
}

impl Scalar {
    /// The name of the YAML core type for this value.
    pub const fn yaml_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Bytes(_) => "binary",
        }
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "\"{}\"", s.escape_debug()),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// Whether a container is written expanded over several lines or compactly on one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowStyle {
    /// One entry per line.
    Block,
    /// All entries on one line.
    Flow,
}

/// How a string scalar is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarStyle {
    /// Plain or quoted on the same line.
    Inline,
    /// A literal block, newlines kept.
    Literal,
    /// A folded block.
    Folded,
}

macro_rules! named_enum {
    ($T:ident, $what:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $T {
            /// The name used for this hint in schemas.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name),+
                }
            }
        }

        impl FromStr for $T {
            type Err = AsdfError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Self::$variant),)+
                    _ => Err(asdf_err!("unknown {} '{}'", $what, s)),
                }
            }
        }
    };
}

named_enum!(FlowStyle, "flow style", { Block => "block", Flow => "flow" });
named_enum!(ScalarStyle, "scalar style", { Inline => "inline", Literal => "literal", Folded => "folded" });

#[derive(Default)]
struct MapInner {
    tag: Option<Tag>,
    entries: IndexMap<String, Node>,
    property_order: Option<Vec<String>>,
    flow_style: Option<FlowStyle>,
}

#[derive(Default)]
struct SeqInner {
    tag: Option<Tag>,
    items: Vec<Node>,
    flow_style: Option<FlowStyle>,
}

struct ScalarInner {
    tag: Option<Tag>,
    value: Scalar,
    style: Option<ScalarStyle>,
}

/// A mapping from string keys to nodes, kept in insertion order.
///
/// A handle: clones share the same map, so the tree may contain the same map more than once,
/// including inside itself.
#[derive(Clone, Default)]
pub struct TaggedMap(Arc<RwLock<MapInner>>);

/// A list of nodes. A handle, like [`TaggedMap`].
#[derive(Clone, Default)]
pub struct TaggedSeq(Arc<RwLock<SeqInner>>);

/// A primitive value with its style hint. A handle, like [`TaggedMap`].
#[derive(Clone)]
pub struct TaggedScalar(Arc<RwLock<ScalarInner>>);

impl TaggedMap {
    /// An empty, untagged map.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty map carrying `tag`.
    pub fn tagged(tag: impl Into<Tag>) -> Self {
        let map = Self::new();
        map.set_tag(Some(tag.into()));
        map
    }

    /// Builder-style [`Self::insert`].
    pub fn with(self, key: impl Into<String>, value: impl Into<Node>) -> Self {
        self.insert(key, value);
        self
    }

    /// The attached tag.
    pub fn tag(&self) -> Option<Tag> {
        self.0.read().tag.clone()
    }

    /// Replace the attached tag.
    pub fn set_tag(&self, tag: Option<Tag>) {
        self.0.write().tag = tag;
    }

    /// The value for `key`.
    pub fn get(&self, key: &str) -> Option<Node> {
        self.0.read().entries.get(key).cloned()
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.read().entries.contains_key(key)
    }

    /// Insert or replace `key`, keeping the position of an existing key.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Node>) -> Option<Node> {
        self.0.write().entries.insert(key.into(), value.into())
    }

    /// Remove `key`, preserving the order of the remaining entries.
    pub fn remove(&self, key: &str) -> Option<Node> {
        self.0.write().entries.shift_remove(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.read().entries.len()
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.read().entries.is_empty()
    }

    /// The keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.0.read().entries.keys().cloned().collect()
    }

    /// A snapshot of the entries in insertion order.
    pub fn entries(&self) -> Vec<(String, Node)> {
        self.0
            .read()
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// The entries in output order: keys named by the property order hint first, in that
    /// order, then the rest in insertion order.
    pub fn ordered_entries(&self) -> Vec<(String, Node)> {
        let inner = self.0.read();
        let Some(order) = inner.property_order.as_ref() else {
            return inner
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
        };

        let mut out: Vec<(String, Node)> = order
            .iter()
            .unique()
            .filter_map(|k| inner.entries.get(k).map(|v| (k.clone(), v.clone())))
            .collect();
        out.extend(
            inner
                .entries
                .iter()
                .filter(|(k, _)| !order.contains(k))
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        out
    }

    /// The property order hint.
    pub fn property_order(&self) -> Option<Vec<String>> {
        self.0.read().property_order.clone()
    }

    /// Replace the property order hint.
    pub fn set_property_order(&self, order: Option<Vec<String>>) {
        self.0.write().property_order = order;
    }

    /// The flow style hint.
    pub fn flow_style(&self) -> Option<FlowStyle> {
        self.0.read().flow_style
    }

    /// Replace the flow style hint.
    pub fn set_flow_style(&self, style: Option<FlowStyle>) {
        self.0.write().flow_style = style;
    }

    /// Whether both handles refer to the same map.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn id(&self) -> usize {
        Arc::as_ptr(&self.0).cast::<()>() as usize
    }
}

impl TaggedSeq {
    /// An empty, untagged sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// A sequence holding `items`.
    pub fn from_items(items: Vec<Node>) -> Self {
        Self(Arc::new(RwLock::new(SeqInner {
            items,
            ..Default::default()
        })))
    }

    /// The attached tag.
    pub fn tag(&self) -> Option<Tag> {
        self.0.read().tag.clone()
    }

    /// Replace the attached tag.
    pub fn set_tag(&self, tag: Option<Tag>) {
        self.0.write().tag = tag;
    }

    /// The item at `index`.
    pub fn get(&self, index: usize) -> Option<Node> {
        self.0.read().items.get(index).cloned()
    }

    /// Replace the item at `index`.
    pub fn set(&self, index: usize, value: impl Into<Node>) -> AsdfResult<()> {
        let mut inner = self.0.write();
        let len = inner.items.len();
        match inner.items.get_mut(index) {
            Some(slot) => *slot = value.into(),
            None => asdf_bail!(OutOfBounds: index, 0, len),
        }
        Ok(())
    }

    /// Append an item.
    pub fn push(&self, value: impl Into<Node>) {
        self.0.write().items.push(value.into());
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.0.read().items.len()
    }

    /// Whether the sequence has no items.
    pub fn is_empty(&self) -> bool {
        self.0.read().items.is_empty()
    }

    /// A snapshot of the items.
    pub fn items(&self) -> Vec<Node> {
        self.0.read().items.clone()
    }

    /// The flow style hint.
    pub fn flow_style(&self) -> Option<FlowStyle> {
        self.0.read().flow_style
    }

    /// Replace the flow style hint.
    pub fn set_flow_style(&self, style: Option<FlowStyle>) {
        self.0.write().flow_style = style;
    }

    /// Whether both handles refer to the same sequence.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn id(&self) -> usize {
        Arc::as_ptr(&self.0).cast::<()>() as usize
    }
}

impl TaggedScalar {
    /// An untagged scalar.
    pub fn new(value: Scalar) -> Self {
        Self(Arc::new(RwLock::new(ScalarInner {
            tag: None,
            value,
            style: None,
        })))
    }

    /// The attached tag.
    pub fn tag(&self) -> Option<Tag> {
        self.0.read().tag.clone()
    }

    /// Replace the attached tag.
    pub fn set_tag(&self, tag: Option<Tag>) {
        self.0.write().tag = tag;
    }

    /// A copy of the value.
    pub fn value(&self) -> Scalar {
        self.0.read().value.clone()
    }

    /// Replace the value.
    pub fn set_value(&self, value: Scalar) {
        self.0.write().value = value;
    }

    /// The style hint.
    pub fn style(&self) -> Option<ScalarStyle> {
        self.0.read().style
    }

    /// Replace the style hint.
    pub fn set_style(&self, style: Option<ScalarStyle>) {
        self.0.write().style = style;
    }

    fn id(&self) -> usize {
        Arc::as_ptr(&self.0).cast::<()>() as usize
    }
}

/// A node of the tagged tree.
#[derive(Clone)]
pub enum Node {
    /// A mapping.
    Map(TaggedMap),
    /// A sequence.
    Seq(TaggedSeq),
    /// A primitive value.
    Scalar(TaggedScalar),
}

impl Node {
    /// An untagged null.
    pub fn null() -> Self {
        Self::Scalar(TaggedScalar::new(Scalar::Null))
    }

    /// The attached tag, if any.
    pub fn tag(&self) -> Option<Tag> {
        match self {
            Self::Map(m) => m.tag(),
            Self::Seq(s) => s.tag(),
            Self::Scalar(s) => s.tag(),
        }
    }

    /// Replace the attached tag without the checks of [`tag_object`].
    pub fn set_tag(&self, tag: Option<Tag>) {
        match self {
            Self::Map(m) => m.set_tag(tag),
            Self::Seq(s) => s.set_tag(tag),
            Self::Scalar(s) => s.set_tag(tag),
        }
    }

    /// The YAML core tag implied by the shape of the node. Byte strings count as `str`.
    pub fn structural_tag(&self) -> Tag {
        match self {
            Self::Map(_) => Tag::yaml("map"),
            Self::Seq(_) => Tag::yaml("seq"),
            Self::Scalar(s) => match &s.0.read().value {
                Scalar::Bytes(_) => Tag::yaml("str"),
                value => Tag::yaml(value.yaml_name()),
            },
        }
    }

    /// The attached tag, falling back to the structural one.
    pub fn effective_tag(&self) -> Tag {
        self.tag().unwrap_or_else(|| self.structural_tag())
    }

    /// An identity for the underlying container, stable for the life of the node.
    pub fn id(&self) -> usize {
        match self {
            Self::Map(m) => m.id(),
            Self::Seq(s) => s.id(),
            Self::Scalar(s) => s.id(),
        }
    }

    /// Whether both handles refer to the same container.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }

    /// The map, if this is one.
    pub fn as_map(&self) -> Option<&TaggedMap> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// The sequence, if this is one.
    pub fn as_seq(&self) -> Option<&TaggedSeq> {
        match self {
            Self::Seq(s) => Some(s),
            _ => None,
        }
    }

    /// The scalar value, if this is a scalar.
    pub fn scalar(&self) -> Option<Scalar> {
        match self {
            Self::Scalar(s) => Some(s.value()),
            _ => None,
        }
    }

    /// The string value, if this is a string scalar.
    pub fn as_str(&self) -> Option<String> {
        match self.scalar()? {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The integer value, if this is an integer scalar.
    pub fn as_i64(&self) -> Option<i64> {
        match self.scalar()? {
            Scalar::Int(i) => Some(i),
            _ => None,
        }
    }

    /// The numeric value, if this is an integer or float scalar.
    pub fn as_f64(&self) -> Option<f64> {
        match self.scalar()? {
            Scalar::Int(i) => Some(i as f64),
            Scalar::Float(f) => Some(f),
            _ => None,
        }
    }

    /// The boolean value, if this is a boolean scalar.
    pub fn as_bool(&self) -> Option<bool> {
        match self.scalar()? {
            Scalar::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Whether this is a null scalar.
    pub fn is_null(&self) -> bool {
        matches!(self.scalar(), Some(Scalar::Null))
    }

    /// The JSON schema type name of this node.
    pub fn json_type(&self) -> &'static str {
        match self {
            Self::Map(_) => "object",
            Self::Seq(_) => "array",
            Self::Scalar(s) => match &s.0.read().value {
                Scalar::Null => "null",
                Scalar::Bool(_) => "boolean",
                Scalar::Int(_) => "integer",
                Scalar::Float(_) => "number",
                Scalar::Str(_) | Scalar::Bytes(_) => "string",
            },
        }
    }

    /// The direct children, map values in insertion order.
    pub fn children(&self) -> Vec<Node> {
        match self {
            Self::Map(m) => m.0.read().entries.values().cloned().collect(),
            Self::Seq(s) => s.items(),
            Self::Scalar(_) => Vec::new(),
        }
    }

    /// A copy sharing nothing with this node. Shared and cyclic structure is reproduced in the
    /// copy. Tags and hints are kept.
    pub fn deep_copy(&self) -> Node {
        self.deep_copy_with(&mut FxHashMap::default())
    }

    fn deep_copy_with(&self, memo: &mut FxHashMap<usize, Node>) -> Node {
        if let Some(copy) = memo.get(&self.id()) {
            return copy.clone();
        }

        match self {
            Self::Map(map) => {
                let (copy, entries) = {
                    let inner = map.0.read();
                    let copy = TaggedMap(Arc::new(RwLock::new(MapInner {
                        tag: inner.tag.clone(),
                        entries: IndexMap::with_capacity(inner.entries.len()),
                        property_order: inner.property_order.clone(),
                        flow_style: inner.flow_style,
                    })));
                    let entries: Vec<(String, Node)> = inner
                        .entries
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    (copy, entries)
                };
                memo.insert(self.id(), Node::Map(copy.clone()));
                for (key, value) in entries {
                    copy.insert(key, value.deep_copy_with(memo));
                }
                Node::Map(copy)
            }
            Self::Seq(seq) => {
                let copy = TaggedSeq::new();
                copy.set_tag(seq.tag());
                copy.set_flow_style(seq.flow_style());
                memo.insert(self.id(), Node::Seq(copy.clone()));
                for item in seq.items() {
                    copy.push(item.deep_copy_with(memo));
                }
                Node::Seq(copy)
            }
            Self::Scalar(scalar) => {
                let inner = scalar.0.read();
                let copy = Node::Scalar(TaggedScalar(Arc::new(RwLock::new(ScalarInner {
                    tag: inner.tag.clone(),
                    value: inner.value.clone(),
                    style: inner.style,
                }))));
                memo.insert(self.id(), copy.clone());
                copy
            }
        }
    }
}

/// Attach `tag` to a map, sequence or string node.
///
/// Re-tagging an already tagged node replaces its tag in place and returns the same node.
/// Numbers, booleans, nulls and byte strings cannot carry a tag of their own: their tag is
/// implied by their type.
pub fn tag_object(tag: impl Into<Tag>, node: impl Into<Node>) -> AsdfResult<Node> {
    let node = node.into();
    if let Node::Scalar(scalar) = &node {
        let value = scalar.value();
        if !matches!(value, Scalar::Str(_)) {
            asdf_bail!(
                StructuralTag: "cannot tag a {} value, its tag is implied by its type",
                value.yaml_name()
            );
        }
    }
    let tag = tag.into();
    if let Some(old) = node.tag().filter(|old| *old != tag) {
        log::trace!("re-tagging {old} as {tag}");
    }
    node.set_tag(Some(tag));
    Ok(node)
}

/// The tag attached to `node`, or `None` if it has none.
pub fn get_tag(node: &Node) -> Option<Tag> {
    node.tag()
}

fn node_eq(a: &Node, b: &Node, seen: &mut FxHashSet<(usize, usize)>) -> bool {
    if a.ptr_eq(b) || !seen.insert((a.id(), b.id())) {
        return true;
    }
    if a.tag() != b.tag() {
        return false;
    }

    match (a, b) {
        (Node::Map(x), Node::Map(y)) => {
            x.len() == y.len()
                && x.entries()
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| node_eq(v, &w, seen)))
        }
        (Node::Seq(x), Node::Seq(y)) => {
            let (xs, ys) = (x.items(), y.items());
            xs.len() == ys.len() && xs.iter().zip(&ys).all(|(v, w)| node_eq(v, w, seen))
        }
        (Node::Scalar(x), Node::Scalar(y)) => x.value() == y.value(),
        _ => false,
    }
}

impl PartialEq for Node {
    /// Equal tags and equal content. Map entry order and style hints are ignored.
    fn eq(&self, other: &Self) -> bool {
        node_eq(self, other, &mut FxHashSet::default())
    }
}

impl PartialEq for TaggedMap {
    fn eq(&self, other: &Self) -> bool {
        Node::Map(self.clone()) == Node::Map(other.clone())
    }
}

impl PartialEq for TaggedSeq {
    fn eq(&self, other: &Self) -> bool {
        Node::Seq(self.clone()) == Node::Seq(other.clone())
    }
}

fn fmt_node(node: &Node, f: &mut Formatter<'_>, stack: &mut Vec<usize>) -> std::fmt::Result {
    if let Some(tag) = node.tag() {
        write!(f, "!<{tag}> ")?;
    }
    match node {
        Node::Scalar(s) => write!(f, "{}", s.0.read().value),
        Node::Map(_) | Node::Seq(_) if stack.contains(&node.id()) => f.write_str("<cycle>"),
        Node::Map(m) => {
            stack.push(node.id());
            f.write_str("{")?;
            for (i, (key, value)) in m.entries().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "\"{}\": ", key.escape_debug())?;
                fmt_node(value, f, stack)?;
            }
            stack.pop();
            f.write_str("}")
        }
        Node::Seq(s) => {
            stack.push(node.id());
            f.write_str("[")?;
            for (i, item) in s.items().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                fmt_node(item, f, stack)?;
            }
            stack.pop();
            f.write_str("]")
        }
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        fmt_node(self, f, &mut Vec::new())
    }
}

impl Debug for TaggedMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&Node::Map(self.clone()), f)
    }
}

impl Debug for TaggedSeq {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&Node::Seq(self.clone()), f)
    }
}

impl Debug for TaggedScalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&Node::Scalar(self.clone()), f)
    }
}

impl From<TaggedMap> for Node {
    fn from(value: TaggedMap) -> Self {
        Self::Map(value)
    }
}

impl From<TaggedSeq> for Node {
    fn from(value: TaggedSeq) -> Self {
        Self::Seq(value)
    }
}

impl From<TaggedScalar> for Node {
    fn from(value: TaggedScalar) -> Self {
        Self::Scalar(value)
    }
}

impl From<Scalar> for Node {
    fn from(value: Scalar) -> Self {
        Self::Scalar(TaggedScalar::new(value))
    }
}

impl From<Vec<Node>> for Node {
    fn from(value: Vec<Node>) -> Self {
        Self::Seq(TaggedSeq::from_items(value))
    }
}

impl FromIterator<Node> for TaggedSeq {
    fn from_iter<T: IntoIterator<Item = Node>>(iter: T) -> Self {
        Self::from_items(iter.into_iter().collect())
    }
}

impl<K: Into<String>> FromIterator<(K, Node)> for TaggedMap {
    fn from_iter<T: IntoIterator<Item = (K, Node)>>(iter: T) -> Self {
        let map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

macro_rules! scalar_from {
    ($T:ty, $variant:ident) => {
        impl From<$T> for Node {
            fn from(value: $T) -> Self {
                Scalar::$variant(value.into()).into()
            }
        }
    };
}

scalar_from!(bool, Bool);
scalar_from!(i32, Int);
scalar_from!(i64, Int);
scalar_from!(u32, Int);
scalar_from!(f64, Float);
scalar_from!(&str, Str);
scalar_from!(String, Str);

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const TAG_A: &str = "tag:example.org:thing-1.0.0";
    const TAG_B: &str = "tag:example.org:other-1.0.0";

    fn sample_map() -> TaggedMap {
        TaggedMap::new().with("a", 1i64).with("b", "two")
    }

    #[test]
    fn tagging_is_idempotent_and_in_place() {
        env_logger::builder().is_test(true).try_init().ok();
        let map = sample_map();
        let tagged = tag_object(TAG_A, map.clone()).unwrap();
        assert_eq!(get_tag(&tagged).unwrap(), TAG_A);
        // Same container, not a copy.
        assert_eq!(map.tag().unwrap(), TAG_A);

        let retagged = tag_object(TAG_B, tagged.clone()).unwrap();
        assert_eq!(get_tag(&retagged).unwrap(), TAG_B);
        assert!(retagged.ptr_eq(&tagged));

        let again = tag_object(TAG_B, retagged).unwrap();
        assert_eq!(get_tag(&again).unwrap(), TAG_B);
    }

    #[rstest]
    #[case(Node::from(1i64))]
    #[case(Node::from(1.5f64))]
    #[case(Node::from(true))]
    #[case(Node::null())]
    fn numbers_cannot_be_tagged(#[case] node: Node) {
        let err = tag_object(TAG_A, node).unwrap_err();
        assert!(matches!(err, AsdfError::StructuralTag(..)));
    }

    #[test]
    fn strings_and_sequences_can_be_tagged() {
        assert!(tag_object(TAG_A, Node::from("x")).is_ok());
        assert!(tag_object(TAG_A, Node::from(vec![Node::from(1i64)])).is_ok());
    }

    #[test]
    fn untagged_values_report_no_tag() {
        assert!(get_tag(&Node::from(3i64)).is_none());
        assert_eq!(Node::from(3i64).effective_tag(), Tag::yaml("int"));
        assert_eq!(Node::from(sample_map()).effective_tag(), Tag::yaml("map"));
        assert_eq!(
            Node::from(Scalar::Bytes(vec![1, 2])).effective_tag(),
            Tag::yaml("str")
        );
    }

    #[test]
    fn equality_requires_equal_tags() {
        let a = Node::from(sample_map());
        let b = Node::from(sample_map());
        assert_eq!(a, b);

        b.set_tag(Some(TAG_A.into()));
        assert_ne!(a, b);
        a.set_tag(Some(TAG_A.into()));
        assert_eq!(a, b);
    }

    #[test]
    fn property_order_drives_output_order() {
        let map = TaggedMap::new()
            .with("z", 1i64)
            .with("a", 2i64)
            .with("m", 3i64);
        map.set_property_order(Some(vec!["m".into(), "missing".into(), "z".into()]));
        let keys: Vec<_> = map.ordered_entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["m", "z", "a"]);
    }

    #[test]
    fn cyclic_trees_compare_format_and_copy() {
        let map = sample_map();
        map.insert("self", map.clone());
        let node = Node::from(map.clone());

        assert!(format!("{node:?}").contains("<cycle>"));

        let copy = node.deep_copy();
        assert!(!copy.ptr_eq(&node));
        assert_eq!(copy, node);

        let inner = copy.as_map().unwrap().get("self").unwrap();
        assert!(inner.ptr_eq(&copy));
    }

    #[test]
    fn deep_copy_keeps_hints() {
        let map = sample_map();
        map.set_flow_style(Some(FlowStyle::Flow));
        map.set_property_order(Some(vec!["b".into()]));
        let copy = Node::from(map).deep_copy();
        let copy = copy.as_map().unwrap();
        assert_eq!(copy.flow_style(), Some(FlowStyle::Flow));
        assert_eq!(copy.property_order(), Some(vec!["b".to_string()]));
    }

    #[test]
    fn removing_keeps_order() {
        let map = TaggedMap::new()
            .with("a", 1i64)
            .with("b", 2i64)
            .with("c", 3i64);
        map.remove("a");
        assert_eq!(map.keys(), vec!["b", "c"]);
    }
}
