use asdf_block::BlockManager;
use asdf_error::{AsdfResult, asdf_bail, asdf_err};
use asdf_tree::{Node, Scalar, TaggedMap, TaggedSeq};
use rustc_hash::FxHashSet;

use crate::{NativeObject, ObjectRef, Registry, Value};

/// State shared by the converters taking part in one conversion.
///
/// Converters recurse into their children through the context, so composite objects reuse
/// the registry lookup, block allocation and cycle detection of the outer walk.
#[derive(Debug)]
pub struct ConversionContext<'a> {
    registry: &'a Registry,
    blocks: &'a mut BlockManager,
    /// Containers on the current read path.
    active: FxHashSet<usize>,
}

impl<'a> ConversionContext<'a> {
    pub fn new(registry: &'a Registry, blocks: &'a mut BlockManager) -> Self {
        Self {
            registry,
            blocks,
            active: FxHashSet::default(),
        }
    }

    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    pub fn blocks(&self) -> &BlockManager {
        &*self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut BlockManager {
        &mut *self.blocks
    }

    pub fn to_tree(&mut self, value: &Value) -> AsdfResult<Node> {
        Ok(match value {
            Value::Null => Node::null(),
            Value::Bool(b) => Node::from(*b),
            Value::Int(i) => Node::from(*i),
            Value::Float(f) => Node::from(*f),
            Value::Str(s) => Node::from(s.as_str()),
            Value::Bytes(b) => Node::from(Scalar::Bytes(b.clone())),
            Value::Seq(items) => TaggedSeq::from_items(
                items
                    .iter()
                    .map(|item| self.to_tree(item))
                    .collect::<AsdfResult<Vec<_>>>()?,
            )
            .into(),
            Value::Map(entries) => {
                let map = TaggedMap::new();
                for (key, item) in entries {
                    map.insert(key.as_str(), self.to_tree(item)?);
                }
                map.into()
            }
            Value::Object(object) => self.object_to_tree(object.as_ref())?,
            Value::Tagged(tag, inner) => {
                let node = self.to_tree(inner)?;
                node.set_tag(Some(tag.clone()));
                node
            }
        })
    }

    /// Convert a native object with its registered converter.
    pub fn object_to_tree(&mut self, object: &dyn NativeObject) -> AsdfResult<Node> {
        let registry = self.registry;
        let converter = registry.converter_for_object(object)?;
        let node = converter.to_tree(object, self)?;
        match node.tag() {
            Some(tag) if converter.tags().iter().any(|pattern| tag.matches(pattern)) => Ok(node),
            tag => Err(asdf_err!(
                Conversion: "{:?} wrote {} for {:?}, which it cannot read back",
                converter,
                tag.map_or_else(|| "an untagged node".to_string(), |t| t.to_string()),
                object
            )),
        }
    }

    /// Convert a node, handing tagged nodes to their converter.
    ///
    /// A tag no converter knows is not an error: the node is read as plain data and keeps its
    /// tag, so a document written by a newer set of types survives a round trip.
    pub fn from_tree(&mut self, node: &Node) -> AsdfResult<Value> {
        let container = !matches!(node, Node::Scalar(_));
        if container && !self.active.insert(node.id()) {
            asdf_bail!(
                Conversion: "tree contains a cycle through {}, native values are acyclic",
                node.effective_tag()
            );
        }
        let value = self.from_tree_inner(node);
        if container {
            self.active.remove(&node.id());
        }
        value
    }

    /// Convert a node that must become a native object, such as an operand of a composite.
    pub fn object_from_tree(&mut self, node: &Node) -> AsdfResult<ObjectRef> {
        match self.from_tree(node)? {
            Value::Object(object) => Ok(object),
            other => Err(asdf_err!(
                Conversion: "expected a convertible object, found {:?}",
                other
            )),
        }
    }

    fn from_tree_inner(&mut self, node: &Node) -> AsdfResult<Value> {
        if let Some(tag) = node.tag().filter(|tag| !tag.is_yaml_core()) {
            let registry = self.registry;
            if let Some(converter) = registry.converter_for_tag(tag.as_str()) {
                log::trace!("reading {tag} with {converter:?}");
                return converter.from_tree(node, self).map(Value::Object);
            }
            log::debug!("no converter for {tag}, reading it as a plain {}", node.json_type());
            return Ok(Value::Tagged(tag, Box::new(self.plain(node)?)));
        }
        self.plain(node)
    }

    fn plain(&mut self, node: &Node) -> AsdfResult<Value> {
        Ok(match node {
            Node::Map(map) => Value::Map(
                map.entries()
                    .into_iter()
                    .map(|(key, value)| Ok((key, self.from_tree(&value)?)))
                    .collect::<AsdfResult<_>>()?,
            ),
            Node::Seq(seq) => Value::Seq(
                seq.items()
                    .iter()
                    .map(|item| self.from_tree(item))
                    .collect::<AsdfResult<_>>()?,
            ),
            Node::Scalar(scalar) => match scalar.value() {
                Scalar::Null => Value::Null,
                Scalar::Bool(b) => Value::Bool(b),
                Scalar::Int(i) => Value::Int(i),
                Scalar::Float(f) => Value::Float(f),
                Scalar::Str(s) => Value::Str(s),
                Scalar::Bytes(b) => Value::Bytes(b),
            },
        })
    }
}
