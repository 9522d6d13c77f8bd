use asdf_block::{ArrayStorage, BlockManager, Compression};
use asdf_buffer::NDArray;
use asdf_error::{AsdfResult, ResultExt, asdf_bail};
use asdf_schema::{ValidationContext, validate};
use asdf_tree::Node;
use asdf_types::{RegistryRef, Value};

use crate::{ASDF_ROOT_TAG, default_registry};

/// An ASDF document: a native object tree and the blocks backing its arrays.
///
/// A document opened from a container keeps the reader of that container, so array payloads
/// that were never touched are loaded lazily, or copied byte for byte when the document is
/// written again.
#[derive(Debug)]
pub struct AsdfFile {
    pub(crate) tree: Value,
    pub(crate) blocks: BlockManager,
    pub(crate) registry: RegistryRef,
    pub(crate) validation: ValidationContext,
    pub(crate) read_tree: Option<Node>,
}

impl Default for AsdfFile {
    fn default() -> Self {
        Self::new(Value::Map(Default::default()))
    }
}

impl AsdfFile {
    /// A new document holding `tree`, which must convert to a map.
    pub fn new(tree: Value) -> Self {
        Self {
            tree,
            blocks: BlockManager::default(),
            registry: default_registry(),
            validation: ValidationContext::default(),
            read_tree: None,
        }
    }

    /// Convert objects with `registry` instead of the core converters.
    pub fn with_registry(mut self, registry: RegistryRef) -> Self {
        self.registry = registry;
        self
    }

    /// Validate against the schemas known to `validation`.
    pub fn with_validation_context(mut self, validation: ValidationContext) -> Self {
        self.validation = validation;
        self
    }

    pub fn tree(&self) -> &Value {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Value {
        &mut self.tree
    }

    pub fn set_tree(&mut self, tree: Value) {
        self.tree = tree;
    }

    pub fn into_tree(self) -> Value {
        self.tree
    }

    /// Look up `key` in the root map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.tree.get(key)
    }

    pub fn blocks(&self) -> &BlockManager {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut BlockManager {
        &mut self.blocks
    }

    pub fn registry(&self) -> &RegistryRef {
        &self.registry
    }

    pub fn validation_context(&self) -> &ValidationContext {
        &self.validation
    }

    /// The tree as it was parsed when the document was opened, after defaults were filled.
    ///
    /// Inspecting it never loads array payloads.
    pub fn read_tree(&self) -> Option<&Node> {
        self.read_tree.as_ref()
    }

    /// Store `array` (and every view sharing its buffer) this way on the next write.
    pub fn set_array_storage(&mut self, array: &NDArray, storage: ArrayStorage) -> AsdfResult<()> {
        self.blocks.set_array_storage(array, storage)
    }

    /// Compress the block of `array` this way on the next write.
    pub fn set_array_compression(&mut self, array: &NDArray, compression: Compression) {
        self.blocks.set_array_compression(array, compression)
    }

    /// Convert the native tree to the tagged tree that would be written, reserving block sources
    /// for its arrays.
    pub(crate) fn to_node(&mut self) -> AsdfResult<Node> {
        self.blocks.begin_write();
        let node = self
            .registry
            .to_tree(&self.tree, &mut self.blocks)
            .context("converting the document tree")?;
        let Some(root) = node.as_map() else {
            asdf_bail!(
                Conversion: "the document tree must be a map, found a {}",
                node.json_type()
            );
        };
        root.set_tag(Some(ASDF_ROOT_TAG.into()));
        Ok(node)
    }

    /// Validate the tree as it would be written.
    pub fn validate(&mut self) -> AsdfResult<()> {
        let node = self.to_node()?;
        self.blocks.begin_write();
        validate(&node, &self.validation)
    }
}
