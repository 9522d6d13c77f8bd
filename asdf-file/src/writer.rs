use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use asdf_block::{ArrayStorage, BlockPolicy, Compression};
use asdf_error::{AsdfResult, ResultExt};
use asdf_schema::{remove_defaults, validate};
use asdf_tree::{Node, TaggedMap};
use tempfile::NamedTempFile;

use crate::{
    ASDF_FILE_FORMAT_VERSION, ASDF_LIBRARY_NAME, ASDF_STANDARD_VERSION, AsdfFile, JsonTreeFormat,
    TREE_END, TreeFormat,
};

/// Options for writing an [`AsdfFile`].
#[derive(Debug, Clone)]
pub struct AsdfWriteOptions {
    policy: BlockPolicy,
    validate: bool,
    strip_defaults: bool,
    format: Arc<dyn TreeFormat>,
}

impl Default for AsdfWriteOptions {
    fn default() -> Self {
        Self {
            policy: BlockPolicy::default(),
            validate: true,
            strip_defaults: false,
            format: Arc::new(JsonTreeFormat::default()),
        }
    }
}

impl AsdfWriteOptions {
    /// Inline every array whose buffer holds at most `threshold` elements.
    pub fn with_auto_inline(mut self, threshold: Option<usize>) -> Self {
        self.policy = self.policy.with_auto_inline(threshold);
        self
    }

    /// Store every array that has no storage of its own this way.
    pub fn with_all_array_storage(mut self, storage: ArrayStorage) -> Self {
        self.policy = self.policy.with_storage(Some(storage));
        self
    }

    /// Compress every block that has no compression of its own this way.
    pub fn with_all_array_compression(mut self, compression: Compression) -> Self {
        self.policy = self.policy.with_compression(compression);
        self
    }

    /// Reserve `factor` times the payload size for each rewritten block, zero filled.
    ///
    /// The factor must be at least 1.
    pub fn with_block_padding(mut self, factor: f64) -> AsdfResult<Self> {
        self.policy = self.policy.with_padding(factor)?;
        Ok(self)
    }

    /// Validate the tree before anything is written. On by default.
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Drop every value equal to its schema default. Off by default.
    pub fn with_strip_defaults(mut self, strip_defaults: bool) -> Self {
        self.strip_defaults = strip_defaults;
        self
    }

    /// Write the tree with `format` instead of JSON.
    pub fn with_format(mut self, format: Arc<dyn TreeFormat>) -> Self {
        self.format = format;
        self
    }
}

impl AsdfWriteOptions {
    /// Write `file` to `write`.
    ///
    /// The tree is converted, checked and rendered, and every block payload is loaded and
    /// encoded, before the first byte goes out, so a conversion, validation or codec failure
    /// leaves `write` untouched. The blocks of `file` are renumbered to match what is written.
    pub fn write<W: Write>(&self, file: &mut AsdfFile, mut write: W) -> AsdfResult<W> {
        let text = self.render_tree(file)?;
        let blocks = file.blocks.encode_blocks()?;

        write.write_all(header().as_bytes())?;
        write.write_all(&text)?;
        write.write_all(TREE_END)?;
        blocks.write_to(&mut write)?;
        write.flush()?;
        Ok(write)
    }

    /// Write `file` to `path`, replacing whatever is there only once the whole document has been
    /// written.
    ///
    /// `path` may be the file `file` was opened from: blocks that were never loaded are copied
    /// from it before it is replaced.
    pub fn write_to_path(&self, file: &mut AsdfFile, path: impl AsRef<Path>) -> AsdfResult<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let temp = NamedTempFile::new_in(dir)?;
        let temp = self
            .write(file, BufWriter::new(temp))?
            .into_inner()
            .map_err(|err| err.into_error())?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|err| err.error)?;
        log::debug!("wrote {} with {} blocks", path.display(), file.blocks.len());
        Ok(())
    }

    fn render_tree(&self, file: &mut AsdfFile) -> AsdfResult<Vec<u8>> {
        file.blocks.set_policy(self.policy.clone());
        let tree = file.to_node()?;
        if let Some(root) = tree.as_map() {
            root.insert("asdf_library", library());
        }

        if self.strip_defaults {
            remove_defaults(&tree, &file.validation)?;
        }
        if self.validate {
            validate(&tree, &file.validation).context("the document does not match its schemas")?;
        }
        self.format.emit(&tree)
    }
}

fn header() -> String {
    format!("#ASDF {ASDF_FILE_FORMAT_VERSION}\n#ASDF_STANDARD {ASDF_STANDARD_VERSION}\n")
}

fn library() -> Node {
    TaggedMap::new()
        .with("name", ASDF_LIBRARY_NAME)
        .with("version", env!("CARGO_PKG_VERSION"))
        .with("homepage", env!("CARGO_PKG_HOMEPAGE"))
        .into()
}
