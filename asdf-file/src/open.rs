use std::path::Path;
use std::sync::Arc;

use asdf_block::{BLOCK_MAGIC, BlockManager, FileReadAt, ReadAtRef};
use asdf_error::{AsdfResult, ResultExt, asdf_bail, asdf_err};
use asdf_schema::{ValidationContext, fill_defaults, validate};
use asdf_tree::{Node, TaggedMap};
use asdf_types::{RegistryRef, Value};
use bytes::Bytes;

use crate::{
    ASDF_MAGIC, ASDF_ROOT_TAG, AsdfFile, JsonTreeFormat, TREE_END, TreeFormat, default_registry,
};

/// Bytes fetched at a time while looking for the end of the tree.
const INITIAL_READ_SIZE: usize = 64 * 1024;

/// Open options for an ASDF document.
#[derive(Debug, Clone)]
pub struct AsdfOpenOptions {
    registry: RegistryRef,
    validation: ValidationContext,
    validate: bool,
    fill_defaults: bool,
    format: Arc<dyn TreeFormat>,
}

impl Default for AsdfOpenOptions {
    fn default() -> Self {
        Self {
            registry: default_registry(),
            validation: ValidationContext::default(),
            validate: true,
            fill_defaults: false,
            format: Arc::new(JsonTreeFormat::default()),
        }
    }
}

impl AsdfOpenOptions {
    /// Validate the tree against its schemas before converting it. On by default.
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Insert the schema default of every absent property. Off by default.
    pub fn with_fill_defaults(mut self, fill_defaults: bool) -> Self {
        self.fill_defaults = fill_defaults;
        self
    }

    /// Convert tagged nodes with `registry`.
    pub fn with_registry(mut self, registry: RegistryRef) -> Self {
        self.registry = registry;
        self
    }

    /// Resolve and load schemas through `validation`.
    pub fn with_validation_context(mut self, validation: ValidationContext) -> Self {
        self.validation = validation;
        self
    }

    /// Parse the tree with `format` instead of JSON.
    pub fn with_format(mut self, format: Arc<dyn TreeFormat>) -> Self {
        self.format = format;
        self
    }
}

impl AsdfOpenOptions {
    /// Open the file at `path`. The file stays open to load array payloads on demand.
    pub fn open_path(self, path: impl AsRef<Path>) -> AsdfResult<AsdfFile> {
        let path = path.as_ref();
        let read = FileReadAt::open(path).with_context(|| format!("opening {}", path.display()))?;
        self.open(Arc::new(read))
    }

    /// Open a document held in memory.
    pub fn open_bytes(self, bytes: impl Into<Bytes>) -> AsdfResult<AsdfFile> {
        self.open(Arc::new(bytes.into()))
    }

    /// Open the document in `read`.
    pub fn open(self, read: ReadAtRef) -> AsdfResult<AsdfFile> {
        let layout = Layout::read(&read)?;
        log::debug!(
            "document version {}, tree of {} bytes, blocks from byte {}",
            layout.version,
            layout.tree.len(),
            layout.blocks_offset
        );

        let node = if layout.tree.is_empty() {
            Node::from(TaggedMap::tagged(ASDF_ROOT_TAG))
        } else {
            self.format.parse(&layout.tree)?
        };
        let mut blocks = BlockManager::read_blocks(read, layout.blocks_offset)?;

        if self.validate {
            validate(&node, &self.validation).context("the document does not match its schemas")?;
        }
        if self.fill_defaults {
            fill_defaults(&node, &self.validation)?;
        }

        let tree = match self.registry.from_tree(&node, &mut blocks)? {
            // The root tag has no converter; the document is its plain content.
            Value::Tagged(_, inner) if matches!(*inner, Value::Map(_)) => *inner,
            tree @ Value::Map(_) => tree,
            _ => asdf_bail!(
                Conversion: "the document root must be a map, found {}",
                node.effective_tag()
            ),
        };

        Ok(AsdfFile {
            tree,
            blocks,
            registry: self.registry,
            validation: self.validation,
            read_tree: Some(node),
        })
    }
}

/// Where the parts of a container start.
struct Layout {
    version: String,
    tree: Vec<u8>,
    blocks_offset: u64,
}

impl Layout {
    fn read(read: &ReadAtRef) -> AsdfResult<Self> {
        let size = read.size()?;
        let mut scanner = Scanner::new(read, size);

        let first = scanner.line()?.unwrap_or_default();
        let Some(version) = first.strip_prefix(ASDF_MAGIC) else {
            asdf_bail!("not an ASDF document: missing the '#ASDF' header");
        };
        let version = String::from_utf8_lossy(version).trim().to_string();
        if !version.starts_with("1.") {
            log::warn!("reading a document of unsupported version {version}");
        }

        // Further comment lines, such as the standard version.
        while scanner.peek(1)?.first() == Some(&b'#') {
            scanner.line()?;
        }

        let tree_start = scanner.pos;
        let next = scanner.peek(BLOCK_MAGIC.len())?;
        if next.is_empty() || next == BLOCK_MAGIC.as_slice() {
            return Ok(Self {
                version,
                tree: Vec::new(),
                blocks_offset: tree_start,
            });
        }

        let Some(end) = scanner.find(TREE_END)? else {
            asdf_bail!("the document tree has no end marker");
        };
        let tree = scanner.take(end)?;
        Ok(Self {
            version,
            tree,
            blocks_offset: end + TREE_END.len() as u64,
        })
    }
}

/// Reads the head of a container in growing chunks.
struct Scanner<'a> {
    read: &'a ReadAtRef,
    size: u64,
    /// The first bytes of the source, as far as they have been fetched.
    buffer: Vec<u8>,
    pos: u64,
}

impl<'a> Scanner<'a> {
    fn new(read: &'a ReadAtRef, size: u64) -> Self {
        Self {
            read,
            size,
            buffer: Vec::new(),
            pos: 0,
        }
    }

    fn fetched_end(&self) -> u64 {
        self.buffer.len() as u64
    }

    /// Fetch until `end` is buffered or the source is exhausted.
    fn fill_to(&mut self, end: u64) -> AsdfResult<()> {
        while self.fetched_end() < end.min(self.size) {
            let offset = self.fetched_end();
            let len = usize::try_from((self.size - offset).min(INITIAL_READ_SIZE as u64))
                .map_err(|_| asdf_err!("read size out of range"))?;
            self.buffer.extend(self.read.read_at(offset, len)?);
        }
        Ok(())
    }

    fn slice(&self, from: u64, to: u64) -> AsdfResult<&[u8]> {
        let index = |at: u64| {
            usize::try_from(at).map_err(|_| asdf_err!("offset {at} out of range"))
        };
        Ok(&self.buffer[index(from)?..index(to.min(self.fetched_end()))?])
    }

    fn peek(&mut self, len: usize) -> AsdfResult<&[u8]> {
        let end = self.pos + len as u64;
        self.fill_to(end)?;
        self.slice(self.pos, end)
    }

    /// The next line including its newline, or `None` at the end of the source.
    fn line(&mut self) -> AsdfResult<Option<Vec<u8>>> {
        let Some(end) = self.find(b"\n")? else {
            return Ok(None);
        };
        let line = self.take(end + 1)?;
        Ok(Some(line))
    }

    /// Absolute offset of the next occurrence of `needle` at or after the current position.
    fn find(&mut self, needle: &[u8]) -> AsdfResult<Option<u64>> {
        let mut searched = self.pos;
        loop {
            let buffered = self.slice(searched, self.fetched_end())?;
            if let Some(at) = buffered
                .windows(needle.len())
                .position(|window| window == needle)
            {
                return Ok(Some(searched + at as u64));
            }
            if self.fetched_end() >= self.size {
                return Ok(None);
            }
            // Keep a needle's length of overlap so a match across chunks is found.
            searched = self
                .fetched_end()
                .saturating_sub(needle.len() as u64)
                .max(self.pos);
            self.fill_to(self.fetched_end() + INITIAL_READ_SIZE as u64)?;
        }
    }

    /// The bytes from the current position to `end`, advancing past them.
    fn take(&mut self, end: u64) -> AsdfResult<Vec<u8>> {
        self.fill_to(end)?;
        let bytes = self.slice(self.pos, end)?.to_vec();
        self.pos = end;
        Ok(bytes)
    }
}
