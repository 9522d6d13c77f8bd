use std::fmt::{Display, Formatter};
use std::io::{Read, Write};
use std::str::FromStr;
use std::sync::Arc;

use asdf_buffer::{BufferId, NDArray, SharedBuffer};
use asdf_error::{AsdfError, AsdfResult, asdf_bail, asdf_err};
use itertools::Itertools;
use rustc_hash::FxHashMap;

use crate::codec::{Compression, codec_for, compress, decompress};
use crate::header::{BLOCK_PREAMBLE_SIZE, BlockHeader};
use crate::read_at::ReadAtRef;

/// Where the data of an array goes when a document is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayStorage {
    /// A binary block referenced by index.
    Internal,
    /// A literal list inside the tree.
    Inline,
    /// The single trailing block of unknown length.
    Streamed,
}

impl ArrayStorage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::Inline => "inline",
            Self::Streamed => "streamed",
        }
    }
}

impl Display for ArrayStorage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ArrayStorage {
    type Err = AsdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "internal" => Ok(Self::Internal),
            "inline" => Ok(Self::Inline),
            "streamed" => Ok(Self::Streamed),
            _ => Err(asdf_err!("unknown array storage '{}'", s)),
        }
    }
}

/// Position of a block in a [`BlockManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockIndex(usize);

impl BlockIndex {
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Where a block read from a container lives, so it can be loaded or copied without decoding.
#[derive(Debug, Clone)]
struct OnDisk {
    reader: ReadAtRef,
    payload_offset: u64,
    header: BlockHeader,
    /// Bytes of payload present on disk. Equal to `used_size` except for the streamed block.
    payload_len: u64,
}

/// A unit of binary storage backing one [`SharedBuffer`].
#[derive(Debug, Clone)]
pub struct Block {
    buffer: SharedBuffer,
    storage: Option<ArrayStorage>,
    compression: Option<Compression>,
    header: Option<BlockHeader>,
    on_disk: Option<OnDisk>,
}

impl Block {
    fn new(buffer: SharedBuffer) -> Self {
        Self {
            buffer,
            storage: None,
            compression: None,
            header: None,
            on_disk: None,
        }
    }

    /// The buffer holding the decoded payload. Accessing its bytes loads them.
    pub fn buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    /// Storage explicitly chosen for this block, if any.
    pub fn storage(&self) -> Option<ArrayStorage> {
        self.storage
    }

    /// Compression of the payload: the one chosen for this block, else the one it was read with.
    pub fn compression(&self) -> Compression {
        self.compression
            .or(self.header.map(|h| h.compression))
            .unwrap_or_default()
    }

    pub fn is_streamed(&self) -> bool {
        match self.header {
            Some(header) => header.is_streamed(),
            None => self.storage == Some(ArrayStorage::Streamed),
        }
    }

    pub fn flags(&self) -> u32 {
        self.header.map_or(0, |h| h.flags)
    }

    /// Bytes reserved for the payload in the container. Zero for a streamed block.
    pub fn allocated_size(&self) -> u64 {
        self.sizes().0
    }

    /// Bytes of stored payload. Zero for a streamed block.
    pub fn used_size(&self) -> u64 {
        self.sizes().1
    }

    /// Size of the payload after decompression. Zero for a streamed block.
    pub fn data_size(&self) -> u64 {
        self.sizes().2
    }

    fn sizes(&self) -> (u64, u64, u64) {
        match self.header {
            Some(h) => (h.allocated_size, h.used_size, h.data_size),
            None if self.is_streamed() => (0, 0, 0),
            None => {
                let len = self.buffer.len() as u64;
                (len, len, len)
            }
        }
    }

    /// Whether the payload has been decoded.
    pub fn is_loaded(&self) -> bool {
        self.buffer.is_loaded()
    }

    /// The on-disk copy of this block if it can be written back byte for byte.
    fn untouched(&self, compression: Compression) -> Option<&OnDisk> {
        self.on_disk.as_ref().filter(|disk| {
            !self.buffer.is_loaded()
                && !disk.header.is_streamed()
                && disk.header.compression == compression
        })
    }
}

/// Defaults applied to arrays that have no storage or compression of their own.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockPolicy {
    auto_inline: Option<usize>,
    storage: Option<ArrayStorage>,
    compression: Compression,
    padding: f64,
}

impl Default for BlockPolicy {
    fn default() -> Self {
        Self {
            auto_inline: None,
            storage: None,
            compression: Compression::NONE,
            padding: 1.0,
        }
    }
}

impl BlockPolicy {
    /// Inline every array whose base buffer holds at most `threshold` elements.
    pub fn with_auto_inline(mut self, threshold: Option<usize>) -> Self {
        self.auto_inline = threshold;
        self
    }

    /// Store every array without explicit storage this way, overriding auto-inlining.
    pub fn with_storage(mut self, storage: Option<ArrayStorage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Over-allocate every written block by `factor`, which must be at least 1.
    pub fn with_padding(mut self, factor: f64) -> AsdfResult<Self> {
        if !factor.is_finite() || factor < 1.0 {
            asdf_bail!("block padding factor must be at least 1.0, got {}", factor);
        }
        self.padding = factor;
        Ok(self)
    }

    pub fn auto_inline(&self) -> Option<usize> {
        self.auto_inline
    }

    pub fn storage(&self) -> Option<ArrayStorage> {
        self.storage
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn padding(&self) -> f64 {
        self.padding
    }
}

/// Order in which blocks go out during the current write.
#[derive(Debug, Default)]
struct WritePlan {
    internal: Vec<BlockIndex>,
    streamed: Option<BlockIndex>,
}

/// Owns the blocks of one document.
///
/// Blocks are keyed by the identity of their [`SharedBuffer`], so every array view over the same
/// buffer shares one block. Writing happens in two steps: the tree serializer asks for a source
/// index per array with [`BlockManager::reserve_source`], in tree order, and then
/// [`BlockManager::write_blocks`] emits exactly the reserved blocks in that order.
#[derive(Debug, Default)]
pub struct BlockManager {
    blocks: Vec<Block>,
    by_buffer: FxHashMap<BufferId, BlockIndex>,
    policy: BlockPolicy,
    plan: WritePlan,
}

impl BlockManager {
    pub fn new(policy: BlockPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    pub fn policy(&self) -> &BlockPolicy {
        &self.policy
    }

    pub fn set_policy(&mut self, policy: BlockPolicy) {
        self.policy = policy;
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Block> + '_ {
        self.blocks.iter()
    }

    pub fn block(&self, index: BlockIndex) -> AsdfResult<&Block> {
        self.blocks.get(index.0).ok_or_else(|| {
            asdf_err!(
                BlockConsistency: "block {} out of range, document has {}",
                index.0,
                self.blocks.len()
            )
        })
    }

    /// The block registered for `buffer`, if there is one.
    pub fn find_block(&self, buffer: &SharedBuffer) -> Option<BlockIndex> {
        self.by_buffer.get(&buffer.id()).copied()
    }

    /// The block backing `buffer`, registering a new one the first time the buffer is seen.
    pub fn find_or_create_block(&mut self, buffer: &SharedBuffer) -> BlockIndex {
        if let Some(index) = self.find_block(buffer) {
            return index;
        }
        let index = BlockIndex(self.blocks.len());
        log::debug!("new block {} for {}", index.0, buffer.id());
        self.blocks.push(Block::new(buffer.clone()));
        self.by_buffer.insert(buffer.id(), index);
        index
    }

    /// Choose how the data of `buffer`, and every view over it, is stored.
    ///
    /// A document holds at most one streamed block; asking for a second one fails.
    pub fn set_storage(&mut self, buffer: &SharedBuffer, storage: ArrayStorage) -> AsdfResult<()> {
        let index = self.find_or_create_block(buffer);
        if storage == ArrayStorage::Streamed {
            if let Some((other, _)) = self.blocks.iter().find_position(|block| {
                block.storage == Some(ArrayStorage::Streamed) && !block.buffer.ptr_eq(buffer)
            }) {
                asdf_bail!(
                    BlockConsistency: "block {} is already streamed, a document holds at most one",
                    other
                );
            }
        }
        self.blocks[index.0].storage = Some(storage);
        Ok(())
    }

    pub fn set_array_storage(&mut self, array: &NDArray, storage: ArrayStorage) -> AsdfResult<()> {
        self.set_storage(array.buffer(), storage)
    }

    pub fn set_compression(&mut self, buffer: &SharedBuffer, compression: Compression) {
        let index = self.find_or_create_block(buffer);
        self.blocks[index.0].compression = Some(compression);
    }

    pub fn set_array_compression(&mut self, array: &NDArray, compression: Compression) {
        self.set_compression(array.buffer(), compression)
    }

    /// How `array` will be stored: its block's explicit storage, then the policy's storage, then
    /// the auto-inline threshold, and finally an internal block.
    pub fn storage_for(&self, array: &NDArray) -> ArrayStorage {
        if let Some(storage) = self
            .find_block(array.buffer())
            .and_then(|index| self.blocks[index.0].storage)
        {
            return storage;
        }
        if let Some(storage) = self.policy.storage {
            return storage;
        }
        match self.policy.auto_inline {
            Some(threshold) if array.base_len() <= threshold => {
                log::debug!(
                    "inlining {} element array, threshold {}",
                    array.base_len(),
                    threshold
                );
                ArrayStorage::Inline
            }
            _ => ArrayStorage::Internal,
        }
    }

    /// The block a tree leaf refers to. `-1` names the streamed block.
    pub fn block_for_source(&self, source: i64) -> AsdfResult<BlockIndex> {
        if source == -1 {
            return match self.blocks.last() {
                Some(block) if block.is_streamed() => Ok(BlockIndex(self.blocks.len() - 1)),
                _ => Err(asdf_err!(BlockConsistency: "document has no streamed block")),
            };
        }
        match usize::try_from(source) {
            Ok(index) if index < self.blocks.len() => Ok(BlockIndex(index)),
            _ => Err(asdf_err!(
                BlockConsistency: "block source {} out of range, document has {} blocks",
                source,
                self.blocks.len()
            )),
        }
    }

    /// The (possibly still unloaded) buffer behind a block source.
    pub fn buffer_for_source(&self, source: i64) -> AsdfResult<SharedBuffer> {
        let index = self.block_for_source(source)?;
        Ok(self.blocks[index.0].buffer.clone())
    }

    /// Forget the sources handed out by a previous write.
    pub fn begin_write(&mut self) {
        self.plan = WritePlan::default();
    }

    /// The source index the tree should record for an array over `buffer` stored as `storage`.
    ///
    /// Internal blocks are numbered in order of first reservation; the streamed block is `-1`.
    pub fn reserve_source(&mut self, buffer: &SharedBuffer, storage: ArrayStorage) -> AsdfResult<i64> {
        let index = self.find_or_create_block(buffer);
        match storage {
            ArrayStorage::Inline => {
                asdf_bail!("inline array data has no block source")
            }
            ArrayStorage::Streamed => match self.plan.streamed {
                Some(streamed) if streamed != index => asdf_bail!(
                    BlockConsistency: "only one streamed block may be written, block {} is already streamed",
                    streamed.0
                ),
                _ => {
                    self.plan.streamed = Some(index);
                    Ok(-1)
                }
            },
            ArrayStorage::Internal => {
                if self.plan.streamed == Some(index) {
                    asdf_bail!(
                        BlockConsistency: "block {} cannot be both streamed and internal",
                        index.0
                    );
                }
                let position = match self.plan.internal.iter().position(|i| *i == index) {
                    Some(position) => position,
                    None => {
                        self.plan.internal.push(index);
                        self.plan.internal.len() - 1
                    }
                };
                i64::try_from(position)
                    .map_err(|_| asdf_err!(BlockConsistency: "too many blocks ({})", position))
            }
        }
    }

    /// Write the reserved blocks, then renumber the manager to match what was written.
    ///
    /// Every payload is encoded before the first byte is written, so a failing codec or an
    /// unreadable source leaves `out` untouched. Blocks that were not reserved are dropped.
    pub fn write_blocks<W: Write>(&mut self, out: &mut W) -> AsdfResult<()> {
        self.encode_blocks()?.write_to(out)
    }

    /// Encode the reserved blocks in write order and renumber the manager to match.
    ///
    /// Nothing is written; the result is written with [`EncodedBlocks::write_to`].
    pub fn encode_blocks(&mut self) -> AsdfResult<EncodedBlocks> {
        let order = self
            .plan
            .internal
            .iter()
            .copied()
            .chain(self.plan.streamed)
            .collect_vec();

        let encoded = order
            .iter()
            .map(|index| self.encode_block(*index))
            .collect::<AsdfResult<Vec<_>>>()?;

        let dropped = self.blocks.len() - order.len();
        if dropped > 0 {
            log::warn!("dropping {dropped} unreferenced blocks");
        }
        let blocks = std::mem::take(&mut self.blocks);
        self.blocks = order
            .iter()
            .zip(&encoded)
            .map(|(index, (header, _))| {
                let mut block = blocks[index.0].clone();
                block.header = Some(*header);
                block
            })
            .collect();
        self.by_buffer = self
            .blocks
            .iter()
            .enumerate()
            .map(|(i, block)| (block.buffer.id(), BlockIndex(i)))
            .collect();
        self.plan = WritePlan::default();
        Ok(EncodedBlocks(encoded))
    }

    fn encode_block(&self, index: BlockIndex) -> AsdfResult<(BlockHeader, Vec<u8>)> {
        let block = &self.blocks[index.0];
        if self.plan.streamed == Some(index) {
            if !block.compression().is_none() {
                log::warn!("streamed block {} is written uncompressed", index.0);
            }
            let payload = block.buffer.read(<[u8]>::to_vec)?;
            return Ok((BlockHeader::streamed(), payload));
        }

        let compression = block.compression.unwrap_or(self.policy.compression);
        if let Some(disk) = block.untouched(compression) {
            log::trace!("copying untouched block {}", index.0);
            let len = usize::try_from(disk.header.used_size)
                .map_err(|_| asdf_err!(BlockConsistency: "block of {} bytes", disk.header.used_size))?;
            let payload = disk.reader.read_at(disk.payload_offset, len)?;
            return Ok((disk.header, payload));
        }

        let data = block.buffer.read(<[u8]>::to_vec)?;
        let data_size = data.len() as u64;
        let payload = compress(compression, data)?;
        let used_size = payload.len() as u64;
        Ok((
            BlockHeader {
                flags: 0,
                compression,
                allocated_size: padded(used_size, self.policy.padding),
                used_size,
                data_size,
                checksum: [0; 16],
            },
            payload,
        ))
    }

    /// Parse the block area of a container starting at `offset`.
    ///
    /// Only headers are read; payloads are fetched and decompressed on first access. Parsing
    /// stops at the end of the source, after a streamed block, or at the first bytes that are
    /// not a block (such as a trailing block index).
    pub fn read_blocks(reader: ReadAtRef, offset: u64) -> AsdfResult<Self> {
        let size = reader.size()?;
        let mut manager = Self::default();
        let mut pos = offset;

        while pos + BLOCK_PREAMBLE_SIZE as u64 <= size {
            let preamble = reader.read_at(pos, BLOCK_PREAMBLE_SIZE)?;
            let Some(header_size) = BlockHeader::header_size(&preamble)? else {
                log::debug!("block area ends at byte {pos}");
                break;
            };
            let header_start = pos + BLOCK_PREAMBLE_SIZE as u64;
            let header = BlockHeader::parse(&reader.read_at(header_start, usize::from(header_size))?)?;
            let payload_offset = header_start + u64::from(header_size);

            if !header.compression.is_none() && codec_for(header.compression).is_err() {
                log::warn!(
                    "block {} uses unknown compression {}",
                    manager.blocks.len(),
                    header.compression
                );
            }

            let streamed = header.is_streamed();
            let (payload_len, block_end) = if streamed {
                (size.saturating_sub(payload_offset), size)
            } else {
                let Some(end) = payload_offset
                    .checked_add(header.allocated_size)
                    .filter(|end| *end <= size)
                else {
                    asdf_bail!(
                        BlockConsistency: "block {} at byte {} runs past the end of the file",
                        manager.blocks.len(),
                        pos
                    );
                };
                (header.used_size, end)
            };
            let disk = OnDisk {
                reader: reader.clone(),
                payload_offset,
                header,
                payload_len,
            };

            let data_size = if streamed { payload_len } else { header.data_size };
            let data_size = usize::try_from(data_size)
                .map_err(|_| asdf_err!(BlockConsistency: "block of {} bytes", data_size))?;
            let buffer = SharedBuffer::lazy(data_size, loader(disk.clone(), data_size)?);
            log::debug!(
                "read block {} header: {} of {} bytes used, compression {}",
                manager.blocks.len(),
                header.used_size,
                header.allocated_size,
                header.compression
            );

            let index = manager.find_or_create_block(&buffer);
            let block = &mut manager.blocks[index.0];
            block.storage = Some(if streamed {
                ArrayStorage::Streamed
            } else {
                ArrayStorage::Internal
            });
            block.compression = Some(header.compression);
            block.header = Some(header);
            block.on_disk = Some(disk);

            if streamed {
                break;
            }
            pos = block_end;
        }
        Ok(manager)
    }
}

/// Block headers and payloads produced by [`BlockManager::encode_blocks`].
#[derive(Debug, Default)]
pub struct EncodedBlocks(Vec<(BlockHeader, Vec<u8>)>);

impl EncodedBlocks {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Write each block: its header, its payload and the zero fill up to its allocated size.
    pub fn write_to<W: Write>(&self, out: &mut W) -> AsdfResult<()> {
        for (header, payload) in &self.0 {
            out.write_all(&header.to_bytes())?;
            out.write_all(payload)?;
            if !header.is_streamed() {
                let padding = header.allocated_size - payload.len() as u64;
                std::io::copy(&mut std::io::repeat(0).take(padding), out)?;
            }
        }
        Ok(())
    }
}

fn loader(disk: OnDisk, data_size: usize) -> AsdfResult<asdf_buffer::PayloadLoader> {
    let len = usize::try_from(disk.payload_len)
        .map_err(|_| asdf_err!(BlockConsistency: "block of {} bytes", disk.payload_len))?;
    Ok(Arc::new(move || {
        let raw = disk.reader.read_at(disk.payload_offset, len)?;
        decompress(disk.header.compression, raw, data_size)
    }))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn padded(used: u64, factor: f64) -> u64 {
    if factor <= 1.0 {
        return used;
    }
    ((used as f64) * factor).ceil().max(used as f64) as u64
}

#[cfg(test)]
mod tests {
    use asdf_buffer::{ByteOrder, DataType};
    use bytes::Bytes;
    use rstest::rstest;

    use super::*;

    fn array(len: usize) -> NDArray {
        NDArray::from_vec((0..len).map(|i| i as f64).collect(), vec![len]).unwrap()
    }

    fn written(manager: &mut BlockManager) -> Bytes {
        let mut out = Vec::new();
        manager.write_blocks(&mut out).unwrap();
        Bytes::from(out)
    }

    fn reread(bytes: Bytes) -> BlockManager {
        BlockManager::read_blocks(Arc::new(bytes), 0).unwrap()
    }

    #[test]
    fn views_of_one_buffer_share_a_block() {
        env_logger::builder().is_test(true).try_init().ok();
        let base = array(100);
        let view = base.slice(0, 10, 20, 1).unwrap();

        let mut manager = BlockManager::default();
        assert_eq!(
            manager.find_or_create_block(base.buffer()),
            manager.find_or_create_block(view.buffer())
        );

        manager.begin_write();
        assert_eq!(manager.reserve_source(base.buffer(), ArrayStorage::Internal).unwrap(), 0);
        assert_eq!(manager.reserve_source(view.buffer(), ArrayStorage::Internal).unwrap(), 0);
        let bytes = written(&mut manager);
        assert_eq!(manager.len(), 1);

        let read = reread(bytes);
        assert_eq!(read.len(), 1);
        assert_eq!(read.iter().next().unwrap().data_size(), 800);
    }

    #[rstest]
    #[case(64, ArrayStorage::Inline)]
    #[case(65, ArrayStorage::Internal)]
    fn auto_inline_threshold(#[case] len: usize, #[case] expected: ArrayStorage) {
        let manager = BlockManager::new(BlockPolicy::default().with_auto_inline(Some(64)));
        assert_eq!(manager.storage_for(&array(len)), expected);
    }

    #[test]
    fn explicit_storage_wins_over_policy() {
        let small = array(4);
        let mut manager = BlockManager::new(
            BlockPolicy::default()
                .with_auto_inline(Some(64))
                .with_storage(Some(ArrayStorage::Internal)),
        );
        assert_eq!(manager.storage_for(&small), ArrayStorage::Internal);
        manager.set_array_storage(&small, ArrayStorage::Inline).unwrap();
        assert_eq!(manager.storage_for(&small), ArrayStorage::Inline);
    }

    #[test]
    fn at_most_one_streamed_block() {
        let (a, b) = (array(3), array(3));
        let mut manager = BlockManager::default();
        manager.set_array_storage(&a, ArrayStorage::Streamed).unwrap();
        manager.set_array_storage(&a, ArrayStorage::Streamed).unwrap();
        let err = manager
            .set_array_storage(&b, ArrayStorage::Streamed)
            .unwrap_err();
        assert!(err.is_block_consistency());

        manager.begin_write();
        manager.reserve_source(a.buffer(), ArrayStorage::Streamed).unwrap();
        let err = manager
            .reserve_source(b.buffer(), ArrayStorage::Streamed)
            .unwrap_err();
        assert!(err.is_block_consistency());
    }

    #[test]
    fn streamed_block_reports_zero_sizes() {
        let internal = array(2);
        let streamed = array(10);
        let mut manager = BlockManager::default();
        manager.begin_write();
        assert_eq!(manager.reserve_source(streamed.buffer(), ArrayStorage::Streamed).unwrap(), -1);
        assert_eq!(manager.reserve_source(internal.buffer(), ArrayStorage::Internal).unwrap(), 0);
        let mut bytes = written(&mut manager).to_vec();
        // Streamed data grows after the header was written.
        bytes.extend_from_slice(&42f64.to_le_bytes());

        let read = reread(Bytes::from(bytes));
        let index = read.block_for_source(-1).unwrap();
        let block = read.block(index).unwrap();
        assert!(block.is_streamed());
        assert_eq!(
            (block.allocated_size(), block.used_size(), block.data_size()),
            (0, 0, 0)
        );
        assert_eq!(block.buffer().len(), 88);

        let grown = NDArray::try_new(
            block.buffer().clone(),
            DataType::Float64,
            ByteOrder::Little,
            vec![11],
            0,
            None,
        )
        .unwrap();
        assert_eq!(grown.to_vec::<f64>().unwrap()[10], 42.0);
    }

    #[test]
    fn payloads_load_lazily() {
        let data = array(16);
        let mut manager = BlockManager::default();
        manager.begin_write();
        manager.reserve_source(data.buffer(), ArrayStorage::Internal).unwrap();
        let read = reread(written(&mut manager));

        let block = read.iter().next().unwrap();
        assert_eq!(block.used_size(), 128);
        assert_eq!(block.compression(), Compression::NONE);
        assert!(!block.is_loaded());

        let buffer = read.buffer_for_source(0).unwrap();
        assert_eq!(buffer.to_bytes().unwrap(), data.buffer().to_bytes().unwrap());
        assert!(block.is_loaded());
    }

    #[test]
    fn compressed_and_padded_blocks() {
        let data = NDArray::from_vec(vec![7i32; 1000], vec![1000]).unwrap();
        let mut manager = BlockManager::new(BlockPolicy::default().with_padding(1.5).unwrap());
        manager.set_array_compression(&data, Compression::BZIP2);
        let plain = array(8);

        manager.begin_write();
        manager.reserve_source(data.buffer(), ArrayStorage::Internal).unwrap();
        manager.reserve_source(plain.buffer(), ArrayStorage::Internal).unwrap();
        let read = reread(written(&mut manager));

        let blocks = read.iter().collect_vec();
        assert_eq!(blocks[0].compression(), Compression::BZIP2);
        assert_eq!(blocks[0].data_size(), 4000);
        assert!(blocks[0].used_size() < 4000);
        assert_eq!(blocks[1].used_size(), 64);
        assert_eq!(blocks[1].allocated_size(), 96);

        assert_eq!(
            read.buffer_for_source(0).unwrap().to_bytes().unwrap(),
            data.buffer().to_bytes().unwrap()
        );
        assert_eq!(
            read.buffer_for_source(1).unwrap().to_bytes().unwrap(),
            plain.buffer().to_bytes().unwrap()
        );
    }

    #[test]
    fn padding_below_one_is_rejected() {
        assert!(BlockPolicy::default().with_padding(0.5).is_err());
    }

    #[test]
    fn sources_follow_first_reference_and_drop_unused() {
        let (a, b, c) = (array(1), array(2), array(3));
        let mut manager = BlockManager::default();
        for arr in [&a, &b, &c] {
            manager.find_or_create_block(arr.buffer());
        }

        manager.begin_write();
        assert_eq!(manager.reserve_source(c.buffer(), ArrayStorage::Internal).unwrap(), 0);
        assert_eq!(manager.reserve_source(a.buffer(), ArrayStorage::Internal).unwrap(), 1);
        assert_eq!(manager.reserve_source(c.buffer(), ArrayStorage::Internal).unwrap(), 0);
        written(&mut manager);

        assert_eq!(manager.len(), 2);
        assert_eq!(manager.find_block(c.buffer()), Some(manager.block_for_source(0).unwrap()));
        assert_eq!(manager.find_block(a.buffer()), Some(manager.block_for_source(1).unwrap()));
        assert_eq!(manager.find_block(b.buffer()), None);
    }

    #[test]
    fn untouched_blocks_are_copied_verbatim() {
        let data = NDArray::from_vec(vec![1u16; 64], vec![64]).unwrap();
        let mut manager = BlockManager::new(BlockPolicy::default().with_padding(2.0).unwrap());
        manager.set_array_compression(&data, Compression::BZIP2);
        manager.begin_write();
        manager.reserve_source(data.buffer(), ArrayStorage::Internal).unwrap();
        let first = written(&mut manager);

        let mut read = reread(first.clone());
        let buffer = read.buffer_for_source(0).unwrap();
        read.begin_write();
        read.reserve_source(&buffer, ArrayStorage::Internal).unwrap();
        let second = written(&mut read);

        assert_eq!(first, second);
        assert!(!buffer.is_loaded());
    }

    #[test]
    fn out_of_range_sources() {
        let read = reread(Bytes::new());
        assert!(read.block_for_source(0).unwrap_err().is_block_consistency());
        assert!(read.block_for_source(-1).unwrap_err().is_block_consistency());
        assert!(read.block_for_source(-7).unwrap_err().is_block_consistency());
    }

    #[test]
    fn truncated_block_is_rejected() {
        let data = array(8);
        let mut manager = BlockManager::default();
        manager.begin_write();
        manager.reserve_source(data.buffer(), ArrayStorage::Internal).unwrap();
        let bytes = written(&mut manager);

        let err = BlockManager::read_blocks(Arc::new(bytes.slice(..bytes.len() - 1)), 0).unwrap_err();
        assert!(err.is_block_consistency());
    }

    #[test]
    fn oversized_header_is_rejected() {
        let data = array(8);
        let mut manager = BlockManager::default();
        manager.begin_write();
        manager.reserve_source(data.buffer(), ArrayStorage::Internal).unwrap();
        let mut bytes = written(&mut manager).to_vec();

        // allocated_size, then used_size, right after flags and compression.
        bytes[14..22].copy_from_slice(&u64::MAX.to_be_bytes());
        bytes[22..30].copy_from_slice(&0u64.to_be_bytes());

        let err = BlockManager::read_blocks(Arc::new(Bytes::from(bytes)), 0).unwrap_err();
        assert!(err.is_block_consistency());
    }

    #[test]
    fn inline_has_no_source() {
        let mut manager = BlockManager::default();
        assert!(manager.reserve_source(array(1).buffer(), ArrayStorage::Inline).is_err());
    }
}
