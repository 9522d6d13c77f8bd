use asdf_error::{AsdfResult, asdf_bail};

use crate::codec::Compression;

/// Every block starts with these four bytes.
pub const BLOCK_MAGIC: [u8; 4] = *b"\xd3BLK";

/// Size of the header fields following the magic and the header size itself.
pub const BLOCK_HEADER_SIZE: u16 = 48;

/// Magic plus the big-endian `u16` header size.
pub const BLOCK_PREAMBLE_SIZE: usize = 6;

/// Header flag marking the final block whose length runs to the end of the file.
pub const STREAMED: u32 = 0x1;

/// The fixed-size record preceding every block payload. All integers are big-endian.
///
/// ```text
/// magic           4 bytes   \xd3BLK
/// header_size     u16       48
/// flags           u32
/// compression     [u8; 4]
/// allocated_size  u64
/// used_size       u64
/// data_size       u64
/// checksum        [u8; 16]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockHeader {
    pub flags: u32,
    pub compression: Compression,
    /// Bytes reserved on disk for the payload, at least `used_size`.
    pub allocated_size: u64,
    /// Bytes of (possibly compressed) payload actually written.
    pub used_size: u64,
    /// Size of the payload after decompression.
    pub data_size: u64,
    pub checksum: [u8; 16],
}

impl BlockHeader {
    /// The header of the streamed block, whose sizes are unknown when it is written.
    pub fn streamed() -> Self {
        Self {
            flags: STREAMED,
            ..Default::default()
        }
    }

    pub fn is_streamed(&self) -> bool {
        self.flags & STREAMED != 0
    }

    /// Bytes taken by the preamble and header on disk.
    pub const fn encoded_len() -> usize {
        BLOCK_PREAMBLE_SIZE + BLOCK_HEADER_SIZE as usize
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::encoded_len());
        out.extend_from_slice(&BLOCK_MAGIC);
        out.extend_from_slice(&BLOCK_HEADER_SIZE.to_be_bytes());
        out.extend_from_slice(&self.flags.to_be_bytes());
        out.extend_from_slice(&self.compression.label());
        out.extend_from_slice(&self.allocated_size.to_be_bytes());
        out.extend_from_slice(&self.used_size.to_be_bytes());
        out.extend_from_slice(&self.data_size.to_be_bytes());
        out.extend_from_slice(&self.checksum);
        out
    }

    /// Parse the header size from a preamble. Returns `None` if `preamble` does not start with
    /// the block magic.
    pub fn header_size(preamble: &[u8]) -> AsdfResult<Option<u16>> {
        if preamble.len() < BLOCK_PREAMBLE_SIZE || preamble[..4] != BLOCK_MAGIC {
            return Ok(None);
        }
        let size = u16::from_be_bytes([preamble[4], preamble[5]]);
        if size < BLOCK_HEADER_SIZE {
            asdf_bail!(
                BlockConsistency: "block header size {} is smaller than {}",
                size,
                BLOCK_HEADER_SIZE
            );
        }
        Ok(Some(size))
    }

    /// Parse the header fields following the preamble. Bytes beyond the known fields, written by
    /// a newer version of the format, are ignored.
    pub fn parse(header: &[u8]) -> AsdfResult<Self> {
        if header.len() < usize::from(BLOCK_HEADER_SIZE) {
            asdf_bail!(
                BlockConsistency: "block header truncated to {} bytes",
                header.len()
            );
        }
        let u64_at = |at: usize| {
            let mut buf = [0; 8];
            buf.copy_from_slice(&header[at..at + 8]);
            u64::from_be_bytes(buf)
        };
        let header = Self {
            flags: u32::from_be_bytes([header[0], header[1], header[2], header[3]]),
            compression: Compression::from_label([header[4], header[5], header[6], header[7]]),
            allocated_size: u64_at(8),
            used_size: u64_at(16),
            data_size: u64_at(24),
            checksum: {
                let mut checksum = [0; 16];
                checksum.copy_from_slice(&header[32..48]);
                checksum
            },
        };
        if !header.is_streamed() && header.used_size > header.allocated_size {
            asdf_bail!(
                BlockConsistency: "block uses {} bytes but only {} are allocated",
                header.used_size,
                header.allocated_size
            );
        }
        Ok(header)
    }
}
