use std::fmt::{Debug, Display, Formatter};
use std::io::{Read, Write};
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use asdf_error::{AsdfError, AsdfResult, asdf_bail, asdf_err};
use dashmap::DashMap;

/// The four-byte compression label stored in a block header. All zeros means uncompressed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Compression([u8; 4]);

impl Compression {
    /// Uncompressed payload.
    pub const NONE: Self = Self([0; 4]);
    /// bzip2 compressed payload.
    pub const BZIP2: Self = Self(*b"bzp2");

    /// Wrap a raw header label.
    pub const fn from_label(label: [u8; 4]) -> Self {
        Self(label)
    }

    /// The raw header label.
    pub const fn label(&self) -> [u8; 4] {
        self.0
    }

    /// Whether the payload is stored as is.
    pub fn is_none(&self) -> bool {
        self.0 == [0; 4]
    }
}

impl Display for Compression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_none() {
            return f.write_str("none");
        }
        for byte in self.0 {
            if byte.is_ascii_graphic() {
                write!(f, "{}", char::from(byte))?;
            } else {
                write!(f, "\\x{byte:02x}")?;
            }
        }
        Ok(())
    }
}

impl Debug for Compression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Compression({self})")
    }
}

impl FromStr for Compression {
    type Err = AsdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "none" => Ok(Self::NONE),
            "bzp2" | "bzip2" => Ok(Self::BZIP2),
            other => {
                let label: [u8; 4] = other
                    .as_bytes()
                    .try_into()
                    .map_err(|_| asdf_err!("compression label '{}' is not four bytes", other))?;
                Ok(Self(label))
            }
        }
    }
}

/// Compresses and decompresses block payloads.
pub trait Codec: Debug + Send + Sync {
    /// The header label this codec is registered under.
    fn compression(&self) -> Compression;

    fn compress(&self, data: &[u8]) -> AsdfResult<Vec<u8>>;

    /// Decompress `data`, which must expand to exactly `data_size` bytes.
    fn decompress(&self, data: &[u8], data_size: usize) -> AsdfResult<Vec<u8>>;
}

pub type CodecRef = Arc<dyn Codec>;

/// bzip2, label `bzp2`.
#[derive(Debug, Default)]
pub struct Bzip2Codec;

impl Codec for Bzip2Codec {
    fn compression(&self) -> Compression {
        Compression::BZIP2
    }

    fn compress(&self, data: &[u8]) -> AsdfResult<Vec<u8>> {
        let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    fn decompress(&self, data: &[u8], data_size: usize) -> AsdfResult<Vec<u8>> {
        // The declared size comes from the file; it bounds the output but not the allocation.
        let mut out = Vec::with_capacity(data_size.min(data.len().saturating_mul(8)));
        let limit = u64::try_from(data_size).unwrap_or(u64::MAX).saturating_add(1);
        bzip2::read::BzDecoder::new(data)
            .take(limit)
            .read_to_end(&mut out)?;
        if out.len() != data_size {
            asdf_bail!(
                BlockConsistency: "bzp2 payload expanded to {} bytes, header declares {}",
                out.len(),
                data_size
            );
        }
        Ok(out)
    }
}

static CODECS: LazyLock<DashMap<Compression, CodecRef>> = LazyLock::new(|| {
    let codecs = DashMap::new();
    codecs.insert(Compression::BZIP2, Arc::new(Bzip2Codec) as CodecRef);
    codecs
});

/// Make a codec available to every block manager in the process, replacing any codec already
/// registered under the same label.
pub fn register_codec(codec: CodecRef) {
    log::debug!("registering block codec {}", codec.compression());
    CODECS.insert(codec.compression(), codec);
}

/// The codec registered for `compression`.
pub fn codec_for(compression: Compression) -> AsdfResult<CodecRef> {
    CODECS
        .get(&compression)
        .map(|codec| codec.value().clone())
        .ok_or_else(|| asdf_err!(BlockConsistency: "no codec registered for compression {}", compression))
}

/// Compress `data`, passing it through untouched when `compression` is none.
pub(crate) fn compress(compression: Compression, data: Vec<u8>) -> AsdfResult<Vec<u8>> {
    if compression.is_none() {
        return Ok(data);
    }
    codec_for(compression)?.compress(&data)
}

/// Inverse of [`compress`].
pub(crate) fn decompress(
    compression: Compression,
    data: Vec<u8>,
    data_size: usize,
) -> AsdfResult<Vec<u8>> {
    if compression.is_none() {
        return Ok(data);
    }
    codec_for(compression)?.decompress(&data, data_size)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("none", Compression::NONE)]
    #[case("bzp2", Compression::BZIP2)]
    #[case("bzip2", Compression::BZIP2)]
    #[case("zlib", Compression::from_label(*b"zlib"))]
    fn parse_labels(#[case] text: &str, #[case] expected: Compression) {
        assert_eq!(text.parse::<Compression>().unwrap(), expected);
    }

    #[test]
    fn bad_label_length() {
        assert!("lz4hc".parse::<Compression>().is_err());
    }

    #[test]
    fn bzip2_restores_payload() {
        let data = (0..4096u32).flat_map(|i| (i % 7).to_le_bytes()).collect::<Vec<_>>();
        let packed = compress(Compression::BZIP2, data.clone()).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(decompress(Compression::BZIP2, packed.clone(), data.len()).unwrap(), data);
        assert!(
            decompress(Compression::BZIP2, packed, data.len() + 1)
                .unwrap_err()
                .is_block_consistency()
        );
    }

    #[rstest]
    #[case(usize::MAX)]
    #[case(100)]
    fn bzip2_rejects_wrong_declared_size(#[case] declared: usize) {
        let data = vec![3u8; 4096];
        let packed = compress(Compression::BZIP2, data).unwrap();
        assert!(
            decompress(Compression::BZIP2, packed, declared)
                .unwrap_err()
                .is_block_consistency()
        );
    }

    #[test]
    fn unknown_codec() {
        let err = codec_for(Compression::from_label(*b"zzzz")).unwrap_err();
        assert!(err.is_block_consistency());
    }
}
