use std::fmt::Debug;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use asdf_error::{AsdfResult, asdf_bail, asdf_err};
use bytes::Bytes;
use parking_lot::Mutex;

/// Positional reads over the bytes of a container.
///
/// Block payloads keep a handle to their reader so they can be materialized on first access,
/// long after the block headers were parsed.
pub trait ReadAt: Debug + Send + Sync {
    /// Total number of readable bytes.
    fn size(&self) -> AsdfResult<u64>;

    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Fails with a [`BlockConsistency`](asdf_error::AsdfError::BlockConsistency) error if the
    /// range runs past the end of the source.
    fn read_at(&self, offset: u64, len: usize) -> AsdfResult<Vec<u8>>;
}

/// A shared, type-erased reader.
pub type ReadAtRef = Arc<dyn ReadAt>;

impl ReadAt for Bytes {
    fn size(&self) -> AsdfResult<u64> {
        Ok(self.len() as u64)
    }

    fn read_at(&self, offset: u64, len: usize) -> AsdfResult<Vec<u8>> {
        let start = usize::try_from(offset)
            .map_err(|_| asdf_err!(BlockConsistency: "offset {offset} too large"))?;
        match start.checked_add(len) {
            Some(end) if end <= self.len() => Ok(self[start..end].to_vec()),
            _ => asdf_bail!(
                BlockConsistency: "read of {len} bytes at {offset} past end of {} byte source",
                self.len()
            ),
        }
    }
}

/// Reads from a file on disk, opened once and shared between all blocks of a document.
#[derive(Debug)]
pub struct FileReadAt {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileReadAt {
    /// Open `path` for reading.
    pub fn open(path: impl AsRef<Path>) -> AsdfResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// The path this reader was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReadAt for FileReadAt {
    fn size(&self) -> AsdfResult<u64> {
        Ok(self.file.lock().metadata()?.len())
    }

    fn read_at(&self, offset: u64, len: usize) -> AsdfResult<Vec<u8>> {
        let mut file = self.file.lock();
        let size = file.metadata()?.len();
        if offset.saturating_add(len as u64) > size {
            asdf_bail!(
                BlockConsistency: "read of {len} bytes at {offset} past end of {}",
                self.path.display()
            );
        }
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn bytes_ranges_are_checked() {
        let bytes = Bytes::from_static(b"0123456789");
        assert_eq!(bytes.read_at(2, 3).unwrap(), b"234");
        assert!(bytes.read_at(8, 3).unwrap_err().is_block_consistency());
    }

    #[test]
    fn file_reads_positionally() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"header|payload").unwrap();

        let reader = FileReadAt::open(tmp.path()).unwrap();
        assert_eq!(reader.size().unwrap(), 14);
        assert_eq!(reader.read_at(7, 7).unwrap(), b"payload");
        assert_eq!(reader.read_at(0, 6).unwrap(), b"header");
        assert!(reader.read_at(10, 7).unwrap_err().is_block_consistency());
    }
}
