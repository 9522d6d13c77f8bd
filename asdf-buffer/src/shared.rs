use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use asdf_error::{AsdfResult, asdf_bail};
use bytes::Bytes;
use parking_lot::RwLock;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// The allocation identity of a [`SharedBuffer`].
///
/// Two handles with the same id point at the same memory, regardless of their contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

impl BufferId {
    fn next() -> Self {
        Self(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for BufferId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "BufferId({})", self.0)
    }
}

/// Produces the payload of a pending buffer. May be called again if a previous call failed.
pub type PayloadLoader = Arc<dyn Fn() -> AsdfResult<Vec<u8>> + Send + Sync>;

enum State {
    Pending(PayloadLoader),
    Ready(Vec<u8>),
}

struct Inner {
    id: BufferId,
    len: usize,
    state: RwLock<State>,
}

/// A cheaply cloneable, mutable byte buffer with a stable identity.
///
/// Clones share both the identity and the bytes: a write through one handle is visible through
/// every other handle.
#[derive(Clone)]
pub struct SharedBuffer(Arc<Inner>);

impl SharedBuffer {
    /// Take ownership of the given bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Arc::new(Inner {
            id: BufferId::next(),
            len: bytes.len(),
            state: RwLock::new(State::Ready(bytes)),
        }))
    }

    /// A buffer of `len` zero bytes.
    pub fn zeroed(len: usize) -> Self {
        Self::new(vec![0; len])
    }

    /// A buffer of known length whose bytes are produced by `loader` on first access.
    pub fn lazy(len: usize, loader: PayloadLoader) -> Self {
        Self(Arc::new(Inner {
            id: BufferId::next(),
            len,
            state: RwLock::new(State::Pending(loader)),
        }))
    }

    /// The allocation identity of this buffer.
    #[inline]
    pub fn id(&self) -> BufferId {
        self.0.id
    }

    /// Length in bytes. Never forces a load.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len
    }

    /// Whether the buffer holds zero bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.len == 0
    }

    /// Whether the payload has been materialized.
    pub fn is_loaded(&self) -> bool {
        matches!(*self.0.state.read(), State::Ready(_))
    }

    /// Whether both handles point at the same allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Materialize the payload if it is still pending.
    pub fn load(&self) -> AsdfResult<()> {
        let loader = match &*self.0.state.read() {
            State::Ready(_) => return Ok(()),
            State::Pending(loader) => loader.clone(),
        };

        let bytes = loader()?;
        if bytes.len() != self.0.len {
            asdf_bail!(
                BlockConsistency: "buffer payload has {} bytes, expected {}",
                bytes.len(),
                self.0.len
            );
        }
        log::trace!("materialized {} ({} bytes)", self.0.id, bytes.len());

        let mut state = self.0.state.write();
        // Another handle may have won the race, keep whatever is there.
        if let State::Pending(_) = &*state {
            *state = State::Ready(bytes);
        }
        Ok(())
    }

    /// Run `f` over the bytes, loading them first if needed.
    pub fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> AsdfResult<R> {
        self.load()?;
        match &*self.0.state.read() {
            State::Ready(bytes) => Ok(f(bytes)),
            State::Pending(_) => asdf_bail!(BlockConsistency: "{} failed to load", self.0.id),
        }
    }

    /// Run `f` over the mutable bytes, loading them first if needed.
    pub fn write<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> AsdfResult<R> {
        self.load()?;
        match &mut *self.0.state.write() {
            State::Ready(bytes) => Ok(f(bytes)),
            State::Pending(_) => asdf_bail!(BlockConsistency: "{} failed to load", self.0.id),
        }
    }

    /// Copy the current contents out.
    pub fn to_bytes(&self) -> AsdfResult<Bytes> {
        self.read(Bytes::copy_from_slice)
    }
}

impl Debug for SharedBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("id", &self.0.id)
            .field("len", &self.0.len)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl From<Vec<u8>> for SharedBuffer {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn clones_share_identity_and_bytes() {
        let a = SharedBuffer::new(vec![1, 2, 3]);
        let b = a.clone();
        assert_eq!(a.id(), b.id());
        b.write(|bytes| bytes[0] = 9).unwrap();
        assert_eq!(a.read(|bytes| bytes[0]).unwrap(), 9);
    }

    #[test]
    fn distinct_allocations_have_distinct_ids() {
        let a = SharedBuffer::new(vec![1, 2, 3]);
        let b = SharedBuffer::new(vec![1, 2, 3]);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn lazy_buffer_loads_once_on_access() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let buffer = SharedBuffer::lazy(
            4,
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(vec![7; 4])
            }),
        );

        assert_eq!(buffer.len(), 4);
        assert!(!buffer.is_loaded());
        assert!(format!("{buffer:?}").contains("loaded: false"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(buffer.read(|b| b.to_vec()).unwrap(), vec![7; 4]);
        assert_eq!(buffer.read(|b| b.len()).unwrap(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lazy_buffer_rejects_wrong_length() {
        let buffer = SharedBuffer::lazy(4, Arc::new(|| Ok(vec![0; 3])));
        let err = buffer.load().unwrap_err();
        assert!(err.is_block_consistency());
        assert!(!buffer.is_loaded());
    }
}
