//! Storage behind [`crate::String`]: an inline buffer or a heap vector.
//!
//! Everything here works on raw bytes. Keeping the bytes valid UTF-8 is
//! the job of the `String` methods that call in.

use alloc::vec::Vec;
use tracing::trace;

/// Number of bytes a [`crate::String`] holds before it needs the allocator.
pub const INLINE_CAPACITY: usize = 23;

/// Heap capacity used when a single `push` spills an inline string.
const PUSH_SPILL_CAPACITY: usize = 32;

/// How a buffer grows when it runs out of room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Growth {
    /// Next power of two of the required length.
    PowerOfTwo,
    /// Single character appends: 32 bytes on spill, doubling afterwards.
    Push,
}

impl Growth {
    fn spill_capacity(self, needed: usize) -> usize {
        match self {
            Growth::PowerOfTwo => next_power_of_two(needed),
            Growth::Push => needed.max(PUSH_SPILL_CAPACITY),
        }
    }

    fn heap_capacity(self, current: usize, needed: usize) -> usize {
        match self {
            Growth::PowerOfTwo => next_power_of_two(needed),
            Growth::Push => current.saturating_mul(2).max(needed),
        }
    }
}

/// Rounds up to a power of two, falling back to `n` itself on overflow.
pub(crate) fn next_power_of_two(n: usize) -> usize {
    n.checked_next_power_of_two().unwrap_or(n)
}

pub(crate) enum Repr {
    Inline {
        len: u8,
        buf: [u8; INLINE_CAPACITY],
    },
    Heap(Vec<u8>),
}

impl Repr {
    pub(crate) const fn empty() -> Self {
        Repr::Inline {
            len: 0,
            buf: [0; INLINE_CAPACITY],
        }
    }

    /// Inline copy of `bytes`. The caller checks that they fit.
    pub(crate) fn inline(bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() <= INLINE_CAPACITY);
        let mut buf = [0; INLINE_CAPACITY];
        buf[..bytes.len()].copy_from_slice(bytes);
        Repr::Inline {
            len: bytes.len() as u8,
            buf,
        }
    }

    /// Heap copy of `bytes` with at least `capacity` bytes of room.
    pub(crate) fn heap_copy(bytes: &[u8], capacity: usize) -> Self {
        let mut vec = Vec::with_capacity(capacity.max(bytes.len()));
        vec.extend_from_slice(bytes);
        Repr::Heap(vec)
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        match self {
            Repr::Inline { len, .. } => *len as usize,
            Repr::Heap(vec) => vec.len(),
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        match self {
            Repr::Inline { .. } => INLINE_CAPACITY,
            Repr::Heap(vec) => vec.capacity(),
        }
    }

    #[inline]
    pub(crate) fn is_heap(&self) -> bool {
        matches!(self, Repr::Heap(_))
    }

    /// The live bytes, without inline padding.
    #[inline]
    pub(crate) fn bytes(&self) -> &[u8] {
        match self {
            Repr::Inline { len, buf } => &buf[..*len as usize],
            Repr::Heap(vec) => vec,
        }
    }

    #[inline]
    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Repr::Inline { len, buf } => &mut buf[..*len as usize],
            Repr::Heap(vec) => vec,
        }
    }

    /// Makes sure `needed` bytes fit, spilling or growing per `growth`.
    pub(crate) fn make_room(&mut self, needed: usize, growth: Growth) {
        match self {
            Repr::Inline { len, buf } => {
                if needed <= INLINE_CAPACITY {
                    return;
                }
                let capacity = growth.spill_capacity(needed);
                trace!(
                    len = *len,
                    needed,
                    capacity,
                    "spilling inline string to the heap"
                );
                *self = Repr::heap_copy(&buf[..*len as usize], capacity);
            }
            Repr::Heap(vec) => {
                if needed <= vec.capacity() {
                    return;
                }
                let capacity = growth.heap_capacity(vec.capacity(), needed);
                trace!(from = vec.capacity(), to = capacity, "growing heap string");
                vec.reserve_exact(capacity - vec.len());
            }
        }
    }

    /// Appends `bytes`, growing per `growth` when they do not fit.
    pub(crate) fn append(&mut self, bytes: &[u8], growth: Growth) {
        let old_len = self.len();
        let new_len = old_len + bytes.len();
        self.make_room(new_len, growth);
        match self {
            Repr::Inline { len, buf } => {
                buf[old_len..new_len].copy_from_slice(bytes);
                *len = new_len as u8;
            }
            Repr::Heap(vec) => vec.extend_from_slice(bytes),
        }
    }

    /// Inserts `bytes` at byte offset `idx`, shifting the tail right.
    pub(crate) fn insert(&mut self, idx: usize, bytes: &[u8]) {
        let old_len = self.len();
        let new_len = old_len + bytes.len();
        self.make_room(new_len, Growth::PowerOfTwo);
        match self {
            Repr::Inline { len, buf } => {
                buf.copy_within(idx..old_len, idx + bytes.len());
                buf[idx..idx + bytes.len()].copy_from_slice(bytes);
                *len = new_len as u8;
            }
            Repr::Heap(vec) => {
                vec.extend_from_slice(bytes);
                vec[idx..].rotate_right(bytes.len());
            }
        }
    }

    /// Drops the bytes in `start..end`, shifting the tail left.
    pub(crate) fn remove_range(&mut self, start: usize, end: usize) {
        match self {
            Repr::Inline { len, buf } => {
                let old_len = *len as usize;
                buf.copy_within(end..old_len, start);
                *len = (old_len - (end - start)) as u8;
            }
            Repr::Heap(vec) => {
                vec.drain(start..end);
            }
        }
    }

    /// Shortens to `new_len` bytes. Capacity and location are unchanged.
    pub(crate) fn truncate(&mut self, new_len: usize) {
        match self {
            Repr::Inline { len, .. } => {
                if new_len < *len as usize {
                    *len = new_len as u8;
                }
            }
            Repr::Heap(vec) => vec.truncate(new_len),
        }
    }

    pub(crate) fn shrink_to_fit(&mut self) {
        if let Repr::Heap(vec) = self {
            vec.shrink_to_fit();
        }
    }

    pub(crate) fn into_vec(self) -> Vec<u8> {
        match self {
            Repr::Inline { len, buf } => buf[..len as usize].to_vec(),
            Repr::Heap(vec) => vec,
        }
    }
}

impl Clone for Repr {
    fn clone(&self) -> Self {
        match self {
            Repr::Inline { len, buf } => Repr::Inline {
                len: *len,
                buf: *buf,
            },
            // Short heap strings come back inline; longer ones keep their capacity.
            Repr::Heap(vec) if vec.len() <= INLINE_CAPACITY => Repr::inline(vec),
            Repr::Heap(vec) => Repr::heap_copy(vec, vec.capacity()),
        }
    }
}
