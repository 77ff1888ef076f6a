//! The inline-first string type.

use alloc::string::String as StdString;
use alloc::vec::Vec;
use core::fmt;

use crate::error::FromUtf8Error;
use crate::repr::{next_power_of_two, Growth, Repr, INLINE_CAPACITY};

/// A UTF-8 encoded, growable string which stores up to 23 bytes inline.
///
/// `small::String` can stand in for the standard string anywhere a `&str`
/// view is enough; it dereferences to `str` and converts to and from the
/// standard type. A standard string can be adopted with
/// [`String::from_string`] without copying.
///
/// Once a `small::String` starts using the heap it never moves back inline,
/// even if it is truncated or cleared.
///
/// ```
/// use small::String;
///
/// let mut s = String::from("hello");
/// assert!(!s.overflowed());
///
/// s.push_str(", this no longer fits inline");
/// assert!(s.overflowed());
/// assert_eq!(s, "hello, this no longer fits inline");
/// ```
pub struct String {
    pub(crate) repr: Repr,
}

impl String {
    /// Creates a new empty `String`, stored inline.
    #[inline]
    pub const fn new() -> String {
        String {
            repr: Repr::empty(),
        }
    }

    /// Creates an empty `String` backed by a heap buffer of at least
    /// `capacity` bytes.
    ///
    /// A capacity of `0` allocates nothing and is the same as [`String::new`].
    ///
    /// ```
    /// use small::String;
    ///
    /// let s = String::with_capacity(10);
    /// assert!(s.overflowed());
    /// assert!(s.capacity() >= 10);
    /// assert!(!String::with_capacity(0).overflowed());
    /// ```
    #[inline]
    pub fn with_capacity(capacity: usize) -> String {
        if capacity == 0 {
            return String::new();
        }
        String {
            repr: Repr::Heap(Vec::with_capacity(capacity)),
        }
    }

    /// Adopts a standard string's buffer without copying or reallocating.
    ///
    /// The result is always on the heap, even for short strings.
    #[inline]
    pub fn from_string(string: StdString) -> String {
        String {
            repr: Repr::Heap(string.into_bytes()),
        }
    }

    /// Converts a vector of bytes to a `String`, taking over the buffer.
    ///
    /// ```
    /// use small::String;
    ///
    /// let s = String::from_utf8(vec![240, 159, 146, 150]).unwrap();
    /// assert_eq!(s, "💖");
    ///
    /// let err = String::from_utf8(vec![0, 159]).unwrap_err();
    /// assert_eq!(err.utf8_error().valid_up_to(), 1);
    /// assert_eq!(err.into_bytes(), vec![0, 159]);
    /// ```
    pub fn from_utf8(bytes: Vec<u8>) -> Result<String, FromUtf8Error> {
        match core::str::from_utf8(&bytes) {
            Ok(_) => Ok(String {
                repr: Repr::Heap(bytes),
            }),
            Err(error) => Err(FromUtf8Error { bytes, error }),
        }
    }

    /// Converts a vector of bytes to a `String` without checking the contents.
    ///
    /// # Safety
    ///
    /// `bytes` must be valid UTF-8. Every other method assumes it is.
    #[inline]
    pub unsafe fn from_utf8_unchecked(bytes: Vec<u8>) -> String {
        String {
            repr: Repr::Heap(bytes),
        }
    }

    /// Length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.repr.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity in bytes. Inline strings always report [`INLINE_CAPACITY`].
    #[inline]
    pub fn capacity(&self) -> usize {
        self.repr.capacity()
    }

    /// Whether the contents live on the heap.
    #[inline]
    pub fn overflowed(&self) -> bool {
        self.repr.is_heap()
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        // SAFETY: the live bytes are valid UTF-8; every mutating method keeps them so.
        unsafe { core::str::from_utf8_unchecked(self.repr.bytes()) }
    }

    #[inline]
    pub fn as_mut_str(&mut self) -> &mut str {
        // SAFETY: as in `as_str`.
        unsafe { core::str::from_utf8_unchecked_mut(self.repr.bytes_mut()) }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.repr.bytes()
    }

    /// Mutable view of the live bytes.
    ///
    /// # Safety
    ///
    /// The bytes must still be valid UTF-8 when the borrow ends.
    #[inline]
    pub unsafe fn as_mut_bytes(&mut self) -> &mut [u8] {
        self.repr.bytes_mut()
    }

    /// Appends a string slice.
    ///
    /// While the result fits in 23 bytes it stays inline. Otherwise the heap
    /// buffer is sized to the next power of two of the new length.
    #[inline]
    pub fn push_str(&mut self, string: &str) {
        self.repr.append(string.as_bytes(), Growth::PowerOfTwo);
    }

    /// Appends a single character.
    ///
    /// A push that overflows the inline buffer moves the string to a 32 byte
    /// heap buffer; a push that overflows a heap buffer doubles it.
    #[inline]
    pub fn push(&mut self, ch: char) {
        let mut utf8 = [0; 4];
        self.repr
            .append(ch.encode_utf8(&mut utf8).as_bytes(), Growth::Push);
    }

    /// Inserts a character at byte index `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is past the end or not on a `char` boundary.
    pub fn insert(&mut self, idx: usize, ch: char) {
        let mut utf8 = [0; 4];
        self.insert_str(idx, ch.encode_utf8(&mut utf8));
    }

    /// Inserts a string slice at byte index `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is past the end or not on a `char` boundary.
    pub fn insert_str(&mut self, idx: usize, string: &str) {
        assert!(self.is_char_boundary(idx), "insertion index is not a char boundary");
        self.repr.insert(idx, string.as_bytes());
    }

    /// Ensures room for at least `additional` more bytes.
    ///
    /// Nothing happens while an inline string can absorb the extra bytes.
    /// Otherwise the heap buffer is sized to the next power of two of
    /// `len() + additional`.
    #[inline]
    pub fn reserve(&mut self, additional: usize) {
        let needed = self
            .len()
            .checked_add(additional)
            .expect("capacity overflow");
        self.repr.make_room(needed, Growth::PowerOfTwo);
    }

    /// Shortens the string to `new_len` bytes.
    ///
    /// Does nothing if `new_len` is not smaller than the current length.
    /// Capacity and storage location are unchanged.
    ///
    /// # Panics
    ///
    /// Panics if `new_len` does not lie on a `char` boundary.
    #[inline]
    pub fn truncate(&mut self, new_len: usize) {
        if new_len <= self.len() {
            assert!(
                self.is_char_boundary(new_len),
                "new length is not a char boundary"
            );
            self.repr.truncate(new_len);
        }
    }

    /// Removes the last character and returns it.
    #[inline]
    pub fn pop(&mut self) -> Option<char> {
        let ch = self.chars().next_back()?;
        let new_len = self.len() - ch.len_utf8();
        self.repr.truncate(new_len);
        Some(ch)
    }

    /// Removes the character starting at byte index `idx` and returns it.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is at or past the end, or not on a `char` boundary.
    pub fn remove(&mut self, idx: usize) -> char {
        let ch = match self[idx..].chars().next() {
            Some(ch) => ch,
            None => panic!("cannot remove a char from the end of a string"),
        };
        self.repr.remove_range(idx, idx + ch.len_utf8());
        ch
    }

    /// Keeps only the characters for which `keep` returns `true`.
    ///
    /// Runs in place, visiting each character once in order.
    ///
    /// ```
    /// use small::String;
    ///
    /// let mut s = String::from("f_o_ob_ar");
    /// s.retain(|c| c != '_');
    /// assert_eq!(s, "foobar");
    /// ```
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(char) -> bool,
    {
        // Truncates to the compacted prefix on drop, including when `keep`
        // panics, so the string never exposes half-shifted bytes.
        struct SetLenOnDrop<'a> {
            repr: &'a mut Repr,
            idx: usize,
            deleted: usize,
        }

        impl Drop for SetLenOnDrop<'_> {
            fn drop(&mut self) {
                if self.deleted > 0 {
                    self.repr.truncate(self.idx - self.deleted);
                }
            }
        }

        let len = self.len();
        let mut guard = SetLenOnDrop {
            repr: &mut self.repr,
            idx: 0,
            deleted: 0,
        };

        while guard.idx < len {
            let idx = guard.idx;
            // SAFETY: `idx..len` has not been written to yet and starts on a
            // char boundary, so it is still valid UTF-8.
            let rest = &guard.repr.bytes()[idx..len];
            let ch = match unsafe { core::str::from_utf8_unchecked(rest) }.chars().next() {
                Some(ch) => ch,
                None => break,
            };
            let ch_len = ch.len_utf8();

            if !keep(ch) {
                guard.deleted += ch_len;
            } else if guard.deleted > 0 {
                let deleted = guard.deleted;
                guard
                    .repr
                    .bytes_mut()
                    .copy_within(idx..idx + ch_len, idx - deleted);
            }
            guard.idx += ch_len;
        }
    }

    /// Empties the string. Capacity and storage location are unchanged.
    #[inline]
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// Shrinks a heap buffer to the string's length. Inline strings are untouched.
    #[inline]
    pub fn shrink_to_fit(&mut self) {
        self.repr.shrink_to_fit();
    }

    /// Returns the live bytes as a vector, reusing the heap buffer if there is one.
    ///
    /// ```
    /// use small::String;
    ///
    /// assert_eq!(String::from("hello").into_bytes(), b"hello".to_vec());
    /// ```
    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.repr.into_vec()
    }

    /// Converts into the standard string, reusing the heap buffer if there is one.
    #[inline]
    pub fn into_string(self) -> StdString {
        let bytes = self.into_bytes();
        // SAFETY: the bytes came from a `String` and are valid UTF-8.
        unsafe { StdString::from_utf8_unchecked(bytes) }
    }

    /// Copies `string` inline when it fits, otherwise onto the heap with a
    /// power of two capacity.
    pub(crate) fn copy_from_str(string: &str) -> String {
        let bytes = string.as_bytes();
        let repr = if bytes.len() <= INLINE_CAPACITY {
            Repr::inline(bytes)
        } else {
            Repr::heap_copy(bytes, next_power_of_two(bytes.len()))
        };
        String { repr }
    }
}

impl fmt::Debug for String {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "On {}: '{}'",
            if self.overflowed() { "heap" } else { "stack" },
            self.as_str(),
        )
    }
}
