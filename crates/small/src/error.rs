//! Error types for string conversions

use alloc::vec::Vec;
use core::str::Utf8Error;
use thiserror::Error;

/// Returned by [`crate::String::from_utf8`] when the bytes are not UTF-8.
///
/// The rejected bytes are handed back so the caller can recover them
/// without another allocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid utf-8: {error}")]
pub struct FromUtf8Error {
    pub(crate) bytes: Vec<u8>,
    pub(crate) error: Utf8Error,
}

impl FromUtf8Error {
    /// The bytes that failed to convert.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Gives back the bytes that failed to convert.
    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Details of the conversion failure, such as the offset of the first bad byte.
    #[inline]
    pub fn utf8_error(&self) -> Utf8Error {
        self.error
    }
}
