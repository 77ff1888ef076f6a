//! small - an inline-first UTF-8 string
//!
//! [`String`] is a drop-in replacement for the standard string that keeps
//! up to [`INLINE_CAPACITY`] bytes inside the value itself and only touches
//! the allocator once it outgrows that.
//!
//! - Builds with or without `std` (`default-features = false` gives a
//!   `#![no_std]` crate on top of `alloc`)
//! - Optional `serde` support behind the `serde` feature
//! - Once a string has spilled to the heap it stays there

#![cfg_attr(not(any(feature = "std", test)), no_std)]

extern crate alloc;

pub mod error;
mod impls;
mod repr;
#[cfg(feature = "serde")]
mod serde_impl;
pub mod string;

// Re-export key types
pub use error::FromUtf8Error;
pub use repr::INLINE_CAPACITY;
pub use string::String;

/// small crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
