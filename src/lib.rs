//! Decoder for USTAR archives that are already fully in memory.
//!
//! [`decode`] walks the buffer block by block and returns one [`ArchiveRecord`] per header that
//! carries the `ustar\0` magic. Records borrow both their header fields and their content from
//! the buffer, nothing is copied. The scan ends at the first block without the magic (the
//! end-of-archive marker, or garbage), at the end of the buffer, or at the first fatal
//! violation such as truncated content. Checksums are not verified.
#![no_std]
extern crate alloc;

mod tar;

pub use tar::*;
