use core::{fmt::Display, str::Utf8Error};

use thiserror::Error;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

// --- Constants for the TAR Header Format ---
pub const BLOCK_SIZE: usize = 512;

/// A block of zeros, the conventional end-of-archive marker (written twice).
pub const TAR_ZERO_HEADER: [u8; BLOCK_SIZE] = [0; BLOCK_SIZE];

/// `u s t a r \0`, the only magic accepted by the decoder.
pub const USTAR_MAGIC: &[u8; MAGIC_LEN] = b"ustar\0";

// --- Header Field Lengths ---
pub const NAME_LEN: usize = 100;
pub const MODE_LEN: usize = 8;
pub const UID_LEN: usize = 8;
pub const GID_LEN: usize = 8;
pub const SIZE_LEN: usize = 12;
pub const MTIME_LEN: usize = 12;
pub const CHECKSUM_LEN: usize = 8;
pub const TYPEFLAG_LEN: usize = 1;
pub const LINKNAME_LEN: usize = 100;
pub const MAGIC_LEN: usize = 6;
pub const VERSION_LEN: usize = 2;
pub const UNAME_LEN: usize = 32;
pub const GNAME_LEN: usize = 32;
pub const DEVMAJOR_LEN: usize = 8;
pub const DEVMINOR_LEN: usize = 8;
pub const PREFIX_LEN: usize = 155;
pub const PADDING_LEN: usize = 12;

/// Only the first 11 bytes of the size field carry digits, the last one is a terminator.
pub const SIZE_DIGITS_LEN: usize = SIZE_LEN - 1;

/// The fields of a USTAR header block in on-disk order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum HeaderField {
  Name,
  Mode,
  Uid,
  Gid,
  Size,
  Mtime,
  Checksum,
  Typeflag,
  Linkname,
  Magic,
  Version,
  Uname,
  Gname,
  DevMajor,
  DevMinor,
  Prefix,
  /// Reserved bytes filling the block up to [`BLOCK_SIZE`].
  Padding,
}

/// The (field, length) table partitioning one header block.
///
/// The offset of a field is the sum of the lengths listed before it.
pub const HEADER_LAYOUT: [(HeaderField, usize); 17] = [
  (HeaderField::Name, NAME_LEN),
  (HeaderField::Mode, MODE_LEN),
  (HeaderField::Uid, UID_LEN),
  (HeaderField::Gid, GID_LEN),
  (HeaderField::Size, SIZE_LEN),
  (HeaderField::Mtime, MTIME_LEN),
  (HeaderField::Checksum, CHECKSUM_LEN),
  (HeaderField::Typeflag, TYPEFLAG_LEN),
  (HeaderField::Linkname, LINKNAME_LEN),
  (HeaderField::Magic, MAGIC_LEN),
  (HeaderField::Version, VERSION_LEN),
  (HeaderField::Uname, UNAME_LEN),
  (HeaderField::Gname, GNAME_LEN),
  (HeaderField::DevMajor, DEVMAJOR_LEN),
  (HeaderField::DevMinor, DEVMINOR_LEN),
  (HeaderField::Prefix, PREFIX_LEN),
  (HeaderField::Padding, PADDING_LEN),
];

const _: () = {
  let mut total = 0;
  let mut i = 0;
  while i < HEADER_LAYOUT.len() {
    total += HEADER_LAYOUT[i].1;
    i += 1;
  }
  assert!(total == BLOCK_SIZE);
};

impl HeaderField {
  #[must_use]
  pub fn field_len(self) -> usize {
    HEADER_LAYOUT
      .iter()
      .find(|(field, _)| *field == self)
      .map_or(0, |(_, len)| *len)
  }

  /// Byte offset of the field inside the header block.
  #[must_use]
  pub fn offset(self) -> usize {
    HEADER_LAYOUT
      .iter()
      .take_while(|(field, _)| *field != self)
      .map(|(_, len)| len)
      .sum()
  }

  #[must_use]
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Name => "name",
      Self::Mode => "mode",
      Self::Uid => "uid",
      Self::Gid => "gid",
      Self::Size => "size",
      Self::Mtime => "mtime",
      Self::Checksum => "checksum",
      Self::Typeflag => "typeflag",
      Self::Linkname => "linkname",
      Self::Magic => "magic",
      Self::Version => "version",
      Self::Uname => "uname",
      Self::Gname => "gname",
      Self::DevMajor => "devmajor",
      Self::DevMinor => "devminor",
      Self::Prefix => "prefix",
      Self::Padding => "padding",
    }
  }
}

impl Display for HeaderField {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    write!(f, "header.{}", self.as_str())
  }
}

/// The USTAR type flag, as far as the plain USTAR format defines it.
///
/// - `0` or `\0` for regular file
/// - `1` for hard link
/// - `2` for symbolic link
/// - `3` for character device
/// - `4` for block device
/// - `5` for directory
/// - `6` for FIFO
/// - `7` for contiguous file
///
/// Anything else (GNU, PAX, vendor extensions) is kept as [`TarTypeFlag::Other`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TarTypeFlag {
  RegularFile,
  HardLink,
  SymbolicLink,
  CharacterDevice,
  BlockDevice,
  Directory,
  Fifo,
  ContiguousFile,
  Other(u8),
}

impl TarTypeFlag {
  #[must_use]
  pub fn is_directory(self) -> bool {
    self == Self::Directory
  }

  #[must_use]
  pub fn is_regular_file(self) -> bool {
    matches!(self, Self::RegularFile | Self::ContiguousFile)
  }
}

impl From<u8> for TarTypeFlag {
  fn from(value: u8) -> Self {
    match value {
      b'\0' | b'0' => Self::RegularFile,
      b'1' => Self::HardLink,
      b'2' => Self::SymbolicLink,
      b'3' => Self::CharacterDevice,
      b'4' => Self::BlockDevice,
      b'5' => Self::Directory,
      b'6' => Self::Fifo,
      b'7' => Self::ContiguousFile,
      _ => Self::Other(value),
    }
  }
}

impl From<TarTypeFlag> for u8 {
  fn from(value: TarTypeFlag) -> Self {
    match value {
      TarTypeFlag::RegularFile => b'0',
      TarTypeFlag::HardLink => b'1',
      TarTypeFlag::SymbolicLink => b'2',
      TarTypeFlag::CharacterDevice => b'3',
      TarTypeFlag::BlockDevice => b'4',
      TarTypeFlag::Directory => b'5',
      TarTypeFlag::Fifo => b'6',
      TarTypeFlag::ContiguousFile => b'7',
      TarTypeFlag::Other(value) => value,
    }
  }
}

/// Rounds `size` up to the next multiple of [`BLOCK_SIZE`].
///
/// Returns `None` if the result does not fit in a `usize`.
#[must_use]
pub fn align_to_block_size(size: usize) -> Option<usize> {
  size.div_ceil(BLOCK_SIZE).checked_mul(BLOCK_SIZE)
}

/// Returns the bytes before the first NUL, or all of them if there is none.
#[must_use]
pub fn trim_nul(bytes: &[u8]) -> &[u8] {
  let end = bytes.iter().position(|&b| b == b'\0').unwrap_or(bytes.len());
  &bytes[..end]
}

pub fn parse_null_terminated_string(bytes: &[u8]) -> Result<&str, Utf8Error> {
  core::str::from_utf8(trim_nul(bytes))
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseOctalError {
  #[error("Invalid UTF-8 in octal string: {0}")]
  InvalidUtf8(#[from] Utf8Error),
  #[error("Failed to parse octal number: {0}")]
  ParseIntError(#[from] core::num::ParseIntError),
  #[error("Byte {byte:#04x} at index {index} is not an octal digit")]
  InvalidDigit { index: usize, byte: u8 },
}

/// Parses a null-terminated, space-padded octal number from a byte slice.
pub fn parse_octal(bytes: &[u8]) -> Result<u64, ParseOctalError> {
  let s = parse_null_terminated_string(bytes)?;
  Ok(u64::from_str_radix(s.trim_matches(' '), 8)?)
}

/// Parses a field that must consist of octal digits only.
///
/// Nothing is trimmed and a NUL is not a terminator, so `b"5\0zz"` is rejected.
pub fn parse_octal_digits(bytes: &[u8]) -> Result<u64, ParseOctalError> {
  if let Some(index) = bytes.iter().position(|b| !matches!(b, b'0'..=b'7')) {
    return Err(ParseOctalError::InvalidDigit {
      index,
      byte: bytes[index],
    });
  }
  let s = core::str::from_utf8(bytes)?;
  Ok(u64::from_str_radix(s, 8)?)
}

/// A USTAR header block.
///
/// Every field is kept as the raw bytes found in the archive. The struct has an
/// alignment of 1, so it can be viewed in place inside any byte buffer.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, PartialEq, Eq)]
#[repr(C)]
pub struct UstarHeader {
  /// File name, null-terminated unless it uses all 100 bytes
  pub name: [u8; NAME_LEN],
  /// File mode (octal), stored as ASCII bytes
  pub mode: [u8; MODE_LEN],
  /// User ID of file owner (octal), stored as ASCII bytes
  pub uid: [u8; UID_LEN],
  /// Group ID of file owner (octal), stored as ASCII bytes
  pub gid: [u8; GID_LEN],
  /// Content size in bytes (octal), stored as ASCII bytes
  ///
  /// Counts the data after the header block, not including the header itself.
  pub size: [u8; SIZE_LEN],
  /// Modification time (epoch seconds, octal), stored as ASCII bytes
  pub mtime: [u8; MTIME_LEN],
  /// Header checksum, stored as ASCII bytes. Never verified.
  pub checksum: [u8; CHECKSUM_LEN],
  pub typeflag: [u8; TYPEFLAG_LEN],
  /// Target name of a link, null-terminated
  pub linkname: [u8; LINKNAME_LEN],
  pub magic: [u8; MAGIC_LEN],
  pub version: [u8; VERSION_LEN],
  /// User name, null-terminated
  pub uname: [u8; UNAME_LEN],
  /// Group name, null-terminated
  pub gname: [u8; GNAME_LEN],
  /// Major device number (octal), stored as ASCII bytes
  pub devmajor: [u8; DEVMAJOR_LEN],
  /// Minor device number (octal), stored as ASCII bytes
  pub devminor: [u8; DEVMINOR_LEN],
  /// Path prefix prepended to `name` with a `/`, null-terminated
  pub prefix: [u8; PREFIX_LEN],
  pub padding: [u8; PADDING_LEN],
}

const _: () = assert!(size_of::<UstarHeader>() == BLOCK_SIZE);

impl UstarHeader {
  /// Returns the raw bytes of `field`, sliced according to [`HEADER_LAYOUT`].
  #[must_use]
  pub fn field(&self, field: HeaderField) -> &[u8] {
    let offset = field.offset();
    &self.as_bytes()[offset..offset + field.field_len()]
  }

  #[must_use]
  pub fn has_ustar_magic(&self) -> bool {
    &self.magic == USTAR_MAGIC
  }

  #[must_use]
  pub fn is_zero_block(&self) -> bool {
    self.as_bytes() == TAR_ZERO_HEADER.as_slice()
  }

  /// Parses the content length from the first 11 bytes of the size field.
  ///
  /// All 11 bytes must be octal digits, the 12th byte is ignored.
  pub fn parse_size(&self) -> Result<u64, ParseOctalError> {
    parse_octal_digits(&self.size[..SIZE_DIGITS_LEN])
  }

  #[must_use]
  pub fn parse_typeflag(&self) -> TarTypeFlag {
    self.typeflag[0].into()
  }
}

impl core::fmt::Debug for UstarHeader {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("UstarHeader")
      .field("name", &parse_null_terminated_string(&self.name))
      .field("size", &parse_null_terminated_string(&self.size))
      .field("typeflag", &self.parse_typeflag())
      .field("magic", &self.magic)
      .finish_non_exhaustive()
  }
}
