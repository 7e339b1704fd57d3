use core::{ops::Deref, str::Utf8Error};

use alloc::{borrow::Cow, format, string::String, vec::Vec};

use hashbrown::HashMap;
use relative_path::RelativePathBuf;
use zerocopy::transmute_ref;

use crate::tar::{
  tar_constants::{
    parse_null_terminated_string, parse_octal, trim_nul, ParseOctalError, TarTypeFlag,
    UstarHeader, BLOCK_SIZE, CHECKSUM_LEN, DEVMAJOR_LEN, DEVMINOR_LEN, GID_LEN, GNAME_LEN,
    LINKNAME_LEN, MAGIC_LEN, MODE_LEN, MTIME_LEN, NAME_LEN, PREFIX_LEN, SIZE_LEN, UID_LEN,
    UNAME_LEN, VERSION_LEN,
  },
  TarParserError,
};

/// One decoded archive entry.
///
/// Nothing is copied: the header and the content are views into the buffer that was decoded,
/// which therefore has to outlive the record.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ArchiveRecord<'a> {
  offset: usize,
  header: &'a UstarHeader,
  content: &'a [u8],
  size_field_malformed: bool,
}

impl<'a> ArchiveRecord<'a> {
  pub(crate) fn new(
    offset: usize,
    header: &'a UstarHeader,
    content: &'a [u8],
    size_field_malformed: bool,
  ) -> Self {
    debug_assert!(header.has_ustar_magic());
    Self {
      offset,
      header,
      content,
      size_field_malformed,
    }
  }

  /// Byte offset of the header block inside the decoded buffer.
  #[must_use]
  pub fn offset(&self) -> usize {
    self.offset
  }

  #[must_use]
  pub fn header(&self) -> &'a UstarHeader {
    self.header
  }

  /// The header block verbatim.
  #[must_use]
  pub fn raw_header(&self) -> &'a [u8; BLOCK_SIZE] {
    let header: &'a UstarHeader = self.header;
    transmute_ref!(header)
  }

  /// The content following the header, without the block padding.
  #[must_use]
  pub fn content(&self) -> &'a [u8] {
    self.content
  }

  pub fn content_as_str(&self) -> Result<&'a str, Utf8Error> {
    core::str::from_utf8(self.content)
  }

  /// Length of [`Self::content`], derived from the size field when the record was decoded.
  ///
  /// Zero if the size field could not be parsed, see [`Self::size_field_malformed`].
  #[must_use]
  pub fn content_length(&self) -> usize {
    self.content.len()
  }

  /// `true` if the size field was not an octal number and the record was kept with no content.
  #[must_use]
  pub fn size_field_malformed(&self) -> bool {
    self.size_field_malformed
  }

  /// Re-derives the content length from the size field.
  pub fn parse_size(&self) -> Result<u64, ParseOctalError> {
    self.header.parse_size()
  }

  /// The name field up to the first NUL.
  pub fn name(&self) -> Result<&'a str, Utf8Error> {
    parse_null_terminated_string(&self.header.name)
  }

  #[must_use]
  pub fn name_lossy(&self) -> Cow<'a, str> {
    String::from_utf8_lossy(trim_nul(&self.header.name))
  }

  /// The raw typeflag byte, uninterpreted.
  #[must_use]
  pub fn typeflag(&self) -> u8 {
    self.header.typeflag[0]
  }

  #[must_use]
  pub fn type_flag(&self) -> TarTypeFlag {
    self.header.parse_typeflag()
  }

  pub fn linkname(&self) -> Result<&'a str, Utf8Error> {
    parse_null_terminated_string(&self.header.linkname)
  }

  pub fn uname(&self) -> Result<&'a str, Utf8Error> {
    parse_null_terminated_string(&self.header.uname)
  }

  pub fn gname(&self) -> Result<&'a str, Utf8Error> {
    parse_null_terminated_string(&self.header.gname)
  }

  pub fn prefix(&self) -> Result<&'a str, Utf8Error> {
    parse_null_terminated_string(&self.header.prefix)
  }

  /// The full entry path: `prefix/name`, or just `name` if the prefix is empty.
  pub fn path(&self) -> Result<RelativePathBuf, Utf8Error> {
    let name = self.name()?;
    let prefix = self.prefix()?;
    if prefix.is_empty() {
      Ok(RelativePathBuf::from(name))
    } else {
      Ok(RelativePathBuf::from(format!("{prefix}/{name}")))
    }
  }

  pub fn parse_mode(&self) -> Result<u32, ParseOctalError> {
    parse_octal(&self.header.mode).map(|mode| mode as u32)
  }

  pub fn parse_uid(&self) -> Result<u32, ParseOctalError> {
    parse_octal(&self.header.uid).map(|uid| uid as u32)
  }

  pub fn parse_gid(&self) -> Result<u32, ParseOctalError> {
    parse_octal(&self.header.gid).map(|gid| gid as u32)
  }

  /// Modification time in seconds since the epoch.
  pub fn parse_mtime(&self) -> Result<u64, ParseOctalError> {
    parse_octal(&self.header.mtime)
  }

  pub fn parse_dev_major(&self) -> Result<u32, ParseOctalError> {
    parse_octal(&self.header.devmajor).map(|v| v as u32)
  }

  pub fn parse_dev_minor(&self) -> Result<u32, ParseOctalError> {
    parse_octal(&self.header.devminor).map(|v| v as u32)
  }

  // --- Raw header fields ---

  #[must_use]
  pub fn name_bytes(&self) -> &'a [u8; NAME_LEN] {
    &self.header.name
  }

  #[must_use]
  pub fn mode_bytes(&self) -> &'a [u8; MODE_LEN] {
    &self.header.mode
  }

  #[must_use]
  pub fn uid_bytes(&self) -> &'a [u8; UID_LEN] {
    &self.header.uid
  }

  #[must_use]
  pub fn gid_bytes(&self) -> &'a [u8; GID_LEN] {
    &self.header.gid
  }

  #[must_use]
  pub fn size_bytes(&self) -> &'a [u8; SIZE_LEN] {
    &self.header.size
  }

  #[must_use]
  pub fn mtime_bytes(&self) -> &'a [u8; MTIME_LEN] {
    &self.header.mtime
  }

  #[must_use]
  pub fn checksum_bytes(&self) -> &'a [u8; CHECKSUM_LEN] {
    &self.header.checksum
  }

  #[must_use]
  pub fn typeflag_bytes(&self) -> &'a [u8; 1] {
    &self.header.typeflag
  }

  #[must_use]
  pub fn linkname_bytes(&self) -> &'a [u8; LINKNAME_LEN] {
    &self.header.linkname
  }

  #[must_use]
  pub fn magic_bytes(&self) -> &'a [u8; MAGIC_LEN] {
    &self.header.magic
  }

  #[must_use]
  pub fn version_bytes(&self) -> &'a [u8; VERSION_LEN] {
    &self.header.version
  }

  #[must_use]
  pub fn uname_bytes(&self) -> &'a [u8; UNAME_LEN] {
    &self.header.uname
  }

  #[must_use]
  pub fn gname_bytes(&self) -> &'a [u8; GNAME_LEN] {
    &self.header.gname
  }

  #[must_use]
  pub fn devmajor_bytes(&self) -> &'a [u8; DEVMAJOR_LEN] {
    &self.header.devmajor
  }

  #[must_use]
  pub fn devminor_bytes(&self) -> &'a [u8; DEVMINOR_LEN] {
    &self.header.devminor
  }

  #[must_use]
  pub fn prefix_bytes(&self) -> &'a [u8; PREFIX_LEN] {
    &self.header.prefix
  }
}

impl core::fmt::Debug for ArchiveRecord<'_> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("ArchiveRecord")
      .field("offset", &self.offset)
      .field("name", &self.name_lossy())
      .field("type_flag", &self.type_flag())
      .field("content_length", &self.content_length())
      .field("size_field_malformed", &self.size_field_malformed)
      .finish_non_exhaustive()
  }
}

/// Why a scan stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEnd {
  /// Less than one block was left.
  /// `trailing_bytes` is zero for a buffer that ends exactly on a block boundary.
  EndOfBuffer { trailing_bytes: usize },
  /// The block at `offset` does not carry the `ustar\0` magic.
  ///
  /// An all-zero block is the usual end-of-archive marker; anything else is either garbage
  /// or a format this decoder does not accept. Both end the scan the same way.
  InvalidMagic { offset: usize, zero_block: bool },
  /// A violation the handler rejected, or a fatal one, ended the scan.
  /// The record at the error offset was not produced.
  Failed(TarParserError),
}

impl ScanEnd {
  #[must_use]
  pub fn error(&self) -> Option<&TarParserError> {
    match self {
      Self::Failed(error) => Some(error),
      _ => None,
    }
  }
}

/// The records of one decode, in archive order, and how the scan ended.
#[derive(Debug, Clone)]
pub struct TarRecordList<'a> {
  records: Vec<ArchiveRecord<'a>>,
  /// The number of records found with each type flag.
  found_type_flags: HashMap<TarTypeFlag, usize>,
  end: ScanEnd,
}

impl<'a> TarRecordList<'a> {
  pub(crate) fn new(records: Vec<ArchiveRecord<'a>>, end: ScanEnd) -> Self {
    let mut found_type_flags = HashMap::new();
    for record in &records {
      *found_type_flags.entry(record.type_flag()).or_insert(0) += 1;
    }
    Self {
      records,
      found_type_flags,
      end,
    }
  }

  #[must_use]
  pub fn records(&self) -> &[ArchiveRecord<'a>] {
    &self.records
  }

  #[must_use]
  pub fn into_records(self) -> Vec<ArchiveRecord<'a>> {
    self.records
  }

  #[must_use]
  pub fn end(&self) -> &ScanEnd {
    &self.end
  }

  /// The violation that cut the scan short (rejected by the handler, or fatal), if any.
  #[must_use]
  pub fn error(&self) -> Option<&TarParserError> {
    self.end.error()
  }

  #[must_use]
  pub fn get_found_type_flags(&self) -> &HashMap<TarTypeFlag, usize> {
    &self.found_type_flags
  }

  /// Finds the first record whose name equals `name`.
  #[must_use]
  pub fn find_by_name(&self, name: &str) -> Option<&ArchiveRecord<'a>> {
    self
      .records
      .iter()
      .find(|record| record.name() == Ok(name))
  }
}

impl<'a> Deref for TarRecordList<'a> {
  type Target = [ArchiveRecord<'a>];

  fn deref(&self) -> &Self::Target {
    &self.records
  }
}

impl<'a> IntoIterator for TarRecordList<'a> {
  type Item = ArchiveRecord<'a>;
  type IntoIter = alloc::vec::IntoIter<ArchiveRecord<'a>>;

  fn into_iter(self) -> Self::IntoIter {
    self.records.into_iter()
  }
}

impl<'l, 'a> IntoIterator for &'l TarRecordList<'a> {
  type Item = &'l ArchiveRecord<'a>;
  type IntoIter = core::slice::Iter<'l, ArchiveRecord<'a>>;

  fn into_iter(self) -> Self::IntoIter {
    self.records.iter()
  }
}
