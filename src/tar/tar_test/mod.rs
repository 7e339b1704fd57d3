use alloc::{format, vec, vec::Vec};

use zerocopy::{FromZeros as _, IntoBytes as _};

use crate::tar::{
  decode,
  tar_constants::{align_to_block_size, UstarHeader, BLOCK_SIZE, TAR_ZERO_HEADER, USTAR_MAGIC},
  AuditTarViolationHandler, ErrorSeverity, LimitExceededContext, ScanEnd, StrictTarViolationHandler,
  TarDecoder, TarDecoderLimits, TarDecoderOptions, TarParserErrorKind, TarTypeFlag,
};

struct TestEntry {
  name: &'static str,
  prefix: &'static str,
  typeflag: u8,
  content: &'static [u8],
  /// Overrides the size field written for `content`.
  size_field: Option<[u8; 12]>,
}

impl TestEntry {
  const fn file(name: &'static str, content: &'static [u8]) -> Self {
    Self {
      name,
      prefix: "",
      typeflag: b'0',
      content,
      size_field: None,
    }
  }

  const fn directory(name: &'static str) -> Self {
    Self {
      name,
      prefix: "",
      typeflag: b'5',
      content: b"",
      size_field: None,
    }
  }

  fn header(&self) -> UstarHeader {
    let mut header = UstarHeader::new_zeroed();
    header.name[..self.name.len()].copy_from_slice(self.name.as_bytes());
    header.prefix[..self.prefix.len()].copy_from_slice(self.prefix.as_bytes());
    header.mode = *b"0000644\0";
    header.uid = *b"0001750\0";
    header.gid = *b"0001750\0";
    header.size = self.size_field.unwrap_or_else(|| {
      let mut size = [0; 12];
      size.copy_from_slice(format!("{:011o}\0", self.content.len()).as_bytes());
      size
    });
    header.mtime = *b"14533344000\0";
    header.typeflag = [self.typeflag];
    header.magic = *USTAR_MAGIC;
    header.version = *b"00";
    header.uname[..4].copy_from_slice(b"user");
    header.gname[..5].copy_from_slice(b"users");

    // Checksum over the block with the checksum field read as spaces.
    header.checksum = [b' '; 8];
    let sum: u32 = header.as_bytes().iter().map(|&b| u32::from(b)).sum();
    header
      .checksum
      .copy_from_slice(format!("{sum:06o}\0 ").as_bytes());
    header
  }
}

/// Builds an archive from `entries` without the end-of-archive marker.
fn build_entries(entries: &[TestEntry]) -> Vec<u8> {
  let mut archive = Vec::new();
  for entry in entries {
    archive.extend_from_slice(entry.header().as_bytes());
    archive.extend_from_slice(entry.content);
    let padded = align_to_block_size(entry.content.len()).unwrap();
    archive.resize(archive.len() + padded - entry.content.len(), 0);
  }
  archive
}

/// Builds a complete archive, terminated by two zero blocks.
fn build_archive(entries: &[TestEntry]) -> Vec<u8> {
  let mut archive = build_entries(entries);
  archive.extend_from_slice(&TAR_ZERO_HEADER);
  archive.extend_from_slice(&TAR_ZERO_HEADER);
  archive
}

const SIMPLE_ENTRIES: &[TestEntry] = &[
  TestEntry::directory("test-archive/"),
  TestEntry::file("test-archive/lorem.txt", b"Lorem ipsum dolor sit amet.\n"),
  TestEntry::directory("test-archive/subfolder/"),
  TestEntry::file(
    "test-archive/subfolder/my_file.txt",
    &[b'x'; BLOCK_SIZE + 1],
  ),
  TestEntry::file("test-archive/aligned.bin", &[7; BLOCK_SIZE]),
  TestEntry::file("test-archive/empty.txt", b""),
];

#[test]
fn test_empty_buffer() {
  let records = decode(&[]);
  assert!(records.is_empty());
  assert_eq!(records.end(), &ScanEnd::EndOfBuffer { trailing_bytes: 0 });
}

#[test]
fn test_buffer_shorter_than_a_block() {
  let archive = build_archive(&[TestEntry::file("a.txt", b"hello")]);
  let records = decode(&archive[..BLOCK_SIZE - 1]);
  assert!(records.is_empty());
  assert_eq!(
    records.end(),
    &ScanEnd::EndOfBuffer {
      trailing_bytes: BLOCK_SIZE - 1
    }
  );
}

#[test]
fn test_two_entry_archive() {
  let archive = build_archive(&[
    TestEntry::file("a.txt", b"hello"),
    TestEntry::file("b.txt", b""),
  ]);
  let records = decode(&archive);
  assert_eq!(records.len(), 2);
  assert_eq!(records[0].name(), Ok("a.txt"));
  assert_eq!(records[0].content(), b"hello");
  assert_eq!(records[0].size_bytes(), b"00000000005\0");
  assert_eq!(records[1].name(), Ok("b.txt"));
  assert_eq!(records[1].content(), b"");
  assert_eq!(records[1].offset(), 2 * BLOCK_SIZE);
  assert_eq!(
    records.end(),
    &ScanEnd::InvalidMagic {
      offset: 3 * BLOCK_SIZE,
      zero_block: true
    }
  );
  assert!(records.error().is_none());
}

#[test]
fn test_record_offsets_follow_padded_content() {
  let archive = build_archive(SIMPLE_ENTRIES);
  let records = decode(&archive);
  assert_eq!(records.len(), SIMPLE_ENTRIES.len());

  let mut expected_offset = 0;
  for (record, entry) in records.iter().zip(SIMPLE_ENTRIES) {
    assert_eq!(record.offset(), expected_offset);
    assert_eq!(record.content_length(), entry.content.len());
    assert_eq!(record.content(), entry.content);
    expected_offset += BLOCK_SIZE + align_to_block_size(entry.content.len()).unwrap();
  }
}

#[test]
fn test_round_trip_fields() {
  let archive = build_archive(SIMPLE_ENTRIES);
  let records = decode(&archive);
  assert_eq!(records.len(), SIMPLE_ENTRIES.len());

  for (record, entry) in records.iter().zip(SIMPLE_ENTRIES) {
    let header = entry.header();
    assert_eq!(record.raw_header().as_slice(), header.as_bytes());
    assert_eq!(record.name_bytes(), &header.name);
    assert_eq!(record.mode_bytes(), &header.mode);
    assert_eq!(record.uid_bytes(), &header.uid);
    assert_eq!(record.gid_bytes(), &header.gid);
    assert_eq!(record.size_bytes(), &header.size);
    assert_eq!(record.mtime_bytes(), &header.mtime);
    assert_eq!(record.checksum_bytes(), &header.checksum);
    assert_eq!(record.typeflag_bytes(), &header.typeflag);
    assert_eq!(record.linkname_bytes(), &header.linkname);
    assert_eq!(record.magic_bytes(), USTAR_MAGIC);
    assert_eq!(record.version_bytes(), b"00");
    assert_eq!(record.uname_bytes(), &header.uname);
    assert_eq!(record.gname_bytes(), &header.gname);
    assert_eq!(record.devmajor_bytes(), &header.devmajor);
    assert_eq!(record.devminor_bytes(), &header.devminor);
    assert_eq!(record.prefix_bytes(), &header.prefix);
    assert_eq!(record.name(), Ok(entry.name));
    assert_eq!(record.typeflag(), entry.typeflag);
    assert_eq!(record.uname(), Ok("user"));
    assert_eq!(record.gname(), Ok("users"));
    assert_eq!(record.parse_mtime(), Ok(0o14533344000));
  }
}

#[test]
fn test_directory_entry() {
  let archive = build_archive(&[TestEntry::directory("dir/")]);
  let records = decode(&archive);
  assert_eq!(records.len(), 1);
  let dir = &records[0];
  assert_eq!(dir.typeflag(), b'5');
  assert_eq!(dir.type_flag(), TarTypeFlag::Directory);
  assert_eq!(dir.content_length(), 0);
  assert!(dir.content().is_empty());
  assert!(!dir.size_field_malformed());
}

#[test]
fn test_garbage_block_halts_scan() {
  let mut archive = build_entries(&[
    TestEntry::file("kept.txt", b"kept"),
    TestEntry::directory("kept/"),
  ]);
  let garbage_offset = archive.len();
  // Declares far more content than there is, but is never trusted.
  let mut garbage = TestEntry::file("ignored.txt", b"").header();
  garbage.magic = *b"ustar ";
  garbage.size = *b"77777777777\0";
  archive.extend_from_slice(garbage.as_bytes());
  archive.extend_from_slice(&build_archive(&[TestEntry::file("after.txt", b"x")]));

  let records = decode(&archive);
  assert_eq!(records.len(), 2);
  assert_eq!(records[0].name(), Ok("kept.txt"));
  assert_eq!(records[1].name(), Ok("kept/"));
  assert_eq!(
    records.end(),
    &ScanEnd::InvalidMagic {
      offset: garbage_offset,
      zero_block: false
    }
  );
}

#[test]
fn test_missing_terminator() {
  let archive = build_entries(&[TestEntry::file("a.txt", b"hello")]);
  let records = decode(&archive);
  assert_eq!(records.len(), 1);
  assert_eq!(records.end(), &ScanEnd::EndOfBuffer { trailing_bytes: 0 });
}

#[test]
fn test_missing_final_padding() {
  let archive = build_entries(&[TestEntry::file("a.txt", b"hello")]);
  let records = decode(&archive[..BLOCK_SIZE + 5]);
  assert_eq!(records.len(), 1);
  assert_eq!(records[0].content(), b"hello");
  assert_eq!(records.end(), &ScanEnd::EndOfBuffer { trailing_bytes: 0 });
}

#[test]
fn test_truncated_content() {
  let archive = build_entries(&[
    TestEntry::file("a.txt", b"hello"),
    TestEntry::file("b.txt", &[1; 700]),
  ]);
  let cut = 3 * BLOCK_SIZE + 100;
  let records = decode(&archive[..cut]);
  assert_eq!(records.len(), 1);
  assert_eq!(records[0].name(), Ok("a.txt"));

  let error = records.error().expect("scan must fail");
  assert!(error.is_fatal());
  assert_eq!(error.offset(), 2 * BLOCK_SIZE);
  assert_eq!(
    error.kind,
    TarParserErrorKind::TruncatedContent {
      offset: 2 * BLOCK_SIZE,
      declared: 700,
      available: 100,
    }
  );
}

#[test]
fn test_malformed_size_is_lenient_by_default() {
  let mut entry = TestEntry::file("bad.txt", b"");
  entry.size_field = Some(*b"0000000009x\0");
  let archive = build_archive(&[entry, TestEntry::file("next.txt", b"next")]);

  let records = decode(&archive);
  assert_eq!(records.len(), 2);
  assert!(records[0].size_field_malformed());
  assert_eq!(records[0].content_length(), 0);
  assert!(records[0].parse_size().is_err());
  assert_eq!(records[1].content(), b"next");
  assert!(!records[1].size_field_malformed());
}

#[test]
fn test_size_digits_after_nul_are_malformed() {
  let mut entry = TestEntry::file("nul.txt", b"hello");
  entry.size_field = Some(*b"5\0zzzzzzzzz\0");
  let archive = build_archive(&[entry, TestEntry::directory("after/")]);

  let mut audit = AuditTarViolationHandler::new();
  let records = TarDecoder::new(TarDecoderOptions::default(), &mut audit).decode(&archive);
  assert!(records[0].size_field_malformed());
  assert_eq!(records[0].content_length(), 0);
  assert!(records[0].parse_size().is_err());
  assert_eq!(audit.violations.len(), 1);
  // The declared content is not skipped, so the next block is read as a header and ends the
  // scan: it holds "hello" and zeros.
  assert_eq!(records.len(), 1);
  assert_eq!(
    records.end(),
    &ScanEnd::InvalidMagic {
      offset: BLOCK_SIZE,
      zero_block: false
    }
  );
}

#[test]
fn test_malformed_size_is_audited() {
  let mut entry = TestEntry::file("bad.txt", b"");
  entry.size_field = Some([b' '; 12]);
  let archive = build_archive(&[TestEntry::directory("dir/"), entry]);

  let mut audit = AuditTarViolationHandler::new();
  let records = TarDecoder::new(TarDecoderOptions::default(), &mut audit).decode(&archive);
  assert_eq!(records.len(), 2);
  assert!(records.error().is_none());

  assert_eq!(audit.violations.len(), 1);
  let (violation, is_fatal) = &audit.violations[0];
  assert!(!is_fatal);
  assert_eq!(violation.severity, ErrorSeverity::Recoverable);
  assert!(matches!(
    violation.kind,
    TarParserErrorKind::MalformedSizeField {
      offset: BLOCK_SIZE,
      ..
    }
  ));
}

#[test]
fn test_malformed_size_is_fatal_when_strict() {
  let mut entry = TestEntry::file("bad.txt", b"");
  entry.size_field = Some(*b"hello world\0");
  let archive = build_archive(&[TestEntry::file("good.txt", b"ok"), entry]);

  let mut decoder = TarDecoder::<StrictTarViolationHandler>::default();
  let records = decoder.decode(&archive);
  assert_eq!(records.len(), 1);
  assert_eq!(records[0].name(), Ok("good.txt"));
  assert!(matches!(
    records.end(),
    ScanEnd::Failed(error) if error.severity == ErrorSeverity::Recoverable
  ));
  let error = records.error().expect("strict decoding must stop");
  assert_eq!(error.offset(), 2 * BLOCK_SIZE);
  assert!(!error.is_fatal());
}

#[test]
fn test_record_limit() {
  let archive = build_archive(SIMPLE_ENTRIES);
  let options = TarDecoderOptions {
    tar_decoder_limits: TarDecoderLimits {
      max_records: 2,
      ..TarDecoderLimits::unlimited()
    },
  };
  let mut decoder = TarDecoder::new(options, AuditTarViolationHandler::new());
  let records = decoder.decode(&archive);
  assert_eq!(records.len(), 2);
  assert_eq!(decoder.violation_handler().violations.len(), 1);
  assert!(matches!(
    records.error().map(|error| &error.kind),
    Some(TarParserErrorKind::LimitExceeded {
      limit: 2,
      context: LimitExceededContext::TooManyRecords,
      ..
    })
  ));
  let audit = decoder.into_violation_handler();
  assert_eq!(audit.violations.len(), 1);
  assert!(audit.violations[0].1);
}

#[test]
fn test_content_length_limit() {
  let archive = build_archive(SIMPLE_ENTRIES);
  let options = TarDecoderOptions {
    tar_decoder_limits: TarDecoderLimits {
      max_content_length: BLOCK_SIZE,
      ..TarDecoderLimits::default()
    },
  };
  let records = TarDecoder::new(options, StrictTarViolationHandler).decode(&archive);
  // The fourth entry carries one byte more than a block.
  assert_eq!(records.len(), 3);
  assert!(matches!(
    records.error().map(|error| &error.kind),
    Some(TarParserErrorKind::LimitExceeded {
      context: LimitExceededContext::ContentTooLong,
      ..
    })
  ));
}

#[test]
fn test_iterator_matches_decode() {
  let archive = build_archive(SIMPLE_ENTRIES);
  let mut decoder = TarDecoder::<StrictTarViolationHandler>::default();
  let mut iter = decoder.records(&archive);
  let names: Vec<_> = iter
    .by_ref()
    .map(|record| record.unwrap().name().unwrap())
    .collect();
  let expected: Vec<_> = SIMPLE_ENTRIES.iter().map(|entry| entry.name).collect();
  assert_eq!(names, expected);
  assert!(matches!(
    iter.scan_end(),
    Some(ScanEnd::InvalidMagic {
      zero_block: true,
      ..
    })
  ));
  assert!(iter.next().is_none());
}

#[test]
fn test_iterator_yields_error_once() {
  let archive = build_entries(&[TestEntry::file("big.bin", &[0; 2000])]);
  let mut decoder = TarDecoder::<StrictTarViolationHandler>::default();
  let mut iter = decoder.records(&archive[..BLOCK_SIZE * 2]);
  assert!(matches!(
    iter.next(),
    Some(Err(error)) if error.is_fatal()
  ));
  assert!(iter.next().is_none());
  assert!(iter.next().is_none());
}

#[test]
fn test_prefix_and_type_flags() {
  let mut long = TestEntry::file("file.txt", b"content");
  long.prefix = "a/very/long/directory";
  let archive = build_archive(&[long, TestEntry::directory("dir/"), TestEntry::directory("x/")]);

  let records = decode(&archive);
  assert_eq!(
    records[0].path().unwrap().as_str(),
    "a/very/long/directory/file.txt"
  );
  assert_eq!(records[0].name(), Ok("file.txt"));
  assert!(records.find_by_name("x/").is_some());
  assert!(records.find_by_name("missing").is_none());

  let flags = records.get_found_type_flags();
  assert_eq!(flags.get(&TarTypeFlag::Directory), Some(&2));
  assert_eq!(flags.get(&TarTypeFlag::RegularFile), Some(&1));
}

#[test]
fn test_records_outlive_decoder() {
  let archive = build_archive(&[TestEntry::file("a.txt", b"hello")]);
  let records = {
    let mut decoder = TarDecoder::<StrictTarViolationHandler>::default();
    decoder.decode(&archive).into_records()
  };
  assert_eq!(records[0].content_as_str(), Ok("hello"));
  assert_eq!(vec![records[0].content()], vec![b"hello".as_slice()]);
}
