use core::iter::FusedIterator;

use alloc::vec::Vec;

use log::{debug, trace};
use zerocopy::FromBytes as _;

use crate::tar::{
  tar_constants::{align_to_block_size, UstarHeader, BLOCK_SIZE},
  ArchiveRecord, IgnoreTarViolationHandler, LimitExceededContext, ScanEnd, TarDecoderLimits,
  TarDecoderOptions, TarParserError, TarParserErrorKind, TarRecordList, TarViolationHandler, VHW,
};

/// Decodes USTAR archives held in memory.
///
/// The violation handler decides what happens to recoverable violations (a malformed size
/// field): a rejected one ends the scan. Fatal violations (truncated content, exceeded limits)
/// always end the scan, but the handler still gets to see them.
pub struct TarDecoder<VH: TarViolationHandler = IgnoreTarViolationHandler> {
  limits: TarDecoderLimits,
  violation_handler: VH,
}

impl<VH: TarViolationHandler + Default> Default for TarDecoder<VH> {
  fn default() -> Self {
    Self::new(TarDecoderOptions::default(), VH::default())
  }
}

impl<VH: TarViolationHandler> TarDecoder<VH> {
  pub fn new(options: TarDecoderOptions, violation_handler: VH) -> Self {
    Self {
      limits: options.tar_decoder_limits,
      violation_handler,
    }
  }

  pub fn violation_handler(&self) -> &VH {
    &self.violation_handler
  }

  pub fn into_violation_handler(self) -> VH {
    self.violation_handler
  }

  /// Lazily walks `buffer` one record at a time.
  pub fn records<'a, 'd>(&'d mut self, buffer: &'a [u8]) -> TarRecordIter<'a, 'd, VH> {
    TarRecordIter {
      buffer,
      cursor: 0,
      decoded: 0,
      limits: &self.limits,
      violation_handler: &mut self.violation_handler,
      end: None,
    }
  }

  /// Decodes every record of `buffer`.
  ///
  /// Never fails as a whole: whatever stops the scan is reported in [`TarRecordList::end`],
  /// and the records decoded before that point are always returned.
  pub fn decode<'a>(&mut self, buffer: &'a [u8]) -> TarRecordList<'a> {
    let mut iter = self.records(buffer);
    let mut records = Vec::new();
    let end = loop {
      match iter.step() {
        Ok(record) => records.push(record),
        Err(end) => break end,
      }
    };
    debug!(
      "tar scan of {} bytes ended after {} records: {end:?}",
      buffer.len(),
      records.len()
    );
    TarRecordList::new(records, end)
  }
}

/// Decodes `buffer` with the default options, quietly keeping records with a malformed size
/// field as empty ones.
#[must_use]
pub fn decode(buffer: &[u8]) -> TarRecordList<'_> {
  TarDecoder::<IgnoreTarViolationHandler>::default().decode(buffer)
}

/// The sequential scan behind [`TarDecoder::decode`].
///
/// Yields `Err` once if a violation the handler rejected, or a fatal one, ends the scan, then
/// `None`.
pub struct TarRecordIter<'a, 'd, VH: TarViolationHandler> {
  buffer: &'a [u8],
  /// Offset of the next header block.
  cursor: usize,
  decoded: usize,
  limits: &'d TarDecoderLimits,
  violation_handler: &'d mut VH,
  end: Option<ScanEnd>,
}

impl<'a, VH: TarViolationHandler> TarRecordIter<'a, '_, VH> {
  /// Why the scan stopped, once it has.
  pub fn scan_end(&self) -> Option<&ScanEnd> {
    self.end.as_ref()
  }

  fn fatal(&mut self, kind: TarParserErrorKind) -> ScanEnd {
    ScanEnd::Failed(VHW(&mut *self.violation_handler).fatal(TarParserError::fatal(kind)))
  }

  /// Decodes the record at the cursor and moves past it.
  fn step(&mut self) -> Result<ArchiveRecord<'a>, ScanEnd> {
    let buffer = self.buffer;
    let offset = self.cursor;
    let remaining = buffer.get(offset..).unwrap_or_default();
    let Ok((header, after_header)) = UstarHeader::ref_from_prefix(remaining) else {
      return Err(ScanEnd::EndOfBuffer {
        trailing_bytes: remaining.len(),
      });
    };

    // Nothing of a block without the magic is trusted, its size field included.
    if !header.has_ustar_magic() {
      return Err(ScanEnd::InvalidMagic {
        offset,
        zero_block: header.is_zero_block(),
      });
    }

    if self.decoded >= self.limits.max_records {
      return Err(self.fatal(TarParserErrorKind::LimitExceeded {
        offset,
        limit: self.limits.max_records,
        context: LimitExceededContext::TooManyRecords,
      }));
    }

    let (declared, size_field_malformed) = match header.parse_size() {
      Ok(size) => (size, false),
      Err(error) => {
        VHW(&mut *self.violation_handler)
          .recoverable(TarParserError::recoverable(
            TarParserErrorKind::MalformedSizeField { offset, error },
          ))
          .map_err(ScanEnd::Failed)?;
        (0, true)
      },
    };

    let content_length = match usize::try_from(declared) {
      Ok(length) if length > self.limits.max_content_length => {
        return Err(self.fatal(TarParserErrorKind::LimitExceeded {
          offset,
          limit: self.limits.max_content_length,
          context: LimitExceededContext::ContentTooLong,
        }));
      },
      Ok(length) if length <= after_header.len() => length,
      _ => {
        return Err(self.fatal(TarParserErrorKind::TruncatedContent {
          offset,
          declared,
          available: after_header.len(),
        }));
      },
    };
    let content = &after_header[..content_length];

    // content_length is bounded by the buffer length.
    let padded_length = align_to_block_size(content_length).unwrap_or(usize::MAX);
    self.cursor = offset
      .saturating_add(BLOCK_SIZE)
      .saturating_add(padded_length);
    self.decoded += 1;

    let record = ArchiveRecord::new(offset, header, content, size_field_malformed);
    trace!("decoded tar record {record:?}");
    Ok(record)
  }
}

impl<'a, VH: TarViolationHandler> Iterator for TarRecordIter<'a, '_, VH> {
  type Item = Result<ArchiveRecord<'a>, TarParserError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.end.is_some() {
      return None;
    }
    match self.step() {
      Ok(record) => Some(Ok(record)),
      Err(end) => {
        let error = end.error().cloned();
        self.end = Some(end);
        error.map(Err)
      },
    }
  }
}

impl<VH: TarViolationHandler> FusedIterator for TarRecordIter<'_, '_, VH> {}
