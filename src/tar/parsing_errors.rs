use core::fmt::Display;

use thiserror::Error;

use crate::tar::tar_constants::ParseOctalError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LimitExceededContext {
  TooManyRecords,
  ContentTooLong,
}

impl LimitExceededContext {
  #[must_use]
  pub fn unit(self) -> &'static str {
    match self {
      Self::TooManyRecords => "records",
      Self::ContentTooLong => "content bytes",
    }
  }
}

impl Display for LimitExceededContext {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    match self {
      Self::TooManyRecords => write!(f, "Too many records in archive"),
      Self::ContentTooLong => write!(f, "Declared content length is too long"),
    }
  }
}

// Equivalent to a bool but allows searching for errors more easily.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorSeverity {
  Fatal,
  Recoverable,
}

impl Display for ErrorSeverity {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    match self {
      Self::Fatal => write!(f, "Fatal"),
      Self::Recoverable => write!(f, "Recoverable"),
    }
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{severity} tar decoder error: {kind}")]
pub struct TarParserError {
  pub kind: TarParserErrorKind,
  pub severity: ErrorSeverity,
}

impl TarParserError {
  pub(crate) fn new<EK: Into<TarParserErrorKind>>(kind: EK, severity: ErrorSeverity) -> Self {
    Self {
      kind: kind.into(),
      severity,
    }
  }

  pub(crate) fn fatal<EK: Into<TarParserErrorKind>>(kind: EK) -> Self {
    Self::new(kind, ErrorSeverity::Fatal)
  }

  pub(crate) fn recoverable<EK: Into<TarParserErrorKind>>(kind: EK) -> Self {
    Self::new(kind, ErrorSeverity::Recoverable)
  }

  #[must_use]
  pub fn is_fatal(&self) -> bool {
    self.severity == ErrorSeverity::Fatal
  }

  /// Offset of the header block the error belongs to.
  #[must_use]
  pub fn offset(&self) -> usize {
    match self.kind {
      TarParserErrorKind::MalformedSizeField { offset, .. }
      | TarParserErrorKind::TruncatedContent { offset, .. }
      | TarParserErrorKind::LimitExceeded { offset, .. } => offset,
    }
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TarParserErrorKind {
  /// The size field of the header at `offset` is not an octal number.
  #[error("Parsing field header.size of the header at offset {offset} failed: {error}")]
  MalformedSizeField {
    offset: usize,
    error: ParseOctalError,
  },
  /// The header at `offset` declares more content than the buffer holds.
  #[error(
    "Content of the header at offset {offset} is truncated: {declared} bytes declared but only {available} available"
  )]
  TruncatedContent {
    offset: usize,
    declared: u64,
    available: usize,
  },
  #[error("Limit of {limit} {} exceeded at offset {offset}: {context}", .context.unit())]
  LimitExceeded {
    offset: usize,
    limit: usize,
    context: LimitExceededContext,
  },
}
