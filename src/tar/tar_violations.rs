use alloc::vec::Vec;

use log::{error, warn};

use crate::tar::TarParserError;

pub trait TarViolationHandler {
  /// When a violation occurs, this method is called.
  /// It should return `true` if decoding should ignore the error and continue with the current record.
  ///
  /// If `is_fatal` is `true`, the decoder stops regardless of the return value.
  #[must_use]
  fn handle(&mut self, error: &TarParserError, is_fatal: bool) -> bool;
}

impl<VH: TarViolationHandler + ?Sized> TarViolationHandler for &mut VH {
  fn handle(&mut self, error: &TarParserError, is_fatal: bool) -> bool {
    (**self).handle(error, is_fatal)
  }
}

/// Stops at the first violation.
#[derive(Debug, Default)]
pub struct StrictTarViolationHandler;

impl TarViolationHandler for StrictTarViolationHandler {
  fn handle(&mut self, _error: &TarParserError, _is_fatal: bool) -> bool {
    false
  }
}

/// Keeps going and remembers every violation, so they can be inspected as warnings afterwards.
#[derive(Debug, Default)]
pub struct AuditTarViolationHandler {
  pub violations: Vec<(TarParserError, bool)>,
}

impl AuditTarViolationHandler {
  #[must_use]
  pub fn new() -> Self {
    Self {
      violations: Vec::new(),
    }
  }
}

impl TarViolationHandler for AuditTarViolationHandler {
  fn handle(&mut self, error: &TarParserError, is_fatal: bool) -> bool {
    self.violations.push((error.clone(), is_fatal));
    true
  }
}

/// Keeps going without a trace. A malformed size field decodes as an empty record.
#[derive(Debug, Default)]
pub struct IgnoreTarViolationHandler;

impl TarViolationHandler for IgnoreTarViolationHandler {
  fn handle(&mut self, _error: &TarParserError, _is_fatal: bool) -> bool {
    true
  }
}

/// A wrapper around a `TarViolationHandler` that logs every violation before handing it on.
pub(crate) struct VHW<'a, VH: TarViolationHandler>(pub(crate) &'a mut VH);

impl<VH: TarViolationHandler> VHW<'_, VH> {
  /// Handles a recoverable violation. `Ok` means decoding continues.
  pub(crate) fn recoverable(&mut self, error: TarParserError) -> Result<(), TarParserError> {
    warn!("{error}");
    if self.0.handle(&error, false) {
      Ok(())
    } else {
      Err(error)
    }
  }

  /// Handles a fatal violation. Decoding always stops.
  pub(crate) fn fatal(&mut self, error: TarParserError) -> TarParserError {
    error!("{error}");
    let _ignored = self.0.handle(&error, true);
    error
  }
}
