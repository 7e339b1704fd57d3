#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarDecoderLimits {
  /// The maximum number of records a single decode may produce.
  pub max_records: usize,
  /// The maximum content length a single record may declare.
  /// Checked before the content is sliced out of the buffer.
  pub max_content_length: usize,
}

impl TarDecoderLimits {
  #[must_use]
  pub fn unlimited() -> Self {
    Self {
      max_records: usize::MAX,
      max_content_length: usize::MAX,
    }
  }
}

impl Default for TarDecoderLimits {
  fn default() -> Self {
    Self::unlimited()
  }
}

#[derive(Debug, Clone, Default)]
pub struct TarDecoderOptions {
  pub tar_decoder_limits: TarDecoderLimits,
}
