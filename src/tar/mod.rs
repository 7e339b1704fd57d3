mod decoder_options;
mod parsing_errors;
pub(crate) mod tar_constants;
mod tar_decoder;
mod tar_record;
mod tar_violations;

pub use decoder_options::*;
pub use parsing_errors::*;
pub use tar_constants::{
  HeaderField, ParseOctalError, TarTypeFlag, UstarHeader, BLOCK_SIZE, HEADER_LAYOUT,
  TAR_ZERO_HEADER, USTAR_MAGIC,
};
pub use tar_decoder::*;
pub use tar_record::*;
pub use tar_violations::*;

#[cfg(test)]
mod tar_test;
