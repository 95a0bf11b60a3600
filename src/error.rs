use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything here is fatal to the current run; nothing is retried
/// internally.
#[derive(Error, Debug)]
pub enum Error {
  #[error("not an iNES image (bad magic)")]
  InvalidMagic,

  #[error("unsupported iNES feature: {0}")]
  Unsupported(&'static str),

  #[error("iNES image truncated: need {needed} bytes, have {len}")]
  Truncated { needed: usize, len: usize },

  #[error("no mapper registered for id {0:03}")]
  UnknownMapper(u8),

  #[error("bad PRG bank count: {0}")]
  BadBankCount(u8),

  #[error("illegal opcode ${0:02X}")]
  IllegalOpcode(u8),

  #[error("instruction {0} is not implemented")]
  UnimplementedInstruction(&'static str),

  #[error("failed reading {path}: {source}")]
  Io {
    path: String,
    source: std::io::Error,
  },
}
