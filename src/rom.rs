use std::fs;

use log::info;

use crate::bitfield::Bits8;
use crate::error::{Error, Result};

pub const HEADER_SIZE: usize = 16;
pub const PRG_BANK_SIZE: usize = 16 * 1024;
pub const CHR_BANK_SIZE: usize = 8 * 1024;

const MAGIC: [u8; 4] = [
  0x4E, // N
  0x45, // E
  0x53, // S
  0x1A, // EOF
];

/// A parsed iNES image: bank counts, cartridge flags, and the raw PRG/CHR
/// blocks the mapper slices into banks.
pub struct Rom {
  pub prg_banks: u8,
  pub chr_banks: u8,
  pub mapper_id: u8,
  pub vertical_mirroring: bool,
  pub save_ram: bool,
  pub four_screen: bool,
  pub prg: Vec<u8>,
  pub chr: Vec<u8>,
}

impl Rom {
  pub fn parse(data: &[u8]) -> Result<Rom> {
    if data.len() < HEADER_SIZE {
      return Err(Error::Truncated {
        needed: HEADER_SIZE,
        len: data.len(),
      });
    }
    if data[0..4] != MAGIC {
      return Err(Error::InvalidMagic);
    }

    // Byte 4: PRG bank count in 16 KiB units; byte 5: CHR in 8 KiB units.
    let prg_banks = data[4];
    let chr_banks = data[5];
    let control1 = Bits8::new(data[6]);
    let control2 = Bits8::new(data[7]);

    if control1.get(2) != 0 {
      return Err(Error::Unsupported("512-byte trainer"));
    }
    if control2.get(0) != 0 {
      return Err(Error::Unsupported("VS-Unisystem"));
    }
    if control2.get(1) != 0 {
      return Err(Error::Unsupported("PlayChoice-10"));
    }

    // Mapper number is split across the two control bytes, low nibble first.
    let mapper_id = control1.get_slice(4, 8) | (control2.get_slice(4, 8) << 4);

    let prg_size = PRG_BANK_SIZE * prg_banks as usize;
    let chr_size = CHR_BANK_SIZE * chr_banks as usize;
    let prg_start = HEADER_SIZE;
    let chr_start = prg_start + prg_size;
    let needed = chr_start + chr_size;
    if data.len() < needed {
      return Err(Error::Truncated {
        needed,
        len: data.len(),
      });
    }

    Ok(Rom {
      prg_banks,
      chr_banks,
      mapper_id,
      vertical_mirroring: control1.get(0) != 0,
      save_ram: control1.get(1) != 0,
      four_screen: control1.get(3) != 0,
      prg: data[prg_start..chr_start].to_vec(),
      chr: data[chr_start..needed].to_vec(),
    })
  }

  pub fn from_file(path: &str) -> Result<Rom> {
    let data = fs::read(path).map_err(|source| Error::Io {
      path: path.to_string(),
      source,
    })?;
    let rom = Rom::parse(&data)?;
    info!(
      "loaded {}: {} x 16K PRG, {} x 8K CHR, mapper {:03}",
      path, rom.prg_banks, rom.chr_banks, rom.mapper_id
    );
    Ok(rom)
  }
}
