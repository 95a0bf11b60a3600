use log::debug;

use super::{load_chr_8k, load_prg_16k, Mapper};
use crate::bus::CpuBus;
use crate::error::{Error, Result};
use crate::rom::Rom;

/// NROM: fixed banks, no switching.
pub struct Nrom;

impl Nrom {
  pub fn new() -> Nrom {
    Nrom
  }
}

impl Mapper for Nrom {
  fn reset(&mut self, rom: &Rom, bus: &mut CpuBus) -> Result<()> {
    match rom.prg_banks {
      // A single 16 KiB bank appears at both $8000 and $C000.
      1 => {
        load_prg_16k(bus, rom, 0, 0x8000);
        load_prg_16k(bus, rom, 0, 0xC000);
      }
      2 => {
        load_prg_16k(bus, rom, 0, 0x8000);
        load_prg_16k(bus, rom, 1, 0xC000);
      }
      n => return Err(Error::BadBankCount(n)),
    }

    if rom.chr_banks > 0 {
      load_chr_8k(&mut bus.ppu, rom, 0, 0x0000);
    }

    debug!("NROM reset: {} PRG bank(s) mapped", rom.prg_banks);
    Ok(())
  }
}
