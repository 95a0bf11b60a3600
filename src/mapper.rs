use std::collections::HashMap;

use lazy_static::lazy_static;
use maplit::hashmap;

use crate::bus::CpuBus;
use crate::error::{Error, Result};
use crate::ppu::Ppu;
use crate::rom::{Rom, CHR_BANK_SIZE, PRG_BANK_SIZE};

pub mod m000;

/// Cartridge-side bank wiring. A mapper does all of its work during `reset`,
/// through the bus handle it is given; it holds no reference to the console
/// or to either memory afterwards.
pub trait Mapper {
  fn reset(&mut self, rom: &Rom, bus: &mut CpuBus) -> Result<()>;
}

type MapperCtor = fn() -> Box<dyn Mapper>;

fn nrom() -> Box<dyn Mapper> {
  Box::new(m000::Nrom::new())
}

lazy_static! {
  /// Registry of implemented mappers. New mappers are added by registering a
  /// constructor against their iNES id.
  static ref MAPPERS: HashMap<u8, MapperCtor> = hashmap! {
    0x00 => nrom as MapperCtor,
  };
}

pub fn load_mapper(id: u8) -> Result<Box<dyn Mapper>> {
  match MAPPERS.get(&id) {
    Some(ctor) => Ok(ctor()),
    None => Err(Error::UnknownMapper(id)),
  }
}

/// Copy one 16 KiB PRG bank into CPU space at `dest`.
pub fn load_prg_16k(bus: &mut CpuBus, rom: &Rom, bank: usize, dest: u16) {
  let start = bank * PRG_BANK_SIZE;
  bus.copy_into(dest, &rom.prg[start..start + PRG_BANK_SIZE]);
}

/// Copy one 8 KiB CHR bank into PPU pattern-table space at `dest`.
pub fn load_chr_8k(ppu: &mut Ppu, rom: &Rom, bank: usize, dest: u16) {
  let start = bank * CHR_BANK_SIZE;
  ppu.copy_into(dest, &rom.chr[start..start + CHR_BANK_SIZE]);
}
