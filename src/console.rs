use log::info;

use crate::bus::CpuBus;
use crate::cpu6502::Cpu;
use crate::error::Result;
use crate::mapper::load_mapper;
use crate::ppu::Ppu;
use crate::rom::Rom;
use crate::trace::{self, Trace};

/// Ties the pieces together: the CPU, the bus it executes against (with the
/// PPU behind its register window), and the loaded cartridge. The CPU and
/// PPU outlive cartridge swaps; the ROM and its mapper do not.
pub struct Console {
  pub cpu: Cpu,
  pub bus: CpuBus,
  pub rom: Option<Rom>,
}

impl Console {
  pub fn new() -> Console {
    Console {
      cpu: Cpu::new(),
      bus: CpuBus::new(Ppu::new()),
      rom: None,
    }
  }

  /// Read and parse an iNES file, wire its banks up through the mapper, and
  /// reset the CPU so PC points at the cartridge's reset vector.
  pub fn load_rom(&mut self, path: &str) -> Result<()> {
    let rom = Rom::from_file(path)?;
    self.insert(rom)
  }

  /// Same as `load_rom`, from an already-parsed image.
  pub fn insert(&mut self, rom: Rom) -> Result<()> {
    let mut mapper = load_mapper(rom.mapper_id)?;
    mapper.reset(&rom, &mut self.bus)?;
    info!("mapper {:03} reset complete", rom.mapper_id);
    self.rom = Some(rom);
    self.reset();
    Ok(())
  }

  pub fn unload_rom(&mut self) {
    self.rom = None;
  }

  /// Re-reset the CPU: registers cleared, PC fetched from $FFFC/$FFFD.
  pub fn reset(&mut self) {
    self.cpu.reset(&self.bus);
  }

  /// Execute until the program BRKs, something stops the CPU, or an error
  /// unwinds the run.
  pub fn run(&mut self) -> Result<()> {
    self.run_with_observer(|_| {})
  }

  /// `run`, with a callback before every instruction. This is the hook a
  /// trace-diffing harness attaches to; it may also stop the console.
  pub fn run_with_observer<F>(&mut self, mut observer: F) -> Result<()>
  where
    F: FnMut(&mut Console),
  {
    self.cpu.running = true;
    while self.cpu.running {
      observer(self);
      if !self.cpu.running {
        // The observer requested a stop before the next fetch.
        break;
      }
      self.step()?;
    }
    Ok(())
  }

  /// One instruction.
  pub fn step(&mut self) -> Result<()> {
    self.cpu.step(&mut self.bus)
  }

  /// Cooperative stop; takes effect before the next fetch.
  pub fn stop(&mut self) {
    self.cpu.stop();
  }

  pub fn trace(&self) -> Result<Trace> {
    trace::trace(self)
  }
}
