//! The debug observer left over from trace-comparison work: snapshot the CPU
//! and decode the instruction at PC without executing it, formatted the way
//! the common reference logs are.

use std::fmt;

use crate::bus::Bus;
use crate::console::Console;
use crate::cpu6502::AddressingMode::*;
use crate::cpu6502::Instruction::*;
use crate::cpu6502::{Cpu, Instruction, Operation};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
  pub cpu: Cpu,
  pub instruction: Instruction,
  pub undocumented: bool,
  /// The instruction bytes, opcode first.
  pub data: Vec<u8>,
  /// Disassembled operand text, effective addresses included.
  pub params: String,
}

/// Decode the instruction at the current PC. Reads are side-effect free, so
/// peeking at operands and effective addresses is safe.
pub fn trace(console: &Console) -> Result<Trace> {
  let cpu = console.cpu;
  let bus: &dyn Bus = &console.bus;

  let pc = cpu.pc;
  let opcode = bus.read(pc);
  let operation = Operation::lookup(opcode)?;

  let params = match operation.addressing_mode {
    IMP => match operation.instruction {
      // The accumulator forms of the shifts spell their operand out:
      ASL | LSR | ROL | ROR => "A".to_string(),
      _ => "".to_string(),
    },
    IMM => {
      let param = bus.read(pc.wrapping_add(1));
      format!("#${:02X}", param)
    }
    ZPG => {
      let addr = bus.read(pc.wrapping_add(1)) as u16;
      format!("${:02X} = {:02X}", addr, bus.read(addr))
    }
    ZPX => {
      let param = bus.read(pc.wrapping_add(1));
      let addr = param.wrapping_add(cpu.x) as u16;
      format!("${:02X},X @ {:02X} = {:02X}", param, addr, bus.read(addr))
    }
    ZPY => {
      let param = bus.read(pc.wrapping_add(1));
      let addr = param.wrapping_add(cpu.y) as u16;
      format!("${:02X},Y @ {:02X} = {:02X}", param, addr, bus.read(addr))
    }
    ABS => {
      let addr = bus.read16(pc.wrapping_add(1));
      match operation.instruction {
        JMP | JSR => format!("${:04X}", addr),
        _ => format!("${:04X} = {:02X}", addr, bus.read(addr)),
      }
    }
    ABX => {
      let base = bus.read16(pc.wrapping_add(1));
      let addr = base.wrapping_add(cpu.x as u16);
      format!("${:04X},X @ {:04X} = {:02X}", base, addr, bus.read(addr))
    }
    ABY => {
      let base = bus.read16(pc.wrapping_add(1));
      let addr = base.wrapping_add(cpu.y as u16);
      format!("${:04X},Y @ {:04X} = {:02X}", base, addr, bus.read(addr))
    }
    IND => {
      let ptr = bus.read16(pc.wrapping_add(1));
      // Mirror the page-wrap bug so the printed target matches execution:
      let lo = bus.read(ptr) as u16;
      let hi = bus.read((ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF)) as u16;
      format!("(${:04X}) = {:04X}", ptr, (hi << 8) | lo)
    }
    IZX => {
      let param = bus.read(pc.wrapping_add(1));
      let zp = param.wrapping_add(cpu.x);
      let lo = bus.read(zp as u16) as u16;
      let hi = bus.read(zp.wrapping_add(1) as u16) as u16;
      let addr = (hi << 8) | lo;
      format!(
        "(${:02X},X) @ {:02X} = {:04X} = {:02X}",
        param,
        zp,
        addr,
        bus.read(addr)
      )
    }
    IZY => {
      let param = bus.read(pc.wrapping_add(1));
      let lo = bus.read(param as u16) as u16;
      let hi = bus.read(param.wrapping_add(1) as u16) as u16;
      let base = (hi << 8) | lo;
      let addr = base.wrapping_add(cpu.y as u16);
      format!(
        "(${:02X}),Y = {:04X} @ {:04X} = {:02X}",
        param,
        base,
        addr,
        bus.read(addr)
      )
    }
    REL => {
      let offset = bus.read(pc.wrapping_add(1)) as i8;
      let target = pc.wrapping_add(2).wrapping_add(offset as u16);
      format!("${:04X}", target)
    }
  };

  let mut data = vec![];
  for i in 0..operation.addressing_mode.length() {
    data.push(bus.read(pc.wrapping_add(i)));
  }

  Ok(Trace {
    cpu,
    instruction: operation.instruction,
    undocumented: operation.undocumented,
    data,
    params,
  })
}

impl fmt::Display for Trace {
  /// One reference-log line:
  ///
  /// ```text
  /// C000  4C F5 C5  JMP $C5F5                       A:00 X:00 Y:00 P:24 SP:FD
  /// ```
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let instruction_data = self
      .data
      .iter()
      .map(|byte| format!("{:02X}", byte))
      .collect::<Vec<String>>()
      .join(" ");

    write!(
      f,
      "{:04X}  {:<8} {}{:?} {:<26}  A:{:02X} X:{:02X} Y:{:02X} P:{:02X} SP:{:02X}",
      self.cpu.pc,
      instruction_data,
      if self.undocumented { "*" } else { " " },
      self.instruction,
      self.params,
      self.cpu.a,
      self.cpu.x,
      self.cpu.y,
      self.cpu.status,
      self.cpu.s
    )
  }
}
