use std::collections::HashMap;

use lazy_static::lazy_static;
use maplit::hashmap;

use crate::bitfield::{join16, split16, Bits8};
use crate::bus::Bus;
use crate::error::{Error, Result};

/// 6502 Processor Status bits, indexed from the LSB.
///
/// P stays a single byte with accessors rather than separate booleans:
/// PHP/PLP/RTI observe and restore the exact byte image, including the B and
/// unused bits.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum StatusFlag {
  Carry = 1 << 0,
  Zero = 1 << 1,
  DisableInterrupts = 1 << 2,
  DecimalMode = 1 << 3,
  Break = 1 << 4,
  Unused = 1 << 5, // Always set
  Overflow = 1 << 6,
  Negative = 1 << 7,
}
use StatusFlag::*;

pub const STACK_START: u16 = 0x0100;
pub const STACK_INIT: u8 = 0xFD;

/// Contains a pointer to the start of the program.
pub const RESET_VECTOR: u16 = 0xFFFC;

const STATUS_INIT: u8 = (Unused as u8) | (DisableInterrupts as u8);

/// B and U are never overwritten by a pulled status byte.
const STATUS_PULL_KEEP: u8 = (Break as u8) | (Unused as u8);

#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Cpu {
  /// Processor Status
  pub status: u8,
  /// Accumulator
  pub a: u8,
  /// X Register
  pub x: u8,
  /// Y Register
  pub y: u8,
  /// Stack Pointer
  pub s: u8,
  /// Program Counter
  pub pc: u16,

  /// The two-state machine: Running until BRK or an external stop flips this
  /// off. The run loop checks it before every fetch.
  pub running: bool,
}

impl Cpu {
  pub fn new() -> Cpu {
    Cpu {
      status: STATUS_INIT,
      a: 0x00,
      x: 0x00,
      y: 0x00,
      s: STACK_INIT,
      pc: 0x0000,
      running: false,
    }
  }

  // UTILITIES/HELPER METHODS:

  pub fn get_status(&self, flag: StatusFlag) -> u8 {
    self.status & (flag as u8)
  }

  pub fn set_status(&mut self, flag: StatusFlag, value: bool) {
    if value {
      self.status |= flag as u8;
    } else {
      self.status &= !(flag as u8);
    }
  }

  fn set_zero_negative(&mut self, data: u8) {
    self.set_status(Zero, data == 0x00);
    self.set_status(Negative, data & 0x80 != 0);
  }

  fn push(&mut self, bus: &mut dyn Bus, data: u8) {
    bus.write(STACK_START | (self.s as u16), data);
    self.s = self.s.wrapping_sub(1);
  }

  fn pull(&mut self, bus: &mut dyn Bus) -> u8 {
    self.s = self.s.wrapping_add(1);
    bus.read(STACK_START | (self.s as u16))
  }

  /// High byte first, so the later pull comes back low-then-high.
  fn push16(&mut self, bus: &mut dyn Bus, data: u16) {
    let (lo, hi) = split16(data);
    self.push(bus, hi);
    self.push(bus, lo);
  }

  fn pull16(&mut self, bus: &mut dyn Bus) -> u16 {
    let lo = self.pull(bus);
    let hi = self.pull(bus);
    join16(lo, hi)
  }

  /// Reset state: registers cleared, P = I | U, PC from the reset vector.
  pub fn reset(&mut self, bus: &dyn Bus) {
    self.a = 0x00;
    self.x = 0x00;
    self.y = 0x00;
    self.s = STACK_INIT;
    self.status = STATUS_INIT;
    self.pc = bus.read16(RESET_VECTOR);
    self.running = true;
  }

  pub fn stop(&mut self) {
    self.running = false;
  }

  /// One fetch-decode-execute round. PC is moved past the whole instruction
  /// before the body runs, so branch targets and pushed return addresses see
  /// the post-fetch PC.
  pub fn step(&mut self, bus: &mut dyn Bus) -> Result<()> {
    let opcode = bus.read(self.pc);
    self.pc = self.pc.wrapping_add(1);

    let operation = Operation::lookup(opcode)?;

    let addressing_mode: AddressingModeImpl = match operation.addressing_mode {
      IMP => imp,
      IMM => imm,
      ZPG => zpg,
      ZPX => zpx,
      ZPY => zpy,
      ABS => abs,
      ABX => abx,
      ABY => aby,
      IND => ind,
      IZX => izx,
      IZY => izy,
      REL => rel,
    };
    let operand = addressing_mode(self, bus);

    let instruction: InstructionImpl = match operation.instruction {
      ADC => adc,
      AND => and,
      ASL => asl,
      BCC => bcc,
      BCS => bcs,
      BEQ => beq,
      BIT => bit,
      BMI => bmi,
      BNE => bne,
      BPL => bpl,
      BRK => brk,
      BVC => bvc,
      BVS => bvs,
      CLC => clc,
      CLD => cld,
      CLI => cli,
      CLV => clv,
      CMP => cmp,
      CPX => cpx,
      CPY => cpy,
      DEC => dec,
      DEX => dex,
      DEY => dey,
      EOR => eor,
      INC => inc,
      INX => inx,
      INY => iny,
      JMP => jmp,
      JSR => jsr,
      LDA => lda,
      LDX => ldx,
      LDY => ldy,
      LSR => lsr,
      NOP => nop,
      ORA => ora,
      PHA => pha,
      PHP => php,
      PLA => pla,
      PLP => plp,
      ROL => rol,
      ROR => ror,
      RTI => rti,
      RTS => rts,
      SBC => sbc,
      SEC => sec,
      SED => sed,
      SEI => sei,
      STA => sta,
      STX => stx,
      STY => sty,
      TAX => tax,
      TAY => tay,
      TSX => tsx,
      TXA => txa,
      TXS => txs,
      TYA => tya,

      LAX => lax,
      SAX => sax,
      DCP => dcp,
      ISB => isb,
      SLO => slo,
      RLA => rla,
      SRE => sre,
      RRA => rra,
    };
    instruction(self, bus, operand);

    Ok(())
  }
}

/// What an addressing mode hands the instruction body. Shift and rotate
/// bodies pattern-match on this instead of testing an address sentinel, and
/// a memory write through an implied operand is impossible by construction.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Operand {
  /// Implied: the instruction works on a register, usually the accumulator.
  Accumulator,
  Immediate(u8),
  Memory(u16),
}
use Operand::*;

impl Operand {
  fn read(&self, cpu: &Cpu, bus: &dyn Bus) -> u8 {
    match *self {
      Accumulator => cpu.a,
      Immediate(value) => value,
      Memory(addr) => bus.read(addr),
    }
  }

  fn write(&self, cpu: &mut Cpu, bus: &mut dyn Bus, data: u8) {
    match *self {
      Accumulator => cpu.a = data,
      Immediate(_) => panic!("immediate operands are read-only"),
      Memory(addr) => bus.write(addr, data),
    }
  }

  /// The effective address; only jumps and branches ask for it, and they are
  /// never decoded with a non-memory mode.
  fn address(&self) -> u16 {
    match *self {
      Memory(addr) => addr,
      _ => panic!("operand has no address"),
    }
  }
}

type AddressingModeImpl = fn(&mut Cpu, &mut dyn Bus) -> Operand;

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum AddressingMode {
  IMP,
  IMM,
  ZPG,
  ZPX,
  ZPY,
  ABS,
  ABX,
  ABY,
  IND,
  IZX,
  IZY,
  REL,
}
use AddressingMode::*;

impl AddressingMode {
  /// Total instruction length in bytes, opcode included.
  pub fn length(&self) -> u16 {
    match self {
      IMP => 1,
      IMM | ZPG | ZPX | ZPY | IZX | IZY | REL => 2,
      ABS | ABX | ABY | IND => 3,
    }
  }
}

type InstructionImpl = fn(&mut Cpu, &mut dyn Bus, Operand);

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Instruction {
  ADC,
  AND,
  ASL,
  BCC,
  BCS,
  BEQ,
  BIT,
  BMI,
  BNE,
  BPL,
  BRK,
  BVC,
  BVS,
  CLC,
  CLD,
  CLI,
  CLV,
  CMP,
  CPX,
  CPY,
  DEC,
  DEX,
  DEY,
  EOR,
  INC,
  INX,
  INY,
  JMP,
  JSR,
  LDA,
  LDX,
  LDY,
  LSR,
  NOP,
  ORA,
  PHA,
  PHP,
  PLA,
  PLP,
  ROL,
  ROR,
  RTI,
  RTS,
  SBC,
  SEC,
  SED,
  SEI,
  STA,
  STX,
  STY,
  TAX,
  TAY,
  TSX,
  TXA,
  TXS,
  TYA,

  // Undocumented:
  LAX,
  SAX,
  DCP,
  ISB,
  SLO,
  RLA,
  SRE,
  RRA,
}
use Instruction::*;

#[derive(Debug, Clone, Copy)]
pub struct Operation {
  pub instruction: Instruction,
  pub addressing_mode: AddressingMode,
  pub undocumented: bool,
}

impl Operation {
  pub fn lookup(opcode: u8) -> Result<&'static Operation> {
    OPCODE_MAP.get(&opcode).ok_or(Error::IllegalOpcode(opcode))
  }
}

// INSTRUCTIONS ///////////////////////////////////////////////////////////////

// LOAD/STORE OPERATIONS

/// Load Accumulator
fn lda(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  let m = operand.read(cpu, bus);
  cpu.a = m;
  cpu.set_zero_negative(m);
}

/// Load X
fn ldx(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  let m = operand.read(cpu, bus);
  cpu.x = m;
  cpu.set_zero_negative(m);
}

/// Load Y
fn ldy(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  let m = operand.read(cpu, bus);
  cpu.y = m;
  cpu.set_zero_negative(m);
}

/// Undocumented: LDA + LDX
fn lax(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  let m = operand.read(cpu, bus);
  cpu.a = m;
  cpu.x = m;
  cpu.set_zero_negative(m);
}

/// Store Accumulator
fn sta(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  operand.write(cpu, bus, cpu.a);
}

/// Store X
fn stx(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  operand.write(cpu, bus, cpu.x);
}

/// Store Y
fn sty(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  operand.write(cpu, bus, cpu.y);
}

/// Undocumented: store A & X, flags untouched
fn sax(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  operand.write(cpu, bus, cpu.a & cpu.x);
}

// REGISTER TRANSFERS

/// Transfer Accumulator to X
fn tax(cpu: &mut Cpu, _bus: &mut dyn Bus, _operand: Operand) {
  cpu.x = cpu.a;
  cpu.set_zero_negative(cpu.x);
}

/// Transfer Accumulator to Y
fn tay(cpu: &mut Cpu, _bus: &mut dyn Bus, _operand: Operand) {
  cpu.y = cpu.a;
  cpu.set_zero_negative(cpu.y);
}

/// Transfer X to Accumulator
fn txa(cpu: &mut Cpu, _bus: &mut dyn Bus, _operand: Operand) {
  cpu.a = cpu.x;
  cpu.set_zero_negative(cpu.a);
}

/// Transfer Y to Accumulator
fn tya(cpu: &mut Cpu, _bus: &mut dyn Bus, _operand: Operand) {
  cpu.a = cpu.y;
  cpu.set_zero_negative(cpu.a);
}

/// Transfer Stack Pointer to X
fn tsx(cpu: &mut Cpu, _bus: &mut dyn Bus, _operand: Operand) {
  cpu.x = cpu.s;
  cpu.set_zero_negative(cpu.x);
}

/// Transfer X to Stack Pointer; the only transfer that leaves flags alone
fn txs(cpu: &mut Cpu, _bus: &mut dyn Bus, _operand: Operand) {
  cpu.s = cpu.x;
}

// STACK OPERATIONS

/// Push Accumulator
fn pha(cpu: &mut Cpu, bus: &mut dyn Bus, _operand: Operand) {
  cpu.push(bus, cpu.a);
}

/// Push Processor Status, with B and U forced on in the pushed image
fn php(cpu: &mut Cpu, bus: &mut dyn Bus, _operand: Operand) {
  cpu.push(bus, cpu.status | (Break as u8) | (Unused as u8));
}

/// Pull Accumulator
fn pla(cpu: &mut Cpu, bus: &mut dyn Bus, _operand: Operand) {
  cpu.a = cpu.pull(bus);
  cpu.set_zero_negative(cpu.a);
}

/// Pull Processor Status; B and U keep their pre-instruction values
fn plp(cpu: &mut Cpu, bus: &mut dyn Bus, _operand: Operand) {
  let pulled = cpu.pull(bus);
  cpu.status = (pulled & !STATUS_PULL_KEEP) | (cpu.status & STATUS_PULL_KEEP);
}

// STATUS FLAG CHANGES

/// Set carry
fn sec(cpu: &mut Cpu, _bus: &mut dyn Bus, _operand: Operand) {
  cpu.set_status(Carry, true);
}

/// Set decimal mode
fn sed(cpu: &mut Cpu, _bus: &mut dyn Bus, _operand: Operand) {
  cpu.set_status(DecimalMode, true);
}

/// Set interrupt disable
fn sei(cpu: &mut Cpu, _bus: &mut dyn Bus, _operand: Operand) {
  cpu.set_status(DisableInterrupts, true);
}

/// Clear carry
fn clc(cpu: &mut Cpu, _bus: &mut dyn Bus, _operand: Operand) {
  cpu.set_status(Carry, false);
}

/// Clear decimal mode
fn cld(cpu: &mut Cpu, _bus: &mut dyn Bus, _operand: Operand) {
  cpu.set_status(DecimalMode, false);
}

/// Clear interrupt disable
fn cli(cpu: &mut Cpu, _bus: &mut dyn Bus, _operand: Operand) {
  cpu.set_status(DisableInterrupts, false);
}

/// Clear overflow
fn clv(cpu: &mut Cpu, _bus: &mut dyn Bus, _operand: Operand) {
  cpu.set_status(Overflow, false);
}

// ARITHMETIC

/// Shared add core: ADC directly, SBC via the complemented operand.
fn adc_(cpu: &mut Cpu, a: u16, m: u16) {
  let carry_in = if cpu.get_status(Carry) != 0 { 1 } else { 0 };
  let result = a + m + carry_in;
  // Signed overflow: the inputs agree in sign and the result does not.
  let overflow = (a ^ result) & !(a ^ m) & 0x0080;
  cpu.set_status(Overflow, overflow != 0);
  cpu.set_status(Carry, result & 0xFF00 != 0);
  cpu.a = (result & 0x00FF) as u8;
  cpu.set_zero_negative(cpu.a);
}

/// Add with Carry
fn adc(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  let a = cpu.a as u16;
  let m = operand.read(cpu, bus) as u16;
  adc_(cpu, a, m);
}

/// Subtract with Carry
fn sbc(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  let a = cpu.a as u16;
  let m = (!operand.read(cpu, bus)) as u16;
  adc_(cpu, a, m);
}

/// Shared compare core for CMP/CPX/CPY.
fn compare(cpu: &mut Cpu, reg: u8, m: u8) {
  cpu.set_status(Carry, reg >= m);
  cpu.set_zero_negative(reg.wrapping_sub(m));
}

/// Compare Accumulator
fn cmp(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  let m = operand.read(cpu, bus);
  compare(cpu, cpu.a, m);
}

/// Compare X
fn cpx(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  let m = operand.read(cpu, bus);
  compare(cpu, cpu.x, m);
}

/// Compare Y
fn cpy(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  let m = operand.read(cpu, bus);
  compare(cpu, cpu.y, m);
}

// LOGICAL INSTRUCTIONS

/// AND
fn and(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  cpu.a &= operand.read(cpu, bus);
  cpu.set_zero_negative(cpu.a);
}

/// Inclusive OR
fn ora(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  cpu.a |= operand.read(cpu, bus);
  cpu.set_zero_negative(cpu.a);
}

/// Exclusive OR
fn eor(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  cpu.a ^= operand.read(cpu, bus);
  cpu.set_zero_negative(cpu.a);
}

/// Bit Test: Z from A & M, N and V copied straight from M
fn bit(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  let m = operand.read(cpu, bus);
  let bits = Bits8::new(m);
  cpu.set_status(Zero, cpu.a & m == 0x00);
  cpu.set_status(Overflow, bits.get(6) != 0);
  cpu.set_status(Negative, bits.get(7) != 0);
}

// SHIFTS & ROTATES

/// Arithmetic Shift Left
fn asl(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  let m = operand.read(cpu, bus);
  let result = m << 1;
  cpu.set_status(Carry, m & 0x80 != 0);
  cpu.set_zero_negative(result);
  operand.write(cpu, bus, result);
}

/// Logical Shift Right
fn lsr(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  let m = operand.read(cpu, bus);
  let result = m >> 1;
  cpu.set_status(Carry, m & 0x01 != 0);
  cpu.set_zero_negative(result);
  operand.write(cpu, bus, result);
}

/// Rotate Left: carry shifts in at bit 0, bit 7 shifts out into carry
fn rol(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  let m = operand.read(cpu, bus);
  let result = (m << 1) | cpu.get_status(Carry);
  cpu.set_status(Carry, m & 0x80 != 0);
  cpu.set_zero_negative(result);
  operand.write(cpu, bus, result);
}

/// Rotate Right: carry shifts in at bit 7, bit 0 shifts out into carry
fn ror(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  let m = operand.read(cpu, bus);
  let result = (m >> 1) | (cpu.get_status(Carry) << 7);
  cpu.set_status(Carry, m & 0x01 != 0);
  cpu.set_zero_negative(result);
  operand.write(cpu, bus, result);
}

/// Undocumented: ASL memory, then ORA the result
fn slo(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  let m = operand.read(cpu, bus);
  let result = m << 1;
  cpu.set_status(Carry, m & 0x80 != 0);
  operand.write(cpu, bus, result);
  cpu.a |= result;
  cpu.set_zero_negative(cpu.a);
}

/// Undocumented: ROL memory, then AND the result
fn rla(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  let m = operand.read(cpu, bus);
  let result = (m << 1) | cpu.get_status(Carry);
  cpu.set_status(Carry, m & 0x80 != 0);
  operand.write(cpu, bus, result);
  cpu.a &= result;
  cpu.set_zero_negative(cpu.a);
}

/// Undocumented: LSR memory, then EOR the result
fn sre(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  let m = operand.read(cpu, bus);
  let result = m >> 1;
  cpu.set_status(Carry, m & 0x01 != 0);
  operand.write(cpu, bus, result);
  cpu.a ^= result;
  cpu.set_zero_negative(cpu.a);
}

/// Undocumented: ROR memory, then ADC the rotated value
fn rra(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  let m = operand.read(cpu, bus);
  let result = (m >> 1) | (cpu.get_status(Carry) << 7);
  cpu.set_status(Carry, m & 0x01 != 0);
  operand.write(cpu, bus, result);
  adc_(cpu, cpu.a as u16, result as u16);
}

// INCREMENTS & DECREMENTS

/// Increment Memory
fn inc(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  let result = operand.read(cpu, bus).wrapping_add(1);
  cpu.set_zero_negative(result);
  operand.write(cpu, bus, result);
}

/// Decrement Memory
fn dec(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  let result = operand.read(cpu, bus).wrapping_sub(1);
  cpu.set_zero_negative(result);
  operand.write(cpu, bus, result);
}

/// Increment X
fn inx(cpu: &mut Cpu, _bus: &mut dyn Bus, _operand: Operand) {
  cpu.x = cpu.x.wrapping_add(1);
  cpu.set_zero_negative(cpu.x);
}

/// Increment Y
fn iny(cpu: &mut Cpu, _bus: &mut dyn Bus, _operand: Operand) {
  cpu.y = cpu.y.wrapping_add(1);
  cpu.set_zero_negative(cpu.y);
}

/// Decrement X
fn dex(cpu: &mut Cpu, _bus: &mut dyn Bus, _operand: Operand) {
  cpu.x = cpu.x.wrapping_sub(1);
  cpu.set_zero_negative(cpu.x);
}

/// Decrement Y
fn dey(cpu: &mut Cpu, _bus: &mut dyn Bus, _operand: Operand) {
  cpu.y = cpu.y.wrapping_sub(1);
  cpu.set_zero_negative(cpu.y);
}

/// Undocumented: DEC memory, then CMP against the decremented value
fn dcp(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  let result = operand.read(cpu, bus).wrapping_sub(1);
  operand.write(cpu, bus, result);
  compare(cpu, cpu.a, result);
}

/// Undocumented: INC memory, then SBC the incremented value
fn isb(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  let result = operand.read(cpu, bus).wrapping_add(1);
  operand.write(cpu, bus, result);
  adc_(cpu, cpu.a as u16, (!result) as u16);
}

// JUMPS & CALLS

/// Jump
fn jmp(cpu: &mut Cpu, _bus: &mut dyn Bus, operand: Operand) {
  cpu.pc = operand.address();
}

/// Jump to Subroutine: the pushed return address is one before the next
/// instruction; RTS compensates.
fn jsr(cpu: &mut Cpu, bus: &mut dyn Bus, operand: Operand) {
  let return_addr = cpu.pc.wrapping_sub(1);
  cpu.push16(bus, return_addr);
  cpu.pc = operand.address();
}

/// Return from Subroutine
fn rts(cpu: &mut Cpu, bus: &mut dyn Bus, _operand: Operand) {
  cpu.pc = cpu.pull16(bus).wrapping_add(1);
}

/// Return from Interrupt: pulled status keeps the current B and U, pulled PC
/// is used as-is.
fn rti(cpu: &mut Cpu, bus: &mut dyn Bus, _operand: Operand) {
  let pulled = cpu.pull(bus);
  cpu.status = (pulled & !STATUS_PULL_KEEP) | (cpu.status & STATUS_PULL_KEEP);
  cpu.pc = cpu.pull16(bus);
}

// BRANCHES

/// Every branch is the same test against a different flag. The target was
/// already computed by relative addressing.
fn branch_if(condition: bool, cpu: &mut Cpu, operand: Operand) {
  if condition {
    cpu.pc = operand.address();
  }
}

/// Branch if Carry Clear
fn bcc(cpu: &mut Cpu, _bus: &mut dyn Bus, operand: Operand) {
  branch_if(cpu.get_status(Carry) == 0, cpu, operand);
}

/// Branch if Carry Set
fn bcs(cpu: &mut Cpu, _bus: &mut dyn Bus, operand: Operand) {
  branch_if(cpu.get_status(Carry) != 0, cpu, operand);
}

/// Branch if Equal
fn beq(cpu: &mut Cpu, _bus: &mut dyn Bus, operand: Operand) {
  branch_if(cpu.get_status(Zero) != 0, cpu, operand);
}

/// Branch if Not Equal
fn bne(cpu: &mut Cpu, _bus: &mut dyn Bus, operand: Operand) {
  branch_if(cpu.get_status(Zero) == 0, cpu, operand);
}

/// Branch if Minus
fn bmi(cpu: &mut Cpu, _bus: &mut dyn Bus, operand: Operand) {
  branch_if(cpu.get_status(Negative) != 0, cpu, operand);
}

/// Branch if Positive
fn bpl(cpu: &mut Cpu, _bus: &mut dyn Bus, operand: Operand) {
  branch_if(cpu.get_status(Negative) == 0, cpu, operand);
}

/// Branch if Overflow Clear
fn bvc(cpu: &mut Cpu, _bus: &mut dyn Bus, operand: Operand) {
  branch_if(cpu.get_status(Overflow) == 0, cpu, operand);
}

/// Branch if Overflow Set
fn bvs(cpu: &mut Cpu, _bus: &mut dyn Bus, operand: Operand) {
  branch_if(cpu.get_status(Overflow) != 0, cpu, operand);
}

// SYSTEM FUNCTIONS

/// BRK halts the interpreter. A hardware 6502 would push PC and P and vector
/// through $FFFE; here BRK is the program's terminate signal.
fn brk(cpu: &mut Cpu, _bus: &mut dyn Bus, _operand: Operand) {
  cpu.running = false;
}

/// No operation. The undocumented variants still consumed their operand
/// bytes during decode.
fn nop(_cpu: &mut Cpu, _bus: &mut dyn Bus, _operand: Operand) {}

// ADDRESSING MODES ///////////////////////////////////////////////////////////

/// Implied: the operand is a register.
fn imp(_cpu: &mut Cpu, _bus: &mut dyn Bus) -> Operand {
  Accumulator
}

/// Immediate: the operand is the byte after the opcode.
fn imm(cpu: &mut Cpu, bus: &mut dyn Bus) -> Operand {
  let value = bus.read(cpu.pc);
  cpu.pc = cpu.pc.wrapping_add(1);
  Immediate(value)
}

/// Zero Page: one-byte address into $0000-$00FF.
fn zpg(cpu: &mut Cpu, bus: &mut dyn Bus) -> Operand {
  let addr = bus.read(cpu.pc) as u16;
  cpu.pc = cpu.pc.wrapping_add(1);
  Memory(addr)
}

/// Zero Page, X: the offset wraps inside the zero page.
fn zpx(cpu: &mut Cpu, bus: &mut dyn Bus) -> Operand {
  let addr = bus.read(cpu.pc).wrapping_add(cpu.x) as u16;
  cpu.pc = cpu.pc.wrapping_add(1);
  Memory(addr)
}

/// Zero Page, Y: the offset wraps inside the zero page.
fn zpy(cpu: &mut Cpu, bus: &mut dyn Bus) -> Operand {
  let addr = bus.read(cpu.pc).wrapping_add(cpu.y) as u16;
  cpu.pc = cpu.pc.wrapping_add(1);
  Memory(addr)
}

/// Absolute: little-endian 16-bit address.
fn abs(cpu: &mut Cpu, bus: &mut dyn Bus) -> Operand {
  let lo = bus.read(cpu.pc);
  cpu.pc = cpu.pc.wrapping_add(1);
  let hi = bus.read(cpu.pc);
  cpu.pc = cpu.pc.wrapping_add(1);
  Memory(join16(lo, hi))
}

/// Absolute, X
fn abx(cpu: &mut Cpu, bus: &mut dyn Bus) -> Operand {
  match abs(cpu, bus) {
    Memory(addr) => Memory(addr.wrapping_add(cpu.x as u16)),
    _ => unreachable!(),
  }
}

/// Absolute, Y
fn aby(cpu: &mut Cpu, bus: &mut dyn Bus) -> Operand {
  match abs(cpu, bus) {
    Memory(addr) => Memory(addr.wrapping_add(cpu.y as u16)),
    _ => unreachable!(),
  }
}

/// Indirect, used only by JMP. A hardware bug keeps the pointer's high byte
/// from crossing a page: reading ($10FF) takes its target's high byte from
/// $1000, not $1100.
fn ind(cpu: &mut Cpu, bus: &mut dyn Bus) -> Operand {
  let lo = bus.read(cpu.pc);
  cpu.pc = cpu.pc.wrapping_add(1);
  let hi = bus.read(cpu.pc);
  cpu.pc = cpu.pc.wrapping_add(1);
  let ptr = join16(lo, hi);

  let target_lo = bus.read(ptr);
  let target_hi = bus.read((ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF));
  Memory(join16(target_lo, target_hi))
}

/// (Indirect, X): the pointer lives in the zero page, offset by X before the
/// dereference; both pointer bytes wrap inside the zero page.
fn izx(cpu: &mut Cpu, bus: &mut dyn Bus) -> Operand {
  let base = bus.read(cpu.pc);
  cpu.pc = cpu.pc.wrapping_add(1);
  let ptr = base.wrapping_add(cpu.x);
  let lo = bus.read(ptr as u16);
  let hi = bus.read(ptr.wrapping_add(1) as u16);
  Memory(join16(lo, hi))
}

/// (Indirect), Y: dereference the zero-page pointer first, then add Y.
fn izy(cpu: &mut Cpu, bus: &mut dyn Bus) -> Operand {
  let ptr = bus.read(cpu.pc);
  cpu.pc = cpu.pc.wrapping_add(1);
  let lo = bus.read(ptr as u16);
  let hi = bus.read(ptr.wrapping_add(1) as u16);
  Memory(join16(lo, hi).wrapping_add(cpu.y as u16))
}

/// Relative: signed offset from the post-fetch PC. Only branches use this.
fn rel(cpu: &mut Cpu, bus: &mut dyn Bus) -> Operand {
  let offset = bus.read(cpu.pc) as i8;
  cpu.pc = cpu.pc.wrapping_add(1);
  Memory(cpu.pc.wrapping_add(offset as u16))
}

// OPCODE TABLE ///////////////////////////////////////////////////////////////

fn op(instruction: Instruction, addressing_mode: AddressingMode) -> Operation {
  Operation {
    instruction,
    addressing_mode,
    undocumented: false,
  }
}

fn undoc(instruction: Instruction, addressing_mode: AddressingMode) -> Operation {
  Operation {
    instruction,
    addressing_mode,
    undocumented: true,
  }
}

lazy_static! {
  /// Every opcode the interpreter recognizes: the official 6502 set plus the
  /// undocumented opcodes the common test ROMs execute. Anything else is an
  /// illegal opcode.
  static ref OPCODE_MAP: HashMap<u8, Operation> = hashmap! {
    // ADC
    0x69 => op(ADC, IMM),
    0x65 => op(ADC, ZPG),
    0x75 => op(ADC, ZPX),
    0x6D => op(ADC, ABS),
    0x7D => op(ADC, ABX),
    0x79 => op(ADC, ABY),
    0x61 => op(ADC, IZX),
    0x71 => op(ADC, IZY),
    // AND
    0x29 => op(AND, IMM),
    0x25 => op(AND, ZPG),
    0x35 => op(AND, ZPX),
    0x2D => op(AND, ABS),
    0x3D => op(AND, ABX),
    0x39 => op(AND, ABY),
    0x21 => op(AND, IZX),
    0x31 => op(AND, IZY),
    // ASL
    0x0A => op(ASL, IMP),
    0x06 => op(ASL, ZPG),
    0x16 => op(ASL, ZPX),
    0x0E => op(ASL, ABS),
    0x1E => op(ASL, ABX),
    // Branches
    0x90 => op(BCC, REL),
    0xB0 => op(BCS, REL),
    0xF0 => op(BEQ, REL),
    0x30 => op(BMI, REL),
    0xD0 => op(BNE, REL),
    0x10 => op(BPL, REL),
    0x50 => op(BVC, REL),
    0x70 => op(BVS, REL),
    // BIT
    0x24 => op(BIT, ZPG),
    0x2C => op(BIT, ABS),
    // BRK
    0x00 => op(BRK, IMP),
    // Flag clears
    0x18 => op(CLC, IMP),
    0xD8 => op(CLD, IMP),
    0x58 => op(CLI, IMP),
    0xB8 => op(CLV, IMP),
    // CMP
    0xC9 => op(CMP, IMM),
    0xC5 => op(CMP, ZPG),
    0xD5 => op(CMP, ZPX),
    0xCD => op(CMP, ABS),
    0xDD => op(CMP, ABX),
    0xD9 => op(CMP, ABY),
    0xC1 => op(CMP, IZX),
    0xD1 => op(CMP, IZY),
    // CPX
    0xE0 => op(CPX, IMM),
    0xE4 => op(CPX, ZPG),
    0xEC => op(CPX, ABS),
    // CPY
    0xC0 => op(CPY, IMM),
    0xC4 => op(CPY, ZPG),
    0xCC => op(CPY, ABS),
    // DEC
    0xC6 => op(DEC, ZPG),
    0xD6 => op(DEC, ZPX),
    0xCE => op(DEC, ABS),
    0xDE => op(DEC, ABX),
    // DEX/DEY
    0xCA => op(DEX, IMP),
    0x88 => op(DEY, IMP),
    // EOR
    0x49 => op(EOR, IMM),
    0x45 => op(EOR, ZPG),
    0x55 => op(EOR, ZPX),
    0x4D => op(EOR, ABS),
    0x5D => op(EOR, ABX),
    0x59 => op(EOR, ABY),
    0x41 => op(EOR, IZX),
    0x51 => op(EOR, IZY),
    // INC
    0xE6 => op(INC, ZPG),
    0xF6 => op(INC, ZPX),
    0xEE => op(INC, ABS),
    0xFE => op(INC, ABX),
    // INX/INY
    0xE8 => op(INX, IMP),
    0xC8 => op(INY, IMP),
    // JMP
    0x4C => op(JMP, ABS),
    0x6C => op(JMP, IND),
    // JSR
    0x20 => op(JSR, ABS),
    // LDA
    0xA9 => op(LDA, IMM),
    0xA5 => op(LDA, ZPG),
    0xB5 => op(LDA, ZPX),
    0xAD => op(LDA, ABS),
    0xBD => op(LDA, ABX),
    0xB9 => op(LDA, ABY),
    0xA1 => op(LDA, IZX),
    0xB1 => op(LDA, IZY),
    // LDX
    0xA2 => op(LDX, IMM),
    0xA6 => op(LDX, ZPG),
    0xB6 => op(LDX, ZPY),
    0xAE => op(LDX, ABS),
    0xBE => op(LDX, ABY),
    // LDY
    0xA0 => op(LDY, IMM),
    0xA4 => op(LDY, ZPG),
    0xB4 => op(LDY, ZPX),
    0xAC => op(LDY, ABS),
    0xBC => op(LDY, ABX),
    // LSR
    0x4A => op(LSR, IMP),
    0x46 => op(LSR, ZPG),
    0x56 => op(LSR, ZPX),
    0x4E => op(LSR, ABS),
    0x5E => op(LSR, ABX),
    // NOP
    0xEA => op(NOP, IMP),
    // ORA
    0x09 => op(ORA, IMM),
    0x05 => op(ORA, ZPG),
    0x15 => op(ORA, ZPX),
    0x0D => op(ORA, ABS),
    0x1D => op(ORA, ABX),
    0x19 => op(ORA, ABY),
    0x01 => op(ORA, IZX),
    0x11 => op(ORA, IZY),
    // Stack
    0x48 => op(PHA, IMP),
    0x08 => op(PHP, IMP),
    0x68 => op(PLA, IMP),
    0x28 => op(PLP, IMP),
    // ROL
    0x2A => op(ROL, IMP),
    0x26 => op(ROL, ZPG),
    0x36 => op(ROL, ZPX),
    0x2E => op(ROL, ABS),
    0x3E => op(ROL, ABX),
    // ROR
    0x6A => op(ROR, IMP),
    0x66 => op(ROR, ZPG),
    0x76 => op(ROR, ZPX),
    0x6E => op(ROR, ABS),
    0x7E => op(ROR, ABX),
    // RTI/RTS
    0x40 => op(RTI, IMP),
    0x60 => op(RTS, IMP),
    // SBC
    0xE9 => op(SBC, IMM),
    0xE5 => op(SBC, ZPG),
    0xF5 => op(SBC, ZPX),
    0xED => op(SBC, ABS),
    0xFD => op(SBC, ABX),
    0xF9 => op(SBC, ABY),
    0xE1 => op(SBC, IZX),
    0xF1 => op(SBC, IZY),
    // Flag sets
    0x38 => op(SEC, IMP),
    0xF8 => op(SED, IMP),
    0x78 => op(SEI, IMP),
    // STA
    0x85 => op(STA, ZPG),
    0x95 => op(STA, ZPX),
    0x8D => op(STA, ABS),
    0x9D => op(STA, ABX),
    0x99 => op(STA, ABY),
    0x81 => op(STA, IZX),
    0x91 => op(STA, IZY),
    // STX
    0x86 => op(STX, ZPG),
    0x96 => op(STX, ZPY),
    0x8E => op(STX, ABS),
    // STY
    0x84 => op(STY, ZPG),
    0x94 => op(STY, ZPX),
    0x8C => op(STY, ABS),
    // Transfers
    0xAA => op(TAX, IMP),
    0xA8 => op(TAY, IMP),
    0xBA => op(TSX, IMP),
    0x8A => op(TXA, IMP),
    0x9A => op(TXS, IMP),
    0x98 => op(TYA, IMP),

    // Undocumented: LAX
    0xA7 => undoc(LAX, ZPG),
    0xB7 => undoc(LAX, ZPY),
    0xAF => undoc(LAX, ABS),
    0xBF => undoc(LAX, ABY),
    0xA3 => undoc(LAX, IZX),
    0xB3 => undoc(LAX, IZY),
    // Undocumented: SAX
    0x87 => undoc(SAX, ZPG),
    0x97 => undoc(SAX, ZPY),
    0x8F => undoc(SAX, ABS),
    0x83 => undoc(SAX, IZX),
    // Undocumented: SBC alias
    0xEB => undoc(SBC, IMM),
    // Undocumented: DCP
    0xC7 => undoc(DCP, ZPG),
    0xD7 => undoc(DCP, ZPX),
    0xCF => undoc(DCP, ABS),
    0xDF => undoc(DCP, ABX),
    0xDB => undoc(DCP, ABY),
    0xC3 => undoc(DCP, IZX),
    0xD3 => undoc(DCP, IZY),
    // Undocumented: ISB
    0xE7 => undoc(ISB, ZPG),
    0xF7 => undoc(ISB, ZPX),
    0xEF => undoc(ISB, ABS),
    0xFF => undoc(ISB, ABX),
    0xFB => undoc(ISB, ABY),
    0xE3 => undoc(ISB, IZX),
    0xF3 => undoc(ISB, IZY),
    // Undocumented: SLO
    0x07 => undoc(SLO, ZPG),
    0x17 => undoc(SLO, ZPX),
    0x0F => undoc(SLO, ABS),
    0x1F => undoc(SLO, ABX),
    0x1B => undoc(SLO, ABY),
    0x03 => undoc(SLO, IZX),
    0x13 => undoc(SLO, IZY),
    // Undocumented: RLA
    0x27 => undoc(RLA, ZPG),
    0x37 => undoc(RLA, ZPX),
    0x2F => undoc(RLA, ABS),
    0x3F => undoc(RLA, ABX),
    0x3B => undoc(RLA, ABY),
    0x23 => undoc(RLA, IZX),
    0x33 => undoc(RLA, IZY),
    // Undocumented: SRE
    0x47 => undoc(SRE, ZPG),
    0x57 => undoc(SRE, ZPX),
    0x4F => undoc(SRE, ABS),
    0x5F => undoc(SRE, ABX),
    0x5B => undoc(SRE, ABY),
    0x43 => undoc(SRE, IZX),
    0x53 => undoc(SRE, IZY),
    // Undocumented: RRA
    0x67 => undoc(RRA, ZPG),
    0x77 => undoc(RRA, ZPX),
    0x6F => undoc(RRA, ABS),
    0x7F => undoc(RRA, ABX),
    0x7B => undoc(RRA, ABY),
    0x63 => undoc(RRA, IZX),
    0x73 => undoc(RRA, IZY),
    // Undocumented: NOP variants
    0x1A => undoc(NOP, IMP),
    0x3A => undoc(NOP, IMP),
    0x5A => undoc(NOP, IMP),
    0x7A => undoc(NOP, IMP),
    0xDA => undoc(NOP, IMP),
    0xFA => undoc(NOP, IMP),
    0x80 => undoc(NOP, IMM),
    0x04 => undoc(NOP, ZPG),
    0x44 => undoc(NOP, ZPG),
    0x64 => undoc(NOP, ZPG),
    0x0C => undoc(NOP, ABS),
    0x14 => undoc(NOP, ZPX),
    0x34 => undoc(NOP, ZPX),
    0x54 => undoc(NOP, ZPX),
    0x74 => undoc(NOP, ZPX),
    0xD4 => undoc(NOP, ZPX),
    0xF4 => undoc(NOP, ZPX),
    0x1C => undoc(NOP, ABX),
    0x3C => undoc(NOP, ABX),
    0x5C => undoc(NOP, ABX),
    0x7C => undoc(NOP, ABX),
    0xDC => undoc(NOP, ABX),
    0xFC => undoc(NOP, ABX),
  };
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bus::CpuBus;
  use crate::ppu::Ppu;
  use pretty_assertions::assert_eq;

  const PROGRAM_START: u16 = 0x0300;

  /// A CPU parked at `PROGRAM_START` with the given bytes ahead of it.
  fn cpu_with_program(program: &[u8]) -> (Cpu, CpuBus) {
    let mut bus = CpuBus::new(Ppu::new());
    for (i, byte) in program.iter().enumerate() {
      bus.write(PROGRAM_START + i as u16, *byte);
    }
    let mut cpu = Cpu::new();
    cpu.pc = PROGRAM_START;
    cpu.running = true;
    (cpu, bus)
  }

  fn flag(cpu: &Cpu, flag: StatusFlag) -> bool {
    cpu.get_status(flag) != 0
  }

  #[test]
  fn decoder_length_matches_bytes_consumed() {
    for (&opcode, operation) in OPCODE_MAP.iter() {
      // Instructions that redirect PC are covered by their own tests.
      match operation.instruction {
        JMP | JSR | RTS | RTI | BRK => continue,
        _ => {}
      }

      let (mut cpu, mut bus) = cpu_with_program(&[opcode, 0x00, 0x00]);
      cpu.step(&mut bus).unwrap();
      // A zero relative offset makes taken and untaken branches agree here.
      assert_eq!(
        cpu.pc,
        PROGRAM_START + operation.addressing_mode.length(),
        "opcode ${:02X} ({:?} {:?})",
        opcode,
        operation.instruction,
        operation.addressing_mode,
      );
    }
  }

  #[test]
  fn reset_state() {
    let mut bus = CpuBus::new(Ppu::new());
    bus.write16(RESET_VECTOR, 0xC000);
    let mut cpu = Cpu::new();
    cpu.a = 0x12;
    cpu.reset(&bus);

    assert_eq!(cpu.a, 0x00);
    assert_eq!(cpu.x, 0x00);
    assert_eq!(cpu.y, 0x00);
    assert_eq!(cpu.s, 0xFD);
    assert_eq!(cpu.status, 0x24);
    assert_eq!(cpu.pc, 0xC000);
    assert_eq!(cpu.running, true);
  }

  #[test]
  fn jmp_absolute() {
    let mut bus = CpuBus::new(Ppu::new());
    bus.write(0xC000, 0x4C);
    bus.write(0xC001, 0xF5);
    bus.write(0xC002, 0xC5);
    let mut cpu = Cpu::new();
    cpu.pc = 0xC000;

    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.pc, 0xC5F5);
  }

  #[test]
  fn jmp_indirect_page_wrap_bug() {
    let (mut cpu, mut bus) = cpu_with_program(&[0x6C, 0xFF, 0x10]);
    bus.write(0x10FF, 0x00);
    bus.write(0x1000, 0x40);
    // The straight-line answer would come from $1100:
    bus.write(0x1100, 0x99);

    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.pc, 0x4000);
  }

  #[test]
  fn jsr_rts_round_trip() {
    let mut bus = CpuBus::new(Ppu::new());
    // JSR $C005 at $C000, RTS at $C005:
    bus.write(0xC000, 0x20);
    bus.write(0xC001, 0x05);
    bus.write(0xC002, 0xC0);
    bus.write(0xC005, 0x60);
    let mut cpu = Cpu::new();
    cpu.pc = 0xC000;

    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.pc, 0xC005);
    assert_eq!(cpu.s, 0xFB);
    // Return address $C002 was pushed high byte first:
    assert_eq!(bus.read(0x01FD), 0xC0);
    assert_eq!(bus.read(0x01FC), 0x02);

    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.pc, 0xC003);
    assert_eq!(cpu.s, 0xFD);
  }

  #[test]
  fn adc_overflow() {
    let (mut cpu, mut bus) = cpu_with_program(&[0x69, 0x01]); // ADC #$01
    cpu.a = 0x7F;

    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.a, 0x80);
    assert_eq!(flag(&cpu, Negative), true);
    assert_eq!(flag(&cpu, Zero), false);
    assert_eq!(flag(&cpu, Carry), false);
    assert_eq!(flag(&cpu, Overflow), true);
  }

  #[test]
  fn sbc_borrow() {
    let (mut cpu, mut bus) = cpu_with_program(&[0xE9, 0xF0]); // SBC #$F0
    cpu.a = 0x50;
    cpu.set_status(Carry, true);

    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.a, 0x60);
    assert_eq!(flag(&cpu, Negative), false);
    assert_eq!(flag(&cpu, Zero), false);
    assert_eq!(flag(&cpu, Carry), false);
    // Overflow compares the sign bits of the inputs against the 8-bit
    // result, not the borrow byte: $50 (+80) minus $F0 (-16) is +96, which
    // fits, so V stays clear.
    assert_eq!(flag(&cpu, Overflow), false);
  }

  #[test]
  fn lsr_accumulator() {
    let (mut cpu, mut bus) = cpu_with_program(&[0x4A]); // LSR A
    cpu.a = 0x03;

    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.a, 0x01);
    assert_eq!(flag(&cpu, Carry), true);
    assert_eq!(flag(&cpu, Zero), false);
    assert_eq!(flag(&cpu, Negative), false);
  }

  #[test]
  fn loads_set_negative_and_zero() {
    for value in 0..=255u8 {
      let (mut cpu, mut bus) = cpu_with_program(&[0xA9, value]); // LDA #value
      cpu.step(&mut bus).unwrap();
      assert_eq!(cpu.a, value);
      assert_eq!(cpu.get_status(Negative) >> 7, value >> 7);
      assert_eq!(flag(&cpu, Zero), value == 0);
    }
  }

  #[test]
  fn php_forces_break_and_unused() {
    let (mut cpu, mut bus) = cpu_with_program(&[0x08]); // PHP
    assert_eq!(cpu.status, 0x24);

    cpu.step(&mut bus).unwrap();
    assert_eq!(bus.read(0x01FD), 0x34);
    // The live status byte is untouched:
    assert_eq!(cpu.status, 0x24);
  }

  #[test]
  fn plp_preserves_break_and_unused() {
    let (mut cpu, mut bus) = cpu_with_program(&[0x28]); // PLP
    bus.write(0x01FE, 0xFF);

    cpu.step(&mut bus).unwrap();
    // Bits 0-3, 6, 7 come from the stack; B stays 0 and U stays 1:
    assert_eq!(cpu.status, 0xEF);
  }

  #[test]
  fn rti_restores_status_and_pc() {
    let (mut cpu, mut bus) = cpu_with_program(&[0x40]); // RTI
    bus.write(0x01FE, 0xFF); // status image
    bus.write(0x01FF, 0x34); // PC low
    bus.write(0x0100, 0x12); // PC high (S wraps within page 1)

    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.status, 0xEF);
    // RTI uses the pulled PC as-is, with no +1 adjustment:
    assert_eq!(cpu.pc, 0x1234);
  }

  #[test]
  fn brk_halts() {
    let (mut cpu, mut bus) = cpu_with_program(&[0x00]); // BRK
    assert_eq!(cpu.running, true);

    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.running, false);
    assert_eq!(cpu.pc, PROGRAM_START + 1);
  }

  #[test]
  fn illegal_opcode_is_fatal() {
    let (mut cpu, mut bus) = cpu_with_program(&[0x02]);
    match cpu.step(&mut bus) {
      Err(Error::IllegalOpcode(byte)) => assert_eq!(byte, 0x02),
      _ => panic!("expected IllegalOpcode"),
    }
  }

  #[test]
  fn bit_copies_memory_bits() {
    let (mut cpu, mut bus) = cpu_with_program(&[0x24, 0x10]); // BIT $10
    bus.write(0x0010, 0xC0);
    cpu.a = 0x0F;

    cpu.step(&mut bus).unwrap();
    assert_eq!(flag(&cpu, Zero), true);
    assert_eq!(flag(&cpu, Negative), true);
    assert_eq!(flag(&cpu, Overflow), true);
  }

  #[test]
  fn compare_sets_carry_on_greater_or_equal() {
    for (a, m, carry, zero) in [
      (0x40u8, 0x3Fu8, true, false),
      (0x40, 0x40, true, true),
      (0x40, 0x41, false, false),
    ] {
      let (mut cpu, mut bus) = cpu_with_program(&[0xC9, m]); // CMP #m
      cpu.a = a;
      cpu.step(&mut bus).unwrap();
      assert_eq!(flag(&cpu, Carry), carry, "CMP ${:02X} with A=${:02X}", m, a);
      assert_eq!(flag(&cpu, Zero), zero);
    }
  }

  #[test]
  fn rotates_move_carry_through() {
    let (mut cpu, mut bus) = cpu_with_program(&[0x2A]); // ROL A
    cpu.a = 0x80;
    cpu.set_status(Carry, true);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.a, 0x01);
    assert_eq!(flag(&cpu, Carry), true);

    let (mut cpu, mut bus) = cpu_with_program(&[0x6A]); // ROR A
    cpu.a = 0x01;
    cpu.set_status(Carry, true);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.a, 0x80);
    assert_eq!(flag(&cpu, Carry), true);
    assert_eq!(flag(&cpu, Negative), true);
  }

  #[test]
  fn inc_and_dec_wrap() {
    let (mut cpu, mut bus) = cpu_with_program(&[0xE6, 0x10]); // INC $10
    bus.write(0x0010, 0xFF);
    cpu.step(&mut bus).unwrap();
    assert_eq!(bus.read(0x0010), 0x00);
    assert_eq!(flag(&cpu, Zero), true);

    let (mut cpu, mut bus) = cpu_with_program(&[0xC6, 0x10]); // DEC $10
    bus.write(0x0010, 0x00);
    cpu.step(&mut bus).unwrap();
    assert_eq!(bus.read(0x0010), 0xFF);
    assert_eq!(flag(&cpu, Negative), true);
  }

  #[test]
  fn indexed_indirect_addressing() {
    // LDA ($20,X) with X=4: pointer at $24/$25 -> $0400
    let (mut cpu, mut bus) = cpu_with_program(&[0xA1, 0x20]);
    cpu.x = 0x04;
    bus.write(0x0024, 0x00);
    bus.write(0x0025, 0x04);
    bus.write(0x0400, 0xAA);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.a, 0xAA);

    // LDA ($20),Y with Y=5: pointer at $20/$21 -> $0400, plus Y -> $0405
    let (mut cpu, mut bus) = cpu_with_program(&[0xB1, 0x20]);
    cpu.y = 0x05;
    bus.write(0x0020, 0x00);
    bus.write(0x0021, 0x04);
    bus.write(0x0405, 0xBB);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.a, 0xBB);
  }

  #[test]
  fn zero_page_pointer_wraps() {
    // LDA ($FF),Y: the pointer's high byte comes from $00, not $100.
    let (mut cpu, mut bus) = cpu_with_program(&[0xB1, 0xFF]);
    bus.write(0x00FF, 0x00);
    bus.write(0x0000, 0x04);
    bus.write(0x0400, 0xCC);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.a, 0xCC);
  }

  #[test]
  fn branch_takes_relative_target() {
    // BNE +4 with Z=0 branches; PC lands past the offset.
    let (mut cpu, mut bus) = cpu_with_program(&[0xD0, 0x04]);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.pc, PROGRAM_START + 2 + 4);

    // Negative offsets work through two's complement:
    let (mut cpu, mut bus) = cpu_with_program(&[0xD0, 0xFE]);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.pc, PROGRAM_START);

    // An untaken branch falls through:
    let (mut cpu, mut bus) = cpu_with_program(&[0xF0, 0x04]); // BEQ, Z=0
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.pc, PROGRAM_START + 2);
  }

  #[test]
  fn lax_loads_both_registers() {
    let (mut cpu, mut bus) = cpu_with_program(&[0xA7, 0x10]); // LAX $10
    bus.write(0x0010, 0x8F);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.a, 0x8F);
    assert_eq!(cpu.x, 0x8F);
    assert_eq!(flag(&cpu, Negative), true);
  }

  #[test]
  fn sax_stores_mask_without_flags() {
    let (mut cpu, mut bus) = cpu_with_program(&[0x87, 0x10]); // SAX $10
    cpu.a = 0xF0;
    cpu.x = 0x3C;
    let status_before = cpu.status;
    cpu.step(&mut bus).unwrap();
    assert_eq!(bus.read(0x0010), 0x30);
    assert_eq!(cpu.status, status_before);
  }

  #[test]
  fn dcp_compares_against_decremented_value() {
    let (mut cpu, mut bus) = cpu_with_program(&[0xC7, 0x10]); // DCP $10
    bus.write(0x0010, 0x40);
    cpu.a = 0x3F;
    cpu.step(&mut bus).unwrap();
    assert_eq!(bus.read(0x0010), 0x3F);
    assert_eq!(flag(&cpu, Zero), true);
    assert_eq!(flag(&cpu, Carry), true);
  }

  #[test]
  fn isb_subtracts_incremented_value() {
    let (mut cpu, mut bus) = cpu_with_program(&[0xE7, 0x10]); // ISB $10
    bus.write(0x0010, 0x0F);
    cpu.a = 0x20;
    cpu.set_status(Carry, true);
    cpu.step(&mut bus).unwrap();
    assert_eq!(bus.read(0x0010), 0x10);
    assert_eq!(cpu.a, 0x10);
    assert_eq!(flag(&cpu, Carry), true);
  }

  #[test]
  fn slo_shifts_then_ors() {
    let (mut cpu, mut bus) = cpu_with_program(&[0x07, 0x10]); // SLO $10
    bus.write(0x0010, 0x81);
    cpu.a = 0x01;
    cpu.step(&mut bus).unwrap();
    assert_eq!(bus.read(0x0010), 0x02);
    assert_eq!(cpu.a, 0x03);
    assert_eq!(flag(&cpu, Carry), true);
  }

  #[test]
  fn rra_rotates_then_adds() {
    let (mut cpu, mut bus) = cpu_with_program(&[0x67, 0x10]); // RRA $10
    bus.write(0x0010, 0x03);
    cpu.a = 0x10;
    // Rotate: $03 -> $01 with carry out 1; ADC then adds $01 plus carry.
    cpu.step(&mut bus).unwrap();
    assert_eq!(bus.read(0x0010), 0x01);
    assert_eq!(cpu.a, 0x12);
  }

  #[test]
  fn stack_wraps_within_page_one() {
    let (mut cpu, mut bus) = cpu_with_program(&[0x48]); // PHA
    cpu.s = 0x00;
    cpu.a = 0x42;
    cpu.step(&mut bus).unwrap();
    assert_eq!(bus.read(0x0100), 0x42);
    assert_eq!(cpu.s, 0xFF);
  }
}
