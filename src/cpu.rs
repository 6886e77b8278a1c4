//! The five-stage CPU core.
//!
//! The machine is sequential: one instruction occupies the pipeline at a
//! time, but each of FETCH, DECODE, EXECUTE, MEMORY and WRITEBACK costs its
//! own cycle and the per-stage state is architecturally visible to
//! inspectors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::isa::{self, AluOp, Fmt, Reg, Status};
use crate::memory::MemoryDevice;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Trap {
    #[error("illegal instruction {word:#06x}")]
    IllegalInstruction { word: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Fetch,
    Decode,
    Execute,
    Memory,
    Writeback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemOp {
    Load,
    Store,
    None,
}

/// Architectural state plus the micro-op latches threaded between stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuState {
    pub cycle: u64,
    pub stage: Stage,
    pub pc: u16,
    pub registers: [u8; 16],

    pub instruction: u16,
    /// DECODE -> EXECUTE
    pub alu_op: AluOp,
    /// DECODE -> EXECUTE
    pub alu_op1: u16,
    /// DECODE -> EXECUTE
    pub alu_op2: u8,
    /// EXECUTE -> MEMORY -> WRITEBACK
    pub result: u16,
    /// DECODE -> EXECUTE -> MEMORY -> WRITEBACK
    pub write_reg: usize,
    /// DECODE -> EXECUTE -> MEMORY
    pub store_val: u8,
    /// DECODE -> EXECUTE -> MEMORY
    pub mem_op: MemOp,
    pub save_ret: bool,
    pub alu_write: bool,
    pub alu_set_flags: bool,
    pub take_jump: bool,
}

impl Default for CpuState {
    fn default() -> Self {
        Self {
            cycle: 0,
            stage: Stage::Fetch,
            pc: 0,
            registers: [0; 16],
            instruction: 0,
            alu_op: AluOp::Add,
            alu_op1: 0,
            alu_op2: 0,
            result: 0,
            write_reg: 0,
            store_val: 0,
            mem_op: MemOp::None,
            save_ret: false,
            alu_write: false,
            alu_set_flags: false,
            take_jump: false,
        }
    }
}

/// Which ALU operations write their result back, indexed by O field.
const ALU_WRITE: u16 = 0b1011_0111_1100_1111;
/// Which ALU operations update SR, indexed by O field.
const ALU_SET_FLAGS: u16 = 0b1100_0111_1111_1111;

impl CpuState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to the boot state. Registers other than SR keep their contents,
    /// as on the real machine.
    pub fn reset(&mut self) {
        self.stage = Stage::Fetch;
        self.cycle = 0;
        self.pc = 0x0000;
        self.registers[Reg::Sr as usize] = 0;
    }

    /// Advance one pipeline stage.
    pub fn micro_step(&mut self, memory: &dyn MemoryDevice) -> Result<(), Trap> {
        match self.stage {
            Stage::Fetch => {
                self.fetch(memory);
                self.stage = Stage::Decode;
            }
            Stage::Decode => {
                self.decode()?;
                self.stage = Stage::Execute;
            }
            Stage::Execute => {
                self.execute();
                self.stage = Stage::Memory;
            }
            Stage::Memory => {
                self.memory_access(memory);
                self.stage = Stage::Writeback;
            }
            Stage::Writeback => {
                self.writeback();
                self.stage = Stage::Fetch;
            }
        }
        self.cycle += 1;
        Ok(())
    }

    /// Run a full five-stage instruction.
    pub fn step(&mut self, memory: &dyn MemoryDevice) -> Result<(), Trap> {
        loop {
            self.micro_step(memory)?;
            if self.stage == Stage::Fetch {
                return Ok(());
            }
        }
    }

    fn read_byte(&self, memory: &dyn MemoryDevice, address: u16) -> u8 {
        let result = memory.read(address as usize);
        if !result.is_success() {
            tracing::warn!("memory read at {address:#06x} returned {result:?}");
        }
        result.value()
    }

    fn wide_pair(&self, low: Reg) -> u16 {
        u16::from(self.registers[low as usize])
            | u16::from(self.registers[low as usize + 1]) << 8
    }

    fn fetch(&mut self, memory: &dyn MemoryDevice) {
        let high = self.read_byte(memory, self.pc);
        let low = self.read_byte(memory, self.pc.wrapping_add(1));
        self.instruction = u16::from(low) | u16::from(high) << 8;
        self.pc = self.pc.wrapping_add(2);
    }

    fn decode_alu_op(&mut self) -> Result<(), Trap> {
        let field = (self.instruction & isa::O_MASK) >> isa::O_SHIFT;
        self.alu_op = AluOp::from_field(field).ok_or(Trap::IllegalInstruction {
            word: self.instruction,
        })?;
        self.alu_write = ALU_WRITE >> field & 1 != 0;
        self.alu_set_flags = ALU_SET_FLAGS >> field & 1 != 0;
        Ok(())
    }

    fn decode_x_register(&mut self) {
        let index = usize::from((self.instruction & isa::X_MASK) >> isa::X_SHIFT);
        self.alu_op1 = u16::from(self.registers[index]);
        self.store_val = self.registers[index];
        self.write_reg = index;
    }

    fn decode_y_register(&mut self) {
        let index = usize::from((self.instruction & isa::Y_MASK) >> isa::Y_SHIFT);
        self.alu_op2 = self.registers[index];
    }

    fn decode_immediate(&mut self) {
        let imm = (self.instruction & isa::IL_MASK) >> isa::IL_SHIFT
            | (self.instruction & isa::IH_MASK) >> isa::IH_SHIFT;
        self.alu_op2 = isa::sign_extend6(imm as u8);
    }

    fn decode_m_addr_mode(&mut self) {
        let mode = (self.instruction & isa::M_MASK) >> isa::M_SHIFT;
        self.alu_op1 = match mode {
            0 => isa::STACK_BASE + u16::from(self.registers[Reg::Sp as usize]),
            1 => isa::STACK_BASE + u16::from(self.registers[Reg::FP as usize]),
            2 => self.wide_pair(Reg::RaL),
            3 => u16::from(self.registers[Reg::Gb as usize]) + isa::ZPG_BASE,
            4 => self.wide_pair(Reg::GeL),
            5 => self.wide_pair(Reg::GfL),
            6 => self.wide_pair(Reg::GgL),
            _ => self.wide_pair(Reg::GhL),
        };
    }

    fn decode_c_addr_mode(&mut self) {
        let mode = (self.instruction & isa::M_MASK) >> isa::M_SHIFT;
        self.alu_op1 = match mode {
            0 => isa::BLD_LOW_BASE,
            1 => isa::BLD_HIGH_BASE,
            2 => self.pc,
            3 => self.wide_pair(Reg::RaL),
            4 => self.wide_pair(Reg::GeL),
            5 => self.wide_pair(Reg::GfL),
            6 => self.wide_pair(Reg::GgL),
            _ => self.wide_pair(Reg::GhL),
        };
    }

    fn decode_jump_condition(&mut self) {
        let sr = Status::from_bits_truncate(self.registers[Reg::Sr as usize]);
        let c = sr.contains(Status::C);
        let v = sr.contains(Status::V);
        let n = sr.contains(Status::N);
        let z = sr.contains(Status::Z);

        self.take_jump = match (self.instruction & isa::C_MASK) >> isa::C_SHIFT {
            0 => c,
            1 => v,
            2 => n,
            3 => z,
            4 => (if v { c } else { !n }) && !z,
            5 => {
                if v {
                    c
                } else {
                    !n
                }
            }
            6 => c && !z,
            _ => true,
        };

        if self.instruction & isa::N_MASK != 0 {
            self.take_jump = !self.take_jump;
        }
    }

    fn decode(&mut self) -> Result<(), Trap> {
        self.take_jump = false;
        self.alu_set_flags = true;
        self.save_ret = false;
        self.mem_op = MemOp::None;

        match Fmt::of(self.instruction) {
            Fmt::A => {
                self.decode_alu_op()?;
                self.decode_x_register();
                self.decode_y_register();
            }
            Fmt::Ia => {
                self.decode_alu_op()?;
                self.decode_x_register();
                self.decode_immediate();
            }
            Fmt::M => {
                self.decode_x_register();
                self.decode_m_addr_mode();
                self.decode_immediate();
                self.alu_op = AluOp::Add;
                let store = self.instruction & isa::S_MASK != 0;
                self.alu_write = !store;
                self.alu_set_flags = false;
                self.mem_op = if store { MemOp::Store } else { MemOp::Load };
            }
            Fmt::C => {
                self.decode_c_addr_mode();
                self.decode_jump_condition();
                self.decode_immediate();
                // Branch targets are instruction-aligned.
                self.alu_op2 <<= 1;
                self.alu_op = AluOp::Add;
                self.alu_write = false;
                self.alu_set_flags = false;
                self.save_ret = self.instruction & isa::S_MASK != 0;
            }
        }
        Ok(())
    }

    fn execute(&mut self) {
        let mut sr = Status::from_bits_truncate(self.registers[Reg::Sr as usize]);

        // Default carry-in: 0 for ADD, 1 for SUB/CMP; the carry-using ops
        // take whatever is in SR.
        match self.alu_op {
            AluOp::Add => sr.set(Status::C, false),
            AluOp::Sub | AluOp::Cmp => sr.set(Status::C, true),
            _ => {}
        }
        // The subtracting ops invert operand 2 and add.
        match self.alu_op {
            AluOp::Sub | AluOp::Cmp | AluOp::Sbc | AluOp::Cmc => self.alu_op2 = !self.alu_op2,
            _ => {}
        }

        let op1 = self.alu_op1;
        let op2 = u16::from(self.alu_op2);
        let mut result: u16 = 0;

        match self.alu_op {
            AluOp::Add | AluOp::Adc | AluOp::Sub | AluOp::Cmp | AluOp::Sbc | AluOp::Cmc => {
                result = (op1 & 0x00FF) + op2 + u16::from(sr.contains(Status::C));
                sr.set(Status::C, result & 0x0100 != 0);
                sr.set(
                    Status::V,
                    (op1 & 0x0080) == (op2 & 0x0080) && (op1 & 0x0080) != (result & 0x0080),
                );
                // Carry the high byte through so 16-bit address arithmetic
                // works with an 8-bit signed operand.
                result = result.wrapping_add(op1 & 0xFF00);
                if op2 & 0x0080 != 0 {
                    result = result.wrapping_add(0xFF00);
                }
            }
            AluOp::And => result = op1 & op2,
            AluOp::Or => result = op1 | op2,
            AluOp::Xor => result = op1 ^ op2,
            AluOp::Shl => result = (op1 & 0xFF00) | (op1 << (op2 & 0x0007)) & 0x00FF,
            AluOp::Shr => result = (op1 & 0xFF00) | (op1 >> (op2 & 0x0007)) & 0x00FF,
            AluOp::Mov => result = op2,
            AluOp::Movh => result = (op1 & 0x003F) | (op2 << 6) & 0x00C0,
            AluOp::Seb => {
                result = op1;
                if op2 & 0x0008 != 0 {
                    result |= 1 << (op2 & 0x0007);
                } else {
                    result &= !(1 << (op2 & 0x0007));
                }
            }
            AluOp::Tsb => {}
        }

        match self.alu_op {
            AluOp::Tsb => sr.set(Status::Z, op1 >> (op2 & 0x0007) & 1 != 0),
            // Carry-using ops accumulate Z across bytes: a non-zero byte
            // clears it, a zero byte leaves it alone.
            AluOp::Adc | AluOp::Sbc | AluOp::Cmc => {
                if result & 0x00FF != 0 {
                    sr.set(Status::Z, false);
                }
            }
            _ => sr.set(Status::Z, result & 0x00FF == 0),
        }

        match self.alu_op {
            AluOp::Tsb => sr.set(Status::N, self.alu_op2 & 0x08 != 0),
            _ => sr.set(Status::N, result & 0x0080 != 0),
        }

        self.result = result;

        if self.alu_set_flags {
            self.registers[Reg::Sr as usize] = sr.bits();
        }
        if self.save_ret {
            self.registers[Reg::RaL as usize] = self.pc as u8;
            self.registers[Reg::RaH as usize] = (self.pc >> 8) as u8;
        }
        if self.take_jump {
            self.pc = result;
        }
    }

    fn memory_access(&mut self, memory: &dyn MemoryDevice) {
        match self.mem_op {
            MemOp::Load => self.result = u16::from(self.read_byte(memory, self.result)),
            MemOp::Store => {
                let result = memory.write(self.result as usize, self.store_val);
                if !result.is_success() {
                    tracing::warn!(
                        "memory write at {:#06x} returned {result:?}",
                        self.result
                    );
                }
            }
            MemOp::None => {}
        }
    }

    fn writeback(&mut self) {
        if self.alu_write {
            self.registers[self.write_reg] = self.result as u8;
        }
    }
}
